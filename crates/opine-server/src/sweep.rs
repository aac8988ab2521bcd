//! Background reminder sweep.
//!
//! Periodically scans for polls that are about to expire or have just
//! expired, emails every subscribed user, and records each send in the
//! notification ledger. The ledger's unique constraint is what makes the
//! sweep safe to re-run: a notice that was already recorded is skipped.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use opine_core::notify::{self, Recorded};
use opine_core::tally;
use opine_db::models::PollRow;
use opine_db::{Database, queries};
use opine_mailer::{EmailMessage, Mailer};
use opine_types::models::NotificationKind;

pub struct SweepConfig {
    pub interval_secs: u64,
    /// How far ahead to look for "expiring soon" notices.
    pub window_hours: i64,
    /// How far back to look for "expired" notices. Keeps a restarted
    /// server from re-scanning ancient polls; the ledger handles the rest.
    pub lookback_hours: i64,
}

pub async fn run_reminder_loop(db: Arc<Database>, mailer: Mailer, config: SweepConfig) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs));
    loop {
        interval.tick().await;
        match sweep_once(&db, &mailer, &config).await {
            Ok(0) => {}
            Ok(sent) => info!("Reminder sweep delivered {} notification(s)", sent),
            Err(e) => warn!("Reminder sweep failed: {:#}", e),
        }
    }
}

async fn sweep_once(
    db: &Database,
    mailer: &Mailer,
    config: &SweepConfig,
) -> anyhow::Result<usize> {
    let expiring = db.with_read::<_, _, anyhow::Error>(|conn| {
        queries::polls_expiring_within(conn, config.window_hours)
    })?;
    let expired = db.with_read::<_, _, anyhow::Error>(|conn| {
        queries::polls_expired_within(conn, config.lookback_hours)
    })?;

    let mut sent = 0;
    for poll in &expiring {
        sent += notify_subscribers(db, mailer, poll, NotificationKind::ExpiringSoon).await?;
    }
    for poll in &expired {
        sent += notify_subscribers(db, mailer, poll, NotificationKind::Expired).await?;
    }
    Ok(sent)
}

async fn notify_subscribers(
    db: &Database,
    mailer: &Mailer,
    poll: &PollRow,
    kind: NotificationKind,
) -> anyhow::Result<usize> {
    let Ok(poll_id) = Uuid::parse_str(&poll.id) else {
        warn!("Skipping poll with malformed id {:?}", poll.id);
        return Ok(0);
    };

    let subscribers =
        db.with_read::<_, _, anyhow::Error>(|conn| queries::subscribed_users(conn, &poll.id))?;
    if subscribers.is_empty() {
        return Ok(0);
    }

    // Expired notices carry the final tally.
    let total_votes = match kind {
        NotificationKind::Expired => match tally::get_results(db, poll_id) {
            Ok(results) => Some(results.total_votes),
            Err(e) => {
                warn!(
                    "Skipping results notice for poll {}: {:#}",
                    poll_id,
                    anyhow::Error::from(e)
                );
                return Ok(0);
            }
        },
        NotificationKind::ExpiringSoon => None,
    };

    let mut sent = 0;
    for (user_id, email) in subscribers {
        let Ok(user_id) = Uuid::parse_str(&user_id) else {
            warn!("Skipping subscriber with malformed id {:?}", user_id);
            continue;
        };
        if notify::was_notified(db, user_id, poll_id, kind)? {
            continue;
        }

        let message = compose(poll, kind, total_votes, email);
        let receipt = match mailer.send(&message).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(
                    "Failed to send {} notice to {}: {:#}",
                    kind.as_str(),
                    message.to,
                    e
                );
                continue;
            }
        };

        match notify::record_notified(db, user_id, poll_id, kind, &receipt.message_id)? {
            Recorded::Fresh => sent += 1,
            Recorded::AlreadySent => {
                debug!("Notification for {} already recorded elsewhere", user_id)
            }
        }
    }
    Ok(sent)
}

fn compose(
    poll: &PollRow,
    kind: NotificationKind,
    total_votes: Option<i64>,
    to: String,
) -> EmailMessage {
    let (subject, body) = match kind {
        NotificationKind::ExpiringSoon => (
            format!("\"{}\" is closing soon", poll.title),
            "This poll stops accepting votes soon. Cast or update your vote while you can."
                .to_string(),
        ),
        NotificationKind::Expired => (
            format!("Results are in for \"{}\"", poll.title),
            format!(
                "Voting has ended with {} vote(s). See how the options stacked up.",
                total_votes.unwrap_or(0)
            ),
        ),
    };
    EmailMessage {
        to,
        subject,
        html: format!("<p>{}</p>", body),
        text: body,
        tags: vec!["poll-reminder".to_string(), kind.as_str().to_string()],
    }
}
