/// Integration tests: full voting flows against a real in-memory database.
///
/// These exercise the paths a running server takes (create a poll, cast
/// and change ballots, read results, follow and unfollow) and assert the
/// row-level effects the unique indexes and transactions are meant to
/// guarantee.
use std::net::{IpAddr, Ipv4Addr};

use chrono::{Duration, Utc};
use uuid::Uuid;

use opine_core::poll::NewPoll;
use opine_core::{VoteError, ballot, eligibility, interest, notify, poll, tally};
use opine_db::{Database, queries};
use opine_types::api::EligibilityStatus;
use opine_types::identity::VoterIdentity;
use opine_types::models::{InterestType, NotificationKind, Poll, PollOption};

fn test_db() -> Database {
    Database::open_in_memory().unwrap()
}

fn seed_user(db: &Database, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.create_user(
        &id.to_string(),
        name,
        &format!("{name}@example.com"),
        "hash",
    )
    .unwrap();
    id
}

fn seed_poll(
    db: &Database,
    creator: Uuid,
    multi: bool,
    options: &[&str],
) -> (Poll, Vec<PollOption>) {
    poll::create_poll(
        db,
        creator,
        NewPoll {
            title: "Which framework?".into(),
            description: None,
            options: options.iter().map(|s| s.to_string()).collect(),
            allow_multiple_choices: multi,
            expires_at: None,
        },
    )
    .unwrap()
}

fn anon(last_octet: u8) -> VoterIdentity {
    VoterIdentity::Anonymous {
        ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, last_octet)),
        fingerprint: format!("fp-{last_octet:02x}"),
    }
}

fn pick(options: &[PollOption], indexes: &[usize]) -> Vec<String> {
    indexes.iter().map(|i| options[*i].id.to_string()).collect()
}

fn table_rows(db: &Database, table: &str, poll_id: Uuid) -> i64 {
    db.with_read::<_, _, anyhow::Error>(|conn| {
        Ok(conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE poll_id = ?1"),
            rusqlite::params![poll_id.to_string()],
            |row| row.get(0),
        )?)
    })
    .unwrap()
}

#[test]
fn single_choice_revote_replaces_the_earlier_ballot() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let voter = seed_user(&db, "sam");
    let (p, options) = seed_poll(&db, creator, false, &["rust", "go", "zig"]);
    let identity = VoterIdentity::Authenticated(voter);

    let first = ballot::cast_ballot(&db, p.id, &identity, &pick(&options, &[0])).unwrap();
    assert_eq!(first.total_votes, 1);

    // Changing the vote supersedes; it never stacks.
    let second = ballot::cast_ballot(&db, p.id, &identity, &pick(&options, &[1])).unwrap();
    assert_eq!(second.total_votes, 1);

    let results = tally::get_results(&db, p.id).unwrap();
    assert_eq!(results.total_votes, 1);
    assert_eq!(results.options[0].count, 0);
    assert_eq!(results.options[1].count, 1);
    assert_eq!(results.options[2].count, 0);
}

#[test]
fn strict_submission_rejects_a_second_ballot() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let voter = seed_user(&db, "sam");
    let (p, options) = seed_poll(&db, creator, false, &["rust", "go"]);
    let identity = VoterIdentity::Authenticated(voter);

    ballot::submit_ballot(&db, p.id, &identity, &pick(&options, &[0])).unwrap();
    let err = ballot::submit_ballot(&db, p.id, &identity, &pick(&options, &[1])).unwrap_err();
    assert!(matches!(err, VoteError::Conflict(_)));

    // The original ballot is untouched.
    let results = tally::get_results(&db, p.id).unwrap();
    assert_eq!(results.options[0].count, 1);
    assert_eq!(results.options[1].count, 0);
}

#[test]
fn multi_choice_adds_options_but_never_repeats_one() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let (p, options) = seed_poll(&db, creator, true, &["mon", "tue", "wed"]);
    let identity = anon(7);

    let first = ballot::cast_ballot(&db, p.id, &identity, &pick(&options, &[0, 1])).unwrap();
    assert_eq!(first.total_votes, 2);

    // Re-selecting an option already held is a conflict, wholesale.
    let err = ballot::cast_ballot(&db, p.id, &identity, &pick(&options, &[0, 2])).unwrap_err();
    assert!(matches!(err, VoteError::Conflict(_)));
    assert_eq!(tally::get_results(&db, p.id).unwrap().total_votes, 2);

    // A fresh option on its own still lands.
    let third = ballot::cast_ballot(&db, p.id, &identity, &pick(&options, &[2])).unwrap();
    assert_eq!(third.total_votes, 3);
}

#[test]
fn anonymous_dedup_is_scoped_to_the_ip_alone() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let (p, options) = seed_poll(&db, creator, false, &["yes", "no"]);

    let first_device = VoterIdentity::Anonymous {
        ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)),
        fingerprint: "fp-laptop".into(),
    };
    let second_device = VoterIdentity::Anonymous {
        ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)),
        fingerprint: "fp-phone".into(),
    };

    ballot::submit_ballot(&db, p.id, &first_device, &pick(&options, &[0])).unwrap();

    // Same IP, different fingerprint: still the same voter.
    let err =
        ballot::submit_ballot(&db, p.id, &second_device, &pick(&options, &[1])).unwrap_err();
    assert!(matches!(err, VoteError::Conflict(_)));

    // A different IP is a different voter.
    ballot::submit_ballot(&db, p.id, &anon(10), &pick(&options, &[1])).unwrap();
    assert_eq!(tally::get_results(&db, p.id).unwrap().total_votes, 2);
}

#[test]
fn authenticated_and_anonymous_voters_never_collide() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let voter = seed_user(&db, "sam");
    let (p, options) = seed_poll(&db, creator, false, &["yes", "no"]);

    ballot::cast_ballot(
        &db,
        p.id,
        &VoterIdentity::Authenticated(voter),
        &pick(&options, &[0]),
    )
    .unwrap();
    ballot::cast_ballot(&db, p.id, &anon(4), &pick(&options, &[0])).unwrap();

    let results = tally::get_results(&db, p.id).unwrap();
    assert_eq!(results.options[0].count, 2);
    assert_eq!(results.total_votes, 2);
}

#[test]
fn expired_poll_rejects_votes_but_keeps_results_readable() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let voter = seed_user(&db, "sam");
    let (p, options) = poll::create_poll(
        &db,
        creator,
        NewPoll {
            title: "Last call".into(),
            description: None,
            options: vec!["a".into(), "b".into()],
            allow_multiple_choices: false,
            expires_at: Some(Utc::now() + Duration::hours(1)),
        },
    )
    .unwrap();
    let identity = VoterIdentity::Authenticated(voter);

    ballot::cast_ballot(&db, p.id, &identity, &pick(&options, &[0])).unwrap();

    db.with_write::<_, _, anyhow::Error>(|conn| {
        conn.execute(
            "UPDATE polls SET expires_at = datetime('now', '-1 minute') WHERE id = ?1",
            rusqlite::params![p.id.to_string()],
        )?;
        Ok(())
    })
    .unwrap();

    assert!(matches!(
        ballot::cast_ballot(&db, p.id, &identity, &pick(&options, &[1])),
        Err(VoteError::Expired)
    ));
    assert!(matches!(
        ballot::retract_ballot(&db, p.id, &identity),
        Err(VoteError::Expired)
    ));

    let check = eligibility::check_eligibility(&db, p.id, &identity).unwrap();
    assert!(!check.can_vote);
    assert_eq!(check.status, EligibilityStatus::Expired);

    // The tally is frozen, not gone.
    let results = tally::get_results(&db, p.id).unwrap();
    assert_eq!(results.total_votes, 1);
    assert_eq!(results.options[0].count, 1);
}

#[test]
fn deleting_a_poll_takes_the_whole_graph_with_it() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let voter = seed_user(&db, "sam");
    let follower = seed_user(&db, "kit");
    let (p, options) = seed_poll(&db, creator, false, &["a", "b"]);

    ballot::cast_ballot(
        &db,
        p.id,
        &VoterIdentity::Authenticated(voter),
        &pick(&options, &[0]),
    )
    .unwrap();
    ballot::cast_ballot(&db, p.id, &anon(3), &pick(&options, &[1])).unwrap();
    interest::follow_poll(&db, p.id, &VoterIdentity::Authenticated(follower)).unwrap();
    notify::record_notified(&db, follower, p.id, NotificationKind::ExpiringSoon, "msg-1").unwrap();

    poll::delete_poll(&db, p.id, creator).unwrap();

    assert!(matches!(
        tally::get_results(&db, p.id),
        Err(VoteError::NotFound(_))
    ));
    for table in ["ballots", "interests", "notifications", "options"] {
        assert_eq!(table_rows(&db, table, p.id), 0, "{table} not cleaned up");
    }
}

#[test]
fn voting_never_downgrades_an_existing_interest() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let voter = seed_user(&db, "sam");
    let follower = seed_user(&db, "kit");
    let (p, options) = seed_poll(&db, creator, false, &["a", "b"]);

    // Follower claims a stake, then votes.
    interest::follow_poll(&db, p.id, &VoterIdentity::Authenticated(follower)).unwrap();
    ballot::cast_ballot(
        &db,
        p.id,
        &VoterIdentity::Authenticated(follower),
        &pick(&options, &[0]),
    )
    .unwrap();

    // Creator votes on their own poll.
    ballot::cast_ballot(
        &db,
        p.id,
        &VoterIdentity::Authenticated(creator),
        &pick(&options, &[1]),
    )
    .unwrap();

    // A user with no prior stake votes.
    ballot::cast_ballot(
        &db,
        p.id,
        &VoterIdentity::Authenticated(voter),
        &pick(&options, &[0]),
    )
    .unwrap();

    let types_for = |user: Uuid| -> Vec<String> {
        db.with_read::<_, _, anyhow::Error>(|conn| {
            queries::interest_types_for(conn, &user.to_string(), &p.id.to_string())
        })
        .unwrap()
    };
    assert_eq!(types_for(follower), vec!["follower".to_string()]);
    assert_eq!(types_for(creator), vec!["creator".to_string()]);
    assert_eq!(types_for(voter), vec!["voter".to_string()]);
}

#[test]
fn unfollow_mutes_voters_and_deletes_pure_followers() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let voter = seed_user(&db, "sam");
    let follower = seed_user(&db, "kit");
    let (p, options) = seed_poll(&db, creator, false, &["a", "b"]);

    interest::follow_poll(&db, p.id, &VoterIdentity::Authenticated(follower)).unwrap();
    ballot::cast_ballot(
        &db,
        p.id,
        &VoterIdentity::Authenticated(voter),
        &pick(&options, &[0]),
    )
    .unwrap();

    interest::unfollow_poll(&db, p.id, &VoterIdentity::Authenticated(follower)).unwrap();
    interest::unfollow_poll(&db, p.id, &VoterIdentity::Authenticated(voter)).unwrap();

    // The pure follower's row is gone; the voter keeps a muted row.
    let (follower_types, voter_types, subscribed) = db
        .with_read::<_, _, anyhow::Error>(|conn| {
            Ok((
                queries::interest_types_for(conn, &follower.to_string(), &p.id.to_string())?,
                queries::interest_types_for(conn, &voter.to_string(), &p.id.to_string())?,
                queries::subscribed_users(conn, &p.id.to_string())?,
            ))
        })
        .unwrap();
    assert!(follower_types.is_empty());
    assert_eq!(voter_types, vec![InterestType::Voter.as_str().to_string()]);

    // Only the creator still gets emails.
    assert_eq!(subscribed.len(), 1);
    assert_eq!(subscribed[0].0, creator.to_string());

    // Nothing left to unfollow.
    assert!(matches!(
        interest::unfollow_poll(&db, p.id, &VoterIdentity::Authenticated(follower)),
        Err(VoteError::NotFound(_))
    ));
}

#[test]
fn eligibility_tracks_poll_and_voter_state() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let voter = seed_user(&db, "sam");
    let identity = VoterIdentity::Authenticated(voter);

    let missing = eligibility::check_eligibility(&db, Uuid::new_v4(), &identity).unwrap();
    assert!(!missing.can_vote);
    assert_eq!(missing.status, EligibilityStatus::NotFound);

    let (p, options) = seed_poll(&db, creator, false, &["a", "b"]);
    let fresh = eligibility::check_eligibility(&db, p.id, &identity).unwrap();
    assert!(fresh.can_vote);
    assert!(!fresh.has_voted);
    assert_eq!(fresh.status, EligibilityStatus::Eligible);

    ballot::cast_ballot(&db, p.id, &identity, &pick(&options, &[0])).unwrap();
    let voted = eligibility::check_eligibility(&db, p.id, &identity).unwrap();
    assert!(voted.can_vote);
    assert!(voted.has_voted);
    assert_eq!(voted.status, EligibilityStatus::CanChange);

    poll::close_poll(&db, p.id, creator).unwrap();
    let closed = eligibility::check_eligibility(&db, p.id, &identity).unwrap();
    assert!(!closed.can_vote);
    assert_eq!(closed.status, EligibilityStatus::Inactive);
}

#[test]
fn retraction_frees_the_voter_to_vote_again() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let voter = seed_user(&db, "sam");
    let (p, options) = seed_poll(&db, creator, false, &["a", "b"]);
    let identity = VoterIdentity::Authenticated(voter);

    ballot::cast_ballot(&db, p.id, &identity, &pick(&options, &[0])).unwrap();
    let (removed, total) = ballot::retract_ballot(&db, p.id, &identity).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(total, 0);

    assert!(matches!(
        ballot::retract_ballot(&db, p.id, &identity),
        Err(VoteError::NotFound(_))
    ));

    ballot::cast_ballot(&db, p.id, &identity, &pick(&options, &[1])).unwrap();
    assert_eq!(tally::get_results(&db, p.id).unwrap().total_votes, 1);
}

#[test]
fn totals_count_ballot_rows_and_match_the_per_option_sum() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let voter = seed_user(&db, "sam");
    let (p, options) = seed_poll(&db, creator, true, &["mon", "tue", "wed"]);

    ballot::cast_ballot(
        &db,
        p.id,
        &VoterIdentity::Authenticated(voter),
        &pick(&options, &[0, 1]),
    )
    .unwrap();
    ballot::cast_ballot(&db, p.id, &anon(5), &pick(&options, &[0])).unwrap();

    let results = tally::get_results(&db, p.id).unwrap();
    assert_eq!(results.total_votes, 3);
    assert_eq!(results.options[0].count, 2);
    assert_eq!(results.options[1].count, 1);
    assert_eq!(results.options[2].count, 0);

    let summed: i64 = results.options.iter().map(|o| o.count).sum();
    assert_eq!(summed, results.total_votes);

    let rows = table_rows(&db, "ballots", p.id);
    assert_eq!(rows, results.total_votes);

    // Percentages follow the same rows.
    assert!((results.options[0].percentage - 200.0 / 3.0).abs() < 1e-9);
    assert!((results.options[2].percentage - 0.0).abs() < 1e-9);
}

#[test]
fn options_in_a_vote_must_belong_to_the_poll() {
    let db = test_db();
    let creator = seed_user(&db, "creator");
    let (first, _) = seed_poll(&db, creator, false, &["a", "b"]);
    let (_, other_options) = seed_poll(&db, creator, false, &["x", "y"]);

    let err = ballot::cast_ballot(&db, first.id, &anon(1), &pick(&other_options, &[0]))
        .unwrap_err();
    assert!(matches!(err, VoteError::Validation(_)));
    assert_eq!(tally::get_results(&db, first.id).unwrap().total_votes, 0);
}
