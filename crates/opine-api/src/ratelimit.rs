use chrono::Utc;

use opine_core::VoteError;
use opine_db::{Database, queries};

/// Ballot submissions allowed per identity per window.
pub const VOTE_LIMIT: i64 = 10;
pub const VOTE_WINDOW_SECS: i64 = 60;

/// Fixed-window counter in the shared store. In-process maps would reset on
/// restart and diverge across instances; the table version survives both.
/// Returns false once the bucket exceeds its limit for the current window.
pub fn check(
    db: &Database,
    bucket: &str,
    limit: i64,
    window_secs: i64,
) -> Result<bool, VoteError> {
    let now = Utc::now().timestamp();
    let window_start = now - now.rem_euclid(window_secs);
    db.with_write(|conn| {
        let count = queries::bump_rate_counter(conn, bucket, window_start)?;
        // Windows two generations back are dead weight.
        queries::prune_rate_windows(conn, window_start - 2 * window_secs)?;
        Ok(count <= limit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_closes_after_limit() {
        let db = Database::open_in_memory().unwrap();
        for _ in 0..5 {
            assert!(check(&db, "vote:ip:203.0.113.9", 5, 60).unwrap());
        }
        assert!(!check(&db, "vote:ip:203.0.113.9", 5, 60).unwrap());
    }

    #[test]
    fn buckets_are_independent() {
        let db = Database::open_in_memory().unwrap();
        for _ in 0..3 {
            let _ = check(&db, "vote:ip:203.0.113.9", 2, 60).unwrap();
        }
        assert!(!check(&db, "vote:ip:203.0.113.9", 2, 60).unwrap());
        assert!(check(&db, "vote:ip:198.51.100.7", 2, 60).unwrap());
    }
}
