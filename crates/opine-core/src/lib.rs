//! The voting integrity engine.
//!
//! Every rule that decides whether a ballot counts lives here, behind plain
//! functions that know nothing about HTTP. The flow for a vote is:
//! resolve the identity, optionally pre-check eligibility, then let the
//! ballot writer re-validate everything inside a single write transaction.
//! Tallies, interest tracking and the notification ledger ride on the same
//! store.

pub mod ballot;
pub mod eligibility;
pub mod error;
pub mod identity;
pub mod interest;
pub mod notify;
pub mod poll;
pub mod tally;

pub use error::VoteError;
