//! Shared types for the Opine voting platform.
//!
//! Everything that crosses a crate boundary lives here: domain models,
//! request/response payloads, and the voter identity value the whole
//! integrity pipeline keys on.

pub mod api;
pub mod identity;
pub mod models;
