//! Canonical match record, status normalization, odds extraction and team caches.

pub mod odds;
pub mod record;
pub mod status;
pub mod teams;

pub use record::{MatchRecord, OtherOdds, PrimaryOdds, Sport, StatusCode};
pub use teams::{TeamCache, TeamDirectory};
