//! Live sports ingestion: polls several sources for in-play matches,
//! normalizes them into one record shape and upserts them into per-sport
//! Postgres tables.

pub mod adapters;
pub mod browser;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod model;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod status;
pub mod store;

pub use config::Config;
pub use context::IngestContext;
pub use error::{IngestError, Result};
