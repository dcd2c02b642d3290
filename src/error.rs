//! Error kinds for the ingest pipeline.
//!
//! Adapters, the browser pool and the store gateway return `IngestError`;
//! the scheduler decides per kind whether a failure is logged quietly,
//! loudly, or (at startup only) fatal.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

/// SQLSTATE codes that mean the schema does not match what the gateway expects.
const SCHEMA_SQLSTATES: &[&str] = &["42P01", "42703", "42804", "42P10"];

#[derive(Error, Debug)]
pub enum IngestError {
    /// Timeout, 5xx, connection reset, navigation failure.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Payload did not have the expected shape.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Connection loss, pool exhaustion, serialization failure.
    #[error("database error: {0}")]
    PersistTransient(String),

    /// Missing table/column or type mismatch. Migrations are external.
    #[error("database schema mismatch: {0}")]
    PersistSchema(String),

    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn is_schema(&self) -> bool {
        matches!(self, IngestError::PersistSchema(_))
    }

    pub fn is_browser(&self) -> bool {
        matches!(self, IngestError::BrowserUnavailable(_))
    }

    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Fetch(_) => "fetch",
            IngestError::Parse(_) => "parse",
            IngestError::PersistTransient(_) => "persist",
            IngestError::PersistSchema(_) => "schema",
            IngestError::BrowserUnavailable(_) => "browser",
            IngestError::Config(_) => "config",
        }
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if let Some(code) = db.code() {
                if SCHEMA_SQLSTATES.iter().any(|c| *c == code) {
                    return IngestError::PersistSchema(db.message().to_string());
                }
            }
        }
        match err {
            sqlx::Error::ColumnNotFound(col) => {
                IngestError::PersistSchema(format!("column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                IngestError::PersistSchema(format!("column {} decode: {}", index, source))
            }
            other => IngestError::PersistTransient(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            IngestError::Parse(err.to_string())
        } else {
            IngestError::Fetch(err.to_string())
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Parse(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for IngestError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        use chromiumoxide::error::CdpError;
        match err {
            CdpError::Timeout => IngestError::Fetch("browser operation timed out".to_string()),
            CdpError::ChannelSendError(_) | CdpError::NoResponse | CdpError::Ws(_) => {
                IngestError::BrowserUnavailable(err.to_string())
            }
            other => IngestError::Fetch(other.to_string()),
        }
    }
}
