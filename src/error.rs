//! Per-period failure taxonomy.
//!
//! Every stage of the pipeline returns [`ErrorKind`] so the orchestrator can
//! decide whether a failure ends one period or the whole source. Row-level
//! problems never surface here; they are dropped with a warning where they
//! occur.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ErrorKind {
    /// No download candidate could be built for a source. Config bug.
    #[error("locator resolution failed: {0}")]
    LocatorResolution(String),

    /// Every candidate failed at the network or HTTP level.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Corrupt archive or no eligible member inside it.
    #[error("archive error: {0}")]
    Archive(String),

    #[error("decode error: {0}")]
    Decode(String),

    /// Structural parse failure, even after the header-less retry.
    #[error("parse error: {0}")]
    Parse(String),

    /// A required structural field (date or slot) could not be mapped.
    #[error("schema mapping error: {0}")]
    SchemaMapping(String),

    /// Batch transaction failed and was rolled back.
    #[error("persist error: {0}")]
    Persist(String),
}

pub type Result<T> = std::result::Result<T, ErrorKind>;

impl ErrorKind {
    /// Short, stable name used in per-period summaries.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::LocatorResolution(_) => "LocatorResolutionError",
            ErrorKind::Fetch(_) => "FetchError",
            ErrorKind::Archive(_) => "ArchiveError",
            ErrorKind::Decode(_) => "DecodeError",
            ErrorKind::Parse(_) => "ParseError",
            ErrorKind::SchemaMapping(_) => "SchemaMappingError",
            ErrorKind::Persist(_) => "PersistError",
        }
    }

    /// Whether the failure makes every remaining period of the same source
    /// pointless to attempt.
    pub fn is_fatal_to_source(&self) -> bool {
        matches!(self, ErrorKind::LocatorResolution(_))
    }
}

impl From<duckdb::Error> for ErrorKind {
    fn from(e: duckdb::Error) -> Self {
        ErrorKind::Persist(e.to_string())
    }
}
