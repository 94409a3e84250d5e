// error.rs — Error types for replay queries.
//
// Integrity breaks are not errors: they are reported inside the envelope
// next to the verified prefix. Errors here mean the query itself could not
// be answered.

use chrono::{DateTime, Utc};
use thiserror::Error;

use gv_audit::AuditError;

#[derive(Debug, Error)]
pub enum ReplayError {
    /// Reading the audit log failed.
    #[error("audit read failed: {0}")]
    Audit(#[from] AuditError),

    /// `start` must be strictly before `end`.
    #[error("invalid time range: {start} is not before {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
