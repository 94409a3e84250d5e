//! # gv-replay
//!
//! Read-only replay over the governance audit log.
//!
//! A [`ReplayEngine`] answers descriptive questions about recorded history:
//! who acted, what evidence they cited, what changed, what did not change,
//! and what reason was recorded. It is built on [`gv_audit::AuditReader`]
//! alone and has no access to policies or the evaluator, so it cannot answer
//! "what should have happened" or "what would happen now".
//!
//! Chain verification is available on request through
//! [`ReplayEngine::replay_verified`]; a broken chain is reported next to the
//! verified prefix instead of failing the query.

pub mod engine;
pub mod envelope;
pub mod error;
pub mod query;

pub use engine::ReplayEngine;
pub use envelope::{
    IntegrityBreak, ReplayEnvelope, ReplaySummary, StateTransition, TimelineEntry,
};
pub use error::ReplayError;
pub use query::{ReplayFilter, ReplayQuery, TimeRange};
