//! # gv-audit
//!
//! Append-only, hash-chained audit log for governance decisions.
//!
//! Every governance-relevant interaction is recorded as an [`AuditEvent`].
//! Events about the same object form a chain through
//! `previous_state_hash`, so any retroactive edit is detectable.
//!
//! - [`AuditWriter`] is the synchronous path: validate, link, append.
//! - [`AuditDispatcher`] is the non-blocking path used by governed
//!   operations: bounded queue, retry with backoff, durable spool, alerts.
//! - [`AuditReader`] is the read-only view handed to replay.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gv_audit::{ActorType, AuditEventFields, AuditWriter, Intent, JsonlAuditStore};
//!
//! let store = Arc::new(JsonlAuditStore::open("/tmp/audit.jsonl").unwrap());
//! let writer = AuditWriter::new(store).unwrap();
//! let fields = AuditEventFields::new("acme", "alice", ActorType::Human, "policy.lifecycle", Intent::Activate)
//!     .with_object("policy", "BudgetEnforcement", 2)
//!     .with_new_state_hash("9f2c...")
//!     .with_reason("approved after a week in MONITOR")
//!     .confirmed();
//! let event_id = writer.emit(fields).unwrap();
//! ```
//!
//! ## Key invariants
//!
//! - **Append-only**: `update`, `delete` and duplicate ids fail with
//!   [`AuditError::ImmutabilityViolation`].
//! - **Confirmation**: state-changing intents without `confirmation = true`
//!   are rejected before reaching storage.
//! - **Serialized chains**: extension of one object's chain is serialized;
//!   different objects write independently.

pub mod attestation;
pub mod chain;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod hasher;
pub mod store;
pub mod writer;

pub use attestation::{verify_checkpoint, ChainAttestor, ChainCheckpoint};
pub use chain::{link_hash, verify_all, verify_chain, ChainBreak, ChainVerification};
pub use dispatcher::{
    AlertSink, AuditDispatcher, DispatchStats, DispatcherConfig, RetryPolicy, Spool,
    TracingAlertSink,
};
pub use error::{AuditError, Mutation};
pub use event::{ActorType, AuditEvent, AuditEventFields, ChainKey, Intent};
pub use store::{AuditReader, AuditStore, JsonlAuditStore, MemoryAuditStore};
pub use writer::AuditWriter;
