//! # gv-governor
//!
//! Lifecycle and activation for governance policies.
//!
//! The [`Governor`] is the single entry point applications use. It compiles
//! policy source with `gv-policy`, keeps a versioned [`PolicyRegistry`],
//! records every lifecycle change through `gv-audit`, and answers history
//! questions through `gv-replay`.
//!
//! ## Lifecycle
//!
//! ```text
//! DRAFT ──activate──▶ MONITOR ──activate──▶ ENFORCE
//!                        │                     │
//!                        └──────disable────────┴──▶ DISABLED
//! ```
//!
//! Every arrow requires `confirmation = true` and a reason, and activation
//! requires a human actor. A policy declared `mode MONITOR` stops at
//! MONITOR. Outcomes are marked `enforced` only in ENFORCE; before that a
//! `block` action is advisory.
//!
//! ## Quick Example
//!
//! ```rust
//! use gv_governor::{ActorContext, Governor, GovernorConfig};
//! use gv_policy::FactSnapshot;
//!
//! let gov = Governor::in_memory(GovernorConfig::default()).unwrap();
//! let alice = ActorContext::human("alice");
//! gov.register(
//!     &alice,
//!     "policy BudgetEnforcement version 1 scope ORG mode ENFORCE; \
//!      when monthly_spend >= budget_limit then block",
//!     true,
//!     "new quarterly budget",
//! )
//! .unwrap();
//! gov.activate(&alice, "BudgetEnforcement", 1, true, "observe first").unwrap();
//!
//! let facts = FactSnapshot::new()
//!     .with("monthly_spend", 1200.0)
//!     .with("budget_limit", 1000.0);
//! let outcome = gov.evaluate("BudgetEnforcement", &facts).unwrap();
//! assert!(outcome.outcome.blocks());
//! assert!(!outcome.blocks()); // still in MONITOR
//! ```

pub mod catalog;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod governor;
pub mod lifecycle;
pub mod registry;

pub use catalog::{
    signal_facts, CapabilityCatalog, Signal, SignalCatalog, SignalFacts, StaticCapabilityCatalog,
    StaticSignalCatalog, EVALUATE_CAPABILITY, LIFECYCLE_CAPABILITY,
};
pub use config::GovernorConfig;
pub use cooldown::CooldownState;
pub use error::GovernorError;
pub use governor::{ActorContext, GovernedOutcome, Governor, POLICY_OBJECT_TYPE};
pub use lifecycle::{state_hash, ActivationReceipt, Deployment, PolicyState};
pub use registry::PolicyRegistry;
