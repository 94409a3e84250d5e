// error.rs — Error types for the governor.
//
// Compile, audit and replay errors pass through unchanged so callers can
// still match on DSL codes or `ImmutabilityViolation`. Lifecycle errors are
// specific about which rule refused the request.

use std::path::PathBuf;

use thiserror::Error;

use gv_audit::AuditError;
use gv_policy::CompileErrors;
use gv_replay::ReplayError;

use crate::lifecycle::PolicyState;

#[derive(Debug, Error)]
pub enum GovernorError {
    #[error(transparent)]
    Compile(#[from] CompileErrors),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),

    #[error("policy '{name}' version {version} is not registered")]
    PolicyNotFound { name: String, version: u32 },

    #[error("policy '{name}' has no version that can be evaluated")]
    NoEvaluableVersion { name: String },

    #[error("policy '{name}' version {version} must be greater than registered version {latest}")]
    VersionNotIncreasing {
        name: String,
        version: u32,
        latest: u32,
    },

    #[error("policy '{name}' version {version} cannot move from {from} to {to}")]
    InvalidTransition {
        name: String,
        version: u32,
        from: PolicyState,
        to: PolicyState,
    },

    #[error("policy '{name}' version {version} is declared mode MONITOR and cannot be enforced")]
    ModeCeiling { name: String, version: u32 },

    #[error("explicit confirmation is required to {action}")]
    ConfirmationRequired { action: String },

    #[error("a reason is required to {action}")]
    ReasonRequired { action: String },

    #[error("{action} must be performed by a human actor")]
    HumanRequired { action: String },

    #[error("unknown capability '{0}'")]
    UnknownCapability(String),

    #[error("governor serves tenant '{expected}', event is for '{actual}'")]
    TenantMismatch { expected: String, actual: String },

    #[error("unknown severity '{severity}' on signal '{signal}'")]
    UnknownSeverity { signal: String, severity: String },

    #[error("signal '{signal}' has confidence {confidence}; expected a value in [0, 1]")]
    InvalidConfidence { signal: String, confidence: f64 },

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("governor lock poisoned: {0}")]
    LockPoisoned(String),
}

pub(crate) fn poisoned<T>(err: std::sync::PoisonError<T>) -> GovernorError {
    GovernorError::LockPoisoned(err.to_string())
}
