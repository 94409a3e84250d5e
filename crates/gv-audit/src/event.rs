// event.rs — Audit event data model.
//
// Every governance-relevant interaction (configuring a policy, activating
// it, disabling it, recording an evaluation) becomes one AuditEvent. Events
// for the same logical object form a chain: `previous_state_hash` is the
// link hash of the prior event for the same (tenant, object_type, object_id).
//
// Callers never construct an AuditEvent directly for writing. They fill in
// AuditEventFields; the writer assigns `event_id`, `timestamp` and the chain
// link.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuditError;

/// Who performed the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    Human,
    System,
}

/// Why the event was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Configure,
    Activate,
    Pause,
    Disable,
    /// A recorded evaluation. Describes, never changes, state.
    Simulate,
}

impl Intent {
    /// State-changing intents must carry `confirmation = true`.
    pub fn is_state_change(&self) -> bool {
        !matches!(self, Intent::Simulate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Configure => "CONFIGURE",
            Intent::Activate => "ACTIVATE",
            Intent::Pause => "PAUSE",
            Intent::Disable => "DISABLE",
            Intent::Simulate => "SIMULATE",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CONFIGURE" => Ok(Intent::Configure),
            "ACTIVATE" => Ok(Intent::Activate),
            "PAUSE" => Ok(Intent::Pause),
            "DISABLE" => Ok(Intent::Disable),
            "SIMULATE" => Ok(Intent::Simulate),
            other => Err(AuditError::InvalidEvent(format!("unknown intent '{}'", other))),
        }
    }
}

/// Identity of one hash chain: all events about the same object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainKey {
    pub tenant_id: String,
    pub object_type: String,
    pub object_id: String,
}

impl ChainKey {
    pub fn new(
        tenant_id: impl Into<String>,
        object_type: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.object_type, self.object_id)
    }
}

/// A single audit event: one record in the log. Never modified once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// UUID v7, so ids sort by creation time.
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub capability_id: String,
    pub intent: Intent,
    pub object_type: String,
    pub object_id: String,
    pub object_version: u64,
    /// Link hash of the previous event for the same object; None for the
    /// first event of a chain.
    pub previous_state_hash: Option<String>,
    pub new_state_hash: String,
    pub confirmation: bool,
    pub reason: String,
    /// Simulation / signal ids that justified the action.
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    /// Build an unlinked event from caller-supplied fields.
    pub fn from_fields(fields: AuditEventFields, event_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id,
            timestamp,
            tenant_id: fields.tenant_id,
            actor_id: fields.actor_id,
            actor_type: fields.actor_type,
            capability_id: fields.capability_id,
            intent: fields.intent,
            object_type: fields.object_type,
            object_id: fields.object_id,
            object_version: fields.object_version,
            previous_state_hash: None,
            new_state_hash: fields.new_state_hash,
            confirmation: fields.confirmation,
            reason: fields.reason,
            evidence_refs: fields.evidence_refs,
            metadata: fields.metadata,
        }
    }

    pub fn chain_key(&self) -> ChainKey {
        ChainKey::new(&self.tenant_id, &self.object_type, &self.object_id)
    }

    pub fn is_human(&self) -> bool {
        self.actor_type == ActorType::Human
    }

    /// Same checks as [`AuditEventFields::validate`], for already-built events.
    pub fn validate(&self) -> Result<(), AuditError> {
        check_required(&[
            ("tenant_id", &self.tenant_id),
            ("actor_id", &self.actor_id),
            ("capability_id", &self.capability_id),
            ("object_type", &self.object_type),
            ("object_id", &self.object_id),
            ("new_state_hash", &self.new_state_hash),
        ])?;
        check_confirmation(self.intent, self.confirmation)
    }
}

/// Everything the caller supplies when emitting an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEventFields {
    pub tenant_id: String,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub capability_id: String,
    pub intent: Intent,
    pub object_type: String,
    pub object_id: String,
    #[serde(default)]
    pub object_version: u64,
    pub new_state_hash: String,
    #[serde(default)]
    pub confirmation: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AuditEventFields {
    /// Start a record. `confirmation` defaults to false; state-changing
    /// intents must call [`confirmed`](Self::confirmed).
    pub fn new(
        tenant_id: impl Into<String>,
        actor_id: impl Into<String>,
        actor_type: ActorType,
        capability_id: impl Into<String>,
        intent: Intent,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_id: actor_id.into(),
            actor_type,
            capability_id: capability_id.into(),
            intent,
            object_type: String::new(),
            object_id: String::new(),
            object_version: 0,
            new_state_hash: String::new(),
            confirmation: false,
            reason: String::new(),
            evidence_refs: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Set the object this event is about.
    pub fn with_object(
        mut self,
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        object_version: u64,
    ) -> Self {
        self.object_type = object_type.into();
        self.object_id = object_id.into();
        self.object_version = object_version;
        self
    }

    pub fn with_new_state_hash(mut self, hash: impl Into<String>) -> Self {
        self.new_state_hash = hash.into();
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmation = true;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_evidence(mut self, evidence_ref: impl Into<String>) -> Self {
        self.evidence_refs.push(evidence_ref.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn chain_key(&self) -> ChainKey {
        ChainKey::new(&self.tenant_id, &self.object_type, &self.object_id)
    }

    /// Reject the write before it reaches storage.
    pub fn validate(&self) -> Result<(), AuditError> {
        check_required(&[
            ("tenant_id", &self.tenant_id),
            ("actor_id", &self.actor_id),
            ("capability_id", &self.capability_id),
            ("object_type", &self.object_type),
            ("object_id", &self.object_id),
            ("new_state_hash", &self.new_state_hash),
        ])?;
        check_confirmation(self.intent, self.confirmation)
    }
}

fn check_required(fields: &[(&str, &String)]) -> Result<(), AuditError> {
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(AuditError::InvalidEvent(format!("{} must not be empty", name)));
        }
    }
    Ok(())
}

fn check_confirmation(intent: Intent, confirmation: bool) -> Result<(), AuditError> {
    if intent.is_state_change() && !confirmation {
        return Err(AuditError::ConfirmationRequired { intent });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activation() -> AuditEventFields {
        AuditEventFields::new("acme", "alice", ActorType::Human, "policy.lifecycle", Intent::Activate)
            .with_object("policy", "CostSpikeGuard", 1)
            .with_new_state_hash("abc")
            .with_reason("approved in change review")
    }

    #[test]
    fn state_changes_require_confirmation() {
        let err = activation().validate().unwrap_err();
        assert!(matches!(
            err,
            AuditError::ConfirmationRequired {
                intent: Intent::Activate
            }
        ));
        assert!(activation().confirmed().validate().is_ok());
    }

    #[test]
    fn simulate_does_not_require_confirmation() {
        let mut fields = activation();
        fields.intent = Intent::Simulate;
        assert!(fields.validate().is_ok());
    }

    #[test]
    fn empty_required_fields_are_rejected() {
        let fields = AuditEventFields::new("acme", "alice", ActorType::Human, "cap", Intent::Simulate)
            .with_new_state_hash("h");
        let err = fields.validate().unwrap_err();
        assert!(err.to_string().contains("object_type"));
    }

    #[test]
    fn enums_serialize_upper_case() {
        assert_eq!(serde_json::to_string(&Intent::Simulate).unwrap(), "\"SIMULATE\"");
        assert_eq!(serde_json::to_string(&ActorType::Human).unwrap(), "\"HUMAN\"");
        assert_eq!("disable".parse::<Intent>().unwrap(), Intent::Disable);
    }

    #[test]
    fn event_serialization_round_trip() {
        let event = AuditEvent::from_fields(
            activation().confirmed().with_evidence("sim-1"),
            Uuid::now_v7(),
            Utc::now(),
        );
        let json = serde_json::to_string(&event).unwrap();
        let restored: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, restored);
        assert_eq!(restored.chain_key().to_string(), "acme/policy/CostSpikeGuard");
    }
}
