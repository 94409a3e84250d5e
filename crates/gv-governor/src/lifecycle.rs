// lifecycle.rs — Policy lifecycle states and deployments.
//
// A registered policy version starts in DRAFT and only ever moves forward:
//   DRAFT → MONITOR → ENFORCE
//   MONITOR | ENFORCE → DISABLED
// A version declared `mode MONITOR` stops at MONITOR.
//
// Deployments change state only through an ActivationReceipt, and only the
// governor can construct one, after the matching audit event is committed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gv_audit::hasher::hash_str;
use gv_policy::{Mode, PolicyDefinition};

use crate::error::GovernorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyState {
    Draft,
    Monitor,
    Enforce,
    Disabled,
}

impl fmt::Display for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyState::Draft => write!(f, "DRAFT"),
            PolicyState::Monitor => write!(f, "MONITOR"),
            PolicyState::Enforce => write!(f, "ENFORCE"),
            PolicyState::Disabled => write!(f, "DISABLED"),
        }
    }
}

impl PolicyState {
    /// Check whether moving from this state to `next` is valid.
    pub fn can_transition_to(&self, next: &PolicyState) -> bool {
        matches!(
            (self, next),
            (PolicyState::Draft, PolicyState::Monitor)
                | (PolicyState::Monitor, PolicyState::Enforce)
                | (PolicyState::Monitor, PolicyState::Disabled)
                | (PolicyState::Enforce, PolicyState::Disabled)
        )
    }

    /// MONITOR or ENFORCE.
    pub fn is_live(&self) -> bool {
        matches!(self, PolicyState::Monitor | PolicyState::Enforce)
    }

    /// The state `activate` moves to from here, if any.
    pub fn next_activation(&self) -> Option<PolicyState> {
        match self {
            PolicyState::Draft => Some(PolicyState::Monitor),
            PolicyState::Monitor => Some(PolicyState::Enforce),
            PolicyState::Enforce | PolicyState::Disabled => None,
        }
    }
}

/// Hash identifying a policy version in a lifecycle state. Recorded as
/// `new_state_hash` on lifecycle and evaluation events.
pub fn state_hash(policy: &PolicyDefinition, state: PolicyState) -> String {
    hash_str(&format!("{}\n{}", policy.canonical_source(), state))
}

/// Proof that a lifecycle audit event was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReceipt {
    event_id: Uuid,
    policy: String,
    version: u32,
    from: PolicyState,
    to: PolicyState,
}

impl ActivationReceipt {
    pub(crate) fn new(
        event_id: Uuid,
        policy: impl Into<String>,
        version: u32,
        from: PolicyState,
        to: PolicyState,
    ) -> Self {
        Self {
            event_id,
            policy: policy.into(),
            version,
            from,
            to,
        }
    }

    /// Id of the audit event that authorized the transition.
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn policy(&self) -> &str {
        &self.policy
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn from(&self) -> PolicyState {
        self.from
    }

    pub fn to(&self) -> PolicyState {
        self.to
    }
}

/// One registered policy version and where it is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deployment {
    pub policy: PolicyDefinition,
    pub state: PolicyState,
    pub state_hash: String,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Audit event behind the current state.
    pub last_event_id: Uuid,
}

impl Deployment {
    pub(crate) fn draft(policy: PolicyDefinition, event_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            state_hash: state_hash(&policy, PolicyState::Draft),
            policy,
            state: PolicyState::Draft,
            registered_at: now,
            updated_at: now,
            last_event_id: event_id,
        }
    }

    pub fn name(&self) -> &str {
        self.policy.name()
    }

    pub fn version(&self) -> u32 {
        self.policy.version()
    }

    /// Check that `to` is reachable from the current state for this policy.
    pub fn check_transition(&self, to: PolicyState) -> Result<(), GovernorError> {
        if !self.state.can_transition_to(&to) {
            return Err(GovernorError::InvalidTransition {
                name: self.name().to_string(),
                version: self.version(),
                from: self.state,
                to,
            });
        }
        if to == PolicyState::Enforce && self.policy.mode() == Mode::Monitor {
            return Err(GovernorError::ModeCeiling {
                name: self.name().to_string(),
                version: self.version(),
            });
        }
        Ok(())
    }

    /// Apply a committed transition.
    pub(crate) fn apply(&mut self, receipt: &ActivationReceipt) -> Result<(), GovernorError> {
        if receipt.from != self.state {
            return Err(GovernorError::InvalidTransition {
                name: self.name().to_string(),
                version: self.version(),
                from: self.state,
                to: receipt.to,
            });
        }
        self.check_transition(receipt.to)?;
        self.state = receipt.to;
        self.state_hash = state_hash(&self.policy, receipt.to);
        self.updated_at = Utc::now();
        self.last_event_id = receipt.event_id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(mode: &str) -> PolicyDefinition {
        gv_policy::compile(&format!(
            "policy P version 1 mode {}; when x > 1 then warn \"x\"",
            mode
        ))
        .unwrap()
    }

    #[test]
    fn forward_only_transitions() {
        use PolicyState::*;
        assert!(Draft.can_transition_to(&Monitor));
        assert!(Monitor.can_transition_to(&Enforce));
        assert!(Monitor.can_transition_to(&Disabled));
        assert!(Enforce.can_transition_to(&Disabled));

        assert!(!Draft.can_transition_to(&Enforce));
        assert!(!Enforce.can_transition_to(&Monitor));
        assert!(!Disabled.can_transition_to(&Monitor));
        assert!(!Draft.can_transition_to(&Disabled));
    }

    #[test]
    fn monitor_policy_cannot_be_enforced() {
        let mut dep = Deployment::draft(policy("MONITOR"), Uuid::nil());
        dep.apply(&ActivationReceipt::new(
            Uuid::now_v7(),
            "P",
            1,
            PolicyState::Draft,
            PolicyState::Monitor,
        ))
        .unwrap();
        assert!(matches!(
            dep.check_transition(PolicyState::Enforce),
            Err(GovernorError::ModeCeiling { .. })
        ));
    }

    #[test]
    fn apply_updates_state_hash_and_event() {
        let mut dep = Deployment::draft(policy("ENFORCE"), Uuid::nil());
        let draft_hash = dep.state_hash.clone();
        let receipt = ActivationReceipt::new(
            Uuid::now_v7(),
            "P",
            1,
            PolicyState::Draft,
            PolicyState::Monitor,
        );
        dep.apply(&receipt).unwrap();
        assert_eq!(dep.state, PolicyState::Monitor);
        assert_ne!(dep.state_hash, draft_hash);
        assert_eq!(dep.last_event_id, receipt.event_id());
    }

    #[test]
    fn stale_receipt_is_refused() {
        let mut dep = Deployment::draft(policy("ENFORCE"), Uuid::nil());
        let stale = ActivationReceipt::new(
            Uuid::now_v7(),
            "P",
            1,
            PolicyState::Monitor,
            PolicyState::Enforce,
        );
        assert!(dep.apply(&stale).is_err());
        assert_eq!(dep.state, PolicyState::Draft);
    }
}
