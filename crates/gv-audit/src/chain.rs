// chain.rs — Per-object hash chains.
//
// The link hash of an event is the SHA-256 of the canonical JSON of every
// persisted field, including its own `previous_state_hash`. The next event
// for the same ChainKey stores that hash as its `previous_state_hash`, so
// editing, inserting or removing any event breaks the link that follows it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuditError;
use crate::event::{AuditEvent, ChainKey};
use crate::hasher;

/// Hash that the successor of `event` must carry as `previous_state_hash`.
pub fn link_hash(event: &AuditEvent) -> Result<String, AuditError> {
    hasher::hash_json(event)
}

/// Where a chain stopped matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    pub chain_key: ChainKey,
    /// Zero-based position within the object's events.
    pub position: usize,
    /// The event whose `previous_state_hash` did not match.
    pub event_id: Uuid,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl ChainBreak {
    /// How many leading events can still be trusted.
    ///
    /// A mismatch at `position` means either that event's link or its
    /// predecessor's content was altered, so the predecessor is excluded too.
    pub fn trusted_len(&self) -> usize {
        self.position.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainVerification {
    Intact {
        events: usize,
        head: Option<String>,
    },
    Broken(ChainBreak),
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        matches!(self, ChainVerification::Intact { .. })
    }
}

/// Verify the events of one chain, in append order.
pub fn verify_chain(
    chain_key: &ChainKey,
    events: &[&AuditEvent],
) -> Result<ChainVerification, AuditError> {
    let mut expected: Option<String> = None;
    for (position, event) in events.iter().enumerate() {
        if event.previous_state_hash != expected {
            return Ok(ChainVerification::Broken(ChainBreak {
                chain_key: chain_key.clone(),
                position,
                event_id: event.event_id,
                expected,
                actual: event.previous_state_hash.clone(),
            }));
        }
        expected = Some(link_hash(event)?);
    }
    Ok(ChainVerification::Intact {
        events: events.len(),
        head: expected,
    })
}

/// Group events by chain, preserving append order inside each chain.
pub fn group_by_chain(events: &[AuditEvent]) -> BTreeMap<ChainKey, Vec<&AuditEvent>> {
    let mut chains: BTreeMap<ChainKey, Vec<&AuditEvent>> = BTreeMap::new();
    for event in events {
        chains.entry(event.chain_key()).or_default().push(event);
    }
    chains
}

/// Verify every chain present in `events`.
pub fn verify_all(
    events: &[AuditEvent],
) -> Result<BTreeMap<ChainKey, ChainVerification>, AuditError> {
    group_by_chain(events)
        .into_iter()
        .map(|(key, chain)| {
            let verdict = verify_chain(&key, &chain)?;
            Ok((key, verdict))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ActorType, AuditEventFields, Intent};
    use chrono::Utc;

    fn linked(count: usize, object: &str) -> Vec<AuditEvent> {
        let mut out: Vec<AuditEvent> = Vec::new();
        for i in 0..count {
            let fields =
                AuditEventFields::new("t1", "ops", ActorType::System, "cap", Intent::Simulate)
                    .with_object("policy", object, i as u64)
                    .with_new_state_hash(format!("state-{}", i));
            let mut event = AuditEvent::from_fields(fields, Uuid::now_v7(), Utc::now());
            event.previous_state_hash = out.last().map(|p| link_hash(p).unwrap());
            out.push(event);
        }
        out
    }

    #[test]
    fn intact_chain_reports_head() {
        let events = linked(3, "p");
        let key = events[0].chain_key();
        let refs: Vec<_> = events.iter().collect();
        let verdict = verify_chain(&key, &refs).unwrap();
        assert_eq!(
            verdict,
            ChainVerification::Intact {
                events: 3,
                head: Some(link_hash(&events[2]).unwrap())
            }
        );
    }

    #[test]
    fn edited_event_breaks_the_next_link() {
        let mut events = linked(4, "p");
        events[1].reason = "rewritten".into();
        let key = events[0].chain_key();
        let refs: Vec<_> = events.iter().collect();
        let ChainVerification::Broken(brk) = verify_chain(&key, &refs).unwrap() else {
            panic!("tampering not detected");
        };
        assert_eq!(brk.position, 2);
        assert_eq!(brk.event_id, events[2].event_id);
        assert_eq!(brk.trusted_len(), 1);
    }

    #[test]
    fn removed_event_is_detected() {
        let mut events = linked(3, "p");
        events.remove(1);
        let key = events[0].chain_key();
        let refs: Vec<_> = events.iter().collect();
        assert!(!verify_chain(&key, &refs).unwrap().is_intact());
    }

    #[test]
    fn chains_are_independent_per_object() {
        let mut events = linked(2, "a");
        events.extend(linked(2, "b"));
        let verdicts = verify_all(&events).unwrap();
        assert_eq!(verdicts.len(), 2);
        assert!(verdicts.values().all(ChainVerification::is_intact));
    }
}
