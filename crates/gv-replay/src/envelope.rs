// envelope.rs — The read-only result of a replay query.
//
// Everything here is derived from stored events: who acted, what evidence
// they cited, which state hash moved to which, and what reason they gave.
// None of these types carries a policy or an evaluation result, so an
// envelope can describe history but never judge it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gv_audit::{ActorType, AuditEvent, ChainKey, Intent};

use crate::query::ReplayQuery;

/// One line of "who did what, and why".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub intent: Intent,
    pub object: ChainKey,
    pub object_version: u64,
    pub confirmation: bool,
    pub reason: String,
    pub evidence_refs: Vec<String>,
}

impl From<&AuditEvent> for TimelineEntry {
    fn from(e: &AuditEvent) -> Self {
        Self {
            event_id: e.event_id,
            timestamp: e.timestamp,
            actor_id: e.actor_id.clone(),
            actor_type: e.actor_type,
            intent: e.intent,
            object: e.chain_key(),
            object_version: e.object_version,
            confirmation: e.confirmation,
            reason: e.reason.clone(),
            evidence_refs: e.evidence_refs.clone(),
        }
    }
}

/// How one event moved its object's recorded state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub object: ChainKey,
    pub event_id: Uuid,
    pub intent: Intent,
    /// `new_state_hash` of the object's previous event; None at creation.
    pub from_state: Option<String>,
    pub to_state: String,
    /// The event left the recorded state as it was.
    pub unchanged: bool,
}

/// Aggregates over the returned events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub total_events: usize,
    pub by_intent: BTreeMap<Intent, usize>,
    pub actors: BTreeSet<String>,
    pub objects: BTreeSet<ChainKey>,
    pub human_events: usize,
    pub system_events: usize,
    pub first_event_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl ReplaySummary {
    pub fn from_events(events: &[AuditEvent]) -> Self {
        let mut summary = ReplaySummary {
            total_events: events.len(),
            ..Default::default()
        };
        for e in events {
            *summary.by_intent.entry(e.intent).or_default() += 1;
            summary.actors.insert(e.actor_id.clone());
            summary.objects.insert(e.chain_key());
            match e.actor_type {
                ActorType::Human => summary.human_events += 1,
                ActorType::System => summary.system_events += 1,
            }
            summary.first_event_at = Some(
                summary
                    .first_event_at
                    .map_or(e.timestamp, |t| t.min(e.timestamp)),
            );
            summary.last_event_at = Some(
                summary
                    .last_event_at
                    .map_or(e.timestamp, |t| t.max(e.timestamp)),
            );
        }
        summary
    }
}

/// A chain that failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityBreak {
    pub chain_key: ChainKey,
    /// Position of the first mismatching link in the object's full history.
    pub position: usize,
    pub event_id: Uuid,
    pub expected: Option<String>,
    pub actual: Option<String>,
    /// Matching events left out of the envelope because they are not
    /// covered by the verified prefix.
    pub withheld: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEnvelope {
    pub query: ReplayQuery,
    /// Number of events in the store when the query started. Later writes
    /// are not part of this answer.
    pub watermark: usize,
    /// Matching events in append order.
    pub events: Vec<AuditEvent>,
    pub timeline: Vec<TimelineEntry>,
    pub transitions: Vec<StateTransition>,
    pub summary: ReplaySummary,
    /// Empty unless verification was requested and a chain broke.
    pub integrity_breaks: Vec<IntegrityBreak>,
}

impl ReplayEnvelope {
    pub fn is_intact(&self) -> bool {
        self.integrity_breaks.is_empty()
    }
}
