// engine.rs — The replay engine.
//
// ReplayEngine holds nothing but an `AuditReader`. It cannot append, cannot
// evaluate a policy and cannot see one, so it can only answer descriptive
// questions about what was recorded.
//
// Each query works on a single snapshot taken at the start. Events written
// while the query runs are simply not part of the answer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{instrument, Level};
use uuid::Uuid;

use gv_audit::chain::group_by_chain;
use gv_audit::{verify_chain, AuditEvent, AuditReader, ChainKey, ChainVerification};

use crate::envelope::{IntegrityBreak, ReplayEnvelope, ReplaySummary, StateTransition, TimelineEntry};
use crate::error::ReplayError;
use crate::query::{ReplayFilter, ReplayQuery, TimeRange};

pub struct ReplayEngine {
    reader: Arc<dyn AuditReader>,
}

impl ReplayEngine {
    pub fn new(reader: Arc<dyn AuditReader>) -> Self {
        Self { reader }
    }

    /// Matching events in `range`, with timeline, transitions and summary.
    #[instrument(level = Level::DEBUG, skip(self))]
    pub fn replay(
        &self,
        range: TimeRange,
        filter: ReplayFilter,
    ) -> Result<ReplayEnvelope, ReplayError> {
        let snapshot = self.reader.snapshot()?;
        let query = ReplayQuery {
            range,
            filter,
            verify: false,
        };
        Ok(build(query, &snapshot, &HashSet::new(), Vec::new()))
    }

    /// Like [`replay`](Self::replay), but first verifies the complete chain
    /// of every object that has a matching event.
    ///
    /// A broken chain does not fail the query: its events up to the last
    /// trusted position are returned, later ones are withheld and listed in
    /// an [`IntegrityBreak`].
    #[instrument(level = Level::DEBUG, skip(self))]
    pub fn replay_verified(
        &self,
        range: TimeRange,
        filter: ReplayFilter,
    ) -> Result<ReplayEnvelope, ReplayError> {
        let snapshot = self.reader.snapshot()?;
        let query = ReplayQuery {
            range,
            filter,
            verify: true,
        };

        let mut withheld = HashSet::new();
        let mut breaks = Vec::new();
        for (key, chain) in group_by_chain(&snapshot) {
            if !chain.iter().any(|e| query.selects(e)) {
                continue;
            }
            let ChainVerification::Broken(brk) = verify_chain(&key, &chain)? else {
                continue;
            };
            let ids: Vec<Uuid> = chain[brk.trusted_len()..]
                .iter()
                .filter(|e| query.selects(e))
                .map(|e| e.event_id)
                .collect();
            tracing::warn!(
                chain = %key,
                position = brk.position,
                event_id = %brk.event_id,
                withheld = ids.len(),
                "audit chain failed verification"
            );
            withheld.extend(ids.iter().copied());
            breaks.push(IntegrityBreak {
                chain_key: key,
                position: brk.position,
                event_id: brk.event_id,
                expected: brk.expected,
                actual: brk.actual,
                withheld: ids,
            });
        }

        Ok(build(query, &snapshot, &withheld, breaks))
    }

    /// Which of `candidates` have no recorded event in `range`.
    ///
    /// This answers "what did not change" for a known set of objects.
    pub fn quiet_objects(
        &self,
        range: TimeRange,
        candidates: &[ChainKey],
    ) -> Result<Vec<ChainKey>, ReplayError> {
        let active: HashSet<ChainKey> = self
            .reader
            .snapshot()?
            .iter()
            .filter(|e| range.contains(e.timestamp))
            .map(AuditEvent::chain_key)
            .collect();
        Ok(candidates
            .iter()
            .filter(|key| !active.contains(*key))
            .cloned()
            .collect())
    }

    /// Chain verification for every object in the log.
    pub fn verify_all(&self) -> Result<BTreeMap<ChainKey, ChainVerification>, ReplayError> {
        Ok(gv_audit::verify_all(&self.reader.snapshot()?)?)
    }
}

fn build(
    query: ReplayQuery,
    snapshot: &[AuditEvent],
    withheld: &HashSet<Uuid>,
    integrity_breaks: Vec<IntegrityBreak>,
) -> ReplayEnvelope {
    // Transitions need each object's previous state even when the previous
    // event lies outside the query, so walk the whole snapshot.
    let mut last_state: HashMap<ChainKey, String> = HashMap::new();
    let mut events = Vec::new();
    let mut transitions = Vec::new();

    for event in snapshot {
        let key = event.chain_key();
        let from_state = last_state.insert(key.clone(), event.new_state_hash.clone());
        if !query.selects(event) || withheld.contains(&event.event_id) {
            continue;
        }
        transitions.push(StateTransition {
            unchanged: from_state.as_deref() == Some(event.new_state_hash.as_str()),
            object: key,
            event_id: event.event_id,
            intent: event.intent,
            from_state,
            to_state: event.new_state_hash.clone(),
        });
        events.push(event.clone());
    }

    let timeline = events.iter().map(TimelineEntry::from).collect();
    let summary = ReplaySummary::from_events(&events);
    tracing::debug!(
        watermark = snapshot.len(),
        returned = events.len(),
        breaks = integrity_breaks.len(),
        "replay complete"
    );

    ReplayEnvelope {
        query,
        watermark: snapshot.len(),
        events,
        timeline,
        transitions,
        summary,
        integrity_breaks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use gv_audit::{ActorType, AuditEventFields, AuditWriter, Intent, MemoryAuditStore};

    fn fields(object: &str, intent: Intent, actor: &str, state: &str) -> AuditEventFields {
        let actor_type = if actor == "gv" {
            ActorType::System
        } else {
            ActorType::Human
        };
        AuditEventFields::new("acme", actor, actor_type, "policy.lifecycle", intent)
            .with_object("policy", object, 1)
            .with_new_state_hash(state)
            .with_reason(format!("{} {}", intent, object))
            .confirmed()
    }

    fn seeded() -> (Arc<MemoryAuditStore>, AuditWriter) {
        let store = Arc::new(MemoryAuditStore::new());
        let writer = AuditWriter::new(store.clone()).unwrap();
        writer
            .emit(fields("cost", Intent::Configure, "alice", "draft"))
            .unwrap();
        writer
            .emit(fields("cost", Intent::Simulate, "gv", "draft").with_evidence("sim-1"))
            .unwrap();
        writer
            .emit(fields("budget", Intent::Configure, "bob", "draft"))
            .unwrap();
        writer
            .emit(fields("cost", Intent::Activate, "alice", "monitor"))
            .unwrap();
        (store, writer)
    }

    #[test]
    fn replay_filters_and_summarizes() {
        let (store, _writer) = seeded();
        let engine = ReplayEngine::new(store);

        let env = engine
            .replay(TimeRange::all(), ReplayFilter::new().object("policy", "cost"))
            .unwrap();
        assert_eq!(env.watermark, 4);
        assert_eq!(env.events.len(), 3);
        assert_eq!(env.summary.human_events, 2);
        assert_eq!(env.summary.system_events, 1);
        assert_eq!(env.summary.by_intent.get(&Intent::Activate), Some(&1));
        assert_eq!(env.timeline[1].evidence_refs, vec!["sim-1".to_string()]);

        let unchanged: Vec<bool> = env.transitions.iter().map(|t| t.unchanged).collect();
        assert_eq!(unchanged, vec![false, true, false]);
        assert_eq!(env.transitions[2].from_state.as_deref(), Some("draft"));
        assert_eq!(env.transitions[2].to_state, "monitor");
    }

    #[test]
    fn replay_by_actor_and_intent() {
        let (store, _writer) = seeded();
        let engine = ReplayEngine::new(store);
        let env = engine
            .replay(
                TimeRange::all(),
                ReplayFilter::new().actor("alice").intent(Intent::Activate),
            )
            .unwrap();
        assert_eq!(env.events.len(), 1);
        assert_eq!(env.events[0].intent, Intent::Activate);
    }

    #[test]
    fn replay_never_writes() {
        let (store, _writer) = seeded();
        let engine = ReplayEngine::new(store.clone());
        engine.replay(TimeRange::all(), ReplayFilter::new()).unwrap();
        engine
            .replay_verified(TimeRange::all(), ReplayFilter::new())
            .unwrap();
        engine.verify_all().unwrap();
        assert_eq!(store.len().unwrap(), 4);
    }

    #[test]
    fn quiet_objects_are_the_ones_without_events() {
        let (store, _writer) = seeded();
        let engine = ReplayEngine::new(store);
        let candidates = vec![
            ChainKey::new("acme", "policy", "cost"),
            ChainKey::new("acme", "policy", "latency"),
        ];
        assert_eq!(
            engine.quiet_objects(TimeRange::all(), &candidates).unwrap(),
            vec![ChainKey::new("acme", "policy", "latency")]
        );
        let future = TimeRange::since(Utc::now() + Duration::hours(1));
        assert_eq!(engine.quiet_objects(future, &candidates).unwrap(), candidates);
    }

    /// A store whose content can be rewritten, standing in for a file that
    /// was edited outside the writer.
    struct Tampered(Vec<AuditEvent>);

    impl AuditReader for Tampered {
        fn snapshot(&self) -> Result<Vec<AuditEvent>, gv_audit::AuditError> {
            Ok(self.0.clone())
        }
        fn len(&self) -> Result<usize, gv_audit::AuditError> {
            Ok(self.0.len())
        }
    }

    #[test]
    fn verified_replay_withholds_events_past_the_break() {
        let (store, writer) = seeded();
        writer
            .emit(fields("cost", Intent::Disable, "alice", "disabled"))
            .unwrap();
        let mut events = store.snapshot().unwrap();
        // cost chain: positions 0 (configure), 1 (simulate), 2 (activate), 3 (disable)
        events[1].reason = "edited".into();

        let engine = ReplayEngine::new(Arc::new(Tampered(events.clone())));
        let env = engine
            .replay_verified(TimeRange::all(), ReplayFilter::new())
            .unwrap();

        assert!(!env.is_intact());
        let brk = &env.integrity_breaks[0];
        assert_eq!(brk.chain_key, ChainKey::new("acme", "policy", "cost"));
        assert_eq!(brk.position, 2);
        assert_eq!(brk.event_id, events[3].event_id);
        assert_eq!(
            brk.withheld,
            vec![events[1].event_id, events[3].event_id, events[4].event_id]
        );

        let returned: Vec<Uuid> = env.events.iter().map(|e| e.event_id).collect();
        assert_eq!(returned, vec![events[0].event_id, events[2].event_id]);

        // The unverified path still shows everything.
        let plain = engine.replay(TimeRange::all(), ReplayFilter::new()).unwrap();
        assert_eq!(plain.events.len(), 5);
        assert!(plain.is_intact());
    }

    #[test]
    fn time_range_excludes_end_bound() {
        let (store, _writer) = seeded();
        let events = store.snapshot().unwrap();
        let engine = ReplayEngine::new(store);
        let range = TimeRange::until(events[0].timestamp);
        let env = engine.replay(range, ReplayFilter::new()).unwrap();
        assert!(env.events.is_empty());
    }
}
