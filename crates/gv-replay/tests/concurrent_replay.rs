// Replay while another thread keeps writing to the same JSONL log. Every
// envelope must be a consistent snapshot: exactly the events visible at its
// watermark, with every chain verifying.

use std::sync::Arc;
use std::thread;

use gv_audit::{ActorType, AuditEventFields, AuditWriter, Intent, JsonlAuditStore};
use gv_replay::{ReplayEngine, ReplayFilter, TimeRange};
use tempfile::tempdir;

fn simulate(object: &str, n: usize) -> AuditEventFields {
    AuditEventFields::new("acme", "gv", ActorType::System, "policy.evaluate", Intent::Simulate)
        .with_object("policy", object, 1)
        .with_new_state_hash(format!("outcome-{}", n))
}

#[test]
fn replay_sees_consistent_snapshots_during_writes() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonlAuditStore::open(dir.path().join("audit.jsonl")).unwrap());
    let writer = Arc::new(AuditWriter::new(store.clone()).unwrap());
    for n in 0..10 {
        writer.emit(simulate("cost", n)).unwrap();
    }

    let background = {
        let writer = writer.clone();
        thread::spawn(move || {
            for n in 0..100 {
                let object = if n % 2 == 0 { "cost" } else { "budget" };
                writer.emit(simulate(object, n)).unwrap();
            }
        })
    };

    let engine = ReplayEngine::new(store.clone());
    for _ in 0..20 {
        let env = engine
            .replay_verified(TimeRange::all(), ReplayFilter::new())
            .unwrap();
        assert_eq!(env.events.len(), env.watermark);
        assert!(env.watermark >= 10);
        assert!(env.is_intact(), "{:?}", env.integrity_breaks);
    }
    background.join().unwrap();

    let final_env = engine
        .replay(TimeRange::all(), ReplayFilter::new().tenant("acme"))
        .unwrap();
    assert_eq!(final_env.watermark, 110);
    assert_eq!(final_env.summary.objects.len(), 2);
}
