// replay.rs — Read-only replay queries over the audit log.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Args;
use gv_audit::{Intent, JsonlAuditStore};
use gv_governor::GovernorConfig;
use gv_replay::{ReplayEngine, ReplayEnvelope, ReplayFilter, TimeRange};

#[derive(Args)]
pub struct ReplayArgs {
    /// Path to audit log (defaults to .gv/audit.jsonl).
    #[arg(long)]
    log: Option<PathBuf>,
    /// Start of the range, inclusive (RFC 3339).
    #[arg(long)]
    since: Option<DateTime<Utc>>,
    /// End of the range, exclusive (RFC 3339).
    #[arg(long)]
    until: Option<DateTime<Utc>>,
    #[arg(long)]
    tenant: Option<String>,
    #[arg(long)]
    object_type: Option<String>,
    /// Object id, e.g. a policy name.
    #[arg(long)]
    object: Option<String>,
    #[arg(long)]
    capability: Option<String>,
    #[arg(long)]
    actor: Option<String>,
    /// CONFIGURE, ACTIVATE, PAUSE, DISABLE or SIMULATE.
    #[arg(long)]
    intent: Option<Intent>,
    /// Verify each object's hash chain and withhold events past a break.
    #[arg(long)]
    verify: bool,
    /// Print the full envelope as JSON.
    #[arg(long)]
    json: bool,
}

pub fn execute(args: &ReplayArgs, config: &GovernorConfig) -> anyhow::Result<()> {
    let path = args.log.clone().unwrap_or_else(|| config.audit_log.clone());
    if !path.exists() {
        println!("No audit log found at {}", path.display());
        return Ok(());
    }

    let range = match (args.since, args.until) {
        (Some(start), Some(end)) => TimeRange::between(start, end)?,
        (Some(start), None) => TimeRange::since(start),
        (None, Some(end)) => TimeRange::until(end),
        (None, None) => TimeRange::all(),
    };
    let filter = ReplayFilter {
        tenant_id: args.tenant.clone(),
        object_type: args.object_type.clone(),
        object_id: args.object.clone(),
        capability_id: args.capability.clone(),
        actor_id: args.actor.clone(),
        intent: args.intent,
    };

    let engine = ReplayEngine::new(Arc::new(JsonlAuditStore::open(&path)?));
    let envelope = if args.verify {
        engine.replay_verified(range, filter)?
    } else {
        engine.replay(range, filter)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        print_envelope(&envelope);
    }

    if !envelope.is_intact() {
        anyhow::bail!(
            "{} chain(s) failed verification; their later events were withheld",
            envelope.integrity_breaks.len()
        );
    }
    Ok(())
}

fn print_envelope(env: &ReplayEnvelope) {
    if env.events.is_empty() {
        println!("No matching events ({} in log).", env.watermark);
        return;
    }

    println!(
        "{:<20} {:<14} {:<10} {:<32} {:<9} REASON",
        "TIMESTAMP", "ACTOR", "INTENT", "OBJECT", "STATE"
    );
    println!("{}", "-".repeat(104));
    for (entry, transition) in env.timeline.iter().zip(&env.transitions) {
        println!(
            "{:<20} {:<14} {:<10} {:<32} {:<9} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.actor_id,
            entry.intent.as_str(),
            format!("{}/{} v{}", entry.object.object_type, entry.object.object_id, entry.object_version),
            if transition.unchanged { "same" } else { "changed" },
            entry.reason,
        );
        if !entry.evidence_refs.is_empty() {
            println!("{:<20} evidence: {}", "", entry.evidence_refs.join(", "));
        }
    }

    let s = &env.summary;
    println!();
    println!(
        "{} of {} event(s): {} human, {} system, {} actor(s), {} object(s).",
        s.total_events,
        env.watermark,
        s.human_events,
        s.system_events,
        s.actors.len(),
        s.objects.len()
    );
    for (intent, count) in &s.by_intent {
        println!("  {:<10} {}", intent.as_str(), count);
    }

    for brk in &env.integrity_breaks {
        println!();
        println!("INTEGRITY BREAK in {} at position {}:", brk.chain_key, brk.position);
        println!("  Event:    {}", brk.event_id);
        println!("  Withheld: {} event(s)", brk.withheld.len());
    }
}
