// audit.rs — Audit subcommands: verify, tail, drain, keygen, checkpoint.

use std::path::PathBuf;

use clap::Subcommand;
use gv_audit::store::read_events;
use gv_audit::{
    verify_all, verify_checkpoint, AuditEvent, ChainAttestor, ChainCheckpoint, ChainKey,
    ChainVerification,
};
use gv_governor::{Governor, GovernorConfig, POLICY_OBJECT_TYPE};

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the hash chain of every object in the audit log.
    Verify {
        /// Path to audit log (defaults to .gv/audit.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Show recent audit events.
    Tail {
        /// Path to audit log (defaults to .gv/audit.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of events to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
    /// Redeliver events waiting in the spool.
    Drain,
    /// Generate an Ed25519 signing key for checkpoints.
    Keygen {
        /// Where to write the PKCS#8 private key.
        #[arg(long)]
        out: PathBuf,
    },
    /// Sign the current head of one object's chain.
    Checkpoint {
        /// PKCS#8 private key from `gv audit keygen`.
        #[arg(long)]
        key: PathBuf,
        /// Object id, e.g. the policy name.
        object: String,
        #[arg(long, default_value = POLICY_OBJECT_TYPE)]
        object_type: String,
        /// Tenant (defaults to the configured tenant).
        #[arg(long)]
        tenant: Option<String>,
        /// Write the checkpoint here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Check a checkpoint against the audit log.
    VerifyCheckpoint {
        checkpoint: PathBuf,
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

pub fn execute(cmd: &AuditCommands, config: &GovernorConfig) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { log } => {
            let Some(events) = load(log, config)? else {
                return Ok(());
            };
            let verdicts = verify_all(&events)?;
            let mut broken = 0;
            for (key, verdict) in &verdicts {
                match verdict {
                    ChainVerification::Intact { events: n, .. } => {
                        println!("{:<48} intact ({} event(s))", key.to_string(), n);
                    }
                    ChainVerification::Broken(brk) => {
                        broken += 1;
                        println!("{:<48} BROKEN at position {}", key.to_string(), brk.position);
                        println!("  Event:                  {}", brk.event_id);
                        println!(
                            "  Expected previous hash: {}",
                            brk.expected.as_deref().unwrap_or("(none)")
                        );
                        println!(
                            "  Actual previous hash:   {}",
                            brk.actual.as_deref().unwrap_or("(none)")
                        );
                        println!("  Trusted prefix:         {} event(s)", brk.trusted_len());
                    }
                }
            }
            if broken > 0 {
                println!();
                println!("The audit log may have been tampered with.");
                anyhow::bail!("{} of {} chain(s) failed verification", broken, verdicts.len());
            }
            println!(
                "Audit log verified: {} event(s) in {} chain(s), all intact.",
                events.len(),
                verdicts.len()
            );
        }

        AuditCommands::Tail { log, n } => {
            let Some(events) = load(log, config)? else {
                return Ok(());
            };
            let start = events.len().saturating_sub(*n);
            let recent = &events[start..];
            if recent.is_empty() {
                println!("No audit events.");
                return Ok(());
            }

            println!(
                "{:<20} {:<14} {:<10} {:<32} REASON",
                "TIMESTAMP", "ACTOR", "INTENT", "OBJECT"
            );
            println!("{}", "-".repeat(96));
            for event in recent {
                println!(
                    "{:<20} {:<14} {:<10} {:<32} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.actor_id,
                    event.intent.as_str(),
                    format!("{}/{} v{}", event.object_type, event.object_id, event.object_version),
                    event.reason,
                );
            }
        }

        AuditCommands::Drain => {
            // Starting the dispatcher redelivers the spool before anything else.
            let gov = Governor::open(config.clone())?;
            gov.drain_audit_spool()?;
            let stats = gov.dispatch_stats();
            println!(
                "Redelivered {} event(s); {} exhausted; {} lost; {} still spooled.",
                stats.delivered,
                stats.exhausted,
                stats.lost,
                gov.spooled_audit_events()?
            );
        }

        AuditCommands::Keygen { out } => {
            if out.exists() {
                anyhow::bail!("{} already exists; refusing to overwrite a key", out.display());
            }
            let (attestor, pkcs8) = ChainAttestor::generate()?;
            std::fs::write(out, pkcs8)?;
            println!("Wrote signing key to {}", out.display());
            println!("Public key: {}", attestor.public_key_base64());
        }

        AuditCommands::Checkpoint {
            key,
            object,
            object_type,
            tenant,
            out,
            log,
        } => {
            let Some(events) = load(log, config)? else {
                anyhow::bail!("nothing to checkpoint");
            };
            let attestor = ChainAttestor::from_pkcs8(&std::fs::read(key)?)?;
            let chain_key = ChainKey::new(
                tenant.as_deref().unwrap_or(&config.tenant_id),
                object_type,
                object,
            );
            let checkpoint = attestor.checkpoint(&chain_key, &events)?;
            let json = serde_json::to_string_pretty(&checkpoint)?;
            match out {
                Some(path) => {
                    std::fs::write(path, json)?;
                    println!(
                        "Checkpoint for {} ({} event(s)) written to {}",
                        chain_key,
                        checkpoint.event_count,
                        path.display()
                    );
                }
                None => println!("{}", json),
            }
        }

        AuditCommands::VerifyCheckpoint { checkpoint, log } => {
            let checkpoint: ChainCheckpoint =
                serde_json::from_str(&std::fs::read_to_string(checkpoint)?)?;
            let events = load(log, config)?.unwrap_or_default();
            verify_checkpoint(&checkpoint, &events)?;
            println!(
                "Checkpoint valid: {} covers {} event(s), signed {}.",
                checkpoint.chain_key,
                checkpoint.event_count,
                checkpoint.signed_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    Ok(())
}

fn log_path(log: &Option<PathBuf>, config: &GovernorConfig) -> PathBuf {
    log.clone().unwrap_or_else(|| config.audit_log.clone())
}

/// Read every event, or None (after saying so) if there is no log yet.
fn load(log: &Option<PathBuf>, config: &GovernorConfig) -> anyhow::Result<Option<Vec<AuditEvent>>> {
    let path = log_path(log, config);
    if !path.exists() {
        println!("No audit log found at {}", path.display());
        return Ok(None);
    }
    Ok(Some(read_events(&path, usize::MAX)?))
}
