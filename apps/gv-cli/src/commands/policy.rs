// policy.rs — Policy subcommands: check, fmt, eval.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use gv_governor::{signal_facts, GovernorConfig, Signal, StaticSignalCatalog};
use gv_policy::{CompileErrors, FactSnapshot, PolicyDefinition, StepOutcome};

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Compile policy files and report every error with its code and location.
    Check {
        /// Policy source files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print a policy in canonical form.
    Fmt {
        file: PathBuf,
        /// Rewrite the file in place instead of printing.
        #[arg(long)]
        write: bool,
    },
    /// Evaluate a policy against a JSON fact snapshot. Writes nothing.
    Eval {
        file: PathBuf,
        /// JSON object mapping metric names to values.
        #[arg(long)]
        facts: PathBuf,
        /// JSON array of advisory signals to add as facts.
        #[arg(long)]
        signals: Option<PathBuf>,
        /// Show every predicate visited.
        #[arg(long)]
        trace: bool,
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(cmd: &PolicyCommands, config: &GovernorConfig) -> anyhow::Result<()> {
    match cmd {
        PolicyCommands::Check { files } => {
            let mut failed = 0;
            for file in files {
                let source = read(file)?;
                match gv_policy::compile(&source) {
                    Ok(policy) => println!(
                        "{}: ok ({} v{}, {} {}, {} clause(s))",
                        file.display(),
                        policy.name(),
                        policy.version(),
                        policy.scope(),
                        policy.mode(),
                        policy.clauses().len()
                    ),
                    Err(errors) => {
                        failed += 1;
                        print_errors(file, &errors);
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} policy file(s) rejected", failed, files.len());
            }
        }

        PolicyCommands::Fmt { file, write } => {
            let policy = compile_file(file)?;
            let canonical = policy.canonical_source();
            if *write {
                std::fs::write(file, format!("{}\n", canonical))?;
                println!("Formatted {}", file.display());
            } else {
                println!("{}", canonical);
            }
        }

        PolicyCommands::Eval {
            file,
            facts,
            signals,
            trace,
            json,
        } => {
            let policy = compile_file(file)?;
            let mut snapshot = FactSnapshot::from_json(&read(facts)?)
                .map_err(|e| anyhow::anyhow!("invalid facts in {}: {}", facts.display(), e))?;
            if let Some(path) = signals {
                let parsed: Vec<Signal> = serde_json::from_str(&read(path)?)
                    .map_err(|e| anyhow::anyhow!("invalid signals in {}: {}", path.display(), e))?;
                let catalog = StaticSignalCatalog::new(config.severities.clone());
                snapshot.extend(signal_facts(&catalog, &parsed)?.facts);
            }

            let result = gv_policy::evaluate_with_trace(&policy, &snapshot);
            if *json {
                if *trace {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    println!("{}", serde_json::to_string_pretty(&result.outcome)?);
                }
                return Ok(());
            }

            if *trace {
                for step in &result.steps {
                    println!(
                        "  clause {:<3} {:<16} {}",
                        step.clause,
                        step_label(&step.outcome),
                        step.predicate
                    );
                }
                println!();
            }
            if result.outcome.is_empty() {
                println!("{} v{}: no actions", policy.name(), policy.version());
            } else {
                println!(
                    "{} v{}: clause(s) {:?} fired",
                    policy.name(),
                    policy.version(),
                    result.outcome.fired_clauses
                );
                for action in &result.outcome.actions {
                    println!("  {}", action);
                }
            }
        }
    }

    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))
}

fn compile_file(file: &Path) -> anyhow::Result<PolicyDefinition> {
    let source = read(file)?;
    gv_policy::compile(&source).map_err(|errors| {
        print_errors(file, &errors);
        anyhow::anyhow!("{} was rejected", file.display())
    })
}

fn print_errors(file: &Path, errors: &CompileErrors) {
    for d in &errors.diagnostics {
        println!(
            "{}:{}: {} {}",
            file.display(),
            d.location,
            d.code,
            d.message
        );
    }
}

fn step_label(outcome: &StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Matched => "matched",
        StepOutcome::NotMatched => "not matched",
        StepOutcome::MissingFact => "missing fact",
        StepOutcome::TypeMismatch => "type mismatch",
        StepOutcome::ShortCircuited => "short-circuited",
    }
}
