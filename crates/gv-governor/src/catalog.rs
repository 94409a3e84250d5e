// catalog.rs — Read-only views of the capability registry and signal catalog.
//
// Both collaborators are consulted, never written. The capability catalog
// decides which `capability_id` values an audit event may carry. The signal
// catalog supplies the severity vocabulary used to turn advisory signals
// into plain facts; a signal has no authority beyond the facts it becomes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use gv_policy::FactSnapshot;

use crate::error::GovernorError;

/// Capability recorded on register, activate and disable.
pub const LIFECYCLE_CAPABILITY: &str = "policy.lifecycle";

/// Capability recorded on evaluation outcomes.
pub const EVALUATE_CAPABILITY: &str = "policy.evaluate";

pub trait CapabilityCatalog: Send + Sync {
    fn is_known(&self, capability_id: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCapabilityCatalog {
    ids: BTreeSet<String>,
}

impl StaticCapabilityCatalog {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl CapabilityCatalog for StaticCapabilityCatalog {
    fn is_known(&self, capability_id: &str) -> bool {
        self.ids.contains(capability_id)
    }
}

pub trait SignalCatalog: Send + Sync {
    /// Rank of `severity`, higher is more severe. None if unknown.
    fn severity_rank(&self, severity: &str) -> Option<u32>;
}

/// Severity names in ascending order; matching ignores ASCII case.
#[derive(Debug, Clone)]
pub struct StaticSignalCatalog {
    levels: Vec<String>,
}

impl StaticSignalCatalog {
    pub fn new<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }
}

impl SignalCatalog for StaticSignalCatalog {
    fn severity_rank(&self, severity: &str) -> Option<u32> {
        self.levels
            .iter()
            .position(|level| level.eq_ignore_ascii_case(severity))
            .and_then(|i| u32::try_from(i).ok())
    }
}

/// An advisory input from outside the governor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Stable id, cited as evidence on evaluation records.
    pub signal_id: String,
    /// Fact prefix, e.g. `anomaly` for `anomaly.severity`.
    pub name: String,
    pub severity: String,
    pub confidence: f64,
}

/// Facts derived from signals, plus the ids to cite as evidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalFacts {
    pub facts: FactSnapshot,
    pub evidence_refs: Vec<String>,
}

/// Turn signals into `<name>.severity`, `<name>.severity_rank` and
/// `<name>.confidence` facts.
///
/// When several signals share a name, the most severe one wins; ties keep
/// the higher confidence.
pub fn signal_facts(
    catalog: &dyn SignalCatalog,
    signals: &[Signal],
) -> Result<SignalFacts, GovernorError> {
    let mut strongest: std::collections::BTreeMap<&str, (u32, &Signal)> = Default::default();
    let mut evidence_refs = Vec::with_capacity(signals.len());

    for signal in signals {
        let rank = catalog
            .severity_rank(&signal.severity)
            .ok_or_else(|| GovernorError::UnknownSeverity {
                signal: signal.signal_id.clone(),
                severity: signal.severity.clone(),
            })?;
        if !(0.0..=1.0).contains(&signal.confidence) {
            return Err(GovernorError::InvalidConfidence {
                signal: signal.signal_id.clone(),
                confidence: signal.confidence,
            });
        }
        evidence_refs.push(signal.signal_id.clone());

        let replace = match strongest.get(signal.name.as_str()) {
            None => true,
            Some((r, s)) => rank > *r || (rank == *r && signal.confidence > s.confidence),
        };
        if replace {
            strongest.insert(signal.name.as_str(), (rank, signal));
        }
    }

    let mut facts = FactSnapshot::new();
    for (name, (rank, signal)) in strongest {
        facts.insert(format!("{}.severity", name), signal.severity.to_ascii_lowercase());
        facts.insert(format!("{}.severity_rank", name), f64::from(rank));
        facts.insert(format!("{}.confidence", name), signal.confidence);
    }
    Ok(SignalFacts {
        facts,
        evidence_refs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gv_policy::FactValue;

    fn severities() -> StaticSignalCatalog {
        StaticSignalCatalog::new(["info", "low", "medium", "high", "critical"])
    }

    fn signal(id: &str, name: &str, severity: &str, confidence: f64) -> Signal {
        Signal {
            signal_id: id.into(),
            name: name.into(),
            severity: severity.into(),
            confidence,
        }
    }

    #[test]
    fn capability_catalog_is_exact() {
        let catalog = StaticCapabilityCatalog::new([LIFECYCLE_CAPABILITY]);
        assert!(catalog.is_known("policy.lifecycle"));
        assert!(!catalog.is_known("policy.Lifecycle"));
        assert!(!catalog.is_known(EVALUATE_CAPABILITY));
    }

    #[test]
    fn signals_become_facts() {
        let out = signal_facts(
            &severities(),
            &[
                signal("sig-1", "anomaly", "HIGH", 0.8),
                signal("sig-2", "anomaly", "medium", 0.99),
                signal("sig-3", "drift", "low", 0.5),
            ],
        )
        .unwrap();

        assert_eq!(
            out.facts.get("anomaly.severity"),
            Some(&FactValue::Text("high".into()))
        );
        assert_eq!(
            out.facts.get("anomaly.severity_rank"),
            Some(&FactValue::Number(3.0))
        );
        assert_eq!(
            out.facts.get("anomaly.confidence"),
            Some(&FactValue::Number(0.8))
        );
        assert_eq!(
            out.facts.get("drift.severity_rank"),
            Some(&FactValue::Number(1.0))
        );
        assert_eq!(out.facts.len(), 6);
        assert_eq!(out.evidence_refs, vec!["sig-1", "sig-2", "sig-3"]);
    }

    #[test]
    fn unknown_severity_and_bad_confidence_are_rejected() {
        assert!(matches!(
            signal_facts(&severities(), &[signal("s", "a", "severe", 0.5)]),
            Err(GovernorError::UnknownSeverity { .. })
        ));
        assert!(matches!(
            signal_facts(&severities(), &[signal("s", "a", "low", 1.5)]),
            Err(GovernorError::InvalidConfidence { .. })
        ));
        assert!(matches!(
            signal_facts(&severities(), &[signal("s", "a", "low", f64::NAN)]),
            Err(GovernorError::InvalidConfidence { .. })
        ));
    }
}
