// governor.rs — The facade tying compile, lifecycle, evaluation and audit together.
//
// Lifecycle changes (register, activate, disable) are written synchronously
// through AuditWriter while the registry write lock is held, and the
// registry is updated only from the receipt of a committed event. So a
// policy can never reach ENFORCE without a confirmed ACTIVATE event on
// record.
//
// Evaluation never touches audit. `evaluate_and_record` evaluates first and
// then hands a SIMULATE record to the non-blocking dispatcher; a failed
// submission is logged and the outcome is returned as if nothing happened.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use gv_audit::{
    ActorType, AlertSink, AuditDispatcher, AuditEventFields, AuditReader, AuditStore,
    AuditWriter, ChainAttestor, ChainCheckpoint, ChainKey, ChainVerification, DispatchStats,
    Intent, JsonlAuditStore, MemoryAuditStore, Spool, TracingAlertSink,
};
use gv_policy::{CompileErrors, EvaluationOutcome, FactSnapshot, PolicyDefinition};
use gv_replay::{ReplayEngine, ReplayEnvelope, ReplayFilter, TimeRange};

use crate::catalog::{
    signal_facts, CapabilityCatalog, Signal, SignalCatalog, SignalFacts,
    StaticCapabilityCatalog, StaticSignalCatalog, EVALUATE_CAPABILITY, LIFECYCLE_CAPABILITY,
};
use crate::config::GovernorConfig;
use crate::cooldown::CooldownState;
use crate::error::{poisoned, GovernorError};
use crate::lifecycle::{state_hash, ActivationReceipt, Deployment, PolicyState};
use crate::registry::PolicyRegistry;

/// `object_type` of every event the governor records about a policy.
pub const POLICY_OBJECT_TYPE: &str = "policy";

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub actor_id: String,
    pub actor_type: ActorType,
}

impl ActorContext {
    pub fn human(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_type: ActorType::Human,
        }
    }

    pub fn system(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_type: ActorType::System,
        }
    }
}

/// An evaluation outcome together with the lifecycle state it was produced in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GovernedOutcome {
    pub outcome: EvaluationOutcome,
    pub state: PolicyState,
    pub state_hash: String,
    /// True only when the evaluated version is in ENFORCE. Outside ENFORCE
    /// a `block` action is advisory.
    pub enforced: bool,
}

impl GovernedOutcome {
    /// Whether the governed operation must be stopped.
    pub fn blocks(&self) -> bool {
        self.enforced && self.outcome.blocks()
    }
}

pub struct Governor {
    config: GovernorConfig,
    registry: RwLock<PolicyRegistry>,
    writer: Arc<AuditWriter>,
    dispatcher: AuditDispatcher,
    reader: Arc<dyn AuditReader>,
    replay: ReplayEngine,
    capabilities: Arc<dyn CapabilityCatalog>,
    signals: Arc<dyn SignalCatalog>,
}

impl Governor {
    /// Open the JSONL audit log and spool named in `config`.
    pub fn open(config: GovernorConfig) -> Result<Self, GovernorError> {
        let store = Arc::new(JsonlAuditStore::open(&config.audit_log)?);
        let spool = Spool::file(&config.spool_path)?;
        Self::with_parts(config, store, spool, Arc::new(TracingAlertSink))
    }

    /// A governor whose audit log lives only in memory.
    pub fn in_memory(config: GovernorConfig) -> Result<Self, GovernorError> {
        Self::with_parts(
            config,
            Arc::new(MemoryAuditStore::new()),
            Spool::memory(),
            Arc::new(TracingAlertSink),
        )
    }

    pub fn with_parts<S: AuditStore + 'static>(
        config: GovernorConfig,
        store: Arc<S>,
        spool: Spool,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self, GovernorError> {
        let writer = Arc::new(AuditWriter::new(store.clone())?);
        let dispatcher =
            AuditDispatcher::start(writer.clone(), spool, config.dispatcher, alerts)?;
        let reader: Arc<dyn AuditReader> = store;
        let capabilities = Arc::new(StaticCapabilityCatalog::new(config.capabilities.clone()));
        let signals = Arc::new(StaticSignalCatalog::new(config.severities.clone()));
        tracing::debug!(tenant = %config.tenant_id, "governor started");
        Ok(Self {
            replay: ReplayEngine::new(reader.clone()),
            config,
            registry: RwLock::new(PolicyRegistry::new()),
            writer,
            dispatcher,
            reader,
            capabilities,
            signals,
        })
    }

    pub fn with_capability_catalog(mut self, catalog: Arc<dyn CapabilityCatalog>) -> Self {
        self.capabilities = catalog;
        self
    }

    pub fn with_signal_catalog(mut self, catalog: Arc<dyn SignalCatalog>) -> Self {
        self.signals = catalog;
        self
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// A fresh cooldown context using the configured window.
    pub fn cooldown(&self) -> CooldownState {
        CooldownState::new(self.config.cooldown())
    }

    pub fn compile(&self, source: &str) -> Result<PolicyDefinition, CompileErrors> {
        gv_policy::compile(source)
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Compile `source` and register it as a new DRAFT version.
    pub fn register(
        &self,
        actor: &ActorContext,
        source: &str,
        confirmation: bool,
        reason: &str,
    ) -> Result<Deployment, GovernorError> {
        require_intent("register a policy", confirmation, reason)?;
        let policy = self.compile(source)?;

        let mut registry = self.registry.write().map_err(poisoned)?;
        registry.check_new_version(&policy)?;
        let fields = self
            .lifecycle_fields(actor, &policy, Intent::Configure, PolicyState::Draft, reason)
            .with_metadata(json!({
                "to": PolicyState::Draft,
                "mode": policy.mode(),
                "scope": policy.scope(),
                "source": policy.canonical_source(),
            }));
        let event_id = self.writer.emit(fields)?;
        let deployment = registry
            .insert(Deployment::draft(policy, event_id))?
            .clone();

        tracing::info!(
            policy = %deployment.name(),
            version = deployment.version(),
            actor = %actor.actor_id,
            event_id = %event_id,
            "policy registered"
        );
        Ok(deployment)
    }

    /// Advance a version one step: DRAFT → MONITOR, or MONITOR → ENFORCE.
    ///
    /// Requires a human actor, explicit confirmation and a reason.
    pub fn activate(
        &self,
        actor: &ActorContext,
        name: &str,
        version: u32,
        confirmation: bool,
        reason: &str,
    ) -> Result<ActivationReceipt, GovernorError> {
        let action = format!("activate {} v{}", name, version);
        require_intent(&action, confirmation, reason)?;
        if actor.actor_type != ActorType::Human {
            tracing::warn!(
                policy = %name,
                version,
                actor = %actor.actor_id,
                "activation by non-human actor refused"
            );
            return Err(GovernorError::HumanRequired { action });
        }

        let mut registry = self.registry.write().map_err(poisoned)?;
        let current = registry.require(name, version)?.state;
        let to = current.next_activation().unwrap_or(PolicyState::Enforce);
        self.commit_transition(&mut registry, actor, name, version, to, Intent::Activate, reason)
    }

    /// Take a live version out of service.
    pub fn disable(
        &self,
        actor: &ActorContext,
        name: &str,
        version: u32,
        confirmation: bool,
        reason: &str,
    ) -> Result<ActivationReceipt, GovernorError> {
        require_intent(&format!("disable {} v{}", name, version), confirmation, reason)?;
        let mut registry = self.registry.write().map_err(poisoned)?;
        self.commit_transition(
            &mut registry,
            actor,
            name,
            version,
            PolicyState::Disabled,
            Intent::Disable,
            reason,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn commit_transition(
        &self,
        registry: &mut PolicyRegistry,
        actor: &ActorContext,
        name: &str,
        version: u32,
        to: PolicyState,
        intent: Intent,
        reason: &str,
    ) -> Result<ActivationReceipt, GovernorError> {
        let deployment = registry.require(name, version)?;
        if let Err(err) = deployment.check_transition(to) {
            tracing::warn!(policy = %name, version, error = %err, "lifecycle transition refused");
            return Err(err);
        }
        let from = deployment.state;
        let fields = self
            .lifecycle_fields(actor, &deployment.policy, intent, to, reason)
            .with_metadata(json!({ "from": from, "to": to }));

        let event_id = self.writer.emit(fields)?;
        let receipt = ActivationReceipt::new(event_id, name, version, from, to);
        registry.apply(&receipt)?;

        tracing::info!(
            policy = %name,
            version,
            from = %from,
            to = %to,
            actor = %actor.actor_id,
            event_id = %event_id,
            "policy state changed"
        );
        Ok(receipt)
    }

    fn lifecycle_fields(
        &self,
        actor: &ActorContext,
        policy: &PolicyDefinition,
        intent: Intent,
        to: PolicyState,
        reason: &str,
    ) -> AuditEventFields {
        AuditEventFields::new(
            &self.config.tenant_id,
            &actor.actor_id,
            actor.actor_type,
            LIFECYCLE_CAPABILITY,
            intent,
        )
        .with_object(POLICY_OBJECT_TYPE, policy.name(), u64::from(policy.version()))
        .with_new_state_hash(state_hash(policy, to))
        .with_reason(reason)
        .confirmed()
    }

    pub fn deployment(&self, name: &str, version: u32) -> Result<Option<Deployment>, GovernorError> {
        let registry = self.registry.read().map_err(poisoned)?;
        Ok(registry.get(name, version).cloned())
    }

    /// Every registered version, by name then version.
    pub fn deployments(&self) -> Result<Vec<Deployment>, GovernorError> {
        let registry = self.registry.read().map_err(poisoned)?;
        Ok(registry.iter().cloned().collect())
    }

    // ── Evaluation ─────────────────────────────────────────────

    /// Evaluate the current target version of `name`. Writes nothing.
    pub fn evaluate(&self, name: &str, facts: &FactSnapshot) -> Result<GovernedOutcome, GovernorError> {
        let registry = self.registry.read().map_err(poisoned)?;
        let deployment = registry
            .evaluation_target(name)
            .ok_or_else(|| GovernorError::NoEvaluableVersion {
                name: name.to_string(),
            })?;
        let outcome = gv_policy::evaluate(&deployment.policy, facts);
        tracing::debug!(
            policy = %name,
            version = deployment.version(),
            state = %deployment.state,
            actions = outcome.actions.len(),
            "policy evaluated"
        );
        Ok(GovernedOutcome {
            enforced: deployment.state == PolicyState::Enforce,
            state: deployment.state,
            state_hash: deployment.state_hash.clone(),
            outcome,
        })
    }

    /// Evaluate, then record a SIMULATE event when actions fired and the
    /// cooldown allows it. Recording problems never reach the caller.
    pub fn evaluate_and_record(
        &self,
        actor: &ActorContext,
        name: &str,
        facts: &FactSnapshot,
        evidence_refs: &[String],
        cooldown: &mut CooldownState,
    ) -> Result<GovernedOutcome, GovernorError> {
        let governed = self.evaluate(name, facts)?;
        if governed.outcome.is_empty() {
            return Ok(governed);
        }

        let key = format!(
            "{}@{}:{:?}",
            governed.outcome.policy, governed.outcome.version, governed.outcome.fired_clauses
        );
        if !cooldown.should_record(&key, Utc::now()) {
            tracing::debug!(policy = %name, key = %key, "evaluation record suppressed by cooldown");
            return Ok(governed);
        }

        let mut fields = AuditEventFields::new(
            &self.config.tenant_id,
            &actor.actor_id,
            actor.actor_type,
            EVALUATE_CAPABILITY,
            Intent::Simulate,
        )
        .with_object(
            POLICY_OBJECT_TYPE,
            &governed.outcome.policy,
            u64::from(governed.outcome.version),
        )
        .with_new_state_hash(&governed.state_hash)
        .with_reason(format!(
            "clauses {:?} fired in {}",
            governed.outcome.fired_clauses, governed.state
        ))
        .with_metadata(json!({
            "actions": governed.outcome.actions,
            "fired_clauses": governed.outcome.fired_clauses,
            "state": governed.state,
            "enforced": governed.enforced,
        }));
        for evidence in evidence_refs {
            fields = fields.with_evidence(evidence);
        }

        if let Err(err) = self.dispatcher.submit(fields) {
            tracing::warn!(policy = %name, error = %err, "evaluation record not submitted");
        }
        Ok(governed)
    }

    /// Facts derived from advisory signals using the severity vocabulary.
    pub fn signal_facts(&self, signals: &[Signal]) -> Result<SignalFacts, GovernorError> {
        signal_facts(self.signals.as_ref(), signals)
    }

    // ── Audit ──────────────────────────────────────────────────

    /// Submit an externally built event through the dispatcher.
    pub fn emit_audit(&self, fields: AuditEventFields) -> Result<Uuid, GovernorError> {
        if fields.tenant_id != self.config.tenant_id {
            return Err(GovernorError::TenantMismatch {
                expected: self.config.tenant_id.clone(),
                actual: fields.tenant_id,
            });
        }
        if !self.capabilities.is_known(&fields.capability_id) {
            tracing::warn!(capability = %fields.capability_id, "audit event with unknown capability refused");
            return Err(GovernorError::UnknownCapability(fields.capability_id));
        }
        Ok(self.dispatcher.submit(fields)?)
    }

    /// Wait until every submitted event has been processed.
    pub fn flush_audit(&self) -> Result<(), GovernorError> {
        Ok(self.dispatcher.flush()?)
    }

    /// Retry spooled events now. Returns how many were committed.
    pub fn drain_audit_spool(&self) -> Result<usize, GovernorError> {
        Ok(self.dispatcher.drain_spool()?)
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Events waiting in the spool for redelivery.
    pub fn spooled_audit_events(&self) -> Result<usize, GovernorError> {
        Ok(self.dispatcher.spool_len()?)
    }

    /// Sign the current head of a policy's audit chain.
    pub fn checkpoint_policy(
        &self,
        attestor: &ChainAttestor,
        name: &str,
    ) -> Result<ChainCheckpoint, GovernorError> {
        let key = ChainKey::new(&self.config.tenant_id, POLICY_OBJECT_TYPE, name);
        Ok(attestor.checkpoint(&key, &self.reader.snapshot()?)?)
    }

    // ── Replay ─────────────────────────────────────────────────

    /// Replay this tenant's history. A filter without a tenant is
    /// restricted to the governor's tenant.
    pub fn replay(
        &self,
        range: TimeRange,
        filter: ReplayFilter,
    ) -> Result<ReplayEnvelope, GovernorError> {
        Ok(self.replay.replay(range, self.scoped(filter))?)
    }

    pub fn replay_verified(
        &self,
        range: TimeRange,
        filter: ReplayFilter,
    ) -> Result<ReplayEnvelope, GovernorError> {
        Ok(self.replay.replay_verified(range, self.scoped(filter))?)
    }

    /// Registered policies with no recorded event in `range`.
    pub fn quiet_policies(&self, range: TimeRange) -> Result<Vec<String>, GovernorError> {
        let candidates: Vec<ChainKey> = {
            let registry = self.registry.read().map_err(poisoned)?;
            registry
                .names()
                .map(|name| ChainKey::new(&self.config.tenant_id, POLICY_OBJECT_TYPE, name))
                .collect()
        };
        Ok(self
            .replay
            .quiet_objects(range, &candidates)?
            .into_iter()
            .map(|key| key.object_id)
            .collect())
    }

    pub fn verify_audit(&self) -> Result<BTreeMap<ChainKey, ChainVerification>, GovernorError> {
        Ok(self.replay.verify_all()?)
    }

    fn scoped(&self, mut filter: ReplayFilter) -> ReplayFilter {
        if filter.tenant_id.is_none() {
            filter.tenant_id = Some(self.config.tenant_id.clone());
        }
        filter
    }
}

fn require_intent(action: &str, confirmation: bool, reason: &str) -> Result<(), GovernorError> {
    if !confirmation {
        tracing::warn!(action = %action, "unconfirmed lifecycle request refused");
        return Err(GovernorError::ConfirmationRequired {
            action: action.to_string(),
        });
    }
    if reason.trim().is_empty() {
        return Err(GovernorError::ReasonRequired {
            action: action.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gv_policy::Action;

    const BUDGET: &str = "policy BudgetEnforcement version 1 scope ORG mode ENFORCE; \
                          when monthly_spend >= budget_limit then block; warn \"Monthly budget exhausted\"";
    const COST: &str = "policy CostSpikeGuard version 1 scope PROJECT mode MONITOR; \
                        when cost_per_hour > 200 AND error_rate > 0.1 then warn \"Cost spike with elevated error rate\"";

    fn governor() -> Governor {
        let config = GovernorConfig {
            tenant_id: "acme".into(),
            ..Default::default()
        };
        Governor::in_memory(config).unwrap()
    }

    fn alice() -> ActorContext {
        ActorContext::human("alice")
    }

    fn spent() -> FactSnapshot {
        FactSnapshot::new()
            .with("monthly_spend", 1000.0)
            .with("budget_limit", 1000.0)
    }

    #[test]
    fn register_requires_confirmation_and_reason() {
        let gov = governor();
        assert!(matches!(
            gov.register(&alice(), BUDGET, false, "new budget"),
            Err(GovernorError::ConfirmationRequired { .. })
        ));
        assert!(matches!(
            gov.register(&alice(), BUDGET, true, "  "),
            Err(GovernorError::ReasonRequired { .. })
        ));
        assert!(gov.deployments().unwrap().is_empty());
        assert_eq!(gov.reader.len().unwrap(), 0);
    }

    #[test]
    fn compile_errors_pass_through() {
        let gov = governor();
        let err = gov
            .register(
                &alice(),
                "policy P version 1 mode MONITOR; when x > 1 then block",
                true,
                "try",
            )
            .unwrap_err();
        let GovernorError::Compile(errors) = err else {
            panic!("expected compile error, got {:?}", err);
        };
        assert!(errors.has_code(gv_policy::ErrorCode::BlockOutsideEnforce));
    }

    #[test]
    fn block_is_advisory_until_enforce() {
        let gov = governor();
        gov.register(&alice(), BUDGET, true, "initial").unwrap();

        let draft = gov.evaluate("BudgetEnforcement", &spent()).unwrap();
        assert_eq!(draft.state, PolicyState::Draft);
        assert_eq!(
            draft.outcome.actions,
            vec![Action::Block, Action::Warn("Monthly budget exhausted".into())]
        );
        assert!(!draft.blocks());

        gov.activate(&alice(), "BudgetEnforcement", 1, true, "observe first")
            .unwrap();
        assert!(!gov.evaluate("BudgetEnforcement", &spent()).unwrap().blocks());

        let receipt = gov
            .activate(&alice(), "BudgetEnforcement", 1, true, "finance approved")
            .unwrap();
        assert_eq!(receipt.from(), PolicyState::Monitor);
        assert_eq!(receipt.to(), PolicyState::Enforce);
        let enforced = gov.evaluate("BudgetEnforcement", &spent()).unwrap();
        assert!(enforced.enforced);
        assert!(enforced.blocks());
    }

    #[test]
    fn activation_needs_a_human() {
        let gov = governor();
        gov.register(&alice(), BUDGET, true, "initial").unwrap();
        assert!(matches!(
            gov.activate(&ActorContext::system("scheduler"), "BudgetEnforcement", 1, true, "auto"),
            Err(GovernorError::HumanRequired { .. })
        ));
        assert!(matches!(
            gov.activate(&alice(), "BudgetEnforcement", 1, false, "no"),
            Err(GovernorError::ConfirmationRequired { .. })
        ));
        let dep = gov.deployment("BudgetEnforcement", 1).unwrap().unwrap();
        assert_eq!(dep.state, PolicyState::Draft);
    }

    #[test]
    fn monitor_policy_stops_at_monitor() {
        let gov = governor();
        gov.register(&alice(), COST, true, "watch cost").unwrap();
        gov.activate(&alice(), "CostSpikeGuard", 1, true, "go").unwrap();
        let before = gov.reader.len().unwrap();
        assert!(matches!(
            gov.activate(&alice(), "CostSpikeGuard", 1, true, "enforce it"),
            Err(GovernorError::ModeCeiling { .. })
        ));
        assert_eq!(gov.reader.len().unwrap(), before);
    }

    #[test]
    fn disabled_versions_are_not_evaluated() {
        let gov = governor();
        gov.register(&alice(), COST, true, "watch cost").unwrap();
        assert!(matches!(
            gov.disable(&alice(), "CostSpikeGuard", 1, true, "not live yet"),
            Err(GovernorError::InvalidTransition { .. })
        ));
        gov.activate(&alice(), "CostSpikeGuard", 1, true, "go").unwrap();
        gov.disable(&alice(), "CostSpikeGuard", 1, true, "retired").unwrap();
        assert!(matches!(
            gov.evaluate("CostSpikeGuard", &FactSnapshot::new()),
            Err(GovernorError::NoEvaluableVersion { .. })
        ));
        assert!(matches!(
            gov.activate(&alice(), "CostSpikeGuard", 1, true, "again"),
            Err(GovernorError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn evaluate_writes_nothing() {
        let gov = governor();
        gov.register(&alice(), BUDGET, true, "initial").unwrap();
        let before = gov.reader.len().unwrap();
        for _ in 0..10 {
            gov.evaluate("BudgetEnforcement", &spent()).unwrap();
        }
        assert_eq!(gov.reader.len().unwrap(), before);
    }

    #[test]
    fn evaluation_records_respect_cooldown() {
        let gov = governor();
        gov.register(&alice(), BUDGET, true, "initial").unwrap();
        let system = ActorContext::system("gv");
        let mut cooldown = gov.cooldown();

        for _ in 0..3 {
            gov.evaluate_and_record(
                &system,
                "BudgetEnforcement",
                &spent(),
                &["invoice-42".to_string()],
                &mut cooldown,
            )
            .unwrap();
        }
        // Nothing fires below the limit, so nothing is recorded.
        gov.evaluate_and_record(
            &system,
            "BudgetEnforcement",
            &FactSnapshot::new().with("monthly_spend", 1.0).with("budget_limit", 2.0),
            &[],
            &mut CooldownState::new(std::time::Duration::ZERO),
        )
        .unwrap();
        gov.flush_audit().unwrap();

        let env = gov
            .replay(TimeRange::all(), ReplayFilter::new().intent(Intent::Simulate))
            .unwrap();
        assert_eq!(env.events.len(), 1);
        assert_eq!(env.events[0].evidence_refs, vec!["invoice-42".to_string()]);
        assert_eq!(env.events[0].capability_id, EVALUATE_CAPABILITY);
        assert!(env.transitions[0].unchanged);
    }

    #[test]
    fn emit_audit_checks_tenant_and_capability() {
        let gov = governor();
        let fields = |tenant: &str, capability: &str| {
            AuditEventFields::new(tenant, "bob", ActorType::Human, capability, Intent::Pause)
                .with_object("workflow", "nightly", 3)
                .with_new_state_hash("paused")
                .with_reason("maintenance")
                .confirmed()
        };

        assert!(matches!(
            gov.emit_audit(fields("other", LIFECYCLE_CAPABILITY)),
            Err(GovernorError::TenantMismatch { .. })
        ));
        assert!(matches!(
            gov.emit_audit(fields("acme", "shell.exec")),
            Err(GovernorError::UnknownCapability(_))
        ));
        let id = gov.emit_audit(fields("acme", LIFECYCLE_CAPABILITY)).unwrap();
        gov.flush_audit().unwrap();
        let env = gov
            .replay(TimeRange::all(), ReplayFilter::new().object("workflow", "nightly"))
            .unwrap();
        assert_eq!(env.events[0].event_id, id);
    }

    #[test]
    fn quiet_policies_lists_untouched_names() {
        let gov = governor();
        gov.register(&alice(), BUDGET, true, "initial").unwrap();
        gov.register(&alice(), COST, true, "initial").unwrap();
        let later = TimeRange::since(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(
            gov.quiet_policies(later).unwrap(),
            vec!["BudgetEnforcement".to_string(), "CostSpikeGuard".to_string()]
        );
        assert!(gov.quiet_policies(TimeRange::all()).unwrap().is_empty());
    }
}
