// registry.rs — Versioned policy registry.
//
// Versions of one policy name strictly increase; an older or equal version
// is refused even if the newer one was later disabled. The registry holds
// no audit handle: the governor commits the audit event first and then
// hands the registry a receipt.

use std::collections::BTreeMap;

use gv_policy::PolicyDefinition;

use crate::error::GovernorError;
use crate::lifecycle::{ActivationReceipt, Deployment, PolicyState};

#[derive(Debug, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, BTreeMap<u32, Deployment>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_version(&self, name: &str) -> Option<u32> {
        self.policies
            .get(name)
            .and_then(|versions| versions.keys().next_back().copied())
    }

    /// Check that `policy` may be registered as a new version.
    pub fn check_new_version(&self, policy: &PolicyDefinition) -> Result<(), GovernorError> {
        match self.latest_version(policy.name()) {
            Some(latest) if policy.version() <= latest => Err(GovernorError::VersionNotIncreasing {
                name: policy.name().to_string(),
                version: policy.version(),
                latest,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn insert(&mut self, deployment: Deployment) -> Result<&Deployment, GovernorError> {
        self.check_new_version(&deployment.policy)?;
        let version = deployment.version();
        let versions = self
            .policies
            .entry(deployment.name().to_string())
            .or_default();
        Ok(versions.entry(version).or_insert(deployment))
    }

    pub fn get(&self, name: &str, version: u32) -> Option<&Deployment> {
        self.policies.get(name).and_then(|v| v.get(&version))
    }

    pub fn require(&self, name: &str, version: u32) -> Result<&Deployment, GovernorError> {
        self.get(name, version)
            .ok_or_else(|| GovernorError::PolicyNotFound {
                name: name.to_string(),
                version,
            })
    }

    /// The version `evaluate` uses: the highest live version, else the
    /// highest draft. Disabled versions are never evaluated.
    pub fn evaluation_target(&self, name: &str) -> Option<&Deployment> {
        let versions = self.policies.get(name)?;
        versions
            .values()
            .rev()
            .find(|d| d.state.is_live())
            .or_else(|| {
                versions
                    .values()
                    .rev()
                    .find(|d| d.state == PolicyState::Draft)
            })
    }

    pub(crate) fn apply(&mut self, receipt: &ActivationReceipt) -> Result<&Deployment, GovernorError> {
        let deployment = self
            .policies
            .get_mut(receipt.policy())
            .and_then(|v| v.get_mut(&receipt.version()))
            .ok_or_else(|| GovernorError::PolicyNotFound {
                name: receipt.policy().to_string(),
                version: receipt.version(),
            })?;
        deployment.apply(receipt)?;
        Ok(deployment)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Every deployment, by name then version.
    pub fn iter(&self) -> impl Iterator<Item = &Deployment> {
        self.policies.values().flat_map(|v| v.values())
    }

    pub fn len(&self) -> usize {
        self.policies.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn draft(version: u32) -> Deployment {
        let policy = gv_policy::compile(&format!(
            "policy Budget version {} mode ENFORCE; when spend > limit then block",
            version
        ))
        .unwrap();
        Deployment::draft(policy, Uuid::now_v7())
    }

    fn advance(reg: &mut PolicyRegistry, version: u32, from: PolicyState, to: PolicyState) {
        reg.apply(&ActivationReceipt::new(Uuid::now_v7(), "Budget", version, from, to))
            .unwrap();
    }

    #[test]
    fn versions_must_increase() {
        let mut reg = PolicyRegistry::new();
        reg.insert(draft(2)).unwrap();
        assert!(matches!(
            reg.insert(draft(2)),
            Err(GovernorError::VersionNotIncreasing { latest: 2, .. })
        ));
        assert!(reg.insert(draft(1)).is_err());
        reg.insert(draft(3)).unwrap();
        assert_eq!(reg.latest_version("Budget"), Some(3));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn live_version_wins_over_newer_draft() {
        let mut reg = PolicyRegistry::new();
        reg.insert(draft(1)).unwrap();
        reg.insert(draft(2)).unwrap();
        assert_eq!(reg.evaluation_target("Budget").unwrap().version(), 2);

        advance(&mut reg, 1, PolicyState::Draft, PolicyState::Monitor);
        assert_eq!(reg.evaluation_target("Budget").unwrap().version(), 1);

        advance(&mut reg, 1, PolicyState::Monitor, PolicyState::Disabled);
        assert_eq!(reg.evaluation_target("Budget").unwrap().version(), 2);
    }

    #[test]
    fn disabled_only_policy_has_no_target() {
        let mut reg = PolicyRegistry::new();
        reg.insert(draft(1)).unwrap();
        advance(&mut reg, 1, PolicyState::Draft, PolicyState::Monitor);
        advance(&mut reg, 1, PolicyState::Monitor, PolicyState::Disabled);
        assert!(reg.evaluation_target("Budget").is_none());
        assert!(reg.evaluation_target("Unknown").is_none());
    }
}
