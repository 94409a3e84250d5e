// query.rs — Time ranges and filters for replay queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gv_audit::{AuditEvent, ChainKey, Intent};

use crate::error::ReplayError;

/// Half-open interval `[start, end)`. A missing bound is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Everything ever recorded.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ReplayError> {
        if start >= end {
            return Err(ReplayError::InvalidRange { start, end });
        }
        Ok(Self {
            start: Some(start),
            end: Some(end),
        })
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at < e)
    }
}

/// Conjunctive event filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayFilter {
    pub tenant_id: Option<String>,
    pub object_type: Option<String>,
    pub object_id: Option<String>,
    pub capability_id: Option<String>,
    pub actor_id: Option<String>,
    pub intent: Option<Intent>,
}

impl ReplayFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn object(mut self, object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self.object_id = Some(object_id.into());
        self
    }

    /// Restrict to one chain.
    pub fn chain(self, key: &ChainKey) -> Self {
        self.tenant(key.tenant_id.clone())
            .object(key.object_type.clone(), key.object_id.clone())
    }

    pub fn capability(mut self, capability_id: impl Into<String>) -> Self {
        self.capability_id = Some(capability_id.into());
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }
        eq(&self.tenant_id, &event.tenant_id)
            && eq(&self.object_type, &event.object_type)
            && eq(&self.object_id, &event.object_id)
            && eq(&self.capability_id, &event.capability_id)
            && eq(&self.actor_id, &event.actor_id)
            && self.intent.map_or(true, |i| i == event.intent)
    }
}

/// A complete replay question, echoed back in the envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayQuery {
    pub range: TimeRange,
    pub filter: ReplayFilter,
    /// Whether chain verification was requested.
    pub verify: bool,
}

impl ReplayQuery {
    pub fn selects(&self, event: &AuditEvent) -> bool {
        self.range.contains(event.timestamp) && self.filter.matches(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn range_is_half_open() {
        let start = Utc::now();
        let end = start + Duration::seconds(10);
        let range = TimeRange::between(start, end).unwrap();
        assert!(range.contains(start));
        assert!(range.contains(end - Duration::milliseconds(1)));
        assert!(!range.contains(end));
        assert!(!range.contains(start - Duration::milliseconds(1)));
        assert!(TimeRange::all().contains(end));
    }

    #[test]
    fn empty_or_inverted_range_is_rejected() {
        let now = Utc::now();
        assert!(TimeRange::between(now, now).is_err());
        assert!(TimeRange::between(now, now - Duration::seconds(1)).is_err());
    }
}
