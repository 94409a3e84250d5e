// cooldown.rs — Explicit throttle for evaluation records.
//
// The caller owns a CooldownState and passes it to
// `Governor::evaluate_and_record`. Nothing here is global: two callers with
// separate states throttle independently, and evaluation itself never reads
// it.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct CooldownState {
    window: chrono::Duration,
    last_recorded: HashMap<String, DateTime<Utc>>,
}

impl CooldownState {
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::max_value()),
            last_recorded: HashMap::new(),
        }
    }

    /// True when `key` was not recorded within the window before `now`.
    /// A true answer marks `key` as recorded at `now`.
    pub fn should_record(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_recorded.get(key) {
            if now.signed_duration_since(*last) < self.window {
                return false;
            }
        }
        self.last_recorded.insert(key.to_string(), now);
        true
    }

    /// Forget all keys recorded before `now - window`.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let window = self.window;
        self.last_recorded
            .retain(|_, last| now.signed_duration_since(*last) < window);
    }

    pub fn len(&self) -> usize {
        self.last_recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_recorded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_is_throttled_within_window() {
        let mut cd = CooldownState::new(Duration::from_secs(60));
        let t0 = Utc::now();
        assert!(cd.should_record("cost@1", t0));
        assert!(!cd.should_record("cost@1", t0 + chrono::Duration::seconds(59)));
        assert!(cd.should_record("budget@1", t0));
        assert!(cd.should_record("cost@1", t0 + chrono::Duration::seconds(60)));
    }

    #[test]
    fn zero_window_never_throttles() {
        let mut cd = CooldownState::new(Duration::ZERO);
        let t0 = Utc::now();
        assert!(cd.should_record("k", t0));
        assert!(cd.should_record("k", t0));
    }

    #[test]
    fn prune_drops_expired_keys() {
        let mut cd = CooldownState::new(Duration::from_secs(10));
        let t0 = Utc::now();
        cd.should_record("a", t0);
        cd.should_record("b", t0 + chrono::Duration::seconds(8));
        cd.prune(t0 + chrono::Duration::seconds(12));
        assert_eq!(cd.len(), 1);
    }
}
