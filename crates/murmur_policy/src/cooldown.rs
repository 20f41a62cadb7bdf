//! Per-user cooldown ledger gating privileged commands.

use murmur_core::unix_now;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerState {
    last_used: HashMap<String, i64>,
}

pub struct CooldownLedger {
    path: Option<PathBuf>,
    cooldown_secs: i64,
    state: LedgerState,
}

impl CooldownLedger {
    pub fn in_memory(cooldown_secs: i64) -> Self {
        Self {
            path: None,
            cooldown_secs,
            state: LedgerState::default(),
        }
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P, cooldown_secs: i64) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(
                    "Could not parse cooldowns file {}: {}. Starting fresh.",
                    path.display(),
                    e
                );
                LedgerState::default()
            }),
            Err(_) => LedgerState::default(),
        };
        Self {
            path: Some(path),
            cooldown_secs,
            state,
        }
    }

    pub fn is_on_cooldown(&self, user_id: &str) -> bool {
        self.is_on_cooldown_at(user_id, unix_now())
    }

    pub fn is_on_cooldown_at(&self, user_id: &str, now: i64) -> bool {
        match self.state.last_used.get(user_id) {
            Some(last) => now - last < self.cooldown_secs,
            None => false,
        }
    }

    pub fn set_cooldown(&mut self, user_id: &str) {
        self.set_cooldown_at(user_id, unix_now());
    }

    pub fn set_cooldown_at(&mut self, user_id: &str, now: i64) {
        self.state.last_used.insert(user_id.to_string(), now);
        self.save();
    }

    /// Minutes until the cooldown expires, clamped to zero.
    pub fn remaining_minutes(&self, user_id: &str) -> i64 {
        self.remaining_minutes_at(user_id, unix_now())
    }

    pub fn remaining_minutes_at(&self, user_id: &str, now: i64) -> i64 {
        match self.state.last_used.get(user_id) {
            Some(last) => ((last + self.cooldown_secs - now).max(0) + 59) / 60,
            None => 0,
        }
    }

    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_json::to_string_pretty(&self.state)
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(path, json).map_err(anyhow::Error::from));
        if let Err(e) = result {
            tracing::error!("Failed to save cooldowns to {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_user_not_on_cooldown() {
        let ledger = CooldownLedger::in_memory(300);
        assert!(!ledger.is_on_cooldown("u1"));
        assert_eq!(ledger.remaining_minutes("u1"), 0);
    }

    #[test]
    fn test_cooldown_set_then_elapse() {
        let mut ledger = CooldownLedger::in_memory(300);
        let t0 = 1_000_000;
        ledger.set_cooldown_at("u1", t0);
        assert!(ledger.is_on_cooldown_at("u1", t0));
        assert_eq!(ledger.remaining_minutes_at("u1", t0), 5);
        assert!(ledger.is_on_cooldown_at("u1", t0 + 299));
        assert!(!ledger.is_on_cooldown_at("u1", t0 + 300));
        assert_eq!(ledger.remaining_minutes_at("u1", t0 + 300), 0);
        // Clamped, never negative
        assert_eq!(ledger.remaining_minutes_at("u1", t0 + 9999), 0);
    }

    #[test]
    fn test_remaining_rounds_up_partial_minutes() {
        let mut ledger = CooldownLedger::in_memory(300);
        let t0 = 1_000_000;
        ledger.set_cooldown_at("u1", t0);
        // 290s left reads as 5 minutes, 1s left reads as 1 minute
        assert_eq!(ledger.remaining_minutes_at("u1", t0 + 10), 5);
        assert_eq!(ledger.remaining_minutes_at("u1", t0 + 299), 1);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cd.json");
        let t0 = unix_now();
        {
            let mut ledger = CooldownLedger::load_or_default(&path, 300);
            ledger.set_cooldown_at("u1", t0);
        }
        let ledger = CooldownLedger::load_or_default(&path, 300);
        assert!(ledger.is_on_cooldown_at("u1", t0 + 1));
    }
}
