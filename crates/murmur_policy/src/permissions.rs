//! Permission registry: who may trigger responses and commands, and where.
//!
//! Loaded once at process start, mutated only via administrative commands,
//! saved after every mutation. Save failures are logged; the in-memory state
//! stays authoritative.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionState {
    /// Single owner, immutable at runtime.
    pub owner_id: String,
    pub whitelist: HashSet<String>,
    /// Empty set is an explicit "unrestricted" sentinel: every channel is
    /// allowed. Non-empty means only the listed channels. Do not "fix" this
    /// polarity.
    pub allowed_channels: HashSet<String>,
    /// A present entry restricts response eligibility in that guild to
    /// members holding the mapped role. Absence means unrestricted.
    pub role_ping_targets: HashMap<String, String>,
}

pub struct PermissionRegistry {
    path: Option<PathBuf>,
    state: PermissionState,
}

impl PermissionRegistry {
    pub fn in_memory(owner_id: &str) -> Self {
        Self {
            path: None,
            state: PermissionState {
                owner_id: owner_id.to_string(),
                ..Default::default()
            },
        }
    }

    /// Load from disk; a missing or corrupt file yields a fresh state seeded
    /// with `owner_id` plus a logged warning, never a startup failure.
    pub fn load_or_default<P: AsRef<Path>>(path: P, owner_id: &str) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<PermissionState>(&content) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(
                        "Could not parse permissions file {}: {}. Starting fresh.",
                        path.display(),
                        e
                    );
                    PermissionState {
                        owner_id: owner_id.to_string(),
                        ..Default::default()
                    }
                }
            },
            Err(_) => PermissionState {
                owner_id: owner_id.to_string(),
                ..Default::default()
            },
        };
        Self {
            path: Some(path),
            state,
        }
    }

    pub fn state(&self) -> &PermissionState {
        &self.state
    }

    pub fn is_owner(&self, id: &str) -> bool {
        !self.state.owner_id.is_empty() && self.state.owner_id == id
    }

    /// The owner is always whitelisted.
    pub fn is_whitelisted(&self, id: &str) -> bool {
        self.is_owner(id) || self.state.whitelist.contains(id)
    }

    /// True when the allow-list is empty (unrestricted) or the channel is listed.
    pub fn is_channel_allowed(&self, channel_id: &str) -> bool {
        self.state.allowed_channels.is_empty() || self.state.allowed_channels.contains(channel_id)
    }

    /// The role required in `guild_id`, if that guild is gated at all.
    pub fn required_role(&self, guild_id: &str) -> Option<&str> {
        self.state.role_ping_targets.get(guild_id).map(|s| s.as_str())
    }

    pub fn whitelist_add(&mut self, id: &str) {
        self.state.whitelist.insert(id.to_string());
        self.save();
    }

    pub fn whitelist_remove(&mut self, id: &str) {
        self.state.whitelist.remove(id);
        self.save();
    }

    pub fn channel_allow(&mut self, channel_id: &str) {
        self.state.allowed_channels.insert(channel_id.to_string());
        self.save();
    }

    pub fn channel_deny(&mut self, channel_id: &str) {
        self.state.allowed_channels.remove(channel_id);
        self.save();
    }

    pub fn set_role_gate(&mut self, guild_id: &str, role_id: &str) {
        self.state
            .role_ping_targets
            .insert(guild_id.to_string(), role_id.to_string());
        self.save();
    }

    pub fn clear_role_gate(&mut self, guild_id: &str) {
        self.state.role_ping_targets.remove(guild_id);
        self.save();
    }

    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_json::to_string_pretty(&self.state)
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(path, json).map_err(anyhow::Error::from));
        if let Err(e) = result {
            tracing::error!("Failed to save permissions to {}: {}", path.display(), e);
        }
    }
}
