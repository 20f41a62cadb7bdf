use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    pub identity: IdentityConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub conversation: ConversationConfig,
    pub policy: PolicyConfig,
    pub schedule: ScheduleConfig,
    pub typo: TypoConfig,
    pub persona: PersonaConfig,
    /// Fixed seed for all stochastic decisions. Unset = seeded from entropy.
    pub rng_seed: Option<u64>,
}

impl MurmurConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: MurmurConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MURMUR_OWNER_ID") {
            self.policy.owner_id = v;
        }
        if let Ok(v) = std::env::var("MURMUR_BASE_URL") {
            self.llm.api_base = v;
        }
        if let Ok(v) = std::env::var("MURMUR_MODELS") {
            let models: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !models.is_empty() {
                self.llm.models = models;
            }
        }
        if let Ok(v) = std::env::var("MURMUR_UTC_OFFSET") {
            if let Ok(n) = v.parse() {
                self.schedule.utc_offset_hours = n;
            }
        }
        if let Ok(v) = std::env::var("MURMUR_SEED") {
            if let Ok(n) = v.parse() {
                self.rng_seed = Some(n);
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Display name the agent goes by in chat.
    pub name: String,
    /// Account user id on the platform, used for self-filtering and mentions.
    pub user_id: String,
    /// Alternate names people use for the agent (anti-echo guard counts these).
    pub aliases: Vec<String>,
    pub command_prefix: String,
    /// When set, denied commands and unauthorized attempts get silence or a
    /// terse acknowledgment instead of an explanation.
    pub stealth: bool,
    /// Sent when someone mentions the agent with nothing after the mention.
    pub mention_fallback_reply: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "murmur".to_string(),
            user_id: String::new(),
            aliases: vec![],
            command_prefix: "!".to_string(),
            stealth: false,
            mention_fallback_reply: "you mentioned me with nothing to say".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint base.
    pub api_base: String,
    /// Candidate models, shuffled and tried in order per generation.
    pub models: Vec<String>,
    /// Substituted when every model fails or returns a blank completion.
    pub fallback_reply: String,
    pub request_timeout_secs: u64,
    /// How many recent turns from the channel window go into each prompt.
    pub history_turns: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            models: vec![
                "llama-3.3-70b-versatile".to_string(),
                "llama-3.1-8b-instant".to_string(),
            ],
            fallback_reply: "huh".to_string(),
            request_timeout_secs: 30,
            history_turns: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub file: String,
    pub max_items: usize,
    /// Long-horizon context block: record cap and lookback in hours.
    pub context_limit: usize,
    pub context_horizon_hours: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            file: "message_memory.json".to_string(),
            max_items: 1000,
            context_limit: 15,
            context_horizon_hours: 48,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub max_history_length: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history_length: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Seeds the permission registry when no durable state file exists yet.
    pub owner_id: String,
    pub permissions_file: String,
    pub cooldowns_file: String,
    pub cooldown_secs: i64,
    pub trigger_words: Vec<String>,
    pub excluded_guilds: Vec<String>,
    /// Passive continuation: probability per eligible event, and how long a
    /// channel counts as an active conversation after our last response.
    pub passive_probability: f64,
    pub passive_window_secs: i64,
    /// Standing conversation mode: max age of our last turn to keep going.
    pub conversation_window_secs: i64,
    /// More than this many interposed messages and we send fresh, not a reply.
    pub reply_suppression_threshold: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            owner_id: String::new(),
            permissions_file: "permissions.json".to_string(),
            cooldowns_file: "cooldowns.json".to_string(),
            cooldown_secs: 300,
            trigger_words: vec![],
            excluded_guilds: vec![],
            passive_probability: 0.03,
            passive_window_secs: 600,
            conversation_window_secs: 1800,
            reply_suppression_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Fixed offset from UTC in hours; no daylight-saving adjustment.
    pub utc_offset_hours: i32,
    /// Period of the background schedule/presence loop.
    pub ambient_interval_secs: u64,
    /// When true, drop everything while asleep, even explicit mentions.
    pub strict_sleep: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 0,
            ambient_interval_secs: 300,
            strict_sleep: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TypoConfig {
    pub probability: f64,
    /// Bounds for the pause before the self-correcting edit, in milliseconds.
    pub correction_delay_min_ms: u64,
    pub correction_delay_max_ms: u64,
}

impl Default for TypoConfig {
    fn default() -> Self {
        Self {
            probability: 0.05,
            correction_delay_min_ms: 1500,
            correction_delay_max_ms: 4000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Overrides the built-in persona prompt when set.
    pub prompt: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = MurmurConfig::default();
        assert_eq!(cfg.identity.command_prefix, "!");
        assert_eq!(cfg.memory.max_items, 1000);
        assert_eq!(cfg.conversation.max_history_length, 25);
        assert_eq!(cfg.policy.passive_window_secs, 600);
        assert!(cfg.rng_seed.is_none());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[identity]
name = "pebble"
user_id = "42"
"#;
        let cfg: MurmurConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.identity.name, "pebble");
        assert_eq!(cfg.identity.user_id, "42");
        // Defaults for unspecified fields
        assert_eq!(cfg.llm.history_turns, 8);
        assert_eq!(cfg.schedule.ambient_interval_secs, 300);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
rng_seed = 7

[identity]
name = "pebble"
user_id = "42"
aliases = ["peb"]
stealth = true

[llm]
api_base = "http://localhost:9999/v1"
models = ["m1", "m2"]
fallback_reply = "eh"
history_turns = 4

[memory]
file = "mem.json"
max_items = 50

[policy]
owner_id = "1"
trigger_words = ["pebble"]
passive_probability = 0.1
reply_suppression_threshold = 5

[schedule]
utc_offset_hours = -5
strict_sleep = true

[typo]
probability = 1.0
"#;
        let cfg: MurmurConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.rng_seed, Some(7));
        assert!(cfg.identity.stealth);
        assert_eq!(cfg.llm.models, vec!["m1", "m2"]);
        assert_eq!(cfg.memory.max_items, 50);
        assert_eq!(cfg.policy.trigger_words, vec!["pebble"]);
        assert_eq!(cfg.schedule.utc_offset_hours, -5);
        assert!(cfg.schedule.strict_sleep);
        assert_eq!(cfg.typo.probability, 1.0);
        // Unspecified sub-fields keep defaults
        assert_eq!(cfg.policy.cooldown_secs, 300);
        assert_eq!(cfg.memory.context_limit, 15);
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        std::env::set_var("MURMUR_OWNER_ID", "999");
        std::env::set_var("MURMUR_MODELS", "a , b,");

        let mut cfg = MurmurConfig::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.policy.owner_id, "999");
        assert_eq!(cfg.llm.models, vec!["a", "b"]);

        std::env::remove_var("MURMUR_OWNER_ID");
        std::env::remove_var("MURMUR_MODELS");

        let cfg = MurmurConfig::load_or_default("/nonexistent/path.toml");
        assert_eq!(cfg.identity.name, "murmur");
    }
}
