//! Long-horizon conversational memory.
//!
//! An append-bounded log of observed and emitted messages, persisted as a
//! single JSON blob. The in-memory state is authoritative: a failed save is
//! logged and the process carries on.

use chrono::{DateTime, Utc};
use murmur_core::unix_now;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    User,
    Assistant,
}

/// One retained message. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(rename = "user_name")]
    pub speaker_name: String,
    pub channel_id: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(deserialize_with = "de_unix_secs")]
    pub timestamp: i64,
    #[serde(rename = "date")]
    pub derived_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreMetadata {
    created_at: String,
    version: String,
    total_messages: usize,
}

impl StoreMetadata {
    fn fresh() -> Self {
        Self {
            created_at: Utc::now().to_rfc3339(),
            version: "1.0".to_string(),
            total_messages: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreData {
    messages: Vec<MessageRecord>,
    metadata: StoreMetadata,
}

impl StoreData {
    fn fresh() -> Self {
        Self {
            messages: Vec::new(),
            metadata: StoreMetadata::fresh(),
        }
    }
}

pub struct MemoryStore {
    path: Option<PathBuf>,
    max_items: usize,
    data: StoreData,
}

impl MemoryStore {
    /// Volatile store with no backing file, for tests and dry runs.
    pub fn in_memory(max_items: usize) -> Self {
        Self {
            path: None,
            max_items,
            data: StoreData::fresh(),
        }
    }

    /// Load the store blob from disk. A missing or corrupt file yields a
    /// freshly initialized empty store plus a logged warning, never an error.
    pub fn load_or_empty<P: AsRef<Path>>(path: P, max_items: usize) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<StoreData>(&content) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(
                        "Could not parse memory file {}: {}. Starting empty.",
                        path.display(),
                        e
                    );
                    StoreData::fresh()
                }
            },
            Err(_) => StoreData::fresh(),
        };
        Self {
            path: Some(path),
            max_items,
            data,
        }
    }

    /// Append a message. Blank text is a no-op. Evicts oldest records past
    /// capacity and persists synchronously, best-effort.
    pub fn append(
        &mut self,
        text: &str,
        speaker: &str,
        channel: &str,
        kind: RecordKind,
        timestamp: Option<i64>,
    ) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let timestamp = timestamp.unwrap_or_else(unix_now);
        let record = MessageRecord {
            id: format!("{}_{}_{}", timestamp, speaker, self.data.messages.len()),
            text: text.to_string(),
            speaker_name: speaker.to_string(),
            channel_id: channel.to_string(),
            kind,
            timestamp,
            derived_date: derived_date(timestamp),
        };
        self.data.messages.push(record);
        if self.data.messages.len() > self.max_items {
            let excess = self.data.messages.len() - self.max_items;
            self.data.messages.drain(..excess);
        }
        self.data.metadata.total_messages = self.data.messages.len();
        self.save();
    }

    /// Records no older than `horizon_hours`, newest first, at most `limit`.
    pub fn recent(
        &self,
        limit: usize,
        horizon_hours: i64,
        speaker: Option<&str>,
    ) -> Vec<&MessageRecord> {
        let cutoff = unix_now() - horizon_hours * 3600;
        let mut matches: Vec<&MessageRecord> = self
            .data
            .messages
            .iter()
            .filter(|m| m.timestamp >= cutoff)
            .filter(|m| speaker.map_or(true, |s| m.speaker_name == s))
            .collect();
        matches.sort_by_key(|m| std::cmp::Reverse(m.timestamp));
        matches.truncate(limit);
        matches
    }

    /// Render recent records as a transcript (oldest first) framed by markers.
    /// Returns exactly `""` when nothing matches; callers omit the section
    /// entirely in that case rather than emitting empty markers.
    pub fn context_block(&self, limit: usize, horizon_hours: i64) -> String {
        let recent = self.recent(limit, horizon_hours, None);
        if recent.is_empty() {
            return String::new();
        }
        let mut lines = vec!["=== LEARNED MESSAGES FOR CONTEXT ===".to_string()];
        for record in recent.iter().rev() {
            let stamp = DateTime::from_timestamp(record.timestamp, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| record.timestamp.to_string());
            lines.push(format!("[{}] {}: {}", stamp, record.speaker_name, record.text));
        }
        lines.push("=== END CONTEXT ===".to_string());
        lines.join("\n")
    }

    /// Case-insensitive substring search over all retained records.
    pub fn search(&self, query: &str, speaker: Option<&str>) -> Vec<&MessageRecord> {
        let query = query.to_lowercase();
        self.data
            .messages
            .iter()
            .filter(|m| m.text.to_lowercase().contains(&query))
            .filter(|m| speaker.map_or(true, |s| m.speaker_name == s))
            .collect()
    }

    /// Reset to an empty store with fresh metadata.
    pub fn clear(&mut self) {
        self.data = StoreData::fresh();
        self.save();
    }

    pub fn len(&self) -> usize {
        self.data.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.messages.is_empty()
    }

    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_json::to_string_pretty(&self.data)
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(path, json).map_err(anyhow::Error::from));
        if let Err(e) = result {
            // In-memory state stays authoritative; no retry, no rollback.
            tracing::error!("Failed to save memory to {}: {}", path.display(), e);
        }
    }
}

/// Older store blobs carry fractional unix timestamps; accept either form
/// and keep whole seconds.
fn de_unix_secs<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Ok(secs as i64)
}

fn derived_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
