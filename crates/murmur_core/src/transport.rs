//! Chat transport collaborator contract.
//!
//! The platform client (event delivery, send/edit/reply, presence, voice) is
//! external to the core; the orchestrator only ever talks to this trait.
//! Failures raised here are caught and logged by the caller, never fatal.

use crate::event::ChatEvent;
use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Idle,
    Invisible,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a fresh message to a channel, returning the new message id.
    async fn send(&self, channel_id: &str, text: &str) -> Result<String>;

    /// Edit a previously sent message in place.
    async fn edit(&self, message_id: &str, text: &str) -> Result<()>;

    /// Post a threaded reply to an existing message, returning the new id.
    async fn reply(&self, message_id: &str, text: &str) -> Result<String>;

    /// Update the agent's presence indicator.
    async fn set_presence(&self, status: Presence, activity: Option<&str>) -> Result<()>;

    /// Show a typing indicator in a channel. Best-effort; expires on its own.
    async fn typing(&self, channel_id: &str) -> Result<()>;

    /// Fetch events posted to `channel_id` after the message `after_id`,
    /// oldest first, at most `limit`.
    async fn history(&self, channel_id: &str, after_id: &str, limit: usize)
        -> Result<Vec<ChatEvent>>;

    async fn join_voice(&self, channel_id: &str) -> Result<()>;

    async fn leave_voice(&self) -> Result<()>;
}
