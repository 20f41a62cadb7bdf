//! Console transport: a stand-in chat platform for local interactive runs.
//! Sends print to stdout; presence and voice are log-only.

use anyhow::Result;
use async_trait::async_trait;
use murmur_core::{ChatEvent, ChatTransport, Presence};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct ConsoleTransport {
    agent_name: String,
    next_id: AtomicUsize,
}

impl ConsoleTransport {
    pub fn new(agent_name: &str) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            next_id: AtomicUsize::new(1),
        }
    }

    fn mint_id(&self) -> String {
        format!("console-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn send(&self, _channel_id: &str, text: &str) -> Result<String> {
        println!("{}: {}", self.agent_name, text);
        Ok(self.mint_id())
    }

    async fn edit(&self, message_id: &str, text: &str) -> Result<()> {
        println!("{} (edited {}): {}", self.agent_name, message_id, text);
        Ok(())
    }

    async fn reply(&self, _message_id: &str, text: &str) -> Result<String> {
        println!("{}: {}", self.agent_name, text);
        Ok(self.mint_id())
    }

    async fn set_presence(&self, status: Presence, activity: Option<&str>) -> Result<()> {
        tracing::debug!(?status, ?activity, "presence change");
        Ok(())
    }

    async fn typing(&self, _channel_id: &str) -> Result<()> {
        Ok(())
    }

    async fn history(&self, _channel_id: &str, _after_id: &str, _limit: usize) -> Result<Vec<ChatEvent>> {
        Ok(Vec::new())
    }

    async fn join_voice(&self, _channel_id: &str) -> Result<()> {
        tracing::debug!("voice join requested on console transport");
        Ok(())
    }

    async fn leave_voice(&self) -> Result<()> {
        Ok(())
    }
}
