use serde::{Deserialize, Serialize};

/// An inbound chat event as delivered by the transport, validated at the
/// boundary before it enters the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub author_name: String,
    pub channel_id: String,
    /// None for direct messages.
    pub guild_id: Option<String>,
    /// User ids explicitly mentioned in the text.
    pub mentions: Vec<String>,
    /// Id of the message this event replies to, if threaded.
    pub reply_to_id: Option<String>,
    /// Role ids the author holds in the originating guild.
    pub author_roles: Vec<String>,
    /// True for bot/system senders other than real users.
    pub author_is_automated: bool,
    /// Unix seconds.
    pub timestamp: i64,
}

impl ChatEvent {
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            author_id: author_id.into(),
            author_name: author_name.into(),
            channel_id: channel_id.into(),
            guild_id: None,
            mentions: Vec::new(),
            reply_to_id: None,
            author_roles: Vec::new(),
            author_is_automated: false,
            timestamp: unix_now(),
        }
    }

    /// True when the event arrived outside any guild (a direct message).
    pub fn is_direct(&self) -> bool {
        self.guild_id.is_none()
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_message_detection() {
        let mut ev = ChatEvent::new("1", "c1", "u1", "alice", "hi");
        assert!(ev.is_direct());
        ev.guild_id = Some("g1".to_string());
        assert!(!ev.is_direct());
    }
}
