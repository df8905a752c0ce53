pub mod twitch;

use anyhow::Result;
use async_trait::async_trait;

/// A chat message received from the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Lowercase login name, the canonical identity of the sender
    pub sender_login: String,
    /// Display name of the sender, used when addressing them in replies
    pub sender_display_name: String,
    /// The raw message text
    pub text: String,
}

impl InboundMessage {
    pub fn new(login: &str, display_name: &str, text: &str) -> Self {
        Self {
            sender_login: login.to_string(),
            sender_display_name: display_name.to_string(),
            text: text.to_string(),
        }
    }
}

/// Sends a line of text to the joined channel.
/// Best effort: callers log failures and move on.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn say(&self, text: &str) -> Result<()>;
}
