use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use twitch_irc::login::StaticLoginCredentials;
use twitch_irc::message::{PrivmsgMessage, ServerMessage};
use twitch_irc::{ClientConfig, SecureTCPTransport, TwitchIRCClient};

use crate::config::TwitchConfig;
use crate::platform::{ChatSender, InboundMessage};

type Client = TwitchIRCClient<SecureTCPTransport, StaticLoginCredentials>;

/// Twitch rejects the PASS line with this notice when the token is wrong or expired
const LOGIN_FAILED_NOTICE: &str = "Login authentication failed";

/// Handle used to speak in the joined channel
#[derive(Clone)]
pub struct TwitchChat {
    client: Client,
    channel: String,
}

#[async_trait]
impl ChatSender for TwitchChat {
    async fn say(&self, text: &str) -> Result<()> {
        self.client
            .say(self.channel.clone(), text.to_string())
            .await
            .map_err(|e| anyhow!("Failed to say in #{}: {}", self.channel, e))
    }
}

/// Strip the `oauth:` prefix some token generators include; twitch-irc adds its own.
fn bare_token(token: &str) -> &str {
    token.strip_prefix("oauth:").unwrap_or(token)
}

/// Connect to Twitch IRC with the bot's credentials and join the configured channel.
pub async fn connect(
    config: &TwitchConfig,
) -> Result<(TwitchChat, UnboundedReceiver<ServerMessage>)> {
    let credentials = StaticLoginCredentials::new(
        config.user_name.clone(),
        Some(bare_token(&config.oauth_token).to_string()),
    );
    let (incoming, client) = Client::new(ClientConfig::new_simple(credentials));

    info!("Connecting to Twitch as {}...", config.user_name);
    client.connect().await;

    client
        .join(config.channel.clone())
        .map_err(|e| anyhow!("Failed to join channel '{}': {}", config.channel, e))?;
    info!("Joined #{}", config.channel);

    Ok((
        TwitchChat {
            client,
            channel: config.channel.clone(),
        },
        incoming,
    ))
}

fn to_inbound(msg: &PrivmsgMessage) -> InboundMessage {
    InboundMessage::new(&msg.sender.login, &msg.sender.name, &msg.message_text)
}

/// Consume server messages until the connection is gone, handing every chat
/// message from `channel` to `on_message`.
pub async fn run<F>(
    mut incoming: UnboundedReceiver<ServerMessage>,
    channel: &str,
    mut on_message: F,
) -> Result<()>
where
    F: FnMut(InboundMessage),
{
    while let Some(message) = incoming.recv().await {
        match message {
            ServerMessage::Privmsg(msg) if msg.channel_login == channel => {
                on_message(to_inbound(&msg));
            }
            ServerMessage::GlobalUserState(_) => info!("connected!"),
            ServerMessage::Notice(notice)
                if notice.channel_login.is_none()
                    && notice.message_text.contains(LOGIN_FAILED_NOTICE) =>
            {
                bail!("Twitch rejected the login: {}", notice.message_text);
            }
            ServerMessage::Notice(notice) => {
                warn!("Notice from Twitch: {}", notice.message_text);
            }
            other => debug!("Ignoring server message: {:?}", other.source().command),
        }
    }

    info!("Twitch message stream closed");
    Ok(())
}
