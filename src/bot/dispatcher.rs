use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::bot::cheer;
use crate::bot::command::ParsedCommand;
use crate::bot::outgoing::OutgoingQueue;
use crate::ledger::LoyaltyLedger;
use crate::platform::InboundMessage;

/// Emotes unlocked by a subscription, advertised in sub replies
pub const SUB_EMOTES: &str = "SeemsGood VoHiYo 4Head GivePLZ Kappa MingLee TableHere";

/// What the community's bits are worth, picked by `total_bits % TREATS.len()`
pub const TREATS: &[&str] = &[
    "teddy bear",
    "hot choccy",
    "blanket",
    "desk plant",
    "wii u",
    "copy of mario maker",
    "rune scim",
    "egg salad",
    "buzzy beetle",
    "mazarati",
    "golden kappa",
    "time machine",
];

/// The treat `total_bits` community bits add up to
pub fn treat_for(total_bits: i64) -> &'static str {
    TREATS[total_bits.rem_euclid(TREATS.len() as i64) as usize]
}

/// Largest single cheer the bot accepts
pub const MAX_CHEER: i64 = 1_000_000;

/// The chat commands the bot answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GiftSub,
    Sub,
    Me,
    Cheer,
    Stats,
}

impl Command {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "giftsub" => Some(Command::GiftSub),
            "sub" => Some(Command::Sub),
            "me" => Some(Command::Me),
            "cheer" => Some(Command::Cheer),
            "stats" => Some(Command::Stats),
            _ => None,
        }
    }
}

/// Turns chat messages into ledger calls and replies.
///
/// Safe to share between tasks: the only mutable state it touches is behind
/// the ledger and the outgoing queue.
pub struct Dispatcher {
    ledger: Arc<dyn LoyaltyLedger>,
    outgoing: OutgoingQueue,
}

impl Dispatcher {
    pub fn new(ledger: Arc<dyn LoyaltyLedger>, outgoing: OutgoingQueue) -> Self {
        Self { ledger, outgoing }
    }

    /// Handle one chat message, queueing a reply if it warrants one.
    pub async fn on_message(&self, message: &InboundMessage) {
        if let Some(reply) = self.reply_to(message).await {
            self.outgoing.enqueue(reply).await;
        }
    }

    /// The reply for `message`, or `None` for ordinary chatter.
    pub async fn reply_to(&self, message: &InboundMessage) -> Option<String> {
        let bits = cheer::scan(&message.text);
        if bits > 0 {
            info!("{} cheered {} bits inline", message.sender_login, bits);
            return Some(self.do_cheer(message, bits).await);
        }

        let parsed = ParsedCommand::parse(&message.text);
        let Some(command) = Command::from_keyword(&parsed.keyword) else {
            debug!("{}: {}", message.sender_login, message.text);
            return None;
        };

        let reply = match command {
            Command::GiftSub => self.gift_sub(message, &parsed).await,
            Command::Sub => self.subscribe(message).await,
            Command::Me => self.about_me(message).await,
            Command::Cheer => self.cheer(message, &parsed).await,
            Command::Stats => self.stats().await,
        };
        Some(reply)
    }

    async fn subscribe(&self, message: &InboundMessage) -> String {
        let name = &message.sender_display_name;
        if let Err(e) = self.ledger.subscribe(&message.sender_login).await {
            warn!("err sub: {}", e);
            return format!("{}, your sub failed because `{}`", name, e);
        }
        format!(
            "Thank you {} for the sub! You can now use our emotes: {} #IfYouWant!",
            name, SUB_EMOTES
        )
    }

    async fn gift_sub(&self, message: &InboundMessage, parsed: &ParsedCommand) -> String {
        let Some(target) = parsed.argument(0) else {
            return "To gift sub, type !giftsub <username>".to_string();
        };

        let name = &message.sender_display_name;
        if let Err(e) = self.ledger.gift(target, &message.sender_login).await {
            warn!("err giftsub: {}", e);
            return format!("{}, your giftsub failed because `{}`", name, e);
        }

        let count = self.ledger.user_info(&message.sender_login).await.gifts_given;
        format!(
            "Thank you {} for the gift sub to {}! They can now use {}! You have given {} gift subs to this channel.",
            name, target, SUB_EMOTES, count
        )
    }

    async fn about_me(&self, message: &InboundMessage) -> String {
        let info = self.ledger.user_info(&message.sender_login).await;
        let now = Utc::now();
        let mut parts = Vec::new();

        match info.last_sub {
            Some(last) if info.is_subscribed_at(now) => parts.push(format!(
                "have been subscribed for {} months, most recently {} ago",
                info.months_subbed,
                format_elapsed(round_to_seconds(now - last))
            )),
            _ => parts.push("are not currently subscribed".to_string()),
        }

        if info.gifts_given == 0 {
            parts.push("have given 0 gift subs to the community".to_string());
        } else {
            parts.push(format!("have given {} gift subs", info.gifts_given));
        }

        if let Some(gifter) = &info.gifted_from {
            parts.push(format!("last received a gift sub from {}", gifter));
        }

        if info.bits_cheered == 0 {
            parts.push("have not cheered".to_string());
        } else {
            parts.push(format!("have cheered {} bits", info.bits_cheered));
        }

        format!("{}, you: {}.", message.sender_display_name, parts.join("; "))
    }

    async fn cheer(&self, message: &InboundMessage, parsed: &ParsedCommand) -> String {
        let Some(arg) = parsed.argument(0) else {
            return "To cheer, type !cheer <amount>, or Cheer100".to_string();
        };

        match arg.parse::<i64>() {
            Ok(amount) => self.do_cheer(message, amount).await,
            Err(_) => format!("{}, you must cheer a number.", message.sender_display_name),
        }
    }

    async fn do_cheer(&self, message: &InboundMessage, amount: i64) -> String {
        let name = &message.sender_display_name;
        if amount < 0 {
            return format!("{}, stop trying to steal my bits! :(", name);
        }
        if amount > MAX_CHEER {
            return format!("{}, I can't allow you to be so generous! GivePLZ", name);
        }

        if let Err(e) = self.ledger.cheer(&message.sender_login, amount).await {
            warn!("err cheering: {}", e);
            return format!("{}, your cheer failed because `{}`", name, e);
        }

        let user = self.ledger.user_info(&message.sender_login).await;
        let channel = self.ledger.channel_info().await;
        format!(
            "{}, thanks for cheering {} bits, for a total of {}! The community has given {} bits, enough for a new {}!",
            name,
            amount,
            user.bits_cheered,
            channel.total_bits,
            treat_for(channel.total_bits)
        )
    }

    async fn stats(&self) -> String {
        let info = self.ledger.channel_info().await;
        format!(
            "There are currently {} active subscribers! The community has given {} gift subs and cheered {} bits, and the top gift subber is {}",
            info.active_subscribers, info.total_gifts, info.total_bits, info.top_gifter
        )
    }
}

fn round_to_seconds(elapsed: chrono::Duration) -> i64 {
    (elapsed.num_milliseconds().max(0) + 500) / 1000
}

/// Render whole seconds the way chat users are used to reading durations:
/// `45s`, `2m5s`, `26h0m3s`.
fn format_elapsed(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    let (hours, minutes, secs) = (total_secs / 3600, total_secs % 3600 / 60, total_secs % 60);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
