pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

pub use memory::InMemoryLedger;
pub use sqlite::SqliteLedger;

/// How long one subscription (bought or gifted) stays active
pub const SUBSCRIPTION_DAYS: i64 = 30;

/// Reported as the top gifter before anyone has gifted
pub const NO_TOP_GIFTER: &str = "nobody";

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("{0} is already subscribed")]
    AlreadySubscribed(String),
    #[error("already gifted this month")]
    AlreadyGifted,
    #[error("you can't gift a sub to yourself")]
    SelfGift,
    #[error("'{0}' is not a valid username")]
    InvalidUser(String),
    #[error("cheer amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Loyalty record of a single user. The default value describes a user the
/// ledger has never seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub months_subbed: u32,
    pub last_sub: Option<DateTime<Utc>>,
    pub gifts_given: u32,
    /// Gifter of the most recent gifted subscription
    pub gifted_from: Option<String>,
    pub bits_cheered: i64,
}

impl UserInfo {
    pub fn is_subscribed_at(&self, now: DateTime<Utc>) -> bool {
        self.last_sub
            .is_some_and(|last| now - last < subscription_period())
    }
}

/// Channel-wide aggregates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub active_subscribers: u32,
    pub total_gifts: u32,
    pub total_bits: i64,
    pub top_gifter: String,
}

impl Default for ChannelInfo {
    fn default() -> Self {
        Self {
            active_subscribers: 0,
            total_gifts: 0,
            total_bits: 0,
            top_gifter: NO_TOP_GIFTER.to_string(),
        }
    }
}

/// The loyalty ledger consumed by the dispatcher.
///
/// Implementations synchronize internally; every method may be called from
/// several tasks at once. `user_info` and `channel_info` never fail: storage
/// problems are logged and the zero value is returned.
#[async_trait]
pub trait LoyaltyLedger: Send + Sync {
    async fn subscribe(&self, user: &str) -> Result<(), LedgerError>;
    async fn gift(&self, target: &str, gifter: &str) -> Result<(), LedgerError>;
    async fn cheer(&self, user: &str, amount: i64) -> Result<(), LedgerError>;
    async fn user_info(&self, user: &str) -> UserInfo;
    async fn channel_info(&self) -> ChannelInfo;
}

pub fn subscription_period() -> Duration {
    Duration::days(SUBSCRIPTION_DAYS)
}

/// Twitch logins are ASCII letters, digits and underscores.
pub(crate) fn validate_user(user: &str) -> Result<(), LedgerError> {
    if !user.is_empty() && user.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(LedgerError::InvalidUser(user.to_string()))
    }
}

pub(crate) fn validate_amount(amount: i64) -> Result<(), LedgerError> {
    if amount > 0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}
