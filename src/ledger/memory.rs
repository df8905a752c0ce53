use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    subscription_period, validate_amount, validate_user, ChannelInfo, LedgerError,
    LoyaltyLedger, UserInfo, NO_TOP_GIFTER,
};

#[derive(Debug, Clone)]
struct Subscription {
    user: String,
    gifted_by: Option<String>,
    at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Cheer {
    user: String,
    amount: i64,
}

#[derive(Debug, Default)]
struct State {
    subscriptions: Vec<Subscription>,
    cheers: Vec<Cheer>,
}

impl State {
    /// Most recent subscription of `user`; later records win ties.
    fn latest_sub(&self, user: &str) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .filter(|s| s.user == user)
            .max_by_key(|s| s.at)
    }

    fn is_active(&self, user: &str, now: DateTime<Utc>) -> bool {
        self.latest_sub(user)
            .is_some_and(|s| now - s.at < subscription_period())
    }
}

/// Ledger kept entirely in memory. Nothing survives a restart; used by tests
/// and dry runs.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscription record with an explicit timestamp.
    #[cfg(test)]
    pub(crate) async fn record_subscription(
        &self,
        user: &str,
        gifted_by: Option<&str>,
        at: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().await;
        state.subscriptions.push(Subscription {
            user: user.to_string(),
            gifted_by: gifted_by.map(str::to_string),
            at,
        });
    }
}

#[async_trait]
impl LoyaltyLedger for InMemoryLedger {
    async fn subscribe(&self, user: &str) -> Result<(), LedgerError> {
        validate_user(user)?;
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if state.is_active(user, now) {
            return Err(LedgerError::AlreadySubscribed(user.to_string()));
        }

        state.subscriptions.push(Subscription {
            user: user.to_string(),
            gifted_by: None,
            at: now,
        });
        Ok(())
    }

    async fn gift(&self, target: &str, gifter: &str) -> Result<(), LedgerError> {
        validate_user(target)?;
        validate_user(gifter)?;
        if target == gifter {
            return Err(LedgerError::SelfGift);
        }

        let now = Utc::now();
        let mut state = self.state.lock().await;

        let gifted_recently = state.subscriptions.iter().any(|s| {
            s.user == target
                && s.gifted_by.as_deref() == Some(gifter)
                && now - s.at < subscription_period()
        });
        if gifted_recently {
            return Err(LedgerError::AlreadyGifted);
        }
        if state.is_active(target, now) {
            return Err(LedgerError::AlreadySubscribed(target.to_string()));
        }

        state.subscriptions.push(Subscription {
            user: target.to_string(),
            gifted_by: Some(gifter.to_string()),
            at: now,
        });
        Ok(())
    }

    async fn cheer(&self, user: &str, amount: i64) -> Result<(), LedgerError> {
        validate_user(user)?;
        validate_amount(amount)?;

        let mut state = self.state.lock().await;
        state.cheers.push(Cheer {
            user: user.to_string(),
            amount,
        });
        Ok(())
    }

    async fn user_info(&self, user: &str) -> UserInfo {
        let state = self.state.lock().await;

        let gifted_from = state
            .subscriptions
            .iter()
            .filter(|s| s.user == user && s.gifted_by.is_some())
            .max_by_key(|s| s.at)
            .and_then(|s| s.gifted_by.clone());

        UserInfo {
            months_subbed: state.subscriptions.iter().filter(|s| s.user == user).count() as u32,
            last_sub: state.latest_sub(user).map(|s| s.at),
            gifts_given: state
                .subscriptions
                .iter()
                .filter(|s| s.gifted_by.as_deref() == Some(user))
                .count() as u32,
            gifted_from,
            bits_cheered: state
                .cheers
                .iter()
                .filter(|c| c.user == user)
                .map(|c| c.amount)
                .sum(),
        }
    }

    async fn channel_info(&self) -> ChannelInfo {
        let now = Utc::now();
        let state = self.state.lock().await;

        let mut latest: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for s in &state.subscriptions {
            let entry = latest.entry(s.user.as_str()).or_insert(s.at);
            if s.at > *entry {
                *entry = s.at;
            }
        }
        let active_subscribers = latest
            .values()
            .filter(|at| now - **at < subscription_period())
            .count() as u32;

        let mut gifts: BTreeMap<&str, u32> = BTreeMap::new();
        for gifter in state.subscriptions.iter().filter_map(|s| s.gifted_by.as_deref()) {
            *gifts.entry(gifter).or_default() += 1;
        }
        // Most gifts wins; ties go to the alphabetically first name
        let top_gifter = gifts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| NO_TOP_GIFTER.to_string());

        ChannelInfo {
            active_subscribers,
            total_gifts: gifts.values().sum(),
            total_bits: state.cheers.iter().map(|c| c.amount).sum(),
            top_gifter,
        }
    }
}
