use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use super::{
    subscription_period, validate_amount, validate_user, ChannelInfo, LedgerError,
    LoyaltyLedger, UserInfo, NO_TOP_GIFTER,
};

/// Thread-safe SQLite loyalty ledger
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("Loyalty ledger initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                user_login TEXT NOT NULL,
                gifted_by TEXT,
                subscribed_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_subscriptions_user
                ON subscriptions(user_login, subscribed_at);

            CREATE INDEX IF NOT EXISTS idx_subscriptions_gifter
                ON subscriptions(gifted_by);

            CREATE TABLE IF NOT EXISTS cheers (
                id TEXT PRIMARY KEY,
                user_login TEXT NOT NULL,
                amount INTEGER NOT NULL,
                cheered_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cheers_user
                ON cheers(user_login);
            ",
        )
        .context("Failed to create ledger tables")?;
        Ok(())
    }

    /// Append a subscription record with an explicit timestamp.
    #[cfg(test)]
    pub(crate) async fn record_subscription(
        &self,
        user: &str,
        gifted_by: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().await;
        insert_subscription(&conn, user, gifted_by, at)
    }

    fn query_user_info(conn: &Connection, user: &str) -> rusqlite::Result<UserInfo> {
        let (months_subbed, last_sub): (u32, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), MAX(subscribed_at) FROM subscriptions WHERE user_login = ?1",
            rusqlite::params![user],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let gifts_given: u32 = conn.query_row(
            "SELECT COUNT(*) FROM subscriptions WHERE gifted_by = ?1",
            rusqlite::params![user],
            |row| row.get(0),
        )?;

        let gifted_from: Option<String> = conn
            .query_row(
                "SELECT gifted_by FROM subscriptions
                 WHERE user_login = ?1 AND gifted_by IS NOT NULL
                 ORDER BY subscribed_at DESC, rowid DESC LIMIT 1",
                rusqlite::params![user],
                |row| row.get(0),
            )
            .optional()?;

        let bits_cheered: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM cheers WHERE user_login = ?1",
            rusqlite::params![user],
            |row| row.get(0),
        )?;

        Ok(UserInfo {
            months_subbed,
            last_sub: last_sub.and_then(from_unix),
            gifts_given,
            gifted_from,
            bits_cheered,
        })
    }

    fn query_channel_info(conn: &Connection) -> rusqlite::Result<ChannelInfo> {
        let active_since = (Utc::now() - subscription_period()).timestamp();
        let active_subscribers: u32 = conn.query_row(
            "SELECT COUNT(*) FROM (
                SELECT user_login FROM subscriptions
                GROUP BY user_login
                HAVING MAX(subscribed_at) > ?1
            )",
            rusqlite::params![active_since],
            |row| row.get(0),
        )?;

        let total_gifts: u32 = conn.query_row(
            "SELECT COUNT(*) FROM subscriptions WHERE gifted_by IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let total_bits: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM cheers",
            [],
            |row| row.get(0),
        )?;

        let top_gifter: Option<String> = conn
            .query_row(
                "SELECT gifted_by FROM subscriptions
                 WHERE gifted_by IS NOT NULL
                 GROUP BY gifted_by
                 ORDER BY COUNT(*) DESC, gifted_by ASC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(ChannelInfo {
            active_subscribers,
            total_gifts,
            total_bits,
            top_gifter: top_gifter.unwrap_or_else(|| NO_TOP_GIFTER.to_string()),
        })
    }
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn insert_subscription(
    conn: &Connection,
    user: &str,
    gifted_by: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO subscriptions (id, user_login, gifted_by, subscribed_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![Uuid::new_v4().to_string(), user, gifted_by, at.timestamp()],
    )?;
    Ok(())
}

/// Whether `user` has a subscription younger than the subscription period
fn is_active(conn: &Connection, user: &str, now: DateTime<Utc>) -> Result<bool, LedgerError> {
    let since = (now - subscription_period()).timestamp();
    let active: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM subscriptions WHERE user_login = ?1 AND subscribed_at > ?2
        )",
        rusqlite::params![user, since],
        |row| row.get(0),
    )?;
    Ok(active)
}

#[async_trait]
impl LoyaltyLedger for SqliteLedger {
    async fn subscribe(&self, user: &str) -> Result<(), LedgerError> {
        validate_user(user)?;
        let now = Utc::now();
        let conn = self.conn.lock().await;

        if is_active(&conn, user, now)? {
            return Err(LedgerError::AlreadySubscribed(user.to_string()));
        }
        insert_subscription(&conn, user, None, now)
    }

    async fn gift(&self, target: &str, gifter: &str) -> Result<(), LedgerError> {
        validate_user(target)?;
        validate_user(gifter)?;
        if target == gifter {
            return Err(LedgerError::SelfGift);
        }

        let now = Utc::now();
        let conn = self.conn.lock().await;

        let since = (now - subscription_period()).timestamp();
        let gifted_recently: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM subscriptions
                WHERE user_login = ?1 AND gifted_by = ?2 AND subscribed_at > ?3
            )",
            rusqlite::params![target, gifter, since],
            |row| row.get(0),
        )?;
        if gifted_recently {
            return Err(LedgerError::AlreadyGifted);
        }
        if is_active(&conn, target, now)? {
            return Err(LedgerError::AlreadySubscribed(target.to_string()));
        }

        insert_subscription(&conn, target, Some(gifter), now)
    }

    async fn cheer(&self, user: &str, amount: i64) -> Result<(), LedgerError> {
        validate_user(user)?;
        validate_amount(amount)?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO cheers (id, user_login, amount, cheered_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                user,
                amount,
                Utc::now().timestamp()
            ],
        )?;
        Ok(())
    }

    async fn user_info(&self, user: &str) -> UserInfo {
        let conn = self.conn.lock().await;
        Self::query_user_info(&conn, user).unwrap_or_else(|e| {
            error!("Failed to read user info for {}: {}", user, e);
            UserInfo::default()
        })
    }

    async fn channel_info(&self) -> ChannelInfo {
        let conn = self.conn.lock().await;
        Self::query_channel_info(&conn).unwrap_or_else(|e| {
            error!("Failed to read channel info: {}", e);
            ChannelInfo::default()
        })
    }
}
