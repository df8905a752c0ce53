use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::bot::outgoing::MIN_CAPACITY;

pub const ENV_USER_NAME: &str = "USER_NAME";
pub const ENV_OAUTH_TOKEN: &str = "USER_OAUTH_TOKEN";
pub const ENV_CHANNEL: &str = "USER_CHANNEL";

#[derive(Debug, Clone)]
pub struct Config {
    pub twitch: TwitchConfig,
    pub ledger: LedgerConfig,
    pub outgoing: OutgoingConfig,
}

/// Bot account and target channel. Always taken from the environment.
#[derive(Debug, Clone)]
pub struct TwitchConfig {
    pub user_name: String,
    pub oauth_token: String,
    pub channel: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    /// Keep the ledger in memory only (dry runs); nothing is written to disk
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutgoingConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// Optional settings file. Credentials never live here.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    ledger: Option<LedgerConfig>,
    #[serde(default)]
    outgoing: Option<OutgoingConfig>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("loyalty.db")
}

fn default_capacity() -> usize {
    MIN_CAPACITY
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            in_memory: false,
        }
    }
}

impl Default for OutgoingConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl TwitchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the three required values through `lookup`. Empty counts as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => bail!("error, {} variable empty", key),
            }
        };

        Ok(Self {
            user_name: required(ENV_USER_NAME)?,
            oauth_token: required(ENV_OAUTH_TOKEN)?,
            channel: required(ENV_CHANNEL)?.trim_start_matches('#').to_lowercase(),
        })
    }
}

impl Config {
    /// Load settings from `path` (if it exists) and credentials from the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<FileConfig>(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            FileConfig::default()
        };

        let twitch = TwitchConfig::from_env()?;
        Ok(Self::assemble(twitch, file))
    }

    fn assemble(twitch: TwitchConfig, file: FileConfig) -> Self {
        let mut outgoing = file.outgoing.unwrap_or_default();
        if outgoing.capacity < MIN_CAPACITY {
            tracing::warn!(
                "outgoing.capacity {} is below the minimum, using {}",
                outgoing.capacity,
                MIN_CAPACITY
            );
            outgoing.capacity = MIN_CAPACITY;
        }

        Self {
            twitch,
            ledger: file.ledger.unwrap_or_default(),
            outgoing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn twitch() -> TwitchConfig {
        TwitchConfig {
            user_name: "loyaltybot".to_string(),
            oauth_token: "token".to_string(),
            channel: "streamer".to_string(),
        }
    }

    #[test]
    fn test_all_variables_present() {
        let config = TwitchConfig::from_lookup(lookup_from(&[
            ("USER_NAME", "loyaltybot"),
            ("USER_OAUTH_TOKEN", "oauth:abc"),
            ("USER_CHANNEL", "#Streamer"),
        ]))
        .unwrap();

        assert_eq!(config.user_name, "loyaltybot");
        assert_eq!(config.oauth_token, "oauth:abc");
        assert_eq!(config.channel, "streamer");
    }

    #[test]
    fn test_missing_variable_is_named() {
        let err = TwitchConfig::from_lookup(lookup_from(&[
            ("USER_NAME", "loyaltybot"),
            ("USER_CHANNEL", "streamer"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "error, USER_OAUTH_TOKEN variable empty");
    }

    #[test]
    fn test_empty_variable_counts_as_missing() {
        let err = TwitchConfig::from_lookup(lookup_from(&[
            ("USER_NAME", "loyaltybot"),
            ("USER_OAUTH_TOKEN", "abc"),
            ("USER_CHANNEL", "  "),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "error, USER_CHANNEL variable empty");
    }

    #[test]
    fn test_file_defaults() {
        let config = Config::assemble(twitch(), FileConfig::default());
        assert_eq!(config.ledger.database_path, PathBuf::from("loyalty.db"));
        assert!(!config.ledger.in_memory);
        assert_eq!(config.outgoing.capacity, MIN_CAPACITY);
    }

    #[test]
    fn test_file_overrides() {
        let file: FileConfig = toml::from_str(
            r#"
            [ledger]
            database_path = "/var/lib/loyaltybot/ledger.db"
            in_memory = true

            [outgoing]
            capacity = 5000
            "#,
        )
        .unwrap();
        let config = Config::assemble(twitch(), file);
        assert_eq!(
            config.ledger.database_path,
            PathBuf::from("/var/lib/loyaltybot/ledger.db")
        );
        assert!(config.ledger.in_memory);
        assert_eq!(config.outgoing.capacity, 5000);
    }

    #[test]
    fn test_capacity_is_raised_to_floor() {
        let file: FileConfig = toml::from_str("[outgoing]\ncapacity = 10\n").unwrap();
        let config = Config::assemble(twitch(), file);
        assert_eq!(config.outgoing.capacity, MIN_CAPACITY);
    }
}
