use crate::tmdb::DEFAULT_BASE_URL;
use chrono_tz::Tz;
use std::{fmt, path::PathBuf};
use teloxide::types::UserId;
use thiserror::Error;

const DEFAULT_TIMEZONE: &str = "Europe/Moscow";
const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{name} is invalid ({reason}): {value:?}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub owner_id: UserId,
    pub tmdb_auth: String,
    pub tmdb_base_url: String,
    pub store_path: PathBuf,
    /// Часовой пояс расписания еженедельной подборки.
    pub timezone: Tz,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // пустые значения считаем отсутствующими
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = get("BOT_TOKEN")
            .or_else(|| get("TELOXIDE_TOKEN"))
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let owner_raw = get("OWNER_USER_ID").ok_or(ConfigError::Missing("OWNER_USER_ID"))?;
        let owner_id = owner_raw
            .parse::<u64>()
            .map(UserId)
            .map_err(|_| ConfigError::Invalid {
                name: "OWNER_USER_ID",
                value: owner_raw.clone(),
                reason: "must be a number",
            })?;

        let tmdb_auth = get("TMDB_AUTH")
            .or_else(|| get("TMDB_API_KEY"))
            .ok_or(ConfigError::Missing("TMDB_AUTH"))?;

        let tmdb_base_url = get("TMDB_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let store_path = get("STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/bot_state.json"));

        let timezone_raw = get("TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = timezone_raw
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid {
                name: "TIMEZONE",
                value: timezone_raw.clone(),
                reason: "expected an IANA zone name like Europe/Moscow",
            })?;

        let log_level = get("LOG_LEVEL")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_else(|| "info".to_string());
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(ConfigError::Invalid {
                name: "LOG_LEVEL",
                value: log_level,
                reason: "expected debug, info, warn or error",
            });
        }

        Ok(Self {
            bot_token,
            owner_id,
            tmdb_auth,
            tmdb_base_url,
            store_path,
            timezone,
            log_level,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"***")
            .field("owner_id", &self.owner_id.0)
            .field("tmdb_auth", &"***")
            .field("tmdb_base_url", &self.tmdb_base_url)
            .field("store_path", &self.store_path)
            .field("timezone", &self.timezone)
            .field("log_level", &self.log_level)
            .finish()
    }
}
