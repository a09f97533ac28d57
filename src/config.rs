use chrono::Duration;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// API credentials, read once at startup.
#[derive(Clone)]
pub struct Credentials {
    pub anthropic_api_key: String,
    pub twitter_consumer_key: String,
    pub twitter_consumer_secret: String,
    pub twitter_access_token: String,
    pub twitter_access_token_secret: String,
    pub twitter_bearer_token: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Credentials {
            anthropic_api_key: required("ANTHROPIC_API_KEY")?,
            twitter_consumer_key: required("TWITTER_CONSUMER_KEY")?,
            twitter_consumer_secret: required("TWITTER_CONSUMER_SECRET")?,
            twitter_access_token: required("TWITTER_ACCESS_TOKEN")?,
            twitter_access_token_secret: required("TWITTER_ACCESS_TOKEN_SECRET")?,
            twitter_bearer_token: required("TWITTER_BEARER_TOKEN")?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credentials { .. }")
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub original_post_every: Duration,
    pub reply_sweep_every: Duration,
    pub proactive_every: Duration,
}

/// Behavioural knobs shared by every pipeline. Built once and never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_user_id: Option<String>,
    pub character_name: Option<String>,
    pub storage_dir: PathBuf,
    /// Minimum like counts, strictest first.
    pub like_thresholds: Vec<u64>,
    pub min_retweets: u64,
    pub min_followers: u64,
    pub max_replies_per_run: usize,
    pub search_pool_size: usize,
    pub search_topics: Vec<String>,
    pub search_language: String,
    pub reply_cooldown: Duration,
    pub mentions_page_size: u32,
    /// When false nothing is posted and nothing is recorded.
    pub tweet_mode: bool,
    pub schedule: Schedule,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bot_user_id: None,
            character_name: None,
            storage_dir: PathBuf::from("./storage"),
            like_thresholds: vec![20, 10, 5, 2, 0],
            min_retweets: 0,
            min_followers: 100,
            max_replies_per_run: 3,
            search_pool_size: 100,
            search_topics: default_topics(),
            search_language: "en".to_string(),
            reply_cooldown: Duration::hours(12),
            mentions_page_size: 100,
            tweet_mode: true,
            schedule: Schedule {
                original_post_every: Duration::minutes(360),
                reply_sweep_every: Duration::minutes(5),
                proactive_every: Duration::minutes(60),
            },
        }
    }
}

fn default_topics() -> Vec<String> {
    [
        "learning to code",
        "rustlang",
        "new programming language",
        "developer tools",
        "side project",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::from_vars(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);
        let defaults = Config::default();

        let like_thresholds = match vars.optional("LIKE_THRESHOLDS") {
            Some(raw) => parse_list::<u64>("LIKE_THRESHOLDS", &raw)?,
            None => defaults.like_thresholds,
        };
        if like_thresholds.is_empty() || like_thresholds.windows(2).any(|w| w[0] < w[1]) {
            return Err(ConfigError::Invalid {
                key: "LIKE_THRESHOLDS",
                value: format!("{like_thresholds:?}"),
                reason: "must be a non-empty list ordered strictest to laxest".to_string(),
            });
        }

        let search_topics = match vars.optional("SEARCH_TOPICS") {
            Some(raw) => parse_list::<String>("SEARCH_TOPICS", &raw)?,
            None => defaults.search_topics,
        };
        if search_topics.is_empty() {
            return Err(ConfigError::Invalid {
                key: "SEARCH_TOPICS",
                value: String::new(),
                reason: "at least one topic is required".to_string(),
            });
        }

        let mentions_page_size = vars.parsed_or("MENTIONS_PAGE_SIZE", defaults.mentions_page_size)?;
        if !(5..=100).contains(&mentions_page_size) {
            return Err(ConfigError::Invalid {
                key: "MENTIONS_PAGE_SIZE",
                value: mentions_page_size.to_string(),
                reason: "must be between 5 and 100".to_string(),
            });
        }

        Ok(Config {
            bot_user_id: vars.optional("BOT_USER_ID"),
            character_name: vars.optional("CHARACTER_NAME"),
            storage_dir: vars
                .optional("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            like_thresholds,
            min_retweets: vars.parsed_or("MIN_RETWEETS", defaults.min_retweets)?,
            min_followers: vars.parsed_or("MIN_FOLLOWERS", defaults.min_followers)?,
            max_replies_per_run: vars
                .parsed_or("MAX_REPLIES_PER_RUN", defaults.max_replies_per_run)?,
            search_pool_size: vars.parsed_or("SEARCH_POOL_SIZE", defaults.search_pool_size)?,
            search_topics,
            search_language: vars
                .optional("SEARCH_LANGUAGE")
                .unwrap_or(defaults.search_language),
            reply_cooldown: vars.duration("REPLY_COOLDOWN_HOURS", 12, Duration::try_hours)?,
            mentions_page_size,
            tweet_mode: vars.parsed_or("TWEET_MODE", defaults.tweet_mode)?,
            schedule: Schedule {
                original_post_every: vars.duration(
                    "ORIGINAL_POST_EVERY_MINUTES",
                    360,
                    Duration::try_minutes,
                )?,
                reply_sweep_every: vars.duration(
                    "REPLY_SWEEP_EVERY_MINUTES",
                    5,
                    Duration::try_minutes,
                )?,
                proactive_every: vars.duration(
                    "PROACTIVE_EVERY_MINUTES",
                    60,
                    Duration::try_minutes,
                )?,
            },
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    Vars(&|key: &str| env::var(key).ok())
        .optional(key)
        .ok_or(ConfigError::Missing(key))
}

struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    /// A strictly positive whole number of units, built without chrono's
    /// panicking constructors.
    fn duration(
        &self,
        key: &'static str,
        default: i64,
        unit: fn(i64) -> Option<Duration>,
    ) -> Result<Duration, ConfigError> {
        let amount = self.parsed_or(key, default)?;
        let invalid = |reason: &str| ConfigError::Invalid {
            key,
            value: amount.to_string(),
            reason: reason.to_string(),
        };
        if amount <= 0 {
            return Err(invalid("must be greater than zero"));
        }
        unit(amount).ok_or_else(|| invalid("out of range"))
    }
}

fn parse_list<T>(key: &'static str, raw: &str) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: raw.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}
