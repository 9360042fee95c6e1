//! Application-level configuration loading.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use time::{Time, Weekday};
use tracing::info;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZBOARD_CONFIG_PATH";
const DEFAULT_CONTENT_PATH: &str = "config/quiz_batches.json";

/// Why the configuration could not be loaded. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config `{path}`")]
    Read {
        /// Path that was tried.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid configuration JSON.
    #[error("failed to parse config")]
    Parse(#[from] serde_json::Error),
    /// `destinations` is empty.
    #[error("no delivery destinations configured")]
    NoDestinations,
    /// `weekly_ceremony.weekday` is not an English day name.
    #[error("unknown weekday `{0}`")]
    InvalidWeekday(String),
    /// An hour field is outside 0..=23.
    #[error("`{field}` must be an hour between 0 and 23 (got {hour})")]
    InvalidHour {
        /// Offending key.
        field: &'static str,
        /// Value found.
        hour: u8,
    },
    /// A count or interval field is zero.
    #[error("`{field}` must be greater than zero")]
    Zero {
        /// Offending key.
        field: &'static str,
    },
}

/// When the weekly ceremony fires, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySchedule {
    /// Day of the week.
    pub weekday: Weekday,
    /// Time of day.
    pub at: Time,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Conversations every question and announcement is sent to.
    pub destinations: Vec<String>,
    /// Location of the quiz bank.
    pub content_path: PathBuf,
    /// Delay between two scheduler ticks.
    pub quiz_interval: Duration,
    /// Weekly ceremony slot.
    pub weekly_ceremony: WeeklySchedule,
    /// Time of day of the monthly ceremony on the last day of the month.
    pub monthly_ceremony_at: Time,
    /// How many winners a ceremony announces.
    pub announce_top: usize,
    /// Age past which answers are purged.
    pub answer_retention: time::Duration,
    /// Age past which leaderboard periods and ceremony records are purged.
    pub leaderboard_retention: time::Duration,
    /// Delay between two retention sweeps.
    pub retention_interval: Duration,
    /// Number of storage worker tasks.
    pub storage_workers: usize,
    /// Upper bound on one storage call, queueing included.
    pub storage_timeout: Duration,
    /// Upper bound on one delivery to one destination.
    pub delivery_timeout: Duration,
}

impl AppConfig {
    /// Load the configuration from the path in `QUIZBOARD_CONFIG_PATH` or the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let path = resolve_config_path();
        let config = Self::from_path(&path)?;
        info!(
            path = %path.display(),
            destinations = config.destinations.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Read and validate the configuration file at `path`.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        serde_json::from_str::<RawConfig>(contents)?.try_into()
    }

    /// Built-in defaults for everything except the destinations.
    pub fn with_destinations(destinations: Vec<String>) -> Result<Self, ConfigError> {
        RawConfig {
            destinations,
            ..RawConfig::default()
        }
        .try_into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    destinations: Vec<String>,
    content_path: PathBuf,
    quiz_interval_minutes: u64,
    weekly_ceremony: RawWeekly,
    monthly_ceremony_hour: u8,
    announce_top: usize,
    answer_retention_days: u32,
    leaderboard_retention_days: u32,
    retention_interval_days: u64,
    storage_workers: usize,
    storage_timeout_ms: u64,
    delivery_timeout_ms: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            destinations: Vec::new(),
            content_path: PathBuf::from(DEFAULT_CONTENT_PATH),
            quiz_interval_minutes: 30,
            weekly_ceremony: RawWeekly::default(),
            monthly_ceremony_hour: 23,
            announce_top: 3,
            answer_retention_days: 30,
            leaderboard_retention_days: 90,
            retention_interval_days: 7,
            storage_workers: 4,
            storage_timeout_ms: 5_000,
            delivery_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawWeekly {
    weekday: String,
    hour: u8,
}

impl Default for RawWeekly {
    fn default() -> Self {
        Self {
            weekday: "sunday".into(),
            hour: 21,
        }
    }
}

impl TryFrom<RawConfig> for AppConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let destinations: Vec<String> = raw
            .destinations
            .into_iter()
            .map(|destination| destination.trim().to_owned())
            .filter(|destination| !destination.is_empty())
            .collect();
        if destinations.is_empty() {
            return Err(ConfigError::NoDestinations);
        }

        let positive = |field: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::Zero { field })
            } else {
                Ok(value)
            }
        };

        Ok(Self {
            destinations,
            content_path: raw.content_path,
            quiz_interval: Duration::from_secs(
                positive("quiz_interval_minutes", raw.quiz_interval_minutes)? * 60,
            ),
            weekly_ceremony: WeeklySchedule {
                weekday: parse_weekday(&raw.weekly_ceremony.weekday)?,
                at: hour("weekly_ceremony.hour", raw.weekly_ceremony.hour)?,
            },
            monthly_ceremony_at: hour("monthly_ceremony_hour", raw.monthly_ceremony_hour)?,
            announce_top: positive("announce_top", raw.announce_top as u64)? as usize,
            answer_retention: time::Duration::days(positive(
                "answer_retention_days",
                u64::from(raw.answer_retention_days),
            )? as i64),
            leaderboard_retention: time::Duration::days(positive(
                "leaderboard_retention_days",
                u64::from(raw.leaderboard_retention_days),
            )? as i64),
            retention_interval: Duration::from_secs(
                positive("retention_interval_days", raw.retention_interval_days)? * 86_400,
            ),
            storage_workers: positive("storage_workers", raw.storage_workers as u64)? as usize,
            storage_timeout: Duration::from_millis(positive(
                "storage_timeout_ms",
                raw.storage_timeout_ms,
            )?),
            delivery_timeout: Duration::from_millis(positive(
                "delivery_timeout_ms",
                raw.delivery_timeout_ms,
            )?),
        })
    }
}

fn hour(field: &'static str, hour: u8) -> Result<Time, ConfigError> {
    Time::from_hms(hour, 0, 0).map_err(|_| ConfigError::InvalidHour { field, hour })
}

fn parse_weekday(value: &str) -> Result<Weekday, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "monday" => Ok(Weekday::Monday),
        "tuesday" => Ok(Weekday::Tuesday),
        "wednesday" => Ok(Weekday::Wednesday),
        "thursday" => Ok(Weekday::Thursday),
        "friday" => Ok(Weekday::Friday),
        "saturday" => Ok(Weekday::Saturday),
        "sunday" => Ok(Weekday::Sunday),
        _ => Err(ConfigError::InvalidWeekday(value.to_owned())),
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
