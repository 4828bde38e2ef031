//! Configuration loader and validator for the launch-site watch bot.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::{ChannelClass, Domain};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
    pub sources: Sources,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Fixed delay between two outbound announcements.
    pub announce_delay_ms: u64,
    /// Systemic failures are reported at most once per this window.
    pub error_cooldown_seconds: u64,
}

impl App {
    /// `data_dir` with a leading `~/` expanded against `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }

    pub fn announce_delay(&self) -> Duration {
        Duration::from_millis(self.announce_delay_ms)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_seconds)
    }
}

/// Telegram bot settings and per-channel-class destination chats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    pub channels: Channels,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channels {
    #[serde(default)]
    pub general: Vec<i64>,
    #[serde(default)]
    pub launch_update: Vec<i64>,
    #[serde(default)]
    pub launch_reminder: Vec<i64>,
    #[serde(default)]
    pub notam_update: Vec<i64>,
    #[serde(default)]
    pub closure_update: Vec<i64>,
    #[serde(default)]
    pub booster_update: Vec<i64>,
    #[serde(default)]
    pub weather_update: Vec<i64>,
}

impl Channels {
    pub fn chats_for(&self, class: ChannelClass) -> &[i64] {
        match class {
            ChannelClass::General => &self.general,
            ChannelClass::LaunchUpdate => &self.launch_update,
            ChannelClass::LaunchReminder => &self.launch_reminder,
            ChannelClass::NotamUpdate => &self.notam_update,
            ChannelClass::ClosureUpdate => &self.closure_update,
            ChannelClass::BoosterUpdate => &self.booster_update,
            ChannelClass::WeatherUpdate => &self.weather_update,
        }
    }
}

/// One upstream feed per data domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sources {
    pub boosters: Source,
    pub closures: Source,
    pub launches: Source,
    pub notams: Source,
    pub weather: Source,
}

impl Sources {
    pub fn get(&self, domain: Domain) -> &Source {
        match domain {
            Domain::Boosters => &self.boosters,
            Domain::Closures => &self.closures,
            Domain::Launches => &self.launches,
            Domain::Notams => &self.notams,
            Domain::Weather => &self.weather,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub url: String,
    pub interval_ms: u64,
    /// Disabled sources are never polled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Source {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// Default SQLite URL inside the data directory.
    pub fn database_url(&self) -> String {
        format!("sqlite://{}/watchbot.db", self.app.resolved_data_dir())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.announce_delay_ms == 0 {
        return Err(ConfigError::Invalid("app.announce_delay_ms must be > 0"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }

    for domain in Domain::ALL {
        let source = cfg.sources.get(domain);
        if !source.enabled {
            continue;
        }
        if source.url.trim().is_empty() {
            return Err(ConfigError::Invalid(match domain {
                Domain::Boosters => "sources.boosters.url must be non-empty",
                Domain::Closures => "sources.closures.url must be non-empty",
                Domain::Launches => "sources.launches.url must be non-empty",
                Domain::Notams => "sources.notams.url must be non-empty",
                Domain::Weather => "sources.weather.url must be non-empty",
            }));
        }
        if source.interval_ms == 0 {
            return Err(ConfigError::Invalid(match domain {
                Domain::Boosters => "sources.boosters.interval_ms must be > 0",
                Domain::Closures => "sources.closures.interval_ms must be > 0",
                Domain::Launches => "sources.launches.interval_ms must be > 0",
                Domain::Notams => "sources.notams.interval_ms must be > 0",
                Domain::Weather => "sources.weather.interval_ms must be > 0",
            }));
        }
    }

    Ok(())
}

/// Returns the example YAML document.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  announce_delay_ms: 3000
  error_cooldown_seconds: 900

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  channels:
    general:
      - -1001000000001
    launch_update:
      - -1001000000002
    launch_reminder:
      - -1001000000002
    notam_update:
      - -1001000000003
    closure_update:
      - -1001000000004
    booster_update: []
    weather_update: []

sources:
  boosters:
    url: "http://localhost:8081/boosters.json"
    interval_ms: 3600000
  closures:
    url: "http://localhost:8081/closures.json"
    interval_ms: 1740000
  launches:
    url: "http://localhost:8081/launches.json"
    interval_ms: 1800000
  notams:
    url: "http://localhost:8081/notams.json"
    interval_ms: 1860000
  weather:
    url: "http://localhost:8081/weather.json"
    interval_ms: 660000
"#
}
