//! Application configuration structures.
//!
//! Configuration comes from a TOML file and is then overlaid with
//! environment variables (`USER1`, `USERNAME1`, `PASSWORD1`,
//! `DISCORD_TOKEN`, ...). The resulting value is built once at
//! startup and handed down by reference.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Poll interval and message options
    #[serde(default)]
    pub polling: PollingConfig,

    /// Portal endpoints and HTTP behavior
    #[serde(default)]
    pub portal: PortalConfig,

    /// Messaging channel settings
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Snapshot location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Optional protection against degraded snapshots
    #[serde(default)]
    pub guard: GuardConfig,

    /// Log level and destination
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Watched accounts
    #[serde(default)]
    pub accounts: Vec<Account>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay the process environment.
    pub fn with_process_env(mut self) -> Self {
        self.apply_env(std::env::vars());
        self
    }

    /// Overlay settings and accounts from environment-style pairs.
    ///
    /// Accounts are collected from `USERn`/`USERNAMEn`/`PASSWORDn` for every
    /// index present, in ascending order; gaps are fine. Environment accounts
    /// are appended after the ones from the file.
    pub fn apply_env<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();

        if let Some(token) = vars.get("DISCORD_TOKEN") {
            self.notifier.token = Some(token.clone());
        }
        if let Some(channel) = vars.get("DISCORD_CHANNEL_ID") {
            self.notifier.channel_id = Some(channel.clone());
        }
        if let Some(minutes) = vars.get("INTERVAL_MINUTES") {
            match minutes.trim().parse() {
                Ok(minutes) => self.polling.interval_minutes = minutes,
                Err(_) => log::warn!("Ignoring invalid INTERVAL_MINUTES={minutes:?}"),
            }
        }
        if let Some(flag) = vars.get("SHOW_YEAR_AVERAGE") {
            self.polling.show_year_average = env_flag(flag);
        }
        if let Some(flag) = vars.get("DEBUG_LOCAL") {
            self.portal.debug_local = env_flag(flag);
        }
        if let Some(flag) = vars.get("SHOW_HTTPS") {
            self.portal.show_requests = env_flag(flag);
        }
        if let Some(flag) = vars.get("SHOW_RES") {
            self.portal.show_responses = env_flag(flag);
        }

        let mut indexes: Vec<u32> = vars
            .keys()
            .filter_map(|key| key.strip_prefix("USER")?.parse().ok())
            .collect();
        indexes.sort_unstable();
        indexes.dedup();

        for index in indexes {
            let Some(name) = vars.get(&format!("USER{index}")).filter(|n| !n.is_empty()) else {
                continue;
            };
            let username = vars
                .get(&format!("USERNAME{index}"))
                .filter(|v| !v.is_empty())
                .cloned();
            let password = vars
                .get(&format!("PASSWORD{index}"))
                .filter(|v| !v.is_empty())
                .cloned();
            let account = Account {
                name: name.clone(),
                username,
                password,
            };
            if !self.portal.debug_local && !account.has_credentials() {
                log::warn!("Skipping USER{index} ({name}): missing USERNAME{index}/PASSWORD{index}");
                continue;
            }
            self.accounts.push(account);
        }
    }

    /// Validate configuration values for basic sanity.
    ///
    /// `require_notifier` is false for dry runs, which never contact the
    /// messaging API.
    pub fn validate(&self, require_notifier: bool) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(AppError::validation(if self.portal.debug_local {
                "No accounts defined (USERn)"
            } else {
                "No accounts defined (USERn/USERNAMEn/PASSWORDn)"
            }));
        }
        if !self.portal.debug_local {
            if let Some(account) = self.accounts.iter().find(|a| !a.has_credentials()) {
                return Err(AppError::validation(format!(
                    "Account '{}' has no username/password",
                    account.name
                )));
            }
        }
        if require_notifier {
            let mut missing = Vec::new();
            if self.notifier.token.as_deref().is_none_or(str::is_empty) {
                missing.push("DISCORD_TOKEN");
            }
            if self.notifier.channel_id.as_deref().is_none_or(str::is_empty) {
                missing.push("DISCORD_CHANNEL_ID");
            }
            if !missing.is_empty() {
                return Err(AppError::validation(format!(
                    "Missing notifier settings: {}",
                    missing.join(", ")
                )));
            }
        }
        if self.polling.interval_minutes == 0 {
            return Err(AppError::validation("polling.interval_minutes must be > 0"));
        }
        if self.portal.timeout_secs == 0 {
            return Err(AppError::validation("portal.timeout_secs must be > 0"));
        }
        if self.guard.max_drop_percent > 100 {
            return Err(AppError::validation("guard.max_drop_percent must be <= 100"));
        }
        for (key, value) in [
            ("portal.login_url", &self.portal.login_url),
            ("portal.grades_url", &self.portal.grades_url),
            ("portal.debug_local_url", &self.portal.debug_local_url),
            ("notifier.api_base", &self.notifier.api_base),
        ] {
            if let Err(e) = Url::parse(value) {
                return Err(AppError::validation(format!(
                    "{key} is not a valid URL ({value}): {e}"
                )));
            }
        }
        Ok(())
    }
}

/// Only the literal `true` (any case) enables a flag.
fn env_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// One watched portal account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Display name used in messages and snapshot file names
    pub name: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Account {
    pub fn has_credentials(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Polling loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Minutes to sleep between cycles
    #[serde(default = "defaults::interval_minutes")]
    pub interval_minutes: u64,

    /// Append the year average to grade messages and report its changes
    #[serde(default = "defaults::enabled")]
    pub show_year_average: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_minutes: defaults::interval_minutes(),
            show_year_average: true,
        }
    }
}

/// Portal endpoints and HTTP behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Login form page (GET) and login target (POST)
    #[serde(default = "defaults::login_url")]
    pub login_url: String,

    /// Grade overview page fetched after login
    #[serde(default = "defaults::grades_url")]
    pub grades_url: String,

    /// Path fragment of the post-login redirect that confirms the login
    #[serde(default = "defaults::success_path")]
    pub success_path: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Read a local fixture page instead of logging in
    #[serde(default)]
    pub debug_local: bool,

    /// Fixture page used in debug mode
    #[serde(default = "defaults::debug_local_url")]
    pub debug_local_url: String,

    /// Log every request line
    #[serde(default)]
    pub show_requests: bool,

    /// Log full response bodies
    #[serde(default)]
    pub show_responses: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: defaults::login_url(),
            grades_url: defaults::grades_url(),
            success_path: defaults::success_path(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            debug_local: false,
            debug_local_url: defaults::debug_local_url(),
            show_requests: false,
            show_responses: false,
        }
    }
}

/// Messaging channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// API base URL
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// Bot token
    #[serde(default)]
    pub token: Option<String>,

    /// Target channel
    #[serde(default)]
    pub channel_id: Option<String>,

    /// Pause between two messages in milliseconds
    #[serde(default = "defaults::message_delay")]
    pub message_delay_ms: u64,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::api_base(),
            token: None,
            channel_id: None,
            message_delay_ms: defaults::message_delay(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Snapshot storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `old_grades_<name>.json`
    #[serde(default = "defaults::storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
        }
    }
}

/// Snapshot guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Reject degraded reports instead of overwriting the snapshot
    #[serde(default)]
    pub enabled: bool,

    /// Maximum allowed subject drop in percent
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,

    /// Stored subject count below which the guard stays quiet
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_drop_percent: defaults::max_drop_percent(),
            min_baseline: defaults::min_baseline(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level filter (`RUST_LOG` wins when set)
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Append logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            file: None,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn enabled() -> bool {
        true
    }
    pub fn interval_minutes() -> u64 {
        5
    }

    // Portal defaults
    pub fn login_url() -> String {
        "https://100308.fuxnoten.online/webinfo".into()
    }
    pub fn grades_url() -> String {
        "https://100308.fuxnoten.online/webinfo/account/".into()
    }
    pub fn success_path() -> String {
        "/account".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn debug_local_url() -> String {
        "http://localhost:8000/index.html".into()
    }

    // Notifier defaults
    pub fn api_base() -> String {
        "https://discord.com/api".into()
    }
    pub fn message_delay() -> u64 {
        1000
    }

    pub fn storage_dir() -> PathBuf {
        PathBuf::from(".")
    }

    // Guard defaults
    pub fn max_drop_percent() -> u8 {
        50
    }
    pub fn min_baseline() -> usize {
        1
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
