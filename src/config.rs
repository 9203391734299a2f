use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::poller::PollPolicy;
use crate::error::AppError;
use crate::render::RenderOptions;

const APP_DIR: &str = "smartpantry";
const CONFIG_FILE: &str = "config.toml";

/// Backend the original web client talks to when served from localhost.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

pub const ENV_BASE_URL: &str = "SMARTPANTRY_BASE_URL";
pub const ENV_NOTIFIER: &str = "SMARTPANTRY_NOTIFIER";
pub const ENV_POLL_INTERVAL_MS: &str = "SMARTPANTRY_POLL_INTERVAL_MS";
pub const ENV_SESSION: &str = "SMARTPANTRY_SESSION";

/// How an asynchronous assistant reply is noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Re-fetch the message list on a fixed interval.
    #[default]
    Polling,
    /// Subscribe to the thread's server-sent event stream.
    Push,
}

impl FromStr for NotifierKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polling" | "poll" => Ok(NotifierKind::Polling),
            "push" | "sse" => Ok(NotifierKind::Push),
            other => Err(AppError::Config(format!("unknown notifier '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub notifier: NotifierKind,
    pub poll_interval_ms: u64,
    /// Give up after this many poll ticks. Unset polls until a reply arrives.
    pub max_poll_ticks: Option<u32>,
    /// Give up after this many seconds of waiting. Unset waits forever.
    pub max_poll_secs: Option<u64>,
    pub image_max_width: u32,
    pub log_dir: Option<PathBuf>,
    /// Existing login session as `name=value`, copied from a browser. Sent as
    /// a cookie on every request.
    #[serde(skip_serializing)]
    pub session_cookie: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
            notifier: NotifierKind::Polling,
            poll_interval_ms: 1000,
            max_poll_ticks: None,
            max_poll_secs: None,
            image_max_width: 240,
            log_dir: None,
            session_cookie: None,
        }
    }
}

impl AppConfig {
    /// Default location: `<os config dir>/smartpantry/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load `.env`, then the config file (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::trace!("No .env loaded: {}", e);
        }

        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(ref p) if p.exists() => Self::load_from(p)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply `SMARTPANTRY_*` overrides looked up through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), AppError> {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(kind) = lookup(ENV_NOTIFIER) {
            self.notifier = kind.parse()?;
        }
        if let Some(cookie) = lookup(ENV_SESSION).filter(|v| !v.trim().is_empty()) {
            self.session_cookie = Some(cookie.trim().to_string());
        }
        if let Some(ms) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = ms.trim().parse().map_err(|_| {
                AppError::Config(format!("{ENV_POLL_INTERVAL_MS} must be an integer, got '{ms}'"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.parsed_base_url()?;
        if self.poll_interval_ms == 0 {
            return Err(AppError::Config("poll_interval_ms must be greater than zero".into()));
        }
        if let Some(cookie) = &self.session_cookie {
            let name = cookie.split_once('=').map(|(name, _)| name.trim());
            if name.map_or(true, str::is_empty) {
                return Err(AppError::Config(
                    "session_cookie must look like name=value".into(),
                ));
            }
        }
        Ok(())
    }

    /// Base URL with any trailing slash removed, ready for path concatenation.
    pub fn api_base(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    pub fn parsed_base_url(&self) -> Result<url::Url, AppError> {
        url::Url::parse(&self.base_url)
            .map_err(|e| AppError::Config(format!("invalid base_url '{}': {}", self.base_url, e)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_ticks: self.max_poll_ticks,
            max_duration: self.max_poll_secs.map(Duration::from_secs),
        }
    }

    pub fn render_options(&self) -> Result<RenderOptions, AppError> {
        Ok(RenderOptions {
            asset_base: self.parsed_base_url()?,
            image_max_width: self.image_max_width,
        })
    }
}
