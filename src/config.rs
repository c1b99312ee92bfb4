//! Configuration for the KISS Startpage server

use crate::icons::IconConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const USERS_FILE: &str = "users.json";
pub const SESSIONS_FILE: &str = "sessions.json";
pub const DASHBOARD_CONFIG_FILE: &str = "dashboard-config.json";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to bind
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory for users.json, sessions.json and dashboard-config.json
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory served under /icons/ (a `private-icons` sibling of the data dir by default)
    #[serde(default = "default_private_icons_dir")]
    pub private_icons_dir: PathBuf,

    /// Root of the static frontend assets
    #[serde(default = "default_app_root")]
    pub app_root: PathBuf,

    /// JSON file used to seed dashboard-config.json on first start
    #[serde(default)]
    pub default_config: Option<PathBuf>,

    /// Name of the session cookie
    #[serde(default = "default_session_cookie")]
    pub session_cookie_name: String,

    /// Session lifetime in seconds, renewed on every authenticated request
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: i64,

    /// PBKDF2 iteration count for newly written password records
    #[serde(default = "default_password_iterations")]
    pub password_iterations: u32,

    /// Lifetime of the cached selfh.st index in seconds
    #[serde(default = "default_icon_index_ttl")]
    pub icon_index_ttl_secs: u64,

    /// Upper bound for the `limit` search parameter
    #[serde(default = "default_icon_search_max_limit")]
    pub icon_search_max_limit: usize,

    #[serde(default = "default_icon_index_url")]
    pub icon_index_url: String,

    #[serde(default = "default_icon_raw_base")]
    pub icon_raw_base: String,

    #[serde(default = "default_iconify_api_base")]
    pub iconify_api_base: String,

    /// Expose Prometheus metrics on /metrics
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    /// Log level filter string.
    /// Set via config file or DASH_LOG_LEVEL env var. Overridden by RUST_LOG.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions for serde
fn default_bind() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8788
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_private_icons_dir() -> PathBuf {
    PathBuf::from("./private-icons")
}

fn default_app_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_session_cookie() -> String {
    "dash_session".to_string()
}

fn default_session_ttl() -> i64 {
    crate::session::DEFAULT_SESSION_TTL_SECS
}

fn default_password_iterations() -> u32 {
    crate::auth::password::DEFAULT_ITERATIONS
}

fn default_icon_index_ttl() -> u64 {
    21_600
}

fn default_icon_search_max_limit() -> usize {
    30
}

fn default_icon_index_url() -> String {
    "https://raw.githubusercontent.com/selfhst/icons/main/index.json".to_string()
}

fn default_icon_raw_base() -> String {
    "https://raw.githubusercontent.com/selfhst/icons/main".to_string()
}

fn default_iconify_api_base() -> String {
    "https://api.iconify.design".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "kiss_startpage=info,tower_http=info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            data_dir: default_data_dir(),
            private_icons_dir: default_private_icons_dir(),
            app_root: default_app_root(),
            default_config: None,
            session_cookie_name: default_session_cookie(),
            session_ttl_secs: default_session_ttl(),
            password_iterations: default_password_iterations(),
            icon_index_ttl_secs: default_icon_index_ttl(),
            icon_search_max_limit: default_icon_search_max_limit(),
            icon_index_url: default_icon_index_url(),
            icon_raw_base: default_icon_raw_base(),
            iconify_api_base: default_iconify_api_base(),
            metrics_enabled: default_metrics_enabled(),
            log_level: default_log_level(),
        }
    }
}

/// Parse `key` from the environment into `target`, keeping the current
/// value when the variable is unset or does not parse.
fn env_parse<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        if let Ok(parsed) = raw.trim().parse() {
            *target = parsed;
        }
    }
}

fn env_string(key: &str, target: &mut String) {
    if let Ok(raw) = std::env::var(key) {
        let raw = raw.trim();
        if !raw.is_empty() {
            *target = raw.to_string();
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        env_parse("DASH_BIND", &mut config.bind);
        env_parse("DASH_PORT", &mut config.port);

        if let Some(dir) = env_path("DASH_DATA_DIR") {
            // private icons live next to the data dir unless set explicitly
            config.private_icons_dir = dir
                .parent()
                .map(|p| p.join("private-icons"))
                .unwrap_or_else(|| PathBuf::from("private-icons"));
            config.data_dir = dir;
        }
        if let Some(dir) = env_path("DASH_PRIVATE_ICONS_DIR") {
            config.private_icons_dir = dir;
        }
        if let Some(dir) = env_path("DASH_APP_ROOT") {
            config.app_root = dir;
        }
        config.default_config = env_path("DASH_DEFAULT_CONFIG");

        env_string("DASH_SESSION_COOKIE", &mut config.session_cookie_name);
        env_parse("DASH_SESSION_TTL", &mut config.session_ttl_secs);
        env_parse("DASH_PASSWORD_ITERATIONS", &mut config.password_iterations);
        env_parse("DASH_ICON_INDEX_TTL", &mut config.icon_index_ttl_secs);
        env_parse("DASH_ICON_SEARCH_MAX_LIMIT", &mut config.icon_search_max_limit);
        env_string("DASH_ICON_INDEX_URL", &mut config.icon_index_url);
        env_string("DASH_ICON_RAW_BASE", &mut config.icon_raw_base);
        env_string("DASH_ICONIFY_API_BASE", &mut config.iconify_api_base);
        env_parse("DASH_METRICS", &mut config.metrics_enabled);

        // Log level (runtime operational)
        if let Ok(level) = std::env::var("DASH_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load() -> Self {
        // Try config file first
        if let Ok(path) = std::env::var("DASH_CONFIG") {
            if let Ok(config) = Self::from_file(&path) {
                return config;
            }
        }

        // Try default config file locations
        for path in &["kiss_startpage.toml", "/etc/kiss_startpage/config.toml"] {
            if std::path::Path::new(path).exists() {
                if let Ok(config) = Self::from_file(path) {
                    return config;
                }
            }
        }

        // Fall back to environment variables
        Self::from_env()
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(USERS_FILE)
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.data_dir.join(SESSIONS_FILE)
    }

    pub fn dashboard_config_path(&self) -> PathBuf {
        self.data_dir.join(DASHBOARD_CONFIG_FILE)
    }

    /// Password records need at least one PBKDF2 round.
    pub fn effective_password_iterations(&self) -> u32 {
        self.password_iterations.max(1)
    }

    /// Icon sources and cache policy for [`crate::icons::IconService`].
    pub fn icon_config(&self) -> IconConfig {
        IconConfig {
            index_url: self.icon_index_url.clone(),
            raw_base: self.icon_raw_base.clone(),
            iconify_api_base: self.iconify_api_base.clone(),
            index_ttl: Duration::from_secs(self.icon_index_ttl_secs),
            search_max_limit: self.icon_search_max_limit.max(1),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
