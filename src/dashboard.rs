//! Dashboard configuration document (`dashboard-config.json`).
//!
//! The frontend owns the schema; the backend only guarantees that `title`
//! is a non-empty string and that `themePresets` and `dashboards` are arrays.
//! Every other key is passed through untouched.

use crate::persist::{read_json, write_json_atomic, PersistError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_TITLE: &str = "KISS Startpage";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    pub title: String,
    pub theme_presets: Vec<Value>,
    pub dashboards: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            theme_presets: Vec::new(),
            dashboards: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl DashboardConfig {
    /// Coerce an arbitrary JSON value into a well-formed document.
    pub fn normalize(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::default();
        };

        let title = match map.remove("title") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
            _ => String::new(),
        };
        let array = |v: Option<Value>| match v {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let theme_presets = array(map.remove("themePresets"));
        let dashboards = array(map.remove("dashboards"));

        Self {
            title: if title.is_empty() {
                DEFAULT_TITLE.to_string()
            } else {
                title
            },
            theme_presets,
            dashboards,
            extra: map,
        }
    }

    /// Built-in first-run document: one empty dashboard.
    pub fn seed() -> Self {
        Self::normalize(json!({
            "title": DEFAULT_TITLE,
            "dashboards": [
                {"id": "dashboard-1", "label": "Startpage 1", "groups": []}
            ]
        }))
    }
}

/// File-backed dashboard configuration.
pub struct DashboardStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DashboardStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file if it does not exist, seeded from `default_config`
    /// (a JSON file) or the built-in document.
    pub fn ensure_file(&self, default_config: Option<&Path>) -> Result<(), PersistError> {
        let _guard = self.lock.lock();
        if self.path.exists() {
            return Ok(());
        }

        let seed = match default_config {
            Some(path) => match read_json::<Value>(path) {
                Ok(Some(value)) => {
                    info!("Seeding dashboard config from {}", path.display());
                    DashboardConfig::normalize(value)
                }
                Ok(None) => DashboardConfig::seed(),
                Err(e) => {
                    warn!("Ignoring default config {}: {}", path.display(), e);
                    DashboardConfig::seed()
                }
            },
            None => DashboardConfig::seed(),
        };
        write_json_atomic(&self.path, &seed)
    }

    /// Current document. A missing or unreadable file yields the default.
    pub fn load(&self) -> DashboardConfig {
        let _guard = self.lock.lock();
        match read_json::<Value>(&self.path) {
            Ok(Some(value)) => DashboardConfig::normalize(value),
            Ok(None) => DashboardConfig::default(),
            Err(e) => {
                warn!("Could not read {}: {}", self.path.display(), e);
                DashboardConfig::default()
            }
        }
    }

    /// Normalize and persist `value`, returning what was written.
    pub fn save(&self, value: Value) -> Result<DashboardConfig, PersistError> {
        let doc = DashboardConfig::normalize(value);
        let _guard = self.lock.lock();
        write_json_atomic(&self.path, &doc)?;
        Ok(doc)
    }
}
