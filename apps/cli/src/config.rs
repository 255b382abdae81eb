use std::{fs, path::Path};

use serde::Deserialize;
use tracing::warn;

pub const CONFIG_FILE: &str = "bonatrack.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub api_prefix: String,
    pub ws_path: String,
    pub waiter_id: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".into(),
            api_prefix: client_core::transport::DEFAULT_API_PREFIX.into(),
            ws_path: client_core::transport::DEFAULT_WS_PATH.into(),
            waiter_id: 1,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    api_prefix: Option<String>,
    ws_path: Option<String>,
    waiter_id: Option<i64>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the config file, then environment overrides.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.server_url {
                    settings.server_url = v;
                }
                if let Some(v) = file_cfg.api_prefix {
                    settings.api_prefix = v;
                }
                if let Some(v) = file_cfg.ws_path {
                    settings.ws_path = v;
                }
                if let Some(v) = file_cfg.waiter_id {
                    settings.waiter_id = v;
                }
            }
            Err(err) => warn!(path = %path.display(), error = %err, "config: ignoring unreadable file"),
        }
    }

    if let Some(v) = env("BONATRACK_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__API_PREFIX") {
        settings.api_prefix = v;
    }
    if let Some(v) = env("APP__WS_PATH") {
        settings.ws_path = v;
    }
    if let Some(v) = env("APP__WAITER_ID") {
        match v.parse::<i64>() {
            Ok(parsed) => settings.waiter_id = parsed,
            Err(_) => warn!(value = %v, "config: APP__WAITER_ID is not a number"),
        }
    }

    settings
}
