use std::{collections::HashMap, fs, path::Path, time::Duration};

use gemini_integration::{GeminiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_timeout_seconds: u64,
    pub seed_demo_data: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/craftconnect.db".into(),
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.into(),
            gemini_base_url: DEFAULT_BASE_URL.into(),
            gemini_timeout_seconds: 20,
            seed_demo_data: true,
        }
    }
}

impl Settings {
    /// Text-service settings, or `None` when no usable key is configured.
    pub fn gemini(&self) -> Option<GeminiConfig> {
        let api_key = self
            .gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())?;
        Some(GeminiConfig {
            api_key: api_key.to_string(),
            model: self.gemini_model.clone(),
            base_url: self.gemini_base_url.clone(),
            timeout: Duration::from_secs(self.gemini_timeout_seconds.max(1)),
        })
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    apply_file(&mut settings, Path::new("server.toml"));
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, path: &Path) {
    let Ok(raw) = fs::read_to_string(path) else {
        return;
    };
    match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
        Ok(file_cfg) => apply_table(settings, &file_cfg),
        Err(error) => tracing::warn!(path = %path.display(), %error, "ignoring unreadable config file"),
    }
}

fn apply_table(settings: &mut Settings, file_cfg: &HashMap<String, toml::Value>) {
    let text = |key: &str| file_cfg.get(key).and_then(toml::Value::as_str);

    if let Some(v) = text("bind_addr") {
        settings.server_bind = v.to_string();
    }
    if let Some(v) = text("database_url") {
        settings.database_url = v.to_string();
    }
    if let Some(v) = text("gemini_api_key") {
        settings.gemini_api_key = Some(v.to_string());
    }
    if let Some(v) = text("gemini_model") {
        settings.gemini_model = v.to_string();
    }
    if let Some(v) = text("gemini_base_url") {
        settings.gemini_base_url = v.to_string();
    }
    if let Some(v) = file_cfg
        .get("gemini_timeout_seconds")
        .and_then(toml::Value::as_integer)
        .and_then(|v| u64::try_from(v).ok())
    {
        settings.gemini_timeout_seconds = v;
    }
    if let Some(v) = file_cfg
        .get("seed_demo_data")
        .and_then(toml::Value::as_bool)
    {
        settings.seed_demo_data = v;
    }
}

/// Later keys in each group win, so `APP__*` overrides the short names.
fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    for key in ["API_KEY", "GEMINI_API_KEY", "APP__GEMINI_API_KEY"] {
        if let Some(v) = var(key) {
            settings.gemini_api_key = Some(v);
        }
    }
    if let Some(v) = var("APP__GEMINI_MODEL") {
        settings.gemini_model = v;
    }
    if let Some(v) = var("APP__GEMINI_BASE_URL") {
        settings.gemini_base_url = v;
    }
    if let Some(v) = var("APP__GEMINI_TIMEOUT_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.gemini_timeout_seconds = parsed;
        }
    }

    if let Some(v) = var("APP__SEED_DEMO_DATA") {
        if let Some(parsed) = parse_flag(&v) {
            settings.seed_demo_data = parsed;
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    storage::ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
