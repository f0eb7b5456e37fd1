use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_LINE_ACCESS_TOKEN: &str = "LINE_ACCESS_TOKEN";
pub const ENV_LINE_CHANNEL_SECRET: &str = "LINE_CHANNEL_SECRET";
pub const ENV_STORE_URL: &str = "SUPABASE_URL";
pub const ENV_STORE_SERVICE_KEY: &str = "SUPABASE_SERVICE_KEY";

/// A page is rendered as one carousel, and LINE caps a carousel at 12 bubbles.
pub const MAX_PAGE_SIZE: usize = 12;
/// Upper bound for the scheduler's lead and tolerance, one day.
pub const MAX_REMINDER_MINUTES: i64 = 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
    #[error("missing credential: {0} must be set")]
    MissingCredential(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server: Server,
    #[serde(default)]
    pub line: Line,
    pub store: Store,
    #[serde(default)]
    pub bot: Bot,
    #[serde(default)]
    pub delivery: Delivery,
    #[serde(default)]
    pub sessions: Sessions,
    #[serde(default)]
    pub scheduler: Scheduler,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    #[serde(default = "default_line_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_line_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub channel_secret: Option<String>,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            api_base_url: default_line_api_base_url(),
            timeout_ms: default_line_timeout_ms(),
            access_token: None,
            channel_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub sqlite_path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub service_key: Option<String>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            kind: "memory".to_string(),
            sqlite_path: None,
            url: None,
            service_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    #[serde(default)]
    pub admin_ids: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_max_search_terms")]
    pub max_search_terms: usize,
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    /// Listings larger than this are re-queried on "next page" instead of cached.
    #[serde(default = "default_cache_limit")]
    pub cache_limit: usize,
}

impl Default for Bot {
    fn default() -> Self {
        Self {
            admin_ids: Vec::new(),
            page_size: default_page_size(),
            search_limit: default_search_limit(),
            max_search_terms: default_max_search_terms(),
            utc_offset_minutes: default_utc_offset_minutes(),
            cache_limit: default_cache_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_connection_step_ms")]
    pub connection_step_ms: u64,
    #[serde(default = "default_connection_cap_ms")]
    pub connection_cap_ms: u64,
    #[serde(default = "default_rate_limit_step_ms")]
    pub rate_limit_step_ms: u64,
    #[serde(default = "default_rate_limit_cap_ms")]
    pub rate_limit_cap_ms: u64,
    #[serde(default = "default_other_step_ms")]
    pub other_step_ms: u64,
    #[serde(default = "default_other_cap_ms")]
    pub other_cap_ms: u64,
}

impl Default for Delivery {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            connection_step_ms: default_connection_step_ms(),
            connection_cap_ms: default_connection_cap_ms(),
            rate_limit_step_ms: default_rate_limit_step_ms(),
            rate_limit_cap_ms: default_rate_limit_cap_ms(),
            other_step_ms: default_other_step_ms(),
            other_cap_ms: default_other_cap_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sessions {
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

impl Default for Sessions {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl_secs(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scheduler {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scheduler_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_reminder_hour")]
    pub reminder_hour: u32,
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: i64,
    #[serde(default = "default_tolerance_minutes")]
    pub tolerance_minutes: i64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_scheduler_interval_secs(),
            reminder_hour: default_reminder_hour(),
            lead_minutes: default_lead_minutes(),
            tolerance_minutes: default_tolerance_minutes(),
        }
    }
}

fn default_line_api_base_url() -> String {
    "https://api.line.me".to_string()
}

fn default_line_timeout_ms() -> u64 {
    10_000
}

fn default_page_size() -> usize {
    12
}

fn default_search_limit() -> usize {
    10
}

fn default_max_search_terms() -> usize {
    3
}

fn default_utc_offset_minutes() -> i32 {
    7 * 60
}

fn default_cache_limit() -> usize {
    240
}

fn default_max_attempts() -> u32 {
    7
}

fn default_connection_step_ms() -> u64 {
    2_000
}

fn default_connection_cap_ms() -> u64 {
    10_000
}

fn default_rate_limit_step_ms() -> u64 {
    5_000
}

fn default_rate_limit_cap_ms() -> u64 {
    30_000
}

fn default_other_step_ms() -> u64 {
    1_000
}

fn default_other_cap_ms() -> u64 {
    5_000
}

fn default_idle_ttl_secs() -> u64 {
    30 * 60
}

fn default_rate_limit_window_ms() -> u64 {
    2_000
}

fn default_reaper_interval_secs() -> u64 {
    60
}

fn default_scheduler_interval_secs() -> u64 {
    10 * 60
}

fn default_reminder_hour() -> u32 {
    9
}

fn default_lead_minutes() -> i64 {
    3 * 60
}

fn default_tolerance_minutes() -> i64 {
    10
}

impl Config {
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = read(ENV_LINE_ACCESS_TOKEN) {
            self.line.access_token = Some(v);
        }
        if let Some(v) = read(ENV_LINE_CHANNEL_SECRET) {
            self.line.channel_secret = Some(v);
        }
        if let Some(v) = read(ENV_STORE_URL) {
            self.store.url = Some(v);
        }
        if let Some(v) = read(ENV_STORE_SERVICE_KEY) {
            self.store.service_key = Some(v);
        }
    }

    pub fn access_token(&self) -> &str {
        self.line.access_token.as_deref().unwrap_or_default()
    }

    pub fn channel_secret(&self) -> &str {
        self.line.channel_secret.as_deref().unwrap_or_default()
    }
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    load_and_validate_with_env(path, |key| std::env::var(key).ok())
}

pub fn load_and_validate_with_env<F>(path: &str, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let mut cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    cfg.apply_env(lookup);
    validate_runtime_support(&cfg)?;
    validate_credentials(&cfg)?;
    Ok(cfg)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

pub fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if !matches!(cfg.store.kind.as_str(), "memory" | "sqlite" | "rest") {
        return Err(ConfigError::UnsupportedConfig(format!(
            "store.type={} is not implemented; supported: memory, sqlite, rest",
            cfg.store.kind
        )));
    }
    if cfg.store.kind == "memory" && cfg.store.sqlite_path.is_some() {
        return Err(ConfigError::UnsupportedConfig(
            "store.sqlite_path is not supported when store.type=memory".to_string(),
        ));
    }
    if cfg.store.kind == "sqlite"
        && cfg
            .store
            .sqlite_path
            .as_ref()
            .map(|v| v.trim().is_empty())
            .unwrap_or(true)
    {
        return Err(ConfigError::UnsupportedConfig(
            "store.sqlite_path is required when store.type=sqlite".to_string(),
        ));
    }
    if cfg.bot.page_size == 0 || cfg.bot.page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::UnsupportedConfig(format!(
            "bot.page_size must be within 1..={MAX_PAGE_SIZE}"
        )));
    }
    if cfg.bot.search_limit == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "bot.search_limit must be >= 1".to_string(),
        ));
    }
    if cfg.delivery.max_attempts == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "delivery.max_attempts must be >= 1".to_string(),
        ));
    }
    if cfg.sessions.rate_limit_window_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "sessions.rate_limit_window_ms must be >= 1".to_string(),
        ));
    }
    if cfg.scheduler.reminder_hour > 23 {
        return Err(ConfigError::UnsupportedConfig(
            "scheduler.reminder_hour must be within 0..=23".to_string(),
        ));
    }
    for (name, minutes) in [
        ("scheduler.lead_minutes", cfg.scheduler.lead_minutes),
        ("scheduler.tolerance_minutes", cfg.scheduler.tolerance_minutes),
    ] {
        if !(0..=MAX_REMINDER_MINUTES).contains(&minutes) {
            return Err(ConfigError::UnsupportedConfig(format!(
                "{name} must be within 0..={MAX_REMINDER_MINUTES}"
            )));
        }
    }
    Ok(())
}

fn validate_credentials(cfg: &Config) -> Result<(), ConfigError> {
    let blank = |v: &Option<String>| v.as_ref().map(|s| s.trim().is_empty()).unwrap_or(true);
    if blank(&cfg.line.access_token) {
        return Err(ConfigError::MissingCredential(ENV_LINE_ACCESS_TOKEN));
    }
    if blank(&cfg.line.channel_secret) {
        return Err(ConfigError::MissingCredential(ENV_LINE_CHANNEL_SECRET));
    }
    if cfg.store.kind == "rest" {
        if blank(&cfg.store.url) {
            return Err(ConfigError::MissingCredential(ENV_STORE_URL));
        }
        if blank(&cfg.store.service_key) {
            return Err(ConfigError::MissingCredential(ENV_STORE_SERVICE_KEY));
        }
    }
    Ok(())
}
