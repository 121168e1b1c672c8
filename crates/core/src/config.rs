use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub restaurant: RestaurantConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Classifier verdicts below this confidence escalate to a human
    /// instead of driving a mutation.
    pub confidence_threshold: u8,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Inactivity window before a pending action expires.
    pub pending_ttl_minutes: i64,
    /// Turns of history handed to the classifier for context.
    pub history_window: usize,
}

#[derive(Clone, Debug)]
pub struct RestaurantConfig {
    pub name: String,
    pub timezone: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub pending_ttl_minutes: Option<i64>,
    pub restaurant_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://casona.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
                confidence_threshold: 60,
            },
            session: SessionConfig { pending_ttl_minutes: 15, history_window: 20 },
            restaurant: RestaurantConfig {
                name: "La Casona".to_string(),
                timezone: "America/Mexico_City".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("casona.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
            if let Some(confidence_threshold) = llm.confidence_threshold {
                self.llm.confidence_threshold = confidence_threshold;
            }
        }

        if let Some(session) = patch.session {
            if let Some(pending_ttl_minutes) = session.pending_ttl_minutes {
                self.session.pending_ttl_minutes = pending_ttl_minutes;
            }
            if let Some(history_window) = session.history_window {
                self.session.history_window = history_window;
            }
        }

        if let Some(restaurant) = patch.restaurant {
            if let Some(name) = restaurant.name {
                self.restaurant.name = name;
            }
            if let Some(timezone) = restaurant.timezone {
                self.restaurant.timezone = timezone;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = read_env("CASONA_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(value) = read_env("CASONA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("CASONA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(provider) = read_env("CASONA_LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(api_key) = read_env("CASONA_LLM_API_KEY") {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(model) = read_env("CASONA_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(value) = read_env("CASONA_SESSION_TTL_MINUTES") {
            self.session.pending_ttl_minutes = parse_i64("CASONA_SESSION_TTL_MINUTES", &value)?;
        }
        if let Some(level) = read_env("CASONA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = read_env("CASONA_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(ttl) = overrides.pending_ttl_minutes {
            self.session.pending_ttl_minutes = ttl;
        }
        if let Some(name) = overrides.restaurant_name {
            self.restaurant.name = name;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_session(&self.session)?;
        validate_restaurant(&self.restaurant)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("casona.toml"), PathBuf::from("config/casona.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.confidence_threshold > 100 {
        return Err(ConfigError::Validation(
            "llm.confidence_threshold must be in range 0..=100".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.pending_ttl_minutes <= 0 {
        return Err(ConfigError::Validation(
            "session.pending_ttl_minutes must be greater than zero".to_string(),
        ));
    }

    if session.history_window == 0 {
        return Err(ConfigError::Validation(
            "session.history_window must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_restaurant(restaurant: &RestaurantConfig) -> Result<(), ConfigError> {
    if restaurant.name.trim().is_empty() {
        return Err(ConfigError::Validation("restaurant.name must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    session: Option<SessionPatch>,
    restaurant: Option<RestaurantPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    confidence_threshold: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    pending_ttl_minutes: Option<i64>,
    history_window: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RestaurantPatch {
    name: Option<String>,
    timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.pending_ttl_minutes, 15);
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CASONA_DB_URL", "sqlite::memory:");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("casona.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_CASONA_DB_URL}"

[session]
pending_ttl_minutes = 30
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite::memory:",
                "database url should come from the environment",
            )?;
            ensure(config.session.pending_ttl_minutes == 30, "ttl should come from the file")?;
            Ok(())
        })();

        clear_vars(&["TEST_CASONA_DB_URL"]);
        result
    }

    #[test]
    fn env_overrides_beat_defaults() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CASONA_LOG_LEVEL", "warn");
        env::set_var("CASONA_LOG_FORMAT", "json");
        env::set_var("CASONA_SESSION_TTL_MINUTES", "5");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "log level should come from env")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "log format should come from env",
            )?;
            ensure(config.session.pending_ttl_minutes == 5, "ttl should come from env")?;
            Ok(())
        })();

        clear_vars(&["CASONA_LOG_LEVEL", "CASONA_LOG_FORMAT", "CASONA_SESSION_TTL_MINUTES"]);
        result
    }

    #[test]
    fn programmatic_overrides_win_last() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                pending_ttl_minutes: Some(1),
                restaurant_name: Some("Mesón de Prueba".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.database.url == "sqlite::memory:", "override should set db url")?;
        ensure(config.session.pending_ttl_minutes == 1, "override should set ttl")?;
        ensure(config.restaurant.name == "Mesón de Prueba", "override should set name")?;
        Ok(())
    }

    #[test]
    fn rejects_non_sqlite_database_url() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://localhost/casona".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .err()
        .ok_or("expected validation failure")?;

        ensure(
            matches!(error, ConfigError::Validation(_)),
            "non-sqlite url should fail validation",
        )
    }

    #[test]
    fn zero_ttl_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                pending_ttl_minutes: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .err()
        .ok_or("expected validation failure")?;

        ensure(matches!(error, ConfigError::Validation(_)), "zero ttl should fail validation")
    }
}
