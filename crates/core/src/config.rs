use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::configurator::pricing::DEFAULT_CATALOG_MARKUP;
use crate::domain::order::ORDER_STATE_SCHEMA_VERSION;

pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["platter.toml", "config/platter.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub pricing: PricingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub cache_dir: PathBuf,
    pub ttl_secs: u64,
    pub schema_version: u32,
}

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub database_url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    pub debounce_ms: u64,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub catalog_markup: Decimal,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub cache_dir: Option<PathBuf>,
    pub remote_enabled: Option<bool>,
    pub database_url: Option<String>,
    pub catalog_markup: Option<Decimal>,
    pub log_level: Option<String>,
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
            storage: StorageConfig {
                cache_dir: PathBuf::from(".platter/cache"),
                ttl_secs: 24 * 60 * 60,
                schema_version: ORDER_STATE_SCHEMA_VERSION,
            },
            remote: RemoteConfig {
                enabled: false,
                database_url: "sqlite://platter.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                debounce_ms: 1000,
            },
            pricing: PricingConfig { catalog_markup: DEFAULT_CATALOG_MARKUP },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(storage) = patch.storage {
            if let Some(cache_dir) = storage.cache_dir {
                self.storage.cache_dir = cache_dir;
            }
            if let Some(ttl_secs) = storage.ttl_secs {
                self.storage.ttl_secs = ttl_secs;
            }
            if let Some(schema_version) = storage.schema_version {
                self.storage.schema_version = schema_version;
            }
        }

        if let Some(remote) = patch.remote {
            if let Some(enabled) = remote.enabled {
                self.remote.enabled = enabled;
            }
            if let Some(database_url) = remote.database_url {
                self.remote.database_url = database_url;
            }
            if let Some(max_connections) = remote.max_connections {
                self.remote.max_connections = max_connections;
            }
            if let Some(timeout_secs) = remote.timeout_secs {
                self.remote.timeout_secs = timeout_secs;
            }
            if let Some(debounce_ms) = remote.debounce_ms {
                self.remote.debounce_ms = debounce_ms;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(catalog_markup) = pricing.catalog_markup {
                self.pricing.catalog_markup = catalog_markup;
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
        if let Some(value) = read_env("PLATTER_STORAGE_CACHE_DIR") {
            self.storage.cache_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("PLATTER_STORAGE_TTL_SECS") {
            self.storage.ttl_secs = parse_env("PLATTER_STORAGE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("PLATTER_STORAGE_SCHEMA_VERSION") {
            self.storage.schema_version = parse_env("PLATTER_STORAGE_SCHEMA_VERSION", &value)?;
        }

        if let Some(value) = read_env("PLATTER_REMOTE_ENABLED") {
            self.remote.enabled = parse_env("PLATTER_REMOTE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("PLATTER_REMOTE_DATABASE_URL") {
            self.remote.database_url = value;
        }
        if let Some(value) = read_env("PLATTER_REMOTE_MAX_CONNECTIONS") {
            self.remote.max_connections = parse_env("PLATTER_REMOTE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PLATTER_REMOTE_TIMEOUT_SECS") {
            self.remote.timeout_secs = parse_env("PLATTER_REMOTE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PLATTER_REMOTE_DEBOUNCE_MS") {
            self.remote.debounce_ms = parse_env("PLATTER_REMOTE_DEBOUNCE_MS", &value)?;
        }

        if let Some(value) = read_env("PLATTER_PRICING_CATALOG_MARKUP") {
            self.pricing.catalog_markup = parse_env("PLATTER_PRICING_CATALOG_MARKUP", &value)?;
        }

        let log_level =
            read_env("PLATTER_LOGGING_LEVEL").or_else(|| read_env("PLATTER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PLATTER_LOGGING_FORMAT").or_else(|| read_env("PLATTER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(cache_dir) = overrides.cache_dir {
            self.storage.cache_dir = cache_dir;
        }
        if let Some(enabled) = overrides.remote_enabled {
            self.remote.enabled = enabled;
        }
        if let Some(database_url) = overrides.database_url {
            self.remote.database_url = database_url;
        }
        if let Some(catalog_markup) = overrides.catalog_markup {
            self.pricing.catalog_markup = catalog_markup;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_storage(&self.storage)?;
        validate_remote(&self.remote)?;
        validate_pricing(&self.pricing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The config file `load` would read for `explicit_path`, if one exists.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS.into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.cache_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("storage.cache_dir must not be empty".to_string()));
    }
    if storage.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "storage.ttl_secs must be greater than zero".to_string(),
        ));
    }
    if storage.schema_version == 0 {
        return Err(ConfigError::Validation(
            "storage.schema_version must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_remote(remote: &RemoteConfig) -> Result<(), ConfigError> {
    let url = remote.database_url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "remote.database_url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if remote.max_connections == 0 {
        return Err(ConfigError::Validation(
            "remote.max_connections must be greater than zero".to_string(),
        ));
    }

    if remote.timeout_secs == 0 || remote.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "remote.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if remote.debounce_ms > 60_000 {
        return Err(ConfigError::Validation(
            "remote.debounce_ms must be at most 60000".to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if pricing.catalog_markup <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "pricing.catalog_markup must be greater than zero".to_string(),
        ));
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

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    storage: Option<StoragePatch>,
    remote: Option<RemotePatch>,
    pricing: Option<PricingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    cache_dir: Option<PathBuf>,
    ttl_secs: Option<u64>,
    schema_version: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RemotePatch {
    enabled: Option<bool>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    debounce_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    catalog_markup: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
