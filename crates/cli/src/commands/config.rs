use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use platter_core::config::{resolve_config_path, AppConfig, LoadOptions, LogFormat};
use toml::Value;

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field {
            key_path: "storage.cache_dir",
            env_keys: &["PLATTER_STORAGE_CACHE_DIR"],
            value: config.storage.cache_dir.display().to_string(),
        },
        Field {
            key_path: "storage.ttl_secs",
            env_keys: &["PLATTER_STORAGE_TTL_SECS"],
            value: config.storage.ttl_secs.to_string(),
        },
        Field {
            key_path: "storage.schema_version",
            env_keys: &["PLATTER_STORAGE_SCHEMA_VERSION"],
            value: config.storage.schema_version.to_string(),
        },
        Field {
            key_path: "remote.enabled",
            env_keys: &["PLATTER_REMOTE_ENABLED"],
            value: config.remote.enabled.to_string(),
        },
        Field {
            key_path: "remote.database_url",
            env_keys: &["PLATTER_REMOTE_DATABASE_URL"],
            value: config.remote.database_url.clone(),
        },
        Field {
            key_path: "remote.max_connections",
            env_keys: &["PLATTER_REMOTE_MAX_CONNECTIONS"],
            value: config.remote.max_connections.to_string(),
        },
        Field {
            key_path: "remote.timeout_secs",
            env_keys: &["PLATTER_REMOTE_TIMEOUT_SECS"],
            value: config.remote.timeout_secs.to_string(),
        },
        Field {
            key_path: "remote.debounce_ms",
            env_keys: &["PLATTER_REMOTE_DEBOUNCE_MS"],
            value: config.remote.debounce_ms.to_string(),
        },
        Field {
            key_path: "pricing.catalog_markup",
            env_keys: &["PLATTER_PRICING_CATALOG_MARKUP"],
            value: config.pricing.catalog_markup.to_string(),
        },
        Field {
            key_path: "logging.level",
            env_keys: &["PLATTER_LOGGING_LEVEL", "PLATTER_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key_path: "logging.format",
            env_keys: &["PLATTER_LOGGING_FORMAT", "PLATTER_LOG_FORMAT"],
            value: log_format_name(config.logging.format).to_string(),
        },
    ]
}

fn log_format_name(format: LogFormat) -> &'static str {
    match format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
