use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use matchcast_core::config::AppConfig;
use toml::Value;

use crate::commands::{load_config, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = effective_fields(&config);
    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_keys, value) in &fields {
        let source =
            field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key_path, value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

type Field = (&'static str, &'static [&'static str], String);

fn field(key_path: &'static str, env_keys: &'static [&'static str], value: String) -> Field {
    (key_path, env_keys, value)
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    vec![
        field("database.url", &["MATCHCAST_DATABASE_URL"], config.database.url.clone()),
        field(
            "database.max_connections",
            &["MATCHCAST_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            &["MATCHCAST_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        field(
            "classifier.artifact_path",
            &["MATCHCAST_CLASSIFIER_ARTIFACT_PATH"],
            config.classifier.artifact_path.display().to_string(),
        ),
        field(
            "classifier.timeout_ms",
            &["MATCHCAST_CLASSIFIER_TIMEOUT_MS"],
            config.classifier.timeout_ms.to_string(),
        ),
        field(
            "auth.pbkdf2_iterations",
            &["MATCHCAST_AUTH_PBKDF2_ITERATIONS"],
            config.auth.pbkdf2_iterations.to_string(),
        ),
        field(
            "server.bind_address",
            &["MATCHCAST_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        field("server.port", &["MATCHCAST_SERVER_PORT"], config.server.port.to_string()),
        field(
            "server.graceful_shutdown_secs",
            &["MATCHCAST_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs.to_string(),
        ),
        field(
            "logging.level",
            &["MATCHCAST_LOGGING_LEVEL", "MATCHCAST_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        field(
            "logging.format",
            &["MATCHCAST_LOGGING_FORMAT", "MATCHCAST_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("matchcast.toml"), PathBuf::from("config/matchcast.toml")]
        .into_iter()
        .find(|path| path.exists())
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
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
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
