use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use serde_json::json;
use toml::Value;

use crate::commands::{load_config, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let api_token = config
        .backend
        .api_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let lines = [
        render_line(
            "backend.base_url",
            &config.backend.base_url,
            source("backend.base_url", &["LEADFLOW_BACKEND_BASE_URL"]),
        ),
        render_line(
            "backend.timeout_secs",
            &config.backend.timeout_secs.to_string(),
            source("backend.timeout_secs", &["LEADFLOW_BACKEND_TIMEOUT_SECS"]),
        ),
        render_line(
            "backend.api_token",
            &api_token,
            source("backend.api_token", &["LEADFLOW_BACKEND_API_TOKEN"]),
        ),
        render_line(
            "checkout.merchant_name",
            &config.checkout.merchant_name,
            source("checkout.merchant_name", &["LEADFLOW_CHECKOUT_MERCHANT_NAME"]),
        ),
        render_line(
            "checkout.theme_color",
            &config.checkout.theme_color,
            source("checkout.theme_color", &["LEADFLOW_CHECKOUT_THEME_COLOR"]),
        ),
        render_line(
            "logging.level",
            &config.logging.level,
            source("logging.level", &["LEADFLOW_LOGGING_LEVEL", "LEADFLOW_LOG_LEVEL"]),
        ),
        render_line(
            "logging.format",
            &format!("{:?}", config.logging.format),
            source("logging.format", &["LEADFLOW_LOGGING_FORMAT", "LEADFLOW_LOG_FORMAT"]),
        ),
    ];

    CommandResult::success_with_data(
        "config",
        "effective config (source precedence: env > file > default)",
        Some(json!(lines)),
    )
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("leadflow.toml"), PathBuf::from("config/leadflow.toml")]
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
    if let Some(env_key) = env_keys.iter().find(|key| {
        env::var(key).map(|value| !value.trim().is_empty()).unwrap_or(false)
    }) {
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

/// Keeps at most a four-character hint of the token.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let Some(separator) = trimmed.chars().find(|ch| matches!(ch, '_' | '-')) else {
        return "<redacted>".to_string();
    };
    match trimmed.split_once(separator) {
        Some((prefix, _)) if prefix.len() <= 4 => format!("{prefix}{separator}***"),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::redact_token;

    #[test]
    fn tokens_never_render_in_full() {
        assert_eq!(redact_token("lf_live_abcdef"), "lf_***");
        assert_eq!(redact_token("abc-def-ghi"), "abc-***");
        assert_eq!(redact_token("sk-live_abcdef"), "sk-***");
        assert_eq!(redact_token("opaque-token-value-long"), "<redacted>");
        assert_eq!(redact_token("abcdef"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }
}
