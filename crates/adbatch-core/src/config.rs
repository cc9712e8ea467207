use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let access_token = require("FACEBOOK_ACCESS_TOKEN")?;

    let env = parse_environment(&or_default("ADBATCH_ENV", "development"))?;
    let bind_addr: SocketAddr = parse_as(
        "ADBATCH_BIND_ADDR",
        &or_default("ADBATCH_BIND_ADDR", "0.0.0.0:8081"),
    )?;
    let log_level = or_default("ADBATCH_LOG_LEVEL", "info");

    let graph_base_url = or_default("ADBATCH_GRAPH_BASE_URL", "https://graph.facebook.com");
    let graph_api_version = or_default("ADBATCH_GRAPH_API_VERSION", "v19.0");
    let user_agent = or_default("ADBATCH_USER_AGENT", "adbatch/0.1 (bulk-ads)");

    let request_timeout_secs: u64 = parse_as(
        "ADBATCH_REQUEST_TIMEOUT_SECS",
        &or_default("ADBATCH_REQUEST_TIMEOUT_SECS", "30"),
    )?;
    let video_upload_timeout_secs: u64 = parse_as(
        "ADBATCH_VIDEO_UPLOAD_TIMEOUT_SECS",
        &or_default("ADBATCH_VIDEO_UPLOAD_TIMEOUT_SECS", "300"),
    )?;
    let batch_timeout_secs: u64 = parse_as(
        "ADBATCH_BATCH_TIMEOUT_SECS",
        &or_default("ADBATCH_BATCH_TIMEOUT_SECS", "600"),
    )?;
    let max_concurrent_targets: usize = parse_as(
        "ADBATCH_MAX_CONCURRENT_TARGETS",
        &or_default("ADBATCH_MAX_CONCURRENT_TARGETS", "4"),
    )?;
    if max_concurrent_targets == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "ADBATCH_MAX_CONCURRENT_TARGETS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let upload_dir = PathBuf::from(or_default("ADBATCH_UPLOAD_DIR", "./uploads"));
    let max_upload_bytes: u64 = parse_as(
        "ADBATCH_MAX_UPLOAD_BYTES",
        &or_default("ADBATCH_MAX_UPLOAD_BYTES", "2147483648"),
    )?;
    let blob_bucket = lookup("ADBATCH_BLOB_BUCKET")
        .ok()
        .filter(|b| !b.trim().is_empty());
    let callback_max_retries: u32 = parse_as(
        "ADBATCH_CALLBACK_MAX_RETRIES",
        &or_default("ADBATCH_CALLBACK_MAX_RETRIES", "3"),
    )?;

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        access_token,
        graph_base_url,
        graph_api_version,
        user_agent,
        request_timeout_secs,
        video_upload_timeout_secs,
        batch_timeout_secs,
        max_concurrent_targets,
        upload_dir,
        max_upload_bytes,
        blob_bucket,
        callback_max_retries,
    })
}

fn parse_as<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "ADBATCH_ENV".to_string(),
            reason: format!("expected development, test or production, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
