use std::env::VarError;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::app_config::{AppConfig, ServiceConfig};
use crate::ConfigError;

const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
const DEFAULT_SEARCH_MODEL: &str = "grok-3";
const DEFAULT_CLASSIFY_MODEL: &str = "grok-3-mini";
const AUDIENCES_PATH_VAR: &str = "PAINSCOUT_AUDIENCES_PATH";

/// Read configuration from the process environment. Binaries load `.env`
/// once at startup, before calling this.
///
/// # Errors
///
/// Returns `ConfigError` when the search key is missing or a numeric
/// setting does not parse.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    resolve(|key| std::env::var(key))
}

/// The audience preset file named in the process environment, if any.
///
/// Needs no credentials, so commands that only list presets can use it.
#[must_use]
pub fn audiences_path_from_env() -> Option<PathBuf> {
    audiences_path(|key| std::env::var(key))
}

fn audiences_path<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    lookup(AUDIENCES_PATH_VAR)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_var<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

fn resolve<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let present = |var: &str| lookup(var).ok().filter(|v| !v.trim().is_empty());
    let text = |var: &str, default: &str| present(var).unwrap_or_else(|| default.to_string());
    let number_u32 = |var: &str, default: u32| {
        present(var).map_or(Ok(default), |raw| parse_var::<u32>(var, &raw))
    };
    let number_u64 = |var: &str, default: u64| {
        present(var).map_or(Ok(default), |raw| parse_var::<u64>(var, &raw))
    };

    let search_api_key = present("PAINSCOUT_SEARCH_API_KEY")
        .ok_or_else(|| ConfigError::MissingEnvVar("PAINSCOUT_SEARCH_API_KEY".to_string()))?;
    let search_base_url = text("PAINSCOUT_SEARCH_BASE_URL", DEFAULT_BASE_URL);
    let search = ServiceConfig {
        api_key: search_api_key.clone(),
        base_url: search_base_url.clone(),
        model: text("PAINSCOUT_SEARCH_MODEL", DEFAULT_SEARCH_MODEL),
        timeout_secs: number_u64("PAINSCOUT_SEARCH_TIMEOUT_SECS", 90)?,
    };

    // The classification service shares the search credentials unless overridden.
    let classify = ServiceConfig {
        api_key: text("PAINSCOUT_CLASSIFY_API_KEY", &search_api_key),
        base_url: text("PAINSCOUT_CLASSIFY_BASE_URL", &search_base_url),
        model: text("PAINSCOUT_CLASSIFY_MODEL", DEFAULT_CLASSIFY_MODEL),
        timeout_secs: number_u64("PAINSCOUT_CLASSIFY_TIMEOUT_SECS", 30)?,
    };

    if search.timeout_secs == 0 || classify.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "service timeouts must be greater than zero".to_string(),
        ));
    }

    let max_retries = number_u32("PAINSCOUT_MAX_RETRIES", 1)?;
    let retry_backoff_base_ms = number_u64("PAINSCOUT_RETRY_BACKOFF_BASE_MS", 1_000)?;
    let monthly_budget = number_u64("PAINSCOUT_MONTHLY_BUDGET", 15_000)?;
    let window_limit = number_u32("PAINSCOUT_WINDOW_LIMIT", 450)?;
    let audiences_path = audiences_path(&lookup);
    let log_level = text("PAINSCOUT_LOG_LEVEL", "info");

    Ok(AppConfig {
        search,
        classify,
        max_retries,
        retry_backoff_base_ms,
        monthly_budget,
        window_limit,
        audiences_path,
        log_level,
    })
}
