//! Application configuration.
//!
//! Loaded once from the environment (plus an optional `.env` file for local
//! development) into an explicit, validated value. Nothing in the rest of the
//! crate reaches for a global singleton — every component that needs a setting
//! is constructed with a reference to (or a clone of) the relevant field.

use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One configured AI endpoint: `url|workers|model`.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub base_url: String,
    pub workers: usize,
    pub model: String,
}

impl EndpointSpec {
    /// Accepts either `url|workers|model` or the shorthand `url|model`
    /// (workers defaults to `default_workers`). A two-field spec is told
    /// apart from `url|workers` with a missing model by whether the second
    /// field parses as a worker count: `host|mistral` is `url|model`, but
    /// `host|4` is `url|workers` missing its model and is rejected.
    fn parse(raw: &str, default_workers: usize) -> Result<Self, ConfigError> {
        let fields: Vec<&str> = raw.split('|').map(str::trim).collect();
        let bad = || ConfigError::BadEndpointSpec(raw.to_string());

        let (url, workers, model) = match fields.as_slice() {
            [url, second] => match second.parse::<usize>() {
                Ok(_) => return Err(bad()),
                Err(_) => (*url, default_workers, *second),
            },
            [url, workers, model] => {
                let workers = workers.parse::<usize>().map_err(|_| bad())?;
                (*url, workers, *model)
            }
            _ => return Err(bad()),
        };

        if url.is_empty() || model.is_empty() {
            return Err(bad());
        }

        Ok(Self {
            base_url: normalize_base_url(url),
            workers,
            model: model.to_string(),
        })
    }
}

fn normalize_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sources: Vec<PathBuf>,
    pub strip_dirs: Vec<String>,
    pub source_wrapper_regex: Option<String>,

    pub main_target: PathBuf,
    pub report_dir: PathBuf,
    pub db_path: PathBuf,
    pub categories_path: PathBuf,
    pub rules_path: PathBuf,

    pub classifier_kind: String,
    pub ollama_endpoints_raw: Vec<String>,
    pub ollama_workers: usize,
    pub ai_api_key: Option<String>,
    pub ollama_timeout: Duration,
    pub ollama_retries: u32,
    pub ollama_backoff: f64,
    pub ollama_throttle: Duration,

    pub max_content_peek: usize,
    pub db_batch_size: usize,
    pub scan_workers: usize,
    pub hash_workers: usize,
    pub move_workers: usize,
    pub preview_workers: usize,
    pub ocr_timeout: Duration,

    pub relink_with_reflink: bool,
    pub log_level: String,
    pub mode: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_path("../.env");
        }
        Self::from_env_inner()
    }

    fn from_env_inner() -> Result<Self, ConfigError> {
        let sources = env_list("SOURCES")
            .into_iter()
            .map(PathBuf::from)
            .collect::<Vec<_>>();
        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let strip_dirs = env_list("STRIP_DIRS");
        let source_wrapper_regex = std::env::var("SOURCE_WRAPPER_REGEX")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| Some(r"src\d+".to_string()));

        let main_target = env_path("MAIN_TARGET", "/target");
        let report_dir = env_path("REPORT_DIR", "/target/_reports");
        let db_path = env_path("DB_PATH", "/work/catalog.sqlite");
        let categories_path = env_path("CATEGORIES_PATH", "data/categories.csv");
        let rules_path = env_path("RULES_PATH", "data/rules.csv");

        let classifier_kind = std::env::var("CLASSIFIER").unwrap_or_else(|_| "ollama".to_string());
        let ollama_endpoints_raw = env_list("OLLAMA_URL");
        let ollama_workers = env_usize("OLLAMA_WORKERS", 4);

        if classifier_kind != "manual" && ollama_endpoints_raw.is_empty() {
            return Err(ConfigError::MissingEndpoints(classifier_kind));
        }

        Ok(Self {
            sources,
            strip_dirs,
            source_wrapper_regex,
            main_target,
            report_dir,
            db_path,
            categories_path,
            rules_path,
            classifier_kind,
            ollama_endpoints_raw,
            ollama_workers,
            ai_api_key: std::env::var("AI_API_KEY").ok().filter(|s| !s.is_empty()),
            ollama_timeout: Duration::from_secs(env_u64("OLLAMA_TIMEOUT", 120)),
            ollama_retries: env_usize("OLLAMA_RETRIES", 3) as u32,
            ollama_backoff: env_f64("OLLAMA_BACKOFF", 1.5),
            ollama_throttle: Duration::from_secs_f64(env_f64("OLLAMA_THROTTLE_SECONDS", 0.0)),
            max_content_peek: env_usize("MAX_CONTENT_PEEK", 1024),
            db_batch_size: env_usize("DB_BATCH_SIZE", 500),
            scan_workers: env_usize("SCAN_WORKERS", 4),
            hash_workers: env_usize("HASH_WORKERS", 4),
            move_workers: env_usize("MOVE_WORKERS", 2),
            preview_workers: env_usize("PREVIEW_WORKERS", 1),
            ocr_timeout: Duration::from_secs(env_u64("OCR_TIMEOUT_SECONDS", 30)),
            relink_with_reflink: env_bool("RELINK_WITH_REFLINK", true),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            mode: std::env::var("MODE").unwrap_or_else(|_| "all".to_string()),
        })
    }

    /// Parse `OLLAMA_URL` entries into concrete endpoint specs.
    pub fn ollama_endpoints(&self) -> Result<Vec<EndpointSpec>, ConfigError> {
        self.ollama_endpoints_raw
            .iter()
            .map(|raw| EndpointSpec::parse(raw, self.ollama_workers))
            .collect()
    }

    pub fn categories_exists(&self) -> bool {
        Path::new(&self.categories_path).exists()
    }
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_spec_parses_full_form() {
        let spec = EndpointSpec::parse("localhost:11434|8|llama3.1", 4).unwrap();
        assert_eq!(spec.base_url, "http://localhost:11434");
        assert_eq!(spec.workers, 8);
        assert_eq!(spec.model, "llama3.1");
    }

    #[test]
    fn endpoint_spec_defaults_workers() {
        let spec = EndpointSpec::parse("http://host|mistral", 6).unwrap();
        assert_eq!(spec.workers, 6);
        assert_eq!(spec.model, "mistral");
    }

    #[test]
    fn endpoint_spec_requires_model() {
        assert!(EndpointSpec::parse("http://host|4", 4).is_err());
    }
}
