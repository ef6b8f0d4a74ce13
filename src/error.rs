//! Crate-wide error types.
//!
//! Construction-time failures (bad config, unparsable categories/rules, a catalog
//! that won't open) propagate as `Result::Err` all the way to the CLI. Per-file and
//! per-batch failures never unwind this far — they are recorded on the catalog row
//! or folded into a classifier response instead (see `classifier::ClassifierResponse`).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no source roots configured (SOURCES must name at least one directory)")]
    NoSources,

    #[error("classifier kind '{0}' requires at least one AI endpoint (OLLAMA_URL)")]
    MissingEndpoints(String),

    #[error("invalid endpoint spec '{0}': expected url|workers|model with a non-empty model")]
    BadEndpointSpec(String),

    #[error("categories file not found: {0}")]
    CategoriesMissing(PathBuf),

    #[error("environment variable {0} could not be parsed: {1}")]
    BadValue(&'static str, String),
}

#[derive(Debug, Error)]
pub enum CategoriesError {
    #[error("failed to read categories source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse categories JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("category row {line} has an empty path: {raw}")]
    EmptyPath { line: usize, raw: String },
}

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("failed to read rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to (de)serialize catalog payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response did not contain a usable answer")]
    Unparseable,

    #[error("model '{model}' is not available on {base_url}")]
    ModelUnavailable { base_url: String, model: String },

    #[error("no workers available with an acceptable success rate")]
    NoWorkersAvailable,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no extractor registered for mime '{0}'")]
    Unsupported(String),

    #[error("extraction failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Categories(#[from] CategoriesError),

    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
