//! Shared configuration for the painscout workspace.
//!
//! Holds the environment-driven [`AppConfig`] and the audience preset file
//! format consumed by the finder.

pub mod app_config;
pub mod audiences;
pub mod config;

use thiserror::Error;

pub use app_config::{AppConfig, ServiceConfig};
pub use audiences::{load_audiences, AudienceConfig, AudiencesFile};
pub use config::{audiences_path_from_env, load_app_config_from_env};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read audiences file {path}: {source}")]
    AudiencesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse audiences file: {0}")]
    AudiencesFileParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),
}
