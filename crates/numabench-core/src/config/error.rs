//! # Configuration Error Types

use std::path::PathBuf;

/// Errors raised while loading or validating a benchmark configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A parameter value could not be parsed
    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue {
        /// Parameter name
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// The parameters are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
