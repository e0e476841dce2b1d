//! Errors raised while reading `shade.toml` and precompile manifests.

use std::path::PathBuf;

/// Failure to load or validate a configuration file or manifest.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    IoError {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A value is out of range.
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ConfigError::IoError { path, source }
    }

    /// `true` when the file simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::IoError { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_file() {
        let err = ConfigError::io("project/shade.toml")(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(err.to_string(), "failed to read project/shade.toml: denied");
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_found_is_recognized() {
        let err = ConfigError::io("shade.toml")(std::io::ErrorKind::NotFound.into());
        assert!(err.is_not_found());
        assert!(!ConfigError::MissingField("x".into()).is_not_found());
    }

    #[test]
    fn message_variants() {
        assert_eq!(
            ConfigError::MissingField("shader[0].file".into()).to_string(),
            "missing required field: shader[0].file"
        );
        assert_eq!(
            ConfigError::ValidationError("manager.max_cache_entries must be positive".into()).to_string(),
            "validation error: manager.max_cache_entries must be positive"
        );
        assert!(ConfigError::ParseError("line 3".into())
            .to_string()
            .starts_with("failed to parse configuration"));
    }
}
