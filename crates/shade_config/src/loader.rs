//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{ConfigFile, ShaderManagerConfig};
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "shade.toml";

/// Loads and validates `shade.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ShaderManagerConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE_NAME))
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<ShaderManagerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(ConfigError::io(path))?;
    load_config_from_str(&content)
}

/// Like [`load_config`], but returns the defaults when the file does not exist.
pub fn load_config_or_default(project_dir: &Path) -> Result<ShaderManagerConfig, ConfigError> {
    match load_config(project_dir) {
        Err(e) if e.is_not_found() => Ok(ShaderManagerConfig::default()),
        other => other,
    }
}

/// Parses and validates a `shade.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<ShaderManagerConfig, ConfigError> {
    let file: ConfigFile =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&file.manager)?;
    Ok(file.manager)
}

/// Checks that limits are usable.
pub fn validate_config(config: &ShaderManagerConfig) -> Result<(), ConfigError> {
    if config.max_cache_entries == 0 {
        return Err(ConfigError::ValidationError(
            "manager.max_cache_entries must be positive".to_string(),
        ));
    }
    if config.max_cache_memory_mb == 0 {
        return Err(ConfigError::ValidationError(
            "manager.max_cache_memory_mb must be positive".to_string(),
        ));
    }
    if config.cache_directory.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("manager.cache_directory".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_common::ShaderModel;
    use std::path::PathBuf;

    #[test]
    fn empty_file_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, ShaderManagerConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[manager]
async_compilation = false
hot_reload = false
precompilation = false
statistics = false
caching = true
max_cache_entries = 16
max_cache_memory_mb = 8
cache_directory = "out/cache"
shader_directory = "assets/shaders"
include_paths = ["assets/shaders/common"]
default_model = "6.6"
hot_reload_interval_ms = 250
force_legacy_backend = true
compile_threads = 2
"#;
        let c = load_config_from_str(toml).unwrap();
        assert!(!c.async_compilation);
        assert!(!c.statistics);
        assert_eq!(c.max_cache_entries, 16);
        assert_eq!(c.cache_directory, PathBuf::from("out/cache"));
        assert_eq!(c.include_paths.len(), 1);
        assert_eq!(c.default_model, ShaderModel::SM_6_6);
        assert_eq!(c.hot_reload_interval_ms, 250);
        assert!(c.force_legacy_backend);
        assert_eq!(c.compile_threads, 2);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let c = load_config_from_str("[manager]\nmax_cache_entries = 5\n").unwrap();
        assert_eq!(c.max_cache_entries, 5);
        assert_eq!(c.max_cache_memory_mb, 256);
        assert!(c.hot_reload);
    }

    #[test]
    fn zero_entries_rejected() {
        let err = load_config_from_str("[manager]\nmax_cache_entries = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn zero_memory_rejected() {
        let err = load_config_from_str("[manager]\nmax_cache_memory_mb = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn bad_model_is_parse_error() {
        let err = load_config_from_str("[manager]\ndefault_model = \"4.0\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[manager]\nhot_reload_interval_ms = 10\n",
        )
        .unwrap();
        let c = load_config(dir.path()).unwrap();
        assert_eq!(c.hot_reload_interval_ms, 10);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_config(dir.path()), Err(ConfigError::IoError { .. })));
        let c = load_config_or_default(dir.path()).unwrap();
        assert_eq!(c, ShaderManagerConfig::default());
    }
}
