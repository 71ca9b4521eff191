//! Configuration parsing and validation for chaffd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Named presets supplying schedule and noise defaults
//! - Target ranges, port pools and flag lists
//! - Validation with clear error messages

mod policy;
mod preset;
mod range;
mod schema;
mod validation;

pub use policy::*;
pub use preset::*;
pub use range::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Policy::from_raw(raw).map_err(|e| ConfigError::ValidationFailed { errors: vec![e] })
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [targets]
            range = "172.16.200.1-3"
            extra = ["172.16.120.11"]

            [flags]
            real = "FLAG{real}"
            fake = ["FLAG{a}", "FLAG{b}", "FLAG{c}"]
        "#;

        let policy = parse_config(config).unwrap();
        assert_eq!(policy.targets.range.len(), 3);
        assert_eq!(policy.targets.extras.len(), 1);
        assert_eq!(policy.fake_flag_count(), 3);
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99

            [targets]
            range = "10.0.0.1"

            [flags]
            real = "FLAG{x}"
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_fully_excluded_real_flag_pool() {
        let config = r#"
            config_version = 1

            [targets]
            range = "10.0.0.1-5"

            [flags]
            real = "FLAG{x}"

            [ports]
            excluded = [53, 80, 23]
            real_flag = [53, 80, 23]
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert!(matches!(errors[..], [ValidationError::NoRealFlagPorts { .. }]));
            }
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            config_version = 1
            preset = "aggressive"

            [targets]
            range = "10.0.0.0/29"

            [flags]
            real = "FLAG{{x}}"
            "#
        )
        .unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.preset, Preset::Aggressive);
        assert_eq!(policy.targets.range.len(), 6);
        assert!(policy.noise.enabled);
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn example_config_is_valid() {
        let policy = parse_config(include_str!("../../../config.example.toml")).unwrap();

        assert_eq!(policy.preset, Preset::Standard);
        assert_eq!(policy.targets.range.len(), 253);
        assert_eq!(policy.targets.extras.len(), 2);
        assert_eq!(policy.fake_flag_count(), 4);
        assert!(!policy.ports.real_flag.contains(53));
        assert!(!policy.noise.enabled);
    }
}
