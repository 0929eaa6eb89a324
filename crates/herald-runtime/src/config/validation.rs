//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{HeraldConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &HeraldConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates logging configuration.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    for module in logging.filters.keys() {
        if module.is_empty() {
            return Err(ConfigError::validation("Log filter module cannot be empty"));
        }
        if module.contains(['=', ',']) || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid log filter module: {module:?}"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::schema::LogLevel;
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&HeraldConfig::default()).is_ok());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = HeraldConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.logging.file_path = Some("herald.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_filter_module() {
        let mut config = HeraldConfig::default();
        config
            .logging
            .filters
            .insert("herald=debug".to_string(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }
}
