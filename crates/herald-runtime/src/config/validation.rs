//! Configuration validation.

use herald_framework::RunMode;

use super::error::{ConfigError, ConfigResult};
use super::schema::{HeraldConfig, LogOutput};

/// Validates the entire configuration.
pub fn validate_config(config: &HeraldConfig) -> ConfigResult<()> {
    validate_dispatch(config)?;
    validate_logging(config)?;
    validate_handlers(config)?;
    Ok(())
}

fn validate_dispatch(config: &HeraldConfig) -> ConfigResult<()> {
    let dispatch = &config.dispatch;

    if dispatch.prefix.trim().is_empty() {
        return Err(ConfigError::validation("dispatch.prefix must not be empty"));
    }

    if dispatch.default_run_mode == RunMode::Default {
        return Err(ConfigError::validation(
            "Cannot set default runmode to Default",
        ));
    }

    if !(0.0..1.0).contains(&dispatch.confidence_weight) {
        return Err(ConfigError::validation(format!(
            "dispatch.confidence_weight must be in [0, 1), got {}",
            dispatch.confidence_weight
        )));
    }

    Ok(())
}

fn validate_logging(config: &HeraldConfig) -> ConfigResult<()> {
    if config.logging.output == LogOutput::File && config.logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }
    Ok(())
}

fn validate_handlers(config: &HeraldConfig) -> ConfigResult<()> {
    if let Some(name) = config.handlers.keys().find(|name| name.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Handler override has an empty name: {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandlerOverride;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&HeraldConfig::default()).is_ok());
    }

    #[test]
    fn test_reject_empty_prefix() {
        let mut config = HeraldConfig::default();
        config.dispatch.prefix = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_reject_default_run_mode() {
        let mut config = HeraldConfig::default();
        config.dispatch.default_run_mode = RunMode::Default;
        let err = validate_config(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Cannot set default runmode to Default"
        );
    }

    #[test]
    fn test_confidence_weight_bounds() {
        let mut config = HeraldConfig::default();
        config.dispatch.confidence_weight = 0.0;
        assert!(validate_config(&config).is_ok());
        config.dispatch.confidence_weight = 1.0;
        assert!(validate_config(&config).is_err());
        config.dispatch.confidence_weight = -0.1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = HeraldConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
        config.logging.file_path = Some("herald.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_reject_blank_handler_name() {
        let mut config = HeraldConfig::default();
        config.handlers.insert(String::new(), HandlerOverride::default());
        assert!(validate_config(&config).is_err());
    }
}
