//! Full configuration validation.
//!
//! Validates numeric ranges and required strings. Each section has its own
//! validator; this orchestrator calls them all and collects errors into a
//! single `ConfigError`.

mod helpers;
mod misc;


use crate::schema::PulseConfig;
use pulse_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &PulseConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    misc::validate_bus(&mut errors, config);
    misc::validate_voice(&mut errors, config);
    misc::validate_relay(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
