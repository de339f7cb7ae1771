use crate::config::Config;
use crate::error::ConfigError;

/// Validate a [`Config`], returning every violation found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut reject = |field: &str, message: String| {
        errors.push(ConfigError::Validation {
            field: field.to_string(),
            message,
        });
    };

    if config.server.port == 0 {
        reject("server.port", "must not be 0".to_string());
    }
    if config.server.bind_address.trim().is_empty() {
        reject("server.bind_address", "must not be empty".to_string());
    }
    if config.server.max_sessions == 0 {
        reject("server.max_sessions", "must be at least 1".to_string());
    }
    if config.server.max_packet_bytes == 0 {
        reject("server.max_packet_bytes", "must be at least 1".to_string());
    }
    if config.session.idekey.trim().is_empty() {
        reject("session.idekey", "must not be empty".to_string());
    }
    if config.session.language.trim().is_empty() {
        reject("session.language", "must not be empty".to_string());
    }
    if config.session.max_pending_transactions == 0 {
        reject(
            "session.max_pending_transactions",
            "must be at least 1".to_string(),
        );
    }
    if config.bridge.capacity == 0 {
        reject("bridge.capacity", "must be at least 1".to_string());
    }
    for (i, bp) in config.breakpoints.iter().enumerate() {
        if bp.file.trim().is_empty() {
            reject(&format!("breakpoint[{i}].file"), "must not be empty".to_string());
        }
        if bp.line == 0 {
            reject(
                &format!("breakpoint[{i}].line"),
                format!("lines are one-based, got {}", bp.line),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
