//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.telegram.bot_key.trim().is_empty() {
        errors.push("telegram.bot_key is required".to_string());
    }
    if config.telegram.owner_id == 0 {
        errors.push("telegram.owner_id is required".to_string());
    }
    if config.telegram.group_id == 0 {
        errors.push("telegram.group_id is required".to_string());
    }
    if config.telegram.request_timeout_secs == 0 {
        errors.push("telegram.request_timeout_secs must be > 0".to_string());
    }

    let address = config.mumble.grpc_address.trim();
    if address.is_empty() {
        errors.push("mumble.grpc_address is required".to_string());
    } else if !(address.starts_with("http://") || address.starts_with("https://")) {
        errors.push("mumble.grpc_address must start with http:// or https://".to_string());
    }

    if config.bridge.queue_capacity == 0 {
        errors.push("bridge.queue_capacity must be > 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
