use std::collections::HashSet;

use super::{types::Config, ConfigError};
use crate::registry::INPUT_PLACEHOLDER;

/// Smallest stderr tail worth keeping for a diagnostic.
const MIN_STDERR_TAIL_BYTES: usize = 256;

/// Validate configuration
///
/// Checks what serde cannot: non-zero port and limits, and that custom
/// recipes are usable and do not repeat a pair among themselves.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.scheduler.max_concurrent_jobs == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.max_concurrent_jobs must be at least 1".to_string(),
        ));
    }

    if config.supervisor.stderr_tail_bytes < MIN_STDERR_TAIL_BYTES {
        return Err(ConfigError::ValidationError(format!(
            "supervisor.stderr_tail_bytes must be at least {}",
            MIN_STDERR_TAIL_BYTES
        )));
    }

    for (name, tool) in [
        ("transcoder", &config.tools.transcoder),
        ("markup", &config.tools.markup),
        ("typesetter", &config.tools.typesetter),
    ] {
        if tool.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "tools.{}.timeout_secs cannot be 0",
                name
            )));
        }
    }

    let mut seen = HashSet::new();
    for recipe in &config.registry.recipes {
        let pair = format!("{} -> {}", recipe.source, recipe.target);
        if recipe.source == recipe.target {
            return Err(ConfigError::ValidationError(format!(
                "recipe {} converts a format into itself",
                pair
            )));
        }
        if !recipe.args.iter().any(|a| a.contains(INPUT_PLACEHOLDER)) {
            return Err(ConfigError::ValidationError(format!(
                "recipe {} has no {} placeholder",
                pair, INPUT_PLACEHOLDER
            )));
        }
        if recipe.timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(format!(
                "recipe {} timeout_secs cannot be 0",
                pair
            )));
        }
        if !seen.insert((recipe.source, recipe.target)) {
            return Err(ConfigError::ValidationError(format!(
                "recipe {} is declared twice",
                pair
            )));
        }
    }

    Ok(())
}
