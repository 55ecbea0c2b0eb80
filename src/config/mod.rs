//! Configuration management for the request inspection service.
//!
//! This module handles loading and managing application configuration
//! from environment variables and configuration files.

use crate::models::Config;
use ::config::{Config as ConfigBuilder, ConfigError, Environment, File};
use std::env;

/// Load configuration from the config file and environment variables
pub fn load_config() -> Result<Config, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());

    let config = ConfigBuilder::builder()
        .add_source(File::with_name(&config_file))
        .add_source(Environment::default())
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("redis.url", "redis://127.0.0.1:6379")?
        .set_default("redis.pool_size", 10)?
        .set_default("inspection.enabled", true)?
        .set_default("inspection.block_threshold", 10)?
        .set_default("inspection.block_duration_minutes", 60)?
        .set_default("inspection.track_window_minutes", 5)?
        .set_default("rate_limit.enabled", true)?
        .set_default("rate_limit.storage", "memory")?
        .set_default("rate_limit.default_quota.per_minute", 200)?
        .set_default("rate_limit.default_quota.per_hour", 5000)?
        .set_default("alerts.enabled", false)?
        .set_default("alerts.cooldown_minutes", 60)?
        .set_default("alerts.api_url", "https://api.resend.com/emails")?
        .set_default("alerts.api_key", "")?
        .set_default("alerts.from_email", "security@example.com")?
        .set_default("alerts.alert_email", "ops@example.com")?
        .set_default("housekeeping.interval_seconds", 300)?
        .build()?;

    config.try_deserialize()
}
