//! Configuration management for the allocation server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with ALLOC_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::error::SettingError;
use shared::settings::{ReferenceSettings, SettingKey};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Order reference configuration
    #[serde(default)]
    pub references: ReferenceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

/// Raw reference settings; validated by [`ReferenceConfig::settings`]
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReferenceConfig {
    pub sales_order_prefix: Option<String>,
    pub purchase_order_prefix: Option<String>,
    pub build_order_prefix: Option<String>,
    pub sales_order_pattern: Option<String>,
    pub purchase_order_pattern: Option<String>,
    pub build_order_pattern: Option<String>,
    pub digits: Option<u32>,
}

impl ReferenceConfig {
    /// Validate every configured value against the settings schema
    pub fn settings(&self) -> Result<ReferenceSettings, SettingError> {
        let mut settings = ReferenceSettings::default();

        let entries = [
            (SettingKey::SalesOrderReferencePrefix, self.sales_order_prefix.clone()),
            (SettingKey::PurchaseOrderReferencePrefix, self.purchase_order_prefix.clone()),
            (SettingKey::BuildOrderReferencePrefix, self.build_order_prefix.clone()),
            (SettingKey::SalesOrderReferencePattern, self.sales_order_pattern.clone()),
            (SettingKey::PurchaseOrderReferencePattern, self.purchase_order_pattern.clone()),
            (SettingKey::BuildOrderReferencePattern, self.build_order_pattern.clone()),
            (SettingKey::ReferenceDigits, self.digits.map(|d| d.to_string())),
        ];

        for (key, value) in entries {
            if let Some(raw) = value {
                settings.apply(key, &raw)?;
            }
        }

        Ok(settings)
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("ALLOC_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (ALLOC_ prefix)
            .add_source(
                Environment::with_prefix("ALLOC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::OrderKind;

    #[test]
    fn test_reference_defaults() {
        let settings = ReferenceConfig::default().settings().unwrap();
        assert_eq!(settings.prefix(OrderKind::SalesOrder), "SO");
        assert_eq!(settings.digits, 4);
    }

    #[test]
    fn test_reference_overrides_are_validated() {
        let config = ReferenceConfig {
            build_order_prefix: Some("WO-".to_string()),
            digits: Some(6),
            ..Default::default()
        };
        let settings = config.settings().unwrap();
        assert_eq!(settings.prefix(OrderKind::BuildOrder), "WO-");
        assert_eq!(settings.digits, 6);

        let bad = ReferenceConfig {
            sales_order_pattern: Some("(".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad.settings(), Err(SettingError::InvalidPattern { .. })));
    }
}
