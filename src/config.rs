//! Service configuration read from the environment.

use std::time::Duration;

use thiserror::Error;

use crate::application::{ServiceSettings, FULFILLMENT_SERVICE_NAME};
use crate::infrastructure::http::Timeouts;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// HMAC key of storefront webhooks.
    pub storefront_webhook_secret: String,
    /// HMAC key of production shipment webhooks.
    pub production_webhook_secret: String,
    pub production_api_url: String,
    pub production_api_key: String,
    pub production_timeouts: Timeouts,
    pub platform_timeouts: Timeouts,
    pub shopify_api_version: String,
    pub submit_calls_production: bool,
    pub fulfillment_callback_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));
        let parse = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(name) {
                None => Ok(default),
                Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
            }
        };
        let secs = |name: &'static str, default: u64| parse(name, default).map(Duration::from_secs);

        let port = parse("PORT", 8080)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            name: "PORT",
            value: port.to_string(),
        })?;
        let submit_calls_production = match get("SUBMIT_CALLS_PRODUCTION").as_deref() {
            None => true,
            Some("1" | "true" | "TRUE" | "yes") => true,
            Some("0" | "false" | "FALSE" | "no") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "SUBMIT_CALLS_PRODUCTION",
                    value: other.to_string(),
                })
            }
        };

        Ok(Config {
            database_url: require("DATABASE_URL")?,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            storefront_webhook_secret: require("STOREFRONT_WEBHOOK_SECRET")?,
            production_webhook_secret: require("PRODUCTION_WEBHOOK_SECRET")?,
            production_api_url: require("PRODUCTION_API_URL")?,
            production_api_key: require("PRODUCTION_API_KEY")?,
            production_timeouts: Timeouts {
                connect: secs("PRODUCTION_CONNECT_TIMEOUT_SECS", 10)?,
                request: secs("PRODUCTION_REQUEST_TIMEOUT_SECS", 30)?,
            },
            platform_timeouts: Timeouts {
                connect: secs("PLATFORM_CONNECT_TIMEOUT_SECS", 10)?,
                request: secs("PLATFORM_REQUEST_TIMEOUT_SECS", 30)?,
            },
            shopify_api_version: get("SHOPIFY_API_VERSION")
                .unwrap_or_else(|| "2024-10".to_string()),
            submit_calls_production,
            fulfillment_callback_url: get("FULFILLMENT_SERVICE_CALLBACK_URL"),
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            submit_calls_production: self.submit_calls_production,
            fulfillment_service_name: FULFILLMENT_SERVICE_NAME.to_string(),
            fulfillment_callback_url: self.fulfillment_callback_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 5] = [
        ("DATABASE_URL", "postgres://localhost/pod"),
        ("STOREFRONT_WEBHOOK_SECRET", "shpss_123"),
        ("PRODUCTION_WEBHOOK_SECRET", "prod_456"),
        ("PRODUCTION_API_URL", "https://print.example.com/api"),
        ("PRODUCTION_API_KEY", "key"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let config = Config::from_lookup(env(&REQUIRED)).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.production_timeouts.connect, Duration::from_secs(10));
        assert_eq!(config.platform_timeouts.request, Duration::from_secs(30));
        assert_eq!(config.shopify_api_version, "2024-10");
        assert!(config.submit_calls_production);
        assert_eq!(config.fulfillment_callback_url, None);
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("PORT", "9000"),
            ("PRODUCTION_REQUEST_TIMEOUT_SECS", "5"),
            ("PLATFORM_CONNECT_TIMEOUT_SECS", "3"),
            ("SUBMIT_CALLS_PRODUCTION", "false"),
            ("FULFILLMENT_SERVICE_CALLBACK_URL", "https://pod.example.com/fs"),
        ]);
        let config = Config::from_lookup(env(&vars)).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.production_timeouts.request, Duration::from_secs(5));
        assert_eq!(config.production_timeouts.connect, Duration::from_secs(10));
        assert_eq!(config.platform_timeouts.connect, Duration::from_secs(3));
        assert!(!config.service_settings().submit_calls_production);
        assert_eq!(
            config.service_settings().fulfillment_callback_url.as_deref(),
            Some("https://pod.example.com/fs")
        );
    }

    #[test]
    fn missing_and_malformed_values_are_reported() {
        let vars: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "PRODUCTION_API_KEY")
            .collect();
        assert_eq!(
            Config::from_lookup(env(&vars)).unwrap_err(),
            ConfigError::Missing("PRODUCTION_API_KEY")
        );

        let mut vars = REQUIRED.to_vec();
        vars.push(("PORT", "http"));
        assert!(matches!(
            Config::from_lookup(env(&vars)),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));

        let mut vars = REQUIRED.to_vec();
        vars.push(("DATABASE_URL", "  "));
        let lookup = env(&vars);
        assert_eq!(lookup("DATABASE_URL").as_deref(), Some("  "));
        assert_eq!(Config::from_lookup(lookup).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
    }
}
