//! Application configuration

use std::env;

use nerbixa_billing::{BillingSettings, EmailConfig, GatewayConfig};
use nerbixa_shared::PriceTable;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub auth_jwt_public_key: String,
    pub auth_jwt_issuer: Option<String>,

    // Payments
    pub shop_public_key: Option<String>,
    pub gateway: GatewayConfig,
    /// Timeout of the outbound gateway and e-mail calls
    pub billing_http_timeout_secs: u64,

    // Generation providers
    pub openai_api_key: String,
    pub replicate_api_token: String,
    pub provider_timeout_secs: u64,
    pub tool_prices: PriceTable,

    // Email
    pub email: EmailConfig,

    // Feature flags
    pub enable_billing: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            gateway: GatewayConfig::from_env(&public_url),
            public_url,

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),

            // Authentication
            auth_jwt_public_key: {
                let key = env::var("AUTH_JWT_PUBLIC_KEY")
                    .map_err(|_| ConfigError::Missing("AUTH_JWT_PUBLIC_KEY"))?
                    .replace("\\n", "\n");
                if !key.contains("-----BEGIN") {
                    return Err(ConfigError::Invalid(
                        "AUTH_JWT_PUBLIC_KEY must be a PEM encoded public key",
                    ));
                }
                key
            },
            auth_jwt_issuer: env::var("AUTH_JWT_ISSUER").ok().filter(|s| !s.is_empty()),

            // Payments
            shop_public_key: env::var("SHOP_PUBLIC_KEY").ok().filter(|s| !s.is_empty()),
            billing_http_timeout_secs: env::var("BILLING_HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),

            // Generation providers
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            replicate_api_token: env::var("REPLICATE_API_TOKEN").unwrap_or_default(),
            provider_timeout_secs: env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
            tool_prices: match env::var("TOOL_PRICES") {
                Ok(overrides) => PriceTable::default()
                    .with_overrides(&overrides)
                    .map_err(|e| ConfigError::InvalidPrices(e.to_string()))?,
                Err(_) => PriceTable::default(),
            },

            // Email
            email: EmailConfig::from_env(),

            // Feature flags
            enable_billing: env::var("ENABLE_BILLING")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }

    /// Billing settings derived from this configuration
    pub fn billing_settings(&self) -> BillingSettings {
        BillingSettings {
            shop_public_key: self.shop_public_key.clone(),
            prices: self.tool_prices.clone(),
            gateway: self.gateway.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Invalid TOOL_PRICES: {0}")]
    InvalidPrices(String),
}
