//! Application state

use std::sync::Arc;
use std::time::Duration;

use nerbixa_billing::{BillingError, BillingService};
use reqwest::Client;
use sqlx::PgPool;

use crate::{
    auth::{AuthState, IdentityResolver, JwtError, JwtIdentityResolver, JwtManager},
    config::Config,
    providers::{GenerationProvider, HttpGenerationProvider, ProviderError},
};

/// Failure while wiring the application state at startup
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Billing setup failed: {0}")]
    Billing(#[from] BillingError),
    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("Auth setup failed: {0}")]
    Jwt(#[from] JwtError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Database pool, used by the readiness probes
    pub pool: Option<PgPool>,
    pub billing: Arc<BillingService>,
    pub provider: Arc<dyn GenerationProvider>,
    pub identity: Arc<dyn IdentityResolver>,
    /// Whether the payment routes are mounted
    pub payments_enabled: bool,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Result<Self, StateError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.billing_http_timeout_secs))
            .build()?;

        let billing = BillingService::from_settings(
            config.billing_settings(),
            pool.clone(),
            http_client,
        )?;
        if config.shop_public_key.is_none() {
            tracing::warn!("SHOP_PUBLIC_KEY not configured - card webhooks will be rejected");
        }
        if !config.email.is_enabled() {
            tracing::warn!("Receipt emails not configured (missing RESEND_API_KEY)");
        }
        if !config.enable_billing {
            tracing::info!("Payment routes disabled via config (ENABLE_BILLING=false)");
        }

        let provider = HttpGenerationProvider::from_keys(
            &config.openai_api_key,
            &config.replicate_api_token,
            Duration::from_secs(config.provider_timeout_secs),
        )?;
        tracing::info!(
            timeout_secs = config.provider_timeout_secs,
            openai = !config.openai_api_key.is_empty(),
            replicate = !config.replicate_api_token.is_empty(),
            "Generation providers initialized"
        );

        let jwt = JwtManager::from_rsa_pem(
            &config.auth_jwt_public_key,
            config.auth_jwt_issuer.as_deref(),
        )?;

        Ok(Self {
            pool: Some(pool),
            billing: Arc::new(billing),
            provider: Arc::new(provider),
            identity: Arc::new(JwtIdentityResolver::new(jwt)),
            payments_enabled: config.enable_billing,
        })
    }

    /// Assemble state from explicit collaborators, without a database pool
    pub fn from_parts(
        billing: BillingService,
        provider: Arc<dyn GenerationProvider>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            pool: None,
            billing: Arc::new(billing),
            provider,
            identity,
            payments_enabled: true,
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState::new(self.identity.clone())
    }
}
