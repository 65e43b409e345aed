//! Authentication module for Nerbixa
//!
//! Identity comes from an external provider. Handlers never look it up
//! themselves: the [`IdentityResolver`] held in [`AuthState`] turns a bearer
//! token into an [`AuthUser`] before the request reaches them.

pub mod jwt;
pub mod middleware;

use async_trait::async_trait;

pub use jwt::{JwtError, JwtManager, SessionClaims};
pub use middleware::{require_auth, AuthError, AuthState, AuthUser};

/// Turns a bearer token into the caller's identity
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<AuthUser, AuthError>;
}

/// Resolver backed by the provider's RS256 session tokens
#[derive(Clone)]
pub struct JwtIdentityResolver {
    jwt: JwtManager,
}

impl JwtIdentityResolver {
    pub fn new(jwt: JwtManager) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.jwt.validate(token).map_err(|e| {
            tracing::debug!(error = %e, "Session token rejected");
            AuthError::InvalidToken
        })?;

        Ok(AuthUser {
            clerk_id: claims.sub,
            email: claims.email,
        })
    }
}
