//! Session token validation
//!
//! Users sign in with the external identity provider, which issues RS256
//! session tokens. We only verify them; the `sub` claim is the user's
//! external identity (`clerk_id`).

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims of an identity provider session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (external user id)
    pub sub: String,
    /// Email, when the provider's token template includes it
    #[serde(default)]
    pub email: Option<String>,
    /// Issuer
    #[serde(default)]
    pub iss: Option<String>,
    /// Issued at
    #[serde(default)]
    pub iat: Option<i64>,
    /// Expiration
    pub exp: i64,
}

/// Verifier for identity provider session tokens
#[derive(Clone)]
pub struct JwtManager {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtManager {
    /// Create a verifier from the provider's PEM public key
    pub fn from_rsa_pem(public_key_pem: &str, issuer: Option<&str>) -> Result<Self, JwtError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::InvalidKey(e.to_string()))?;

        // Explicit algorithm prevents algorithm confusion attacks
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 60;
        validation.validate_aud = false;
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    /// Validate a session token and return its claims
    pub fn validate(&self, token: &str) -> Result<SessionClaims, JwtError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e.to_string()),
            })?;

        if data.claims.sub.is_empty() {
            return Err(JwtError::Invalid("empty subject".to_string()));
        }

        Ok(data.claims)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Invalid verification key: {0}")]
    InvalidKey(String),
    #[error("Token expired")]
    Expired,
    #[error("Invalid token: {0}")]
    Invalid(String),
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use time::Duration;

    fn manager() -> JwtManager {
        JwtManager::from_rsa_pem(TEST_PUBLIC_KEY, Some(TEST_ISSUER)).unwrap()
    }

    #[test]
    fn test_valid_token() {
        let claims = manager()
            .validate(&session_token("user_1", Duration::hours(1)))
            .unwrap();
        assert_eq!(claims.sub, "user_1");
        assert_eq!(claims.email.as_deref(), Some("user_1@example.com"));
    }

    #[test]
    fn test_expired_token() {
        let token = session_token("user_1", Duration::hours(-2));
        assert!(matches!(manager().validate(&token), Err(JwtError::Expired)));
    }

    #[test]
    fn test_wrong_issuer() {
        let manager = JwtManager::from_rsa_pem(TEST_PUBLIC_KEY, Some("https://other")).unwrap();
        let token = session_token("user_1", Duration::hours(1));
        assert!(matches!(manager.validate(&token), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn test_garbage_token() {
        assert!(matches!(manager().validate("abc.def.ghi"), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn test_hs256_token_rejected() {
        use jsonwebtoken::{encode, EncodingKey, Header};
        let claims = SessionClaims {
            sub: "user_1".to_string(),
            email: None,
            iss: Some(TEST_ISSUER.to_string()),
            iat: None,
            exp: i64::MAX / 2,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_PUBLIC_KEY.as_bytes()),
        )
        .unwrap();
        assert!(manager().validate(&token).is_err());
    }

    #[test]
    fn test_invalid_key() {
        assert!(matches!(
            JwtManager::from_rsa_pem("not a key", None),
            Err(JwtError::InvalidKey(_))
        ));
    }
}
