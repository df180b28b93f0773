use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{Principal, RoleId, UserType};

/// Separator of the role claim. Only ever seen on the wire.
const ROLE_DELIMITER: char = '|';

/// Signs and verifies HS512 access and refresh tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry: Duration,
    refresh_token_expiry: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// Claims carried by both halves of an [`AuthToken`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub name: String,
    /// Pipe-delimited role ids.
    pub role: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    #[serde(rename = "use")]
    pub token_use: TokenUse,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Token pair handed to clients at login and refresh.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthToken {
    pub access_token: String,
    pub access_token_expiration: DateTime<Utc>,
    pub refresh_token: String,
    #[serde(skip_serializing)]
    pub refresh_token_expiration: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Principal has no user id")]
    InvalidPrincipal,

    #[error("Failed to sign token: {0}")]
    Encoding(jsonwebtoken::errors::Error),

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Signature checked out but the token is past its expiry. The decoded
    /// identity is kept for audit logging and must not be used to authorize.
    #[error("Token expired")]
    Expired { principal: Box<Principal> },
}

impl TokenError {
    /// Identity extracted from the token, available only for expired tokens.
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            TokenError::Expired { principal } => Some(principal.as_ref()),
            _ => None,
        }
    }
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.secret.is_empty() {
            return Err(anyhow::anyhow!("JWT secret must not be empty"));
        }

        tracing::info!("Token service initialized with HS512 secret");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_expiry: Duration::minutes(config.access_token_expiry_minutes),
            refresh_token_expiry: Duration::days(config.refresh_token_expiry_days),
        })
    }

    /// Issue an independently signed access/refresh pair for `principal`.
    pub fn issue_token(&self, principal: &Principal) -> Result<AuthToken, TokenError> {
        if principal.user_id.is_nil() {
            return Err(TokenError::InvalidPrincipal);
        }

        let now = Utc::now();
        let access_exp = now + self.access_token_expiry;
        let refresh_exp = now + self.refresh_token_expiry;

        Ok(AuthToken {
            access_token: self.sign(principal, TokenUse::Access, now, access_exp)?,
            access_token_expiration: access_exp,
            refresh_token: self.sign(principal, TokenUse::Refresh, now, refresh_exp)?,
            refresh_token_expiration: refresh_exp,
        })
    }

    /// Verify an access token.
    pub fn verify_token(&self, token: &str) -> Result<Principal, TokenError> {
        self.verify(token, TokenUse::Access)
    }

    /// Verify a refresh token.
    pub fn verify_refresh_token(&self, token: &str) -> Result<Principal, TokenError> {
        self.verify(token, TokenUse::Refresh)
    }

    fn sign(
        &self,
        principal: &Principal,
        token_use: TokenUse,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = TokenClaims {
            user_id: principal.user_id.to_string(),
            name: principal.display_name.clone(),
            role: encode_roles(&principal.roles),
            user_type: principal.user_type,
            token_use,
            jti: Uuid::new_v4().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    fn verify(&self, token: &str, expected: TokenUse) -> Result<Principal, TokenError> {
        // Expiry is checked by hand so that an expired token still yields its identity.
        let mut validation = Validation::new(Algorithm::HS512);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::Malformed(e.to_string()),
            })?
            .claims;

        if claims.token_use != expected {
            return Err(TokenError::Malformed(format!(
                "expected {:?} token",
                expected
            )));
        }

        let principal = claims_to_principal(&claims)?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired {
                principal: Box::new(principal),
            });
        }

        Ok(principal)
    }
}

fn claims_to_principal(claims: &TokenClaims) -> Result<Principal, TokenError> {
    let user_id = Uuid::parse_str(&claims.user_id)
        .map_err(|e| TokenError::Malformed(format!("userID: {}", e)))?;
    if user_id.is_nil() {
        return Err(TokenError::Malformed("userID is empty".to_string()));
    }
    let roles = decode_roles(&claims.role)?;

    Ok(Principal::new(user_id, claims.name.clone(), roles, claims.user_type))
}

pub fn encode_roles(roles: &[RoleId]) -> String {
    roles
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(&ROLE_DELIMITER.to_string())
}

pub fn decode_roles(raw: &str) -> Result<Vec<RoleId>, TokenError> {
    raw.split(ROLE_DELIMITER)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s).map_err(|e| TokenError::Malformed(format!("role: {}", e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> JwtConfig {
        JwtConfig {
            secret: secret.to_string(),
            access_token_expiry_minutes: 60,
            refresh_token_expiry_days: 40,
        }
    }

    fn principal() -> Principal {
        Principal::new(
            Uuid::new_v4(),
            "Jane Agent",
            [Uuid::new_v4(), Uuid::new_v4()],
            UserType::Agent,
        )
    }

    fn expired_token(service: &TokenService, principal: &Principal) -> String {
        let past = Utc::now() - Duration::minutes(5);
        service
            .sign(principal, TokenUse::Access, past - Duration::minutes(60), past)
            .unwrap()
    }

    #[test]
    fn test_issue_and_verify() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config("test-secret-test-secret-test-secret"))?;
        let principal = principal();

        let token = service.issue_token(&principal)?;
        assert!(token.access_token_expiration < token.refresh_token_expiration);
        assert_ne!(token.access_token, token.refresh_token);

        let verified = service.verify_token(&token.access_token)?;
        assert_eq!(verified, principal);

        let refreshed = service.verify_refresh_token(&token.refresh_token)?;
        assert_eq!(refreshed.user_id, principal.user_id);
        Ok(())
    }

    #[test]
    fn test_nil_principal_is_rejected() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config("secret"))?;
        let anonymous = Principal::new(Uuid::nil(), "", [], UserType::User);
        assert!(matches!(
            service.issue_token(&anonymous),
            Err(TokenError::InvalidPrincipal)
        ));
        Ok(())
    }

    #[test]
    fn test_expired_token_keeps_principal() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config("secret"))?;
        let principal = principal();
        let token = expired_token(&service, &principal);

        let err = service.verify_token(&token).unwrap_err();
        assert!(matches!(err, TokenError::Expired { .. }));
        assert_eq!(err.principal().map(|p| p.user_id), Some(principal.user_id));
        Ok(())
    }

    #[test]
    fn test_wrong_secret_has_no_principal() -> Result<(), anyhow::Error> {
        let signer = TokenService::new(&config("secret-one"))?;
        let verifier = TokenService::new(&config("secret-two"))?;
        let token = signer.issue_token(&principal())?;

        let err = verifier.verify_token(&token.access_token).unwrap_err();
        assert!(matches!(err, TokenError::InvalidSignature));
        assert!(err.principal().is_none());
        Ok(())
    }

    #[test]
    fn test_token_use_is_enforced() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config("secret"))?;
        let token = service.issue_token(&principal())?;

        assert!(matches!(
            service.verify_token(&token.refresh_token),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            service.verify_refresh_token(&token.access_token),
            Err(TokenError::Malformed(_))
        ));
        Ok(())
    }

    #[test]
    fn test_garbage_is_malformed() -> Result<(), anyhow::Error> {
        let service = TokenService::new(&config("secret"))?;
        assert!(matches!(
            service.verify_token("not-a-jwt"),
            Err(TokenError::Malformed(_))
        ));
        Ok(())
    }

    #[test]
    fn test_role_claim_encoding() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let encoded = encode_roles(&[a, b]);
        assert_eq!(encoded, format!("{}|{}", a, b));
        assert_eq!(decode_roles(&encoded).unwrap(), vec![a, b]);
        assert!(decode_roles("").unwrap().is_empty());
        assert!(decode_roles("nope").is_err());
    }
}
