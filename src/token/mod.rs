//! Compact signed tokens: one HMAC key, three claim shapes.
//!
//! Access, refresh, and intermediate tokens are all HS256 JWTs signed with
//! the same symmetric key. They are distinguished by claims alone: refresh
//! and intermediate tokens carry a `type` claim, access tokens carry `roles`
//! and no `type`. A token decoded as one kind can never pass verification as
//! another, so a valid access token cannot be replayed as a two-factor
//! bridge token.

use anyhow::anyhow;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AuthError;

/// Prefix applied to every role name in the flattened `roles` claim.
pub const ROLE_PREFIX: &str = "ROLE_";

const TYPE_REFRESH: &str = "refresh";
const TYPE_INTERMEDIATE: &str = "intermediate";

/// Claims of a short-lived bearer token authorizing API calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub user_id: Uuid,
    /// Comma-joined role names, each prefixed `ROLE_`.
    pub roles: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    /// True when the flattened `roles` claim contains `role` (prefixed or not).
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        let wanted = role.strip_prefix(ROLE_PREFIX).unwrap_or(role);
        split_roles(&self.roles)
            .iter()
            .any(|held| held.strip_prefix(ROLE_PREFIX).unwrap_or(held) == wanted)
    }
}

/// Claims of a refresh token. JWT-shaped, but authority derives from the
/// server-side session row, not the signature alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of the short-lived token bridging primary auth and two-factor
/// verification. Never persisted; validity is cryptographic and time-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntermediateClaims {
    pub sub: String,
    pub user_id: Uuid,
    pub requires_two_factor: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// A token decoded once and classified into exactly one kind.
#[derive(Debug, Clone)]
pub enum TokenClaims {
    Access(AccessClaims),
    Refresh(RefreshClaims),
    Intermediate(IntermediateClaims),
}

impl TokenClaims {
    #[must_use]
    pub fn jti(&self) -> &str {
        match self {
            Self::Access(claims) => &claims.jti,
            Self::Refresh(claims) => &claims.jti,
            Self::Intermediate(claims) => &claims.jti,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Uuid {
        match self {
            Self::Access(claims) => claims.user_id,
            Self::Refresh(claims) => claims.user_id,
            Self::Intermediate(claims) => claims.user_id,
        }
    }

    #[must_use]
    pub fn exp(&self) -> i64 {
        match self {
            Self::Access(claims) => claims.exp,
            Self::Refresh(claims) => claims.exp,
            Self::Intermediate(claims) => claims.exp,
        }
    }
}

/// Wire shape shared by all kinds; classified after a single decode.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    user_id: Uuid,
    jti: String,
    iat: i64,
    exp: i64,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    roles: Option<String>,
    #[serde(default)]
    requires_two_factor: Option<bool>,
}

/// Issues and verifies all three token kinds with one symmetric key.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Freshness of intermediate tokens matters at the scale of seconds.
        validation.leeway = 0;
        validation.validate_aud = false;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue an access token. Returns the encoded token and its `jti`.
    ///
    /// # Errors
    /// Returns an error if claim serialization or signing fails.
    pub fn issue_access(
        &self,
        sub: &str,
        user_id: Uuid,
        roles: &[String],
        ttl: Duration,
    ) -> Result<(String, String), AuthError> {
        let (iat, exp) = stamps(ttl);
        let jti = Uuid::new_v4().to_string();
        let claims = AccessClaims {
            sub: sub.to_owned(),
            user_id,
            roles: flatten_roles(roles),
            jti: jti.clone(),
            iat,
            exp,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(anyhow!("failed to sign access token: {err}")))?;
        Ok((token, jti))
    }

    /// Issue a refresh token. Returns the encoded token and its `jti`.
    ///
    /// # Errors
    /// Returns an error if claim serialization or signing fails.
    pub fn issue_refresh(
        &self,
        sub: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(String, String), AuthError> {
        let (iat, exp) = stamps(ttl);
        let jti = Uuid::new_v4().to_string();
        let claims = RefreshClaims {
            sub: sub.to_owned(),
            user_id,
            kind: TYPE_REFRESH.to_owned(),
            jti: jti.clone(),
            iat,
            exp,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(anyhow!("failed to sign refresh token: {err}")))?;
        Ok((token, jti))
    }

    /// Issue an intermediate (two-factor pending) token.
    ///
    /// # Errors
    /// Returns an error if claim serialization or signing fails.
    pub fn issue_intermediate(
        &self,
        sub: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(String, String), AuthError> {
        let (iat, exp) = stamps(ttl);
        let jti = Uuid::new_v4().to_string();
        let claims = IntermediateClaims {
            sub: sub.to_owned(),
            user_id,
            requires_two_factor: true,
            kind: TYPE_INTERMEDIATE.to_owned(),
            jti: jti.clone(),
            iat,
            exp,
        };
        let token = encode(&Header::default(), &claims, &self.encoding).map_err(|err| {
            AuthError::Internal(anyhow!("failed to sign intermediate token: {err}"))
        })?;
        Ok((token, jti))
    }

    /// Verify the signature and lifetime, then classify the claims.
    ///
    /// # Errors
    /// `Expired` for lapsed tokens, `InvalidToken` for everything else.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        classify(self.decode_raw(token)?)
    }

    /// Verify a token as an access token. Tokens carrying a `type` claim
    /// (refresh, intermediate) are rejected even with a valid signature.
    ///
    /// # Errors
    /// `Expired` or `InvalidToken`.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        match self.verify(token)? {
            TokenClaims::Access(claims) => Ok(claims),
            TokenClaims::Refresh(_) | TokenClaims::Intermediate(_) => Err(AuthError::InvalidToken),
        }
    }

    /// Verify a token as a refresh token.
    ///
    /// # Errors
    /// `Expired` or `InvalidToken`.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        match self.verify(token)? {
            TokenClaims::Refresh(claims) => Ok(claims),
            TokenClaims::Access(_) | TokenClaims::Intermediate(_) => Err(AuthError::InvalidToken),
        }
    }

    /// Verify a token as an intermediate token. Tokens missing either the
    /// `type: "intermediate"` or the `requires_two_factor` flag are rejected
    /// regardless of signature validity.
    ///
    /// # Errors
    /// `Expired` or `InvalidToken`.
    pub fn verify_intermediate(&self, token: &str) -> Result<IntermediateClaims, AuthError> {
        match self.verify(token)? {
            TokenClaims::Intermediate(claims) if claims.requires_two_factor => Ok(claims),
            _ => Err(AuthError::InvalidToken),
        }
    }

    fn decode_raw(&self, token: &str) -> Result<RawClaims, AuthError> {
        decode::<RawClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken,
            })
    }
}

fn classify(raw: RawClaims) -> Result<TokenClaims, AuthError> {
    match raw.kind.as_deref() {
        None => {
            let roles = raw.roles.ok_or(AuthError::InvalidToken)?;
            Ok(TokenClaims::Access(AccessClaims {
                sub: raw.sub,
                user_id: raw.user_id,
                roles,
                jti: raw.jti,
                iat: raw.iat,
                exp: raw.exp,
            }))
        }
        Some(TYPE_REFRESH) => Ok(TokenClaims::Refresh(RefreshClaims {
            sub: raw.sub,
            user_id: raw.user_id,
            kind: TYPE_REFRESH.to_owned(),
            jti: raw.jti,
            iat: raw.iat,
            exp: raw.exp,
        })),
        Some(TYPE_INTERMEDIATE) => {
            if raw.requires_two_factor != Some(true) {
                return Err(AuthError::InvalidToken);
            }
            Ok(TokenClaims::Intermediate(IntermediateClaims {
                sub: raw.sub,
                user_id: raw.user_id,
                requires_two_factor: true,
                kind: TYPE_INTERMEDIATE.to_owned(),
                jti: raw.jti,
                iat: raw.iat,
                exp: raw.exp,
            }))
        }
        Some(_) => Err(AuthError::InvalidToken),
    }
}

fn stamps(ttl: Duration) -> (i64, i64) {
    let now = Utc::now();
    (now.timestamp(), (now + ttl).timestamp())
}

/// Join role names into the flattened claim, prefixing `ROLE_` where missing.
#[must_use]
pub fn flatten_roles(roles: &[String]) -> String {
    roles
        .iter()
        .map(|role| {
            if role.starts_with(ROLE_PREFIX) {
                role.clone()
            } else {
                format!("{ROLE_PREFIX}{role}")
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Split a flattened `roles` claim back into individual names.
#[must_use]
pub fn split_roles(flat: &str) -> Vec<String> {
    flat.split(',')
        .map(str::trim)
        .filter(|role| !role.is_empty())
        .map(str::to_string)
        .collect()
}
