//! Signed token minting and validation.
//!
//! Confirmation tokens and session tokens share one HS256 key. Each carries a
//! `typ` claim so one kind is never accepted in place of the other.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing confirmation vs session tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Mailed at registration, proves control of the email address
    Confirm,
    /// Carried in the session cookie
    Session,
}

/// Claims of an account confirmation token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmClaims {
    /// ID of the account being confirmed
    pub confirm: i64,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// Claims of a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: i64,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Whether the session outlives the browser session
    pub remember: bool,
    pub iat: u64,
    pub exp: u64,
}

/// Confirmation link lifetime: 30 minutes
pub const CONFIRM_TOKEN_DURATION_SECS: u64 = 30 * 60;

/// Session lifetime without "remember me": 1 day
pub const SESSION_DURATION_SECS: u64 = 24 * 60 * 60;

/// Session lifetime with "remember me": 2 weeks
pub const REMEMBER_DURATION_SECS: u64 = 14 * 24 * 60 * 60;

/// Result of issuing a session token.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    /// Cookie Max-Age, set only for remembered sessions
    pub max_age: Option<u64>,
}

/// Signing keys for all tokens.
#[derive(Clone)]
pub struct TokenConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenConfig {
    /// Create a new token configuration with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Mint a confirmation token for `user_id` valid for `ttl_secs`.
    pub fn mint_confirmation(&self, user_id: i64, ttl_secs: u64) -> Result<String, TokenError> {
        let now = unix_now()?;
        let claims = ConfirmClaims {
            confirm: user_id,
            token_type: TokenType::Confirm,
            iat: now,
            exp: now.saturating_add(ttl_secs),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    /// Decode a confirmation token and return the embedded user ID.
    pub fn decode_confirmation(&self, token: &str) -> Result<i64, TokenError> {
        self.decode_confirmation_at(token, unix_now()?)
    }

    /// Same as [`decode_confirmation`](Self::decode_confirmation) against an explicit clock.
    pub fn decode_confirmation_at(&self, token: &str, now: u64) -> Result<i64, TokenError> {
        let claims: ConfirmClaims = self.decode(token)?;
        if claims.token_type != TokenType::Confirm {
            return Err(TokenError::Invalid);
        }
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims.confirm)
    }

    /// Issue a session token for a user who just logged in.
    pub fn issue_session(&self, user_id: i64, remember: bool) -> Result<SessionToken, TokenError> {
        let now = unix_now()?;
        let duration = if remember {
            REMEMBER_DURATION_SECS
        } else {
            SESSION_DURATION_SECS
        };

        let claims = SessionClaims {
            sub: user_id,
            token_type: TokenType::Session,
            remember,
            iat: now,
            exp: now + duration,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)?;

        Ok(SessionToken {
            token,
            max_age: remember.then_some(duration),
        })
    }

    /// Validate a session token.
    pub fn validate_session(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let claims: SessionClaims = self.decode(token)?;
        if claims.token_type != TokenType::Session {
            return Err(TokenError::Invalid);
        }
        if unix_now()? >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Verify the signature and deserialize the claims. Expiry is checked by
    /// the callers so a zero lifetime is already expired and tests can move the clock.
    fn decode<T: DeserializeOwned + Clone>(&self, token: &str) -> Result<T, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        jsonwebtoken::decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected token");
                TokenError::Invalid
            })
    }
}

fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::TimeError)
}

/// Errors that can occur during token operations.
#[derive(Debug)]
pub enum TokenError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Bad signature, malformed token, or wrong token type
    Invalid,
    /// Signature is valid but the token is past its expiry
    Expired,
    /// System time error
    TimeError,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            TokenError::Invalid => write!(f, "Invalid token"),
            TokenError::Expired => write!(f, "Token has expired"),
            TokenError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for TokenError {}
