//! Session claims and their sealed token form.
//!
//! A [`Claim`] names a client (`sub`) and an optional expiration (`exp`).
//! The canonical byte form is compact JSON with sorted keys, where
//! `exp = -1` means "never expires":
//!
//! ```text
//! {"exp":1767225600,"sub":42}
//! {"exp":-1,"sub":42}
//! ```
//!
//! Decoding never checks expiration; callers do that at verification time
//! with [`Claim::check_expiration`].

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::cipher::Cipher;
use super::digits::Token;
use crate::auth::error::{AuthError, AuthErrorCode};

/// Wire value of `exp` for a claim without expiration.
pub const NO_EXPIRATION: i64 = -1;

/// Lifetime requested for a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTtl {
    /// Expire `now + duration` (negative durations yield expired claims)
    Expires(Duration),
    /// Never expire; discouraged and logged
    Never,
}

impl SessionTtl {
    /// Lifetime of `secs` seconds, saturating at the representable range.
    pub fn seconds(secs: i64) -> Self {
        let saturated = if secs < 0 { Duration::MIN } else { Duration::MAX };
        SessionTtl::Expires(Duration::try_seconds(secs).unwrap_or(saturated))
    }
}

#[derive(Debug, Deserialize)]
struct ClaimWire {
    sub: i64,
    exp: i64,
}

/// Subject and expiration carried inside a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    subject: i64,
    expiration: Option<DateTime<Utc>>,
}

impl Claim {
    /// Build a claim. Expiration is held at whole-second precision and
    /// saturates at the Unix epoch, so no real expiration collides with
    /// [`NO_EXPIRATION`].
    pub fn new(subject: i64, expiration: Option<DateTime<Utc>>) -> Self {
        let expiration = expiration.map(|exp| {
            DateTime::from_timestamp(exp.timestamp().max(0), 0)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        });
        Self {
            subject,
            expiration,
        }
    }

    /// Issue a claim for `subject` expiring after `ttl` from now.
    pub fn issue(subject: i64, ttl: SessionTtl) -> Self {
        Self::issue_at(subject, ttl, Utc::now())
    }

    /// Issue a claim relative to an explicit `now`.
    pub fn issue_at(subject: i64, ttl: SessionTtl, now: DateTime<Utc>) -> Self {
        match ttl {
            SessionTtl::Expires(ttl) => {
                let exp = now.checked_add_signed(ttl).unwrap_or(if ttl < Duration::zero() {
                    DateTime::<Utc>::MIN_UTC
                } else {
                    DateTime::<Utc>::MAX_UTC
                });
                Self::new(subject, Some(exp))
            }
            SessionTtl::Never => {
                tracing::warn!(subject, "Creating session token with no expiration time");
                Self::new(subject, None)
            }
        }
    }

    /// Client id this claim was issued for.
    pub fn subject(&self) -> i64 {
        self.subject
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    /// A claim is expired from its expiration instant onwards.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiration, Some(exp) if exp <= now)
    }

    /// Fail with `TokenExpired` if the claim is expired at `now`.
    pub fn check_expiration(&self, now: DateTime<Utc>) -> Result<(), AuthError> {
        if self.is_expired_at(now) {
            return Err(AuthError::from_code(AuthErrorCode::TokenExpired));
        }
        Ok(())
    }

    /// Canonical JSON bytes.
    pub fn encode(&self) -> Vec<u8> {
        let exp = self
            .expiration
            .map_or(NO_EXPIRATION, |exp| exp.timestamp());
        // keys in sorted order whether or not serde_json preserves insertion order
        serde_json::json!({ "exp": exp, "sub": self.subject })
            .to_string()
            .into_bytes()
    }

    /// Inverse of [`Claim::encode`]. Does not check expiration.
    pub fn decode(data: &[u8]) -> Result<Self, AuthError> {
        let wire: ClaimWire = serde_json::from_slice(data)
            .map_err(|e| {
                AuthError::new(AuthErrorCode::TokenInvalid, format!("Malformed claim: {}", e))
            })?;

        let expiration = match wire.exp {
            NO_EXPIRATION => None,
            secs if secs >= 0 => Some(DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                AuthError::new(AuthErrorCode::TokenInvalid, "Claim expiration out of range")
            })?),
            _ => {
                return Err(AuthError::new(
                    AuthErrorCode::TokenInvalid,
                    "Claim expiration out of range",
                ));
            }
        };

        Ok(Self {
            subject: wire.sub,
            expiration,
        })
    }

    /// Seal the encoded claim into a token.
    pub fn encrypt(&self, cipher: &Cipher) -> Result<Token, AuthError> {
        let sealed = cipher.seal(&self.encode())?;
        Ok(Token::new(URL_SAFE.encode(sealed))?)
    }

    /// Open `token` and decode its claim.
    ///
    /// Every failure is `TokenInvalid`, naming the token by its redacted form.
    pub fn decrypt(token: &Token, cipher: &Cipher) -> Result<Self, AuthError> {
        let invalid = || AuthError::token_invalid(&token.redacted());

        let sealed = URL_SAFE.decode(token.expose()).map_err(|_| invalid())?;
        let data = cipher.open(&sealed).map_err(|e| AuthError {
            message: invalid().message,
            ..e
        })?;
        Self::decode(&data).map_err(|_| invalid())
    }
}

impl std::fmt::Display for Claim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.expiration {
            Some(exp) => write!(f, "Claim(sub={}, exp={})", self.subject, exp.to_rfc3339()),
            None => write!(f, "Claim(sub={}, exp=never)", self.subject),
        }
    }
}
