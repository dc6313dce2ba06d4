//! Sensitive cryptographic digit strings.
//!
//! A [`CryptoDigits`] value is a string drawn from a fixed alphabet whose
//! length policy is given by its class (see [`DigitClass`]). Secrets and
//! tokens are only ever persisted as their SHA-256 hash, so equality between
//! two values is always computed over the hashed form: a plaintext secret
//! compares equal to its own stored hash.

use std::fmt;
use std::marker::PhantomData;

use rand::Rng;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Digits allowed in any value.
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_=";

/// Length of a hashed value (lowercase hex SHA-256).
pub const HASH_LEN: usize = 64;

/// Length policy for a family of digits.
pub trait DigitClass {
    /// Name used in diagnostics (`Key`, `Secret`, ...)
    const NAME: &'static str;
    /// Fixed size, or `None` for variable-length values
    const SIZE: Option<usize>;
}

/// 44-digit root key (URL-safe base64 of 32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootKeyClass;

/// 16-digit public client key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyClass;

/// 64-digit private client secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretClass;

/// Variable-length sealed session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenClass;

impl DigitClass for RootKeyClass {
    const NAME: &'static str = "RootKey";
    const SIZE: Option<usize> = Some(44);
}

impl DigitClass for KeyClass {
    const NAME: &'static str = "Key";
    const SIZE: Option<usize> = Some(16);
}

impl DigitClass for SecretClass {
    const NAME: &'static str = "Secret";
    const SIZE: Option<usize> = Some(64);
}

impl DigitClass for TokenClass {
    const NAME: &'static str = "Token";
    const SIZE: Option<usize> = None;
}

pub type RootKey = CryptoDigits<RootKeyClass>;
pub type Key = CryptoDigits<KeyClass>;
pub type Secret = CryptoDigits<SecretClass>;
pub type Token = CryptoDigits<TokenClass>;

/// Validation and generation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigitsError {
    #[error("{class} expects {expected} digits, given {actual}")]
    Length {
        class: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{class} cannot be empty")]
    Empty { class: &'static str },

    #[error("{class} must match [a-zA-Z0-9-_=]+")]
    Alphabet { class: &'static str },

    #[error("{class} hash must be 64 lowercase hex digits")]
    Hash { class: &'static str },

    #[error("{class}::generate needs a size if not intrinsic")]
    MissingSize { class: &'static str },
}

/// An immutable string of digits with a class-defined length policy.
///
/// `Display` and `Debug` only ever render a redacted form; use
/// [`CryptoDigits::expose`] to reach the full value for persistence or for
/// handing plaintext credentials to their owner.
pub struct CryptoDigits<C: DigitClass> {
    value: String,
    is_hash: bool,
    _class: PhantomData<C>,
}

impl<C: DigitClass> CryptoDigits<C> {
    /// Wrap a plaintext value, enforcing length and alphabet.
    pub fn new(value: impl Into<String>) -> Result<Self, DigitsError> {
        let value = value.into();
        Self::validate(&value)?;
        Ok(Self {
            value,
            is_hash: false,
            _class: PhantomData,
        })
    }

    /// Wrap an already-hashed value (as read back from storage).
    pub fn from_hash(value: impl Into<String>) -> Result<Self, DigitsError> {
        let value = value.into();
        let well_formed = value.len() == HASH_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(DigitsError::Hash { class: C::NAME });
        }
        Ok(Self {
            value,
            is_hash: true,
            _class: PhantomData,
        })
    }

    /// Check `value` against this class's length and the digit alphabet.
    pub fn validate(value: &str) -> Result<(), DigitsError> {
        match C::SIZE {
            Some(expected) if value.len() != expected => {
                return Err(DigitsError::Length {
                    class: C::NAME,
                    expected,
                    actual: value.len(),
                });
            }
            None if value.is_empty() => return Err(DigitsError::Empty { class: C::NAME }),
            _ => {}
        }
        if !value.bytes().all(|b| ALPHABET.contains(&b)) {
            return Err(DigitsError::Alphabet { class: C::NAME });
        }
        Ok(())
    }

    /// Generate a new value of the class's intrinsic size.
    pub fn generate() -> Result<Self, DigitsError> {
        let size = C::SIZE.ok_or(DigitsError::MissingSize { class: C::NAME })?;
        Self::generate_sized(size)
    }

    /// Generate a new value of `size` digits from the OS random source.
    ///
    /// Fixed-size classes still reject a `size` that disagrees with theirs.
    pub fn generate_sized(size: usize) -> Result<Self, DigitsError> {
        let mut rng = OsRng;
        let value: String = (0..size)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self::new(value)
    }

    /// SHA-256 of this value, marked as a hash. Hashing a hash is a no-op.
    pub fn hashed(&self) -> Self {
        if self.is_hash {
            return self.clone();
        }
        Self {
            value: hex::encode(Sha256::digest(self.value.as_bytes())),
            is_hash: true,
            _class: PhantomData,
        }
    }

    /// Is this the hash of some other value?
    pub fn is_hash(&self) -> bool {
        self.is_hash
    }

    /// Compare hashed forms in constant time.
    ///
    /// Tolerates either side already being a hash.
    pub fn equals(&self, other: &Self) -> bool {
        let lhs = self.hashed();
        let rhs = other.hashed();
        lhs.value.as_bytes().ct_eq(rhs.value.as_bytes()).into()
    }

    /// Full underlying digits.
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.value.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// First/last few digits only, safe for logs and error messages.
    pub fn redacted(&self) -> String {
        redact(&self.value)
    }
}

/// Render `value` as `a...z` (short values) or `abc...xyz`.
pub(crate) fn redact(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n < 9 => format!("{}...{}", chars[0], chars[n - 1]),
        n => format!(
            "{}...{}",
            chars[..3].iter().collect::<String>(),
            chars[n - 3..].iter().collect::<String>()
        ),
    }
}

impl<C: DigitClass> Clone for CryptoDigits<C> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            is_hash: self.is_hash,
            _class: PhantomData,
        }
    }
}

impl<C: DigitClass> PartialEq for CryptoDigits<C> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl<C: DigitClass> Eq for CryptoDigits<C> {}

impl<C: DigitClass> fmt::Display for CryptoDigits<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<C: DigitClass> fmt::Debug for CryptoDigits<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hash {
            write!(f, "<{}[hashed]('{}')>", C::NAME, self.redacted())
        } else {
            write!(f, "<{}('{}')>", C::NAME, self.redacted())
        }
    }
}
