//! Cryptographic digits, the root-key cipher, and session claims.
//!
//! ## Components
//! - `digits`: `Key`, `Secret`, `Token`, `RootKey` values with hash-aware equality
//! - `cipher`: AES-256-GCM sealing keyed by the deployment root key
//! - `claim`: subject/expiration payload sealed into a `Token`

pub mod cipher;
pub mod claim;
pub mod digits;

pub use cipher::Cipher;
pub use claim::{Claim, NO_EXPIRATION, SessionTtl};
pub use digits::{CryptoDigits, DigitClass, DigitsError, Key, RootKey, Secret, Token};
