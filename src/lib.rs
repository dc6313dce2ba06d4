//! refitt-auth - API credentials and session tokens
//!
//! Clients hold a public 16-digit key and a 64-digit secret (stored only as
//! a SHA-256 hash). Exchanging `key:secret` yields a session token: a claim
//! `{sub, exp}` sealed under the deployment root key. Requests then present
//! the token and pass through the [`auth::AuthGate`] pipeline.
//!
//! # Modules
//!
//! - [`token`] - Digits, root-key cipher, claims
//! - [`credential`] - Client/session records, stores, lifecycle service
//! - [`auth`] - Error codes, levels, pipeline, Axum adapters
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`db`] - PostgreSQL pool

pub mod auth;
pub mod config;
pub mod credential;
pub mod db;
pub mod logging;
pub mod token;

// Convenient re-exports at crate root
pub use auth::{AuthError, AuthErrorCode, AuthGate, Level, RequiredLevel};
pub use credential::{Client, CredentialService, CredentialStore, Session};
pub use token::{Cipher, Claim, Key, RootKey, Secret, SessionTtl, Token};
