//! Client credentials and sessions.
//!
//! - [`models`]: client/session records and issuance results
//! - [`store`]: the `CredentialStore` contract
//! - [`memory`] / [`postgres`]: store implementations
//! - [`service`]: issue, rotate, revoke and session refresh

pub mod memory;
pub mod models;
pub mod postgres;
pub mod service;
pub mod store;

pub use memory::MemoryCredentialStore;
pub use models::{Client, ClientFields, IssuedCredentials, IssuedSession, Session, SessionFields};
pub use postgres::PgCredentialStore;
pub use service::CredentialService;
pub use store::{CredentialStore, StoreError};
