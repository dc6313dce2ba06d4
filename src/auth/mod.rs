//! Authentication pipeline.
//!
//! ## Components
//! - `error`: authentication error codes (4001-4012)
//! - `models`: privilege levels
//! - `gate`: authenticate / authenticated / authorization stages
//! - `middleware`: Axum adapters for Basic and Bearer headers

pub mod error;
pub mod gate;
pub mod middleware;
pub mod models;

// Re-export for convenience
pub use error::{AuthError, AuthErrorCode, AuthErrorResponse};
pub use gate::{AuthGate, BasicCredentials, Permitted, Resolved, Stage};
pub use middleware::{
    BearerAuthState, TokenResponse, bearer_auth_middleware, extract_basic_credentials,
    extract_bearer_token, issue_token_handler,
};
pub use models::{Level, RequiredLevel};
