//! Cross-cutting pieces used by the lambdas: configuration, client state,
//! bearer auth, CORS and outgoing email.

pub mod auth;
pub mod config;
pub mod cors;
pub mod email;
pub mod state;

pub use auth::Principal;
pub use config::{Config, ConfigError};
pub use state::AppState;
