//! Core library for ShipHub account management.
//!
//! Holds the credentials of every account the client has signed in with,
//! tracks whether each live session is still accepted by the server, and
//! posts a notification when one stops being accepted.
//!
//! ```
//! use shiphub_core::auth::{AuthAccount, AuthState, CredentialStore};
//! use reqwest::StatusCode;
//!
//! let store = CredentialStore::in_memory();
//! let auth = store.create(AuthAccount::new("alice"), "ship-token", "gh-token").unwrap();
//! assert_eq!(store.all_logins().unwrap(), vec!["alice"]);
//!
//! assert!(auth.check_status(StatusCode::OK));
//! assert!(!auth.check_status(StatusCode::UNAUTHORIZED));
//! assert_eq!(auth.auth_state(), AuthState::Invalid);
//! ```

pub mod api;
pub mod auth;
pub mod config;

pub use api::ApiError;
pub use auth::{Auth, AuthAccount, AuthError, AuthState, AuthStateChanged, CredentialStore};
pub use config::{Config, ConfigStore};
