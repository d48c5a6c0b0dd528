//! Authentication module for managing signed-in accounts and their tokens.
//!
//! This module provides:
//! - `CredentialStore`: every account with stored credentials, keyed by login
//! - `Auth`: one live session with a ShipHub token and a GitHub token
//! - `AuthNotifier`: the single channel session state changes are posted on
//! - `SecretStore`: secure storage backends (OS keychain via keyring, or memory)
//!
//! A session is valid until the server rejects its token, after which it
//! stays invalid until the user signs in again.

pub mod account;
pub mod credentials;
pub mod error;
pub mod notify;
pub mod session;
pub mod state;
pub mod store;

pub use account::{AuthAccount, DEFAULT_GH_HOST, DEFAULT_SHIP_HOST};
pub use credentials::{
    Keychain, KeyringStore, MemoryStore, OsKeychain, SecretStore, DEFAULT_SERVICE_NAME,
};
pub use error::{AuthError, Result};
pub use notify::{AuthNotifier, Subscription};
pub use session::Auth;
pub use state::{
    AuthState, AuthStateChanged, AUTH_STATE_CHANGED_NOTIFICATION, AUTH_STATE_KEY,
    AUTH_STATE_PREVIOUS_KEY,
};
pub use store::{CredentialStore, StoredCredentials};
