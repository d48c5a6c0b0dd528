use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::account::AuthAccount;
use super::error::{AuthError, Result};
use super::state::{AuthState, AuthStateChanged};
use super::store::StoreInner;
use crate::api::ApiError;

/// A signed-in account and its two bearer tokens.
///
/// Starts out `Valid`. The first authentication rejection moves it to
/// `Invalid` for good; a fresh session has to come from
/// [`CredentialStore::create`](super::CredentialStore::create).
///
/// `Auth` is shared freely between threads: network completion handlers
/// may call [`check_response`](Self::check_response) and
/// [`check_error`](Self::check_error) concurrently.
pub struct Auth {
    /// Secure storage key this session was loaded from or saved under.
    key: String,
    account: AuthAccount,
    token: String,
    gh_token: String,
    state: AtomicU8,
    logged_out: AtomicBool,
    store: Arc<StoreInner>,
}

impl Auth {
    pub(crate) fn new(
        key: String,
        account: AuthAccount,
        token: String,
        gh_token: String,
        store: Arc<StoreInner>,
    ) -> Self {
        Self {
            key,
            account,
            token,
            gh_token,
            state: AtomicU8::new(AuthState::Valid as u8),
            logged_out: AtomicBool::new(false),
            store,
        }
    }

    pub fn account(&self) -> &AuthAccount {
        &self.account
    }

    pub fn login(&self) -> &str {
        &self.account.login
    }

    /// Bearer token for the ShipHub server.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Bearer token for GitHub.
    pub fn gh_token(&self) -> &str {
        &self.gh_token
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::Acquire)
    }

    /// Mark the session invalid. Only the call that performs the
    /// transition posts a notification.
    pub fn invalidate(&self) {
        let swapped = self.state.compare_exchange(
            AuthState::Valid as u8,
            AuthState::Invalid as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if swapped.is_err() {
            return;
        }

        warn!(login = %self.account.login, "Session invalidated");
        self.store.notifier.post(&AuthStateChanged {
            login: self.account.login.clone(),
            state: AuthState::Invalid,
            previous: AuthState::Valid,
        });
    }

    /// Invalidate on HTTP 401. Returns true if the session survived.
    pub fn check_response(&self, response: &reqwest::Response) -> bool {
        self.check_status(response.status())
    }

    /// Same as [`check_response`](Self::check_response) for a bare status.
    pub fn check_status(&self, status: StatusCode) -> bool {
        if status == StatusCode::UNAUTHORIZED {
            debug!(login = %self.account.login, status = %status, "Server rejected token");
            self.invalidate();
            return false;
        }
        true
    }

    /// Invalidate on an authentication-required error. Returns true if the
    /// session survived.
    pub fn check_error(&self, error: &ApiError) -> bool {
        if error.requires_auth() {
            debug!(login = %self.account.login, error = %error, "Request needs a new token");
            self.invalidate();
            return false;
        }
        true
    }

    /// Fail fast unless the session can still be used for requests.
    pub fn require_valid(&self) -> Result<()> {
        if self.is_logged_out() {
            return Err(AuthError::LoggedOut(self.account.login.clone()));
        }
        if !self.auth_state().is_valid() {
            return Err(AuthError::Unauthorized(self.account.login.clone()));
        }
        Ok(())
    }

    /// `Authorization` header value for the ShipHub server.
    pub fn bearer_header(&self) -> Result<String> {
        self.require_valid()?;
        Ok(format!("token {}", self.token))
    }

    /// `Authorization` header value for GitHub.
    pub fn gh_bearer_header(&self) -> Result<String> {
        self.require_valid()?;
        Ok(format!("token {}", self.gh_token))
    }

    /// Remove this login's credentials from secure storage.
    ///
    /// Other `Auth` instances for the same login are not told.
    pub fn logout(&self) -> Result<()> {
        if self
            .logged_out
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AuthError::LoggedOut(self.account.login.clone()));
        }

        let removed = match self.store.secrets.delete(&self.key) {
            Ok(removed) => removed,
            Err(e) => {
                self.logged_out.store(false, Ordering::Release);
                return Err(e);
            }
        };
        if !removed {
            debug!(key = %self.key, "No stored credentials to remove");
        }

        self.store.forget_last_used(&self.key);
        info!(key = %self.key, "Logged out");
        self.invalidate();
        Ok(())
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("account", &self.account)
            .field("token", &"<redacted>")
            .field("gh_token", &"<redacted>")
            .field("auth_state", &self.auth_state())
            .field("logged_out", &self.is_logged_out())
            .finish()
    }
}
