use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::account::AuthAccount;
use super::credentials::{KeyringStore, MemoryStore, SecretStore, DEFAULT_SERVICE_NAME};
use super::error::{AuthError, Result};
use super::notify::{AuthNotifier, Subscription};
use super::session::Auth;
use super::state::AuthStateChanged;
use crate::config::{Config, ConfigStore};

/// What is written to secure storage for one login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    pub account: AuthAccount,
    pub ship_token: String,
    pub gh_token: String,
    pub saved_at: DateTime<Utc>,
}

/// State shared by the store and every session it hands out.
pub(crate) struct StoreInner {
    pub(crate) secrets: Arc<dyn SecretStore>,
    pub(crate) config: ConfigStore,
    pub(crate) notifier: AuthNotifier,
}

impl StoreInner {
    pub(crate) fn remember_last_used(&self, login: &str) {
        if let Err(e) = self
            .config
            .update(|c| c.last_used_login = Some(login.to_string()))
        {
            warn!(login, error = %e, "Failed to save last used login");
        }
    }

    pub(crate) fn forget_last_used(&self, login: &str) {
        let result = self.config.update(|c| {
            if c.last_used_login.as_deref() == Some(login) {
                c.last_used_login = None;
            }
        });
        if let Err(e) = result {
            warn!(login, error = %e, "Failed to clear last used login");
        }
    }
}

/// Every account this client has signed in with, plus the single
/// notification channel their sessions report through.
///
/// Cloning is cheap and yields a handle on the same store.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

impl CredentialStore {
    /// Open the OS keychain and the config file at their default locations.
    pub fn open() -> Result<Self> {
        let config = ConfigStore::open().map_err(|e| AuthError::Config(format!("{e:#}")))?;
        Ok(Self::open_with_config(config))
    }

    /// Open the OS keychain, reading preferences from `config`.
    pub fn open_with_config(config: ConfigStore) -> Self {
        let service = config
            .get()
            .keychain_service
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
        debug!(%service, "Opening keychain credential store");
        Self::new(Arc::new(KeyringStore::new(service)), config)
    }

    pub fn new(secrets: Arc<dyn SecretStore>, config: ConfigStore) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                secrets,
                config,
                notifier: AuthNotifier::new(),
            }),
        }
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            ConfigStore::in_memory(Config::default()),
        )
    }

    /// Logins with a persisted credential set, sorted.
    pub fn all_logins(&self) -> Result<Vec<String>> {
        self.inner.secrets.keys()
    }

    pub fn last_used_login(&self) -> Option<String> {
        self.inner.config.get().last_used_login
    }

    /// Check if credentials exist for a login
    pub fn has_credentials(&self, login: &str) -> bool {
        matches!(self.inner.secrets.get(login), Ok(Some(_)))
    }

    /// Rebuild a session for `login` from secure storage.
    pub fn load(&self, login: &str) -> Result<Auth> {
        let raw = self
            .inner
            .secrets
            .get(login)?
            .ok_or_else(|| AuthError::NotFound(login.to_string()))?;

        let stored: StoredCredentials =
            serde_json::from_str(&raw).map_err(|source| AuthError::Corrupt {
                login: login.to_string(),
                source,
            })?;

        if stored.account.login != login {
            warn!(
                key = login,
                stored = %stored.account.login,
                "Stored account login does not match its keychain key, keeping the key"
            );
        }

        debug!(login, saved_at = %stored.saved_at, "Loaded credentials");
        self.inner.remember_last_used(login);

        Ok(Auth::new(
            login.to_string(),
            stored.account,
            stored.ship_token,
            stored.gh_token,
            Arc::clone(&self.inner),
        ))
    }

    /// Persist a new credential set, replacing any stored for the same login.
    pub fn create(
        &self,
        account: AuthAccount,
        ship_token: impl Into<String>,
        gh_token: impl Into<String>,
    ) -> Result<Auth> {
        account.validate()?;

        let stored = StoredCredentials {
            account,
            ship_token: ship_token.into(),
            gh_token: gh_token.into(),
            saved_at: Utc::now(),
        };
        let raw = serde_json::to_string(&stored).map_err(|source| AuthError::Corrupt {
            login: stored.account.login.clone(),
            source,
        })?;

        let login = stored.account.login.clone();
        self.inner.secrets.set(&login, &raw)?;
        info!(login = %login, gh_host = %stored.account.gh_host, "Stored credentials");
        self.inner.remember_last_used(&login);

        Ok(Auth::new(
            login,
            stored.account,
            stored.ship_token,
            stored.gh_token,
            Arc::clone(&self.inner),
        ))
    }

    /// Remove the stored credentials for `login` without loading them.
    ///
    /// The last used login only changes if it was `login`. Live sessions
    /// for `login` keep their current state.
    pub fn logout(&self, login: &str) -> Result<()> {
        if !self.inner.secrets.delete(login)? {
            return Err(AuthError::NotFound(login.to_string()));
        }
        self.inner.forget_last_used(login);
        info!(login, "Logged out");
        Ok(())
    }

    /// Register a synchronous observer of session state changes.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&AuthStateChanged) + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(observer)
    }

    /// Async receiver of session state changes.
    pub fn watch(&self) -> broadcast::Receiver<AuthStateChanged> {
        self.inner.notifier.watch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::state::AuthState;
    use std::sync::Mutex;

    fn alice() -> AuthAccount {
        AuthAccount::new("alice").with_name("Alice")
    }

    #[test]
    fn test_create_then_load_returns_same_tokens() {
        let store = CredentialStore::in_memory();
        store.create(alice(), "s1", "g1").unwrap();

        let auth = store.load("alice").unwrap();
        assert_eq!(auth.token(), "s1");
        assert_eq!(auth.gh_token(), "g1");
        assert_eq!(auth.account().name.as_deref(), Some("Alice"));
        assert_eq!(auth.auth_state(), AuthState::Valid);
    }

    #[test]
    fn test_load_unknown_login_is_not_found() {
        let store = CredentialStore::in_memory();
        assert!(matches!(store.load("nobody"), Err(AuthError::NotFound(l)) if l == "nobody"));
        assert!(!store.has_credentials("nobody"));
    }

    #[test]
    fn test_create_overwrites_previous_entry() {
        let store = CredentialStore::in_memory();
        store.create(alice(), "old", "old-gh").unwrap();
        store.create(alice(), "new", "new-gh").unwrap();

        assert_eq!(store.all_logins().unwrap(), vec!["alice"]);
        assert_eq!(store.load("alice").unwrap().token(), "new");
    }

    #[test]
    fn test_create_rejects_empty_login() {
        let store = CredentialStore::in_memory();
        assert!(matches!(
            store.create(AuthAccount::new(""), "s", "g"),
            Err(AuthError::InvalidAccount(_))
        ));
        assert!(store.all_logins().unwrap().is_empty());
        assert!(store.last_used_login().is_none());
    }

    #[test]
    fn test_all_logins_sorted() {
        let store = CredentialStore::in_memory();
        for login in ["carol", "alice", "bob"] {
            store.create(AuthAccount::new(login), "s", "g").unwrap();
        }
        assert_eq!(store.all_logins().unwrap(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_last_used_login_follows_create_and_load() {
        let store = CredentialStore::in_memory();
        assert!(store.last_used_login().is_none());

        store.create(alice(), "s", "g").unwrap();
        store.create(AuthAccount::new("bob"), "s", "g").unwrap();
        assert_eq!(store.last_used_login().as_deref(), Some("bob"));

        store.load("alice").unwrap();
        assert_eq!(store.last_used_login().as_deref(), Some("alice"));

        // A failed load leaves the pointer alone
        let _ = store.load("nobody");
        assert_eq!(store.last_used_login().as_deref(), Some("alice"));
    }

    #[test]
    fn test_last_used_login_persists_across_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let secrets: Arc<dyn SecretStore> = Arc::new(MemoryStore::new());

        let first = CredentialStore::new(
            Arc::clone(&secrets),
            ConfigStore::open_at(path.clone()).unwrap(),
        );
        first.create(alice(), "s1", "g1").unwrap();

        let second = CredentialStore::new(secrets, ConfigStore::open_at(path).unwrap());
        assert_eq!(second.last_used_login().as_deref(), Some("alice"));
        assert_eq!(second.load("alice").unwrap().gh_token(), "g1");
    }

    #[test]
    fn test_corrupt_record_is_reported() {
        let secrets = Arc::new(MemoryStore::new());
        secrets.set("mallory", "not json").unwrap();
        let store = CredentialStore::new(secrets, ConfigStore::in_memory(Config::default()));

        assert!(matches!(store.load("mallory"), Err(AuthError::Corrupt { .. })));
    }

    #[test]
    fn test_extra_fields_survive_storage() {
        let store = CredentialStore::in_memory();
        let mut account = alice();
        account
            .extra
            .insert("avatarUrl".to_string(), serde_json::json!("https://example.com/a.png"));
        store.create(account.clone(), "s", "g").unwrap();

        assert_eq!(store.load("alice").unwrap().account(), &account);
    }

    #[test]
    fn test_create_rejects_extra_shadowing_login() {
        let store = CredentialStore::in_memory();
        let mut account = alice();
        account
            .extra
            .insert("login".to_string(), serde_json::json!("mallory"));

        assert!(matches!(
            store.create(account, "s", "g"),
            Err(AuthError::InvalidAccount(_))
        ));
        assert!(store.all_logins().unwrap().is_empty());
    }

    #[test]
    fn test_every_listed_login_loads() {
        let store = CredentialStore::in_memory();
        let mut account = alice();
        account
            .extra
            .insert("avatarUrl".to_string(), serde_json::json!("https://example.com/a.png"));
        store.create(account, "s", "g").unwrap();
        store.create(AuthAccount::new("bob"), "s", "g").unwrap();

        for login in store.all_logins().unwrap() {
            assert!(store.load(&login).is_ok(), "{login} should load");
        }
    }

    #[test]
    fn test_logout_by_login_keeps_other_last_used() {
        let store = CredentialStore::in_memory();
        store.create(alice(), "s", "g").unwrap();
        store.create(AuthAccount::new("bob"), "s", "g").unwrap();

        store.logout("alice").unwrap();

        assert_eq!(store.last_used_login().as_deref(), Some("bob"));
        assert_eq!(store.all_logins().unwrap(), vec!["bob"]);
        assert!(matches!(store.logout("alice"), Err(AuthError::NotFound(_))));

        store.logout("bob").unwrap();
        assert!(store.last_used_login().is_none());
    }

    #[test]
    fn test_mismatched_record_logs_out_its_own_key() {
        let secrets = Arc::new(MemoryStore::new());
        let store = CredentialStore::new(secrets.clone(), ConfigStore::in_memory(Config::default()));
        store.create(AuthAccount::new("mallory"), "m", "m").unwrap();

        // A record filed under "alice" that names another login
        let raw = secrets.get("mallory").unwrap().unwrap();
        secrets.set("alice", &raw).unwrap();

        let auth = store.load("alice").unwrap();
        assert_eq!(auth.login(), "mallory");
        auth.logout().unwrap();

        assert_eq!(store.all_logins().unwrap(), vec!["mallory"]);
        assert!(matches!(store.load("alice"), Err(AuthError::NotFound(_))));
    }

    #[test]
    fn test_reserved_index_key_is_not_found() {
        let store = CredentialStore::new(
            Arc::new(KeyringStore::new("shiphub-test")),
            ConfigStore::in_memory(Config::default()),
        );
        assert!(matches!(
            store.load("__shiphub_logins__"),
            Err(AuthError::NotFound(_))
        ));
    }

    #[test]
    fn test_alice_scenario() {
        let store = CredentialStore::in_memory();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _sub = store.subscribe(move |change| sink.lock().unwrap().push(change.clone()));

        let auth = store.create(alice(), "s1", "g1").unwrap();
        assert!(store.all_logins().unwrap().contains(&"alice".to_string()));

        assert!(!auth.check_status(reqwest::StatusCode::UNAUTHORIZED));
        assert_eq!(auth.auth_state(), AuthState::Invalid);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].login, "alice");
        assert_eq!(events[0].previous, AuthState::Valid);
        assert_eq!(events[0].state, AuthState::Invalid);
    }
}
