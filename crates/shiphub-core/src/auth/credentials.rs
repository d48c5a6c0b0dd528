//! Secure storage backends for per-login credential records.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use keyring::Entry;
use tracing::{debug, warn};

use super::error::{AuthError, Result};

/// Keychain service name credentials are filed under
pub const DEFAULT_SERVICE_NAME: &str = "com.realartists.Ship2.auth";

/// Reserved keychain account holding the list of stored logins
const INDEX_ACCOUNT: &str = "__shiphub_logins__";

/// A string-keyed secret store.
///
/// Implementations must make `set` and `delete` atomic with respect to
/// `keys`: a key is listed exactly when `get` would return it.
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, secret: &str) -> Result<()>;
    /// Removes `key`. Returns false if nothing was stored under it.
    fn delete(&self, key: &str) -> Result<bool>;
    /// Every stored key, in sorted order.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Raw access to the accounts of one keychain service.
pub trait Keychain: Send + Sync {
    fn read(&self, account: &str) -> Result<Option<String>>;
    fn write(&self, account: &str, secret: &str) -> Result<()>;
    /// Returns false if the account had no entry.
    fn remove(&self, account: &str) -> Result<bool>;
}

/// The OS keychain (Keychain on macOS, Credential Manager on Windows,
/// the kernel keyring on Linux).
///
/// Kernel keyring entries are lost on reboot unless the crate is built
/// with the `persistent-linux-keyring` feature.
pub struct OsKeychain {
    service: String,
}

impl OsKeychain {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, account: &str) -> Result<Entry> {
        Ok(Entry::new(&self.service, account)?)
    }
}

impl Keychain for OsKeychain {
    fn read(&self, account: &str) -> Result<Option<String>> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, account: &str, secret: &str) -> Result<()> {
        self.entry(account)?.set_password(secret)?;
        Ok(())
    }

    fn remove(&self, account: &str) -> Result<bool> {
        match self.entry(account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Secrets kept one per keychain account.
///
/// Keychains cannot be enumerated portably, so the set of stored keys is
/// itself kept as a JSON array in a reserved entry. Every change to an
/// entry and to the index happens under one lock; if the index cannot be
/// updated the entry is put back the way it was.
pub struct KeyringStore<K: Keychain = OsKeychain> {
    keychain: K,
    index_lock: Mutex<()>,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self::with_keychain(OsKeychain::new(service))
    }

    pub fn service(&self) -> &str {
        self.keychain.service()
    }
}

impl<K: Keychain> KeyringStore<K> {
    pub fn with_keychain(keychain: K) -> Self {
        Self {
            keychain,
            index_lock: Mutex::new(()),
        }
    }

    fn read_index(&self) -> Result<BTreeSet<String>> {
        match self.keychain.read(INDEX_ACCOUNT)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(index) => Ok(index),
                Err(e) => {
                    warn!(error = %e, "Login index in keychain is unreadable, starting over");
                    Ok(BTreeSet::new())
                }
            },
            None => Ok(BTreeSet::new()),
        }
    }

    fn write_index(&self, index: &BTreeSet<String>) -> Result<()> {
        if index.is_empty() {
            self.keychain.remove(INDEX_ACCOUNT)?;
            return Ok(());
        }
        let raw = serde_json::to_string(index).map_err(|e| AuthError::Storage(e.to_string()))?;
        self.keychain.write(INDEX_ACCOUNT, &raw)
    }

    /// Put `key` back to `previous` after a failed index update.
    fn restore(&self, key: &str, previous: Option<&str>) {
        let result = match previous {
            Some(secret) => self.keychain.write(key, secret),
            None => self.keychain.remove(key).map(|_| ()),
        };
        if let Err(e) = result {
            warn!(key, error = %e, "Failed to roll back keychain entry");
        }
    }

    fn is_reserved(key: &str) -> bool {
        key == INDEX_ACCOUNT
    }
}

impl<K: Keychain> SecretStore for KeyringStore<K> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if Self::is_reserved(key) {
            return Ok(None);
        }
        self.keychain.read(key)
    }

    fn set(&self, key: &str, secret: &str) -> Result<()> {
        if Self::is_reserved(key) {
            return Err(AuthError::InvalidAccount(format!("{key} is reserved")));
        }
        let _guard = self.index_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut index = self.read_index()?;
        let previous = self.keychain.read(key)?;

        self.keychain.write(key, secret)?;
        if index.insert(key.to_string()) {
            if let Err(e) = self.write_index(&index) {
                self.restore(key, previous.as_deref());
                return Err(e);
            }
        }
        debug!(key, "Stored secret in keychain");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        if Self::is_reserved(key) {
            return Ok(false);
        }
        let _guard = self.index_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut index = self.read_index()?;
        let previous = self.keychain.read(key)?;

        let removed = self.keychain.remove(key)?;
        if index.remove(key) {
            if let Err(e) = self.write_index(&index) {
                self.restore(key, previous.as_deref());
                return Err(e);
            }
        }
        debug!(key, removed, "Deleted secret from keychain");
        Ok(removed)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let _guard = self.index_lock.lock().unwrap_or_else(|p| p.into_inner());
        Ok(self.read_index()?.into_iter().collect())
    }
}

/// Process-local secret store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    secrets: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.secrets.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, secret: &str) -> Result<()> {
        self.lock().insert(key.to_string(), secret.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.lock().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }
}
