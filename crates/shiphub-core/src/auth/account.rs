use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{AuthError, Result};

/// Default upstream API host
pub const DEFAULT_GH_HOST: &str = "api.github.com";

/// Default ShipHub API host
pub const DEFAULT_SHIP_HOST: &str = "hub.realartists.com";

/// JSON keys of the declared fields; `extra` may not reuse them.
const DECLARED_KEYS: [&str; 6] = [
    "login",
    "name",
    "ghIdentifier",
    "shipIdentifier",
    "ghHost",
    "shipHost",
];

/// The remote identity a pair of stored tokens belongs to.
///
/// Keys this version does not know about are kept in `extra` and written
/// back unchanged, so a record saved by a newer client survives a round
/// trip through an older one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthAccount {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub gh_identifier: Option<i64>,
    #[serde(default)]
    pub ship_identifier: Option<String>,
    #[serde(default = "default_gh_host")]
    pub gh_host: String,
    #[serde(default = "default_ship_host")]
    pub ship_host: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_gh_host() -> String {
    DEFAULT_GH_HOST.to_string()
}

fn default_ship_host() -> String {
    DEFAULT_SHIP_HOST.to_string()
}

impl AuthAccount {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            name: None,
            gh_identifier: None,
            ship_identifier: None,
            gh_host: default_gh_host(),
            ship_host: default_ship_host(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_hosts(mut self, gh_host: impl Into<String>, ship_host: impl Into<String>) -> Self {
        self.gh_host = gh_host.into();
        self.ship_host = ship_host.into();
        self
    }

    /// Check the invariants a stored account must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.login.trim().is_empty() {
            return Err(AuthError::InvalidAccount("login must not be empty".to_string()));
        }
        if self.gh_host.trim().is_empty() || self.ship_host.trim().is_empty() {
            return Err(AuthError::InvalidAccount(format!(
                "hosts for {} must not be empty",
                self.login
            )));
        }
        // Flattened extras sharing a declared key would be written twice
        // and the record could not be read back.
        if let Some(key) = self.extra.keys().find(|k| DECLARED_KEYS.contains(&k.as_str())) {
            return Err(AuthError::InvalidAccount(format!(
                "extra field {key} of {} shadows a declared field",
                self.login
            )));
        }
        Ok(())
    }

    /// Display name, falling back to the login.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.login,
        }
    }

    /// True when the upstream host is github.com rather than an Enterprise install.
    pub fn is_public_github(&self) -> bool {
        self.gh_host.eq_ignore_ascii_case(DEFAULT_GH_HOST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_account_with_unknown_keys() {
        let value = json!({
            "login": "alice",
            "name": "Alice Liddell",
            "ghIdentifier": 1234,
            "shipIdentifier": "u-42",
            "ghHost": "github.example.com",
            "shipHost": "ship.example.com",
            "avatarUrl": "https://example.com/a.png",
            "plan": {"name": "pro"}
        });

        let account: AuthAccount = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(account.login, "alice");
        assert_eq!(account.gh_identifier, Some(1234));
        assert_eq!(account.extra.len(), 2);
        assert_eq!(account.extra["plan"], json!({"name": "pro"}));

        // Unknown keys come back out at the top level
        assert_eq!(serde_json::to_value(&account).unwrap(), value);
    }

    #[test]
    fn test_parse_account_defaults_hosts() {
        let account: AuthAccount = serde_json::from_str(r#"{"login": "bob"}"#).unwrap();
        assert_eq!(account.gh_host, DEFAULT_GH_HOST);
        assert_eq!(account.ship_host, DEFAULT_SHIP_HOST);
        assert!(account.is_public_github());
        assert!(account.extra.is_empty());
    }

    #[test]
    fn test_validate_rejects_blank_login() {
        assert!(matches!(
            AuthAccount::new("  ").validate(),
            Err(AuthError::InvalidAccount(_))
        ));
        assert!(AuthAccount::new("carol").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_host() {
        let account = AuthAccount::new("dave").with_hosts("", DEFAULT_SHIP_HOST);
        assert!(account.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_extra_shadowing_declared_field() {
        for key in DECLARED_KEYS {
            let mut account = AuthAccount::new("alice");
            account.extra.insert(key.to_string(), json!("mallory"));
            assert!(
                matches!(account.validate(), Err(AuthError::InvalidAccount(_))),
                "{key} should be rejected"
            );
        }

        let mut account = AuthAccount::new("alice");
        account.extra.insert("avatarUrl".to_string(), json!("https://example.com/a.png"));
        assert!(account.validate().is_ok());
    }

    #[test]
    fn test_display_name_falls_back_to_login() {
        assert_eq!(AuthAccount::new("erin").display_name(), "erin");
        assert_eq!(AuthAccount::new("erin").with_name("").display_name(), "erin");
        assert_eq!(AuthAccount::new("erin").with_name("Erin K").display_name(), "Erin K");
    }
}
