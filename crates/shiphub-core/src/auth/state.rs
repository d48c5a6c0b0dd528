use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the process-wide notification posted on every validity transition.
pub const AUTH_STATE_CHANGED_NOTIFICATION: &str = "AuthStateChangedNotification";
/// Payload key for the state the session moved to.
pub const AUTH_STATE_KEY: &str = "AuthStateKey";
/// Payload key for the state the session moved from.
pub const AUTH_STATE_PREVIOUS_KEY: &str = "AuthStatePreviousKey";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AuthState {
    Invalid = 0,
    Valid = 1,
}

impl AuthState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        if raw == AuthState::Valid as u8 {
            AuthState::Valid
        } else {
            AuthState::Invalid
        }
    }

    pub fn is_valid(self) -> bool {
        self == AuthState::Valid
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Invalid => f.write_str("invalid"),
            AuthState::Valid => f.write_str("valid"),
        }
    }
}

/// Payload of [`AUTH_STATE_CHANGED_NOTIFICATION`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStateChanged {
    pub login: String,
    #[serde(rename = "AuthStateKey")]
    pub state: AuthState,
    #[serde(rename = "AuthStatePreviousKey")]
    pub previous: AuthState,
}
