use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No stored credentials for login: {0}")]
    NotFound(String),

    #[error("Session for {0} is no longer authorized")]
    Unauthorized(String),

    #[error("Invalid account: {0}")]
    InvalidAccount(String),

    #[error("Session for {0} has been logged out")]
    LoggedOut(String),

    #[error("Secure storage error: {0}")]
    Storage(String),

    #[error("Stored credentials for {login} are corrupt: {source}")]
    Corrupt {
        login: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl From<keyring::Error> for AuthError {
    fn from(err: keyring::Error) -> Self {
        AuthError::Storage(err.to_string())
    }
}
