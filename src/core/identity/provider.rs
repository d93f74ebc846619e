use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

/// A signed in account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
        }
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no account exists for that email")]
    UserNotFound,

    #[error("wrong email or password")]
    InvalidCredentials,

    #[error("an account already exists for that email")]
    EmailInUse,

    #[error("password should be at least 6 characters")]
    WeakPassword,

    #[error("identity provider rejected the request: {0}")]
    Rejected(String),

    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity provider error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Email/password identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Identity changes. The current value is available immediately,
    /// `None` while signed out.
    fn watch(&self) -> watch::Receiver<Option<Identity>>;

    fn current(&self) -> Option<Identity> {
        self.watch().borrow().clone()
    }
}
