use crate::core::identity::{Identity, IdentityError, IdentityProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::info;

const MIN_PASSWORD_LEN: usize = 6;
const UID_LEN: usize = 28;

struct Account {
    uid: String,
    password: String,
}

/// In-process accounts for development runs and tests. Nothing is
/// persisted, every start begins signed out.
pub struct LocalIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    current: watch::Sender<Option<Identity>>,
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current,
        }
    }

    fn generate_uid() -> String {
        std::iter::repeat_with(fastrand::alphanumeric)
            .take(UID_LEN)
            .collect()
    }

    /// Registers an account with a fixed uid, bypassing sign up
    pub fn with_account(self, uid: &str, email: &str, password: &str) -> Self {
        self.accounts.lock().insert(
            email.to_lowercase(),
            Account {
                uid: uid.to_string(),
                password: password.to_string(),
            },
        );
        self
    }
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let uid = {
            let accounts = self.accounts.lock();
            let account = accounts
                .get(&email.to_lowercase())
                .ok_or(IdentityError::UserNotFound)?;

            if account.password != password {
                return Err(IdentityError::InvalidCredentials);
            }
            account.uid.clone()
        };

        let identity = Identity::new(uid, Some(email.to_string()));
        info!("Signed in {} locally", identity.uid);
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword);
        }

        let uid = {
            let mut accounts = self.accounts.lock();
            let email_key = email.to_lowercase();
            if accounts.contains_key(&email_key) {
                return Err(IdentityError::EmailInUse);
            }

            let uid = Self::generate_uid();
            accounts.insert(
                email_key,
                Account {
                    uid: uid.clone(),
                    password: password.to_string(),
                },
            );
            uid
        };

        let identity = Identity::new(uid, Some(email.to_string()));
        info!("Created local account {}", identity.uid);
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.current.send_replace(None);
        Ok(())
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let provider = LocalIdentityProvider::new();
        let mut rx = provider.watch();
        assert!(rx.borrow().is_none());

        let created = provider.sign_up("a@example.com", "secret1").await.unwrap();
        assert_eq!(created.uid.len(), UID_LEN);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref(), Some(&created));

        provider.sign_out().await.unwrap();
        assert!(provider.current().is_none());

        let again = provider.sign_in("A@example.com", "secret1").await.unwrap();
        assert_eq!(again.uid, created.uid);
    }

    #[tokio::test]
    async fn test_errors() {
        let provider = LocalIdentityProvider::new().with_account("U1", "u1@example.com", "secret1");

        assert!(matches!(
            provider.sign_in("nobody@example.com", "x").await,
            Err(IdentityError::UserNotFound)
        ));
        assert!(matches!(
            provider.sign_in("u1@example.com", "wrong").await,
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            provider.sign_up("u1@example.com", "secret1").await,
            Err(IdentityError::EmailInUse)
        ));
        assert!(matches!(
            provider.sign_up("new@example.com", "123").await,
            Err(IdentityError::WeakPassword)
        ));
        assert!(provider.current().is_none());
    }
}
