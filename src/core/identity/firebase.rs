use crate::app::config::AuthConfig;
use crate::core::identity::{Identity, IdentityError, IdentityProvider, SessionFile, StoredSession};
use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    user_id: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Maps an identity toolkit error message, e.g.
/// `WEAK_PASSWORD : Password should be at least 6 characters`
fn classify(message: &str) -> IdentityError {
    let code = message.split([' ', ':']).next().unwrap_or(message);

    match code {
        "EMAIL_NOT_FOUND" => IdentityError::UserNotFound,
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => IdentityError::InvalidCredentials,
        "EMAIL_EXISTS" => IdentityError::EmailInUse,
        "WEAK_PASSWORD" => IdentityError::WeakPassword,
        _ => IdentityError::Rejected(message.to_string()),
    }
}

/// Firebase Authentication over its REST API, with the session
/// persisted locally so a restart stays signed in
pub struct FirebaseAuth {
    client: Client,
    api_key: String,
    identity_url: String,
    token_url: String,
    session: SessionFile,
    current: watch::Sender<Option<Identity>>,
}

impl FirebaseAuth {
    pub fn new(config: &AuthConfig) -> Self {
        let (current, _) = watch::channel(None);

        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            identity_url: config.identity_url.trim_end_matches('/').to_string(),
            token_url: config.token_url.trim_end_matches('/').to_string(),
            session: SessionFile::new(config.session_path.clone()),
            current,
        }
    }

    fn endpoint(&self, base: &str, path: &str) -> Result<Url, IdentityError> {
        Url::parse_with_params(&format!("{}/{}", base, path), &[("key", &self.api_key)])
            .map_err(|e| IdentityError::Internal(anyhow!("bad identity endpoint: {}", e)))
    }

    async fn read_error(response: reqwest::Response) -> IdentityError {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => classify(&body.error.message),
            Err(_) => IdentityError::Rejected(format!("http status {}", status)),
        }
    }

    async fn password_call(
        &self,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, IdentityError> {
        let url = self.endpoint(&self.identity_url, path)?;
        let response = self
            .client
            .post(url)
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let body: PasswordResponse = response.json().await?;
        let session = StoredSession {
            uid: body.local_id,
            email: body.email.or_else(|| Some(email.to_string())),
            refresh_token: body.refresh_token,
        };

        self.establish(session).await
    }

    async fn establish(&self, session: StoredSession) -> Result<Identity, IdentityError> {
        if let Err(err) = self.session.save(&session).await {
            // still signed in for this run
            warn!("Failed to persist session: {}", err);
        }

        let identity = session.identity();
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    /// Exchanges the persisted refresh token to confirm the stored
    /// session is still valid, and signs back in when it is
    #[instrument(skip_all, name = "restore_session")]
    pub async fn restore(&self) -> Result<Option<Identity>, IdentityError> {
        let Some(stored) = self.session.load().await? else {
            debug!("No stored session at {}", self.session.path().display());
            return Ok(None);
        };

        let url = self.endpoint(&self.token_url, "token")?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", &stored.refresh_token)
            .finish();

        let response = self
            .client
            .post(url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::read_error(response).await;
            warn!("Stored session rejected, signing out: {}", err);
            self.session.clear().await?;
            return Ok(None);
        }

        let token: TokenResponse = response.json().await?;
        let identity = self
            .establish(StoredSession {
                uid: token.user_id,
                email: stored.email,
                refresh_token: token.refresh_token,
            })
            .await?;

        info!("Restored session for {}", identity.uid);
        Ok(Some(identity))
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    #[instrument(skip_all, name = "firebase_sign_in")]
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let identity = self
            .password_call("accounts:signInWithPassword", email, password)
            .await?;
        info!("Signed in {}", identity.uid);
        Ok(identity)
    }

    #[instrument(skip_all, name = "firebase_sign_up")]
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let identity = self.password_call("accounts:signUp", email, password).await?;
        info!("Created account {}", identity.uid);
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.current.send_replace(None);
        self.session.clear().await?;
        info!("Signed out");
        Ok(())
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert!(matches!(classify("EMAIL_NOT_FOUND"), IdentityError::UserNotFound));
        assert!(matches!(
            classify("INVALID_LOGIN_CREDENTIALS"),
            IdentityError::InvalidCredentials
        ));
        assert!(matches!(classify("EMAIL_EXISTS"), IdentityError::EmailInUse));
        assert!(matches!(
            classify("WEAK_PASSWORD : Password should be at least 6 characters"),
            IdentityError::WeakPassword
        ));
        assert!(matches!(
            classify("TOO_MANY_ATTEMPTS_TRY_LATER"),
            IdentityError::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_restore_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuthConfig {
            api_key: "key".into(),
            session_path: dir.path().join("session.json"),
            ..Default::default()
        };

        let auth = FirebaseAuth::new(&config);
        assert_eq!(auth.restore().await.unwrap(), None);
        assert!(auth.current().is_none());
    }
}
