use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::AsyncTask;
use crate::core::identity::{FirebaseAuth, IdentityProvider, LocalIdentityProvider};
use anyhow::{Error, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Picks the identity provider and restores a persisted session
pub struct IdentityTask;

#[async_trait]
impl AsyncTask<StartupContext> for IdentityTask {
    #[instrument(skip_all, name = "identity_task")]
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = context
            .config
            .get()
            .ok_or(anyhow!("Config not set on startup context"))?;

        let provider: Arc<dyn IdentityProvider> = match &config.auth {
            Some(auth_config) => {
                let auth = FirebaseAuth::new(auth_config);

                match auth.restore().await {
                    Ok(Some(identity)) => info!("Restored session for {}", identity.uid),
                    Ok(None) => info!("No saved session, signed out"),
                    // a stale session must not block startup
                    Err(err) => warn!("Could not restore saved session: {}", err),
                }

                Arc::new(auth)
            }
            None => {
                info!("Auth not configured, using local accounts");
                Arc::new(LocalIdentityProvider::new())
            }
        };

        context
            .identity
            .set(provider)
            .map_err(|_| anyhow!("Identity provider already set on startup context"))?;

        Ok(())
    }
}
