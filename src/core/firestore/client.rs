use crate::app::config::FirestoreConfig;
use anyhow::{Context, Error};
use firestore::{FirestoreDb, FirestoreDbOptions};
use tracing::info;

/// Connects to the configured project, or to the emulator when one is set
pub async fn create_client(config: &FirestoreConfig) -> Result<FirestoreDb, Error> {
    let mut options = FirestoreDbOptions::new(config.project_id.clone());

    if let Some(db_id) = &config.database_id {
        options = options.with_database_id(db_id.clone());
    }

    if let Some(host) = &config.emulator_host {
        info!("Using Firestore emulator at {}", host);
        options = options.with_firebase_api_url(format!("http://{}", host));
    }

    let db = match &config.credentials_path {
        Some(path) => FirestoreDb::with_options_service_account_key_file(options, path.clone())
            .await
            .with_context(|| format!("service account key {}", path.display()))?,
        None => FirestoreDb::with_options(options).await?,
    };

    Ok(db)
}
