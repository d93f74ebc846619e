use crate::core::identity::Identity;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What survives a restart: enough to silently sign back in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub uid: String,
    pub email: Option<String>,
    pub refresh_token: String,
}

impl StoredSession {
    pub fn identity(&self) -> Identity {
        Identity::new(self.uid.clone(), self.email.clone())
    }
}

/// Durable session persistence in a small JSON file
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> anyhow::Result<Option<StoredSession>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read session {}", self.path.display()));
            }
        };

        let session = serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt session file {}", self.path.display()))?;
        Ok(Some(session))
    }

    pub async fn save(&self, session: &StoredSession) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        tokio::fs::write(&self.path, serde_json::to_vec(session)?)
            .await
            .with_context(|| format!("failed to write session {}", self.path.display()))?;
        debug!("Persisted session for {}", session.uid);
        Ok(())
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(dir.path().join("nested").join("session.json"));
        assert_eq!(file.load().await.unwrap(), None);

        let session = StoredSession {
            uid: "U1".into(),
            email: Some("u1@example.com".into()),
            refresh_token: "refresh".into(),
        };
        file.save(&session).await.unwrap();
        assert_eq!(file.load().await.unwrap(), Some(session.clone()));
        assert_eq!(session.identity().uid, "U1");

        file.clear().await.unwrap();
        file.clear().await.unwrap();
        assert_eq!(file.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"not json").unwrap();

        assert!(SessionFile::new(path).load().await.is_err());
    }
}
