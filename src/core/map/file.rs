use crate::core::map::{FeatureCollection, MapError, MapSurface, MemoryMap};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error};

/// A source version waiting for the writer, numbered so callers can
/// wait for it to land
type Pending = (u64, Arc<FeatureCollection>);

/// Map surface for headless runs: one source mirrored into a GeoJSON
/// file that any map widget can load, plus in-memory layer state.
///
/// The file is written by a background task. Bursts of updates collapse
/// into a write of the newest version.
pub struct GeoJsonFileMap {
    path: PathBuf,
    source_id: String,
    inner: MemoryMap,
    pending: watch::Sender<Pending>,
    written: watch::Receiver<u64>,
}

impl GeoJsonFileMap {
    /// Must be called inside a tokio runtime, the writer is spawned here
    pub fn new(path: impl Into<PathBuf>, source_id: &str, layer_id: &str) -> Self {
        let path = path.into();
        let (pending, pending_rx) = watch::channel((0, Arc::new(FeatureCollection::empty())));
        let (written_tx, written) = watch::channel(0);

        tokio::spawn(run_writer(path.clone(), pending_rx, written_tx));

        Self {
            path,
            source_id: source_id.to_string(),
            inner: MemoryMap::new()
                .with_source(source_id)
                .with_layer(layer_id, false),
            pending,
            written,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits until everything handed to the map so far reached the disk
    /// or failed to
    pub async fn flush(&self) {
        let target = self.pending.borrow().0;
        let mut written = self.written.clone();
        let _ = written.wait_for(|version| *version >= target).await;
    }
}

async fn run_writer(
    path: PathBuf,
    mut pending: watch::Receiver<Pending>,
    written: watch::Sender<u64>,
) {
    while pending.changed().await.is_ok() {
        let (version, data) = pending.borrow_and_update().clone();

        match write_atomic(&path, &data).await {
            Ok(()) => debug!("Wrote {} favourites to {}", data.len(), path.display()),
            Err(err) => error!("Failed to write favourites map file: {:#}", err),
        }

        written.send_replace(version);
    }
}

async fn write_atomic(path: &Path, data: &FeatureCollection) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create map directory {}", dir.display()))?;
    }

    // write then rename so readers never see half a file
    let tmp = path.with_extension("geojson.tmp");
    let body = serde_json::to_vec_pretty(data)?;
    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;

    Ok(())
}

impl MapSurface for GeoJsonFileMap {
    fn replace_source(&self, source_id: &str, data: &FeatureCollection) -> Result<(), MapError> {
        self.inner.replace_source(source_id, data)?;

        if source_id == self.source_id {
            let data = Arc::new(data.clone());
            self.pending
                .send_modify(|(version, pending)| {
                    *version += 1;
                    *pending = data;
                });
        }

        Ok(())
    }

    fn set_layer_visible(&self, layer_id: &str, visible: bool) -> Result<(), MapError> {
        self.inner.set_layer_visible(layer_id, visible)
    }

    fn layer_visible(&self, layer_id: &str) -> Option<bool> {
        self.inner.layer_visible(layer_id)
    }
}
