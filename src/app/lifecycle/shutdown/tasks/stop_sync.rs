use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::AsyncTask;
use anyhow::Error;
use async_trait::async_trait;
use tracing::{debug, info, instrument};

/// Closes the live favourites feed, waits for the map file and stops
/// the background loops
pub(crate) struct StopSyncTask;

#[async_trait]
impl AsyncTask<StartupContext> for StopSyncTask {
    #[instrument(skip_all, name = "stop_sync_task")]
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        match context.controller.get() {
            Some(controller) => {
                controller.shutdown();
                info!("Closed favourites feed");
            }
            None => info!("Skipping favourites shutdown, sync was never started"),
        }

        if let Some(map) = context.map_file.get() {
            map.flush().await;
            debug!("Flushed favourites map file {}", map.path().display());
        }

        let tasks: Vec<_> = context.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }

        Ok(())
    }
}
