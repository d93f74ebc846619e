use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::{Pipeline, PipelineBuilder};
use crate::app::lifecycle::shutdown::tasks::observability::ObservabilityShutdownTask;
use crate::app::lifecycle::shutdown::tasks::stop_sync::StopSyncTask;
use anyhow::Error;

/// Builds the shutdown pipeline, which takes the resulting `StartupContext`
/// and releases whatever startup attached to it
pub fn build_shutdown_pipeline() -> Result<Pipeline<StartupContext>, Error> {
    PipelineBuilder::new("shutdown")
        .with_async("stop_sync", Box::new(StopSyncTask))
        .with_blocking("observability", Box::new(ObservabilityShutdownTask))
        .build()
}
