use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::BlockingTask;
use crate::core::observability;
use anyhow::Error;
use tracing::info;

pub struct ObservabilityShutdownTask;

impl BlockingTask<StartupContext> for ObservabilityShutdownTask {
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let Some(provider) = context.observability.lock().take() else {
            return Ok(());
        };

        info!("Shutting down observability");
        observability::shutdown(provider)
    }
}
