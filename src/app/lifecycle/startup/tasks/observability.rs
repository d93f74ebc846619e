use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::BlockingTask;
use crate::core::observability;
use anyhow::{Error, anyhow};
use tracing::info;

pub struct ConfigureObservabilityTask;

impl BlockingTask<StartupContext> for ConfigureObservabilityTask {
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = context
            .config
            .get()
            .ok_or_else(|| anyhow!("Config not loaded before observability initialization"))?;

        let observability = observability::init(&config.logging)?;
        let exports = observability.exports_spans();
        *context.observability.lock() = Some(observability);

        info!(span_export = exports, "Observability configured");

        Ok(())
    }
}
