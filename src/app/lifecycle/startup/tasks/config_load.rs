use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::BlockingTask;
use crate::core::config_manager::ConfigManager;
use anyhow::{Error, anyhow};

pub(crate) struct ConfigLoadTask {
    manager: ConfigManager,
}

impl ConfigLoadTask {
    pub fn new(manager: ConfigManager) -> Self {
        Self { manager }
    }
}

impl BlockingTask<StartupContext> for ConfigLoadTask {
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        self.manager.start()?;

        // logging is not up yet
        let config = self.manager.get()?.clone();
        println!("Config loaded from {}", self.manager.path().display());

        context
            .config
            .set(config)
            .map_err(|_| anyhow!("Config already set on startup context"))
    }
}
