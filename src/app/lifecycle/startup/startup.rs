use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::{Pipeline, PipelineBuilder};
use crate::app::lifecycle::startup::tasks::config_load::ConfigLoadTask;
use crate::app::lifecycle::startup::tasks::favourites_sync::FavouritesSyncTask;
use crate::app::lifecycle::startup::tasks::firestore::FirestoreTask;
use crate::app::lifecycle::startup::tasks::identity::IdentityTask;
use crate::app::lifecycle::startup::tasks::observability::ConfigureObservabilityTask;
use crate::core::config_manager::ConfigManager;
use anyhow::Error;
use std::path::PathBuf;

pub fn build_start_pipeline(cfg_path: PathBuf) -> Result<Pipeline<StartupContext>, Error> {
    let cfg_manager = ConfigManager::new(cfg_path);

    PipelineBuilder::new("startup")
        .with_blocking("config_load", Box::new(ConfigLoadTask::new(cfg_manager)))
        .with_blocking("observability", Box::new(ConfigureObservabilityTask))
        .with_async("firestore", Box::new(FirestoreTask))
        .with_async("identity", Box::new(IdentityTask))
        .with_async("favourites_sync", Box::new(FavouritesSyncTask))
        .build()
}
