use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::AsyncTask;
use crate::core::favourites::{EventBus, MapSourceBinder, SyncController};
use crate::core::map::{FavouritesLayerToggle, GeoJsonFileMap, MapSlot, MapSurface, MemoryMap};
use crate::core::stores::{FavouriteStore, FirestoreFavouriteStore, MemoryFavouriteStore};
use anyhow::{Error, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

/// Wires the store, the map surface and the layer toggle to a
/// [`SyncController`] and binds it to the identity provider
pub struct FavouritesSyncTask;

#[async_trait]
impl AsyncTask<StartupContext> for FavouritesSyncTask {
    #[instrument(skip_all, name = "favourites_sync_task")]
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = context
            .config
            .get()
            .ok_or(anyhow!("Config not set on startup context"))?;
        let identity = context
            .identity
            .get()
            .ok_or(anyhow!("Identity provider not set on startup context"))?;

        let store: Arc<dyn FavouriteStore> = match context.firestore.get() {
            Some(Some(db)) => Arc::new(FirestoreFavouriteStore::new(db.clone(), &config.sync)),
            _ => {
                info!("Using in-memory favourites store");
                Arc::new(MemoryFavouriteStore::new())
            }
        };

        let map_config = &config.map;
        let surface: Arc<dyn MapSurface> = match &map_config.geojson_path {
            Some(path) => {
                let map = Arc::new(GeoJsonFileMap::new(
                    path.clone(),
                    &map_config.source_id,
                    &map_config.layer_id,
                ));
                info!("Writing favourites source to {}", map.path().display());

                context
                    .map_file
                    .set(map.clone())
                    .map_err(|_| anyhow!("Map file already set on startup context"))?;
                map
            }
            None => Arc::new(
                MemoryMap::new()
                    .with_source(&map_config.source_id)
                    .with_layer(&map_config.layer_id, true),
            ),
        };

        let slot = Arc::new(MapSlot::default());
        let bus = EventBus::new(config.sync.event_capacity);
        let controller = SyncController::new(
            store,
            MapSourceBinder::new(slot.clone(), map_config.source_id.clone()),
            bus.clone(),
        );
        let layer_toggle = FavouritesLayerToggle::new(slot, map_config.layer_id.clone(), bus.clone());

        let mut tasks = context.tasks.lock();
        tasks.push(layer_toggle.run(bus.subscribe()));
        tasks.push(controller.bind_identity(identity.watch()));
        drop(tasks);

        controller.attach_map(surface);
        info!("Favourites sync ready");

        context
            .controller
            .set(controller)
            .map_err(|_| anyhow!("Sync controller already set on startup context"))?;
        context
            .layer_toggle
            .set(layer_toggle)
            .map_err(|_| anyhow!("Layer toggle already set on startup context"))?;

        Ok(())
    }
}
