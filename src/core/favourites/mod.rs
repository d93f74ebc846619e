mod binder;
mod cache;
mod controller;
pub mod error;
mod events;
mod hearts;
mod locks;
mod model;

pub use binder::{MapSourceBinder, to_collection, to_feature};
pub use cache::FavouriteCache;
pub use controller::{SyncController, ToggleOutcome};
pub use events::{EventBus, FailedToggle, FavouritesEvent, ToggleIntent};
pub use hearts::{
    HEART_LABEL, HEART_PRESSED, HEART_UNPRESSED, HEART_UNSAVEABLE_TIP, HeartButton, HeartControl,
    HeartRegistry, HeartState, HeartView,
};
pub use locks::KeyedLocks;
pub use model::{FavouriteDoc, FavouriteRecord};
