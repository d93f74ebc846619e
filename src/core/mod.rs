pub mod config_manager;
pub mod favourites;
pub mod firestore;
pub mod identity;
pub mod map;
pub mod observability;
pub mod places;
pub mod stores;
