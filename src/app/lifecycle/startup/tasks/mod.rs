pub mod config_load;
pub mod favourites_sync;
pub mod firestore;
pub mod identity;
pub mod observability;
