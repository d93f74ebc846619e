mod firestore;
mod memory;
mod store;

pub use firestore::FirestoreFavouriteStore;
pub use memory::MemoryFavouriteStore;
pub use store::*;
