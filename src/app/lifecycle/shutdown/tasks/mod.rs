pub mod observability;
pub mod stop_sync;
