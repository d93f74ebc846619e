pub mod config;
pub mod console;
pub mod lifecycle;

pub use lifecycle::{context, shutdown, startup};
