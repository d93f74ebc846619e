mod provider;

pub use provider::{Observability, init, shutdown};
