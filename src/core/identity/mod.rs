mod firebase;
mod local;
mod provider;
mod session;

pub use firebase::FirebaseAuth;
pub use local::LocalIdentityProvider;
pub use provider::*;
pub use session::{SessionFile, StoredSession};
