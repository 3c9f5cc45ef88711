//! Client-side stores
//!
//! Two small pieces of persisted state live outside the sync controller:
//! the advisory refresh flag shared between instances, and the remembered
//! session. Both have in-memory and file-backed implementations behind a
//! trait so the controller and tests never touch the filesystem directly.

mod file;
mod memory;
mod traits;

pub use file::{FLAG_FILE, FileFlagStore, FileSessionStore, SESSION_FILE};
pub use memory::{InMemoryFlagStore, InMemorySessionStore};
pub use traits::{FlagStore, RefreshFlag, SessionStore};
