//! History actions module
//!
//! Save and delete operations that keep every open history view informed.

mod handler;

pub use handler::{ActionHandler, SAVE_ATTEMPTS, SAVE_RETRY_BASE};
