//! History list synchronization
//!
//! [`HistorySync`] keeps one user's history list current. Refresh requests
//! from every source go through a single arbiter that allows at most one
//! fetch at a time, debounces unforced requests and drops results that
//! arrive after the user changed. [`Triggers`] wires outside signals to it.

mod arbiter;
mod controller;
mod timing;
mod triggers;

pub use arbiter::{Completion, Decision, DropReason, FetchTicket, RequestToken, SyncArbiter};
pub use controller::{HistorySync, WeakHistorySync};
pub use timing::{FlagCheck, check_flag, cooldown_elapsed};
pub use triggers::{FlagOutcome, HistoryEvent, HistoryEvents, Triggers, check_refresh_flag};
