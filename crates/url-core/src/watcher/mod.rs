pub mod engine;
pub mod event;
pub mod state;

pub use engine::{CheckError, CheckOutcome, Watcher};
pub use event::{EventKind, EventRing, WatchEvent};
pub use state::{UrlEntry, UrlState, UrlStatus, WatchItem, WatcherState};
