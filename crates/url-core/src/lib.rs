#![forbid(unsafe_code)]

pub mod config;
pub mod diff;
pub mod fetch;
pub mod notify;
pub mod retry;
pub mod store;
pub mod watcher;

pub use config::WatcherConfig;
pub use fetch::{ContentFetcher, FetchError, HttpFetcher};
pub use notify::{
    notification_channel, Dispatcher, Notification, NotificationSink, NotifyError, TextBeltSink,
};
pub use retry::{RetryPolicy, Unreachable};
pub use store::{SnapshotStore, StateRecord, StoreError};
pub use watcher::{
    CheckError, CheckOutcome, EventKind, EventRing, UrlState, UrlStatus, WatchEvent, WatchItem,
    Watcher, WatcherState,
};
