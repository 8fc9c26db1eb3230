use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WatcherConfig;
use crate::diff::{fingerprint, unified_diff};
use crate::fetch::ContentFetcher;
use crate::notify::Notification;
use crate::retry::{fetch_with_retry, Unreachable};
use crate::store::{SnapshotStore, StateRecord};
use crate::watcher::event::{EventRing, WatchEvent};
use crate::watcher::state::*;

/// Shown when hashes differ but the line sequences are identical.
const NO_LINE_DIFF: &str = "Content changed but no line-by-line differences detected";

/// Default interval for URLs observed lazily rather than configured.
const LAZY_INTERVAL: Duration = Duration::from_secs(60);

/// Result of a completed (reachable) check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub changed: bool,
    pub first_check: bool,
    pub recovered: bool,
    pub diff: Option<String>,
}

/// Why a single-shot check did not produce an outcome.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Unreachable(#[from] Unreachable),
    /// A check (including its retries) is already in flight for this URL.
    #[error("A check for {url} is already in flight")]
    AlreadyChecking { url: String },
}

/// Everything a check task needs, cloned into each spawned check.
#[derive(Clone)]
struct CheckCtx {
    watcher_id: String,
    config: WatcherConfig,
    entries: Arc<RwLock<HashMap<String, UrlEntry>>>,
    records: Arc<RwLock<HashMap<String, StateRecord>>>,
    fetcher: Arc<dyn ContentFetcher>,
    store: Arc<SnapshotStore>,
    events: Arc<RwLock<EventRing>>,
    notification_tx: Option<UnboundedSender<Notification>>,
}

/// The scheduling core: owns the set of monitored URLs, decides which are
/// due each tick, dispatches checks concurrently, and raises transition
/// events to the notification channel.
pub struct Watcher {
    id: Uuid,
    watcher_id: String,
    config: WatcherConfig,
    entries: Arc<RwLock<HashMap<String, UrlEntry>>>,
    records: Arc<RwLock<HashMap<String, StateRecord>>>,
    state: Arc<RwLock<WatcherState>>,
    fetcher: Arc<dyn ContentFetcher>,
    store: Arc<SnapshotStore>,
    events: Arc<RwLock<EventRing>>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    notification_tx: Option<UnboundedSender<Notification>>,
    created_at: chrono::DateTime<Utc>,
}

impl Watcher {
    /// Build a watcher over `items`, loading prior content from `store`.
    /// Duplicate URLs collapse into a single entry.
    pub fn new(
        items: Vec<WatchItem>,
        config: WatcherConfig,
        fetcher: Arc<dyn ContentFetcher>,
        store: SnapshotStore,
        notification_tx: Option<UnboundedSender<Notification>>,
    ) -> Self {
        let mut entries = HashMap::new();
        for item in &items {
            if entries
                .insert(item.url.clone(), UrlEntry::new(item))
                .is_some()
            {
                warn!(url = %item.url, "Duplicate URL in watch set, keeping one entry");
            }
        }

        let records = store.load();
        let id = Uuid::new_v4();
        Self {
            watcher_id: id.to_string(),
            id,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_checks)),
            events: Arc::new(RwLock::new(EventRing::new(config.event_limit))),
            config,
            entries: Arc::new(RwLock::new(entries)),
            records: Arc::new(RwLock::new(records)),
            state: Arc::new(RwLock::new(WatcherState::Idle)),
            fetcher,
            store: Arc::new(store),
            in_flight: Arc::new(AtomicUsize::new(0)),
            notification_tx,
            created_at: Utc::now(),
        }
    }

    pub fn with_watcher_id(mut self, watcher_id: impl Into<String>) -> Self {
        self.watcher_id = watcher_id.into();
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn watcher_id(&self) -> &str {
        &self.watcher_id
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn created_at(&self) -> chrono::DateTime<Utc> {
        self.created_at
    }

    pub async fn state(&self) -> WatcherState {
        *self.state.read().await
    }

    /// Recent transition events, newest first.
    pub async fn events(&self) -> Vec<WatchEvent> {
        self.events.read().await.list()
    }

    /// Per-URL status snapshot, sorted by url for stable display.
    pub async fn statuses(&self) -> Vec<UrlStatus> {
        let entries = self.entries.read().await;
        let records = self.records.read().await;
        let mut result: Vec<UrlStatus> = entries
            .values()
            .map(|e| UrlStatus {
                url: e.url.clone(),
                state: e.state,
                interval_secs: e.interval.as_secs(),
                total_checks: e.total_checks,
                consecutive_failures: e.consecutive_failures,
                last_checked: records.get(&e.url).map(|r| r.last_checked),
                last_change_at: e.last_change_at,
            })
            .collect();
        result.sort_by(|a, b| a.url.cmp(&b.url));
        result
    }

    fn check_ctx(&self) -> CheckCtx {
        CheckCtx {
            watcher_id: self.watcher_id.clone(),
            config: self.config.clone(),
            entries: Arc::clone(&self.entries),
            records: Arc::clone(&self.records),
            fetcher: Arc::clone(&self.fetcher),
            store: Arc::clone(&self.store),
            events: Arc::clone(&self.events),
            notification_tx: self.notification_tx.clone(),
        }
    }

    async fn claim_due(&self) -> Vec<(String, UrlState)> {
        claim_due_entries(&mut *self.entries.write().await)
    }

    /// Start the tick loop in the background. Idempotent while `Active`.
    pub async fn start(&self) {
        {
            let mut state = self.state.write().await;
            if *state == WatcherState::Active {
                return;
            }
            *state = WatcherState::Active;
        }

        let url_count = self.entries.read().await.len();
        info!(watcher_id = %self.watcher_id, urls = url_count, "Starting watcher");

        let state = Arc::clone(&self.state);
        let entries = Arc::clone(&self.entries);
        let records = Arc::clone(&self.records);
        let store = Arc::clone(&self.store);
        let semaphore = Arc::clone(&self.semaphore);
        let in_flight = Arc::clone(&self.in_flight);
        let ctx = self.check_ctx();
        let tick_interval = self.config.tick_interval;

        tokio::spawn(async move {
            loop {
                {
                    let current = *state.read().await;
                    if current != WatcherState::Active {
                        break;
                    }
                }

                let due = claim_due_entries(&mut *entries.write().await);

                for (url, prev) in due {
                    let ctx = ctx.clone();
                    let semaphore = Arc::clone(&semaphore);
                    let in_flight = Arc::clone(&in_flight);
                    in_flight.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        if let Ok(_permit) = semaphore.acquire_owned().await {
                            let _ = run_check(&ctx, &url, prev).await;
                        }
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    });
                }

                tokio::time::sleep(tick_interval).await;
            }

            // Let in-flight checks settle, then flush the snapshot.
            while in_flight.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            let snapshot = records.read().await.clone();
            if let Err(e) = store.save(&snapshot) {
                warn!(error = %e, "Failed to flush snapshot on shutdown");
            }
            *state.write().await = WatcherState::Stopped;
            info!("Watcher stopped");
        });
    }

    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if *state == WatcherState::Active {
            *state = WatcherState::Stopping;
            info!(watcher_id = %self.watcher_id, "Stopping watcher");
        }
    }

    /// Run every currently-due URL to completion, with bounded parallelism.
    /// The driving path for tests and single-pass callers; the background
    /// loop in [`Watcher::start`] is the production path.
    pub async fn check_due_once(&self) {
        let due = self.claim_due().await;
        let ctx = self.check_ctx();
        stream::iter(due.into_iter().map(|(url, prev)| {
            let ctx = ctx.clone();
            async move {
                let _ = run_check(&ctx, &url, prev).await;
            }
        }))
        .buffer_unordered(self.config.max_concurrent_checks)
        .collect::<Vec<()>>()
        .await;
    }

    /// Check a single URL immediately, registering it lazily if it is not
    /// part of the watch set. Refuses to overlap a check already in flight
    /// for the same URL.
    pub async fn check_once(&self, url: &str) -> Result<CheckOutcome, CheckError> {
        let prev = {
            let mut entries = self.entries.write().await;
            let entry = entries
                .entry(url.to_string())
                .or_insert_with(|| UrlEntry::new(&WatchItem::new(url, LAZY_INTERVAL)));
            if entry.state == UrlState::Checking {
                return Err(CheckError::AlreadyChecking {
                    url: url.to_string(),
                });
            }
            let prev = entry.state;
            entry.state = UrlState::Checking;
            prev
        };
        Ok(run_check(&self.check_ctx(), url, prev).await?)
    }
}

/// Mark due, non-checking entries as `Checking` and return them with their
/// prior state for transition accounting.
fn claim_due_entries(entries: &mut HashMap<String, UrlEntry>) -> Vec<(String, UrlState)> {
    let now = Instant::now();
    let mut due = Vec::new();
    for entry in entries.values_mut() {
        if entry.state != UrlState::Checking && entry.next_due <= now {
            due.push((entry.url.clone(), entry.state));
            entry.state = UrlState::Checking;
        }
    }
    due
}

fn jittered(interval: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return interval;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    interval.mul_f64(factor.max(0.0))
}

async fn record_event(ctx: &CheckCtx, event: WatchEvent) {
    info!(url = %event.url, kind = %event.kind, "{}", event.details);
    ctx.events.write().await.push(event.clone());
    if let Some(tx) = &ctx.notification_tx {
        let _ = tx.send(Notification {
            watcher_id: ctx.watcher_id.clone(),
            event,
        });
    }
}

/// One full check for `url`: retried fetch, change detection against the
/// stored record, transition events, and snapshot persistence. The entry
/// must already be marked `Checking` with `prev` holding its prior state.
async fn run_check(ctx: &CheckCtx, url: &str, prev: UrlState) -> Result<CheckOutcome, Unreachable> {
    let result = fetch_with_retry(ctx.fetcher.as_ref(), url, ctx.config.retry_policy()).await;
    let now = Utc::now();

    match result {
        Ok(content) => {
            let hash = fingerprint(&content);
            let prev_record = ctx.records.read().await.get(url).cloned();

            let (changed, first_check, diff) = match prev_record {
                None => {
                    debug!(url, "First check, storing baseline");
                    (false, true, None)
                }
                Some(ref r) if r.hash == hash => (false, false, None),
                Some(ref r) => {
                    let diff = unified_diff(&r.content, &content, url)
                        .unwrap_or_else(|| NO_LINE_DIFF.to_string());
                    (true, false, Some(diff))
                }
            };

            let downtime_secs = {
                let mut entries = ctx.entries.write().await;
                let Some(entry) = entries.get_mut(url) else {
                    return Err(removed_while_checking(url));
                };
                entry.total_checks += 1;
                entry.consecutive_failures = 0;
                entry.state = UrlState::Reachable;
                if changed {
                    entry.last_change_at = Some(now);
                }
                entry.next_due =
                    Instant::now() + jittered(entry.interval, ctx.config.interval_jitter);
                entry
                    .unreachable_since
                    .take()
                    .map(|since| since.elapsed().as_secs())
            };

            let recovered = prev == UrlState::Unreachable;
            if recovered {
                record_event(
                    ctx,
                    WatchEvent::recovered(url, downtime_secs.unwrap_or(0)),
                )
                .await;
            }
            if changed {
                record_event(
                    ctx,
                    WatchEvent::changed(url, diff.clone().unwrap_or_default()),
                )
                .await;
            }

            // Snapshot the map under the lock, save after releasing it so
            // file IO never blocks other checks.
            let snapshot = {
                let mut records = ctx.records.write().await;
                records.insert(
                    url.to_string(),
                    StateRecord {
                        content,
                        hash,
                        last_checked: now,
                    },
                );
                records.clone()
            };
            if let Err(e) = ctx.store.save(&snapshot) {
                warn!(url, error = %e, "Failed to persist snapshot");
            }

            Ok(CheckOutcome {
                changed,
                first_check,
                recovered,
                diff,
            })
        }
        Err(unreachable) => {
            let newly_unreachable = {
                let mut entries = ctx.entries.write().await;
                let Some(entry) = entries.get_mut(url) else {
                    return Err(unreachable);
                };
                entry.consecutive_failures += 1;
                entry.state = UrlState::Unreachable;
                entry.next_due =
                    Instant::now() + jittered(entry.interval, ctx.config.interval_jitter);
                if prev != UrlState::Unreachable {
                    entry.unreachable_since = Some(Instant::now());
                    true
                } else {
                    false
                }
            };

            if newly_unreachable {
                record_event(
                    ctx,
                    WatchEvent::unreachable(url, unreachable.last_error.to_string()),
                )
                .await;
            } else {
                debug!(url, "Still unreachable, no repeat alert");
            }

            Err(unreachable)
        }
    }
}

fn removed_while_checking(url: &str) -> Unreachable {
    Unreachable {
        url: url.to_string(),
        attempts: 0,
        last_error: crate::fetch::FetchError::Network {
            url: url.to_string(),
            reason: "entry removed while check was in flight".to_string(),
        },
    }
}
