mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, EnvFilter};

use url_core::{
    notification_channel, Dispatcher, EventKind, HttpFetcher, Notification, NotificationSink,
    SnapshotStore, TextBeltSink, UrlState, WatchItem, Watcher, WatcherConfig, WatcherState,
};

use config::{LoadResult, WatchList};

const DEFAULT_SNAPSHOT: &str = "url_cache.json";

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        // Leak is fine — called once, lives for the program's lifetime.
        Box::leak(VERSION.to_string().into_boxed_str())
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// URL content watcher — detect website changes and outages.
#[derive(Parser)]
#[command(name = "url-monitor", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a URL once and report whether it changed since the last run.
    Check {
        /// URL to check.
        url: String,

        /// Send an SMS notification if the content changed.
        #[arg(long, default_value_t = false)]
        sms: bool,

        /// Snapshot file holding previously seen content.
        #[arg(long, default_value = DEFAULT_SNAPSHOT)]
        snapshot: PathBuf,
    },
    /// Watch one or more URLs continuously.
    Watch {
        /// A JSON watch list (path ending in .json), or a single URL.
        target: String,

        /// Check interval in seconds (single-URL mode only).
        #[arg(long, default_value_t = 300)]
        interval: u64,

        /// Send SMS notifications on changes and outages.
        #[arg(long, default_value_t = false)]
        sms: bool,

        /// Disable the live status display; rely on log output.
        #[arg(long, default_value_t = false)]
        quiet: bool,

        /// Snapshot file holding previously seen content.
        #[arg(long, default_value = DEFAULT_SNAPSHOT)]
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { url, sms, snapshot } => {
            init_tracing("warn");
            run_check(url, sms, snapshot).await;
        }
        Commands::Watch {
            target,
            interval,
            sms,
            quiet,
            snapshot,
        } => {
            // In quiet mode the tracing stream is the only output.
            init_tracing(if quiet { "info" } else { "warn" });
            run_watch(target, interval, sms, quiet, snapshot).await;
        }
    }
}

fn init_tracing(default_filter: &str) {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

/// Spawn the SMS dispatcher when requested. Exits with a usage error if the
/// TextBelt environment is missing.
fn sms_channel(
    sms: bool,
) -> (
    Option<UnboundedSender<Notification>>,
    Option<JoinHandle<()>>,
) {
    if !sms {
        return (None, None);
    }
    match TextBeltSink::from_env() {
        Some(sink) => {
            let (tx, rx) = notification_channel();
            let sinks: Vec<Box<dyn NotificationSink>> = vec![Box::new(sink)];
            let handle = tokio::spawn(Dispatcher::new(rx, sinks).run());
            (Some(tx), Some(handle))
        }
        None => {
            eprintln!(
                "{} --sms requires SMS_PHONE_NUMBER and TEXTBELT_API_KEY (env or .env)",
                style("error:").red().bold()
            );
            std::process::exit(2);
        }
    }
}

fn validate_url(raw: &str) -> Result<(), String> {
    let parsed =
        url::Url::parse(raw).map_err(|e| format!("Invalid URL: {} ({})", raw, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(format!("URL must use http or https: {}", raw));
    }
    Ok(())
}

async fn run_check(url: String, sms: bool, snapshot: PathBuf) {
    if let Err(e) = validate_url(&url) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(2);
    }

    let config = WatcherConfig::default();
    let fetcher = Arc::new(HttpFetcher::from_config(&config));
    let store = SnapshotStore::new(snapshot);
    let (notification_tx, dispatcher_handle) = sms_channel(sms);

    let watcher = Watcher::new(Vec::new(), config, fetcher, store, notification_tx);

    let exit_code = match watcher.check_once(&url).await {
        Ok(outcome) => {
            if outcome.first_check {
                println!(
                    "{} first check, baseline stored",
                    style("OK").green().bold()
                );
            } else if outcome.changed {
                println!("{} content changed", style("CHANGED").yellow().bold());
                if let Some(diff) = &outcome.diff {
                    println!();
                    print_diff(diff);
                }
            } else {
                println!("{} no change", style("OK").green().bold());
            }
            0
        }
        Err(e) => {
            eprintln!("{} {}", style("UNREACHABLE").red().bold(), e);
            1
        }
    };

    // Dropping the watcher drops the only sender, ending the dispatcher.
    drop(watcher);
    if let Some(handle) = dispatcher_handle {
        match tokio::time::timeout(Duration::from_secs(10), handle).await {
            Ok(_) => {}
            Err(_) => tracing::warn!("SMS dispatcher did not finish in time"),
        }
    }

    std::process::exit(exit_code);
}

async fn run_watch(target: String, interval: u64, sms: bool, quiet: bool, snapshot: PathBuf) {
    let items = resolve_watch_items(&target, interval);

    let config = WatcherConfig::default();
    let fetcher = Arc::new(HttpFetcher::from_config(&config));
    let store = SnapshotStore::new(snapshot);
    let (notification_tx, dispatcher_handle) = sms_channel(sms);

    let watcher = Watcher::new(items.clone(), config, fetcher, store, notification_tx);

    if quiet {
        watcher.start().await;
        tracing::info!(urls = items.len(), "Watching (quiet mode), Ctrl+C to stop");
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to listen for Ctrl+C");
        }
        shutdown(&watcher).await;
    } else {
        run_live_display(&watcher, &items, sms).await;
    }

    drop(watcher);
    if let Some(handle) = dispatcher_handle {
        match tokio::time::timeout(Duration::from_secs(5), handle).await {
            Ok(_) => {}
            Err(_) => tracing::warn!("SMS dispatcher did not shut down in time, aborting"),
        }
    }
}

/// A `.json` target (or an existing file) is a watch list; anything else is
/// treated as a single URL.
fn resolve_watch_items(target: &str, interval: u64) -> Vec<WatchItem> {
    let path = Path::new(target);
    if target.ends_with(".json") || path.exists() {
        match WatchList::load(path) {
            Ok(LoadResult::Loaded(list)) => list.to_watch_items(),
            Ok(LoadResult::SampleCreated) => {
                println!("Configuration file '{}' not found.", target);
                println!("A sample configuration was written there.");
                println!("Edit it with your URLs and intervals, then run again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("{} {}", style("error:").red().bold(), e);
                std::process::exit(2);
            }
        }
    } else {
        if let Err(e) = validate_url(target) {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(2);
        }
        if interval == 0 {
            eprintln!("{} interval must be positive", style("error:").red().bold());
            std::process::exit(2);
        }
        vec![WatchItem::new(target, Duration::from_secs(interval))]
    }
}

async fn shutdown(watcher: &Watcher) {
    watcher.stop().await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while watcher.state().await != WatcherState::Stopped {
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!("Watcher did not stop in time");
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn run_live_display(watcher: &Watcher, items: &[WatchItem], sms: bool) {
    let multi = MultiProgress::new();
    let msg_style = ProgressStyle::with_template("{wide_msg}").expect("valid template");

    multi
        .println(format!(
            "{} {}",
            style("url-monitor").bold(),
            style(env!("CARGO_PKG_VERSION")).dim()
        ))
        .ok();
    for item in items {
        multi
            .println(format!(
                "  {} {} every {}s",
                style("url:").dim(),
                style(&item.url).bold(),
                item.interval.as_secs()
            ))
            .ok();
    }
    multi
        .println(format!(
            "  {} {}",
            style("sms: ").dim(),
            if sms { "enabled" } else { "disabled" }
        ))
        .ok();
    multi.println("").ok();
    multi
        .println(format!("{}", style("Press Ctrl+C to stop").dim()))
        .ok();
    multi.println("").ok();

    watcher.start().await;

    let status_bar = multi.add(ProgressBar::new_spinner().with_style(msg_style));
    status_bar.set_message(format!(
        "{}\n  {}",
        format_separator(0),
        style("Waiting for first check...").dim()
    ));

    let mut last_event_count = 0usize;
    let mut poll_num = 0u64;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            _ = tokio::signal::ctrl_c() => {
                status_bar.finish_and_clear();
                multi.println(format!("\n{}", style("Stopping...").dim())).ok();
                shutdown(watcher).await;
                multi.println(format!("{}", style("Watcher stopped.").dim())).ok();
                return;
            }
        }

        poll_num += 1;

        let events = watcher.events().await;
        if events.len() > last_event_count {
            let new_count = events.len() - last_event_count;
            for ev in events[..new_count].iter().rev() {
                let ts = ev.timestamp.format("%H:%M:%S");
                let kind_str = format!("{:<12}", format!("{}", ev.kind));
                let colored_kind = match ev.kind {
                    EventKind::Changed => style(kind_str).yellow(),
                    EventKind::Unreachable => style(kind_str).red(),
                    EventKind::Recovered => style(kind_str).green(),
                };
                multi
                    .println(format!(
                        "  {}  {} {}  {}",
                        style(ts).dim(),
                        colored_kind,
                        ev.url,
                        ev.details
                    ))
                    .ok();
                if let Some(diff) = &ev.diff {
                    for line in diff.lines() {
                        multi.println(format!("    {}", style_diff_line(line))).ok();
                    }
                }
            }
            last_event_count = events.len();
        }

        let statuses = watcher.statuses().await;
        let mut status_lines = vec![format_separator(poll_num)];
        for s in &statuses {
            let state_str = format!("{:<12}", format!("{}", s.state));
            let colored_state = match s.state {
                UrlState::Reachable => style(state_str).green(),
                UrlState::Unreachable => style(state_str).red(),
                UrlState::Checking => style(state_str).yellow(),
                UrlState::Pending => style(state_str).dim(),
            };
            let last = s
                .last_checked
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            status_lines.push(format!(
                "  {:<40} {} checks={:<5} fails={:<3} last={}",
                s.url, colored_state, s.total_checks, s.consecutive_failures, last,
            ));
        }

        status_bar.set_message(status_lines.join("\n"));
    }
}

fn print_diff(diff: &str) {
    for line in diff.lines() {
        println!("{}", style_diff_line(line));
    }
}

fn style_diff_line(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") {
        style(line).bold().to_string()
    } else if line.starts_with('+') {
        style(line).green().to_string()
    } else if line.starts_with('-') {
        style(line).red().to_string()
    } else if line.starts_with("@@") {
        style(line).cyan().to_string()
    } else {
        line.to_string()
    }
}

fn format_separator(poll_num: u64) -> String {
    let label = if poll_num == 0 {
        String::new()
    } else {
        format!(" poll {} ", poll_num)
    };
    let width = 54usize.saturating_sub(label.len());
    format!(
        "{}{}{}",
        style("──").dim(),
        style(label).dim().bold(),
        style("─".repeat(width)).dim()
    )
}
