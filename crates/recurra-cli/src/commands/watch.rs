//! Foreground trigger loop.
//!
//! Polls the store so edits made by other invocations are picked up, prints
//! one JSON line per presented reminder, and delivers due outbox entries.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use recurra_core::{Occurrence, OccurrenceFilter, PresentationSurface, SystemClock, TriggerService};
use tokio::time::Instant;

use super::{App, CliResult};

#[derive(Args)]
pub struct WatchArgs {
    /// Seconds between store polls
    #[arg(long, default_value = "30")]
    pub poll: u64,
    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,
}

struct PrintSurface;

impl PresentationSurface for PrintSurface {
    fn present(&self, occurrence: &Occurrence) {
        match serde_json::to_string(occurrence) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(occurrence = %occurrence.id, "cannot print reminder: {e}"),
        }
    }
}

pub fn run(args: WatchArgs) -> CliResult {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(watch(args))
}

async fn watch(args: WatchArgs) -> CliResult {
    let mut app = App::open()?;
    if !app.config.triggers.enabled {
        return Err("in-app triggers are disabled (triggers.enabled = false)".into());
    }

    let engine = app.trigger_engine()?;
    let (handle, task) = TriggerService::spawn(engine, PrintSurface, Arc::new(SystemClock));
    app.coordinator.resync()?;
    tracing::info!(poll_secs = args.poll, "watching");

    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut poll = tokio::time::interval(Duration::from_secs(args.poll.max(1)));
    loop {
        poll.tick().await;

        // other invocations may have completed, binned or purged reminders
        let known = app.coordinator.occurrences(&OccurrenceFilter::all())?;
        let live: Vec<Occurrence> = known.iter().filter(|o| o.is_live()).cloned().collect();
        handle.reconcile(known);
        handle.resume(live);

        for request in app.outbox.deliver_due(app.coordinator.now())? {
            tracing::info!(notification = %request.id, title = %request.payload.title, "notification delivered");
        }
        if let Some(snapshot) = handle.snapshot().await {
            app.save_last_shown(&snapshot.last_shown)?;
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }

    if let Some(engine) = handle.shutdown().await {
        app.save_last_shown(&engine.export_last_shown())?;
    }
    task.await?;
    Ok(())
}
