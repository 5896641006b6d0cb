//! One-shot resume sweep: re-issue OS notifications and present what was
//! missed within the catch-up window.

use recurra_core::{Occurrence, OccurrenceFilter};
use serde::Serialize;

use super::{print_json, App, CliResult};

#[derive(Serialize)]
struct SweepReport {
    rescheduled: usize,
    presented: Vec<Occurrence>,
}

pub fn run() -> CliResult {
    let mut app = App::open()?;
    let rescheduled = app.coordinator.resync()?;

    let presented = if app.config.triggers.enabled {
        let mut engine = app.trigger_engine()?;
        let known = app.coordinator.occurrences(&OccurrenceFilter::all())?;
        engine.reconcile(&known);
        let live: Vec<Occurrence> = known.into_iter().filter(Occurrence::is_live).collect();
        let presented = engine.resume(&live, app.coordinator.now());
        app.save_last_shown(&engine.export_last_shown())?;
        presented
    } else {
        Vec::new()
    };

    print_json(&SweepReport {
        rescheduled,
        presented,
    })
}
