use clap::Subcommand;
use recurra_core::OccurrenceFilter;

use super::reminder::report;
use super::{parse_id, print_json, App, CliResult};

#[derive(Subcommand)]
pub enum BinAction {
    /// List reminders in the bin
    List,
    /// Move a reminder into the bin
    Move {
        /// Occurrence ID
        id: String,
    },
    /// Take a reminder out of the bin
    Restore {
        /// Occurrence ID
        id: String,
    },
    /// Permanently delete a reminder from the bin
    Purge {
        /// Occurrence ID
        id: String,
    },
    /// Permanently delete everything in the bin
    Empty,
}

pub fn run(action: BinAction) -> CliResult {
    let mut app = App::open()?;

    match action {
        BinAction::List => print_json(&app.coordinator.occurrences(&OccurrenceFilter::bin())?),
        BinAction::Move { id } => {
            let id = parse_id(&id)?;
            report(id, app.coordinator.move_to_bin(id)?)
        }
        BinAction::Restore { id } => {
            let id = parse_id(&id)?;
            report(id, app.coordinator.restore(id)?)
        }
        BinAction::Purge { id } => {
            let id = parse_id(&id)?;
            report(id, app.coordinator.purge(id)?)
        }
        BinAction::Empty => print_json(&app.coordinator.empty_bin()?),
    }
}
