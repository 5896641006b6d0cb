//! Inspect and drive the notification outbox.

use clap::Subcommand;
use recurra_core::{NotificationAction, NotificationId, NotificationService};

use super::reminder::report;
use super::{print_json, App, CliResult};

#[derive(Subcommand)]
pub enum NotifyAction {
    /// List scheduled notifications
    List {
        /// Show delivered notifications instead of pending ones
        #[arg(long)]
        delivered: bool,
    },
    /// Deliver every pending notification that is due
    Deliver,
    /// Act on a notification as if tapped
    Action {
        /// Notification ID, e.g. occurrence:<uuid>:followup:1
        id: String,
        /// complete or snooze
        action: String,
        /// Snooze minutes (default: notifications.snooze_minutes)
        #[arg(long)]
        minutes: Option<u32>,
    },
}

pub fn run(action: NotifyAction) -> CliResult {
    let mut app = App::open()?;

    match action {
        NotifyAction::List { delivered } => {
            let requests = if delivered {
                app.outbox.list_delivered()?
            } else {
                app.outbox.list_pending()?
            };
            print_json(&requests)
        }
        NotifyAction::Deliver => {
            let now = app.coordinator.now();
            print_json(&app.outbox.deliver_due(now)?)
        }
        NotifyAction::Action { id, action, minutes } => {
            let id: NotificationId = id.parse()?;
            let action = match action.to_ascii_lowercase().as_str() {
                "complete" => NotificationAction::Complete,
                "snooze" => NotificationAction::Snooze {
                    minutes: minutes.unwrap_or(app.config.notifications.snooze_minutes),
                },
                other => return Err(format!("unknown action '{other}', expected complete or snooze").into()),
            };
            report(id.occurrence_id, app.coordinator.handle_action(id, action)?)
        }
    }
}
