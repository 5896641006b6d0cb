//! Reminder commands: add, list, show, edit, complete, snooze, delete.

use clap::{Args, ValueEnum};
use recurra_core::{
    CoreError, EditOutcome, FollowUp, Frequency, MutationOutcome, Occurrence, OccurrenceFilter,
    OccurrenceId, OccurrenceStore, RecurrenceRule, ReminderDraft,
};

use super::{parse_dates, parse_id, parse_time, print_json, App, CliResult};

#[derive(Args)]
pub struct AddArgs {
    /// Reminder title
    pub title: String,
    /// Due time in UTC, e.g. 2024-05-01T09:00
    #[arg(long)]
    pub at: String,
    /// Recurrence: none, daily, weekly, monthly, yearly or custom
    #[arg(long, default_value = "none")]
    pub every: String,
    /// Rule steps between occurrences
    #[arg(long, default_value = "1")]
    pub interval: u32,
    /// Occurrences after the first (default: series.default_count)
    #[arg(long)]
    pub count: Option<u32>,
    /// Dates for a custom rule, e.g. 2024-05-03,2024-05-09
    #[arg(long)]
    pub dates: Option<String>,
    /// Minutes between follow-up notifications (0 disables)
    #[arg(long)]
    pub follow_up_interval: Option<u32>,
    /// Number of follow-up notifications
    #[arg(long)]
    pub follow_up_count: Option<u32>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Show the bin instead
    #[arg(long)]
    pub bin: bool,
    /// Include completed reminders
    #[arg(long)]
    pub all: bool,
    /// Only members of this series
    #[arg(long)]
    pub series: Option<String>,
    /// Only reminders due at or after this time
    #[arg(long)]
    pub from: Option<String>,
    /// Only reminders due before this time
    #[arg(long)]
    pub before: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EditScope {
    /// Edit this occurrence; stop if the series rule would change
    Auto,
    /// Detach this occurrence from its series
    This,
    /// Rewrite the whole series
    Series,
}

#[derive(Args)]
pub struct EditArgs {
    /// Occurrence ID
    pub id: String,
    /// New title
    #[arg(long)]
    pub title: Option<String>,
    /// New due time (series scope: new anchor)
    #[arg(long)]
    pub at: Option<String>,
    /// New recurrence kind
    #[arg(long)]
    pub every: Option<String>,
    /// New interval
    #[arg(long)]
    pub interval: Option<u32>,
    /// Occurrences after the first (series scope)
    #[arg(long)]
    pub count: Option<u32>,
    /// Dates for a custom rule
    #[arg(long)]
    pub dates: Option<String>,
    /// Minutes between follow-up notifications
    #[arg(long)]
    pub follow_up_interval: Option<u32>,
    /// Number of follow-up notifications
    #[arg(long)]
    pub follow_up_count: Option<u32>,
    /// What the edit applies to
    #[arg(long, value_enum, default_value = "auto")]
    pub scope: EditScope,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Occurrence ID
    pub id: String,
    /// Delete every member of the occurrence's series
    #[arg(long, conflicts_with = "future")]
    pub series: bool,
    /// Delete series members due after this one
    #[arg(long)]
    pub future: bool,
}

pub fn add(args: AddArgs) -> CliResult {
    let mut app = App::open()?;
    let due = parse_time(&args.at)?;
    let mut frequency: Frequency = args.every.parse()?;
    let dates = args.dates.as_deref().map(parse_dates).transpose()?;
    if dates.is_some() && frequency == Frequency::None {
        frequency = Frequency::Custom;
    }

    let defaults = app.config.follow_up.as_follow_up();
    let follow_up = FollowUp::new(
        args.follow_up_interval.unwrap_or(defaults.interval_minutes),
        args.follow_up_count.unwrap_or(defaults.repeat_count),
    );
    let mut draft = ReminderDraft::new(args.title, due).with_follow_up(follow_up);
    match frequency {
        Frequency::None => {}
        Frequency::Custom => draft = draft.with_custom_dates(dates.unwrap_or_default()),
        Frequency::Daily | Frequency::Weekly | Frequency::Monthly | Frequency::Yearly => {
            let count = args.count.unwrap_or(app.config.series.default_count);
            draft = draft.with_rule(RecurrenceRule::new(frequency, args.interval), count);
        }
    }

    let outcome = app.coordinator.create_series(&draft)?;
    print_json(&outcome)
}

pub fn list(args: ListArgs) -> CliResult {
    let app = App::open()?;
    let mut filter = if args.bin {
        OccurrenceFilter::bin()
    } else {
        OccurrenceFilter::active()
    };
    if !args.all && !args.bin {
        filter = filter.completed(false);
    }
    if let Some(series) = args.series {
        filter.series_id = Some(series.parse()?);
    }
    if let Some(from) = args.from {
        filter = filter.due_from(parse_time(&from)?);
    }
    if let Some(before) = args.before {
        filter = filter.due_before(parse_time(&before)?);
    }
    print_json(&app.coordinator.occurrences(&filter)?)
}

pub fn show(id: &str) -> CliResult {
    let app = App::open()?;
    let occurrence = find(&app, parse_id(id)?)?;
    print_json(&occurrence)
}

pub fn edit(args: EditArgs) -> CliResult {
    let mut app = App::open()?;
    let id = parse_id(&args.id)?;
    let existing = find(&app, id)?;
    let mut draft = ReminderDraft::from_occurrence(&existing);

    if let Some(title) = &args.title {
        draft.title = title.clone();
    }
    if let Some(at) = &args.at {
        draft.due = parse_time(at)?;
    }
    let frequency = match &args.every {
        Some(raw) => raw.parse()?,
        None => existing.rule.frequency,
    };
    draft.rule = RecurrenceRule::new(frequency, args.interval.unwrap_or(existing.rule.interval));
    if args.follow_up_interval.is_some() || args.follow_up_count.is_some() {
        draft.follow_up = FollowUp::new(
            args.follow_up_interval.unwrap_or(existing.follow_up.interval_minutes),
            args.follow_up_count.unwrap_or(existing.follow_up.repeat_count),
        );
    }
    if let Some(dates) = &args.dates {
        draft.custom_dates = parse_dates(dates)?;
    }

    let outcome = match args.scope {
        EditScope::Auto => {
            fill_promotion_defaults(&app, &mut draft, &args, &existing)?;
            app.coordinator.edit_single(id, &draft)?
        }
        EditScope::This => {
            fill_promotion_defaults(&app, &mut draft, &args, &existing)?;
            app.coordinator.edit_this_only(id, &draft)?
        }
        EditScope::Series => {
            let series_id = existing
                .series_id
                .ok_or_else(|| format!("{id} is not part of a series"))?;
            let members = app.coordinator.occurrences(&OccurrenceFilter::series(series_id))?;
            if args.at.is_none() {
                if let Some(first) = members.first() {
                    draft.due = first.due;
                }
            }
            draft.count = args
                .count
                .unwrap_or_else(|| u32::try_from(members.len().saturating_sub(1)).unwrap_or(u32::MAX));
            if draft.rule.frequency == Frequency::Custom && args.dates.is_none() {
                draft.custom_dates = members.iter().map(|m| m.due.date_naive()).collect();
            }
            EditOutcome::Applied(app.coordinator.edit_series(series_id, &draft)?)
        }
    };

    if let EditOutcome::DisambiguationRequired { .. } = outcome {
        eprintln!("this changes the series rule; rerun with --scope this or --scope series");
    }
    print_json(&outcome)
}

pub fn complete(id: &str) -> CliResult {
    let mut app = App::open()?;
    let id = parse_id(id)?;
    report(id, app.coordinator.complete(id)?)
}

pub fn uncomplete(id: &str) -> CliResult {
    let mut app = App::open()?;
    let id = parse_id(id)?;
    report(id, app.coordinator.uncomplete(id)?)
}

pub fn snooze(id: &str, minutes: Option<u32>) -> CliResult {
    let mut app = App::open()?;
    let id = parse_id(id)?;
    let minutes = minutes.unwrap_or(app.config.notifications.snooze_minutes);
    report(id, app.coordinator.snooze(id, minutes)?)
}

pub fn delete(args: DeleteArgs) -> CliResult {
    let mut app = App::open()?;
    let id = parse_id(&args.id)?;
    let outcome = if args.series {
        let existing = find(&app, id)?;
        match existing.series_id {
            Some(series_id) => app.coordinator.delete_series(series_id)?,
            None => app.coordinator.delete_occurrence(id)?,
        }
    } else if args.future {
        app.coordinator.delete_future_from(id)?
    } else {
        app.coordinator.delete_occurrence(id)?
    };
    report(id, outcome)
}

/// Occurrence by id, or a not-found error.
pub(crate) fn find(app: &App, id: OccurrenceId) -> CliResult<Occurrence> {
    Ok(app
        .coordinator
        .store()
        .get(id)?
        .ok_or_else(|| CoreError::not_found(id))?)
}

/// Print the outcome; an empty one means the id was unknown.
pub(crate) fn report(id: OccurrenceId, outcome: MutationOutcome) -> CliResult {
    if outcome.is_noop() {
        return Err(CoreError::not_found(id).into());
    }
    print_json(&outcome)
}

/// A standalone reminder promoted into a series needs a count and dates.
fn fill_promotion_defaults(
    app: &App,
    draft: &mut ReminderDraft,
    args: &EditArgs,
    existing: &Occurrence,
) -> CliResult {
    if existing.series_id.is_some() && args.scope == EditScope::Auto {
        return Ok(());
    }
    if draft.rule.frequency.is_fixed_interval() {
        draft.count = args.count.unwrap_or(app.config.series.default_count);
    }
    if draft.rule.frequency == Frequency::Custom && draft.custom_dates.is_empty() {
        draft.custom_dates = vec![draft.due.date_naive()];
    }
    Ok(())
}
