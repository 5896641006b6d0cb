//! Reminder occurrence records and the drafts callers submit.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::time::floor_to_minute;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| ValidationError::MalformedId(s.to_string()))
            }
        }
    };
}

uuid_newtype!(
    /// Identifier of a single occurrence.
    OccurrenceId
);
uuid_newtype!(
    /// Identifier shared by all members of a series.
    SeriesId
);

/// Recurrence kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// Arbitrary date set sharing one time-of-day.
    Custom,
}

impl Frequency {
    /// Daily through yearly.
    pub fn is_fixed_interval(self) -> bool {
        match self {
            Frequency::Daily | Frequency::Weekly | Frequency::Monthly | Frequency::Yearly => true,
            Frequency::None | Frequency::Custom => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::None => "none",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
            Frequency::Custom => "custom",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Frequency::None),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            "custom" => Ok(Frequency::Custom),
            other => Err(ValidationError::InvalidValue {
                field: "frequency".into(),
                message: format!("unknown frequency '{other}'"),
            }),
        }
    }
}

/// Recurrence snapshot stored on every occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Rule steps between members; only meaningful for fixed-interval kinds.
    pub interval: u32,
}

impl RecurrenceRule {
    pub const NONE: RecurrenceRule = RecurrenceRule {
        frequency: Frequency::None,
        interval: 1,
    };

    pub fn new(frequency: Frequency, interval: u32) -> Self {
        Self {
            frequency,
            interval: interval.max(1),
        }
    }

    pub fn daily(interval: u32) -> Self {
        Self::new(Frequency::Daily, interval)
    }

    pub fn weekly(interval: u32) -> Self {
        Self::new(Frequency::Weekly, interval)
    }

    pub fn monthly(interval: u32) -> Self {
        Self::new(Frequency::Monthly, interval)
    }

    pub fn yearly(interval: u32) -> Self {
        Self::new(Frequency::Yearly, interval)
    }

    pub fn custom() -> Self {
        Self::new(Frequency::Custom, 1)
    }

    pub fn is_none(&self) -> bool {
        self.frequency == Frequency::None
    }

    /// Interval clamped to at least one step.
    pub fn step(&self) -> u32 {
        self.interval.max(1)
    }

    /// Whether switching from `self` to `other` changes what defines a series.
    ///
    /// Interval is ignored for kinds that don't use it.
    pub fn defines_different_series(&self, other: &RecurrenceRule) -> bool {
        if self.frequency != other.frequency {
            return true;
        }
        self.frequency.is_fixed_interval() && self.step() != other.step()
    }
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self::NONE
    }
}

/// Secondary notifications after the primary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FollowUp {
    pub interval_minutes: u32,
    pub repeat_count: u32,
}

impl FollowUp {
    pub fn new(interval_minutes: u32, repeat_count: u32) -> Self {
        Self {
            interval_minutes,
            repeat_count,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval_minutes > 0 && self.repeat_count > 0
    }
}

/// One concrete scheduled instance of a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub title: String,
    pub due: DateTime<Utc>,
    pub completed: bool,
    pub deleted: bool,
    pub series_id: Option<SeriesId>,
    pub rule: RecurrenceRule,
    pub follow_up: FollowUp,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Occurrence {
    /// Standalone record created at `created_at`. `due` is floored to the minute.
    pub fn new(title: impl Into<String>, due: DateTime<Utc>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: OccurrenceId::new(),
            title: title.into(),
            due: floor_to_minute(due),
            completed: false,
            deleted: false,
            series_id: None,
            rule: RecurrenceRule::NONE,
            follow_up: FollowUp::default(),
            completed_at: None,
            created_at,
        }
    }

    /// Not completed and not in the bin.
    pub fn is_live(&self) -> bool {
        !self.completed && !self.deleted
    }

    /// Live and due strictly after `now`.
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.is_live() && self.due > now
    }
}

/// What the caller submits when creating or editing a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderDraft {
    pub title: String,
    pub due: DateTime<Utc>,
    pub rule: RecurrenceRule,
    /// Additional occurrences after the first one (fixed-interval rules).
    #[serde(default)]
    pub count: u32,
    /// Selected dates (custom rules).
    #[serde(default)]
    pub custom_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub follow_up: FollowUp,
}

impl ReminderDraft {
    pub fn new(title: impl Into<String>, due: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            due: floor_to_minute(due),
            rule: RecurrenceRule::NONE,
            count: 0,
            custom_dates: Vec::new(),
            follow_up: FollowUp::default(),
        }
    }

    pub fn with_rule(mut self, rule: RecurrenceRule, count: u32) -> Self {
        self.rule = rule;
        self.count = count;
        self
    }

    pub fn with_custom_dates(mut self, dates: Vec<NaiveDate>) -> Self {
        self.rule = RecurrenceRule::custom();
        self.custom_dates = dates;
        self
    }

    pub fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = follow_up;
        self
    }

    /// Draft pre-filled from an existing occurrence.
    pub fn from_occurrence(occurrence: &Occurrence) -> Self {
        Self {
            title: occurrence.title.clone(),
            due: occurrence.due,
            rule: occurrence.rule,
            count: 0,
            custom_dates: Vec::new(),
            follow_up: occurrence.follow_up,
        }
    }

    /// Reject drafts no flow can apply.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "title".into(),
                message: "title must not be empty".into(),
            });
        }
        if self.rule.frequency == Frequency::Custom && self.custom_dates.is_empty() {
            return Err(ValidationError::EmptyDateSet);
        }
        Ok(())
    }
}
