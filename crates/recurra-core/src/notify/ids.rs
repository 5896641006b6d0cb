//! Stable notification identifiers.
//!
//! `occurrence:<id>` for the primary request and
//! `occurrence:<id>:followup:<n>` for the n-th follow-up. Derived purely from
//! the occurrence id, so cancelling needs no stored state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;
use crate::reminder::OccurrenceId;

const PREFIX: &str = "occurrence";
const FOLLOW_UP: &str = "followup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId {
    pub occurrence_id: OccurrenceId,
    /// 0 for the primary request, 1..=N for follow-ups.
    pub sequence: u32,
}

impl NotificationId {
    pub fn primary(occurrence_id: OccurrenceId) -> Self {
        Self {
            occurrence_id,
            sequence: 0,
        }
    }

    pub fn follow_up(occurrence_id: OccurrenceId, n: u32) -> Self {
        Self {
            occurrence_id,
            sequence: n,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.sequence == 0
    }

    /// Primary id followed by follow-up ids `1..=count`.
    pub fn all_for(occurrence_id: OccurrenceId, follow_up_count: u32) -> Vec<Self> {
        std::iter::once(Self::primary(occurrence_id))
            .chain((1..=follow_up_count).map(|n| Self::follow_up(occurrence_id, n)))
            .collect()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sequence == 0 {
            write!(f, "{PREFIX}:{}", self.occurrence_id)
        } else {
            write!(f, "{PREFIX}:{}:{FOLLOW_UP}:{}", self.occurrence_id, self.sequence)
        }
    }
}

impl FromStr for NotificationId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ValidationError::MalformedId(s.to_string());
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [PREFIX, id] => Ok(Self::primary(id.parse().map_err(|_| malformed())?)),
            [PREFIX, id, FOLLOW_UP, n] => {
                let n: u32 = n.parse().map_err(|_| malformed())?;
                if n == 0 {
                    return Err(malformed());
                }
                Ok(Self::follow_up(id.parse().map_err(|_| malformed())?, n))
            }
            _ => Err(malformed()),
        }
    }
}

impl Serialize for NotificationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
