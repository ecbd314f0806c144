use std::fmt::{Display, Formatter};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Day of week keyed the way the snapshot reports were written: day 1 is
/// Sunday and labels are two letters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum Weekday {
    #[serde(rename = "Su")]
    #[schemars(rename = "Su")]
    Sunday,
    #[serde(rename = "Mo")]
    #[schemars(rename = "Mo")]
    Monday,
    #[serde(rename = "Tu")]
    #[schemars(rename = "Tu")]
    Tuesday,
    #[serde(rename = "We")]
    #[schemars(rename = "We")]
    Wednesday,
    #[serde(rename = "Th")]
    #[schemars(rename = "Th")]
    Thursday,
    #[serde(rename = "Fr")]
    #[schemars(rename = "Fr")]
    Friday,
    #[serde(rename = "Sa")]
    #[schemars(rename = "Sa")]
    Saturday,
}

impl Weekday {
    pub const ALL: [Self; 7] = [
        Self::Sunday,
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
    ];

    /// `weekday_num` column value, 1 (Sunday) through 7 (Saturday).
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Sunday => 1,
            Self::Monday => 2,
            Self::Tuesday => 3,
            Self::Wednesday => 4,
            Self::Thursday => 5,
            Self::Friday => 6,
            Self::Saturday => 7,
        }
    }

    #[must_use]
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Sunday),
            2 => Some(Self::Monday),
            3 => Some(Self::Tuesday),
            4 => Some(Self::Wednesday),
            5 => Some(Self::Thursday),
            6 => Some(Self::Friday),
            7 => Some(Self::Saturday),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sunday => "Su",
            Self::Monday => "Mo",
            Self::Tuesday => "Tu",
            Self::Wednesday => "We",
            Self::Thursday => "Th",
            Self::Friday => "Fr",
            Self::Saturday => "Sa",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|day| day.label() == label)
    }

    /// Position in a Monday-first calendar week.
    #[must_use]
    pub const fn calendar_rank(self) -> u8 {
        match self {
            Self::Monday => 0,
            Self::Tuesday => 1,
            Self::Wednesday => 2,
            Self::Thursday => 3,
            Self::Friday => 4,
            Self::Saturday => 5,
            Self::Sunday => 6,
        }
    }
}

impl From<time::Weekday> for Weekday {
    fn from(value: time::Weekday) -> Self {
        match value {
            time::Weekday::Sunday => Self::Sunday,
            time::Weekday::Monday => Self::Monday,
            time::Weekday::Tuesday => Self::Tuesday,
            time::Weekday::Wednesday => Self::Wednesday,
            time::Weekday::Thursday => Self::Thursday,
            time::Weekday::Friday => Self::Friday,
            time::Weekday::Saturday => Self::Saturday,
        }
    }
}

impl Display for Weekday {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
