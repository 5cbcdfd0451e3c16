use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};

/// Canonical weekday keys for the report week. The set is fixed: a report
/// always carries exactly one narrative per weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Weekday::Monday => 0,
            Weekday::Tuesday => 1,
            Weekday::Wednesday => 2,
            Weekday::Thursday => 3,
            Weekday::Friday => 4,
            Weekday::Saturday => 5,
            Weekday::Sunday => 6,
        }
    }

    /// Parses a weekday name, case-insensitively. An unrecognized name is a
    /// caller mistake, not a retryable condition.
    pub fn parse(name: &str) -> Result<Weekday> {
        let lower = name.trim().to_ascii_lowercase();
        Weekday::ALL
            .into_iter()
            .find(|day| day.as_str().to_ascii_lowercase() == lower)
            .ok_or_else(|| ReportError::UnknownWeekday(name.to_string()))
    }
}

/// Fixed severity vocabulary attached to each day's narrative.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityCode {
    #[default]
    Normal,
    Advisory,
    Elevated,
    Critical,
}

impl SecurityCode {
    pub fn label(self) -> &'static str {
        match self {
            SecurityCode::Normal => "Normal",
            SecurityCode::Advisory => "Advisory",
            SecurityCode::Elevated => "Elevated",
            SecurityCode::Critical => "Critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeStatus {
    #[default]
    ToUpdate,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyNarrative {
    pub day: Weekday,
    pub content: String,
    pub status: NarrativeStatus,
    pub code: SecurityCode,
}

impl DailyNarrative {
    fn empty(day: Weekday) -> Self {
        Self {
            day,
            content: String::new(),
            status: NarrativeStatus::ToUpdate,
            code: SecurityCode::Normal,
        }
    }

    /// An entry with empty content is incomplete regardless of its status.
    pub fn is_complete(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Seven day-keyed narrative entries, always fully populated. Updating one
/// day never touches the other six.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSet {
    entries: [DailyNarrative; 7],
}

impl Default for NarrativeSet {
    fn default() -> Self {
        Self {
            entries: Weekday::ALL.map(DailyNarrative::empty),
        }
    }
}

impl NarrativeSet {
    pub fn set_day(
        &mut self,
        day: Weekday,
        content: impl Into<String>,
        status: NarrativeStatus,
        code: SecurityCode,
    ) {
        let entry = &mut self.entries[day.index()];
        entry.content = content.into();
        entry.status = status;
        entry.code = code;
    }

    /// String-keyed variant used at API boundaries where the day arrives as
    /// free text.
    pub fn set_day_named(
        &mut self,
        day: &str,
        content: impl Into<String>,
        status: NarrativeStatus,
        code: SecurityCode,
    ) -> Result<()> {
        let day = Weekday::parse(day)?;
        self.set_day(day, content, status, code);
        Ok(())
    }

    pub fn day(&self, day: Weekday) -> &DailyNarrative {
        &self.entries[day.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &DailyNarrative> {
        self.entries.iter()
    }

    pub fn completed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_complete()).count()
    }

    pub fn completion_ratio(&self) -> f64 {
        self.completed_count() as f64 / 7.0
    }
}
