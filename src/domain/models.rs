use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub type UserId = String;

const NEGATIVE_MOODS: [&str; 5] = ["awful", "bad", "sad", "down", "very_sad"];
const POOR_SLEEP: [&str; 3] = ["poor", "fair", "poorly"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SeniorField {
    BrainGamesEnabled,
    HealthQuizEnabled,
}

impl SeniorField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BrainGamesEnabled => "brainGamesEnabled",
            Self::HealthQuizEnabled => "healthQuizEnabled",
        }
    }
}

/// How concurrent writes to one toggle are ordered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Every request is applied in issue order, one at a time.
    #[default]
    Serialized,
    /// Requests made while a write is in flight collapse into the latest one.
    Coalescing,
}

impl WritePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "serialized" => Some(Self::Serialized),
            "coalescing" => Some(Self::Coalescing),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serialized => "serialized",
            Self::Coalescing => "coalescing",
        }
    }
}

/// Per-senior settings document. Toggle fields are optional because older
/// documents predate the flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeniorState {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub brain_games_enabled: Option<bool>,
    #[serde(default)]
    pub health_quiz_enabled: Option<bool>,
}

impl SeniorState {
    pub fn field(&self, field: SeniorField) -> Option<bool> {
        match field {
            SeniorField::BrainGamesEnabled => self.brain_games_enabled,
            SeniorField::HealthQuizEnabled => self.health_quiz_enabled,
        }
    }

    pub fn set_field(&mut self, field: SeniorField, value: bool) {
        match field {
            SeniorField::BrainGamesEnabled => self.brain_games_enabled = Some(value),
            SeniorField::HealthQuizEnabled => self.health_quiz_enabled = Some(value),
        }
    }

    pub fn start_day(&self, tz: &Tz) -> Option<NaiveDate> {
        self.start_date
            .map(|start| start.with_timezone(tz).date_naive())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChipKind {
    Mood,
    Sleep,
    Energy,
    Medication,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckInChip {
    pub kind: ChipKind,
    pub value: String,
}

fn default_scheduled_count() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub sleep: Option<String>,
    #[serde(default)]
    pub energy: Option<String>,
    #[serde(default)]
    pub medication: Option<String>,
    #[serde(default = "default_scheduled_count")]
    pub scheduled_count: u32,
    #[serde(default)]
    pub scheduled_for: Vec<String>,
}

impl CheckInRecord {
    pub fn new(timestamp: DateTime<Utc>, scheduled_count: u32) -> Self {
        Self {
            timestamp,
            mood: None,
            sleep: None,
            energy: None,
            medication: None,
            scheduled_count,
            scheduled_for: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for slot in &self.scheduled_for {
            validate_non_empty(slot, "check_in.scheduled_for[]")?;
        }
        Ok(())
    }

    pub fn local_date(&self, tz: &Tz) -> NaiveDate {
        self.timestamp.with_timezone(tz).date_naive()
    }

    pub fn has_negative_mood(&self) -> bool {
        present(&self.mood)
            .map(|mood| NEGATIVE_MOODS.iter().any(|candidate| candidate.eq_ignore_ascii_case(mood)))
            .unwrap_or(false)
    }

    pub fn has_poor_sleep(&self) -> bool {
        present(&self.sleep)
            .map(|sleep| POOR_SLEEP.iter().any(|candidate| candidate.eq_ignore_ascii_case(sleep)))
            .unwrap_or(false)
    }

    pub fn has_issues(&self) -> bool {
        self.has_negative_mood() || self.has_poor_sleep()
    }

    pub fn chips(&self) -> Vec<CheckInChip> {
        [
            (ChipKind::Mood, &self.mood),
            (ChipKind::Sleep, &self.sleep),
            (ChipKind::Energy, &self.energy),
            (ChipKind::Medication, &self.medication),
        ]
        .into_iter()
        .filter_map(|(kind, value)| {
            present(value).map(|value| CheckInChip {
                kind,
                value: value.to_string(),
            })
        })
        .collect()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
