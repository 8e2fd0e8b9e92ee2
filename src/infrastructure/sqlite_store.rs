use crate::domain::calendar::MonthView;
use crate::domain::models::{CheckInRecord, SeniorField, SeniorState};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::senior_store::SeniorStore;
use crate::infrastructure::storage::open_database;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SqliteSeniorStore {
    db_path: PathBuf,
}

impl SqliteSeniorStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_database(&self.db_path)
    }

    pub fn put_senior_state(&self, user_id: &str, state: &SeniorState) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO senior_state (user_id, start_date, brain_games_enabled, health_quiz_enabled)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
               start_date = excluded.start_date,
               brain_games_enabled = excluded.brain_games_enabled,
               health_quiz_enabled = excluded.health_quiz_enabled",
            params![
                user_id,
                state.start_date.map(timestamp_key),
                state.brain_games_enabled,
                state.health_quiz_enabled
            ],
        )?;
        Ok(())
    }

    pub fn insert_check_in(&self, user_id: &str, record: &CheckInRecord) -> Result<(), InfraError> {
        record.validate().map_err(InfraError::InvalidRecord)?;
        let scheduled_for = serde_json::to_string(&record.scheduled_for)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO check_ins
               (user_id, timestamp, mood, sleep, energy, medication, scheduled_count, scheduled_for)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user_id,
                timestamp_key(record.timestamp),
                record.mood,
                record.sleep,
                record.energy,
                record.medication,
                record.scheduled_count,
                scheduled_for
            ],
        )?;
        Ok(())
    }
}

fn field_column(field: SeniorField) -> &'static str {
    match field {
        SeniorField::BrainGamesEnabled => "brain_games_enabled",
        SeniorField::HealthQuizEnabled => "health_quiz_enabled",
    }
}

// Fixed-width UTC keys keep lexicographic order equal to time order.
fn timestamp_key(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::InvalidRecord(format!("invalid {column} '{raw}': {error}")))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[async_trait]
impl SeniorStore for SqliteSeniorStore {
    async fn get_senior_state(&self, user_id: &str) -> Result<Option<SeniorState>, InfraError> {
        let connection = self.connect()?;
        let row: Option<(Option<String>, Option<bool>, Option<bool>)> = connection
            .query_row(
                "SELECT start_date, brain_games_enabled, health_quiz_enabled
                 FROM senior_state WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((start_date_raw, brain_games_enabled, health_quiz_enabled)) = row else {
            return Ok(None);
        };
        let start_date = start_date_raw
            .as_deref()
            .map(|raw| parse_timestamp(raw, "senior_state.start_date"))
            .transpose()?;

        Ok(Some(SeniorState {
            start_date,
            brain_games_enabled,
            health_quiz_enabled,
        }))
    }

    async fn get_check_ins_for_month(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<CheckInRecord>, InfraError> {
        let view = MonthView::new(year, month).map_err(InfraError::InvalidRecord)?;
        let from = timestamp_key(start_of_day(view.first_day()));
        let until = timestamp_key(start_of_day(view.next().first_day()));

        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT timestamp, mood, sleep, energy, medication, scheduled_count, scheduled_for
             FROM check_ins
             WHERE user_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
             ORDER BY timestamp",
        )?;
        let rows = statement
            .query_map(params![user_id, from, until], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(timestamp, mood, sleep, energy, medication, scheduled_count, scheduled_for)|
                 -> Result<CheckInRecord, InfraError> {
                    Ok(CheckInRecord {
                        timestamp: parse_timestamp(&timestamp, "check_ins.timestamp")?,
                        mood,
                        sleep,
                        energy,
                        medication,
                        scheduled_count,
                        scheduled_for: serde_json::from_str(&scheduled_for)?,
                    })
                },
            )
            .collect()
    }

    async fn update_senior_field(
        &self,
        user_id: &str,
        field: SeniorField,
        value: bool,
    ) -> Result<(), InfraError> {
        let column = field_column(field);
        let connection = self.connect()?;
        connection.execute(
            &format!(
                "INSERT INTO senior_state (user_id, {column}) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET {column} = excluded.{column}"
            ),
            params![user_id, value],
        )?;
        Ok(())
    }
}
