use crate::domain::models::{CheckInRecord, SeniorField, SeniorState};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::Datelike;
use std::collections::HashMap;
use std::sync::Mutex;

/// Remote document store holding the senior profile and check-in records.
#[async_trait]
pub trait SeniorStore: Send + Sync {
    /// `Ok(None)` when no document exists for the user yet.
    async fn get_senior_state(&self, user_id: &str) -> Result<Option<SeniorState>, InfraError>;

    async fn get_check_ins_for_month(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<CheckInRecord>, InfraError>;

    /// Merges a single field into the user's document without touching its
    /// siblings, creating the document if it does not exist.
    async fn update_senior_field(
        &self,
        user_id: &str,
        field: SeniorField,
        value: bool,
    ) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemorySeniorStore {
    seniors: Mutex<HashMap<String, SeniorState>>,
    check_ins: Mutex<HashMap<String, Vec<CheckInRecord>>>,
}

impl InMemorySeniorStore {
    fn normalized_id(user_id: &str) -> Option<String> {
        let normalized = user_id.trim();
        if normalized.is_empty() {
            return None;
        }
        Some(normalized.to_string())
    }

    pub fn put_senior_state(&self, user_id: &str, state: SeniorState) -> Result<(), InfraError> {
        let user_id = Self::normalized_id(user_id)
            .ok_or_else(|| InfraError::InvalidRecord("user id is required".to_string()))?;
        let mut seniors = self
            .seniors
            .lock()
            .map_err(|error| InfraError::Transport(format!("senior store lock poisoned: {error}")))?;
        seniors.insert(user_id, state);
        Ok(())
    }

    pub fn add_check_in(&self, user_id: &str, record: CheckInRecord) -> Result<(), InfraError> {
        let user_id = Self::normalized_id(user_id)
            .ok_or_else(|| InfraError::InvalidRecord("user id is required".to_string()))?;
        record.validate().map_err(InfraError::InvalidRecord)?;
        let mut check_ins = self
            .check_ins
            .lock()
            .map_err(|error| InfraError::Transport(format!("check-in store lock poisoned: {error}")))?;
        check_ins.entry(user_id).or_default().push(record);
        Ok(())
    }
}

#[async_trait]
impl SeniorStore for InMemorySeniorStore {
    async fn get_senior_state(&self, user_id: &str) -> Result<Option<SeniorState>, InfraError> {
        let Some(user_id) = Self::normalized_id(user_id) else {
            return Ok(None);
        };
        let seniors = self
            .seniors
            .lock()
            .map_err(|error| InfraError::Transport(format!("senior store lock poisoned: {error}")))?;
        Ok(seniors.get(&user_id).cloned())
    }

    async fn get_check_ins_for_month(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<CheckInRecord>, InfraError> {
        let Some(user_id) = Self::normalized_id(user_id) else {
            return Ok(Vec::new());
        };
        let check_ins = self
            .check_ins
            .lock()
            .map_err(|error| InfraError::Transport(format!("check-in store lock poisoned: {error}")))?;
        Ok(check_ins
            .get(&user_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| {
                        record.timestamp.year() == year && record.timestamp.month() == month
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_senior_field(
        &self,
        user_id: &str,
        field: SeniorField,
        value: bool,
    ) -> Result<(), InfraError> {
        let user_id = Self::normalized_id(user_id).ok_or(InfraError::NotAuthenticated)?;
        let mut seniors = self
            .seniors
            .lock()
            .map_err(|error| InfraError::Transport(format!("senior store lock poisoned: {error}")))?;
        seniors.entry(user_id).or_default().set_field(field, value);
        Ok(())
    }
}
