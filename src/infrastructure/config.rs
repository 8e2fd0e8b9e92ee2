use crate::domain::models::{SeniorField, WritePolicy};
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const TOGGLES_JSON: &str = "toggles.json";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub timezone: Tz,
    pub log_level: String,
    pub brain_games_policy: WritePolicy,
    pub health_quiz_policy: WritePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            brain_games_policy: WritePolicy::Serialized,
            health_quiz_policy: WritePolicy::Serialized,
        }
    }
}

impl AppConfig {
    pub fn write_policy(&self, field: SeniorField) -> WritePolicy {
        match field {
            SeniorField::BrainGamesEnabled => self.brain_games_policy,
            SeniorField::HealthQuizEnabled => self.health_quiz_policy,
        }
    }
}

fn toggle_key(field: SeniorField) -> &'static str {
    match field {
        SeniorField::BrainGamesEnabled => "brainGames",
        SeniorField::HealthQuizEnabled => "healthQuiz",
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "CheckIn",
                "timezone": "UTC",
                "logLevel": DEFAULT_LOG_LEVEL
            }),
        ),
        (
            TOGGLES_JSON,
            serde_json::json!({
                "schema": 1,
                "brainGames": { "writePolicy": "serialized" },
                "healthQuiz": { "writePolicy": "serialized" }
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    Ok(AppConfig {
        timezone: read_timezone(config_dir)?,
        log_level: read_log_level(config_dir)?,
        brain_games_policy: read_write_policy(config_dir, SeniorField::BrainGamesEnabled)?,
        health_quiz_policy: read_write_policy(config_dir, SeniorField::HealthQuizEnabled)?,
    })
}

pub fn read_timezone(config_dir: &Path) -> Result<Tz, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let Some(name) = app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Ok(Tz::UTC);
    };
    name.parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{name}': {error}")))
}

pub fn read_log_level(config_dir: &Path) -> Result<String, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let level = app
        .get("logLevel")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_LOG_LEVEL);
    Ok(level.to_string())
}

pub fn read_write_policy(config_dir: &Path, field: SeniorField) -> Result<WritePolicy, InfraError> {
    let toggles = read_config(&config_dir.join(TOGGLES_JSON))?;
    let Some(raw) = toggles
        .get(toggle_key(field))
        .and_then(|toggle| toggle.get("writePolicy"))
        .and_then(serde_json::Value::as_str)
    else {
        return Ok(WritePolicy::default());
    };
    WritePolicy::parse(raw).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "unknown writePolicy '{raw}' for {}",
            toggle_key(field)
        ))
    })
}

pub fn save_write_policy(
    config_dir: &Path,
    field: SeniorField,
    policy: WritePolicy,
) -> Result<(), InfraError> {
    let path = config_dir.join(TOGGLES_JSON);
    let mut toggles = read_config(&path)?;
    let object = toggles.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    let toggle = object
        .entry(toggle_key(field))
        .or_insert_with(|| serde_json::json!({}));
    let toggle_object = toggle.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "invalid {} object structure in {}",
            toggle_key(field),
            path.display()
        ))
    })?;
    toggle_object.insert(
        "writePolicy".to_string(),
        serde_json::Value::String(policy.as_str().to_string()),
    );

    let formatted = serde_json::to_string_pretty(&toggles)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}
