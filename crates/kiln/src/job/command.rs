use serde::{Deserialize, Serialize};

use super::{JobError, Result};

const MAX_NAME_LEN: usize = 50;

/// Request to start a fine-tuning or training job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCreateCmd {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Platform specific job configuration, passed through untouched
    #[serde(default)]
    pub config: serde_json::Value,
}

impl JobCreateCmd {
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(JobError::InvalidInput("name is required".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(JobError::InvalidInput(format!(
                "name is longer than {} characters",
                MAX_NAME_LEN
            )));
        }
        if !self.config.is_null() && !self.config.is_object() {
            return Err(JobError::InvalidInput("config must be an object".to_string()));
        }
        Ok(())
    }

    pub fn input(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Read a command back from the input recorded on an instance
    pub fn from_input(input: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(input.clone())
            .map_err(|e| JobError::InvalidInput(format!("stored job input: {}", e)))
    }

    /// Copy for a re-run, named apart from the original
    pub fn rerun(&self, now: i64) -> Self {
        Self {
            name: format!("{}-{}", self.name, now),
            ..self.clone()
        }
    }
}
