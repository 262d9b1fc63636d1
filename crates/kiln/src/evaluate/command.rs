use kiln_core::RequestIndex;
use serde::{Deserialize, Serialize};

use crate::service::{Result, ServiceError, require};

/// What an evaluation board visualizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EvaluateKind {
    /// Board over the user's own aim logs
    Custom { aim_path: String },
    /// Board comparing hyperparameter sweeps from training logs
    Standard {
        log_path: String,
        #[serde(default)]
        momentum_scope: Vec<String>,
        #[serde(default)]
        batch_size_scope: Vec<String>,
        #[serde(default)]
        learning_rate_scope: Vec<String>,
    },
}

impl EvaluateKind {
    pub fn path(&self) -> &str {
        match self {
            EvaluateKind::Custom { aim_path } => aim_path,
            EvaluateKind::Standard { log_path, .. } => log_path,
        }
    }
}

/// Request to evaluate a finished training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateCreateCmd {
    pub project_owner: String,
    pub project_id: String,
    pub training_id: String,
    #[serde(flatten)]
    pub kind: EvaluateKind,
}

impl EvaluateCreateCmd {
    pub fn validate(&self) -> Result<()> {
        require("project_owner", &self.project_owner)?;
        require("project_id", &self.project_id)?;
        require("training_id", &self.training_id)?;
        require("path", self.kind.path())?;

        if let EvaluateKind::Standard {
            momentum_scope,
            batch_size_scope,
            learning_rate_scope,
            ..
        } = &self.kind
        {
            let scopes = [momentum_scope, batch_size_scope, learning_rate_scope];
            if scopes.iter().any(|s| s.iter().any(|v| v.trim().is_empty())) {
                return Err(ServiceError::InvalidInput(
                    "scope values must not be blank".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn index(&self) -> Result<RequestIndex> {
        Ok(RequestIndex::evaluate(
            &self.project_owner,
            &self.project_id,
            &self.training_id,
        )?)
    }

    pub fn input(&self) -> serde_json::Value {
        serde_json::to_value(&self.kind).unwrap_or_default()
    }
}
