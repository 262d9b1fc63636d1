use kiln_core::RequestIndex;
use serde::{Deserialize, Serialize};

use crate::service::{Result, require};

/// Request to serve a project revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceCreateCmd {
    pub project_owner: String,
    pub project_id: String,
    pub project_name: String,
    /// Commit the instance is built from
    pub last_commit: String,
    pub inference_dir: String,
    pub boot_file: String,
}

impl InferenceCreateCmd {
    pub fn validate(&self) -> Result<()> {
        require("project_owner", &self.project_owner)?;
        require("project_id", &self.project_id)?;
        require("project_name", &self.project_name)?;
        require("last_commit", &self.last_commit)?;
        require("inference_dir", &self.inference_dir)?;
        require("boot_file", &self.boot_file)
    }

    pub fn index(&self) -> Result<RequestIndex> {
        Ok(RequestIndex::inference(
            &self.project_owner,
            &self.project_id,
            &self.last_commit,
        )?)
    }

    /// Provisioning input recorded on the instance
    pub fn input(&self) -> serde_json::Value {
        serde_json::json!({
            "project_name": self.project_name,
            "inference_dir": self.inference_dir,
            "boot_file": self.boot_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd() -> InferenceCreateCmd {
        InferenceCreateCmd {
            project_owner: "alice".to_string(),
            project_id: "p1".to_string(),
            project_name: "demo".to_string(),
            last_commit: "abc".to_string(),
            inference_dir: "inference".to_string(),
            boot_file: "app.py".to_string(),
        }
    }

    #[test]
    fn test_index_uses_commit_as_fingerprint() {
        let index = cmd().index().unwrap();
        assert_eq!(index, RequestIndex::inference("alice", "p1", "abc").unwrap());
    }

    #[test]
    fn test_missing_boot_file_is_rejected() {
        let mut cmd = cmd();
        cmd.boot_file = " ".to_string();
        assert!(cmd.validate().is_err());
    }
}
