//! Identity types shared by every broker flavor

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

use crate::{CoreError, Result};

/// Kind of compute instance a request asks for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Flavor {
    /// Online inference service for a project revision
    Inference,
    /// Evaluation board for a finished training
    Evaluate,
    /// Fine-tuning job on a foundation model
    Finetune,
    /// Full training job for a project
    Training,
}

impl Flavor {
    pub const ALL: [Flavor; 4] = [
        Flavor::Inference,
        Flavor::Evaluate,
        Flavor::Finetune,
        Flavor::Training,
    ];

    /// Job flavors carry a platform job handle and a status lifecycle
    pub fn is_job(&self) -> bool {
        matches!(self, Flavor::Finetune | Flavor::Training)
    }
}

/// NewType pattern for instance identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create a new InstanceId
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// De-duplication key for a family of instances.
///
/// Two requests with an equal index are candidates for sharing one instance.
/// The fingerprint pins the content the instance was built from (the last
/// commit for inference, the training id for evaluation); job flavors keep
/// one document per owner and parent and leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestIndex {
    pub flavor: Flavor,
    pub owner: String,
    pub parent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl RequestIndex {
    /// Create a validated index
    pub fn new(
        flavor: Flavor,
        owner: impl Into<String>,
        parent_id: impl Into<String>,
        fingerprint: Option<String>,
    ) -> Result<Self> {
        let index = Self {
            flavor,
            owner: owner.into(),
            parent_id: parent_id.into(),
            fingerprint: fingerprint.filter(|f| !f.is_empty()),
        };
        index.validate()?;
        Ok(index)
    }

    pub fn inference(
        owner: impl Into<String>,
        project_id: impl Into<String>,
        last_commit: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            Flavor::Inference,
            owner,
            project_id,
            Some(last_commit.into()),
        )
    }

    pub fn evaluate(
        owner: impl Into<String>,
        project_id: impl Into<String>,
        training_id: impl Into<String>,
    ) -> Result<Self> {
        Self::new(Flavor::Evaluate, owner, project_id, Some(training_id.into()))
    }

    pub fn training(owner: impl Into<String>, project_id: impl Into<String>) -> Result<Self> {
        Self::new(Flavor::Training, owner, project_id, None)
    }

    /// Fine-tune jobs are scoped to the user, so the owner is also the parent
    pub fn finetune(owner: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        Self::new(Flavor::Finetune, owner.clone(), owner, None)
    }

    /// Check the shape required by the flavor
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(CoreError::InvalidIndex("owner is empty".to_string()));
        }
        if self.parent_id.trim().is_empty() {
            return Err(CoreError::InvalidIndex("parent id is empty".to_string()));
        }
        match (self.flavor.is_job(), &self.fingerprint) {
            (false, None) => Err(CoreError::InvalidIndex(format!(
                "{} index requires a fingerprint",
                self.flavor
            ))),
            (true, Some(_)) => Err(CoreError::InvalidIndex(format!(
                "{} index takes no fingerprint",
                self.flavor
            ))),
            _ => Ok(()),
        }
    }

    /// Fingerprint as stored, empty when absent
    pub fn fingerprint_key(&self) -> &str {
        self.fingerprint.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for RequestIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.flavor, self.owner, self.parent_id)?;
        if let Some(fingerprint) = &self.fingerprint {
            write!(f, "@{}", fingerprint)?;
        }
        Ok(())
    }
}

/// Handle of a job created on the execution platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub endpoint: String,
    pub job_id: String,
}

impl JobHandle {
    pub fn new(endpoint: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            job_id: job_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_round_trips_through_strings() {
        assert_eq!(Flavor::Finetune.to_string(), "finetune");
        assert_eq!("evaluate".parse::<Flavor>().unwrap(), Flavor::Evaluate);
        assert!("notebook".parse::<Flavor>().is_err());
    }

    #[test]
    fn test_index_shape_is_checked_per_flavor() {
        assert!(RequestIndex::inference("alice", "p1", "abc").is_ok());
        assert!(RequestIndex::inference("alice", "p1", "").is_err());
        assert!(RequestIndex::training("", "p1").is_err());
        assert!(
            RequestIndex::new(Flavor::Training, "alice", "p1", Some("x".to_string())).is_err()
        );

        let finetune = RequestIndex::finetune("bob").unwrap();
        assert_eq!(finetune.parent_id, "bob");
        assert_eq!(finetune.fingerprint_key(), "");
    }

    #[test]
    fn test_index_display() {
        let index = RequestIndex::inference("alice", "p1", "abc").unwrap();
        assert_eq!(index.to_string(), "inference:alice/p1@abc");
    }
}
