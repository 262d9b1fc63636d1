use async_trait::async_trait;
use kiln_core::{InstanceId, JobHandle, RequestIndex};
use serde::{Deserialize, Serialize};

use super::Result;

/// Everything the platform needs to provision one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub index: RequestIndex,
    pub instance_id: InstanceId,
    pub input: serde_json::Value,
}

/// Narrow contract of the external execution platform
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Ask the platform to start a job for an instance
    async fn create_job(
        &self,
        endpoint: &str,
        owner: &str,
        request: &ProvisionRequest,
    ) -> Result<JobHandle>;

    /// Delete a job; a job the platform no longer knows counts as deleted
    async fn delete_job(&self, endpoint: &str, job_id: &str) -> Result<()>;

    /// Stop a running job
    async fn terminate_job(&self, endpoint: &str, job_id: &str) -> Result<()>;

    /// Push the exit time of a running instance
    async fn extend_expiry(&self, endpoint: &str, job_id: &str, expiry: i64) -> Result<()>;

    /// Link to download the full job log
    async fn log_download_url(&self, endpoint: &str, job_id: &str) -> Result<String>;

    /// Link to preview the tail of the job log
    async fn log_preview_url(&self, endpoint: &str, job_id: &str) -> Result<String>;

    /// Whether a reported status is final
    fn is_job_done(&self, status: &str) -> bool;

    /// Whether a job in this status may be terminated
    fn can_terminate(&self, status: &str) -> bool;
}

/// Status vocabulary of a platform deployment
#[derive(Debug, Clone, Default)]
pub struct JobStatusRules {
    done: std::collections::HashSet<String>,
    terminable: std::collections::HashSet<String>,
}

impl JobStatusRules {
    pub fn new<D, T>(done: D, terminable: T) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            done: done.into_iter().map(Into::into).collect(),
            terminable: terminable.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_done(&self, status: &str) -> bool {
        self.done.contains(status)
    }

    pub fn can_terminate(&self, status: &str) -> bool {
        self.terminable.contains(status)
    }
}
