use kiln_core::{Clock, DetailPatch, Flavor, Instance, InstanceId, RequestIndex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{JobCreateCmd, JobError, Result};
use crate::broker::{InstanceBroker, JobPolicy, OutcomeKind};
use crate::dispatch::{DispatchMessage, DispatchQueue};
use crate::platform::{PlatformClient, PlatformError};
use crate::store::InstanceStore;

/// Row of a job listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: InstanceId,
    pub name: String,
    pub status: Option<String>,
    pub error: Option<String>,
    pub duration: i64,
    pub created_at: i64,
    pub is_done: bool,
}

/// One job with everything needed to inspect it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub description: Option<String>,
    pub config: serde_json::Value,
    pub log_preview_url: Option<String>,
    pub has_log: bool,
    pub has_output: bool,
}

/// Long-running jobs (fine-tuning, training) on top of the generic broker.
///
/// One unfinished job per document; finished ones are kept up to the record
/// limit and removed explicitly by their owner.
#[derive(Clone)]
pub struct JobService {
    flavor: Flavor,
    broker: InstanceBroker,
    policy: JobPolicy,
    queue: Arc<dyn DispatchQueue>,
    platform: Arc<dyn PlatformClient>,
}

impl JobService {
    pub fn new(
        flavor: Flavor,
        store: Arc<dyn InstanceStore>,
        platform: Arc<dyn PlatformClient>,
        queue: Arc<dyn DispatchQueue>,
        clock: Arc<dyn Clock>,
        max_records: usize,
    ) -> Self {
        let policy = JobPolicy::new(platform.clone(), max_records);
        let broker = InstanceBroker::new(store, Arc::new(policy.clone()), clock);

        Self {
            flavor,
            broker,
            policy,
            queue,
            platform,
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn policy(&self) -> &JobPolicy {
        &self.policy
    }

    fn store(&self) -> &Arc<dyn InstanceStore> {
        self.broker.store()
    }

    fn check_flavor(&self, index: &RequestIndex) -> Result<()> {
        if index.flavor != self.flavor {
            return Err(JobError::InvalidInput(format!(
                "{} index given to the {} service",
                index.flavor, self.flavor
            )));
        }
        Ok(())
    }

    /// Start a job unless another one is still running
    pub async fn create(&self, index: &RequestIndex, cmd: &JobCreateCmd) -> Result<Instance> {
        self.check_flavor(index)?;
        cmd.validate()?;

        let outcome = self.broker.create_or_reuse(index, cmd.input()).await?;
        if outcome.kind != OutcomeKind::Created {
            return Err(JobError::RunningJobExists(outcome.instance.id));
        }

        let id = &outcome.instance.id;
        let message = DispatchMessage::provision(index.clone(), id.clone());
        if let Err(e) = self.queue.publish(message).await {
            let mut patch = DetailPatch::failed(e.to_string());
            patch.status = Some(kiln_core::STATUS_SCHEDULE_FAILED.to_string());
            self.store().update_detail(index, id, &patch).await?;
            return Err(e.into());
        }

        tracing::info!("{} job {} created for {}", self.flavor, id, index);
        Ok(outcome.instance)
    }

    /// Start a new job with the configuration of an earlier one
    pub async fn recreate(&self, index: &RequestIndex, id: &InstanceId) -> Result<Instance> {
        let previous = self.store().find_instance(index, id).await?;
        let cmd = JobCreateCmd::from_input(&previous.input)?.rerun(self.broker.clock().now());
        self.create(index, &cmd).await
    }

    /// Jobs of a document, newest first
    pub async fn list(&self, index: &RequestIndex) -> Result<Vec<JobSummary>> {
        self.check_flavor(index)?;
        let snapshot = self.store().find_instances(index).await?;

        Ok(snapshot
            .instances
            .iter()
            .rev()
            .map(|i| self.summary(i))
            .collect())
    }

    pub async fn get(&self, index: &RequestIndex, id: &InstanceId) -> Result<JobDetail> {
        let instance = self.store().find_instance(index, id).await?;

        let log_preview_url = match &instance.job {
            Some(job) => match self
                .platform
                .log_preview_url(&job.endpoint, &job.job_id)
                .await
            {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!("no log preview for {}: {}", id, e);
                    None
                }
            },
            None => None,
        };

        let cmd = JobCreateCmd::from_input(&instance.input).ok();
        Ok(JobDetail {
            summary: self.summary(&instance),
            description: cmd.as_ref().and_then(|c| c.description.clone()),
            config: cmd.map(|c| c.config).unwrap_or_default(),
            log_preview_url,
            has_log: instance.detail.log_path.is_some(),
            has_output: instance.detail.output_path.is_some(),
        })
    }

    /// Remove a job and its platform counterpart; deleting twice is fine
    pub async fn delete(&self, index: &RequestIndex, id: &InstanceId) -> Result<()> {
        let instance = match self.store().find_instance(index, id).await {
            Ok(instance) => instance,
            Err(crate::store::StoreError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if let Some(job) = &instance.job {
            match self.platform.delete_job(&job.endpoint, &job.job_id).await {
                Ok(()) | Err(PlatformError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        match self.store().remove_instance(index, id).await {
            Ok(()) | Err(crate::store::StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!("{} job {} deleted", self.flavor, id);
        Ok(())
    }

    /// Stop a running job
    pub async fn terminate(&self, index: &RequestIndex, id: &InstanceId) -> Result<()> {
        let instance = self.store().find_instance(index, id).await?;
        let Some(job) = &instance.job else {
            return Ok(());
        };

        let status = instance.status().unwrap_or_default();
        if !self.platform.can_terminate(status) {
            return Err(JobError::CannotTerminate(id.clone(), status.to_string()));
        }

        self.platform.terminate_job(&job.endpoint, &job.job_id).await?;
        tracing::info!("{} job {} terminated", self.flavor, id);
        Ok(())
    }

    pub async fn log_download_url(&self, index: &RequestIndex, id: &InstanceId) -> Result<String> {
        let instance = self.store().find_instance(index, id).await?;
        match (&instance.job, &instance.detail.log_path) {
            (Some(job), Some(_)) => Ok(self
                .platform
                .log_download_url(&job.endpoint, &job.job_id)
                .await?),
            _ => Err(JobError::NotReady(id.clone(), "log")),
        }
    }

    fn summary(&self, instance: &Instance) -> JobSummary {
        let name = instance
            .input
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();

        JobSummary {
            id: instance.id.clone(),
            name,
            status: instance.detail.status.clone(),
            error: instance.detail.error.clone(),
            duration: instance.detail.duration,
            created_at: instance.created_at,
            is_done: self.policy.is_done(instance),
        }
    }
}
