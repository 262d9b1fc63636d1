use async_trait::async_trait;
use kiln_core::JobHandle;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::{JobStatusRules, PlatformClient, PlatformError, ProvisionRequest, Result};

/// Job known to the in-memory platform
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformJob {
    pub owner: String,
    pub request: ProvisionRequest,
    pub expiry: Option<i64>,
    pub terminated: bool,
}

/// Execution platform kept in process, for local runs and tests
#[derive(Clone)]
pub struct InMemoryPlatform {
    rules: JobStatusRules,
    jobs: Arc<Mutex<HashMap<String, PlatformJob>>>,
    failures: Arc<AtomicUsize>,
    down: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryPlatform {
    pub fn new(rules: JobStatusRules) -> Self {
        Self {
            rules,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(AtomicUsize::new(0)),
            down: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Make the next `n` job creations fail as if the platform were down
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Refuse every job creation on `endpoint` until brought back up
    pub async fn set_down(&self, endpoint: &str, down: bool) {
        let mut endpoints = self.down.lock().await;
        if down {
            endpoints.insert(endpoint.to_string());
        } else {
            endpoints.remove(endpoint);
        }
    }

    pub async fn job(&self, job_id: &str) -> Option<PlatformJob> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new(JobStatusRules::default())
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    async fn create_job(
        &self,
        endpoint: &str,
        owner: &str,
        request: &ProvisionRequest,
    ) -> Result<JobHandle> {
        if self.take_failure() || self.down.lock().await.contains(endpoint) {
            return Err(PlatformError::Unavailable(format!(
                "{} is not reachable",
                endpoint
            )));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        self.jobs.lock().await.insert(
            job_id.clone(),
            PlatformJob {
                owner: owner.to_string(),
                request: request.clone(),
                expiry: None,
                terminated: false,
            },
        );

        Ok(JobHandle::new(endpoint, job_id))
    }

    async fn delete_job(&self, _endpoint: &str, job_id: &str) -> Result<()> {
        self.jobs.lock().await.remove(job_id);
        Ok(())
    }

    async fn terminate_job(&self, _endpoint: &str, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| PlatformError::NotFound(job_id.to_string()))?;
        job.terminated = true;
        Ok(())
    }

    async fn extend_expiry(&self, _endpoint: &str, job_id: &str, expiry: i64) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| PlatformError::NotFound(job_id.to_string()))?;
        job.expiry = Some(expiry);
        Ok(())
    }

    async fn log_download_url(&self, endpoint: &str, job_id: &str) -> Result<String> {
        Ok(format!("{}/logs/{}.log", endpoint, job_id))
    }

    async fn log_preview_url(&self, endpoint: &str, job_id: &str) -> Result<String> {
        Ok(format!("{}/logs/{}/preview", endpoint, job_id))
    }

    fn is_job_done(&self, status: &str) -> bool {
        self.rules.is_done(status)
    }

    fn can_terminate(&self, status: &str) -> bool {
        self.rules.can_terminate(status)
    }
}
