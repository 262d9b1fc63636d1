use async_trait::async_trait;
use kiln_core::JobHandle;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{JobStatusRules, PlatformClient, PlatformError, ProvisionRequest, Result};

#[derive(Serialize)]
struct CreateJobBody<'a> {
    owner: &'a str,
    #[serde(flatten)]
    request: &'a ProvisionRequest,
}

#[derive(Deserialize)]
struct CreateJobResponse {
    job_id: String,
}

#[derive(Serialize)]
struct ExtendExpiryBody {
    expiry: i64,
}

#[derive(Deserialize)]
struct UrlResponse {
    url: String,
}

/// Execution platform reached over its REST API.
///
/// Every call is addressed to the endpoint recorded with the job, so one
/// client serves any number of training centers.
#[derive(Clone)]
pub struct HttpPlatformClient {
    client: reqwest::Client,
    rules: JobStatusRules,
}

impl HttpPlatformClient {
    pub fn new(rules: JobStatusRules, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Unavailable(format!("Failed to build client: {}", e)))?;

        Ok(Self { client, rules })
    }

    fn job_url(endpoint: &str, job_id: &str) -> String {
        format!("{}/v1/jobs/{}", endpoint.trim_end_matches('/'), job_id)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => PlatformError::NotFound(body),
            s if s.is_client_error() => PlatformError::Rejected(format!("{}: {}", s, body)),
            s => PlatformError::Unavailable(format!("{}: {}", s, body)),
        })
    }

    async fn fetch_url(&self, url: String) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let body: UrlResponse = Self::check(response).await?.json().await?;
        Ok(body.url)
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn create_job(
        &self,
        endpoint: &str,
        owner: &str,
        request: &ProvisionRequest,
    ) -> Result<JobHandle> {
        let url = format!("{}/v1/jobs", endpoint.trim_end_matches('/'));
        tracing::debug!("creating job for {} at {}", request.index, url);

        let response = self
            .client
            .post(url)
            .json(&CreateJobBody { owner, request })
            .send()
            .await?;
        let body: CreateJobResponse = Self::check(response).await?.json().await?;

        Ok(JobHandle::new(endpoint, body.job_id))
    }

    async fn delete_job(&self, endpoint: &str, job_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(Self::job_url(endpoint, job_id))
            .send()
            .await?;

        match Self::check(response).await {
            Ok(_) | Err(PlatformError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn terminate_job(&self, endpoint: &str, job_id: &str) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/terminate", Self::job_url(endpoint, job_id)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn extend_expiry(&self, endpoint: &str, job_id: &str, expiry: i64) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/expiry", Self::job_url(endpoint, job_id)))
            .json(&ExtendExpiryBody { expiry })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn log_download_url(&self, endpoint: &str, job_id: &str) -> Result<String> {
        self.fetch_url(format!("{}/log", Self::job_url(endpoint, job_id)))
            .await
    }

    async fn log_preview_url(&self, endpoint: &str, job_id: &str) -> Result<String> {
        self.fetch_url(format!("{}/log/preview", Self::job_url(endpoint, job_id)))
            .await
    }

    fn is_job_done(&self, status: &str) -> bool {
        self.rules.is_done(status)
    }

    fn can_terminate(&self, status: &str) -> bool {
        self.rules.can_terminate(status)
    }
}
