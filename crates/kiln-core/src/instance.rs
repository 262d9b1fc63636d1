//! Instance records and the detail patches applied to them

use serde::{Deserialize, Serialize};

use crate::{CoreError, InstanceId, JobHandle, Result};

/// Status recorded when the platform never accepted a job
pub const STATUS_SCHEDULE_FAILED: &str = "schedule_failed";

/// Fields reported by the platform after creation.
///
/// None of these are guarded by the document version: they are patched by
/// instance id and every patch is idempotent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceDetail {
    /// Unix seconds after which the instance is not handed out again, 0 while pending
    pub expiry: i64,
    pub error: Option<String>,
    pub access_url: Option<String>,

    // Job flavors only
    pub status: Option<String>,
    pub duration: i64,
    pub log_path: Option<String>,
    pub output_path: Option<String>,
}

/// One attempt to satisfy a request index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub created_at: i64,
    /// Provisioning input recorded at creation
    pub input: serde_json::Value,
    pub detail: InstanceDetail,
    pub job: Option<JobHandle>,
}

impl Instance {
    /// Create a pending instance
    pub fn pending(input: serde_json::Value, now: i64) -> Self {
        Self {
            id: InstanceId::new(),
            created_at: now,
            input,
            detail: InstanceDetail::default(),
            job: None,
        }
    }

    pub fn is_errored(&self) -> bool {
        self.detail.error.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.detail.access_url.is_some()
    }

    /// No platform answer yet: no expiry, no access URL, no error
    pub fn is_unresolved(&self) -> bool {
        self.detail.expiry == 0 && !self.is_ready() && !self.is_errored()
    }

    /// Remaining lifetime at `now`, negative once expired
    pub fn remaining(&self, now: i64) -> i64 {
        self.detail.expiry - now
    }

    pub fn status(&self) -> Option<&str> {
        self.detail.status.as_deref()
    }

    pub fn schedule_failed(&self) -> bool {
        self.status() == Some(STATUS_SCHEDULE_FAILED)
    }
}

/// Partial update of an instance detail.
///
/// Absent fields are left untouched, so applying the same patch twice yields
/// the same record as applying it once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailPatch {
    pub error: Option<String>,
    pub access_url: Option<String>,
    pub expiry: Option<i64>,
    pub status: Option<String>,
    pub duration: Option<i64>,
    pub log_path: Option<String>,
    pub output_path: Option<String>,
}

impl DetailPatch {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn ready(access_url: impl Into<String>, expiry: i64) -> Self {
        Self {
            access_url: Some(access_url.into()),
            expiry: Some(expiry),
            ..Default::default()
        }
    }

    pub fn expiry(expiry: i64) -> Self {
        Self {
            expiry: Some(expiry),
            ..Default::default()
        }
    }

    /// Drop empty strings so they read as "not reported"
    pub fn normalized(self) -> Self {
        let keep = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            error: keep(self.error),
            access_url: keep(self.access_url),
            expiry: self.expiry,
            status: keep(self.status),
            duration: self.duration,
            log_path: keep(self.log_path),
            output_path: keep(self.output_path),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Enforce the terminal-update contract
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(CoreError::InvalidPatch("nothing to update".to_string()));
        }
        if self.error.is_some() && self.access_url.is_some() {
            return Err(CoreError::InvalidPatch(
                "error and access url are mutually exclusive".to_string(),
            ));
        }
        if self.access_url.is_some() && self.expiry.unwrap_or(0) <= 0 {
            return Err(CoreError::InvalidPatch(
                "access url requires an expiry".to_string(),
            ));
        }
        if self.expiry.is_some_and(|e| e < 0) || self.duration.is_some_and(|d| d < 0) {
            return Err(CoreError::InvalidPatch(
                "expiry and duration must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn apply(&self, detail: &mut InstanceDetail) {
        if let Some(error) = &self.error {
            detail.error = Some(error.clone());
        }
        if let Some(access_url) = &self.access_url {
            detail.access_url = Some(access_url.clone());
        }
        if let Some(expiry) = self.expiry {
            detail.expiry = expiry;
        }
        if let Some(status) = &self.status {
            detail.status = Some(status.clone());
        }
        if let Some(duration) = self.duration {
            detail.duration = duration;
        }
        if let Some(log_path) = &self.log_path {
            detail.log_path = Some(log_path.clone());
        }
        if let Some(output_path) = &self.output_path {
            detail.output_path = Some(output_path.clone());
        }
    }
}
