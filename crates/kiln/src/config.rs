use kiln_core::Flavor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::dispatch::DispatchSettings;
use crate::notifier::NotifierSettings;
use crate::platform::JobStatusRules;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

fn invalid(field: impl Into<String>, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.to_string(),
    }
}

/// Kiln configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// Postgres connection; in-memory store and queue when absent
    pub database_url: Option<String>,

    /// Log level
    pub log_level: String,

    pub platform: PlatformConfig,
    pub queue: QueueConfig,

    pub inference: InstanceConfig,
    pub evaluate: InstanceConfig,
    pub finetune: JobConfig,
    pub training: JobConfig,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            log_level: "info".to_string(),
            platform: PlatformConfig::default(),
            queue: QueueConfig::default(),
            inference: InstanceConfig {
                endpoint: "http://localhost:9001".to_string(),
                survival_extension_secs: 5 * 3600,
                ..Default::default()
            },
            evaluate: InstanceConfig {
                endpoint: "http://localhost:9002".to_string(),
                ..Default::default()
            },
            finetune: JobConfig {
                endpoint: "http://localhost:9003".to_string(),
                max_records: 10,
                ..Default::default()
            },
            training: JobConfig {
                endpoint: "http://localhost:9004".to_string(),
                ..Default::default()
            },
        }
    }
}

impl KilnConfig {
    /// Load from configuration file
    pub fn load_from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.inference.validate("inference")?;
        self.evaluate.validate("evaluate")?;
        self.finetune.validate("finetune")?;
        self.training.validate("training")?;

        if self.queue.concurrency == 0 {
            return Err(invalid("queue.concurrency", "must be positive"));
        }
        if self.queue.lease() <= self.longest_dispatch() {
            return Err(invalid(
                "queue.lease_secs",
                "must outlast the longest dispatch including retries",
            ));
        }
        Ok(())
    }

    /// Upper bound on how long the worker holds one message
    pub fn longest_dispatch(&self) -> Duration {
        let call = Duration::from_secs(self.platform.timeout_secs);
        [&self.finetune, &self.training]
            .into_iter()
            .map(|job| {
                (call + Duration::from_millis(job.retry_interval_ms)).saturating_mul(job.max_retry)
            })
            .fold(call, Duration::max)
    }

    /// Platform endpoint and retry policy of every flavor
    pub fn dispatch_settings(&self) -> HashMap<Flavor, DispatchSettings> {
        HashMap::from([
            (Flavor::Inference, self.inference.dispatch_settings()),
            (Flavor::Evaluate, self.evaluate.dispatch_settings()),
            (Flavor::Finetune, self.finetune.dispatch_settings()),
            (Flavor::Training, self.training.dispatch_settings()),
        ])
    }
}

/// Execution platform connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// `http` talks to the platform endpoints, `memory` keeps jobs in process
    pub kind: PlatformKind,
    pub timeout_secs: u64,
    /// Job statuses after which nothing changes any more
    pub done_statuses: Vec<String>,
    /// Job statuses from which a job may be terminated
    pub terminable_statuses: Vec<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            kind: PlatformKind::Http,
            timeout_secs: 30,
            done_statuses: vec![
                "completed".to_string(),
                "failed".to_string(),
                "terminated".to_string(),
            ],
            terminable_statuses: vec!["pending".to_string(), "running".to_string()],
        }
    }
}

impl PlatformConfig {
    pub fn status_rules(&self) -> JobStatusRules {
        JobStatusRules::new(
            self.done_statuses.iter().cloned(),
            self.terminable_statuses.iter().cloned(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Http,
    Memory,
}

/// Durable queue tuning, used with a database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How long a consumed message stays invisible to other workers
    pub lease_secs: u64,
    pub poll_interval_ms: u64,
    /// Messages handled at once by one worker
    pub concurrency: usize,
    /// Delay before a message whose handling failed is offered again
    pub redelivery_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_secs: 900,
            poll_interval_ms: 500,
            concurrency: 16,
            redelivery_delay_ms: 5000,
        }
    }
}

impl QueueConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }
}

/// Short-lived instances (inference, evaluation)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub endpoint: String,
    /// Lifetime a ready instance must have left to be handed out again
    pub min_survival_secs: i64,
    pub timeout_iterations: u32,
    pub poll_interval_ms: u64,
    /// Lifetime granted to a reused instance, 0 disables extension
    pub survival_extension_secs: i64,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            min_survival_secs: 1800,
            timeout_iterations: 300,
            poll_interval_ms: 1000,
            survival_extension_secs: 0,
        }
    }
}

impl InstanceConfig {
    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if self.min_survival_secs < 0 {
            return Err(invalid(format!("{}.min_survival_secs", section), "must not be negative"));
        }
        if self.survival_extension_secs < 0 {
            return Err(invalid(
                format!("{}.survival_extension_secs", section),
                "must not be negative",
            ));
        }
        check_polling(section, self.timeout_iterations, self.poll_interval_ms)
    }

    pub fn notifier_settings(&self) -> NotifierSettings {
        NotifierSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout_iterations: self.timeout_iterations,
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings::new(&self.endpoint)
    }
}

/// Long-running jobs (fine-tuning, training)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub endpoint: String,
    /// Attempts at creating the platform job before giving up
    pub max_retry: u32,
    pub retry_interval_ms: u64,
    /// Jobs kept per document
    pub max_records: usize,
    pub timeout_iterations: u32,
    pub poll_interval_ms: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            max_retry: 10,
            retry_interval_ms: 10_000,
            max_records: 5,
            timeout_iterations: 7200,
            poll_interval_ms: 1000,
        }
    }
}

impl JobConfig {
    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if self.max_retry == 0 {
            return Err(invalid(format!("{}.max_retry", section), "must be positive"));
        }
        if self.max_records == 0 {
            return Err(invalid(format!("{}.max_records", section), "must be positive"));
        }
        check_polling(section, self.timeout_iterations, self.poll_interval_ms)
    }

    pub fn notifier_settings(&self) -> NotifierSettings {
        NotifierSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout_iterations: self.timeout_iterations,
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings::new(&self.endpoint)
            .with_retry(self.max_retry, Duration::from_millis(self.retry_interval_ms))
    }
}

fn check_polling(section: &str, iterations: u32, interval_ms: u64) -> Result<(), ConfigError> {
    if iterations == 0 {
        return Err(invalid(format!("{}.timeout_iterations", section), "must be positive"));
    }
    if interval_ms == 0 {
        return Err(invalid(format!("{}.poll_interval_ms", section), "must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = KilnConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch_settings().len(), 4);
        assert_eq!(
            config.training.dispatch_settings().retry_interval,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: KilnConfig = serde_json::from_str(
            r#"{
                "inference": {"endpoint": "http://infer", "min_survival_secs": 200},
                "platform": {"kind": "memory"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.inference.endpoint, "http://infer");
        assert_eq!(config.inference.min_survival_secs, 200);
        assert_eq!(config.inference.timeout_iterations, 300);
        assert_eq!(config.platform.kind, PlatformKind::Memory);
        assert_eq!(config.training.max_retry, 10);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("kiln-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"training": {"max_records": 3}}"#).unwrap();

        let config = KilnConfig::load_from_file(&path).unwrap();
        assert_eq!(config.training.max_records, 3);

        std::fs::write(&path, r#"{"training": {"max_records": 0}}"#).unwrap();
        assert!(KilnConfig::load_from_file(&path).is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_lease_must_outlast_job_retries() {
        let config = KilnConfig::default();
        assert_eq!(config.longest_dispatch(), Duration::from_secs(400));

        let mut short = KilnConfig::default();
        short.queue.lease_secs = 300;
        assert_eq!(
            short.validate(),
            Err(ConfigError::InvalidValue {
                field: "queue.lease_secs".to_string(),
                reason: "must outlast the longest dispatch including retries".to_string(),
            })
        );

        short.training.max_retry = 2;
        short.finetune.max_retry = 2;
        assert!(short.validate().is_ok());
    }

    #[test]
    fn test_lease_covers_platform_timeout() {
        let mut config = KilnConfig::default();
        config.platform.timeout_secs = 900;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = KilnConfig::default();
        config.queue.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let mut config = KilnConfig::default();
        config.evaluate.timeout_iterations = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "evaluate.timeout_iterations".to_string(),
                reason: "must be positive".to_string(),
            })
        );
    }
}
