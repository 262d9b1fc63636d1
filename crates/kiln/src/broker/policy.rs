//! Reuse decisions over the instances of one index

use kiln_core::Instance;
use std::sync::Arc;

use crate::platform::PlatformClient;

/// What a policy decided for a request
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// A terminal provisioning error is recorded; surface it
    Errored(Instance),
    /// An instance is still waiting on the platform; share it
    InFlight(Instance),
    /// A ready instance with enough lifetime left
    Reusable(Instance),
    /// The document holds the maximum number of records
    Exhausted(usize),
    /// Nothing usable: create a new pending instance
    Create,
}

/// Reuse predicate a broker is parameterized by
pub trait ReusePolicy: Send + Sync {
    fn select(&self, instances: &[Instance], now: i64) -> Selection;
}

/// Policy of short-lived services (inference, evaluation).
///
/// Errors are sticky, an unresolved instance is shared, and a ready instance
/// is reused only if it survives at least `min_survival` more seconds.
#[derive(Debug, Clone, Copy)]
pub struct ExpiryPolicy {
    min_survival: i64,
}

impl ExpiryPolicy {
    pub fn new(min_survival: i64) -> Self {
        Self { min_survival }
    }
}

impl ReusePolicy for ExpiryPolicy {
    fn select(&self, instances: &[Instance], now: i64) -> Selection {
        if let Some(errored) = instances.iter().find(|i| i.is_errored()) {
            return Selection::Errored(errored.clone());
        }

        if let Some(pending) = instances.iter().find(|i| i.is_unresolved()) {
            return Selection::InFlight(pending.clone());
        }

        // First seen wins ties
        let target = instances.iter().fold(None::<&Instance>, |best, item| match best {
            Some(b) if item.detail.expiry <= b.detail.expiry => Some(b),
            _ => Some(item),
        });

        match target {
            Some(t) if now < t.detail.expiry && now + self.min_survival <= t.detail.expiry => {
                Selection::Reusable(t.clone())
            }
            _ => Selection::Create,
        }
    }
}

/// Policy of long-running jobs (fine-tuning, training).
///
/// One job per document may be unfinished at a time. Failed jobs count as
/// finished, so the owner can start again after a scheduling failure.
#[derive(Clone)]
pub struct JobPolicy {
    platform: Arc<dyn PlatformClient>,
    max_records: usize,
}

impl JobPolicy {
    pub fn new(platform: Arc<dyn PlatformClient>, max_records: usize) -> Self {
        Self {
            platform,
            max_records,
        }
    }

    pub fn is_done(&self, instance: &Instance) -> bool {
        instance.is_errored()
            || instance.schedule_failed()
            || instance
                .status()
                .is_some_and(|status| self.platform.is_job_done(status))
    }
}

impl ReusePolicy for JobPolicy {
    fn select(&self, instances: &[Instance], _now: i64) -> Selection {
        if let Some(running) = instances.iter().find(|i| !self.is_done(i)) {
            return Selection::InFlight(running.clone());
        }

        if instances.len() >= self.max_records {
            return Selection::Exhausted(self.max_records);
        }

        Selection::Create
    }
}
