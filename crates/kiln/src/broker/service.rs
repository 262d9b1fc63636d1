use kiln_core::{Clock, Instance, RequestIndex};
use std::sync::Arc;

use super::{BrokerError, ReusePolicy, Result, Selection};
use crate::store::InstanceStore;

/// How a request was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// A new pending instance was inserted; the caller must dispatch it
    Created,
    /// A previous attempt failed terminally
    Errored,
    /// Another caller's instance is still being provisioned
    InFlight,
    /// A ready instance was handed out again
    Reused,
}

/// Answer of `create_or_reuse`
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub instance: Instance,
    pub kind: OutcomeKind,
}

impl Outcome {
    pub fn is_new(&self) -> bool {
        self.kind == OutcomeKind::Created
    }
}

/// Decides which instance answers a request, creating one when nothing fits.
///
/// The broker never locks and never rewrites documents: the only mutation it
/// performs is the store's version-checked insert, so concurrent callers for
/// the same index are serialized by the store alone.
#[derive(Clone)]
pub struct InstanceBroker {
    store: Arc<dyn InstanceStore>,
    policy: Arc<dyn ReusePolicy>,
    clock: Arc<dyn Clock>,
}

impl InstanceBroker {
    /// Create a new InstanceBroker
    pub fn new(
        store: Arc<dyn InstanceStore>,
        policy: Arc<dyn ReusePolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn InstanceStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run the reuse policy against the current instances of an index.
    ///
    /// Returns the decision and the document version it was taken at.
    pub async fn check(&self, index: &RequestIndex) -> Result<(Selection, Option<u64>)> {
        let snapshot = self.store.find_instances(index).await?;
        let selection = self.policy.select(&snapshot.instances, self.clock.now());
        Ok((selection, snapshot.version))
    }

    /// Return a usable instance for `index`, inserting a pending one if needed
    pub async fn create_or_reuse(
        &self,
        index: &RequestIndex,
        input: serde_json::Value,
    ) -> Result<Outcome> {
        index.validate()?;

        let (selection, version) = self.check(index).await?;
        if let Some(outcome) = Self::settle(selection)? {
            return Ok(outcome);
        }

        let pending = Instance::pending(input, self.clock.now());
        match self.store.insert(index, pending, version).await {
            Ok(instance) => {
                tracing::info!("created instance {} for {}", instance.id, index);
                Ok(Outcome {
                    instance,
                    kind: OutcomeKind::Created,
                })
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!("lost creation race for {}: {}", index, e);

                // The winner is visible now; look once and never insert again
                let (selection, _) = self.check(index).await?;
                Self::settle(selection)?
                    .ok_or_else(|| BrokerError::Inconsistent(index.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn settle(selection: Selection) -> Result<Option<Outcome>> {
        let (instance, kind) = match selection {
            Selection::Create => return Ok(None),
            Selection::Exhausted(limit) => return Err(BrokerError::RecordLimitExceeded(limit)),
            Selection::Errored(i) => (i, OutcomeKind::Errored),
            Selection::InFlight(i) => (i, OutcomeKind::InFlight),
            Selection::Reusable(i) => (i, OutcomeKind::Reused),
        };

        Ok(Some(Outcome { instance, kind }))
    }
}
