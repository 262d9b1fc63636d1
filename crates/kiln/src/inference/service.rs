use kiln_core::{DetailPatch, Instance, InstanceId, RequestIndex};
use std::sync::Arc;

use super::InferenceCreateCmd;
use crate::broker::{InstanceBroker, Outcome, OutcomeKind};
use crate::dispatch::{DispatchMessage, DispatchQueue};
use crate::service::{InstanceView, Result};

/// Online inference instances on top of the generic broker
#[derive(Clone)]
pub struct InferenceService {
    broker: InstanceBroker,
    queue: Arc<dyn DispatchQueue>,
    survival_extension: Option<i64>,
}

impl InferenceService {
    pub fn new(broker: InstanceBroker, queue: Arc<dyn DispatchQueue>) -> Self {
        Self {
            broker,
            queue,
            survival_extension: None,
        }
    }

    /// Extend a reused instance to live `secs` more seconds
    pub fn with_survival_extension(mut self, secs: i64) -> Self {
        self.survival_extension = (secs > 0).then_some(secs);
        self
    }

    /// Create or reuse the instance serving a project revision
    pub async fn create(&self, cmd: &InferenceCreateCmd) -> Result<(RequestIndex, InstanceView)> {
        cmd.validate()?;
        let index = cmd.index()?;

        let outcome = self.broker.create_or_reuse(&index, cmd.input()).await?;
        self.follow_up(&index, &outcome).await?;

        Ok((index, InstanceView::from(&outcome)))
    }

    async fn follow_up(&self, index: &RequestIndex, outcome: &Outcome) -> Result<()> {
        let id = &outcome.instance.id;
        match outcome.kind {
            OutcomeKind::Created => {
                let message = DispatchMessage::provision(index.clone(), id.clone());
                if let Err(e) = self.queue.publish(message).await {
                    // Nobody would ever resolve the instance otherwise
                    self.broker
                        .store()
                        .update_detail(index, id, &DetailPatch::failed(e.to_string()))
                        .await?;
                    return Err(e.into());
                }
            }
            OutcomeKind::Reused => {
                if let Some(secs) = self.survival_extension {
                    tracing::debug!("will reuse inference instance {}", id);
                    self.queue
                        .publish(DispatchMessage::extend_expiry(index.clone(), id.clone(), secs))
                        .await?;
                }
            }
            OutcomeKind::Errored | OutcomeKind::InFlight => {}
        }
        Ok(())
    }

    pub async fn get(&self, index: &RequestIndex, id: &InstanceId) -> Result<Instance> {
        Ok(self.broker.store().find_instance(index, id).await?)
    }
}
