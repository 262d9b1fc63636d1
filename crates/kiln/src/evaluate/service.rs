use kiln_core::{DetailPatch, Instance, InstanceId, RequestIndex};
use std::sync::Arc;

use super::EvaluateCreateCmd;
use crate::broker::InstanceBroker;
use crate::dispatch::{DispatchMessage, DispatchQueue};
use crate::service::{InstanceView, Result};

/// Evaluation boards for finished trainings
#[derive(Clone)]
pub struct EvaluateService {
    broker: InstanceBroker,
    queue: Arc<dyn DispatchQueue>,
}

impl EvaluateService {
    pub fn new(broker: InstanceBroker, queue: Arc<dyn DispatchQueue>) -> Self {
        Self { broker, queue }
    }

    pub async fn create(&self, cmd: &EvaluateCreateCmd) -> Result<(RequestIndex, InstanceView)> {
        cmd.validate()?;
        let index = cmd.index()?;

        let outcome = self.broker.create_or_reuse(&index, cmd.input()).await?;
        if outcome.is_new() {
            let id = &outcome.instance.id;
            let message = DispatchMessage::provision(index.clone(), id.clone());
            if let Err(e) = self.queue.publish(message).await {
                self.broker
                    .store()
                    .update_detail(&index, id, &DetailPatch::failed(e.to_string()))
                    .await?;
                return Err(e.into());
            }
        }

        Ok((index, InstanceView::from(&outcome)))
    }

    pub async fn get(&self, index: &RequestIndex, id: &InstanceId) -> Result<Instance> {
        Ok(self.broker.store().find_instance(index, id).await?)
    }
}
