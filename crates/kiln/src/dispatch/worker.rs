use kiln_core::{
    Clock, DetailPatch, Flavor, Instance, InstanceId, RequestIndex, STATUS_SCHEDULE_FAILED,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

use super::{Delivery, DispatchError, DispatchMessage, DispatchQueue, Result};
use crate::platform::{PlatformClient, ProvisionRequest};
use crate::store::{InstanceStore, StoreError};

/// How one flavor reaches the platform
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub endpoint: String,
    /// Attempts for job flavors; short-lived flavors try once
    pub max_retry: u32,
    pub retry_interval: Duration,
}

impl DispatchSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_retry: 1,
            retry_interval: Duration::from_secs(1),
        }
    }

    pub fn with_retry(mut self, max_retry: u32, retry_interval: Duration) -> Self {
        self.max_retry = max_retry;
        self.retry_interval = retry_interval;
        self
    }
}

/// Background consumer turning queued messages into platform calls
#[derive(Clone)]
pub struct DispatchWorker {
    queue: Arc<dyn DispatchQueue>,
    store: Arc<dyn InstanceStore>,
    platform: Arc<dyn PlatformClient>,
    clock: Arc<dyn Clock>,
    settings: HashMap<Flavor, DispatchSettings>,
    concurrency: usize,
    redelivery_delay: Duration,
}

impl DispatchWorker {
    pub fn new(
        queue: Arc<dyn DispatchQueue>,
        store: Arc<dyn InstanceStore>,
        platform: Arc<dyn PlatformClient>,
        clock: Arc<dyn Clock>,
        settings: HashMap<Flavor, DispatchSettings>,
    ) -> Self {
        Self {
            queue,
            store,
            platform,
            clock,
            settings,
            concurrency: 16,
            redelivery_delay: Duration::from_secs(5),
        }
    }

    /// Messages handled at once; a slow job dispatch holds only its own slot
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Wait before a failed message is offered again
    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    /// Run the worker on its own task until the queue closes
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Consume until the queue closes, handling each delivery on its own task
    pub async fn run(self) {
        tracing::info!("dispatch worker started with {} slots", self.concurrency);
        let slots = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        loop {
            while let Some(done) = tasks.try_join_next() {
                if let Err(e) = done {
                    tracing::error!("dispatch task panicked: {}", e);
                }
            }

            let Ok(permit) = slots.clone().acquire_owned().await else {
                break;
            };
            match self.queue.consume().await {
                Ok(Some(delivery)) => {
                    let worker = self.clone();
                    tasks.spawn(async move {
                        if let Err(e) = worker.complete(&delivery).await {
                            tracing::error!("settling delivery {} failed: {}", delivery.id, e);
                        }
                        drop(permit);
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("dispatch queue failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        tracing::info!("dispatch worker stopped");
    }

    /// Handle one delivery in place; `false` once the queue is closed
    pub async fn process_next(&self) -> Result<bool> {
        let Some(delivery) = self.queue.consume().await? else {
            return Ok(false);
        };
        self.complete(&delivery).await?;
        Ok(true)
    }

    /// Handle a delivery, then ack it or hand it back to the queue
    async fn complete(&self, delivery: &Delivery) -> Result<()> {
        match self.handle(&delivery.message).await {
            Ok(()) => self.queue.ack(delivery).await,
            Err(DispatchError::Store(StoreError::NotFound(id))) => {
                tracing::warn!("dropping {} for vanished instance {}", delivery.message.kind(), id);
                self.queue.ack(delivery).await
            }
            Err(e) => {
                tracing::error!(
                    "{} of {} failed, released for redelivery: {}",
                    delivery.message.kind(),
                    delivery.message.instance_id(),
                    e
                );
                self.queue.release(delivery, self.redelivery_delay).await
            }
        }
    }

    pub async fn handle(&self, message: &DispatchMessage) -> Result<()> {
        match message {
            DispatchMessage::Provision { index, instance_id } => {
                self.dispatch(index, instance_id).await
            }
            DispatchMessage::ExtendExpiry {
                index,
                instance_id,
                survival_secs,
            } => self.extend(index, instance_id, *survival_secs).await,
        }
    }

    /// Start the platform job of a pending instance.
    ///
    /// An instance that already carries a job handle or an error is left
    /// alone, so redelivered messages never create a second job.
    pub async fn dispatch(&self, index: &RequestIndex, id: &InstanceId) -> Result<()> {
        let instance = self.store.find_instance(index, id).await?;
        if instance.job.is_some() || instance.is_errored() {
            tracing::debug!("instance {} already dispatched", id);
            return Ok(());
        }

        let settings = match self.settings.get(&index.flavor) {
            Some(s) => s,
            None => {
                let e = DispatchError::UnknownFlavor(index.flavor);
                self.store
                    .update_detail(index, id, &self.failure(index.flavor, &e))
                    .await?;
                return Err(e);
            }
        };

        let attempts = if index.flavor.is_job() {
            settings.max_retry.max(1)
        } else {
            1
        };
        let request = provision_request(index, instance);

        for attempt in 1..=attempts {
            match self
                .platform
                .create_job(&settings.endpoint, &index.owner, &request)
                .await
            {
                Ok(job) => {
                    if let Err(e) = self.store.save_job(index, id, &job).await {
                        tracing::error!(
                            "job {} created for {} but not recorded: {}",
                            job.job_id,
                            id,
                            e
                        );
                        return Err(e.into());
                    }
                    tracing::info!("dispatched {} as job {}", id, job.job_id);
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!("attempt {}/{} for {} failed: {}", attempt, attempts, id, e);
                    tokio::time::sleep(settings.retry_interval).await;
                }
                Err(e) => {
                    tracing::error!("provisioning {} failed: {}", id, e);
                    let patch = self.failure(index.flavor, &e);
                    self.store.update_detail(index, id, &patch).await?;
                }
            }
        }

        Ok(())
    }

    // Job flavors are marked schedule_failed so the owner may delete and retry
    fn failure(&self, flavor: Flavor, e: &dyn std::fmt::Display) -> DetailPatch {
        let mut patch = DetailPatch::failed(e.to_string());
        if flavor.is_job() {
            patch.status = Some(STATUS_SCHEDULE_FAILED.to_string());
        }
        patch
    }

    /// Push the exit time of a reused instance; never shortens it
    pub async fn extend(
        &self,
        index: &RequestIndex,
        id: &InstanceId,
        survival_secs: i64,
    ) -> Result<()> {
        let instance = self.store.find_instance(index, id).await?;
        let Some(job) = instance.job else {
            tracing::debug!("instance {} has no job to extend", id);
            return Ok(());
        };

        let expiry = self.clock.now() + survival_secs;
        if expiry <= instance.detail.expiry {
            return Ok(());
        }

        self.platform
            .extend_expiry(&job.endpoint, &job.job_id, expiry)
            .await?;
        self.store
            .update_detail(index, id, &DetailPatch::expiry(expiry))
            .await?;

        tracing::debug!("extended {} until {}", id, expiry);
        Ok(())
    }
}

fn provision_request(index: &RequestIndex, instance: Instance) -> ProvisionRequest {
    ProvisionRequest {
        index: index.clone(),
        instance_id: instance.id,
        input: instance.input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::InMemoryDispatchQueue;
    use crate::platform::{InMemoryPlatform, JobStatusRules};
    use crate::store::InMemoryInstanceStore;
    use kiln_core::{JobHandle, ManualClock};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        queue: InMemoryDispatchQueue,
        store: InMemoryInstanceStore,
        platform: InMemoryPlatform,
        clock: ManualClock,
        worker: DispatchWorker,
    }

    fn fixture() -> Fixture {
        let queue = InMemoryDispatchQueue::new();
        let store = InMemoryInstanceStore::new();
        let platform = InMemoryPlatform::new(JobStatusRules::default());
        let clock = ManualClock::new(NOW);

        let mut settings = HashMap::new();
        settings.insert(Flavor::Inference, DispatchSettings::new("http://infer"));
        settings.insert(
            Flavor::Training,
            DispatchSettings::new("http://train").with_retry(3, Duration::ZERO),
        );

        let worker = DispatchWorker::new(
            Arc::new(queue.clone()),
            Arc::new(store.clone()),
            Arc::new(platform.clone()),
            Arc::new(clock.clone()),
            settings,
        );

        Fixture {
            queue,
            store,
            platform,
            clock,
            worker,
        }
    }

    async fn pending(store: &InMemoryInstanceStore, index: &RequestIndex) -> Instance {
        store
            .insert(index, Instance::pending(json!({"boot": "app.py"}), NOW), None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_records_job_handle() {
        let f = fixture();
        let index = RequestIndex::inference("alice", "p1", "abc").unwrap();
        let instance = pending(&f.store, &index).await;

        f.queue
            .publish(DispatchMessage::provision(index.clone(), instance.id.clone()))
            .await
            .unwrap();
        assert!(f.worker.process_next().await.unwrap());

        let stored = f.store.find_instance(&index, &instance.id).await.unwrap();
        let job = stored.job.unwrap();
        assert_eq!(job.endpoint, "http://infer");

        let platform_job = f.platform.job(&job.job_id).await.unwrap();
        assert_eq!(platform_job.owner, "alice");
        assert_eq!(platform_job.request.input, json!({"boot": "app.py"}));
        assert!(f.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_redelivery_does_not_create_second_job() {
        let f = fixture();
        let index = RequestIndex::inference("alice", "p1", "abc").unwrap();
        let instance = pending(&f.store, &index).await;

        f.worker.dispatch(&index, &instance.id).await.unwrap();
        f.worker.dispatch(&index, &instance.id).await.unwrap();

        assert_eq!(f.platform.job_count().await, 1);
    }

    #[tokio::test]
    async fn test_short_lived_flavor_fails_after_one_attempt() {
        let f = fixture();
        let index = RequestIndex::inference("alice", "p1", "abc").unwrap();
        let instance = pending(&f.store, &index).await;

        f.platform.fail_next(1);
        f.worker.dispatch(&index, &instance.id).await.unwrap();

        let stored = f.store.find_instance(&index, &instance.id).await.unwrap();
        assert!(stored.is_errored());
        assert!(stored.job.is_none());
        assert_eq!(stored.detail.status, None);
    }

    #[tokio::test]
    async fn test_job_flavor_retries_until_success() {
        let f = fixture();
        let index = RequestIndex::training("bob", "proj").unwrap();
        let instance = pending(&f.store, &index).await;

        f.platform.fail_next(2);
        f.worker.dispatch(&index, &instance.id).await.unwrap();

        let stored = f.store.find_instance(&index, &instance.id).await.unwrap();
        assert!(!stored.is_errored());
        assert!(stored.job.is_some());
    }

    #[tokio::test]
    async fn test_job_flavor_last_chance_marks_schedule_failed() {
        let f = fixture();
        let index = RequestIndex::training("bob", "proj").unwrap();
        let instance = pending(&f.store, &index).await;

        f.platform.fail_next(3);
        f.worker.dispatch(&index, &instance.id).await.unwrap();

        let stored = f.store.find_instance(&index, &instance.id).await.unwrap();
        assert!(stored.schedule_failed());
        assert!(stored.is_errored());
        assert_eq!(f.platform.job_count().await, 0);
    }

    #[tokio::test]
    async fn test_unconfigured_flavor_marks_error() {
        let f = fixture();
        let index = RequestIndex::finetune("carol").unwrap();
        let instance = pending(&f.store, &index).await;

        let result = f.worker.dispatch(&index, &instance.id).await;
        assert!(matches!(result, Err(DispatchError::UnknownFlavor(Flavor::Finetune))));

        let stored = f.store.find_instance(&index, &instance.id).await.unwrap();
        assert!(stored.schedule_failed());
    }

    #[tokio::test]
    async fn test_vanished_instance_is_acknowledged() {
        let f = fixture();
        let index = RequestIndex::inference("alice", "p1", "abc").unwrap();

        f.queue
            .publish(DispatchMessage::provision(index, InstanceId::new()))
            .await
            .unwrap();
        assert!(f.worker.process_next().await.unwrap());
        assert_eq!(f.platform.job_count().await, 0);
    }

    #[tokio::test]
    async fn test_extend_pushes_expiry_forward() {
        let f = fixture();
        let index = RequestIndex::inference("alice", "p1", "abc").unwrap();
        let instance = pending(&f.store, &index).await;
        f.worker.dispatch(&index, &instance.id).await.unwrap();
        f.store
            .update_detail(&index, &instance.id, &DetailPatch::ready("https://x", NOW + 600))
            .await
            .unwrap();

        f.clock.advance(500);
        f.worker.extend(&index, &instance.id, 3600).await.unwrap();

        let stored = f.store.find_instance(&index, &instance.id).await.unwrap();
        assert_eq!(stored.detail.expiry, NOW + 500 + 3600);
        let job = stored.job.unwrap();
        let platform_job = f.platform.job(&job.job_id).await.unwrap();
        assert_eq!(platform_job.expiry, Some(NOW + 500 + 3600));

        // A shorter extension is a no-op
        f.worker.extend(&index, &instance.id, 10).await.unwrap();
        let stored = f.store.find_instance(&index, &instance.id).await.unwrap();
        assert_eq!(stored.detail.expiry, NOW + 500 + 3600);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_released() {
        let f = fixture();
        let worker = f.worker.clone().with_redelivery_delay(Duration::ZERO);
        let index = RequestIndex::inference("alice", "p1", "abc").unwrap();
        let instance = pending(&f.store, &index).await;
        f.store
            .save_job(&index, &instance.id, &JobHandle::new("http://infer", "ghost"))
            .await
            .unwrap();
        f.store
            .update_detail(&index, &instance.id, &DetailPatch::ready("https://x", NOW + 600))
            .await
            .unwrap();

        // The platform no longer knows the job, so the extension fails
        let message = DispatchMessage::extend_expiry(index.clone(), instance.id.clone(), 3600);
        f.queue.publish(message.clone()).await.unwrap();
        assert!(worker.process_next().await.unwrap());

        assert_eq!(f.queue.peek().await, vec![message.clone()]);
        let again = f.queue.consume().await.unwrap().unwrap();
        assert_eq!(again.message, message);

        let stored = f.store.find_instance(&index, &instance.id).await.unwrap();
        assert_eq!(stored.detail.expiry, NOW + 600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_retries_do_not_hold_up_other_flavors() {
        let queue = InMemoryDispatchQueue::new();
        let store = InMemoryInstanceStore::new();
        let platform = InMemoryPlatform::new(JobStatusRules::default());
        let settings = HashMap::from([
            (Flavor::Inference, DispatchSettings::new("http://infer")),
            (
                Flavor::Training,
                DispatchSettings::new("http://train").with_retry(10, Duration::from_secs(10)),
            ),
        ]);
        let worker = DispatchWorker::new(
            Arc::new(queue.clone()),
            Arc::new(store.clone()),
            Arc::new(platform.clone()),
            Arc::new(ManualClock::new(NOW)),
            settings,
        )
        .with_concurrency(4);
        platform.set_down("http://train", true).await;

        let training = RequestIndex::training("bob", "proj").unwrap();
        let job = pending(&store, &training).await;
        let inference = RequestIndex::inference("alice", "p1", "abc").unwrap();
        let instance = pending(&store, &inference).await;
        queue
            .publish(DispatchMessage::provision(training.clone(), job.id.clone()))
            .await
            .unwrap();
        queue
            .publish(DispatchMessage::provision(inference.clone(), instance.id.clone()))
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let handle = worker.spawn();
        loop {
            let stored = store.find_instance(&inference, &instance.id).await.unwrap();
            if stored.job.is_some() {
                break;
            }
            assert!(started.elapsed() < Duration::from_secs(1), "inference waited on training");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let waiting = store.find_instance(&training, &job.id).await.unwrap();
        assert!(waiting.job.is_none());
        assert!(!waiting.is_errored());

        queue.close();
        handle.await.unwrap();
        let failed = store.find_instance(&training, &job.id).await.unwrap();
        assert!(failed.schedule_failed());
    }

    #[tokio::test]
    async fn test_extend_without_job_is_skipped() {
        let f = fixture();
        let index = RequestIndex::inference("alice", "p1", "abc").unwrap();
        let instance = pending(&f.store, &index).await;

        f.worker.extend(&index, &instance.id, 3600).await.unwrap();
        let stored = f.store.find_instance(&index, &instance.id).await.unwrap();
        assert_eq!(stored.detail.expiry, 0);
        assert_eq!(stored.job, None::<JobHandle>);
    }
}
