//! Application layer for Kiln
//!
//! Wires the store, platform client, dispatch queue and flavor services
//! together from a `KilnConfig`.

use kiln_core::{Clock, Flavor, SystemClock};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

use crate::broker::{ExpiryPolicy, InstanceBroker};
use crate::config::{KilnConfig, PlatformKind};
use crate::dispatch::{
    DispatchQueue, DispatchWorker, InMemoryDispatchQueue, PostgresDispatchQueue,
};
use crate::error::Result;
use crate::evaluate::EvaluateService;
use crate::inference::InferenceService;
use crate::job::JobService;
use crate::notifier::Notifier;
use crate::platform::{HttpPlatformClient, InMemoryPlatform, PlatformClient};
use crate::reconciler::DetailReconciler;
use crate::store::{InMemoryInstanceStore, InstanceStore, PostgresInstanceStore};

/// The assembled broker with one service per flavor
#[derive(Clone)]
pub struct Kiln {
    config: KilnConfig,
    store: Arc<dyn InstanceStore>,
    queue: Arc<dyn DispatchQueue>,
    platform: Arc<dyn PlatformClient>,
    clock: Arc<dyn Clock>,
    storage: &'static str,

    pub inference: InferenceService,
    pub evaluate: EvaluateService,
    pub finetune: JobService,
    pub training: JobService,
    pub reconciler: DetailReconciler,

    inference_notifier: Notifier,
    evaluate_notifier: Notifier,
    finetune_notifier: Notifier,
    training_notifier: Notifier,
}

impl Kiln {
    /// Create a new builder
    pub fn builder(config: KilnConfig) -> KilnBuilder {
        KilnBuilder::new(config)
    }

    pub fn config(&self) -> &KilnConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn InstanceStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn DispatchQueue> {
        &self.queue
    }

    /// Where instances and dispatch messages live: "postgres", "memory" or "custom"
    pub fn storage_kind(&self) -> &'static str {
        self.storage
    }

    /// Watch loop for instances of a flavor
    pub fn notifier(&self, flavor: Flavor) -> &Notifier {
        match flavor {
            Flavor::Inference => &self.inference_notifier,
            Flavor::Evaluate => &self.evaluate_notifier,
            Flavor::Finetune => &self.finetune_notifier,
            Flavor::Training => &self.training_notifier,
        }
    }

    pub fn jobs(&self, flavor: Flavor) -> Option<&JobService> {
        match flavor {
            Flavor::Finetune => Some(&self.finetune),
            Flavor::Training => Some(&self.training),
            Flavor::Inference | Flavor::Evaluate => None,
        }
    }

    /// Consumer of the dispatch queue; run it with `spawn`
    pub fn worker(&self) -> DispatchWorker {
        DispatchWorker::new(
            self.queue.clone(),
            self.store.clone(),
            self.platform.clone(),
            self.clock.clone(),
            self.config.dispatch_settings(),
        )
        .with_concurrency(self.config.queue.concurrency)
        .with_redelivery_delay(Duration::from_millis(self.config.queue.redelivery_delay_ms))
    }
}

/// Builder for Kiln; anything not given is derived from the config
pub struct KilnBuilder {
    config: KilnConfig,
    store: Option<Arc<dyn InstanceStore>>,
    queue: Option<Arc<dyn DispatchQueue>>,
    platform: Option<Arc<dyn PlatformClient>>,
    clock: Option<Arc<dyn Clock>>,
}

impl KilnBuilder {
    pub fn new(config: KilnConfig) -> Self {
        Self {
            config,
            store: None,
            queue: None,
            platform: None,
            clock: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn DispatchQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn platform(mut self, platform: Arc<dyn PlatformClient>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the application, connecting to Postgres if a database is configured
    pub async fn build(self) -> Result<Kiln> {
        self.config.validate()?;

        let (default_store, default_queue, storage) = match &self.config.database_url {
            Some(url) if self.store.is_none() || self.queue.is_none() => {
                let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
                sqlx::migrate!("../../migrations").run(&pool).await?;
                tracing::info!("using postgres store and dispatch queue");

                let store: Arc<dyn InstanceStore> = Arc::new(PostgresInstanceStore::new(pool.clone()));
                let queue: Arc<dyn DispatchQueue> = Arc::new(PostgresDispatchQueue::new(
                    pool,
                    self.config.queue.lease(),
                    Duration::from_millis(self.config.queue.poll_interval_ms),
                ));
                (store, queue, "postgres")
            }
            _ => {
                let store: Arc<dyn InstanceStore> = Arc::new(InMemoryInstanceStore::new());
                let queue: Arc<dyn DispatchQueue> = Arc::new(InMemoryDispatchQueue::new());
                (store, queue, "memory")
            }
        };
        let storage = if self.store.is_some() && self.queue.is_some() {
            "custom"
        } else {
            storage
        };

        let store = self.store.unwrap_or(default_store);
        let queue = self.queue.unwrap_or(default_queue);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let platform = match self.platform {
            Some(platform) => platform,
            None => build_platform(&self.config)?,
        };

        Ok(assemble(self.config, store, queue, platform, clock, storage))
    }

    /// Build without touching the network; the database URL is ignored
    pub fn build_in_memory(self) -> Result<Kiln> {
        self.config.validate()?;
        let storage = if self.store.is_some() && self.queue.is_some() {
            "custom"
        } else {
            "memory"
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryInstanceStore::new()));
        let queue = self
            .queue
            .unwrap_or_else(|| Arc::new(InMemoryDispatchQueue::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let platform = self.platform.unwrap_or_else(|| {
            Arc::new(InMemoryPlatform::new(self.config.platform.status_rules()))
        });

        Ok(assemble(self.config, store, queue, platform, clock, storage))
    }
}

fn build_platform(config: &KilnConfig) -> Result<Arc<dyn PlatformClient>> {
    let rules = config.platform.status_rules();
    Ok(match config.platform.kind {
        PlatformKind::Http => Arc::new(HttpPlatformClient::new(
            rules,
            Duration::from_secs(config.platform.timeout_secs),
        )?),
        PlatformKind::Memory => Arc::new(InMemoryPlatform::new(rules)),
    })
}

fn assemble(
    config: KilnConfig,
    store: Arc<dyn InstanceStore>,
    queue: Arc<dyn DispatchQueue>,
    platform: Arc<dyn PlatformClient>,
    clock: Arc<dyn Clock>,
    storage: &'static str,
) -> Kiln {
    let expiry_broker = |min_survival: i64| {
        InstanceBroker::new(
            store.clone(),
            Arc::new(ExpiryPolicy::new(min_survival)),
            clock.clone(),
        )
    };

    let inference = InferenceService::new(
        expiry_broker(config.inference.min_survival_secs),
        queue.clone(),
    )
    .with_survival_extension(config.inference.survival_extension_secs);
    let evaluate = EvaluateService::new(
        expiry_broker(config.evaluate.min_survival_secs),
        queue.clone(),
    );

    let job_service = |flavor: Flavor, max_records: usize| {
        JobService::new(
            flavor,
            store.clone(),
            platform.clone(),
            queue.clone(),
            clock.clone(),
            max_records,
        )
    };
    let finetune = job_service(Flavor::Finetune, config.finetune.max_records);
    let training = job_service(Flavor::Training, config.training.max_records);

    let inference_notifier =
        Notifier::new(store.clone(), config.inference.notifier_settings());
    let evaluate_notifier = Notifier::new(store.clone(), config.evaluate.notifier_settings());
    let finetune_notifier = Notifier::new(store.clone(), config.finetune.notifier_settings())
        .for_jobs(finetune.policy().clone());
    let training_notifier = Notifier::new(store.clone(), config.training.notifier_settings())
        .for_jobs(training.policy().clone());

    Kiln {
        reconciler: DetailReconciler::new(store.clone()),
        inference,
        evaluate,
        finetune,
        training,
        inference_notifier,
        evaluate_notifier,
        finetune_notifier,
        training_notifier,
        config,
        store,
        queue,
        platform,
        clock,
        storage,
    }
}
