use kiln_core::{Instance, InstanceId, RequestIndex};
use std::sync::Arc;
use std::time::Duration;

use super::{Frame, FrameSink, Result};
use crate::broker::JobPolicy;
use crate::store::InstanceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierSettings {
    pub interval: Duration,
    /// Store reads before giving up with a timeout frame
    pub timeout_iterations: u32,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout_iterations: 60,
        }
    }
}

/// Bounded polling loop pushing one instance's state to a client.
///
/// Short-lived flavors end on an access URL or an error. Job flavors end on
/// a done status or an error, and emit a progress frame on every tick with
/// a locally advancing duration in between.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn InstanceStore>,
    settings: NotifierSettings,
    jobs: Option<JobPolicy>,
}

impl Notifier {
    pub fn new(store: Arc<dyn InstanceStore>, settings: NotifierSettings) -> Self {
        Self {
            store,
            settings,
            jobs: None,
        }
    }

    /// Watch job progress instead of readiness
    pub fn for_jobs(mut self, policy: JobPolicy) -> Self {
        self.jobs = Some(policy);
        self
    }

    pub fn settings(&self) -> &NotifierSettings {
        &self.settings
    }

    /// Poll until a terminal frame has been sent and return it.
    ///
    /// A failed send stops the loop at once with `Disconnected`.
    pub async fn watch<S>(&self, index: &RequestIndex, id: &InstanceId, sink: &mut S) -> Result<Frame>
    where
        S: FrameSink + ?Sized,
    {
        let mut clock = DurationClock::default();
        let step = self.settings.interval.as_secs().max(1) as i64;

        for iteration in 0..self.settings.timeout_iterations {
            if iteration > 0 {
                tokio::time::sleep(self.settings.interval).await;
                clock.tick(step);
            }

            let instance = match self.store.find_instance(index, id).await {
                Ok(instance) => instance,
                Err(e) => {
                    tracing::warn!("watch of {} aborted: {}", id, e);
                    return self.finish(sink, Frame::error(e.to_string())).await;
                }
            };

            let duration = clock.observe(instance.detail.duration);
            if let Some(frame) = self.terminal(&instance, duration) {
                return self.finish(sink, frame).await;
            }

            if self.jobs.is_some() {
                sink.send(&Frame::progress(&instance, duration)).await?;
            }
        }

        tracing::info!("watch of {} timed out", id);
        self.finish(sink, Frame::timeout()).await
    }

    fn terminal(&self, instance: &Instance, duration: i64) -> Option<Frame> {
        if let Some(error) = &instance.detail.error {
            return Some(Frame::error(error.clone()));
        }

        match &self.jobs {
            Some(policy) if policy.is_done(instance) => Some(Frame::done(instance, duration)),
            Some(_) => None,
            None => instance.detail.access_url.as_ref().map(|url| Frame::Ready {
                access_url: url.clone(),
                instance_id: instance.id.clone(),
            }),
        }
    }

    async fn finish<S>(&self, sink: &mut S, frame: Frame) -> Result<Frame>
    where
        S: FrameSink + ?Sized,
    {
        sink.send(&frame).await?;
        Ok(frame)
    }
}

/// Presentational duration: follows the store when it moves, otherwise
/// counts up on its own once the job has started.
#[derive(Debug, Default)]
struct DurationClock {
    reported: Option<i64>,
    current: i64,
}

impl DurationClock {
    fn tick(&mut self, step: i64) {
        if self.current > 0 {
            self.current += step;
        }
    }

    fn observe(&mut self, stored: i64) -> i64 {
        if self.reported != Some(stored) {
            self.reported = Some(stored);
            self.current = stored;
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{NotifyError, TIMEOUT_MESSAGE, VecSink};
    use crate::platform::{InMemoryPlatform, JobStatusRules};
    use crate::store::InMemoryInstanceStore;
    use async_trait::async_trait;
    use kiln_core::DetailPatch;
    use serde_json::json;

    fn index() -> RequestIndex {
        RequestIndex::inference("alice", "p1", "abc").unwrap()
    }

    async fn setup() -> (InMemoryInstanceStore, Instance) {
        let store = InMemoryInstanceStore::new();
        let instance = store
            .insert(&index(), Instance::pending(json!({}), 0), None)
            .await
            .unwrap();
        (store, instance)
    }

    fn notifier(store: &InMemoryInstanceStore, iterations: u32) -> Notifier {
        Notifier::new(
            Arc::new(store.clone()),
            NotifierSettings {
                interval: Duration::from_secs(1),
                timeout_iterations: iterations,
            },
        )
    }

    fn patch_later(store: &InMemoryInstanceStore, id: &InstanceId, after_ms: u64, patch: DetailPatch) {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(after_ms)).await;
            store.update_detail(&index(), &id, &patch).await.unwrap();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_ready_frame() {
        let (store, instance) = setup().await;
        patch_later(&store, &instance.id, 2500, DetailPatch::ready("https://x", 3600));

        let mut sink = VecSink::default();
        let frame = notifier(&store, 10)
            .watch(&index(), &instance.id, &mut sink)
            .await
            .unwrap();

        let expected = Frame::Ready {
            access_url: "https://x".to_string(),
            instance_id: instance.id.clone(),
        };
        assert_eq!(frame, expected);
        assert_eq!(sink.frames, vec![expected]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_error_frame() {
        let (store, instance) = setup().await;
        patch_later(&store, &instance.id, 1500, DetailPatch::failed("no capacity"));

        let mut sink = VecSink::default();
        notifier(&store, 10)
            .watch(&index(), &instance.id, &mut sink)
            .await
            .unwrap();

        assert_eq!(sink.frames, vec![Frame::error("no capacity")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_bounded_iterations() {
        let (store, instance) = setup().await;

        let start = tokio::time::Instant::now();
        let mut sink = VecSink::default();
        let frame = notifier(&store, 5)
            .watch(&index(), &instance.id, &mut sink)
            .await
            .unwrap();

        assert_eq!(
            frame,
            Frame::Timeout {
                timeout_error: TIMEOUT_MESSAGE.to_string()
            }
        );
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(4));

        // Nothing was written by the watch
        let stored = store.find_instance(&index(), &instance.id).await.unwrap();
        assert_eq!(stored, instance);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_instance_yields_error_frame() {
        let store = InMemoryInstanceStore::new();
        let mut sink = VecSink::default();
        let frame = notifier(&store, 5)
            .watch(&index(), &InstanceId::new(), &mut sink)
            .await
            .unwrap();

        assert!(matches!(frame, Frame::Error { .. }));
        assert_eq!(sink.frames.len(), 1);
    }

    struct ClosedSink {
        sent: usize,
    }

    #[async_trait]
    impl FrameSink for ClosedSink {
        async fn send(&mut self, _frame: &Frame) -> crate::notifier::Result<()> {
            self.sent += 1;
            Err(NotifyError::Disconnected)
        }
    }

    fn job_notifier(store: &InMemoryInstanceStore) -> Notifier {
        let platform = InMemoryPlatform::new(JobStatusRules::new(["completed"], ["running"]));
        notifier(store, 30).for_jobs(JobPolicy::new(Arc::new(platform), 5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_loop() {
        let (store, instance) = setup().await;
        let mut sink = ClosedSink { sent: 0 };

        let result = job_notifier(&store)
            .watch(&index(), &instance.id, &mut sink)
            .await;

        assert!(matches!(result, Err(NotifyError::Disconnected)));
        assert_eq!(sink.sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_duration_advances_between_reports() {
        let (store, instance) = setup().await;
        store
            .update_detail(
                &index(),
                &instance.id,
                &DetailPatch {
                    status: Some("running".to_string()),
                    duration: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        patch_later(
            &store,
            &instance.id,
            3500,
            DetailPatch {
                status: Some("completed".to_string()),
                duration: Some(14),
                ..Default::default()
            },
        );

        let mut sink = VecSink::default();
        let frame = job_notifier(&store)
            .watch(&index(), &instance.id, &mut sink)
            .await
            .unwrap();

        let durations: Vec<i64> = sink
            .frames
            .iter()
            .filter_map(|f| match f {
                Frame::Progress { duration, .. } => Some(*duration),
                _ => None,
            })
            .collect();
        assert_eq!(durations, vec![10, 11, 12, 13]);
        assert!(matches!(frame, Frame::Done { duration: 14, .. }));
        assert_eq!(sink.frames.iter().filter(|f| f.is_terminal()).count(), 1);
    }

    #[test]
    fn test_duration_clock_waits_for_start() {
        let mut clock = DurationClock::default();
        assert_eq!(clock.observe(0), 0);
        clock.tick(1);
        assert_eq!(clock.observe(0), 0);
        assert_eq!(clock.observe(5), 5);
        clock.tick(1);
        assert_eq!(clock.observe(5), 6);
    }
}
