//! Classifier multiplexer (C6): weighted round-robin dispatch over several
//! workers implementing [`Classifier`], with cooldowns and a metrics dump
//! on a request-count-or-interval cadence.

use super::{Classifier, ClassifyRequest, ClassifyResponse, FolderAdviceRequest, FolderAdviceResponse};
use crate::metrics::{Metric, MetricSnapshot};
use crate::models::folder_action::FolderAction;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const COOLDOWN_SUCCESS_RATE_FLOOR: f64 = 0.4;
const DEFAULT_WEIGHT: f64 = 5.0;
const DUMP_REQUEST_THRESHOLD: u64 = 1000;
const DEFAULT_DUMP_INTERVAL: Duration = Duration::from_secs(900);

struct Worker {
    classifier: Arc<dyn Classifier>,
    lifetime: Metric,
    rolling: Metric,
    current_weight: f64,
    cooldown_until: Option<Instant>,
    consecutive_failures: u32,
    requests_since_dump: u64,
}

impl Worker {
    fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            lifetime: Metric::new(),
            rolling: Metric::new(),
            current_weight: 0.0,
            cooldown_until: None,
            consecutive_failures: 0,
            requests_since_dump: 0,
        }
    }

    fn is_in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.map(|until| until > now).unwrap_or(false)
    }

    fn success_rate(&self) -> f64 {
        self.lifetime.snapshot().success_rate()
    }

    fn has_history(&self) -> bool {
        self.lifetime.snapshot().requests > 0
    }

    fn weight(&self) -> f64 {
        let snapshot = self.lifetime.snapshot();
        if snapshot.success == 0 {
            DEFAULT_WEIGHT
        } else {
            (1000.0 / (snapshot.avg_latency_ms() + 1.0)).clamp(0.1, 10.0)
        }
    }

    fn record_success(&mut self, started_at: Instant) {
        self.lifetime.record(started_at, true);
        self.rolling.record(started_at, true);
        self.consecutive_failures = 0;
        self.cooldown_until = None;
        self.requests_since_dump += 1;
    }

    fn record_failure(&mut self, started_at: Instant, failure_cooldown: Duration) {
        self.lifetime.record(started_at, false);
        self.rolling.record(started_at, false);
        self.consecutive_failures += 1;
        let scaled = failure_cooldown * self.consecutive_failures.min(5);
        self.cooldown_until = Some(Instant::now() + scaled);
        self.requests_since_dump += 1;
    }
}

pub struct Multiplexer {
    workers: Mutex<Vec<Worker>>,
    failure_cooldown: Duration,
    dump_interval: Duration,
    last_dump: Mutex<Instant>,
}

impl Multiplexer {
    pub fn new(classifiers: Vec<Arc<dyn Classifier>>, failure_cooldown: Duration) -> Self {
        Self {
            workers: Mutex::new(classifiers.into_iter().map(Worker::new).collect()),
            failure_cooldown,
            dump_interval: DEFAULT_DUMP_INTERVAL,
            last_dump: Mutex::new(Instant::now()),
        }
    }

    /// Picks the worker index to dispatch to, per the selection rules in
    /// §4.5: zero-history workers first, then smooth weighted round-robin
    /// over the cooldown-filtered survivors.
    fn select(workers: &mut [Worker]) -> Option<usize> {
        let now = Instant::now();
        let not_in_cooldown: Vec<usize> = (0..workers.len()).filter(|&i| !workers[i].is_in_cooldown(now)).collect();
        if not_in_cooldown.is_empty() {
            return None;
        }

        let primary: Vec<usize> = not_in_cooldown
            .iter()
            .copied()
            .filter(|&i| !workers[i].has_history() || workers[i].success_rate() >= COOLDOWN_SUCCESS_RATE_FLOOR)
            .collect();
        let candidates = if primary.is_empty() { not_in_cooldown } else { primary };

        if let Some(&fresh) = candidates.iter().find(|&&i| !workers[i].has_history()) {
            workers[fresh].current_weight = 0.0;
            return Some(fresh);
        }

        let total_weight: f64 = candidates.iter().map(|&i| workers[i].weight()).sum();
        let mut chosen = candidates[0];
        let mut best = f64::MIN;
        for &i in &candidates {
            workers[i].current_weight += workers[i].weight();
            if workers[i].current_weight > best {
                best = workers[i].current_weight;
                chosen = i;
            }
        }
        workers[chosen].current_weight -= total_weight;
        Some(chosen)
    }

    async fn maybe_dump(&self, workers: &mut [Worker]) {
        let elapsed = self.last_dump.lock().await.elapsed();
        let due_by_count = workers.iter().any(|w| w.requests_since_dump >= DUMP_REQUEST_THRESHOLD);
        let due_by_time = elapsed >= self.dump_interval;
        if !due_by_count && !due_by_time {
            return;
        }
        for worker in workers.iter_mut() {
            let snapshot = worker.rolling.snapshot();
            tracing::info!(
                worker = worker.classifier.display_name(),
                requests = snapshot.requests,
                success_rate = snapshot.success_rate(),
                avg_latency_ms = snapshot.avg_latency_ms(),
                "classifier metrics dump"
            );
            worker.rolling.reset();
            worker.requests_since_dump = 0;
        }
        *self.last_dump.lock().await = Instant::now();
    }

    /// Snapshot of every worker's rolling metrics, for an external report
    /// or the `all` CLI summary.
    pub async fn metrics(&self) -> Vec<(String, MetricSnapshot)> {
        let workers = self.workers.lock().await;
        workers.iter().map(|w| (w.classifier.display_name().to_string(), w.lifetime.snapshot())).collect()
    }
}

#[async_trait]
impl Classifier for Multiplexer {
    async fn classify(&self, request: ClassifyRequest) -> ClassifyResponse {
        let mut workers = self.workers.lock().await;
        let Some(idx) = Self::select(&mut workers) else {
            return ClassifyResponse::unknown("multiplexer", "no workers available");
        };
        let started = Instant::now();
        drop(workers);

        let response = self.dispatch_classify(idx, request).await;

        let mut workers = self.workers.lock().await;
        if response.error.is_none() {
            workers[idx].record_success(started);
        } else {
            workers[idx].record_failure(started, self.failure_cooldown);
        }
        self.maybe_dump(&mut workers).await;
        response
    }

    async fn advise_folder_action(&self, request: FolderAdviceRequest) -> FolderAdviceResponse {
        let mut workers = self.workers.lock().await;
        let Some(idx) = Self::select(&mut workers) else {
            return FolderAdviceResponse {
                action: request.rule_hint.unwrap_or(FolderAction::Disaggregate),
                worker: "multiplexer".to_string(),
                error: Some("no workers available".to_string()),
            };
        };
        let started = Instant::now();
        drop(workers);

        let response = self.dispatch_advise(idx, request).await;

        let mut workers = self.workers.lock().await;
        if response.error.is_none() {
            workers[idx].record_success(started);
        } else {
            workers[idx].record_failure(started, self.failure_cooldown);
        }
        self.maybe_dump(&mut workers).await;
        response
    }

    async fn close(&self) -> Result<(), String> {
        let workers = self.workers.lock().await;
        let mut first_error = None;
        for worker in workers.iter() {
            if let Err(err) = worker.classifier.close().await {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn ensure_available(&self) -> bool {
        let workers = self.workers.lock().await;
        for worker in workers.iter() {
            if worker.classifier.ensure_available().await {
                return true;
            }
        }
        false
    }

    fn display_name(&self) -> &str {
        "multiplexer"
    }

    fn is_ai(&self) -> bool {
        true
    }
}

impl Multiplexer {
    /// Clones the worker's `Arc` under a short-lived lock, then awaits the
    /// actual call with the lock released — so one adapter's network call
    /// never blocks another request's selection/bookkeeping.
    async fn dispatch_classify(&self, idx: usize, request: ClassifyRequest) -> ClassifyResponse {
        let classifier = {
            let workers = self.workers.lock().await;
            Arc::clone(&workers[idx].classifier)
        };
        classifier.classify(request).await
    }

    async fn dispatch_advise(&self, idx: usize, request: FolderAdviceRequest) -> FolderAdviceResponse {
        let classifier = {
            let workers = self.workers.lock().await;
            Arc::clone(&workers[idx].classifier)
        };
        classifier.advise_folder_action(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FileMetadata;

    struct StubClassifier {
        name: String,
        fail: bool,
    }

    #[async_trait]
    impl Classifier for StubClassifier {
        async fn classify(&self, _request: ClassifyRequest) -> ClassifyResponse {
            if self.fail {
                ClassifyResponse::unknown(self.name.clone(), "stub failure")
            } else {
                ClassifyResponse { category: crate::models::category_path::CategoryPath::unknown(), worker: self.name.clone(), error: None }
            }
        }

        async fn advise_folder_action(&self, request: FolderAdviceRequest) -> FolderAdviceResponse {
            FolderAdviceResponse { action: request.rule_hint.unwrap_or(FolderAction::Keep), worker: self.name.clone(), error: None }
        }

        async fn close(&self) -> Result<(), String> {
            Ok(())
        }

        async fn ensure_available(&self) -> bool {
            !self.fail
        }

        fn display_name(&self) -> &str {
            &self.name
        }

        fn is_ai(&self) -> bool {
            true
        }
    }

    fn sample_request() -> ClassifyRequest {
        ClassifyRequest {
            name: "a.txt".to_string(),
            rel_path: "/a.txt".to_string(),
            mime: "text/plain".to_string(),
            sample: None,
            hint: None,
            metadata: FileMetadata::new(),
        }
    }

    #[tokio::test]
    async fn exercises_all_fresh_workers_before_weighting() {
        let mux = Multiplexer::new(
            vec![
                Arc::new(StubClassifier { name: "a".to_string(), fail: false }),
                Arc::new(StubClassifier { name: "b".to_string(), fail: false }),
            ],
            Duration::from_secs(1),
        );
        let mut seen = std::collections::HashSet::new();
        for _ in 0..2 {
            let response = mux.classify(sample_request()).await;
            seen.insert(response.worker);
        }
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn failing_worker_eventually_enters_cooldown_and_is_skipped() {
        let mux = Multiplexer::new(
            vec![
                Arc::new(StubClassifier { name: "bad".to_string(), fail: true }),
                Arc::new(StubClassifier { name: "good".to_string(), fail: false }),
            ],
            Duration::from_secs(60),
        );
        // exhaust the zero-history fast path for both workers first
        mux.classify(sample_request()).await;
        mux.classify(sample_request()).await;
        let mut saw_good_only = true;
        for _ in 0..20 {
            let response = mux.classify(sample_request()).await;
            if response.worker == "bad" {
                saw_good_only = false;
            }
        }
        assert!(saw_good_only);
    }

    #[tokio::test]
    async fn all_workers_in_cooldown_reports_no_workers_available() {
        let mux = Multiplexer::new(vec![Arc::new(StubClassifier { name: "bad".to_string(), fail: true })], Duration::from_secs(60));
        mux.classify(sample_request()).await;
        let response = mux.classify(sample_request()).await;
        assert!(response.error.is_some());
    }
}
