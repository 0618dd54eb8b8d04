// =============================================================================
// scheduler.rs — THE WORKER BUDGET
// =============================================================================
//
// Every candidate gets its own tokio task, spawned up front. Each task has to
// take a permit from a shared semaphore before it touches the network, so no
// more than `max_concurrent` checks are ever in flight (64 by default). The
// permit is held for the whole check, retries included, and released when the
// task finishes.
//
// Results go out over a crossbeam channel to the aggregator, which is the only
// thing that ever mutates the result sets.
//
// The batch is done when every task has been joined. Progress is advanced in
// the join loop, once per joined task, which makes "exactly once per
// candidate" hold whether the check succeeded, failed, ran out of retries or
// panicked outright. Nothing a single candidate does can fail the batch.
// =============================================================================

use std::sync::Arc;

use crossbeam_channel::Sender;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::checker::SubscriptionChecker;
use crate::fetch::Fetcher;
use crate::metrics::RunMetrics;
use crate::models::{Candidate, ClassifiedCandidate};

/// Something that can show batch progress. Advanced once per candidate.
pub trait ProgressSink: Send + Sync {
    fn advance(&self);
}

impl ProgressSink for ProgressBar {
    fn advance(&self) {
        self.inc(1);
    }
}

/// The terminal progress bar for the check batch.
pub fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "订阅筛选：{wide_bar} {pos}/{len} [{elapsed_precise}<{eta_precise}]",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// What the batch looked like once it was over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub scheduled: usize,
    pub completed: usize,
    pub panicked: usize,
}

/// Check every candidate with at most `max_concurrent` checks in flight, and
/// return once all of them are done.
///
/// Every classified candidate is sent on `outcome_tx`. The sender is consumed;
/// once this returns, every clone of it is gone and the receiving side sees
/// the channel disconnect.
pub async fn run_batch<F>(
    candidates: Vec<Candidate>,
    checker: Arc<SubscriptionChecker<F>>,
    max_concurrent: usize,
    outcome_tx: Sender<ClassifiedCandidate>,
    progress: &dyn ProgressSink,
    metrics: &RunMetrics,
) -> BatchReport
where
    F: Fetcher + 'static,
{
    let scheduled = candidates.len();
    let max_concurrent = max_concurrent.max(1);
    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let mut tasks = JoinSet::new();

    info!(
        candidates = scheduled,
        max_concurrent,
        "Launching subscription checks"
    );

    for candidate in candidates {
        let semaphore = Arc::clone(&semaphore);
        let checker = Arc::clone(&checker);
        let outcome_tx = outcome_tx.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                // Only possible if the semaphore is closed, and nobody closes it.
                warn!(url = candidate.as_str(), "Worker semaphore closed, skipping");
                return;
            };

            let outcome = checker.check(&candidate).await;

            if let Some(classification) = outcome.classification() {
                let classified = ClassifiedCandidate {
                    url: candidate.0,
                    classification,
                };
                if let Err(e) = outcome_tx.send(classified) {
                    warn!(url = %e.0.url, "Aggregator is gone, result dropped");
                }
            }
        });
    }
    drop(outcome_tx);

    let mut completed = 0usize;
    let mut panicked = 0usize;
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            panicked += 1;
            warn!(error = %e, "Subscription check task died");
        }
        completed += 1;
        metrics.increment_checks_completed();
        progress.advance();
    }

    debug!(completed, panicked, "All subscription checks joined");

    BatchReport {
        scheduled,
        completed,
        panicked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ResponseClassifier;
    use crate::fetch::{FetchError, FetchSettings, FetchedResponse, ReqwestFetcher};
    use crate::models::Classification;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct CountingProgress(AtomicUsize);

    impl ProgressSink for CountingProgress {
        fn advance(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Tracks how many fetches are running at once. URLs containing "broken"
    /// always fail at the transport level; "clash" URLs serve a clash config;
    /// everything else serves junk.
    #[derive(Default)]
    struct GaugedFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for GaugedFetcher {
        async fn fetch_page(&self, _url: &str) -> Result<String, FetchError> {
            Ok(String::new())
        }

        async fn fetch_subscription(&self, url: &str) -> Result<FetchedResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(2)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if url.contains("broken") {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                });
            }
            let body = if url.contains("clash") {
                "proxies:\n  - name: n"
            } else {
                "<html></html>"
            };
            Ok(FetchedResponse {
                status: 200,
                userinfo: None,
                body: body.to_string(),
            })
        }
    }

    fn candidates(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| {
                let kind = match i % 3 {
                    0 => "clash",
                    1 => "broken",
                    _ => "junk",
                };
                Candidate(format!("https://n{i}.example/{kind}"))
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_budget_is_respected_and_every_candidate_advances_once() {
        let fetcher = Arc::new(GaugedFetcher::default());
        let metrics = Arc::new(RunMetrics::new());
        let checker = Arc::new(SubscriptionChecker::new(
            fetcher.clone(),
            ResponseClassifier::default(),
            2,
            metrics.clone(),
        ));
        let progress = CountingProgress::default();
        let (tx, rx) = crossbeam_channel::unbounded();

        let report = run_batch(candidates(150), checker, 8, tx, &progress, &metrics).await;

        assert_eq!(report.scheduled, 150);
        assert_eq!(report.completed, 150);
        assert_eq!(report.panicked, 0);
        assert_eq!(progress.0.load(Ordering::SeqCst), 150);
        assert_eq!(metrics.checks_completed(), 150);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 8);

        // 50 broken candidates were each tried twice.
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 100 + 50 * 2);

        // The channel is closed once the batch returns, so this terminates.
        let outcomes: Vec<ClassifiedCandidate> = rx.iter().collect();
        assert_eq!(outcomes.len(), 100);
        let unique: HashSet<_> = outcomes.iter().map(|o| o.url.clone()).collect();
        assert_eq!(unique.len(), 100);
        let clash = outcomes
            .iter()
            .filter(|o| o.classification == Classification::StructuredConfig)
            .count();
        assert_eq!(clash, 50);
    }

    #[tokio::test]
    async fn test_empty_batch_completes_immediately() {
        let fetcher = Arc::new(GaugedFetcher::default());
        let metrics = Arc::new(RunMetrics::new());
        let checker = Arc::new(SubscriptionChecker::new(
            fetcher,
            ResponseClassifier::default(),
            2,
            metrics.clone(),
        ));
        let progress = CountingProgress::default();
        let (tx, rx) = crossbeam_channel::unbounded();

        let report = run_batch(Vec::new(), checker, 64, tx, &progress, &metrics).await;

        assert_eq!(report.completed, 0);
        assert_eq!(progress.0.load(Ordering::SeqCst), 0);
        assert!(rx.recv().is_err());
    }

    #[tokio::test]
    async fn test_batch_over_real_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/usable"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("subscription-userinfo", "upload=100; download=100; total=2000000000"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/clash"))
            .respond_with(ResponseTemplate::new(200).set_body_string("mixed-port: 7890\nproxies:\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Arc::new(ReqwestFetcher::new(FetchSettings::default()).unwrap());
        let metrics = Arc::new(RunMetrics::new());
        let checker = Arc::new(SubscriptionChecker::new(
            fetcher,
            ResponseClassifier::default(),
            2,
            metrics.clone(),
        ));
        let progress = CountingProgress::default();
        let (tx, rx) = crossbeam_channel::unbounded();

        let batch = ["/usable", "/clash", "/gone"]
            .iter()
            .map(|p| Candidate(format!("{}{}", server.uri(), p)))
            .collect();
        let report = run_batch(batch, checker, 2, tx, &progress, &metrics).await;

        assert_eq!(report.completed, 3);
        assert_eq!(progress.0.load(Ordering::SeqCst), 3);

        let mut outcomes: Vec<_> = rx
            .iter()
            .map(|o| (o.url.rsplit('/').next().unwrap().to_string(), o.classification))
            .collect();
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            outcomes,
            vec![
                ("clash".to_string(), Classification::StructuredConfig),
                ("usable".to_string(), Classification::UsableSubscription),
            ]
        );
        assert_eq!(metrics.snapshot().non_success_status, 1);
    }
}
