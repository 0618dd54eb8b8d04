// =============================================================================
// checker.rs — ONE CANDIDATE, START TO FINISH
// =============================================================================
//
// GET the candidate, retry once if the request itself blew up, and hand a
// successful response to the classifier.
//
// What counts as "blew up": connection errors, timeouts, a body that could
// not be read. What does NOT: any status other than 200. A 403 or a 404 is an
// answer, and asking again will not change it, so the candidate is simply
// dropped without a retry.
//
// The checker never returns an error. Whatever happens is folded into a
// CheckOutcome, logged at debug, counted, and the scheduler moves on.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::classifier::ResponseClassifier;
use crate::fetch::Fetcher;
use crate::metrics::RunMetrics;
use crate::models::{Candidate, Classification};

/// How one candidate check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Got a 200 and ran the sniff cascade.
    Classified(Classification),
    /// The server answered with anything other than 200.
    NonSuccessStatus(u16),
    /// Every attempt failed at the transport level.
    Failed,
}

impl CheckOutcome {
    pub fn classification(self) -> Option<Classification> {
        match self {
            CheckOutcome::Classified(classification) => Some(classification),
            _ => None,
        }
    }
}

pub struct SubscriptionChecker<F: Fetcher> {
    fetcher: Arc<F>,
    classifier: ResponseClassifier,
    attempts: u32,
    metrics: Arc<RunMetrics>,
}

impl<F: Fetcher> SubscriptionChecker<F> {
    /// `attempts` is the total number of tries, first one included. Zero is
    /// treated as one.
    pub fn new(
        fetcher: Arc<F>,
        classifier: ResponseClassifier,
        attempts: u32,
        metrics: Arc<RunMetrics>,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            attempts: attempts.max(1),
            metrics,
        }
    }

    pub async fn check(&self, candidate: &Candidate) -> CheckOutcome {
        self.check_at(candidate, || Utc::now().timestamp()).await
    }

    /// Same as [`check`](Self::check), with the clock supplied by the caller.
    pub async fn check_at<C>(&self, candidate: &Candidate, now: C) -> CheckOutcome
    where
        C: Fn() -> i64,
    {
        let url = candidate.as_str();

        for attempt in 1..=self.attempts {
            self.metrics.increment_fetch_attempts();

            let response = match self.fetcher.fetch_subscription(url).await {
                Ok(response) => response,
                Err(e) => {
                    if attempt < self.attempts {
                        self.metrics.increment_fetch_retries();
                        debug!(url, attempt, error = %e, "Candidate fetch failed, retrying");
                        continue;
                    }
                    self.metrics.increment_fetch_failures();
                    debug!(url, attempt, error = %e, "Candidate fetch failed, giving up");
                    return CheckOutcome::Failed;
                }
            };

            if !response.is_success() {
                self.metrics.increment_non_success_status();
                debug!(url, status = response.status, "Candidate answered with non-success status");
                return CheckOutcome::NonSuccessStatus(response.status);
            }

            let classification =
                self.classifier
                    .classify(response.userinfo.as_deref(), &response.body, now());
            self.metrics.record_classification(classification);
            debug!(url, classification = %classification, "Candidate classified");
            return CheckOutcome::Classified(classification);
        }

        // attempts >= 1, so the loop always returns.
        CheckOutcome::Failed
    }
}
