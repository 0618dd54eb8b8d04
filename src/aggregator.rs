// =============================================================================
// aggregator.rs — THE SINGLE WRITER
// =============================================================================
//
// Scheduler workers never touch the result sets. They send ClassifiedCandidate
// values down a crossbeam channel and this aggregator, the one and only
// consumer, files each URL into its bucket:
//
//   UsableSubscription -> subscriptions  (机场订阅)
//   StructuredConfig   -> clash          (clash订阅)
//   EncodedPayload     -> v2             (v2订阅)
//   anything else      -> nowhere
//
// The buckets are ordered sets, so duplicates collapse on insert and emission
// is sorted no matter what order the workers finished in. Inline proxy links
// from the channel pages ride along and get deduplicated, sorted and
// percent-decoded on the way out.
//
// Seeding: entries from a previous run can be poured in before anything else
// and are unioned with this run's findings.
// =============================================================================

use std::collections::BTreeSet;

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::models::{Classification, ClassifiedCandidate, CollectedData};

#[derive(Debug, Default, Clone)]
pub struct ResultAggregator {
    subscriptions: BTreeSet<String>,
    clash: BTreeSet<String>,
    v2: BTreeSet<String>,
    inline_links: BTreeSet<String>,
}

/// What gets written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub collected: CollectedData,
    /// Deduplicated, sorted on the raw form, then percent-decoded.
    pub inline_links: Vec<String>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previous run's mapping.
    pub fn seeded(previous: CollectedData) -> Self {
        let aggregator = Self {
            subscriptions: previous.subscriptions.into_iter().collect(),
            clash: previous.clash.into_iter().collect(),
            v2: previous.v2.into_iter().collect(),
            inline_links: BTreeSet::new(),
        };
        info!(
            subscriptions = aggregator.subscriptions.len(),
            clash = aggregator.clash.len(),
            v2 = aggregator.v2.len(),
            "Result sets seeded from previous run"
        );
        aggregator
    }

    /// File one classified candidate. Returns `true` if it landed in a bucket
    /// it was not already in.
    pub fn record(&mut self, outcome: ClassifiedCandidate) -> bool {
        let bucket = match outcome.classification {
            Classification::UsableSubscription => &mut self.subscriptions,
            Classification::StructuredConfig => &mut self.clash,
            Classification::EncodedPayload => &mut self.v2,
            Classification::Exhausted | Classification::Rejected => return false,
        };
        bucket.insert(outcome.url)
    }

    pub fn add_inline_links<I>(&mut self, links: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.inline_links.extend(links);
    }

    /// Drain `receiver` until every sender is gone. Blocks the calling
    /// thread; run it somewhere that is allowed to block.
    pub fn absorb(&mut self, receiver: Receiver<ClassifiedCandidate>) -> usize {
        let mut received = 0usize;
        let mut kept = 0usize;
        for outcome in receiver.iter() {
            received += 1;
            if outcome.classification.is_kept() {
                kept += 1;
            }
            let url = outcome.url.clone();
            let classification = outcome.classification;
            if self.record(outcome) {
                debug!(url = url.as_str(), classification = %classification, "Result recorded");
            }
        }
        debug!(received, kept, "Outcome channel drained");
        received
    }

    /// Sorted, deduplicated output. Does not consume the aggregator, and
    /// calling it twice gives the same answer twice.
    pub fn emit(&self) -> Emission {
        Emission {
            collected: CollectedData {
                subscriptions: self.subscriptions.iter().cloned().collect(),
                clash: self.clash.iter().cloned().collect(),
                v2: self.v2.iter().cloned().collect(),
            },
            inline_links: self.inline_links.iter().map(|l| percent_decode(l)).collect(),
        }
    }
}

/// `%XX` sequences decoded; bytes that do not form valid UTF-8 afterwards are
/// replaced rather than failing the whole link.
pub fn percent_decode(link: &str) -> String {
    let decoded = urlencoding::decode_binary(link.as_bytes());
    String::from_utf8_lossy(&decoded).into_owned()
}
