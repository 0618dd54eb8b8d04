// =============================================================================
// harvest.rs — FROM CHANNEL LIST TO CANDIDATE LIST
// =============================================================================
//
// Page fetch -> link extraction -> keyword policy -> candidate pool.
//
// Pages are fetched a few at a time. A channel that cannot be fetched is
// logged and contributes nothing; the run carries on with whatever the other
// channels produced. Once every page is in, extraction and filtering fan out
// over rayon and everything lands in one CandidatePool, which makes sure each
// URL is checked exactly once no matter how many channels reposted it.
//
// Inline proxy links are not filtered or deduplicated here. They are collected
// raw and the aggregator sorts them out at the end.
// =============================================================================

use futures::future;
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::candidate_filter::KeywordPolicy;
use crate::dedup::{CandidatePool, PoolSnapshot};
use crate::fetch::Fetcher;
use crate::link_extractor::{self, ExtractedLinks};
use crate::metrics::RunMetrics;
use crate::models::{Candidate, ChannelSource};

/// Everything the channels gave us.
#[derive(Debug, Clone)]
pub struct Harvest {
    /// Accepted URLs, deduplicated, in first-seen order.
    pub candidates: Vec<Candidate>,
    /// Inline share links, raw, duplicates included.
    pub inline_links: Vec<String>,
    pub pool: PoolSnapshot,
}

/// Fetch every channel page, at most `concurrency` at a time, and sieve the
/// results. Never fails as a whole.
pub async fn harvest_channels<F>(
    fetcher: &F,
    channels: &[ChannelSource],
    concurrency: usize,
    policy: &KeywordPolicy,
    metrics: &RunMetrics,
) -> Harvest
where
    F: Fetcher + ?Sized,
{
    info!(
        channels = channels.len(),
        concurrency,
        "Fetching channel pages"
    );

    let pages: Vec<String> = stream::iter(channels)
        .map(|channel| async move {
            match fetcher.fetch_page(&channel.page_url).await {
                Ok(page) => {
                    metrics.increment_channels_fetched();
                    info!(channel = channel.name.as_str(), bytes = page.len(), "Channel page fetched");
                    Some(page)
                }
                Err(e) => {
                    metrics.increment_channels_failed();
                    warn!(channel = channel.name.as_str(), error = %e, "Channel page fetch failed, skipping");
                    None
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(future::ready)
        .collect()
        .await;

    sieve_pages(&pages, policy, metrics)
}

/// Extract, filter and pool the links of already-fetched pages.
pub fn sieve_pages(pages: &[String], policy: &KeywordPolicy, metrics: &RunMetrics) -> Harvest {
    let page_refs: Vec<&str> = pages.iter().map(String::as_str).collect();
    let extracted: Vec<ExtractedLinks> = link_extractor::extract_batch(&page_refs);

    let pool = CandidatePool::new();
    extracted.par_iter().for_each(|links| {
        for url in policy.filter(&links.urls) {
            pool.check_and_insert(&url);
        }
    });

    let url_count: usize = extracted.iter().map(|links| links.urls.len()).sum();
    let barren_pages = extracted.iter().filter(|links| links.is_empty()).count();
    let inline_links: Vec<String> = extracted
        .into_iter()
        .flat_map(|links| links.inline_proxies)
        .collect();
    metrics.add_extracted(url_count, inline_links.len());

    if pool.is_empty() {
        warn!(pages = pages.len(), "No candidate passed the keyword policy");
    }

    let snapshot = pool.snapshot();
    info!(
        pages = pages.len(),
        barren_pages,
        urls = url_count,
        accepted = snapshot.offered,
        candidates = pool.len(),
        duplicates = snapshot.duplicates,
        inline_links = inline_links.len(),
        "Channel pages sieved"
    );

    let candidates = pool.into_candidates();
    metrics.add_candidates_accepted(candidates.len());

    Harvest {
        candidates,
        inline_links,
        pool: snapshot,
    }
}
