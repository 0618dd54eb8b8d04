// ███████╗██╗   ██╗██████╗ ███████╗ ██████╗ █████╗ ███╗   ██╗
// ██╔════╝██║   ██║██╔══██╗██╔════╝██╔════╝██╔══██╗████╗  ██║
// ███████╗██║   ██║██████╔╝███████╗██║     ███████║██╔██╗ ██║
// ╚════██║██║   ██║██╔══██╗╚════██║██║     ██╔══██║██║╚██╗██║
// ███████║╚██████╔╝██████╔╝███████║╚██████╗██║  ██║██║ ╚████║
// ╚══════╝ ╚═════╝ ╚═════╝ ╚══════╝ ╚═════╝╚═╝  ╚═╝╚═╝  ╚═══╝
//
// One run, start to finish:
// channel pages -> candidate links -> bounded concurrent checks -> three files.

mod aggregator;
mod candidate_filter;
mod checker;
mod classifier;
mod config;
mod dedup;
mod fetch;
mod harvest;
mod link_extractor;
mod metrics;
mod models;
mod output;
mod scheduler;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::aggregator::ResultAggregator;
use crate::candidate_filter::KeywordPolicy;
use crate::checker::SubscriptionChecker;
use crate::classifier::ResponseClassifier;
use crate::config::Config;
use crate::fetch::{FetchSettings, ReqwestFetcher};
use crate::metrics::RunMetrics;
use crate::models::ClassifiedCandidate;
use crate::output::ArtifactWriter;

fn print_banner() {
    let banner = r#"
    ╔══════════════════════════════════════════════════════════╗
    ║   S U B S C A N                                          ║
    ║                                                          ║
    ║   Sources:   public Telegram channel previews            ║
    ║   Checks:    64 in flight, 5s timeout, 2 attempts        ║
    ║   Outputs:   latest.yaml | url.txt | v2ray.txt           ║
    ╚══════════════════════════════════════════════════════════╝
    "#;
    println!("{}", banner);
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    print_banner();

    let config = Config::from_env();
    info!(
        channel_config = %config.channel_config_path.display(),
        output_dir = %config.output_dir.display(),
        max_concurrent_checks = config.max_concurrent_checks,
        check_timeout_secs = config.check_timeout.as_secs(),
        check_attempts = config.check_attempts,
        "Configuration loaded"
    );

    // Without channels there is nothing to do; stop before touching anything.
    let channels = config
        .load_channels()
        .context("loading channel list")?;

    let metrics = Arc::new(RunMetrics::new());
    let fetcher = Arc::new(
        ReqwestFetcher::new(FetchSettings::from_config(&config)).context("building HTTP client")?,
    );
    let writer = ArtifactWriter::new(&config.output_dir);

    // ═══════════════════════════════════════════
    // HARVEST
    // ═══════════════════════════════════════════
    let harvest = harvest::harvest_channels(
        fetcher.as_ref(),
        &channels,
        config.channel_concurrency,
        &KeywordPolicy::default(),
        &metrics,
    )
    .await;

    // ═══════════════════════════════════════════
    // AGGREGATOR (single consumer, blocking thread)
    // ═══════════════════════════════════════════
    let mut aggregator = if config.merge_previous {
        match writer.load_previous() {
            Ok(Some(previous)) => ResultAggregator::seeded(previous),
            Ok(None) => ResultAggregator::new(),
            Err(e) => {
                warn!(error = %e, "Previous results unreadable, starting from scratch");
                ResultAggregator::new()
            }
        }
    } else {
        ResultAggregator::new()
    };
    aggregator.add_inline_links(harvest.inline_links.iter().cloned());

    let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded::<ClassifiedCandidate>();
    let collector = tokio::task::spawn_blocking(move || {
        let received = aggregator.absorb(outcome_rx);
        (aggregator, received)
    });

    // ═══════════════════════════════════════════
    // CHECKS
    // ═══════════════════════════════════════════
    let checker = Arc::new(SubscriptionChecker::new(
        Arc::clone(&fetcher),
        ResponseClassifier::new(config.traffic_floor_bytes),
        config.check_attempts,
        Arc::clone(&metrics),
    ));
    let bar = scheduler::progress_bar(harvest.candidates.len() as u64);
    let report = scheduler::run_batch(
        harvest.candidates.clone(),
        checker,
        config.max_concurrent_checks,
        outcome_tx,
        &bar,
        &metrics,
    )
    .await;
    bar.finish();

    let (aggregator, received) = collector.await.context("aggregator thread died")?;
    let emission = aggregator.emit();

    // ═══════════════════════════════════════════
    // OUTPUT
    // ═══════════════════════════════════════════
    writer
        .write_all(&emission.collected, &harvest.candidates, &emission.inline_links)
        .with_context(|| format!("writing artifacts to {}", writer.dir().display()))?;

    let snapshot = metrics.snapshot();
    info!(
        scheduled = report.scheduled,
        completed = report.completed,
        panicked = report.panicked,
        outcomes_received = received,
        duplicate_links = harvest.pool.duplicates,
        "Check batch finished"
    );
    info!(
        summary = %serde_json::to_string(&snapshot).unwrap_or_default(),
        "Run complete"
    );
    info!(
        "机场订阅: {} | clash订阅: {} | v2订阅: {} | inline links: {}",
        emission.collected.subscriptions.len(),
        emission.collected.clash.len(),
        emission.collected.v2.len(),
        emission.inline_links.len()
    );

    Ok(())
}
