// =============================================================================
// config.rs — THE KNOBS
// =============================================================================
//
// Two kinds of configuration:
//
// 1. Runtime knobs (timeouts, worker budget, where to write things). These
//    come from environment variables prefixed with SUBSCAN_, optionally
//    loaded from a .env file. Every knob has a default and a bad value falls
//    back to that default rather than stopping the run.
//
// 2. The channel list, a YAML file with a `tgchannel` sequence. This one IS
//    fatal when it cannot be read: without channels there is nothing to do,
//    and we would rather stop before touching the network than write three
//    empty artifacts over yesterday's good ones.
// =============================================================================

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::ChannelSource;

#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // CHANNELS
    // =========================================================================
    /// Path to the YAML channel list.
    /// Default: ./channel.yaml
    pub channel_config_path: PathBuf,

    /// Prefix that turns a channel name into its public preview page.
    /// Default: https://t.me/s/
    pub channel_base_url: String,

    /// Per-request timeout for channel pages. Default: 15 seconds.
    pub channel_timeout: Duration,

    /// How many channel pages are fetched at once. Default: 8.
    pub channel_concurrency: usize,

    // =========================================================================
    // SUBSCRIPTION CHECKS
    // =========================================================================
    /// Worker budget: candidates checked at the same time. Default: 64.
    pub max_concurrent_checks: usize,

    /// Per-attempt timeout for a candidate GET. Default: 5 seconds.
    pub check_timeout: Duration,

    /// Total attempts per candidate, first try included. Default: 2.
    pub check_attempts: u32,

    /// User agent sent with every request. Airports tend to serve the clash
    /// flavour of a subscription (with the userinfo header) to clash clients.
    /// Default: clash-verge/v2.0.2
    pub user_agent: String,

    /// Remaining traffic must be strictly above this to count as usable.
    /// Default: 1 GiB.
    pub traffic_floor_bytes: u64,

    // =========================================================================
    // OUTPUT
    // =========================================================================
    /// Where latest.yaml, url.txt and v2ray.txt are written. Default: .
    pub output_dir: PathBuf,

    /// Seed the result sets from the previous latest.yaml. Default: false.
    pub merge_previous: bool,
}

impl Config {
    /// Load configuration from the environment, with defaults for everything.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Config {
            channel_config_path: PathBuf::from(env_or_default(
                "SUBSCAN_CHANNEL_CONFIG",
                "./channel.yaml",
            )),
            channel_base_url: env_or_default("SUBSCAN_CHANNEL_BASE_URL", "https://t.me/s/"),
            channel_timeout: Duration::from_secs(
                env_or_default("SUBSCAN_CHANNEL_TIMEOUT_SECS", "15")
                    .parse()
                    .unwrap_or(15),
            ),
            channel_concurrency: env_or_default("SUBSCAN_CHANNEL_CONCURRENCY", "8")
                .parse()
                .unwrap_or(8usize)
                .max(1),

            max_concurrent_checks: env_or_default("SUBSCAN_MAX_CONCURRENT_CHECKS", "64")
                .parse()
                .unwrap_or(64usize)
                .max(1),
            check_timeout: Duration::from_secs(
                env_or_default("SUBSCAN_CHECK_TIMEOUT_SECS", "5")
                    .parse()
                    .unwrap_or(5),
            ),
            check_attempts: env_or_default("SUBSCAN_CHECK_ATTEMPTS", "2")
                .parse()
                .unwrap_or(2u32)
                .max(1),
            user_agent: env_or_default("SUBSCAN_USER_AGENT", "clash-verge/v2.0.2"),
            traffic_floor_bytes: env_or_default("SUBSCAN_TRAFFIC_FLOOR_BYTES", "1073741824")
                .parse()
                .unwrap_or(1_073_741_824),

            output_dir: PathBuf::from(env_or_default("SUBSCAN_OUTPUT_DIR", ".")),
            merge_previous: parse_bool(&env_or_default("SUBSCAN_MERGE_PREVIOUS", "false")),
        }
    }

    /// Read the channel list and resolve every entry to a page address.
    pub fn load_channels(&self) -> Result<Vec<ChannelSource>, ConfigError> {
        load_channel_sources(&self.channel_config_path, &self.channel_base_url)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_config_path: PathBuf::from("./channel.yaml"),
            channel_base_url: "https://t.me/s/".to_string(),
            channel_timeout: Duration::from_secs(15),
            channel_concurrency: 8,
            max_concurrent_checks: 64,
            check_timeout: Duration::from_secs(5),
            check_attempts: 2,
            user_agent: "clash-verge/v2.0.2".to_string(),
            traffic_floor_bytes: 1_073_741_824,
            output_dir: PathBuf::from("."),
            merge_previous: false,
        }
    }
}

/// Everything that can go wrong loading the channel list. All of it is fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read channel list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("channel list {path} is not valid YAML (or has no `tgchannel` list): {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Deserialize)]
struct ChannelFile {
    tgchannel: Vec<String>,
}

/// Load `path` and turn each `tgchannel` entry into a [`ChannelSource`].
/// Entries that resolve to nothing are skipped with a warning.
pub fn load_channel_sources(
    path: &Path,
    base_url: &str,
) -> Result<Vec<ChannelSource>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let file: ChannelFile = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut sources = Vec::with_capacity(file.tgchannel.len());
    for entry in &file.tgchannel {
        match ChannelSource::from_config_entry(entry, base_url) {
            Some(source) => sources.push(source),
            None => warn!(entry = entry.as_str(), "Channel entry has no name segment, skipping"),
        }
    }

    info!(
        path = %path.display(),
        configured = file.tgchannel.len(),
        resolved = sources.len(),
        "Channel list loaded"
    );

    Ok(sources)
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
