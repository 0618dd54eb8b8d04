// =============================================================================
// models.rs — THE NOUNS OF THE SUBSCRIPTION HUNT
// =============================================================================
//
// Everything that flows through the pipeline lives here: the channel pages we
// read, the candidate links we pull out of them, the verdict the classifier
// hands back for each candidate, and the mapping that finally lands on disk.
//
// Channel sources and candidates move through the pipeline linearly. The only
// thing many workers touch at once is the stream of ClassifiedCandidate values,
// and that goes through a channel to exactly one consumer (see aggregator.rs).
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// A Telegram channel, resolved to the public preview page we scrape.
///
/// Built once from the configured channel list and never mutated after that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSource {
    /// The channel name, i.e. the last path segment of the configured URL.
    pub name: String,
    /// The page we actually POST to, e.g. `https://t.me/s/<name>`.
    pub page_url: String,
}

impl ChannelSource {
    /// Resolve one configured entry against the page base URL.
    ///
    /// The entry may be a full channel URL (`https://t.me/foo`), something
    /// URL-ish without a scheme (`t.me/foo`), or a bare name (`foo`). Only the
    /// last non-empty path segment survives. Returns `None` when there is no
    /// segment to speak of.
    pub fn from_config_entry(entry: &str, base_url: &str) -> Option<Self> {
        let entry = entry.trim();
        let name = match url::Url::parse(entry) {
            Ok(parsed) if parsed.has_host() => parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string),
            _ => entry
                .split('/')
                .filter(|s| !s.is_empty())
                .last()
                .map(str::to_string),
        }?;

        if name.is_empty() {
            return None;
        }

        let page_url = format!("{}{}", base_url, name);
        Some(Self { name, page_url })
    }
}

impl fmt::Display for ChannelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.page_url)
    }
}

/// A URL that passed the keyword policy and is waiting to be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Candidate(pub String);

impl Candidate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The verdict for one candidate that answered with a success status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Traffic metadata says there is life left in it: not expired and more
    /// than the traffic floor remaining.
    UsableSubscription,

    /// Traffic metadata was there and it says "done". Expired, or drained
    /// below the floor. Dropped from the outputs.
    Exhausted,

    /// The body looks like a clash config (`proxies:` somewhere in it).
    StructuredConfig,

    /// The head of the body is base64 that decodes to proxy share links.
    EncodedPayload,

    /// None of the sniffs matched. Dropped silently.
    Rejected,
}

impl Classification {
    /// Whether this verdict ends up in one of the output buckets.
    pub fn is_kept(self) -> bool {
        matches!(
            self,
            Classification::UsableSubscription
                | Classification::StructuredConfig
                | Classification::EncodedPayload
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::UsableSubscription => write!(f, "USABLE_SUBSCRIPTION"),
            Classification::Exhausted => write!(f, "EXHAUSTED"),
            Classification::StructuredConfig => write!(f, "STRUCTURED_CONFIG"),
            Classification::EncodedPayload => write!(f, "ENCODED_PAYLOAD"),
            Classification::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// What a scheduler worker sends to the aggregator: the verdict plus the URL
/// it belongs to. Nothing else about the response survives this point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedCandidate {
    pub url: String,
    pub classification: Classification,
}

/// The structured output artifact, `latest.yaml`.
///
/// The keys are the ones downstream consumers of this file already read, so
/// they stay exactly as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedData {
    /// Airport subscriptions with traffic left.
    #[serde(rename = "机场订阅", default)]
    pub subscriptions: Vec<String>,

    /// Clash configs.
    #[serde(rename = "clash订阅", default)]
    pub clash: Vec<String>,

    /// Base64-encoded v2 node lists.
    #[serde(rename = "v2订阅", default)]
    pub v2: Vec<String>,
}
