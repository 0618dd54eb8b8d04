// =============================================================================
// candidate_filter.rs — THE BOUNCER
// =============================================================================
//
// Channel pages are full of links to everything: other channels, image hosts,
// shops, news. A URL only gets into the fetch queue if it contains at least
// one allow keyword and none of the deny keywords.
//
// Matching is plain substring containment and it is case-sensitive. "SUB" does
// not count as "sub". There is no URL normalisation either: what the page
// says is what gets matched.
//
// Each keyword list is compiled into an Aho-Corasick automaton so a URL is
// checked against the whole list in a single pass.
// =============================================================================

use aho_corasick::AhoCorasick;
use std::sync::LazyLock;

/// Substrings that suggest a URL serves a subscription of some kind.
pub const DEFAULT_ALLOW_KEYWORDS: &[&str] = &[
    "sub",
    "clash",
    "paste",
    "tt.vg",
    "shz.al",
    "proxies",
    "raw.githubusercontent.com",
];

/// Substrings that disqualify a URL no matter what else it contains. Links
/// back into Telegram itself are never subscriptions.
pub const DEFAULT_DENY_KEYWORDS: &[&str] = &["https://t.me/"];

static DEFAULT_POLICY: LazyLock<KeywordPolicy> = LazyLock::new(|| {
    KeywordPolicy::new(DEFAULT_ALLOW_KEYWORDS, DEFAULT_DENY_KEYWORDS)
        .expect("default keyword lists build valid automatons")
});

/// Allow/deny keyword policy for candidate URLs.
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    allow: AhoCorasick,
    deny: Option<AhoCorasick>,
}

impl KeywordPolicy {
    /// Build a policy from explicit keyword lists. An empty allow list accepts
    /// nothing; an empty deny list denies nothing.
    pub fn new(allow: &[&str], deny: &[&str]) -> Result<Self, aho_corasick::BuildError> {
        let allow = AhoCorasick::new(allow)?;
        let deny = if deny.is_empty() {
            None
        } else {
            Some(AhoCorasick::new(deny)?)
        };
        Ok(Self { allow, deny })
    }

    /// Whether `url` may become a candidate.
    pub fn accepts(&self, url: &str) -> bool {
        let denied = self
            .deny
            .as_ref()
            .is_some_and(|deny| deny.is_match(url));
        !denied && self.allow.is_match(url)
    }

    /// Keep only the accepted URLs, preserving order and duplicates.
    pub fn filter<'a, I>(&self, urls: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        urls.into_iter()
            .filter(|url| self.accepts(url))
            .cloned()
            .collect()
    }
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        DEFAULT_POLICY.clone()
    }
}
