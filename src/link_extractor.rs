// =============================================================================
// link_extractor.rs — THE PAGE SIEVE
// =============================================================================
//
// Takes the raw HTML of a channel preview page and pulls out two things:
//
// 1. Every http(s) URL that looks syntactically like a link. These become
//    subscription candidates once the keyword policy has had a look.
//
// 2. Every inline proxy share link (vmess://, vless://, ss://, ssr://,
//    trojan://, hy2://, hysteria2://). These are not fetched or checked at all,
//    they go straight to v2ray.txt.
//
// Both patterns are compiled once. Extraction is pure: no network, no shared
// state, never fails. Duplicates within a page are allowed here; deduplication
// happens further down the pipeline.
// =============================================================================

use rayon::prelude::*;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// scheme + host + path/query characters, not allowed to end on punctuation
/// that usually belongs to the surrounding sentence.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[-A-Za-z0-9+&@#/%?=~_|!:,.;]+[-A-Za-z0-9+&@#/%=~_|]")
        .expect("URL pattern is a valid regex")
});

/// Share-link schemes that are kept verbatim when they appear in page text.
pub const INLINE_PROXY_SCHEMES: &[&str] = &[
    "vmess://",
    "vless://",
    "ss://",
    "ssr://",
    "trojan://",
    "hy2://",
    "hysteria2://",
];

/// One alternation per scheme, each followed by a run of anything that is not
/// whitespace and not the start of the next HTML tag.
static INLINE_PROXY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = INLINE_PROXY_SCHEMES
        .iter()
        .map(|scheme| format!(r"{}[^\s<]+", regex::escape(scheme)))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation).expect("inline proxy pattern is a valid regex")
});

/// Everything the sieve caught on one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedLinks {
    /// Generic http(s) URLs, in page order, duplicates included.
    pub urls: Vec<String>,
    /// Inline proxy share links, in page order, duplicates included.
    pub inline_proxies: Vec<String>,
}

impl ExtractedLinks {
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty() && self.inline_proxies.is_empty()
    }
}

/// Extract URLs and inline proxy links from one page.
pub fn extract_links(page: &str) -> ExtractedLinks {
    if page.is_empty() {
        return ExtractedLinks::default();
    }

    let urls = URL_PATTERN
        .find_iter(page)
        .map(|m| m.as_str().to_string())
        .collect::<Vec<_>>();

    // The inline pattern can only match where "://" occurs at all.
    let inline_proxies = if memchr::memmem::find(page.as_bytes(), b"://").is_some() {
        INLINE_PROXY_PATTERN
            .find_iter(page)
            .map(|m| m.as_str().to_string())
            .collect()
    } else {
        Vec::new()
    };

    debug!(
        urls = urls.len(),
        inline_proxies = inline_proxies.len(),
        page_bytes = page.len(),
        "Page sieved"
    );

    ExtractedLinks {
        urls,
        inline_proxies,
    }
}

/// Sieve many pages at once, one rayon task per page. Output order matches
/// input order.
pub fn extract_batch(pages: &[&str]) -> Vec<ExtractedLinks> {
    pages.par_iter().map(|page| extract_links(page)).collect()
}
