// =============================================================================
// classifier.rs — THE SNIFFER
// =============================================================================
//
// Given one successful response, decide what it is. Three sniffs, tried in a
// strict order, first hit wins:
//
//   1. Traffic header. If the server sent a non-empty `subscription-userinfo`
//      header we can read, the candidate is judged on that alone: usable if
//      it has not expired and more than the traffic floor is left, exhausted
//      otherwise. An exhausted subscription is NOT given a second chance by
//      the body sniffs below.
//
//   2. Structured config. The body contains the literal `proxies:`, which is
//      how every clash config we care about announces its node list.
//
//   3. Encoded payload. The first 64 characters of the body are base64 that
//      decode to something containing a share-link scheme (ss://, vmess://,
//      ...). Stray characters are skipped, but what is left must be properly
//      padded: a head that does not come out to whole 4-char groups is no
//      match.
//
// Nothing matched: Rejected.
//
// Step 1 only decides when the header is actually evaluable. A header that is
// missing, empty, or lacks a parseable upload/download/total triple hands over
// to step 2, with one exception: an expiry that has already passed ends the
// cascade right there, triple or no triple.
//
// Every sniff returns Option. Parse failures, decode failures and missing
// fields are all just "no match"; nothing in here can fail.
// =============================================================================

use aho_corasick::AhoCorasick;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

use crate::models::Classification;

/// 1 GiB. Remaining traffic has to be strictly above this.
pub const DEFAULT_TRAFFIC_FLOOR_BYTES: u64 = 1_073_741_824;

/// How many characters of the body the encoded-payload sniff looks at.
pub const ENCODED_SNIFF_CHARS: usize = 64;

/// Marker for the structured-config sniff.
const STRUCTURED_MARKER: &[u8] = b"proxies:";

/// Expiry values with at least this many digits are milliseconds.
const MILLIS_THRESHOLD: u128 = 1_000_000_000_000;

static TRAFFIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"upload=(\d+); download=(\d+); total=(\d+)").expect("traffic pattern is valid")
});

static EXPIRE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"expire=(\d+)").expect("expire pattern is valid"));

/// Schemes whose presence in a decoded payload marks it as a node list.
static SHARE_LINK_SCHEMES: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::new(["ss://", "ssr://", "vmess://", "trojan://", "vless://"])
        .expect("share-link automaton builds")
});

/// Standard alphabet with canonical padding. Trailing bits in the last group
/// are ignored rather than rejected.
const PAYLOAD_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

/// Upload/download/total as reported by the `subscription-userinfo` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficInfo {
    pub upload: u128,
    pub download: u128,
    pub total: u128,
}

impl TrafficInfo {
    /// `total - (upload + download)`. Negative when the airport let you
    /// overdraw. `None` only if the numbers are too large to do sums with.
    pub fn remaining(&self) -> Option<i128> {
        let upload = i128::try_from(self.upload).ok()?;
        let download = i128::try_from(self.download).ok()?;
        let total = i128::try_from(self.total).ok()?;
        Some(total - upload.checked_add(download)?)
    }
}

/// Pull the first `upload=..; download=..; total=..` triple out of a header.
pub fn parse_traffic(userinfo: &str) -> Option<TrafficInfo> {
    let caps = TRAFFIC_PATTERN.captures(userinfo)?;
    Some(TrafficInfo {
        upload: caps[1].parse().ok()?,
        download: caps[2].parse().ok()?,
        total: caps[3].parse().ok()?,
    })
}

/// Pull `expire=` out of a header, normalised to Unix seconds.
///
/// Thirteen digits or more means milliseconds, which are truncated to whole
/// seconds. A number too long for u128 is treated as the far future.
pub fn parse_expire(userinfo: &str) -> Option<u128> {
    let caps = EXPIRE_PATTERN.captures(userinfo)?;
    let raw: u128 = caps[1].parse().unwrap_or(u128::MAX);
    if raw >= MILLIS_THRESHOLD {
        Some(raw / 1000)
    } else {
        Some(raw)
    }
}

/// Strictly after `now`. An expiry of exactly now is already expired.
fn is_future(expire_secs: u128, now_secs: i64) -> bool {
    match u128::try_from(now_secs) {
        Ok(now) => expire_secs > now,
        // Before 1970: everything is in the future.
        Err(_) => true,
    }
}

/// Response classifier with a configurable traffic floor.
#[derive(Debug, Clone, Copy)]
pub struct ResponseClassifier {
    traffic_floor: u64,
}

impl ResponseClassifier {
    pub fn new(traffic_floor: u64) -> Self {
        Self { traffic_floor }
    }

    /// Classify a successful response.
    ///
    /// `now_secs` is the current Unix time in seconds, passed in so tests can
    /// pin it.
    pub fn classify(&self, userinfo: Option<&str>, body: &str, now_secs: i64) -> Classification {
        if let Some(verdict) = self.sniff_traffic(userinfo, now_secs) {
            return verdict;
        }

        sniff_structured_config(body)
            .or_else(|| sniff_encoded_payload(body))
            .unwrap_or(Classification::Rejected)
    }

    /// Step 1. `None` means the header is not evaluable and the body sniffs
    /// get their turn.
    fn sniff_traffic(&self, userinfo: Option<&str>, now_secs: i64) -> Option<Classification> {
        let userinfo = userinfo.filter(|value| !value.is_empty())?;

        if let Some(expire) = parse_expire(userinfo) {
            if !is_future(expire, now_secs) {
                trace!(expire = %expire, now = now_secs, "Subscription expired");
                return Some(Classification::Exhausted);
            }
        }

        let remaining = parse_traffic(userinfo)?.remaining()?;
        if remaining > i128::from(self.traffic_floor) {
            Some(Classification::UsableSubscription)
        } else {
            trace!(remaining = %remaining, "Subscription below traffic floor");
            Some(Classification::Exhausted)
        }
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TRAFFIC_FLOOR_BYTES)
    }
}

/// Step 2.
pub fn sniff_structured_config(body: &str) -> Option<Classification> {
    memchr::memmem::find(body.as_bytes(), STRUCTURED_MARKER)
        .map(|_| Classification::StructuredConfig)
}

/// Step 3. Characters outside the base64 alphabet (line breaks, mostly) are
/// skipped before decoding; the rest must still be correctly padded.
pub fn sniff_encoded_payload(body: &str) -> Option<Classification> {
    let cleaned: Vec<u8> = body
        .chars()
        .take(ENCODED_SNIFF_CHARS)
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .map(|c| c as u8)
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let decoded = PAYLOAD_BASE64.decode(&cleaned).ok()?;
    SHARE_LINK_SCHEMES
        .is_match(&decoded)
        .then_some(Classification::EncodedPayload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    // 2023-11-14T22:13:20Z
    const NOW: i64 = 1_700_000_000;

    fn classify(userinfo: Option<&str>, body: &str) -> Classification {
        ResponseClassifier::default().classify(userinfo, body, NOW)
    }

    #[test]
    fn test_plenty_of_traffic_without_expiry_is_usable() {
        let verdict = classify(Some("upload=100; download=100; total=2000000000"), "");
        assert_eq!(verdict, Classification::UsableSubscription);
    }

    #[test]
    fn test_below_floor_is_exhausted_without_fallthrough() {
        // The body would pass both body sniffs; it must not matter.
        let body = "proxies:\n  - name: a";
        let verdict = classify(Some("upload=100; download=100; total=1000000000"), body);
        assert_eq!(verdict, Classification::Exhausted);
    }

    #[test]
    fn test_exactly_at_floor_is_exhausted() {
        let verdict = classify(Some("upload=0; download=0; total=1073741824"), "");
        assert_eq!(verdict, Classification::Exhausted);
        let verdict = classify(Some("upload=0; download=0; total=1073741825"), "");
        assert_eq!(verdict, Classification::UsableSubscription);
    }

    #[test]
    fn test_overdrawn_subscription_is_exhausted() {
        let verdict = classify(Some("upload=9000000000; download=1; total=2000000000"), "");
        assert_eq!(verdict, Classification::Exhausted);
    }

    #[test]
    fn test_future_expiry_in_seconds_is_usable() {
        let header = "upload=1; download=1; total=5000000000; expire=1800000000";
        assert_eq!(classify(Some(header), ""), Classification::UsableSubscription);
    }

    #[test]
    fn test_future_expiry_in_millis_is_usable() {
        let header = "upload=1; download=1; total=5000000000; expire=1800000000000";
        assert_eq!(classify(Some(header), ""), Classification::UsableSubscription);
    }

    #[test]
    fn test_past_expiry_is_exhausted() {
        let header = "upload=1; download=1; total=5000000000; expire=1600000000";
        assert_eq!(classify(Some(header), "proxies:"), Classification::Exhausted);
        let header = "upload=1; download=1; total=5000000000; expire=1600000000000";
        assert_eq!(classify(Some(header), "proxies:"), Classification::Exhausted);
    }

    #[test]
    fn test_expiry_equal_to_now_is_not_future() {
        let header = format!("upload=1; download=1; total=5000000000; expire={NOW}");
        assert_eq!(classify(Some(&header), ""), Classification::Exhausted);

        let header = format!("upload=1; download=1; total=5000000000; expire={}", NOW + 1);
        assert_eq!(classify(Some(&header), ""), Classification::UsableSubscription);
    }

    #[test]
    fn test_millis_truncate_to_whole_seconds() {
        // 500ms past "now" truncates to exactly now, which is not the future.
        let header = format!("upload=1; download=1; total=5000000000; expire={}500", NOW);
        assert_eq!(classify(Some(&header), ""), Classification::Exhausted);
    }

    #[test]
    fn test_missing_header_falls_through_to_structured_config() {
        assert_eq!(
            classify(None, "port: 7890\nproxies:\n  - name: a"),
            Classification::StructuredConfig
        );
    }

    #[test]
    fn test_empty_header_falls_through() {
        assert_eq!(classify(Some(""), "proxies:"), Classification::StructuredConfig);
    }

    #[test]
    fn test_header_without_traffic_triple_falls_through() {
        assert_eq!(
            classify(Some("expire=1800000000"), "proxies:"),
            Classification::StructuredConfig
        );
        assert_eq!(
            classify(Some("upload=1;download=2;total=3"), "proxies:"),
            Classification::StructuredConfig
        );
    }

    #[test]
    fn test_header_without_triple_but_expired_is_exhausted() {
        assert_eq!(
            classify(Some("expire=1600000000"), "proxies:"),
            Classification::Exhausted
        );
    }

    #[test]
    fn test_absurd_numbers_fall_through() {
        let header = format!("upload={}; download=1; total=1", "9".repeat(60));
        assert_eq!(classify(Some(&header), "proxies:"), Classification::StructuredConfig);
    }

    #[test]
    fn test_encoded_payload_with_ss_link() {
        let payload = STANDARD.encode(
            "ss://YWVzLTI1Ni1nY206cGFzcw@1.2.3.4:8388#node1\nvmess://eyJhZGQiOiIxLjIuMy40In0=\n",
        );
        assert!(payload.len() > ENCODED_SNIFF_CHARS);
        assert_eq!(classify(None, &payload), Classification::EncodedPayload);
    }

    #[test]
    fn test_line_break_leaving_a_partial_group_is_rejected() {
        // 30 + 32 alphabet chars survive in the head: not whole 4-char groups.
        let payload = STANDARD.encode("trojan://secret@example.com:443#a\ntrojan://x@y:1#b\n");
        let wrapped = format!("{}\r\n{}", &payload[..30], &payload[30..]);
        assert_eq!(classify(None, &wrapped), Classification::Rejected);
    }

    #[test]
    fn test_line_break_between_whole_groups_is_skipped() {
        assert_eq!(
            classify(None, "c3M6Ly9h\r\nYmNkQGg6MQ=="),
            Classification::EncodedPayload
        );
    }

    #[test]
    fn test_unpadded_payload_is_rejected() {
        // "ss://abcd@h:1" without its trailing "==".
        assert_eq!(classify(None, "c3M6Ly9hYmNkQGg6MQ"), Classification::Rejected);
        assert_eq!(classify(None, "c3M6Ly9hYmNkQGg6MQ=="), Classification::EncodedPayload);
    }

    #[test]
    fn test_base64_without_share_links_is_rejected() {
        let payload = STANDARD.encode("just some perfectly ordinary words in a base64 blob, nothing else");
        assert_eq!(classify(None, &payload), Classification::Rejected);
    }

    #[test]
    fn test_html_page_is_rejected() {
        let body = "<!DOCTYPE html><html><head><title>404</title></head><body>nope</body></html>";
        assert_eq!(classify(None, body), Classification::Rejected);
    }

    #[test]
    fn test_empty_body_is_rejected() {
        assert_eq!(classify(None, ""), Classification::Rejected);
    }

    #[test]
    fn test_structured_config_beats_encoded_payload() {
        let body = format!("proxies:\n{}", STANDARD.encode("ss://abc@host:1#n"));
        assert_eq!(classify(None, &body), Classification::StructuredConfig);
    }

    #[test]
    fn test_parse_traffic_and_expire() {
        let header = "upload=10; download=20; total=100; expire=1700000000123";
        assert_eq!(
            parse_traffic(header),
            Some(TrafficInfo {
                upload: 10,
                download: 20,
                total: 100,
            })
        );
        assert_eq!(parse_expire(header), Some(1_700_000_000));
        assert_eq!(parse_expire("expire=1700000000"), Some(1_700_000_000));
        assert_eq!(parse_expire("no expiry here"), None);
    }

    #[test]
    fn test_custom_floor() {
        let classifier = ResponseClassifier::new(0);
        assert_eq!(
            classifier.classify(Some("upload=0; download=0; total=1"), "", NOW),
            Classification::UsableSubscription
        );
    }
}
