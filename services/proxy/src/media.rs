//! Large-media filter.
//!
//! Events whose content references an oversized image are dropped before
//! broadcast.  Sizes come from HEAD probes of the referenced URLs; a probe
//! failure or missing `Content-Length` counts as size zero, so the filter
//! never drops an event on probe failure alone.

use std::sync::OnceLock;
use std::time::Duration;

use nostr_proto::Event;
use regex::Regex;
use tracing::debug;

/// Largest referenced image allowed through, in bytes.
pub const MAX_MEDIA_BYTES: u64 = 1_000_000;

/// Per-probe timeout so a slow origin stalls one frame, not the reader.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Candidate URLs: `http(s)` followed by non-whitespace.  The suffix check
/// below is the authoritative image test.
fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://\S+").expect("static regex compiles"))
}

/// Extract image URLs from event content: candidates must end in `.jpg`,
/// `.png`, or `.gif` (case-sensitive).
pub fn extract_image_urls(content: &str) -> Vec<String> {
    url_pattern()
        .find_iter(content)
        .map(|m| m.as_str())
        .filter(|url| {
            url.ends_with(".jpg") || url.ends_with(".png") || url.ends_with(".gif")
        })
        .map(ToOwned::to_owned)
        .collect()
}

pub struct MediaFilter {
    client: reqwest::Client,
    threshold: u64,
}

impl MediaFilter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();
        MediaFilter {
            client,
            threshold: MAX_MEDIA_BYTES,
        }
    }

    /// True when the largest image referenced by `event` exceeds the
    /// threshold.  Events referencing no images are always kept.
    pub async fn should_drop(&self, event: &Event) -> bool {
        let urls = extract_image_urls(&event.content);
        if urls.is_empty() {
            return false;
        }

        let mut largest = 0u64;
        for url in &urls {
            let size = self.probe_size(url).await;
            debug!(url = %url, size, "media probe");
            largest = largest.max(size);
        }
        largest > self.threshold
    }

    /// HEAD the URL and read `Content-Length`; unknown sizes are zero.
    async fn probe_size(&self, url: &str) -> u64 {
        match self.client.head(url).send().await {
            Ok(response) => response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            Err(e) => {
                debug!(url = %url, error = %e, "media probe failed, treating size as unknown");
                0
            }
        }
    }
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_matching_image_urls() {
        let content = "look https://x.example/a.jpg and http://y.example/b.png done";
        assert_eq!(
            extract_image_urls(content),
            vec![
                "https://x.example/a.jpg".to_owned(),
                "http://y.example/b.png".to_owned(),
            ]
        );
    }

    #[test]
    fn ignores_non_image_urls() {
        assert!(extract_image_urls("see https://example.com/page.html").is_empty());
        assert!(extract_image_urls("no urls here at all").is_empty());
    }

    #[test]
    fn suffix_match_requires_the_dot() {
        // A URL merely ending in "jpg" is not an image reference.
        assert!(extract_image_urls("https://x.example/yjpg").is_empty());
        assert_eq!(
            extract_image_urls("https://x.example/y.jpg"),
            vec!["https://x.example/y.jpg".to_owned()]
        );
    }

    #[test]
    fn suffix_match_is_case_sensitive() {
        assert!(extract_image_urls("https://x.example/a.JPG").is_empty());
        assert!(extract_image_urls("https://x.example/a.Png").is_empty());
    }

    #[test]
    fn gif_suffix_matches() {
        assert_eq!(
            extract_image_urls("https://x.example/meme.gif"),
            vec!["https://x.example/meme.gif".to_owned()]
        );
    }

    #[test]
    fn url_stops_at_whitespace() {
        let content = "https://x.example/a.jpg trailing words";
        assert_eq!(
            extract_image_urls(content),
            vec!["https://x.example/a.jpg".to_owned()]
        );
    }
}
