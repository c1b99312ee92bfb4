//! Cached selfh.st icon index and local search.
//!
//! The cache holds one complete snapshot or nothing. A refresh fetches and
//! parses the whole index without any lock held, then swaps the snapshot in
//! one step; concurrent refreshes may race and the last writer wins.

use super::upstream::Upstream;
use super::{escape_segment, IconError, IconSearchResult};
use crate::metrics::Metrics;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One icon in the catalog snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub name: String,
    pub reference: String,
    pub category: String,
    pub tags: String,
    pub has_svg: bool,
    pub has_png: bool,
    pub has_webp: bool,
    pub has_light: bool,
    pub has_dark: bool,
}

/// Parse a catalog availability flag.
///
/// Case-insensitive and whitespace-trimmed: `y`, `yes`, `true` and `1` are
/// true, everything else (including missing values) is false. Non-string
/// JSON values are compared by their textual form, so `true` and `1` count.
pub fn parse_truthy_flag(value: &Value) -> bool {
    let text = value_text(value);
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "true" | "1"
    )
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn field(row: &serde_json::Map<String, Value>, key: &str) -> String {
    row.get(key)
        .map(value_text)
        .unwrap_or_default()
        .trim()
        .to_string()
}

impl CatalogEntry {
    /// Build an entry from one index row. Rows without a reference are skipped.
    pub fn from_row(row: &serde_json::Map<String, Value>) -> Option<Self> {
        let reference = field(row, "Reference");
        if reference.is_empty() {
            return None;
        }
        let mut name = field(row, "Name");
        if name.is_empty() {
            name = reference.clone();
        }
        let flag = |key: &str| row.get(key).map(parse_truthy_flag).unwrap_or(false);

        Some(Self {
            name,
            category: field(row, "Category"),
            tags: field(row, "Tags"),
            has_svg: flag("SVG"),
            has_png: flag("PNG"),
            has_webp: flag("WebP"),
            has_light: flag("Light"),
            has_dark: flag("Dark"),
            reference,
        })
    }
}

/// Parse the raw index payload (a JSON array of rows).
pub fn parse_index(raw: &[u8]) -> Result<Vec<CatalogEntry>, IconError> {
    let rows: Vec<Value> = serde_json::from_slice(raw)
        .map_err(|e| IconError::Upstream(format!("invalid icon index: {e}")))?;
    Ok(rows
        .iter()
        .filter_map(Value::as_object)
        .filter_map(CatalogEntry::from_row)
        .collect())
}

struct Snapshot {
    fetched_at: Instant,
    items: Arc<Vec<CatalogEntry>>,
}

/// Time-bounded cache of the remote icon index.
pub struct IconCatalog {
    upstream: Arc<dyn Upstream>,
    index_url: String,
    ttl: Duration,
    snapshot: Mutex<Option<Snapshot>>,
    metrics: Option<Metrics>,
}

impl IconCatalog {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        index_url: impl Into<String>,
        ttl: Duration,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            upstream,
            index_url: index_url.into(),
            ttl,
            snapshot: Mutex::new(None),
            metrics,
        }
    }

    /// Return the cached snapshot if it is fresh, otherwise refresh it.
    ///
    /// If the refresh fails while an older snapshot exists, the stale
    /// snapshot is served and kept; with no snapshot the error is returned.
    pub async fn get_index(&self) -> Result<Arc<Vec<CatalogEntry>>, IconError> {
        let cached = self
            .snapshot
            .lock()
            .as_ref()
            .map(|s| (s.fetched_at.elapsed(), s.items.clone()));

        if let Some((age, items)) = &cached {
            if *age < self.ttl {
                debug!("Icon index cache hit ({} entries)", items.len());
                if let Some(m) = &self.metrics {
                    m.icon_index_cache_hits_total.inc();
                }
                return Ok(items.clone());
            }
        }

        debug!("Icon index cache miss, fetching {}", self.index_url);
        if let Some(m) = &self.metrics {
            m.icon_index_cache_misses_total.inc();
        }

        match self.fetch().await {
            Ok(items) => {
                let items = Arc::new(items);
                *self.snapshot.lock() = Some(Snapshot {
                    fetched_at: Instant::now(),
                    items: items.clone(),
                });
                if let Some(m) = &self.metrics {
                    m.icon_index_entries.set(items.len() as i64);
                }
                info!("Icon index refreshed: {} entries", items.len());
                Ok(items)
            }
            Err(e) => match cached {
                Some((_, stale)) => {
                    warn!("Icon index refresh failed, serving stale snapshot: {}", e);
                    Ok(stale)
                }
                None => {
                    warn!("Icon index fetch failed: {}", e);
                    Err(e)
                }
            },
        }
    }

    async fn fetch(&self) -> Result<Vec<CatalogEntry>, IconError> {
        let resp = self
            .upstream
            .get(&self.index_url)
            .await
            .map_err(|e| IconError::Upstream(e.to_string()))?;
        if !resp.is_success() {
            return Err(IconError::Upstream(format!(
                "icon index source error ({})",
                resp.status
            )));
        }
        parse_index(&resp.body)
    }

    /// Case-insensitive exact lookup by reference.
    pub async fn find(&self, reference: &str) -> Result<Option<CatalogEntry>, IconError> {
        let index = self.get_index().await?;
        Ok(index
            .iter()
            .find(|e| e.reference.eq_ignore_ascii_case(reference))
            .cloned())
    }
}

/// Relevance of one entry for a lowercased query, or `None` if it does not match.
fn score_entry(entry: &CatalogEntry, query: &str, tokens: &[&str]) -> Option<i64> {
    let name = entry.name.to_lowercase();
    let reference = entry.reference.to_lowercase();
    let category = entry.category.to_lowercase();
    let tags = entry.tags.to_lowercase();

    let haystack = format!("{name} {reference} {category} {tags}");
    if !query.is_empty() && !haystack.contains(query) {
        return None;
    }

    let mut score = 0;
    if reference == query {
        score += 1200;
    } else if reference.starts_with(query) {
        score += 900;
    }
    if name == query {
        score += 1000;
    } else if name.starts_with(query) {
        score += 800;
    }
    if name.contains(query) {
        score += 500;
    }
    if reference.contains(query) {
        score += 450;
    }
    if tags.contains(query) {
        score += 220;
    }
    if category.contains(query) {
        score += 120;
    }
    for token in tokens {
        if name.contains(token) {
            score += 80;
        }
        if reference.contains(token) {
            score += 70;
        }
        if tags.contains(token) {
            score += 35;
        }
    }
    Some(score)
}

/// Preview URL for an entry, preferring SVG over PNG. Empty if neither exists.
pub fn preview_url(entry: &CatalogEntry, raw_base: &str) -> String {
    let ext = if entry.has_svg {
        "svg"
    } else if entry.has_png {
        "png"
    } else {
        return String::new();
    };
    format!(
        "{}/{ext}/{}.{ext}",
        raw_base.trim_end_matches('/'),
        escape_segment(&entry.reference)
    )
}

/// Score, sort and truncate catalog matches for `query`.
///
/// Ordering: score descending, then name and reference ascending
/// (case-insensitive).
pub fn search_entries(
    entries: &[CatalogEntry],
    query: &str,
    limit: usize,
    raw_base: &str,
) -> Vec<IconSearchResult> {
    let query = query.trim().to_lowercase();
    let tokens: Vec<&str> = query.split_whitespace().collect();

    let mut results: Vec<IconSearchResult> = entries
        .iter()
        .filter_map(|entry| {
            let score = score_entry(entry, &query, &tokens)?;
            Some(IconSearchResult {
                score: Some(score),
                name: entry.name.clone(),
                reference: entry.reference.clone(),
                category: entry.category.clone(),
                tags: entry.tags.clone(),
                has_svg: entry.has_svg,
                has_png: entry.has_png,
                has_webp: entry.has_webp,
                has_light: entry.has_light,
                has_dark: entry.has_dark,
                preview_url: preview_url(entry, raw_base),
                source: None,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| cmp_ci(&a.name, &b.name))
            .then_with(|| cmp_ci(&a.reference, &b.reference))
    });
    results.truncate(limit);
    results
}

fn cmp_ci(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::super::upstream::mock::MockUpstream;
    use super::*;
    use serde_json::json;

    const INDEX_URL: &str = "https://index.test/index.json";
    const RAW: &str = "https://raw.test/icons";

    fn entry(name: &str, reference: &str) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            reference: reference.to_string(),
            category: String::new(),
            tags: String::new(),
            has_svg: true,
            has_png: true,
            has_webp: false,
            has_light: false,
            has_dark: false,
        }
    }

    fn sample_index() -> Vec<u8> {
        serde_json::to_vec(&json!([
            {"Name": "Plex", "Reference": "plex", "Category": "Media", "Tags": "video streaming", "SVG": "Yes", "PNG": "Yes"},
            {"Name": "Plexamp", "Reference": "plexamp", "Category": "Media", "Tags": "music", "SVG": "No", "PNG": "Yes"},
            {"Name": "", "Reference": "jellyfin", "Category": "Media", "Tags": "", "SVG": "y", "PNG": "n"},
            {"Name": "Broken", "Reference": "  ", "SVG": "Yes"},
            {"Name": "Nextcloud", "Reference": "nextcloud", "Category": "Cloud", "Tags": "files", "SVG": true, "PNG": 1, "WebP": "TRUE", "Light": "1", "Dark": null}
        ]))
        .unwrap()
    }

    #[test]
    fn test_truthy_flags() {
        for v in [json!("y"), json!("YES"), json!(" true "), json!("1"), json!(true), json!(1)] {
            assert!(parse_truthy_flag(&v), "{v} should be truthy");
        }
        for v in [json!("n"), json!("no"), json!(""), json!(null), json!(0), json!("2"), json!(false)] {
            assert!(!parse_truthy_flag(&v), "{v} should be falsy");
        }
    }

    #[test]
    fn test_parse_index_rows() {
        let items = parse_index(&sample_index()).unwrap();
        assert_eq!(items.len(), 4, "row with blank reference is skipped");

        let jelly = items.iter().find(|e| e.reference == "jellyfin").unwrap();
        assert_eq!(jelly.name, "jellyfin", "blank name defaults to reference");
        assert!(jelly.has_svg);
        assert!(!jelly.has_png);

        let nc = items.iter().find(|e| e.reference == "nextcloud").unwrap();
        assert!(nc.has_svg && nc.has_png && nc.has_webp && nc.has_light);
        assert!(!nc.has_dark);
    }

    #[test]
    fn test_parse_index_rejects_non_array() {
        assert!(matches!(
            parse_index(b"{\"a\":1}"),
            Err(IconError::Upstream(_))
        ));
    }

    #[test]
    fn test_exact_reference_beats_prefix() {
        let entries = vec![entry("Plexamp", "plexamp"), entry("Plex", "plex")];
        let results = search_entries(&entries, "plex", 20, RAW);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].reference, "plex");
        assert_eq!(results[1].reference, "plexamp");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_score_components() {
        // ref exact 1200 + name exact 1000 + name contains 500 + ref contains 450
        // + token name 80 + token ref 70
        let e = entry("Plex", "plex");
        assert_eq!(score_entry(&e, "plex", &["plex"]), Some(3300));

        let mut tagged = entry("Jellyfin", "jellyfin");
        tagged.tags = "media server".to_string();
        tagged.category = "Media".to_string();
        // tags contains 220 + category contains 120 + token tags 35
        assert_eq!(score_entry(&tagged, "media", &["media"]), Some(375));

        assert_eq!(score_entry(&e, "zzz", &["zzz"]), None);
    }

    #[test]
    fn test_multi_token_query_matches_whole_phrase() {
        let mut e = entry("Home Assistant", "home-assistant");
        e.tags = "automation".to_string();
        let results = search_entries(&[e], "home assistant", 20, RAW);
        assert_eq!(results.len(), 1);
        // name exact 1000 + name contains 500 + tokens: name 80*2, ref 70*2
        assert_eq!(results[0].score, Some(1800));
    }

    #[test]
    fn test_tie_break_by_name_then_reference() {
        let entries = vec![
            entry("beta", "x-beta"),
            entry("Alpha", "x-alpha2"),
            entry("alpha", "x-alpha1"),
        ];
        let results = search_entries(&entries, "x-", 20, RAW);
        let refs: Vec<_> = results.iter().map(|r| r.reference.as_str()).collect();
        assert_eq!(refs, vec!["x-alpha1", "x-alpha2", "x-beta"]);
    }

    #[test]
    fn test_limit_truncates() {
        let entries: Vec<_> = (0..10)
            .map(|i| entry(&format!("app{i}"), &format!("app{i}")))
            .collect();
        assert_eq!(search_entries(&entries, "app", 3, RAW).len(), 3);
    }

    #[test]
    fn test_preview_prefers_svg() {
        let mut e = entry("Plex", "plex");
        assert_eq!(preview_url(&e, RAW), "https://raw.test/icons/svg/plex.svg");
        e.has_svg = false;
        assert_eq!(preview_url(&e, "https://raw.test/icons/"), "https://raw.test/icons/png/plex.png");
        e.has_png = false;
        assert_eq!(preview_url(&e, RAW), "");
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let upstream = Arc::new(MockUpstream::new());
        upstream.respond(INDEX_URL, 200, Some("application/json"), &sample_index());
        let catalog = IconCatalog::new(upstream.clone(), INDEX_URL, Duration::from_secs(60), None);

        let first = catalog.get_index().await.unwrap();
        let second = catalog.get_index().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(upstream.request_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_after_ttl_keeps_results_stable() {
        let upstream = Arc::new(MockUpstream::new());
        upstream.respond(INDEX_URL, 200, None, &sample_index());
        let catalog = IconCatalog::new(upstream.clone(), INDEX_URL, Duration::from_millis(10), None);

        let before = search_entries(&catalog.get_index().await.unwrap(), "plex", 20, RAW);
        tokio::time::sleep(Duration::from_millis(25)).await;
        let after = search_entries(&catalog.get_index().await.unwrap(), "plex", 20, RAW);

        assert_eq!(upstream.request_count(), 2);
        assert_eq!(before, after);
        assert_eq!(before[0].reference, "plex");
    }

    #[tokio::test]
    async fn test_failed_first_fetch_is_error() {
        let upstream = Arc::new(MockUpstream::new());
        upstream.respond(INDEX_URL, 503, None, b"");
        let catalog = IconCatalog::new(upstream, INDEX_URL, Duration::from_secs(60), None);

        let err = catalog.get_index().await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(catalog.snapshot.lock().is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_old_snapshot() {
        let upstream = Arc::new(MockUpstream::new());
        upstream.respond(INDEX_URL, 200, None, &sample_index());
        let catalog = IconCatalog::new(upstream.clone(), INDEX_URL, Duration::from_millis(10), None);
        let original = catalog.get_index().await.unwrap();

        upstream.fail(INDEX_URL, "connection reset");
        tokio::time::sleep(Duration::from_millis(25)).await;
        let served = catalog.get_index().await.unwrap();
        assert_eq!(original, served);

        upstream.respond(INDEX_URL, 200, None, b"[]");
        let refreshed = catalog.get_index().await.unwrap();
        assert!(refreshed.is_empty(), "successful refresh replaces the snapshot wholesale");
    }

    #[tokio::test]
    async fn test_find_is_case_insensitive() {
        let upstream = Arc::new(MockUpstream::new());
        upstream.respond(INDEX_URL, 200, None, &sample_index());
        let catalog = IconCatalog::new(upstream, INDEX_URL, Duration::from_secs(60), None);

        let found = catalog.find("PLEX").await.unwrap().unwrap();
        assert_eq!(found.reference, "plex");
        assert!(catalog.find("missing").await.unwrap().is_none());
    }
}
