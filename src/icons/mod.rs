//! Icon search and import across the selfh.st catalog and the Iconify API.
//!
//! - `upstream`: outbound HTTP behind a trait
//! - `catalog`: cached selfh.st index and local relevance scoring
//! - `iconify`: remote search and icon-name normalization for Iconify sets
//! - `import`: fetch one icon, negotiate format, inline it as a data URI

pub mod catalog;
pub mod iconify;
pub mod import;
pub mod upstream;

use crate::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use catalog::{parse_truthy_flag, CatalogEntry, IconCatalog};
pub use import::{validate_reference, ImportedIcon};
pub use upstream::{HttpUpstream, TransportError, Upstream, UpstreamResponse};

/// Minimum query length for any search.
pub const MIN_QUERY_LEN: usize = 2;

/// Default number of search results when the caller gives no limit.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Icon search/import errors
#[derive(Debug, Error)]
pub enum IconError {
    #[error("Invalid icon reference.")]
    InvalidReference,

    #[error("Invalid icon name.")]
    InvalidName,

    #[error("Unsupported Iconify icon set.")]
    UnsupportedIconSet,

    #[error("Icon not found.")]
    NotFound,

    #[error("Selected icon does not have a supported format.")]
    UnsupportedFormat,

    #[error("{0}")]
    Upstream(String),
}

/// Image format an icon can be imported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconFormat {
    Svg,
    Png,
}

impl IconFormat {
    /// `png` (case-insensitive) selects PNG; anything else means SVG.
    pub fn from_request(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("png") {
            IconFormat::Png
        } else {
            IconFormat::Svg
        }
    }

    pub fn ext(self) -> &'static str {
        match self {
            IconFormat::Svg => "svg",
            IconFormat::Png => "png",
        }
    }

    /// Content type used when the upstream does not declare one.
    pub fn default_content_type(self) -> &'static str {
        match self {
            IconFormat::Svg => "image/svg+xml",
            IconFormat::Png => "image/png",
        }
    }

    pub fn other(self) -> Self {
        match self {
            IconFormat::Svg => IconFormat::Png,
            IconFormat::Png => IconFormat::Svg,
        }
    }
}

/// Where search results and imports come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconSource {
    Selfhst,
    IconifySimple,
    IconifyLogos,
}

impl IconSource {
    /// Parse a `source` parameter; empty or unknown values mean selfh.st.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "iconify-simple" => IconSource::IconifySimple,
            "iconify-logos" => IconSource::IconifyLogos,
            _ => IconSource::Selfhst,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            IconSource::Selfhst => "selfhst",
            IconSource::IconifySimple => "iconify-simple",
            IconSource::IconifyLogos => "iconify-logos",
        }
    }

    /// Iconify icon-set prefix, `None` for the selfh.st catalog.
    pub fn iconify_prefix(self) -> Option<&'static str> {
        match self {
            IconSource::Selfhst => None,
            IconSource::IconifySimple => Some("simple-icons"),
            IconSource::IconifyLogos => Some("logos"),
        }
    }

    pub fn from_iconify_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "simple-icons" => Some(IconSource::IconifySimple),
            "logos" => Some(IconSource::IconifyLogos),
            _ => None,
        }
    }

    pub fn category_label(self) -> &'static str {
        match self {
            IconSource::Selfhst => "",
            IconSource::IconifySimple => "Simple Icons",
            IconSource::IconifyLogos => "Logos",
        }
    }
}

/// One search hit. Flags are only serialized when set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IconSearchResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    pub name: String,
    pub reference: String,
    pub category: String,
    pub tags: String,
    #[serde(skip_serializing_if = "is_false")]
    pub has_svg: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub has_png: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub has_webp: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub has_light: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub has_dark: bool,
    pub preview_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Search response body.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub items: Vec<IconSearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Upstream locations and cache policy.
#[derive(Debug, Clone)]
pub struct IconConfig {
    pub index_url: String,
    pub raw_base: String,
    pub iconify_api_base: String,
    pub index_ttl: Duration,
    pub search_max_limit: usize,
}

/// Catalog cache, search and import behind one handle.
pub struct IconService {
    catalog: IconCatalog,
    upstream: Arc<dyn Upstream>,
    raw_base: String,
    iconify_api_base: String,
    search_max_limit: usize,
    metrics: Option<Metrics>,
}

impl IconService {
    pub fn new(config: IconConfig, upstream: Arc<dyn Upstream>, metrics: Option<Metrics>) -> Self {
        let catalog = IconCatalog::new(
            upstream.clone(),
            config.index_url,
            config.index_ttl,
            metrics.clone(),
        );
        Self {
            catalog,
            upstream,
            raw_base: config.raw_base.trim_end_matches('/').to_string(),
            iconify_api_base: config.iconify_api_base.trim_end_matches('/').to_string(),
            search_max_limit: config.search_max_limit.max(1),
            metrics,
        }
    }

    /// Clamp a caller-supplied limit into `[1, search_max_limit]`.
    pub fn clamp_limit(&self, requested: Option<i64>) -> usize {
        let requested = requested.unwrap_or(DEFAULT_SEARCH_LIMIT as i64);
        requested.clamp(1, self.search_max_limit as i64) as usize
    }

    /// Search one source. Queries shorter than two characters return an
    /// empty result with a hint and never touch the catalog.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<i64>,
        source: &str,
    ) -> Result<SearchOutcome, IconError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Ok(SearchOutcome {
                query: query.to_string(),
                items: Vec::new(),
                source: None,
                message: Some("Enter at least 2 characters."),
            });
        }

        let limit = self.clamp_limit(limit);
        let source = IconSource::parse(source);
        let items = match source.iconify_prefix() {
            Some(prefix) => {
                iconify::search(
                    self.upstream.as_ref(),
                    &self.iconify_api_base,
                    query,
                    limit,
                    prefix,
                    source,
                )
                .await?
            }
            None => {
                let index = self.catalog.get_index().await?;
                catalog::search_entries(&index, query, limit, &self.raw_base)
            }
        };

        Ok(SearchOutcome {
            query: query.to_string(),
            items,
            source: Some(source.id()),
            message: None,
        })
    }

    fn record_fetch(&self, source: IconSource, outcome: &str) {
        if let Some(m) = &self.metrics {
            m.upstream_requests_total
                .with_label_values(&[source.id(), outcome])
                .inc();
        }
    }
}

/// Percent-encode one URL path segment (`/` included).
pub(crate) fn escape_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[cfg(test)]
mod tests {
    use super::upstream::mock::MockUpstream;
    use super::*;

    pub(crate) fn test_config() -> IconConfig {
        IconConfig {
            index_url: "https://index.test/index.json".to_string(),
            raw_base: "https://raw.test/icons/".to_string(),
            iconify_api_base: "https://iconify.test".to_string(),
            index_ttl: Duration::from_secs(3600),
            search_max_limit: 30,
        }
    }

    #[test]
    fn test_format_from_request() {
        assert_eq!(IconFormat::from_request("PNG"), IconFormat::Png);
        assert_eq!(IconFormat::from_request(" png "), IconFormat::Png);
        assert_eq!(IconFormat::from_request("svg"), IconFormat::Svg);
        assert_eq!(IconFormat::from_request("webp"), IconFormat::Svg);
        assert_eq!(IconFormat::from_request(""), IconFormat::Svg);
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(IconSource::parse(""), IconSource::Selfhst);
        assert_eq!(IconSource::parse("Iconify-Logos"), IconSource::IconifyLogos);
        assert_eq!(IconSource::parse("iconify-simple"), IconSource::IconifySimple);
        assert_eq!(IconSource::parse("whatever"), IconSource::Selfhst);
    }

    #[test]
    fn test_clamp_limit() {
        let svc = IconService::new(test_config(), Arc::new(MockUpstream::new()), None);
        assert_eq!(svc.clamp_limit(None), 20);
        assert_eq!(svc.clamp_limit(Some(0)), 1);
        assert_eq!(svc.clamp_limit(Some(-5)), 1);
        assert_eq!(svc.clamp_limit(Some(7)), 7);
        assert_eq!(svc.clamp_limit(Some(500)), 30);
    }

    #[tokio::test]
    async fn test_short_query_returns_hint_without_fetching() {
        let upstream = Arc::new(MockUpstream::new());
        let svc = IconService::new(test_config(), upstream.clone(), None);

        for q in ["", " ", "p", " p "] {
            let out = svc.search(q, None, "selfhst").await.unwrap();
            assert!(out.items.is_empty());
            assert_eq!(out.message, Some("Enter at least 2 characters."));
        }
        let out = svc.search("x", None, "iconify-logos").await.unwrap();
        assert!(out.items.is_empty());
        assert_eq!(upstream.request_count(), 0);
    }

    #[tokio::test]
    async fn test_search_upstream_failure_is_error() {
        let upstream = Arc::new(MockUpstream::new());
        upstream.fail("https://index.test/index.json", "connection refused");
        let svc = IconService::new(test_config(), upstream, None);

        let err = svc.search("plex", None, "").await.unwrap_err();
        assert!(matches!(err, IconError::Upstream(_)));
    }

    #[test]
    fn test_escape_segment() {
        assert_eq!(escape_segment("plex"), "plex");
        assert_eq!(escape_segment("a/b c"), "a%2Fb%20c");
        assert_eq!(escape_segment("x-y_z.1"), "x-y_z.1");
    }
}
