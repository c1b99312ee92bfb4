//! Iconify search and icon-name handling for the Simple Icons and Logos sets.

use super::upstream::Upstream;
use super::{escape_segment, IconError, IconSearchResult, IconSource};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn icon_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9-]+:[a-z0-9][a-z0-9._-]*$").expect("static regex"))
}

/// A validated `prefix:name` Iconify identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconifyName {
    pub prefix: String,
    pub name: String,
    pub source: IconSource,
}

impl IconifyName {
    /// Canonical `prefix:name` form.
    pub fn full(&self) -> String {
        format!("{}:{}", self.prefix, self.name)
    }
}

/// Normalize a user-supplied icon name.
///
/// Lowercases, strips all whitespace and collapses runs of `:`. A bare name
/// picks up its prefix from `source_hint` (`iconify-simple`/`iconify-logos`).
pub fn normalize_iconify_name(raw: &str, source_hint: &str) -> Result<IconifyName, IconError> {
    let mut value: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    while value.contains("::") {
        value = value.replace("::", ":");
    }

    if !value.contains(':') {
        if let Some(prefix) = IconSource::parse(source_hint).iconify_prefix() {
            value = format!("{prefix}:{value}");
        }
    }

    if !icon_name_regex().is_match(&value) {
        return Err(IconError::InvalidName);
    }

    let (prefix, name) = value.split_once(':').ok_or(IconError::InvalidName)?;
    let source = IconSource::from_iconify_prefix(prefix).ok_or(IconError::UnsupportedIconSet)?;
    Ok(IconifyName {
        prefix: prefix.to_string(),
        name: name.to_string(),
        source,
    })
}

/// Display label for an icon name: dashes become spaces, words are capitalized.
pub fn title_case_label(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut boundary = true;
    for c in name.chars() {
        let c = if c == '-' { ' ' } else { c };
        if boundary {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        boundary = !(c.is_alphanumeric() || c == '_');
    }
    out
}

/// Preview/download URL for one icon in one format.
pub fn icon_url(api_base: &str, prefix: &str, name: &str, ext: &str) -> String {
    format!(
        "{}/{}/{}.{ext}",
        api_base.trim_end_matches('/'),
        escape_segment(prefix),
        escape_segment(name)
    )
}

/// Query the Iconify search API restricted to `prefix`.
///
/// Entries from other sets and malformed entries are dropped. Results keep
/// the API's order and carry no score.
pub async fn search(
    upstream: &dyn Upstream,
    api_base: &str,
    query: &str,
    limit: usize,
    prefix: &str,
    source: IconSource,
) -> Result<Vec<IconSearchResult>, IconError> {
    let url = format!(
        "{}/search?query={}&limit={limit}&prefixes={}",
        api_base.trim_end_matches('/'),
        urlencoding::encode(query.trim()),
        urlencoding::encode(prefix)
    );

    let resp = upstream
        .get(&url)
        .await
        .map_err(|e| IconError::Upstream(e.to_string()))?;
    if !resp.is_success() {
        return Err(IconError::Upstream(format!(
            "iconify search error ({})",
            resp.status
        )));
    }

    let parsed: Value = serde_json::from_slice(&resp.body)
        .map_err(|e| IconError::Upstream(format!("invalid iconify response: {e}")))?;
    let icons = parsed
        .get("icons")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let results = icons
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|full| {
            let (set, name) = full.split_once(':')?;
            if set != prefix || name.is_empty() {
                return None;
            }
            Some(IconSearchResult {
                score: None,
                name: title_case_label(name),
                reference: full.to_string(),
                category: source.category_label().to_string(),
                tags: String::new(),
                has_svg: false,
                has_png: false,
                has_webp: false,
                has_light: false,
                has_dark: false,
                preview_url: icon_url(api_base, set, name, "svg"),
                source: Some(source.id().to_string()),
            })
        })
        .take(limit)
        .collect();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::super::upstream::mock::MockUpstream;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_with_prefix() {
        let n = normalize_iconify_name("  Simple-Icons : Home Assistant ", "").unwrap();
        assert_eq!(n.full(), "simple-icons:homeassistant");
        assert_eq!(n.source, IconSource::IconifySimple);
    }

    #[test]
    fn test_normalize_collapses_colons() {
        let n = normalize_iconify_name("logos:::docker-icon", "").unwrap();
        assert_eq!(n.prefix, "logos");
        assert_eq!(n.name, "docker-icon");
        assert_eq!(n.source, IconSource::IconifyLogos);
    }

    #[test]
    fn test_normalize_uses_source_hint() {
        let n = normalize_iconify_name("docker", "iconify-logos").unwrap();
        assert_eq!(n.full(), "logos:docker");
        let n = normalize_iconify_name("docker", "ICONIFY-SIMPLE").unwrap();
        assert_eq!(n.full(), "simple-icons:docker");
    }

    #[test]
    fn test_normalize_rejects() {
        assert!(matches!(
            normalize_iconify_name("docker", ""),
            Err(IconError::InvalidName)
        ));
        assert!(matches!(
            normalize_iconify_name("logos:-bad", ""),
            Err(IconError::InvalidName)
        ));
        assert!(matches!(
            normalize_iconify_name("logos:../etc", ""),
            Err(IconError::InvalidName)
        ));
        assert!(matches!(
            normalize_iconify_name("mdi:home", ""),
            Err(IconError::UnsupportedIconSet)
        ));
    }

    #[test]
    fn test_title_case_label() {
        assert_eq!(title_case_label("home-assistant"), "Home Assistant");
        assert_eq!(title_case_label("docker"), "Docker");
        assert_eq!(title_case_label("1password"), "1password");
        assert_eq!(title_case_label("a.b"), "A.B");
    }

    #[tokio::test]
    async fn test_search_filters_and_maps() {
        let upstream = MockUpstream::new();
        let url = "https://iconify.test/search?query=home%20assistant&limit=5&prefixes=simple-icons";
        let body = serde_json::to_vec(&json!({
            "icons": ["simple-icons:homeassistant", "mdi:home", "simple-icons:", 42, "nocolon", "simple-icons:home-assistant-community-store"]
        }))
        .unwrap();
        upstream.respond(url, 200, Some("application/json"), &body);

        let results = search(
            &upstream,
            "https://iconify.test/",
            " home assistant ",
            5,
            "simple-icons",
            IconSource::IconifySimple,
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].reference, "simple-icons:homeassistant");
        assert_eq!(results[0].name, "Homeassistant");
        assert_eq!(results[0].category, "Simple Icons");
        assert_eq!(
            results[0].preview_url,
            "https://iconify.test/simple-icons/homeassistant.svg"
        );
        assert_eq!(results[0].source.as_deref(), Some("iconify-simple"));
        assert!(results[0].score.is_none());
        assert_eq!(results[1].name, "Home Assistant Community Store");
    }

    #[tokio::test]
    async fn test_search_respects_limit() {
        let upstream = MockUpstream::new();
        let url = "https://iconify.test/search?query=go&limit=1&prefixes=logos";
        let body = serde_json::to_vec(&json!({"icons": ["logos:go", "logos:gopher"]})).unwrap();
        upstream.respond(url, 200, None, &body);

        let results = search(&upstream, "https://iconify.test", "go", 1, "logos", IconSource::IconifyLogos)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].category, "Logos");
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let upstream = MockUpstream::new();
        let err = search(&upstream, "https://iconify.test", "go", 5, "logos", IconSource::IconifyLogos)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "iconify search error (404)");
    }

    #[tokio::test]
    async fn test_search_missing_icons_field() {
        let upstream = MockUpstream::new();
        let url = "https://iconify.test/search?query=go&limit=5&prefixes=logos";
        upstream.respond(url, 200, None, b"{\"total\":0}");
        let results = search(&upstream, "https://iconify.test", "go", 5, "logos", IconSource::IconifyLogos)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
