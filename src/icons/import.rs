//! Icon import: fetch one icon from a remote source and inline it as a
//! base64 `data:` URI.

use super::iconify::{icon_url, normalize_iconify_name, title_case_label};
use super::upstream::UpstreamResponse;
use super::{escape_segment, IconError, IconFormat, IconService, IconSource};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Longest accepted catalog reference.
pub const MAX_REFERENCE_LEN: usize = 180;

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._/-]+$").expect("static regex"))
}

/// Check a catalog reference before anything is fetched.
///
/// Rejects empty or overlong values, absolute paths, backslashes, `..`
/// anywhere, and any character outside `[A-Za-z0-9._/-]`.
pub fn validate_reference(reference: &str) -> Result<(), IconError> {
    let ok = !reference.is_empty()
        && reference.len() <= MAX_REFERENCE_LEN
        && !reference.starts_with('/')
        && !reference.contains('\\')
        && !reference.contains("..")
        && reference_regex().is_match(reference);
    if ok {
        Ok(())
    } else {
        Err(IconError::InvalidReference)
    }
}

/// A fetched icon ready to be embedded in the dashboard config.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedIcon {
    pub name: String,
    pub reference: String,
    pub source: String,
    pub icon: String,
    pub icon_data: String,
    pub format: String,
    pub content_type: String,
}

/// What happened to one candidate download.
enum Attempt {
    Done(UpstreamResponse),
    Skip(String),
}

fn data_uri(content_type: &str, body: &[u8]) -> String {
    format!("data:{content_type};base64,{}", STANDARD.encode(body))
}

impl IconService {
    /// Fetch `url`, classifying the result. Any non-2xx status other than
    /// a tolerated 404 is fatal for the whole import.
    async fn try_download(
        &self,
        source: IconSource,
        url: &str,
        tolerate_404: bool,
    ) -> Result<Attempt, IconError> {
        let resp = match self.upstream.get(url).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!("Icon download {} failed: {}", url, e);
                self.record_fetch(source, "error");
                return Ok(Attempt::Skip(e.to_string()));
            }
        };

        if resp.status == 404 && tolerate_404 {
            self.record_fetch(source, "not_found");
            return Ok(Attempt::Skip("404".to_string()));
        }
        if !resp.is_success() {
            self.record_fetch(source, "error");
            warn!("Icon source {} returned {}", url, resp.status);
            return Err(IconError::Upstream(format!(
                "Icon source error ({}).",
                resp.status
            )));
        }
        if resp.body.is_empty() {
            self.record_fetch(source, "empty");
            return Ok(Attempt::Skip("empty icon data".to_string()));
        }

        self.record_fetch(source, "ok");
        Ok(Attempt::Done(resp))
    }

    /// Import an icon from the selfh.st catalog.
    ///
    /// The preferred format is tried first, then the other one; only formats
    /// the catalog entry advertises are attempted.
    pub async fn import_from_catalog(
        &self,
        reference: &str,
        preferred: IconFormat,
    ) -> Result<ImportedIcon, IconError> {
        let reference = reference.trim();
        validate_reference(reference)?;

        let entry = self
            .catalog
            .find(reference)
            .await
            .map_err(|e| IconError::Upstream(format!("Failed to import icon: {e}")))?
            .ok_or(IconError::NotFound)?;

        let available = |f: IconFormat| match f {
            IconFormat::Svg => entry.has_svg,
            IconFormat::Png => entry.has_png,
        };
        let formats: Vec<IconFormat> = [preferred, preferred.other()]
            .into_iter()
            .filter(|f| available(*f))
            .collect();
        if formats.is_empty() {
            return Err(IconError::UnsupportedFormat);
        }

        let mut last_err = None;
        for format in formats {
            let ext = format.ext();
            let url = format!(
                "{}/{ext}/{}.{ext}",
                self.raw_base,
                escape_segment(&entry.reference)
            );
            match self.try_download(IconSource::Selfhst, &url, true).await? {
                Attempt::Skip(reason) => last_err = Some(reason),
                Attempt::Done(resp) => {
                    let content_type = resp
                        .media_type()
                        .unwrap_or_else(|| format.default_content_type().to_string());
                    info!("Imported selfh.st icon {} as {}", entry.reference, ext);
                    return Ok(ImportedIcon {
                        name: entry.name.clone(),
                        reference: entry.reference.clone(),
                        source: IconSource::Selfhst.id().to_string(),
                        icon: format!("{}.{ext}", entry.reference),
                        icon_data: data_uri(&content_type, &resp.body),
                        format: ext.to_string(),
                        content_type,
                    });
                }
            }
        }

        Err(IconError::Upstream(format!(
            "Failed to import icon: {}",
            last_err.unwrap_or_else(|| "unknown error".to_string())
        )))
    }

    /// Import an icon from Iconify.
    ///
    /// Iconify always serves SVG; PNG is only attempted when preferred and a
    /// 404 on it falls back to SVG.
    pub async fn import_from_iconify(
        &self,
        name: &str,
        preferred: IconFormat,
        source_hint: &str,
    ) -> Result<ImportedIcon, IconError> {
        let icon = normalize_iconify_name(name.trim(), source_hint)?;
        let formats: &[IconFormat] = match preferred {
            IconFormat::Png => &[IconFormat::Png, IconFormat::Svg],
            IconFormat::Svg => &[IconFormat::Svg],
        };

        let mut last_err = None;
        for &format in formats {
            let ext = format.ext();
            let url = icon_url(&self.iconify_api_base, &icon.prefix, &icon.name, ext);
            let tolerate_404 = format == IconFormat::Png;
            match self.try_download(icon.source, &url, tolerate_404).await? {
                Attempt::Skip(reason) => last_err = Some(reason),
                Attempt::Done(resp) => {
                    let content_type = resp
                        .media_type()
                        .unwrap_or_else(|| format.default_content_type().to_string());
                    info!("Imported Iconify icon {} as {}", icon.full(), ext);
                    return Ok(ImportedIcon {
                        name: title_case_label(&icon.name),
                        reference: icon.full(),
                        source: icon.source.id().to_string(),
                        icon: format!("{}.{ext}", icon.name),
                        icon_data: data_uri(&content_type, &resp.body),
                        format: ext.to_string(),
                        content_type,
                    });
                }
            }
        }

        Err(IconError::Upstream(format!(
            "Failed to import icon: {}",
            last_err.unwrap_or_else(|| "unknown error".to_string())
        )))
    }
}
