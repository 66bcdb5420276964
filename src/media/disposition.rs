//! Response header construction.
//!
//! # Responsibilities
//! - Decide `inline` vs `attachment`
//! - Downgrade vector images to a generic binary type
//! - Build a filename and a `Content-Disposition` value that cannot break
//!   out of its header
//! - Assemble the final header set
//!
//! # Design Decisions
//! - The inline-safe table is independent of the detection table in
//!   `sniff.rs`: TIFF is detectable but not inline-safe, SVG is neither
//! - Both `filename=` (ASCII quoted-string) and `filename*=` (RFC 5987) are
//!   always emitted

use axum::http::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE,
    X_CONTENT_TYPE_OPTIONS,
};
use url::Url;

use crate::media::sniff::{ResolvedType, OCTET_STREAM};

/// Raster formats browsers may render in place.
pub const INLINE_SAFE: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/apng",
    "image/gif",
    "image/webp",
    "image/avif",
    "image/bmp",
    "image/x-icon",
    "image/vnd.microsoft.icon",
];

const EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/apng", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
    ("image/bmp", "bmp"),
    ("image/x-icon", "ico"),
    ("image/vnd.microsoft.icon", "ico"),
    ("image/tiff", "tiff"),
    ("image/svg+xml", "svg"),
];

const FALLBACK_EXTENSION: &str = "bin";
const FALLBACK_STEM: &str = "download";
const MAX_EXTENSION_LEN: usize = 8;

/// Requested or effective presentation of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    Inline,
    #[default]
    Attachment,
}

impl Disposition {
    /// Parse the `disposition` query value; anything but `inline` is attachment.
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("inline") => Disposition::Inline,
            _ => Disposition::Attachment,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// Effective disposition for a resolved type.
pub fn decide_disposition(requested: Disposition, resolved: &ResolvedType) -> Disposition {
    let inline_safe = INLINE_SAFE.contains(&resolved.mime.as_str());
    if requested == Disposition::Inline && inline_safe && !resolved.downgrade {
        Disposition::Inline
    } else {
        Disposition::Attachment
    }
}

/// Type placed in `Content-Type`.
pub fn emitted_type(resolved: &ResolvedType) -> &str {
    if resolved.downgrade {
        OCTET_STREAM
    } else {
        &resolved.mime
    }
}

/// File extension for a media type, if one is known.
pub fn extension_for(mime: &str) -> Option<&'static str> {
    EXTENSIONS
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, ext)| *ext)
}

fn sanitize_extension(ext: &str) -> Option<String> {
    let ok = !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.bytes().all(|b| b.is_ascii_alphanumeric());
    ok.then(|| ext.to_ascii_lowercase())
}

fn last_path_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(segment)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    Some(decoded)
}

fn url_extension(url: &Url) -> Option<String> {
    let segment = last_path_segment(url)?;
    let (_, ext) = segment.rsplit_once('.')?;
    sanitize_extension(ext)
}

fn strip_controls(name: &str) -> String {
    name.chars().filter(|c| !c.is_control()).collect::<String>().trim().to_string()
}

/// Build the download filename.
///
/// Stem comes from the display name, else the URL's last path segment, else
/// a fixed fallback. The extension comes from the resolved type, else the
/// URL, else `bin`.
pub fn build_filename(display: &str, source: &Url, resolved_mime: &str) -> String {
    let mut name = strip_controls(display);
    if name.is_empty() {
        name = last_path_segment(source)
            .map(|s| strip_controls(&s))
            .unwrap_or_default();
    }

    let stem = match name.rsplit_once('.') {
        Some((stem, ext)) if sanitize_extension(ext).is_some() => stem.trim().to_string(),
        _ => name.clone(),
    };
    let stem = if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    };

    let ext = extension_for(resolved_mime)
        .map(str::to_string)
        .or_else(|| url_extension(source))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

    format!("{stem}.{ext}")
}

/// ASCII quoted-string form: non-ASCII and controls become `_`, `"` and `\`
/// are backslash-escaped.
pub fn quoted_ascii_filename(filename: &str) -> String {
    let mut out = String::with_capacity(filename.len() + 2);
    for c in filename.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('_'),
        }
    }
    out
}

/// Full `Content-Disposition` value with both filename parameters.
pub fn content_disposition(disposition: Disposition, filename: &str) -> String {
    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition.as_str(),
        quoted_ascii_filename(filename),
        urlencoding::encode(filename)
    )
}

/// Final, immutable header decisions for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPlan {
    pub content_type: String,
    pub disposition: Disposition,
    pub filename: String,
    pub content_length: Option<u64>,
}

impl HeaderPlan {
    pub fn new(
        resolved: &ResolvedType,
        requested: Disposition,
        display_name: &str,
        source: &Url,
        content_length: Option<u64>,
    ) -> Self {
        Self {
            content_type: emitted_type(resolved).to_string(),
            disposition: decide_disposition(requested, resolved),
            filename: build_filename(display_name, source, &resolved.mime),
            content_length,
        }
    }

    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&self.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM)),
        );
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_str(&content_disposition(self.disposition, &self.filename))
                .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        if let Some(len) = self.content_length {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }
        headers
    }
}
