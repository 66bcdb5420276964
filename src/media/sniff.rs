//! Content-type resolution.
//!
//! The declared type is trusted only when it names an image. Anything else
//! (absent, `text/html`, `application/octet-stream`, ...) falls back to
//! magic-byte detection over the retained head of the body.

/// Generic binary type used when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Vector image type; renderable SVG can carry script.
pub const SVG: &str = "image/svg+xml";

/// Bytes of body needed for every entry in [`DETECTION_TABLE`].
pub const SNIFF_LEN: usize = 32;

/// Outcome of magic-byte inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffDecision {
    Jpeg,
    Png,
    Gif,
    Webp,
    Avif,
    Bmp,
    Ico,
    Tiff,
    Unrecognized,
}

impl SniffDecision {
    pub fn mime(self) -> Option<&'static str> {
        match self {
            SniffDecision::Jpeg => Some("image/jpeg"),
            SniffDecision::Png => Some("image/png"),
            SniffDecision::Gif => Some("image/gif"),
            SniffDecision::Webp => Some("image/webp"),
            SniffDecision::Avif => Some("image/avif"),
            SniffDecision::Bmp => Some("image/bmp"),
            SniffDecision::Ico => Some("image/x-icon"),
            SniffDecision::Tiff => Some("image/tiff"),
            SniffDecision::Unrecognized => None,
        }
    }
}

type Detector = fn(&[u8]) -> bool;

fn is_jpeg(b: &[u8]) -> bool {
    b.starts_with(&[0xFF, 0xD8, 0xFF])
}

fn is_png(b: &[u8]) -> bool {
    b.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

fn is_gif(b: &[u8]) -> bool {
    b.starts_with(b"GIF87a") || b.starts_with(b"GIF89a")
}

fn is_webp(b: &[u8]) -> bool {
    b.len() >= 12 && b.starts_with(b"RIFF") && &b[8..12] == b"WEBP"
}

// ISO-BMFF: box size, then `ftyp`, then the major brand.
fn is_avif(b: &[u8]) -> bool {
    b.len() >= 12 && &b[4..8] == b"ftyp" && matches!(&b[8..12], b"avif" | b"avis")
}

fn is_bmp(b: &[u8]) -> bool {
    b.starts_with(b"BM")
}

fn is_ico(b: &[u8]) -> bool {
    b.starts_with(&[0x00, 0x00, 0x01, 0x00])
}

fn is_tiff(b: &[u8]) -> bool {
    b.starts_with(b"II*\x00") || b.starts_with(b"MM\x00*")
}

/// Formats this proxy can recognize. Render safety is decided separately.
const DETECTION_TABLE: &[(SniffDecision, Detector)] = &[
    (SniffDecision::Jpeg, is_jpeg),
    (SniffDecision::Png, is_png),
    (SniffDecision::Gif, is_gif),
    (SniffDecision::Webp, is_webp),
    (SniffDecision::Avif, is_avif),
    (SniffDecision::Bmp, is_bmp),
    (SniffDecision::Ico, is_ico),
    (SniffDecision::Tiff, is_tiff),
];

/// Identify an image format from its leading bytes.
pub fn sniff(head: &[u8]) -> SniffDecision {
    DETECTION_TABLE
        .iter()
        .find(|(_, detect)| detect(head))
        .map(|(decision, _)| *decision)
        .unwrap_or(SniffDecision::Unrecognized)
}

/// Essence of a declared media type: no parameters, trimmed, lowercase.
pub fn normalize_declared(declared: &str) -> String {
    declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Result of combining the declared type with sniffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    pub mime: String,
    /// Set for vector images; forces attachment + generic type downstream.
    pub downgrade: bool,
}

/// `type/subtype` made only of RFC 7230 token characters.
fn is_media_type_token(mime: &str) -> bool {
    let is_token = |part: &str| {
        !part.is_empty()
            && part
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$&^_.+-".contains(&b))
    };
    match mime.split_once('/') {
        Some((top, sub)) => is_token(top) && is_token(sub),
        None => false,
    }
}

/// Resolve the effective media type of a response.
pub fn resolve_content_type(declared: Option<&str>, head: &[u8]) -> ResolvedType {
    let declared = declared
        .map(normalize_declared)
        .filter(|d| is_media_type_token(d));

    let mut mime = match declared {
        Some(d) if d.starts_with("image/") => d,
        _ => OCTET_STREAM.to_string(),
    };

    if mime == OCTET_STREAM {
        if let Some(sniffed) = sniff(head).mime() {
            mime = sniffed.to_string();
        }
    }

    let downgrade = mime == SVG;
    ResolvedType { mime, downgrade }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    #[test]
    fn detection_table() {
        assert_eq!(sniff(JPEG), SniffDecision::Jpeg);
        assert_eq!(sniff(PNG), SniffDecision::Png);
        assert_eq!(sniff(b"GIF87a...."), SniffDecision::Gif);
        assert_eq!(sniff(b"GIF89a...."), SniffDecision::Gif);
        assert_eq!(sniff(b"RIFF\x24\x00\x00\x00WEBPVP8 "), SniffDecision::Webp);
        assert_eq!(sniff(b"\x00\x00\x00\x1cftypavif\x00\x00"), SniffDecision::Avif);
        assert_eq!(sniff(b"\x00\x00\x00\x1cftypavis\x00\x00"), SniffDecision::Avif);
        assert_eq!(sniff(b"BM\x36\x00"), SniffDecision::Bmp);
        assert_eq!(sniff(&[0, 0, 1, 0, 1, 0]), SniffDecision::Ico);
        assert_eq!(sniff(b"II*\x00\x08\x00"), SniffDecision::Tiff);
        assert_eq!(sniff(b"MM\x00*\x00\x08"), SniffDecision::Tiff);
    }

    #[test]
    fn unrecognized_and_short_heads() {
        assert_eq!(sniff(b""), SniffDecision::Unrecognized);
        assert_eq!(sniff(&[0xFF, 0xD8]), SniffDecision::Unrecognized);
        assert_eq!(sniff(b"RIFF\x24\x00\x00\x00WAVE"), SniffDecision::Unrecognized);
        assert_eq!(sniff(b"\x00\x00\x00\x1cftypmp42"), SniffDecision::Unrecognized);
        assert_eq!(sniff(b"<svg xmlns="), SniffDecision::Unrecognized);
        assert_eq!(sniff(b"<!DOCTYPE html>"), SniffDecision::Unrecognized);
    }

    #[test]
    fn jpeg_without_declared_type() {
        let resolved = resolve_content_type(None, JPEG);
        assert_eq!(resolved.mime, "image/jpeg");
        assert!(!resolved.downgrade);
    }

    #[test]
    fn sniffing_overrides_non_image_declared_type() {
        assert_eq!(resolve_content_type(Some("text/html"), JPEG).mime, "image/jpeg");
        assert_eq!(
            resolve_content_type(Some("application/octet-stream"), PNG).mime,
            "image/png"
        );
    }

    #[test]
    fn declared_image_type_is_kept() {
        let resolved = resolve_content_type(Some("Image/PNG; charset=binary"), JPEG);
        assert_eq!(resolved.mime, "image/png");
    }

    #[test]
    fn unknown_bytes_stay_generic() {
        let resolved = resolve_content_type(Some("text/html; charset=utf-8"), b"<html><script>");
        assert_eq!(resolved.mime, OCTET_STREAM);
        assert!(!resolved.downgrade);
    }

    #[test]
    fn malformed_declared_type_is_ignored() {
        let resolved = resolve_content_type(Some("image/png\r\nSet-Cookie: a=b"), JPEG);
        assert_eq!(resolved.mime, "image/jpeg");

        let resolved = resolve_content_type(Some("image/"), b"");
        assert_eq!(resolved.mime, OCTET_STREAM);
    }

    #[test]
    fn svg_is_flagged() {
        let resolved = resolve_content_type(Some("image/svg+xml"), b"<svg xmlns=");
        assert_eq!(resolved.mime, SVG);
        assert!(resolved.downgrade);

        let upper = resolve_content_type(Some(" IMAGE/SVG+XML ;charset=utf-8"), b"");
        assert!(upper.downgrade);
    }
}
