//! MIME sniffing from magic numbers.

use super::MIME_HEADER_LEN;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Detects the MIME type of content from its leading bytes.
///
/// Only the first 64 bytes are inspected. Returns `None` for fewer than four
/// bytes or when no known signature matches.
#[must_use]
pub fn sniff_mime_from_header(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    let header = &bytes[..bytes.len().min(MIME_HEADER_LEN)];

    if header.starts_with(b"%PDF-") {
        return Some("application/pdf");
    }
    if header.starts_with(PNG_SIGNATURE) {
        return Some("image/png");
    }
    if header.starts_with(&[0xff, 0xd8, 0xff]) {
        return Some("image/jpeg");
    }
    if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if header.starts_with(b"RIFF") && header.get(8..12) == Some(&b"WEBP"[..]) {
        return Some("image/webp");
    }
    if header.starts_with(&[0x1a, 0x45, 0xdf, 0xa3]) {
        return Some("video/webm");
    }
    if header.get(4..8) == Some(&b"ftyp"[..]) {
        return match header.get(8..12) {
            Some(b"avif" | b"avis") => Some("image/avif"),
            _ => Some("video/mp4"),
        };
    }
    if looks_like_svg(header) {
        return Some("image/svg+xml");
    }
    None
}

fn looks_like_svg(header: &[u8]) -> bool {
    let text = header.strip_prefix(UTF8_BOM).unwrap_or(header);
    let start = text
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(text.len());
    let text = &text[start..];

    starts_with_ignore_case(text, b"<?xml")
        || starts_with_ignore_case(text, b"<!doctype svg")
        || starts_with_ignore_case(text, b"<svg")
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
