//! Pixel dimension extraction for raster image headers.

use serde::{Deserialize, Serialize};

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Creates a dimension pair.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether both axes differ from `other` by at most `tolerance` pixels.
    #[must_use]
    pub fn within_tolerance(&self, other: Self, tolerance: u32) -> bool {
        self.width.abs_diff(other.width) <= tolerance
            && self.height.abs_diff(other.height) <= tolerance
    }
}

/// Extracts image dimensions from the leading bytes of an object.
///
/// The parser is chosen by the claimed MIME type. Returns `None` for
/// unsupported types and for buffers too short or malformed to carry the
/// dimensions.
#[must_use]
pub fn image_dimensions(mime_type: &str, bytes: &[u8]) -> Option<Dimensions> {
    match mime_type {
        "image/png" => png(bytes),
        "image/gif" => gif(bytes),
        "image/jpeg" | "image/jpg" => jpeg(bytes),
        "image/webp" => webp(bytes),
        _ => None,
    }
}

fn be_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

fn le_u24(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 3)?;
    Some(u32::from(b[0]) | (u32::from(b[1]) << 8) | (u32::from(b[2]) << 16))
}

fn png(bytes: &[u8]) -> Option<Dimensions> {
    if bytes.get(12..16)? != b"IHDR" {
        return None;
    }
    Some(Dimensions::new(be_u32(bytes, 16)?, be_u32(bytes, 20)?))
}

fn gif(bytes: &[u8]) -> Option<Dimensions> {
    Some(Dimensions::new(
        u32::from(le_u16(bytes, 6)?),
        u32::from(le_u16(bytes, 8)?),
    ))
}

/// Walks JPEG segments until the baseline frame header.
fn jpeg(bytes: &[u8]) -> Option<Dimensions> {
    if bytes.get(..2)? != [0xff, 0xd8] {
        return None;
    }

    let mut i = 2;
    while i + 1 < bytes.len() {
        if bytes[i] != 0xff {
            return None;
        }
        let marker = bytes[i + 1];
        match marker {
            // fill byte
            0xff => i += 1,
            0xd0..=0xd7 | 0x01 => i += 2,
            0xd9 | 0xda => return None,
            0xc0 => {
                let height = be_u16(bytes, i + 5)?;
                let width = be_u16(bytes, i + 7)?;
                return Some(Dimensions::new(u32::from(width), u32::from(height)));
            }
            _ => {
                let segment_len = usize::from(be_u16(bytes, i + 2)?);
                if segment_len < 2 {
                    return None;
                }
                i += 2 + segment_len;
            }
        }
    }
    None
}

fn webp(bytes: &[u8]) -> Option<Dimensions> {
    if bytes.get(..4)? != b"RIFF" || bytes.get(8..12)? != b"WEBP" {
        return None;
    }
    match bytes.get(12..16)? {
        b"VP8X" => Some(Dimensions::new(
            le_u24(bytes, 24)? + 1,
            le_u24(bytes, 27)? + 1,
        )),
        b"VP8 " => {
            if bytes.get(23..26)? != [0x9d, 0x01, 0x2a] {
                return None;
            }
            Some(Dimensions::new(
                u32::from(le_u16(bytes, 26)? & 0x3fff),
                u32::from(le_u16(bytes, 28)? & 0x3fff),
            ))
        }
        b"VP8L" => {
            if *bytes.get(20)? != 0x2f {
                return None;
            }
            let b = bytes.get(21..25)?;
            let bits = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            Some(Dimensions::new((bits & 0x3fff) + 1, ((bits >> 14) & 0x3fff) + 1))
        }
        _ => None,
    }
}
