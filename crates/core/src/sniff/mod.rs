//! Binary format sniffing.
//!
//! Uploaded content is never trusted by its declared type. These helpers look
//! at the leading bytes of an object to recover its real MIME type and, for
//! raster images, its pixel dimensions.

mod dimensions;
mod mime;

pub use dimensions::{Dimensions, image_dimensions};
pub use mime::sniff_mime_from_header;

/// Number of leading bytes the MIME sniffer inspects.
pub const MIME_HEADER_LEN: usize = 64;

/// Number of leading bytes fetched when probing image dimensions.
///
/// JPEG frames can sit behind large EXIF segments, so this is much larger than
/// the MIME header.
pub const DIMENSION_PROBE_LEN: u64 = 64 * 1024;
