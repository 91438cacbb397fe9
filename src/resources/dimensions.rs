//! Header-only image dimension readers for PNG, JPEG and SVG.
//!
//! Every reader works on the raw bytes already read for hashing and returns
//! `None` on anything it does not recognise. A malformed image is not an
//! error: the resource is still published, just without `sizes` metadata.

use quick_xml::Reader;
use quick_xml::events::Event;

/// Pixel dimensions of an image resource. Vector images may lack either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vector: bool,
}

impl ImageInfo {
    fn raster(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            vector: false,
        }
    }

    /// Value for a `sizes` attribute: `WxH`, `any` for vector art, or nothing.
    pub fn sizes(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ if self.vector => Some("any".to_string()),
            _ => None,
        }
    }
}

/// Dispatch on a lower-case extension (no dot).
pub fn read_dimensions(extension: &str, bytes: &[u8]) -> Option<ImageInfo> {
    match extension {
        "png" => png_dimensions(bytes),
        "jpg" | "jpeg" => jpeg_dimensions(bytes),
        "svg" => svg_dimensions(bytes),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// PNG
// ---------------------------------------------------------------------------

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub fn png_dimensions(bytes: &[u8]) -> Option<ImageInfo> {
    if bytes.len() < 24 || bytes[..8] != PNG_SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    Some(ImageInfo::raster(width, height))
}

// ---------------------------------------------------------------------------
// JPEG
// ---------------------------------------------------------------------------

/// Walk the marker stream up to the first start-of-frame segment.
///
/// Segment layout after the two marker bytes:
///   Bytes 0-1: segment length (big-endian, includes itself)
///   Byte  2:   sample precision
///   Bytes 3-4: height
///   Bytes 5-6: width
pub fn jpeg_dimensions(bytes: &[u8]) -> Option<ImageInfo> {
    if bytes.len() < 2 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos < bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = *bytes.get(pos + 1)?;
        if marker == 0x00 || marker == 0xFF {
            return None;
        }
        pos += 2;

        // RSTn, SOI and EOI are standalone markers.
        if (0xD0..=0xD9).contains(&marker) {
            continue;
        }

        if pos + 2 > bytes.len() {
            return None;
        }
        let length = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]) as usize;
        if pos + length > bytes.len() {
            return None;
        }

        if (0xC0..=0xCF).contains(&marker) && marker != 0xC4 && marker != 0xCC {
            if length < 7 {
                return None;
            }
            let height = u16::from_be_bytes([bytes[pos + 3], bytes[pos + 4]]);
            let width = u16::from_be_bytes([bytes[pos + 5], bytes[pos + 6]]);
            return Some(ImageInfo::raster(width as u32, height as u32));
        }
        pos += length;
    }
    None
}

// ---------------------------------------------------------------------------
// SVG
// ---------------------------------------------------------------------------

const XML_PROLOGUE: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

/// Read the root `<svg>` element's `width`/`height`, falling back to the
/// `viewBox` size. Icon exports often omit the XML prologue, so one is
/// assumed when the text opens directly with `<svg `.
pub fn svg_dimensions(bytes: &[u8]) -> Option<ImageInfo> {
    let text = std::str::from_utf8(bytes).ok()?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let xml = if text.starts_with("<svg ") {
        format!("{}{}", XML_PROLOGUE, text)
    } else if text.starts_with("<?xml") {
        text.to_string()
    } else {
        return None;
    };

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);

    let mut info = ImageInfo {
        vector: true,
        ..ImageInfo::default()
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if !e.local_name().as_ref().eq_ignore_ascii_case(b"svg") {
                    break;
                }
                let mut width = None;
                let mut height = None;
                let mut view_box = None;
                for attr in e.attributes().with_checks(false).flatten() {
                    let value = String::from_utf8_lossy(&attr.value).into_owned();
                    match attr.key.as_ref() {
                        b"width" => width = Some(value),
                        b"height" => height = Some(value),
                        b"viewBox" => view_box = Some(value),
                        _ => {}
                    }
                }
                if let (Some(w), Some(h)) = (&width, &height) {
                    info.width = svg_length_to_px(w);
                    info.height = svg_length_to_px(h);
                } else if let Some(view_box) = view_box {
                    let numbers: Vec<f64> = view_box
                        .split(|c: char| c.is_whitespace() || c == ',')
                        .filter(|s| !s.is_empty())
                        .filter_map(|s| s.parse().ok())
                        .collect();
                    if numbers.len() == 4 {
                        info.width = Some(numbers[2].round() as u32);
                        info.height = Some(numbers[3].round() as u32);
                    }
                }
                break;
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }
    Some(info)
}

/// Convert an SVG length to CSS pixels. Percentages are indeterminate.
pub fn svg_length_to_px(length: &str) -> Option<u32> {
    let length = length.trim();
    let split = length
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(length.len());
    let (number, unit) = length.split_at(split);
    let number: f64 = number.parse().ok()?;
    let factor = match unit.trim() {
        "" | "px" | "pt" => 1.0,
        "em" | "pc" => 12.0,
        "ex" => 24.0,
        "in" => 72.0,
        "cm" => 72.0 / 2.54,
        "mm" => 72.0 / 25.4,
        _ => return None,
    };
    Some((number * factor).round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{minimal_jpeg, minimal_png};

    #[test]
    fn png_reads_ihdr_dimensions() {
        let info = png_dimensions(&minimal_png(10, 20)).unwrap();
        assert_eq!(info.width, Some(10));
        assert_eq!(info.height, Some(20));
        assert!(!info.vector);
    }

    #[test]
    fn png_with_bad_signature_has_no_dimensions() {
        let mut bytes = minimal_png(10, 20);
        bytes[1] = b'X';
        assert_eq!(png_dimensions(&bytes), None);
    }

    #[test]
    fn png_too_short_has_no_dimensions() {
        assert_eq!(png_dimensions(&minimal_png(10, 20)[..23]), None);
    }

    #[test]
    fn jpeg_reads_first_frame_header() {
        let info = jpeg_dimensions(&minimal_jpeg(640, 480)).unwrap();
        assert_eq!(info.width, Some(640));
        assert_eq!(info.height, Some(480));
    }

    #[test]
    fn jpeg_without_soi_is_rejected() {
        assert_eq!(jpeg_dimensions(&[0x00, 0xD8, 0xFF]), None);
    }

    #[test]
    fn jpeg_truncated_segment_is_rejected() {
        let bytes = minimal_jpeg(640, 480);
        assert_eq!(jpeg_dimensions(&bytes[..8]), None);
    }

    #[test]
    fn jpeg_invalid_marker_is_rejected() {
        assert_eq!(jpeg_dimensions(&[0xFF, 0xD8, 0xFF, 0x00]), None);
    }

    #[test]
    fn svg_explicit_dimensions_with_units() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="1in" height="2em"></svg>"#;
        let info = svg_dimensions(svg).unwrap();
        assert_eq!(info.width, Some(72));
        assert_eq!(info.height, Some(24));
        assert!(info.vector);
    }

    #[test]
    fn svg_falls_back_to_view_box() {
        let svg = br#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 512 448"/>"#;
        let info = svg_dimensions(svg).unwrap();
        assert_eq!(info.sizes().as_deref(), Some("512x448"));
    }

    #[test]
    fn svg_percentage_is_indeterminate() {
        let svg = br#"<svg width="100%" height="100%"></svg>"#;
        let info = svg_dimensions(svg).unwrap();
        assert_eq!(info.width, None);
        assert_eq!(info.sizes().as_deref(), Some("any"));
    }

    #[test]
    fn non_xml_text_is_not_an_svg() {
        assert_eq!(svg_dimensions(b"just text"), None);
    }

    #[test]
    fn length_units() {
        assert_eq!(svg_length_to_px("10"), Some(10));
        assert_eq!(svg_length_to_px("10px"), Some(10));
        assert_eq!(svg_length_to_px("2.54cm"), Some(72));
        assert_eq!(svg_length_to_px("1pc"), Some(12));
        assert_eq!(svg_length_to_px("abc"), None);
    }

    #[test]
    fn dimensions_dispatch_by_extension() {
        assert!(read_dimensions("png", &minimal_png(1, 1)).is_some());
        assert!(read_dimensions("gif", &minimal_png(1, 1)).is_none());
    }
}
