//! Recover embedded diagram source from rendered images.
//!
//! The renderer stores the submitted diagram text (plus a macro-expanded
//! copy and a version banner) inside every image it produces: as a
//! zlib-compressed `iTXt` chunk in PNG output and as a trailing XML
//! comment in SVG output. These parsers undo that so a rendered image can
//! be round-tripped back to its source.

mod png;
mod svg;

use thiserror::Error;
use tracing::debug;

const VERSION_DELIM: &str = "PlantUML version ";

#[derive(Debug, Error)]
pub(crate) enum ExtractError {
    #[error("png signature not found")]
    NotPng,
    #[error("png ended before a metadata chunk")]
    TruncatedPng,
    #[error("metadata chunk is not a valid zlib stream: {0}")]
    Zlib(std::io::Error),
    #[error("embedded metadata is not valid UTF-8")]
    Utf8,
    #[error("image is not parseable XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("expected exactly one top-level <g> element, found {0}")]
    SvgShape(usize),
    #[error("no @start marker in embedded comment")]
    NoMarker,
    #[error("no renderer metadata present in image")]
    NoMetadata,
}

/// Extract embedded diagram text from image bytes, PNG first, then SVG.
///
/// Returns `None` when neither parser can locate metadata.
pub fn extract_from_image(image: &[u8]) -> Option<String> {
    match png::from_png(image) {
        Ok(text) => return Some(text),
        Err(err) => {
            debug!(
                target = "umlpipe::extract",
                error = %err,
                "png extraction failed, trying svg"
            );
        }
    }
    match svg::from_svg(image) {
        Ok(text) => Some(text),
        Err(err) => {
            debug!(
                target = "umlpipe::extract",
                error = %err,
                "svg extraction failed"
            );
            None
        }
    }
}

/// Strip the version banner the renderer appends to embedded metadata.
///
/// The banner marker is expected exactly once; anything else means the
/// blob is not renderer metadata and yields an empty string.
pub(crate) fn extract_metadata(metadata: &str) -> String {
    let mut parts = metadata.split(VERSION_DELIM);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(head), Some(_), None) => head.trim().to_string(),
        _ => String::new(),
    }
}

/// Split embedded metadata into the original diagram and, when present,
/// the macro-expanded copy the renderer appends after it.
pub fn divide_metadata(metadata: &str) -> (String, String) {
    if metadata.matches("\n@end").count() == 1 {
        return (metadata.to_string(), String::new());
    }

    let Some(first_end) = metadata.find("\n@end") else {
        return (metadata.to_string(), String::new());
    };
    // Cut after the first diagram's closing line, keeping its newline on
    // the left half so the right half begins at the second @start.
    let cut = match metadata[first_end + 1..].find('\n') {
        Some(i) => first_end + 1 + i + 1,
        None => metadata.len(),
    };
    (metadata[..cut].to_string(), metadata[cut..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_metadata_strips_version_banner() {
        let metadata = "@startuml\na -> b\n@enduml\n\nPlantUML version 1.2022.2(Tue Jan 01)\n";
        assert_eq!(extract_metadata(metadata), "@startuml\na -> b\n@enduml");
    }

    #[test]
    fn extract_metadata_requires_exactly_one_banner() {
        assert_eq!(extract_metadata("no banner here"), "");
        assert_eq!(
            extract_metadata("PlantUML version a PlantUML version b"),
            ""
        );
    }

    #[test]
    fn divide_metadata_passes_single_diagram_through() {
        let metadata = "@startuml\n...\n@enduml";
        let (original, expanded) = divide_metadata(metadata);
        assert_eq!(original, metadata);
        assert_eq!(expanded, "");
    }

    #[test]
    fn divide_metadata_splits_original_and_expanded() {
        let metadata = "@startuml\n...\n...\n@enduml\n@startuml\n...\n@enduml";
        let (original, expanded) = divide_metadata(metadata);
        assert_eq!(original, "@startuml\n...\n...\n@enduml\n");
        assert_eq!(expanded, "@startuml\n...\n@enduml");
    }

    #[test]
    fn extract_from_image_returns_none_for_garbage() {
        assert_eq!(extract_from_image(b"definitely not an image"), None);
    }
}
