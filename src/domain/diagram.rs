//! Diagram values and the text rules the pipe protocol depends on.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Output format for a render request.
///
/// `Unspecified` exists so wire payloads that omit the field deserialize
/// cleanly; every render path rejects it before work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Unspecified,
    Png,
    Svg,
}

impl Format {
    /// Upper-case name used in cache keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Unspecified => "UNSPECIFIED",
            Format::Png => "PNG",
            Format::Svg => "SVG",
        }
    }

    /// File extension for rendered output.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Unspecified => "bin",
            Format::Png => "png",
            Format::Svg => "svg",
        }
    }

    pub fn parse(name: &str) -> Option<Format> {
        match name.to_ascii_uppercase().as_str() {
            "PNG" => Some(Format::Png),
            "SVG" => Some(Format::Svg),
            _ => None,
        }
    }
}

/// A diagram carried as either human-readable source or its short code.
///
/// Exactly one of the two fields is authoritative in a request; handlers
/// prefer `source` when it is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagram {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub encoded: String,
}

/// Prepare user-provided diagram text for the renderer pipe.
///
/// Newlines become UNIX, outer whitespace is trimmed, and the final line is
/// trimmed on its own: an `@endXYZ` with leading whitespace makes the
/// renderer stop responding over the pipe.
pub fn normalize(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = text.trim();
    match text.rfind('\n') {
        Some(i) => format!("{}\n{}", &text[..i], text[i..].trim()),
        None => text.to_string(),
    }
}

/// Check that diagram text is renderable and return the number of pages.
///
/// The renderer in pipe mode waits silently for an `@startXYZ` marker, so
/// unmarked input would hang until the job deadline. A source block may
/// hold several back-to-back `@start`/`@end` pairs; the renderer emits one
/// image per pair and no terminal marker, so the caller must know the page
/// count before reading. Assumes `text` has been through [`normalize`].
pub fn validate(text: &str) -> Result<usize, DomainError> {
    // Leading newline makes marker counting position-independent.
    let probe = format!("\n{text}");
    let starts = probe.matches("\n@start").count();
    let ends = probe.matches("\n@end").count();

    if starts == 0 || ends == 0 {
        return Err(DomainError::validation(
            "diagram is missing required @startXYZ/@endXYZ markers",
        ));
    }
    if starts != ends {
        return Err(DomainError::validation(
            "diagram has mismatched @startXYZ and @endXYZ pairs",
        ));
    }
    Ok(starts)
}

/// Wrap normalized text in the pipe-protocol format directive.
///
/// `format` must already be validated; an unspecified format reaching this
/// point is a programming error.
pub fn with_format_spec(text: &str, format: Format) -> String {
    let spec = match format {
        Format::Png => "@@@format png",
        Format::Svg => "@@@format svg",
        Format::Unspecified => unreachable!("format is validated before jobs are submitted"),
    };
    format!("{spec}\n{text}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_converts_crlf_and_trims() {
        assert_eq!(
            normalize("  @startuml\r\nBob -> Alice\r\n@enduml  \n"),
            "@startuml\nBob -> Alice\n@enduml"
        );
    }

    #[test]
    fn normalize_trims_only_the_final_line() {
        let input = "@startuml\n    Bob -> Alice\n    @enduml";
        assert_eq!(normalize(input), "@startuml\n    Bob -> Alice\n@enduml");
    }

    #[test]
    fn normalize_leaves_single_line_input_alone() {
        assert_eq!(normalize("  @startuml  "), "@startuml");
    }

    #[test]
    fn validate_counts_pages() {
        let cases = [
            ("@startuml\nrectangle Foo\n@enduml", 1),
            (
                "@startuml\nrectangle Foo\n@enduml\n@startuml\nrectangle Bar\n@enduml",
                2,
            ),
            (
                "@startgantt\n[t] lasts 3 days\n@endgantt\n@startuml\na -> b\n@enduml\n@startuml\nc -> d\n@enduml",
                3,
            ),
        ];
        for (text, pages) in cases {
            assert_eq!(validate(text).expect(text), pages);
        }
    }

    #[test]
    fn validate_rejects_unmarked_text() {
        assert!(validate("rectangle Foo").is_err());
    }

    #[test]
    fn validate_rejects_mismatched_pairs() {
        let text = "@startuml\nrectangle Foo\n@enduml\n@startuml Bar";
        assert!(matches!(
            validate(text),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn format_spec_wraps_and_terminates() {
        assert_eq!(
            with_format_spec("@startuml\na -> b\n@enduml", Format::Svg),
            "@@@format svg\n@startuml\na -> b\n@enduml\n"
        );
    }
}
