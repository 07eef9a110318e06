//! SVG metadata extraction.
//!
//! Rendered SVG places everything inside a single top-level `<g>` element
//! whose trailing XML comment carries the diagram text and version banner:
//!
//! ```text
//! <svg><g>
//!   ...
//!   <!--MD5=[...]
//! @startuml
//! ...
//! @enduml
//! ...
//! --></g></svg>
//! ```
//!
//! XML comments cannot contain `--`, so the renderer writes adjacent
//! hyphens as `- -`; extraction reverses that before returning the text.

use roxmltree::{Document, NodeType};

use super::{ExtractError, extract_metadata};

pub(crate) fn from_svg(image: &[u8]) -> Result<String, ExtractError> {
    let xml = std::str::from_utf8(image).map_err(|_| ExtractError::Utf8)?;
    let doc = Document::parse(xml)?;

    let groups: Vec<_> = doc
        .root_element()
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "g")
        .collect();
    if groups.len() != 1 {
        return Err(ExtractError::SvgShape(groups.len()));
    }

    let mut comment = String::new();
    for node in groups[0].children() {
        if node.node_type() == NodeType::Comment {
            comment.push_str(node.text().unwrap_or_default());
        }
    }

    let Some((_, tail)) = comment.split_once("@start") else {
        return Err(ExtractError::NoMarker);
    };
    let text = extract_metadata(&format!("@start{tail}"));
    if text.is_empty() {
        return Err(ExtractError::NoMetadata);
    }

    Ok(heal_hyphens(text))
}

/// Undo the `--` → `- -` substitution the renderer applies inside
/// comments. A single replacement pass cannot see matches it creates
/// (`- - -` must become `---`, not `-- -`), so replace until stable.
fn heal_hyphens(mut text: String) -> String {
    while text.contains("- -") {
        text = text.replace("- -", "--");
    }
    text
}
