//! Request/response shapes for the JSON API. The CLI client reuses these
//! so both sides of the wire agree by construction.

use serde::{Deserialize, Serialize};

use crate::domain::diagram::{Diagram, Format};

pub use crate::application::render::PagesPayload as RenderResponse;

#[derive(Debug, Serialize, Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub diagram: Diagram,
    #[serde(default)]
    pub format: Format,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShortenRequest {
    pub source: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShortenResponse {
    pub encoded: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpandRequest {
    pub encoded: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpandResponse {
    pub source: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractParams {
    #[serde(default)]
    pub expand_macros: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub diagram: Diagram,
}
