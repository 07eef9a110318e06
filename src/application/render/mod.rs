//! Render orchestration: the service facade over codec, cache, and pool.

mod job;
mod pool;
mod worker;

pub use job::{RenderError, RenderedPages};
pub use pool::RenderPool;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::error::AppError;
use crate::application::extract;
use crate::cache::{CacheError, CacheKey, RenderCache, RenderSource};
use crate::config::RenderSettings;
use crate::domain::codec;
use crate::domain::diagram::{self, Diagram, Format};
use crate::domain::error::DomainError;

const TARGET: &str = "umlpipe::render";

/// Runtime configuration for the worker pool, decoupled from the settings
/// layer so tests can construct it directly.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub render_timeout: Duration,
    pub java_path: PathBuf,
    pub plantuml_path: PathBuf,
    pub search_path: PathBuf,
    pub pipe_delimiter: String,
}

impl From<&RenderSettings> for PoolConfig {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            workers: settings.workers.get(),
            render_timeout: settings.timeout,
            java_path: settings.java_path.clone(),
            plantuml_path: settings.plantuml_path.clone(),
            search_path: settings.search_path.clone(),
            pipe_delimiter: settings.pipe_delimiter.clone(),
        }
    }
}

/// Serialized shape of a render result: one base64 blob per page.
///
/// This is both the HTTP response body and the value stored (and forwarded
/// between peers) by the cache, so a cached entry can be served verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagesPayload {
    pub data: Vec<String>,
}

pub fn encode_pages(pages: &RenderedPages) -> Result<Bytes, AppError> {
    use base64::Engine;
    use base64::prelude::BASE64_STANDARD;

    let payload = PagesPayload {
        data: pages
            .images
            .iter()
            .map(|image| BASE64_STANDARD.encode(image))
            .collect(),
    };
    serde_json::to_vec(&payload)
        .map(Bytes::from)
        .map_err(|err| AppError::unexpected(format!("failed to serialize render result: {err}")))
}

/// Raw render path without the cache: resolve the diagram to source text
/// and submit it to the worker pool.
pub struct DirectRenderer {
    pool: RenderPool,
}

impl DirectRenderer {
    pub fn new(pool: RenderPool) -> Self {
        Self { pool }
    }

    pub async fn render(
        &self,
        diagram: &Diagram,
        format: Format,
    ) -> Result<RenderedPages, AppError> {
        if format == Format::Unspecified {
            return Err(AppError::validation("must give a valid format"));
        }
        if diagram.source.is_empty() && diagram.encoded.is_empty() {
            return Err(AppError::validation(
                "source or encoded diagram must be set",
            ));
        }

        let text = if diagram.source.is_empty() {
            codec::decode(&diagram.encoded)
                .map_err(|err| AppError::validation(format!("unable to decode diagram: {err}")))?
        } else {
            diagram.source.clone()
        };

        Ok(self.pool.render(text, format).await?)
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

#[async_trait]
impl RenderSource for DirectRenderer {
    async fn render_key(&self, key: &CacheKey) -> Result<Bytes, AppError> {
        let diagram = Diagram {
            source: String::new(),
            encoded: key.encoded.clone(),
        };
        let pages = self.render(&diagram, key.format).await?;
        encode_pages(&pages)
    }
}

/// The request-facing facade: Render, Shorten, Expand, and Extract.
pub struct RenderService {
    direct: Arc<DirectRenderer>,
    cache: Option<Arc<RenderCache>>,
}

impl RenderService {
    pub fn new(direct: Arc<DirectRenderer>, cache: Option<Arc<RenderCache>>) -> Self {
        Self { direct, cache }
    }

    pub fn shorten(&self, source: &str) -> Result<String, AppError> {
        codec::encode(source)
            .map_err(|err| AppError::unexpected(format!("failed to compress diagram: {err}")))
    }

    pub fn expand(&self, encoded: &str) -> Result<String, AppError> {
        codec::decode(encoded)
            .map_err(|err| AppError::validation(format!("unable to decode diagram: {err}")))
    }

    /// Render a diagram, through the cache when one is configured.
    ///
    /// Returns the serialized [`PagesPayload`] so cached values can be
    /// passed through without re-encoding.
    pub async fn render(&self, diagram: &Diagram, format: Format) -> Result<Bytes, AppError> {
        if format == Format::Unspecified {
            return Err(AppError::validation("must give a valid format"));
        }
        if diagram.source.is_empty() && diagram.encoded.is_empty() {
            return Err(AppError::validation(
                "source or encoded diagram must be set",
            ));
        }

        let Some(cache) = &self.cache else {
            let pages = self.direct.render(diagram, format).await?;
            return encode_pages(&pages);
        };

        let encoded = if diagram.encoded.is_empty() {
            self.shorten(&diagram.source)?
        } else {
            diagram.encoded.clone()
        };
        let key = CacheKey { format, encoded };
        debug!(target: TARGET, key = %key, "cache lookup");
        cache.get(&key).await.map_err(cache_error_to_app)
    }

    /// Authoritative fill for a key this node owns; peers call this via
    /// the internal cache route and it must never forward again.
    ///
    /// The cache route is only mounted when the cache is enabled, so a
    /// fill without one is an internal invariant violation.
    pub async fn fill_owned(&self, key: &CacheKey) -> Result<Bytes, AppError> {
        let Some(cache) = &self.cache else {
            return Err(DomainError::invariant(
                "cache fill requested but the cache is not enabled",
            )
            .into());
        };
        cache.get_owned(key).await.map_err(cache_error_to_app)
    }

    /// Recover a diagram from rendered image bytes.
    pub fn extract(&self, image: &[u8], expand_macros: bool) -> Result<Diagram, AppError> {
        let Some(metadata) = extract::extract_from_image(image) else {
            return Err(AppError::NotFound(
                "couldn't extract metadata from either PNG or SVG parsers",
            ));
        };

        let (original, expanded) = extract::divide_metadata(&metadata);
        let chosen = if expand_macros && !expanded.is_empty() {
            expanded
        } else {
            original
        };

        let source = diagram::normalize(&chosen);
        let encoded = self.shorten(&source)?;
        Ok(Diagram { source, encoded })
    }

    pub fn shutdown(&self) {
        self.direct.shutdown();
    }
}

fn cache_error_to_app(err: CacheError) -> AppError {
    match err {
        CacheError::Fill(inner) => AppError::Shared(inner),
        other => AppError::unexpected(other.to_string()),
    }
}
