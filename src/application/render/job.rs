//! Job and result types exchanged between the facade and the worker pool.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::diagram::Format;
use crate::domain::error::DomainError;

/// One render submission: diagram text, requested format, and a single-use
/// reply channel. Owned by a worker between receive and reply.
pub(crate) struct RenderJob {
    pub text: String,
    pub format: Format,
    pub reply: oneshot::Sender<Result<RenderedPages, RenderError>>,
}

/// Ordered rendered images, one per `@start`/`@end` pair in the submitted
/// source, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPages {
    pub images: Vec<Bytes>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("diagram took longer than {timeout:?} to render")]
    Timeout { timeout: Duration },
    #[error("error reading rendered diagram: {0}")]
    Pipe(std::io::Error),
    #[error("render pool is not running")]
    PoolClosed,
    #[error("render worker terminated before replying")]
    WorkerLost,
}
