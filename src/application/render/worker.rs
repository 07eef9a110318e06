//! Worker: one long-lived renderer subprocess and the task that owns it.
//!
//! The renderer runs in pipe mode: it reads successive diagram blocks from
//! stdin and writes image bytes to stdout, each image followed by the
//! configured delimiter and a newline. Pipe mode trades exit-code
//! diagnostics for amortized JVM startup cost; renderer-side errors come
//! back as rendered error images.
//!
//! A worker that hits any pipe error after submitting a job exits instead
//! of continuing: once a partial job has been written there is no way to
//! know what state the renderer is in. The scheduler starts a replacement
//! with a fresh process and a fresh id.

use std::process::Stdio;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::domain::diagram::Format;
use crate::domain::{codec, diagram};

use super::PoolConfig;
use super::job::{RenderError, RenderJob, RenderedPages};

const TARGET: &str = "umlpipe::render::worker";

/// Stdout is read in small chunks; the size only affects how promptly the
/// delimiter is noticed, never correctness.
const READ_CHUNK: usize = 64;

pub(crate) struct Worker {
    id: u64,
    config: Arc<PoolConfig>,
    jobs: Arc<Mutex<mpsc::Receiver<RenderJob>>>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    pub(crate) fn new(
        id: u64,
        config: Arc<PoolConfig>,
        jobs: Arc<Mutex<mpsc::Receiver<RenderJob>>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            config,
            jobs,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(target: TARGET, worker_id = self.id, "starting worker");

        let mut child = match self.spawn_renderer() {
            Ok(child) => child,
            Err(err) => {
                error!(
                    target: TARGET,
                    worker_id = self.id,
                    error = %err,
                    "failed to start renderer process"
                );
                return;
            }
        };

        let (Some(mut stdin), Some(mut stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            error!(
                target: TARGET,
                worker_id = self.id,
                "renderer process is missing a pipe"
            );
            return;
        };
        tokio::spawn(drain_stderr(self.id, stderr));

        let delimiter = format!("{}\n", self.config.pipe_delimiter).into_bytes();

        loop {
            // The receiver lock is held only while waiting for a job; the
            // bounded channel behind it is the admission queue shared by
            // every worker.
            let job = {
                let mut rx = self.jobs.lock().await;
                tokio::select! {
                    job = rx.recv() => job,
                    _ = self.shutdown.changed() => None,
                }
            };
            let Some(job) = job else { break };

            let normalized = diagram::normalize(&job.text);
            let pages = match diagram::validate(&normalized) {
                Ok(pages) => pages,
                Err(err) => {
                    // Nothing was written to the pipe, so the renderer is
                    // still in a known state and the worker can continue.
                    let _ = job.reply.send(Err(err.into()));
                    continue;
                }
            };

            let short = codec::encode(&normalized).unwrap_or_default();
            info!(
                target: TARGET,
                worker_id = self.id,
                pages,
                short = %short,
                "rendering diagram(s)"
            );

            let result = self
                .run_job(&mut stdin, &mut stdout, &delimiter, &normalized, job.format, pages)
                .await;
            let failed = result.is_err();
            if let Err(err) = &result {
                error!(
                    target: TARGET,
                    worker_id = self.id,
                    error = %err,
                    "exiting worker after job failure"
                );
            }
            let _ = job.reply.send(result);

            if failed {
                break;
            }
        }

        if let Err(err) = child.start_kill() {
            warn!(
                target: TARGET,
                worker_id = self.id,
                error = %err,
                "failed to kill renderer process"
            );
        }
        let _ = child.wait().await;
        info!(target: TARGET, worker_id = self.id, "worker stopped");
    }

    async fn run_job(
        &self,
        stdin: &mut ChildStdin,
        stdout: &mut ChildStdout,
        delimiter: &[u8],
        text: &str,
        format: Format,
        pages: usize,
    ) -> Result<RenderedPages, RenderError> {
        let payload = diagram::with_format_spec(text, format);
        let timeout = self.config.render_timeout;

        tokio::select! {
            result = read_pages(self.id, stdin, stdout, delimiter, &payload, pages) => {
                result.map_err(RenderError::Pipe)
            }
            _ = tokio::time::sleep(timeout) => {
                error!(
                    target: TARGET,
                    worker_id = self.id,
                    timeout_secs = timeout.as_secs(),
                    "aborting worker, diagram render exceeded deadline"
                );
                Err(RenderError::Timeout { timeout })
            }
        }
    }

    fn spawn_renderer(&self) -> std::io::Result<Child> {
        let mut cmd = Command::new(&self.config.java_path);
        cmd.arg(format!(
            "-Dplantuml.include.path=\"{}\"",
            self.config.search_path.display()
        ))
        .arg("-jar")
        .arg(&self.config.plantuml_path)
        .arg("-headless")
        .arg("-pipe")
        .arg("-pipedelimitor")
        .arg(&self.config.pipe_delimiter)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd.spawn()
    }
}

/// Write one wrapped block and read back `pages` delimiter-framed images.
///
/// The renderer emits no terminal marker, so the page count computed
/// before submission is the only way to know when the job is done.
async fn read_pages(
    worker_id: u64,
    stdin: &mut ChildStdin,
    stdout: &mut ChildStdout,
    delimiter: &[u8],
    payload: &str,
    pages: usize,
) -> std::io::Result<RenderedPages> {
    stdin.write_all(payload.as_bytes()).await?;
    stdin.flush().await?;

    let mut images = Vec::with_capacity(pages);
    let mut current: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    while images.len() < pages {
        if current.ends_with(delimiter) {
            current.truncate(current.len() - delimiter.len());
            let image = Bytes::from(std::mem::take(&mut current));
            debug!(
                target: TARGET,
                worker_id,
                page = images.len() + 1,
                pages,
                bytes = image.len(),
                "found separator"
            );
            images.push(image);
            continue;
        }
        let n = stdout.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "renderer closed stdout mid-job",
            ));
        }
        current.extend_from_slice(&chunk[..n]);
    }
    Ok(RenderedPages { images })
}

async fn drain_stderr(worker_id: u64, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                warn!(target: TARGET, worker_id, line = %line, "renderer stderr");
            }
            Ok(None) => break,
            Err(err) => {
                warn!(
                    target: TARGET,
                    worker_id,
                    error = %err,
                    "closing renderer stderr reader"
                );
                break;
            }
        }
    }
}
