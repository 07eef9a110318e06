//! Scheduler: keeps the target number of workers alive and admits jobs.
//!
//! A counting semaphore of capacity `workers` governs how many renderer
//! processes exist. The manager task acquires a permit, spawns a worker
//! holding it, and the permit returns when the worker exits for any
//! reason, letting the manager start a replacement immediately. Worker
//! ids are monotonic and never reused so crash logs stay unambiguous;
//! the id can exceed the pool size over the process lifetime.
//!
//! There is no explicit job queue: the bounded channel shared by all
//! workers is the queue, and a blocked `send` is the backpressure signal
//! to callers.

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore, mpsc, oneshot, watch};
use tracing::info;

use crate::domain::diagram::Format;

use super::PoolConfig;
use super::job::{RenderError, RenderJob, RenderedPages};
use super::worker::Worker;

const TARGET: &str = "umlpipe::render::pool";

pub struct RenderPool {
    jobs: mpsc::Sender<RenderJob>,
    shutdown: watch::Sender<bool>,
}

impl RenderPool {
    /// Start the pool: create the shared job channel and the manager task.
    ///
    /// The renderer's include search path is created up front; failing
    /// that is a deployment error worth failing hard on.
    pub fn start(config: PoolConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.search_path)?;

        let workers = config.workers;
        let config = Arc::new(config);
        let (jobs_tx, jobs_rx) = mpsc::channel::<RenderJob>(1);
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(manage_workers(config, workers, jobs_rx, shutdown_rx));

        Ok(Self {
            jobs: jobs_tx,
            shutdown: shutdown_tx,
        })
    }

    /// Submit one render job and wait for its images.
    ///
    /// The send suspends until a worker is free; that suspension is the
    /// pool's admission control.
    pub async fn render(&self, text: String, format: Format) -> Result<RenderedPages, RenderError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.jobs
            .send(RenderJob {
                text,
                format,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RenderError::PoolClosed)?;
        reply_rx.await.map_err(|_| RenderError::WorkerLost)?
    }

    /// Stop spawning replacements and tell idle workers to exit. In-flight
    /// jobs are not drained here; graceful stop lives at the HTTP layer.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn manage_workers(
    config: Arc<PoolConfig>,
    workers: usize,
    jobs: Arc<Mutex<mpsc::Receiver<RenderJob>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(target: TARGET, workers, "starting worker pool");
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            permit = semaphore.clone().acquire_owned() => {
                let Ok(permit) = permit else { break };
                let worker = Worker::new(next_id, config.clone(), jobs.clone(), shutdown.clone());
                next_id += 1;
                tokio::spawn(async move {
                    worker.run().await;
                    // Dropping the permit frees a pool slot and lets the
                    // manager spawn the replacement.
                    drop(permit);
                });
            }
        }
    }
    info!(target: TARGET, "worker pool manager stopped");
}
