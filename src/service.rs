use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc, Arc, Condvar, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use rand::{rngs::StdRng, SeedableRng as _};
use serde::Serialize;

use crate::configuration::RenderConfiguration;
use crate::error::{ContextError, ErrorKind};
use crate::font_set::FontSet;
use crate::geometry::{PageFormat, PageSide};
use crate::registry::FontRegistry;
use crate::render::{RenderRequest, Renderer};

pub type JobId = u64;

/// Where a submitted job is in its lifecycle.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed {
        pdf_path: PathBuf,
        execution_time_ms: u64,
        pages: usize,
    },
    Failed {
        message: String,
    },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }
}

/// An owned render request, handed over to a worker.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub text: String,
    pub font_set: FontSet,
    pub page_format: PageFormat,
    pub grid_enabled: bool,
    pub first_page_side: PageSide,
}

impl RenderJob {
    fn as_request(&self) -> RenderRequest<'_> {
        RenderRequest {
            text: &self.text,
            font_set: &self.font_set,
            page_format: self.page_format,
            grid_enabled: self.grid_enabled,
            first_page_side: self.first_page_side,
        }
    }
}

/// The status of every job the service has seen.
#[derive(Debug, Default)]
pub struct JobBoard {
    statuses: Mutex<HashMap<JobId, JobStatus>>,
    changed: Condvar,
}

impl JobBoard {
    fn set(&self, job_id: JobId, status: JobStatus) {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        statuses.insert(job_id, status);
        self.changed.notify_all();
    }

    pub fn status(&self, job_id: JobId) -> Option<JobStatus> {
        let statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        statuses.get(&job_id).cloned()
    }

    /// Blocks until the job has completed or failed. Unknown jobs return `None` right away.
    pub fn wait(&self, job_id: JobId) -> Option<JobStatus> {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match statuses.get(&job_id) {
                None => return None,
                Some(status) if status.is_finished() => return Some(status.clone()),
                Some(_) => {
                    statuses = self
                        .changed
                        .wait(statuses)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }
}

struct QueuedJob {
    id: JobId,
    job: RenderJob,
}

/// Everything a worker needs, shared by all of them.
struct WorkerContext {
    configuration: RenderConfiguration,
    registry: Arc<FontRegistry>,
    board: Arc<JobBoard>,
    output_directory: PathBuf,
}

impl WorkerContext {
    fn run(&self, queued_job: QueuedJob) {
        let QueuedJob { id, job } = queued_job;
        self.board.set(id, JobStatus::Running);
        log::info!("Job {} started ({} characters)", id, job.text.chars().count());

        let start = Instant::now();
        let output_path = self.output_directory.join(format!("job_{}.pdf", id));
        let renderer = Renderer::new(&self.registry, &self.configuration);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            renderer.render_to_file(&job.as_request(), &output_path, &mut StdRng::from_entropy())
        }));
        let execution_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let status = match outcome {
            Ok(Ok(summary)) => {
                log::info!(
                    "Job {} completed in {} ms: {} pages written to {:?}",
                    id,
                    execution_time_ms,
                    summary.pages,
                    output_path
                );
                JobStatus::Completed {
                    pdf_path: output_path,
                    execution_time_ms,
                    pages: summary.pages,
                }
            }
            Ok(Err(error)) => {
                log::warn!("Job {} failed with a {}: {}", id, error.kind(), error);
                JobStatus::Failed {
                    message: error.to_string(),
                }
            }
            Err(_) => {
                log::error!("Job {} panicked while rendering", id);
                JobStatus::Failed {
                    message: "The render panicked".to_string(),
                }
            }
        };
        self.board.set(id, status);
    }
}

/// Runs renders on a fixed number of worker threads so that a slow render never blocks the
/// caller. The workers share only the font registry.
pub struct RenderService {
    sender: Option<mpsc::Sender<QueuedJob>>,
    workers: Vec<JoinHandle<()>>,
    board: Arc<JobBoard>,
    registry: Arc<FontRegistry>,
    next_job_id: AtomicU64,
}

impl RenderService {
    pub fn new(
        configuration: RenderConfiguration,
        registry: Arc<FontRegistry>,
        output_directory: PathBuf,
    ) -> Result<Self, ContextError> {
        configuration.validate()?;
        std::fs::create_dir_all(&output_directory).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Storage,
                format!("Unable to create the output directory {:?}", output_directory),
                &error,
            )
        })?;

        let worker_count = configuration.worker_count;
        let board = Arc::new(JobBoard::default());
        let context = Arc::new(WorkerContext {
            configuration,
            registry: Arc::clone(&registry),
            board: Arc::clone(&board),
            output_directory,
        });

        let (sender, receiver) = mpsc::channel::<QueuedJob>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(worker_count);
        for worker_index in 0..worker_count {
            let receiver = Arc::clone(&receiver);
            let context = Arc::clone(&context);
            let worker = thread::Builder::new()
                .name(format!("render-worker-{}", worker_index))
                .spawn(move || loop {
                    let queued_job = {
                        let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
                        receiver.recv()
                    };
                    match queued_job {
                        Ok(queued_job) => context.run(queued_job),
                        Err(_) => break,
                    }
                })
                .map_err(|error| {
                    ContextError::with_error(
                        ErrorKind::Service,
                        format!("Unable to spawn the render worker {}", worker_index),
                        &error,
                    )
                })?;
            workers.push(worker);
        }
        log::info!("Started the render service with {} workers", worker_count);

        Ok(RenderService {
            sender: Some(sender),
            workers,
            board,
            registry,
            next_job_id: AtomicU64::new(1),
        })
    }

    /// Queues the job and returns its id, the job starts as `Pending`.
    pub fn submit(&self, job: RenderJob) -> Result<JobId, ContextError> {
        let sender = self.sender.as_ref().ok_or_else(|| {
            ContextError::with_context(ErrorKind::Service, "The render service has been shut down")
        })?;

        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        self.board.set(id, JobStatus::Pending);
        if sender.send(QueuedJob { id, job }).is_err() {
            self.board.set(
                id,
                JobStatus::Failed {
                    message: "No worker is left to run the job".to_string(),
                },
            );
            return Err(ContextError::with_context(
                ErrorKind::Service,
                "The render workers have stopped",
            ));
        }
        log::info!("Job {} queued", id);

        Ok(id)
    }

    pub fn status(&self, job_id: JobId) -> Option<JobStatus> {
        self.board.status(job_id)
    }

    pub fn wait(&self, job_id: JobId) -> Option<JobStatus> {
        self.board.wait(job_id)
    }

    pub fn registry(&self) -> &FontRegistry {
        &self.registry
    }

    /// Stops accepting jobs, lets the workers drain the queue and joins them.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("A render worker terminated abnormally");
            }
        }
        log::info!("The render service has shut down");
    }
}

impl Drop for RenderService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
