//! Background computation host.
//!
//! Reductions run on one dedicated worker thread. The caller talks to it only
//! through two channels: [`Request`]s go in, [`HostEvent`]s (progress, then
//! exactly one `done` per executed request) come out. Nothing else is shared.
//!
//! The caller never blocks on the worker: [`ComputationHost::try_recv`] and
//! [`ComputationHost::drain`] poll. Cancellation is [`ComputationHost::restart`],
//! which abandons the current worker and starts a fresh one.

use crate::config::ReduceConfig;
use crate::error::HostError;
use crate::reduce::{self, Embedding, Progress, ProgressSink};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const WORKER_THREAD_NAME: &str = "pixcloud-compute";

/// Identifies one submission; strictly increasing per host.
pub type RequestId = u64;

/// One full recompute: feature vectors plus projector options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub vectors: Vec<Vec<f64>>,
    pub config: ReduceConfig,
}

/// Messages produced for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    Progress {
        iteration: usize,
        #[serde(rename = "totalIterations")]
        total_iterations: usize,
    },
    /// Final message. `embeddings` is index-aligned with the request vectors.
    Done {
        embeddings: Embedding,
        iterations: usize,
        fallback: bool,
    },
}

impl From<Progress> for Response {
    fn from(p: Progress) -> Self {
        Response::Progress {
            iteration: p.iteration,
            total_iterations: p.total_iterations,
        }
    }
}

/// A response tagged with the request it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEvent {
    pub request: RequestId,
    pub response: Response,
}

impl HostEvent {
    pub fn is_done(&self) -> bool {
        matches!(self.response, Response::Done { .. })
    }
}

struct Job {
    id: RequestId,
    request: Request,
}

/// Handle to the worker thread.
pub struct ComputationHost {
    jobs: Sender<Job>,
    events: Receiver<HostEvent>,
    worker: Option<JoinHandle<()>>,
    next_id: RequestId,
}

impl ComputationHost {
    /// Start a worker thread.
    pub fn spawn() -> Result<Self, HostError> {
        let (jobs, events, worker) = start_worker()?;
        Ok(Self {
            jobs,
            events,
            worker: Some(worker),
            next_id: 1,
        })
    }

    /// Queue a request. If several requests are queued when the worker
    /// becomes free, only the newest runs.
    pub fn submit(&mut self, request: Request) -> Result<RequestId, HostError> {
        let id = self.next_id;
        self.next_id += 1;
        debug!(
            request = id,
            points = request.vectors.len(),
            algorithm = request.config.name(),
            "submitting reduction"
        );
        self.jobs
            .send(Job { id, request })
            .map_err(|_| HostError::Disconnected)?;
        Ok(id)
    }

    /// Next pending event, if any. Never blocks.
    pub fn try_recv(&self) -> Result<Option<HostEvent>, HostError> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(HostError::Disconnected),
        }
    }

    /// All pending events. Never blocks.
    pub fn drain(&self) -> Vec<HostEvent> {
        self.events.try_iter().collect()
    }

    /// Block until the next event. For batch tools and tests.
    pub fn recv(&self) -> Result<HostEvent, HostError> {
        self.events.recv().map_err(|_| HostError::Disconnected)
    }

    /// Block for at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<HostEvent>, HostError> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(HostError::Disconnected),
        }
    }

    /// Abandon the current worker and start a new one.
    ///
    /// The old thread is detached: it finishes whatever it is computing and
    /// exits, and nothing it produces is ever observed. Request ids keep
    /// increasing across restarts.
    pub fn restart(&mut self) -> Result<(), HostError> {
        let (jobs, events, worker) = start_worker()?;
        self.jobs = jobs;
        self.events = events;
        self.worker = Some(worker);
        info!("computation worker restarted");
        Ok(())
    }

    /// Whether the worker thread is still running.
    pub fn is_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

fn start_worker() -> Result<(Sender<Job>, Receiver<HostEvent>, JoinHandle<()>), HostError> {
    let (job_tx, job_rx) = unbounded::<Job>();
    let (event_tx, event_rx) = unbounded::<HostEvent>();
    let worker = thread::Builder::new()
        .name(WORKER_THREAD_NAME.into())
        .spawn(move || worker_loop(job_rx, event_tx))?;
    Ok((job_tx, event_rx, worker))
}

fn worker_loop(jobs: Receiver<Job>, events: Sender<HostEvent>) {
    while let Ok(mut job) = jobs.recv() {
        for newer in jobs.try_iter() {
            debug!(skipped = job.id, newer = newer.id, "dropping superseded request");
            job = newer;
        }
        if run_job(job, &events).is_err() {
            break;
        }
    }
    debug!("computation worker exiting");
}

/// Forwards progress as events; a closed channel is ignored.
struct ChannelSink<'a> {
    request: RequestId,
    events: &'a Sender<HostEvent>,
}

impl ProgressSink for ChannelSink<'_> {
    fn report(&mut self, progress: Progress) {
        let _ = self.events.send(HostEvent {
            request: self.request,
            response: progress.into(),
        });
    }
}

struct Disconnected;

fn run_job(job: Job, events: &Sender<HostEvent>) -> Result<(), Disconnected> {
    let Job { id, request } = job;
    let (config, problem) = request.config.sanitized();
    if let Some(err) = problem {
        warn!(request = id, error = %err, "invalid reduction config, using defaults");
    }

    let start = Instant::now();
    let mut sink = ChannelSink {
        request: id,
        events,
    };
    let result = reduce::reduce(&config, &request.vectors, &mut sink);

    info!(
        request = id,
        algorithm = config.name(),
        points = request.vectors.len(),
        iterations = result.iterations,
        fallback = result.fallback,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "reduction complete"
    );

    events
        .send(HostEvent {
            request: id,
            response: Response::Done {
                embeddings: result.embedding,
                iterations: result.iterations,
                fallback: result.fallback,
            },
        })
        .map_err(|_| Disconnected)
}
