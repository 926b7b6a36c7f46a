//! Stroke job scheduling.
//!
//! Paint devices are not internally synchronized. The scheduler is what
//! makes concurrent painting safe: every [`Job`] declares its stroke, its
//! kind, an ordering class and the device regions it reads or writes, and
//! the scheduler never runs two conflicting jobs at the same time.
//!
//! Two jobs conflict, and keep their submission order, when
//!
//! - either is [`JobOrdering::Exclusive`],
//! - either is a [`JobOrdering::Barrier`] and both touch a common device,
//! - they belong to one stroke and one of them is `Sequential`, the earlier
//!   is `Init` or the later is `Finish`,
//! - they access overlapping regions of one device and at least one writes.
//!
//! Submitted jobs form a dependency graph in submission order. [`run`]
//! executes it in waves on a Rayon pool: a wave holds jobs whose
//! dependencies all ran in earlier waves, so jobs within a wave never
//! conflict.
//!
//! A failing job aborts the rest of its stroke; other strokes go on.
//! Cancelling a stroke flips the token handed to its jobs and drops its
//! jobs that have not started.
//!
//! [`run`]: StrokeScheduler::run
//!
//! # Example
//!
//! ```rust
//! use tilepaint_core::{ColorSpaceRegistry, Rect};
//! use tilepaint_ops::scheduler::{Job, JobKind, SharedDevice, StrokeScheduler};
//! use tilepaint_store::PaintDevice;
//!
//! let rgba = ColorSpaceRegistry::with_builtins().get("rgba-u8").unwrap();
//! let layer = SharedDevice::new(PaintDevice::new(rgba));
//!
//! let mut sched = StrokeScheduler::new(2).unwrap();
//! let stroke = sched.begin_stroke();
//! for i in 0..4 {
//!     let dev = layer.clone();
//!     let rect = Rect::new(i * 64, 0, 64, 64);
//!     let job = Job::new(stroke, JobKind::DoStroke, "dab", move |_| {
//!         dev.write().fill(rect, &[255, 0, 0, 255])?;
//!         Ok(())
//!     })
//!     .writes(layer.id(), rect);
//!     sched.submit(job).unwrap();
//! }
//! let report = sched.run();
//! assert_eq!(report.completed, 4);
//! assert_eq!(report.waves, 1);
//! assert_eq!(layer.read().pixel(255, 63), &[255, 0, 0, 255]);
//! ```

use crate::error::{OpsError, OpsResult};
use crate::painter::Painter;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tilepaint_core::Rect;
use tilepaint_store::{CancellationToken, DeviceId, PaintDevice};
use tracing::{debug, warn};

/// Identity of one stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrokeId(u64);

impl StrokeId {
    /// Raw value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StrokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stroke#{}", self.0)
    }
}

/// Phase of a stroke a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Set-up; runs before every other job of the stroke.
    Init,
    /// Painting work.
    DoStroke,
    /// Tear-down; runs after every other job of the stroke.
    Finish,
}

/// Ordering class of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobOrdering {
    /// Ordered only by data conflicts and stroke phases.
    #[default]
    Concurrent,
    /// Ordered against every other job of its stroke.
    Sequential,
    /// Drains every job on its devices before running; later jobs on those
    /// devices wait for it.
    Barrier,
    /// Runs alone.
    Exclusive,
}

/// How a job touches a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Reads only.
    Read,
    /// Writes (and may read).
    Write,
}

/// A declared device access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAccess {
    /// Device touched.
    pub device: DeviceId,
    /// Read or write.
    pub mode: AccessMode,
    /// Canvas region touched.
    pub region: Rect,
}

impl DeviceAccess {
    fn conflicts(&self, other: &DeviceAccess) -> bool {
        self.device == other.device
            && (self.mode == AccessMode::Write || other.mode == AccessMode::Write)
            && self.region.overlaps(&other.region)
    }
}

/// What a running job can see of its stroke.
#[derive(Debug)]
pub struct JobContext {
    stroke: StrokeId,
    token: CancellationToken,
    check_rows: u32,
}

impl JobContext {
    /// Stroke the job belongs to.
    pub fn stroke(&self) -> StrokeId {
        self.stroke
    }

    /// Cancellation token of the stroke, for bulk operations.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the stroke was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Rows between cancellation polls in bulk operations.
    pub fn check_rows(&self) -> u32 {
        self.check_rows
    }

    /// Painter on `dst` that stops when the stroke is cancelled.
    pub fn painter<'a>(&'a self, dst: &'a mut PaintDevice) -> Painter<'a> {
        Painter::new(dst).cancel_with(&self.token, self.check_rows)
    }
}

type Work = Box<dyn FnOnce(&JobContext) -> OpsResult<()> + Send>;

/// A unit of scheduled work.
pub struct Job {
    stroke: StrokeId,
    kind: JobKind,
    ordering: JobOrdering,
    name: String,
    accesses: Vec<DeviceAccess>,
    work: Work,
}

impl Job {
    /// Concurrent job with no declared accesses.
    pub fn new<F>(stroke: StrokeId, kind: JobKind, name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(&JobContext) -> OpsResult<()> + Send + 'static,
    {
        Self {
            stroke,
            kind,
            ordering: JobOrdering::Concurrent,
            name: name.into(),
            accesses: Vec::new(),
            work: Box::new(work),
        }
    }

    /// Sets the ordering class.
    pub fn ordering(mut self, ordering: JobOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Declares a read of `region` on `device`.
    pub fn reads(mut self, device: DeviceId, region: Rect) -> Self {
        self.accesses.push(DeviceAccess {
            device,
            mode: AccessMode::Read,
            region,
        });
        self
    }

    /// Declares a write of `region` on `device`.
    pub fn writes(mut self, device: DeviceId, region: Rect) -> Self {
        self.accesses.push(DeviceAccess {
            device,
            mode: AccessMode::Write,
            region,
        });
        self
    }

    /// Stroke the job belongs to.
    pub fn stroke(&self) -> StrokeId {
        self.stroke
    }

    /// Phase.
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Ordering class.
    pub fn ordering_class(&self) -> JobOrdering {
        self.ordering
    }

    /// Label used in logs and reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared accesses.
    pub fn accesses(&self) -> &[DeviceAccess] {
        &self.accesses
    }

    fn shares_device(&self, other: &Job) -> bool {
        // A barrier declaring no device fences everything.
        self.accesses.is_empty()
            || other.accesses.is_empty()
            || self
                .accesses
                .iter()
                .any(|a| other.accesses.iter().any(|b| a.device == b.device))
    }

    /// Whether this job must run after `earlier`.
    fn must_follow(&self, earlier: &Job) -> bool {
        use JobOrdering::*;
        if self.ordering == Exclusive || earlier.ordering == Exclusive {
            return true;
        }
        if (self.ordering == Barrier || earlier.ordering == Barrier) && self.shares_device(earlier) {
            return true;
        }
        if self.stroke == earlier.stroke
            && (self.ordering == Sequential
                || earlier.ordering == Sequential
                || earlier.kind == JobKind::Init
                || self.kind == JobKind::Finish)
        {
            return true;
        }
        self.accesses
            .iter()
            .any(|a| earlier.accesses.iter().any(|b| a.conflicts(b)))
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("stroke", &self.stroke)
            .field("kind", &self.kind)
            .field("ordering", &self.ordering)
            .field("name", &self.name)
            .field("accesses", &self.accesses)
            .finish()
    }
}

/// A device shared between jobs.
///
/// The lock only keeps access memory-safe; the schedule decides who runs
/// when. Poisoned locks are recovered.
#[derive(Debug, Clone)]
pub struct SharedDevice {
    id: DeviceId,
    inner: Arc<RwLock<PaintDevice>>,
}

impl SharedDevice {
    /// Wraps a device.
    pub fn new(device: PaintDevice) -> Self {
        Self {
            id: device.id(),
            inner: Arc::new(RwLock::new(device)),
        }
    }

    /// Id of the wrapped device.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Shared access.
    pub fn read(&self) -> RwLockReadGuard<'_, PaintDevice> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access.
    pub fn write(&self) -> RwLockWriteGuard<'_, PaintDevice> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// State of a stroke as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrokeStatus {
    /// Running or waiting for jobs.
    Active,
    /// Cancelled by the caller.
    Cancelled,
    /// A job failed; the message names it.
    Aborted(String),
    /// Never begun, or already ended.
    Unknown,
}

#[derive(Debug)]
struct StrokeState {
    token: CancellationToken,
    failure: Option<String>,
}

/// A job that failed during [`StrokeScheduler::run`].
#[derive(Debug)]
pub struct JobFailure {
    /// Stroke of the failed job.
    pub stroke: StrokeId,
    /// Name of the failed job.
    pub job: String,
    /// What went wrong.
    pub error: OpsError,
}

/// Outcome of one [`StrokeScheduler::run`].
#[derive(Debug, Default)]
pub struct RunReport {
    /// Waves executed.
    pub waves: usize,
    /// Jobs that ran successfully.
    pub completed: usize,
    /// Jobs dropped because their stroke was cancelled or aborted.
    pub skipped: usize,
    /// Jobs that failed.
    pub failures: Vec<JobFailure>,
}

impl RunReport {
    /// Whether every job ran and succeeded.
    pub fn is_clean(&self) -> bool {
        self.skipped == 0 && self.failures.is_empty()
    }

    /// The first failure as a [`OpsError::StrokeAborted`] error.
    pub fn into_result(mut self) -> OpsResult<Self> {
        if self.failures.is_empty() {
            return Ok(self);
        }
        let first = self.failures.remove(0);
        Err(OpsError::StrokeAborted {
            stroke: first.stroke.get(),
            reason: format!("{}: {}", first.job, first.error),
        })
    }
}

/// Dependency-ordered job runner over a private Rayon pool.
pub struct StrokeScheduler {
    pool: rayon::ThreadPool,
    strokes: HashMap<StrokeId, StrokeState>,
    queue: Vec<Job>,
    next_stroke: u64,
    check_rows: u32,
}

impl StrokeScheduler {
    /// Scheduler with `threads` workers (0 = Rayon default).
    pub fn new(threads: usize) -> OpsResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tilepaint-worker-{i}"))
            .build()
            .map_err(|e| OpsError::config(format!("cannot build worker pool: {e}")))?;
        Ok(Self {
            pool,
            strokes: HashMap::new(),
            queue: Vec::new(),
            next_stroke: 1,
            check_rows: 1,
        })
    }

    /// Rows between cancellation polls for jobs' bulk operations.
    pub fn with_check_rows(mut self, rows: u32) -> Self {
        self.check_rows = rows.max(1);
        self
    }

    /// Worker count.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Opens a stroke.
    pub fn begin_stroke(&mut self) -> StrokeId {
        let id = StrokeId(self.next_stroke);
        self.next_stroke += 1;
        self.strokes.insert(
            id,
            StrokeState {
                token: CancellationToken::new(),
                failure: None,
            },
        );
        debug!(%id, "stroke begun");
        id
    }

    /// Cancels a stroke. Returns `false` for unknown strokes.
    pub fn cancel_stroke(&self, id: StrokeId) -> bool {
        match self.strokes.get(&id) {
            Some(state) => {
                state.token.cancel();
                debug!(%id, "stroke cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancellation token of a stroke.
    pub fn stroke_token(&self, id: StrokeId) -> Option<CancellationToken> {
        self.strokes.get(&id).map(|s| s.token.clone())
    }

    /// Current state of a stroke.
    pub fn status(&self, id: StrokeId) -> StrokeStatus {
        match self.strokes.get(&id) {
            None => StrokeStatus::Unknown,
            Some(StrokeState { failure: Some(why), .. }) => StrokeStatus::Aborted(why.clone()),
            Some(s) if s.token.is_cancelled() => StrokeStatus::Cancelled,
            Some(_) => StrokeStatus::Active,
        }
    }

    /// Forgets a stroke, returning its final state. Queued jobs of the
    /// stroke are dropped.
    pub fn end_stroke(&mut self, id: StrokeId) -> StrokeStatus {
        let status = self.status(id);
        self.queue.retain(|j| j.stroke != id);
        self.strokes.remove(&id);
        status
    }

    /// Queues a job of an open stroke.
    pub fn submit(&mut self, job: Job) -> OpsResult<()> {
        if !self.strokes.contains_key(&job.stroke) {
            return Err(OpsError::config(format!("job '{}' names unknown {}", job.name, job.stroke)));
        }
        self.queue.push(job);
        Ok(())
    }

    /// Jobs waiting for [`run`](Self::run).
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn runnable(&self, stroke: StrokeId) -> Option<CancellationToken> {
        self.strokes
            .get(&stroke)
            .filter(|s| s.failure.is_none() && !s.token.is_cancelled())
            .map(|s| s.token.clone())
    }

    /// Runs every queued job, wave by wave, and reports the outcome.
    pub fn run(&mut self) -> RunReport {
        let jobs = std::mem::take(&mut self.queue);
        let mut level = vec![0usize; jobs.len()];
        for j in 0..jobs.len() {
            for i in 0..j {
                if jobs[j].must_follow(&jobs[i]) {
                    level[j] = level[j].max(level[i] + 1);
                }
            }
        }
        let depth = level.iter().max().map_or(0, |m| m + 1);
        let mut waves: Vec<Vec<Job>> = (0..depth).map(|_| Vec::new()).collect();
        for (job, l) in jobs.into_iter().zip(level) {
            waves[l].push(job);
        }

        let mut report = RunReport::default();
        for (w, wave) in waves.into_iter().enumerate() {
            let mut batch = Vec::with_capacity(wave.len());
            for job in wave {
                match self.runnable(job.stroke) {
                    Some(token) => batch.push((job, token)),
                    None => report.skipped += 1,
                }
            }
            if batch.is_empty() {
                continue;
            }
            let size = batch.len();
            let check_rows = self.check_rows;
            let results: Vec<(StrokeId, String, OpsResult<()>)> = self.pool.install(|| {
                batch
                    .into_par_iter()
                    .map(|(job, token)| {
                        let ctx = JobContext {
                            stroke: job.stroke,
                            token,
                            check_rows,
                        };
                        let outcome = (job.work)(&ctx);
                        (job.stroke, job.name, outcome)
                    })
                    .collect()
            });
            report.waves += 1;
            for (stroke, name, outcome) in results {
                match outcome {
                    Ok(()) => report.completed += 1,
                    Err(error) => {
                        warn!(%stroke, job = %name, %error, "job failed, aborting stroke");
                        if let Some(state) = self.strokes.get_mut(&stroke) {
                            state.failure.get_or_insert_with(|| format!("{name}: {error}"));
                        }
                        report.failures.push(JobFailure {
                            stroke,
                            job: name,
                            error,
                        });
                    }
                }
            }
            debug!(wave = w, jobs = size, "wave finished");
        }
        report
    }
}

impl fmt::Debug for StrokeScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrokeScheduler")
            .field("threads", &self.threads())
            .field("strokes", &self.strokes.len())
            .field("pending", &self.queue.len())
            .field("check_rows", &self.check_rows)
            .finish()
    }
}
