//! Background processing of a single job.
//!
//! A [`Worker`] runs the four stepping phases on its own thread and
//! publishes progress through a [`ProgressNotifier`]. Observable state lives
//! behind a re-entrant lock; a controller can hold it with [`Worker::lock`]
//! and call any accessor meanwhile. When reference points must be chosen by
//! hand, the thread parks its sequence and quality engine, emits
//! [`Notification::AwaitingReferencePoints`] and blocks until
//! [`Worker::notify_reference_points_set`] or an abort.

pub mod notify;
mod pipeline;
mod rendezvous;
pub mod state;
pub mod visualization;

use std::cell::RefCell;
use std::sync::Arc;
use std::thread::JoinHandle;

use image::RgbaImage;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, error, info};

use crate::error::{Result, SaturnError};
use crate::job::Job;

pub use notify::{ChannelNotifier, Notification, ProgressNotifier};
pub use state::{Phase, ResultCode, WorkerSnapshot};
pub use visualization::Interpolation;

use rendezvous::Rendezvous;
use state::{PhaseContext, WorkerState};

pub(crate) struct Shared {
    pub(crate) state: ReentrantMutex<RefCell<WorkerState>>,
    pub(crate) rendezvous: Rendezvous,
    pub(crate) notifier: Arc<dyn ProgressNotifier>,
}

/// A job handed back because processing could not start.
#[derive(Debug)]
pub struct StartRejected {
    pub job: Box<Job>,
    pub reason: SaturnError,
}

impl std::fmt::Display for StartRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot start {}: {}", self.job.source_path.display(), self.reason)
    }
}

impl std::error::Error for StartRejected {}

/// Holds the worker's state lock. The processing thread cannot change
/// anything until it is dropped; the worker's own accessors stay usable.
#[must_use]
pub struct StateLock<'a> {
    _guard: ReentrantMutexGuard<'a, RefCell<WorkerState>>,
}

pub struct Worker {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn new(notifier: Arc<dyn ProgressNotifier>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: ReentrantMutex::new(RefCell::new(WorkerState::default())),
                rendezvous: Rendezvous::default(),
                notifier,
            }),
            thread: Mutex::new(None),
        }
    }

    /// Freeze the worker's state across several accessor calls.
    pub fn lock(&self) -> StateLock<'_> {
        StateLock {
            _guard: self.shared.state.lock(),
        }
    }

    // Borrows never outlive these calls, so re-entry through the lock
    // cannot hit an outstanding borrow.
    fn read<R>(&self, f: impl FnOnce(&WorkerState) -> R) -> R {
        let guard = self.shared.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    fn write<R>(&self, f: impl FnOnce(&mut WorkerState) -> R) -> R {
        let guard = self.shared.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// Hand `job` to the worker and start processing it on a new thread.
    pub fn start_processing(&self, mut job: Job) -> std::result::Result<(), StartRejected> {
        let guard = self.shared.state.lock();
        if guard.borrow().running {
            return Err(StartRejected {
                job: Box::new(job),
                reason: SaturnError::WorkerBusy,
            });
        }
        let Some(sequence) = job.image_sequence.take() else {
            return Err(StartRejected {
                job: Box::new(job),
                reason: SaturnError::SequenceUnavailable,
            });
        };

        // The previous thread cleared `running` and no longer needs the lock.
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!("Previous worker thread panicked");
            }
        }

        job.reset_results();
        self.shared.rendezvous.disarm();

        // The new thread blocks on the lock until the state below is set.
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("saturn-worker".into())
            .spawn(move || pipeline::run(shared, sequence));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Could not spawn worker thread");
                return Err(StartRejected {
                    job: Box::new(job),
                    reason: SaturnError::Io(e),
                });
            }
        };

        info!(source = %job.source_path.display(), "Starting job");
        {
            let mut state = guard.borrow_mut();
            *state = WorkerState {
                running: true,
                visualization_enabled: state.visualization_enabled,
                zoom_factor: state.zoom_factor,
                interpolation: state.interpolation,
                job: Some(job),
                ..WorkerState::default()
            };
        }
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Stop the current job and wait for the thread to exit. Results
    /// computed so far stay in the job.
    pub fn abort_processing(&self) {
        let was_running = self.write(|state| {
            if state.running {
                state.abort_requested = true;
            }
            state.running
        });
        if was_running {
            debug!("Abort requested");
            self.shared.rendezvous.release();
        }
        self.wait_until_finished();
    }

    /// Block until the processing thread (if any) has exited.
    pub fn wait_until_finished(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Worker thread panicked");
                self.write(|state| {
                    state.running = false;
                    state.phase = Phase::Idle;
                });
            }
        }
    }

    /// Progress fields read under one lock.
    pub fn snapshot(&self) -> WorkerSnapshot {
        self.read(|s| WorkerSnapshot {
            phase: s.phase,
            step: s.step,
            last_result: s.last_result.clone(),
            running: s.running,
            waiting_for_reference_points: s.waiting_for_ref_points,
            visualization: s.visualization.clone(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.read(|s| s.phase)
    }

    pub fn step(&self) -> usize {
        self.read(|s| s.step)
    }

    pub fn last_result(&self) -> ResultCode {
        self.read(|s| s.last_result.clone())
    }

    pub fn is_running(&self) -> bool {
        self.read(|s| s.running)
    }

    pub fn is_waiting_for_reference_points(&self) -> bool {
        self.read(|s| s.waiting_for_ref_points)
    }

    /// Most recent visualization frame, if enabled.
    pub fn visualization_image(&self) -> Option<Arc<RgbaImage>> {
        self.read(|s| s.visualization.clone())
    }

    pub fn is_visualization_enabled(&self) -> bool {
        self.read(|s| s.visualization_enabled)
    }

    pub fn set_visualization_enabled(&self, enabled: bool) {
        self.write(|s| {
            s.visualization_enabled = enabled;
            if !enabled {
                s.visualization = None;
            }
        });
    }

    pub fn zoom_factor(&self) -> f64 {
        self.read(|s| s.zoom_factor)
    }

    /// Takes effect from the next step.
    pub fn set_zoom_factor(&self, zoom: f64) {
        self.write(|s| s.zoom_factor = visualization::clamp_zoom(zoom));
    }

    pub fn interpolation(&self) -> Interpolation {
        self.read(|s| s.interpolation)
    }

    pub fn set_interpolation(&self, interpolation: Interpolation) {
        self.write(|s| s.interpolation = interpolation);
    }

    /// The best-quality frame cropped to the alignment intersection, for
    /// choosing reference points. Only available while waiting for them.
    pub fn best_quality_aligned_image(&self) -> Result<RgbaImage> {
        self.write(|state| match &mut state.context {
            PhaseContext::AwaitingReferencePoints { sequence, quality } => {
                let best = quality.best_frame_index();
                Ok(quality.aligned_image(sequence, best)?.to_rgba())
            }
            PhaseContext::Empty => Err(SaturnError::SequenceUnavailable),
        })
    }

    /// Resume a thread waiting for reference points. Set them beforehand
    /// with [`Worker::with_job`]; leaving them empty selects automatic
    /// placement. Returns `false` if nothing was waiting.
    pub fn notify_reference_points_set(&self) -> bool {
        self.shared.rendezvous.release()
    }

    /// Run `f` on the job held by the worker, running or not. The state
    /// lock is held throughout; the job is detached from the state while
    /// `f` runs, so `f` may call back into the worker (a nested
    /// `with_job` sees no job).
    pub fn with_job<R>(&self, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let guard = self.shared.state.lock();
        let mut job = guard.borrow_mut().job.take()?;
        let result = f(&mut job);
        guard.borrow_mut().job = Some(job);
        Some(result)
    }

    /// Take the finished job back. `None` while processing.
    pub fn take_job(&self) -> Option<Job> {
        self.write(|state| if state.running { None } else { state.job.take() })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.abort_processing();
    }
}
