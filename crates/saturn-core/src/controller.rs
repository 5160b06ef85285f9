//! Job queue driving a [`Worker`].
//!
//! The controller owns the worker and the receiving end of its notification
//! channel. Jobs are processed one at a time in queue order; dialogs and
//! progress display are delegated to an [`Interaction`] implementation.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::align::suggest_anchor_pos;
use crate::consts::DEFAULT_PLACEMENT_BRIGHTNESS_THRESHOLD;
use crate::error::{Result, SaturnError};
use crate::frame::Point;
use crate::io::output::{auto_save_stack, export_quality_data, quality_data_path};
use crate::job::{AlignmentMethod, Job, QualityData};
use crate::worker::{ChannelNotifier, Notification, Phase, ResultCode, Worker};

pub type JobId = u64;

/// Processing status of a queued job.
#[derive(Clone, Debug, PartialEq)]
pub enum JobState {
    Waiting,
    Processing { phase: Phase, step: usize },
    Processed,
    Error(String),
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Processing { phase, step } => write!(f, "{phase}: step {step}"),
            Self::Processed => write!(f, "Processed"),
            Self::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

pub struct JobEntry {
    /// `None` while the worker holds the job.
    job: Option<Job>,
    state: JobState,
}

impl JobEntry {
    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }
}

/// User-facing side of the controller: point selection dialogs and
/// progress observers. Selections return `None` when cancelled.
pub trait Interaction {
    /// Choose alignment anchors on the first active frame.
    fn select_anchors(&mut self, id: JobId, first_frame: &RgbaImage) -> Option<Vec<Point>>;

    /// Choose reference points on the best frame, in intersection
    /// coordinates. `None` or an empty list selects automatic placement.
    fn select_reference_points(&mut self, id: JobId, best_frame: &RgbaImage) -> Option<Vec<Point>>;

    fn job_state_changed(&mut self, _id: JobId, _state: &JobState) {}

    fn quality_data_ready(&mut self, _id: JobId, _quality: &QualityData) {}

    fn visualization_updated(&mut self, _id: JobId, _image: &RgbaImage) {}

    fn stack_saved(&mut self, _id: JobId, _path: &Path) {}
}

pub struct Controller<I: Interaction> {
    worker: Worker,
    notifications: Receiver<Notification>,
    interaction: I,
    jobs: BTreeMap<JobId, JobEntry>,
    next_id: JobId,
    queue: VecDeque<JobId>,
    running: Option<JobId>,
}

impl<I: Interaction> Controller<I> {
    pub fn new(interaction: I) -> Self {
        let (notifier, notifications) = ChannelNotifier::channel();
        Self {
            worker: Worker::new(Arc::new(notifier)),
            notifications,
            interaction,
            jobs: BTreeMap::new(),
            next_id: 1,
            queue: VecDeque::new(),
            running: None,
        }
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn interaction(&self) -> &I {
        &self.interaction
    }

    pub fn interaction_mut(&mut self) -> &mut I {
        &mut self.interaction
    }

    pub fn add_job(&mut self, job: Job) -> JobId {
        let id = self.next_id;
        self.next_id += 1;
        debug!(id, source = %job.source_path.display(), "Job added");
        self.jobs.insert(
            id,
            JobEntry {
                job: Some(job),
                state: JobState::Waiting,
            },
        );
        id
    }

    pub fn job(&self, id: JobId) -> Option<&JobEntry> {
        self.jobs.get(&id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = (JobId, &JobEntry)> {
        self.jobs.iter().map(|(&id, entry)| (id, entry))
    }

    pub fn running_job(&self) -> Option<JobId> {
        self.running
    }

    pub fn is_idle(&self) -> bool {
        self.running.is_none()
    }

    /// Replace the queue with `ids` and start the first job that can be
    /// started, unless one is already running.
    pub fn start_processing(&mut self, ids: &[JobId]) {
        self.queue = ids
            .iter()
            .copied()
            .filter(|id| self.jobs.contains_key(id) && Some(*id) != self.running)
            .collect();
        if self.running.is_none() {
            self.start_next();
        }
    }

    fn start_next(&mut self) {
        while let Some(id) = self.queue.pop_front() {
            if self.try_start(id) {
                return;
            }
        }
        info!("Job queue drained");
    }

    fn try_start(&mut self, id: JobId) -> bool {
        let Some(mut job) = self.jobs.get_mut(&id).and_then(|entry| entry.job.take()) else {
            return false;
        };

        if let Some(sequence) = job.image_sequence.as_mut() {
            if let Some(pattern) = job.settings.cfa_pattern {
                sequence.reinterpret_as_cfa(Some(pattern));
            }
            if let Err(e) = sequence.set_excluded_images(&job.settings.excluded_frames) {
                warn!(id, error = %e, "Invalid frame selection");
                self.restore(id, job, JobState::Error(e.to_string()));
                return false;
            }
            debug!(
                id,
                active = sequence.active_image_count(),
                total = sequence.len(),
                "Frame selection applied"
            );
        }

        if job.settings.alignment_method == AlignmentMethod::Anchors && job.anchors.is_empty() {
            match self.place_anchors(id, &mut job) {
                Ok(true) => {}
                Ok(false) => {
                    info!(id, "Anchor selection cancelled, skipping job");
                    self.restore(id, job, JobState::Waiting);
                    return false;
                }
                Err(e) => {
                    warn!(id, error = %e, "Could not place anchors");
                    self.restore(id, job, JobState::Error(e.to_string()));
                    return false;
                }
            }
        }

        match self.worker.start_processing(job) {
            Ok(()) => {
                self.running = Some(id);
                self.set_state(
                    id,
                    JobState::Processing {
                        phase: Phase::Idle,
                        step: 0,
                    },
                );
                true
            }
            Err(rejected) => {
                warn!(id, reason = %rejected.reason, "Job rejected by worker");
                let state = JobState::Error(rejected.reason.to_string());
                self.restore(id, *rejected.job, state);
                false
            }
        }
    }

    /// Returns `Ok(false)` if the user cancelled manual selection.
    fn place_anchors(&mut self, id: JobId, job: &mut Job) -> Result<bool> {
        let sequence = job
            .image_sequence
            .as_mut()
            .ok_or(SaturnError::SequenceUnavailable)?;
        sequence.seek_start();
        let first = sequence.current_image()?;

        if job.settings.automatic_anchor_placement {
            let anchor = suggest_anchor_pos(
                &first.luminance().data,
                DEFAULT_PLACEMENT_BRIGHTNESS_THRESHOLD,
                job.settings.anchor_block_size,
            )
            .ok_or_else(|| {
                SaturnError::InvalidParameters("frames too small for an alignment anchor".into())
            })?;
            debug!(id, x = anchor.x, y = anchor.y, "Anchor placed automatically");
            job.anchors = vec![anchor];
            return Ok(true);
        }

        match self.interaction.select_anchors(id, &first.to_rgba()) {
            Some(points) if !points.is_empty() => {
                job.anchors = points;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn restore(&mut self, id: JobId, job: Job, state: JobState) {
        if let Some(entry) = self.jobs.get_mut(&id) {
            entry.job = Some(job);
        }
        self.set_state(id, state);
    }

    fn set_state(&mut self, id: JobId, state: JobState) {
        let Some(entry) = self.jobs.get_mut(&id) else {
            return;
        };
        if !matches!(state, JobState::Processing { .. }) {
            info!(id, state = %state, "Job state changed");
        }
        entry.state = state;
        self.interaction.job_state_changed(id, &entry.state);
    }

    /// React to one worker notification. Values are re-read from the
    /// worker; the notification only says that something changed.
    pub fn handle_notification(&mut self, notification: Notification) {
        let Some(id) = self.running else {
            debug!(?notification, "Ignoring notification, no job running");
            return;
        };

        match notification {
            Notification::PhaseStarted { .. } | Notification::Step { .. } => {
                let snapshot = self.worker.snapshot();
                if snapshot.phase != Phase::Idle {
                    self.set_state(
                        id,
                        JobState::Processing {
                            phase: snapshot.phase,
                            step: snapshot.step,
                        },
                    );
                }
                if let Some(image) = snapshot.visualization {
                    self.interaction.visualization_updated(id, &image);
                }
            }
            Notification::QualityDataReady => {
                let quality = self
                    .worker
                    .with_job(|job| {
                        std::mem::take(&mut job.quality_data_ready_notification)
                            .then(|| job.quality.clone())
                    })
                    .flatten();
                if let Some(quality) = quality {
                    self.interaction.quality_data_ready(id, &quality);
                }
            }
            Notification::AwaitingReferencePoints => self.supply_reference_points(id),
            Notification::Finished { .. } => self.finish_running(id),
        }
    }

    fn supply_reference_points(&mut self, id: JobId) {
        if !self.worker.is_waiting_for_reference_points() {
            debug!(id, "Stale reference point request");
            return;
        }
        let points = match self.worker.best_quality_aligned_image() {
            Ok(image) => self.interaction.select_reference_points(id, &image),
            Err(e) => {
                warn!(id, error = %e, "Best frame unavailable, placing points automatically");
                None
            }
        }
        .unwrap_or_default();
        debug!(id, count = points.len(), "Reference points supplied");
        self.worker.with_job(|job| job.ref_points = points);
        self.worker.notify_reference_points_set();
    }

    fn finish_running(&mut self, id: JobId) {
        self.worker.wait_until_finished();
        self.running = None;
        let result = self.worker.last_result();

        let state = match self.worker.take_job() {
            Some(mut job) => {
                if let Some(sequence) = job.image_sequence.as_mut() {
                    sequence.deactivate();
                }
                let state = match &result {
                    ResultCode::Failed { message, .. } => JobState::Error(message.clone()),
                    ResultCode::Aborted => JobState::Waiting,
                    ResultCode::Success | ResultCode::LastStep => match self.save_results(id, &job) {
                        Ok(()) => JobState::Processed,
                        Err(e) => JobState::Error(format!("saving failed: {e}")),
                    },
                };
                if let Some(entry) = self.jobs.get_mut(&id) {
                    entry.job = Some(job);
                }
                state
            }
            None => JobState::Error("job lost by the worker".into()),
        };
        self.set_state(id, state);
        self.start_next();
    }

    fn save_results(&mut self, id: JobId, job: &Job) -> Result<()> {
        let (Some(stack), Some(sequence)) = (&job.stacked_img, &job.image_sequence) else {
            return Ok(());
        };
        let settings = &job.settings;
        let Some(path) = auto_save_stack(
            stack,
            &settings.output_save_mode,
            &job.source_path,
            sequence.kind(),
            settings.output_fmt,
        )?
        else {
            return Ok(());
        };
        if settings.export_quality_data {
            let csv = quality_data_path(&path);
            export_quality_data(
                &csv,
                &job.quality.frames_chrono,
                sequence.active_flags(),
                settings.export_inactive_frames_quality,
            )?;
            debug!(id, path = %csv.display(), "Quality data exported");
        }
        self.interaction.stack_saved(id, &path);
        Ok(())
    }

    /// Drop notifications left by a thread that has already exited.
    fn drain_notifications(&self) {
        while self.notifications.try_recv().is_ok() {}
    }

    /// Abort the running job (it returns to "Waiting") and clear the queue.
    pub fn stop_processing(&mut self) {
        self.queue.clear();
        self.abort_running();
    }

    fn abort_running(&mut self) -> Option<JobId> {
        let id = self.running.take()?;
        self.worker.abort_processing();
        self.drain_notifications();
        let mut job = self.worker.take_job();
        if let Some(sequence) = job.as_mut().and_then(|j| j.image_sequence.as_mut()) {
            sequence.deactivate();
        }
        if let Some(entry) = self.jobs.get_mut(&id) {
            entry.job = job;
        }
        self.set_state(id, JobState::Waiting);
        Some(id)
    }

    /// Remove a job, aborting it first if it is running. The queue then
    /// continues with the next job.
    pub fn remove_job(&mut self, id: JobId) -> Option<Job> {
        self.queue.retain(|&queued| queued != id);
        let was_running = self.running == Some(id);
        if was_running {
            self.abort_running();
        }
        let job = self.jobs.remove(&id).and_then(|entry| entry.job);
        if was_running {
            self.start_next();
        }
        job
    }

    /// Dispatch notifications already received, without blocking.
    pub fn process_pending(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            self.handle_notification(notification);
        }
    }

    /// Block, dispatching notifications, until no job is running.
    pub fn run_until_idle(&mut self) {
        while self.running.is_some() {
            match self.notifications.recv() {
                Ok(notification) => self.handle_notification(notification),
                Err(_) => break,
            }
        }
    }
}
