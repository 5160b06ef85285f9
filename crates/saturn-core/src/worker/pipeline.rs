use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, error, info, warn};

use crate::engine::{ImageAlignment, QualityEstimation, RefPointAlignment, Stacking, Step};
use crate::error::{Result, SaturnError};
use crate::job::{Job, JobSettings, QualityData};
use crate::sequence::ImageSequence;
use crate::stack::FlatField;

use super::notify::Notification;
use super::state::{Phase, PhaseContext, ResultCode, WorkerState};
use super::visualization::{
    render_alignment, render_quality, render_ref_points, render_stacking, scale,
};
use super::Shared;

/// A stepping engine driven by the processing thread.
trait PhaseEngine {
    const PHASE: Phase;

    fn step(&mut self, sequence: &mut ImageSequence) -> Result<Step>;

    fn render(&self) -> Option<RgbaImage>;
}

impl PhaseEngine for ImageAlignment {
    const PHASE: Phase = Phase::ImageAlignment;

    fn step(&mut self, sequence: &mut ImageSequence) -> Result<Step> {
        ImageAlignment::step(self, sequence)
    }

    fn render(&self) -> Option<RgbaImage> {
        render_alignment(self)
    }
}

impl PhaseEngine for QualityEstimation {
    const PHASE: Phase = Phase::QualityEstimation;

    fn step(&mut self, sequence: &mut ImageSequence) -> Result<Step> {
        QualityEstimation::step(self, sequence)
    }

    fn render(&self) -> Option<RgbaImage> {
        render_quality(self)
    }
}

impl PhaseEngine for RefPointAlignment {
    const PHASE: Phase = Phase::ReferencePointAlignment;

    fn step(&mut self, sequence: &mut ImageSequence) -> Result<Step> {
        RefPointAlignment::step(self, sequence)
    }

    fn render(&self) -> Option<RgbaImage> {
        render_ref_points(self)
    }
}

impl PhaseEngine for Stacking {
    const PHASE: Phase = Phase::ImageStacking;

    fn step(&mut self, sequence: &mut ImageSequence) -> Result<Step> {
        Stacking::step(self, sequence)
    }

    fn render(&self) -> Option<RgbaImage> {
        render_stacking(self)
    }
}

/// Why processing stopped before the last step.
enum Interrupt {
    Aborted,
    Failed(SaturnError),
}

impl From<SaturnError> for Interrupt {
    fn from(e: SaturnError) -> Self {
        Self::Failed(e)
    }
}

type Outcome<T> = std::result::Result<T, Interrupt>;

/// Body of the processing thread. A panic in an engine or frame source is
/// reported as a failure so `Finished` is always sent.
pub(crate) fn run(shared: Arc<Shared>, sequence: ImageSequence) {
    let mut runner = Runner {
        shared,
        sequence: Some(sequence),
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| runner.process())).unwrap_or_else(
        |payload| {
            Err(Interrupt::Failed(SaturnError::WorkerPanicked(
                panic_message(payload.as_ref()),
            )))
        },
    );
    runner.finish(outcome);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown cause".into()
    }
}

struct Runner {
    shared: Arc<Shared>,
    /// Owned by the thread except while parked for reference point selection.
    sequence: Option<ImageSequence>,
}

impl Runner {
    fn with_state<R>(&self, f: impl FnOnce(&mut WorkerState) -> R) -> R {
        let guard = self.shared.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    fn with_job<R>(&self, f: impl FnOnce(&mut Job) -> R) -> Outcome<R> {
        self.with_state(|state| state.job.as_mut().map(f))
            .ok_or(Interrupt::Failed(SaturnError::SequenceUnavailable))
    }

    fn sequence(&mut self) -> Outcome<&mut ImageSequence> {
        self.sequence
            .as_mut()
            .ok_or(Interrupt::Failed(SaturnError::SequenceUnavailable))
    }

    fn process(&mut self) -> Outcome<()> {
        let (settings, anchors) = self.with_job(|job| (job.settings.clone(), job.anchors.clone()))?;

        let mut alignment = ImageAlignment::new(
            self.sequence()?,
            settings.alignment_method,
            &anchors,
            settings.anchor_block_size,
        )?;
        self.run_phase(&mut alignment)?;

        let mut quality = QualityEstimation::new(
            alignment,
            settings.quality_area_size,
            settings.quality_detail_scale,
        )?;
        self.run_phase(&mut quality)?;
        self.publish_quality(&quality)?;

        let quality = self.await_reference_points(quality)?;

        let (automatic, manual_points, settings) = self.with_job(|job| {
            (
                job.settings.automatic_ref_points_placement,
                job.ref_points.clone(),
                job.settings.clone(),
            )
        })?;
        let manual_points = if automatic { Vec::new() } else { manual_points };
        let mut ref_points = RefPointAlignment::new(
            quality,
            settings.quality_criterion,
            &manual_points,
            &settings.ref_pt_auto_placement,
            settings.ref_pt_block_size,
            settings.ref_pt_search_radius,
        )?;
        if automatic {
            let placed = ref_points.reference_points();
            debug!(count = placed.len(), "Reference points placed automatically");
            self.with_job(|job| job.ref_points = placed)?;
        }
        self.run_phase(&mut ref_points)?;

        let flat_field = self.load_flat_field(&settings)?;
        let mut stacking = Stacking::new(ref_points, flat_field)?;
        self.run_phase(&mut stacking)?;

        let stacked = stacking.take_image();
        self.with_job(|job| job.stacked_img = stacked)?;
        Ok(())
    }

    fn begin_phase(&self, phase: Phase) -> Outcome<()> {
        self.with_state(|state| {
            if state.abort_requested {
                return Err(Interrupt::Aborted);
            }
            state.phase = phase;
            state.step = 0;
            state.last_result = ResultCode::Success;
            Ok(())
        })?;
        info!(%phase, "Phase started");
        self.shared
            .notifier
            .notify(Notification::PhaseStarted { phase });
        Ok(())
    }

    /// Step `engine` to completion, publishing progress after every step.
    fn run_phase<E: PhaseEngine>(&mut self, engine: &mut E) -> Outcome<()> {
        let phase = E::PHASE;
        self.begin_phase(phase)?;
        loop {
            let result = engine.step(self.sequence()?);

            let (step, done) = self.with_state(|state| {
                if state.abort_requested {
                    return Err(Interrupt::Aborted);
                }
                let outcome = result?;
                state.step += 1;
                let done = outcome == Step::LastStep;
                state.last_result = if done {
                    ResultCode::LastStep
                } else {
                    ResultCode::Success
                };
                if state.visualization_enabled {
                    state.visualization = engine
                        .render()
                        .map(|img| Arc::new(scale(img, state.zoom_factor, state.interpolation)));
                }
                Ok((state.step, done))
            })?;

            self.shared.notifier.notify(Notification::Step { phase, step });
            if done {
                debug!(%phase, steps = step, "Phase complete");
                return Ok(());
            }
        }
    }

    fn publish_quality(&self, quality: &QualityEstimation) -> Outcome<()> {
        let data = QualityData::from_chrono(quality.frame_qualities().to_vec());
        let best_fragments = quality.best_fragments().cloned();
        self.with_job(|job| {
            job.quality = data;
            job.best_fragments_img = best_fragments;
            job.quality_data_ready_notification = true;
        })?;
        self.shared.notifier.notify(Notification::QualityDataReady);
        Ok(())
    }

    /// Park the sequence and quality engine until the controller supplies
    /// reference points (or none, which falls back to automatic placement).
    fn await_reference_points(&mut self, quality: QualityEstimation) -> Outcome<QualityEstimation> {
        let must_wait = self.with_job(|job| {
            !job.settings.automatic_ref_points_placement && job.ref_points.is_empty()
        })?;
        if !must_wait {
            return Ok(quality);
        }

        self.shared.rendezvous.arm();
        let sequence = self
            .sequence
            .take()
            .ok_or(Interrupt::Failed(SaturnError::SequenceUnavailable))?;
        let parked = self.with_state(|state| {
            if state.abort_requested {
                return Err((sequence, quality));
            }
            state.waiting_for_ref_points = true;
            state.context = PhaseContext::AwaitingReferencePoints { sequence, quality };
            Ok(())
        });
        if let Err((sequence, _)) = parked {
            self.shared.rendezvous.disarm();
            self.sequence = Some(sequence);
            return Err(Interrupt::Aborted);
        }

        info!("Waiting for reference points");
        self.shared
            .notifier
            .notify(Notification::AwaitingReferencePoints);
        self.shared.rendezvous.wait();

        let guard = self.shared.state.lock();
        let mut state = guard.borrow_mut();
        state.waiting_for_ref_points = false;
        let PhaseContext::AwaitingReferencePoints { sequence, quality } =
            std::mem::take(&mut state.context)
        else {
            return Err(Interrupt::Failed(SaturnError::SequenceUnavailable));
        };
        self.sequence = Some(sequence);
        if state.abort_requested {
            return Err(Interrupt::Aborted);
        }
        if let Some(job) = state.job.as_mut() {
            if job.ref_points.is_empty() {
                info!("No reference points supplied, placing them automatically");
                job.settings.automatic_ref_points_placement = true;
            }
        }
        Ok(quality)
    }

    fn load_flat_field(&mut self, settings: &JobSettings) -> Outcome<Option<FlatField>> {
        let Some(path) = settings.flat_field_file_name.as_deref() else {
            return Ok(None);
        };
        let size = self.sequence()?.dimensions()?;
        let flat = FlatField::load(path, size)?;
        info!(path = %path.display(), "Flat-field loaded");
        Ok(Some(flat))
    }

    fn finish(&mut self, outcome: Outcome<()>) {
        self.shared.rendezvous.disarm();
        let sequence = self.sequence.take();
        let result = self.with_state(|state| {
            state.phase = Phase::Idle;
            state.running = false;
            state.waiting_for_ref_points = false;
            // Still parked if the wait itself was interrupted.
            let sequence = match std::mem::take(&mut state.context) {
                PhaseContext::AwaitingReferencePoints { sequence, .. } => Some(sequence),
                PhaseContext::Empty => sequence,
            };
            if let (Some(job), Some(seq)) = (state.job.as_mut(), sequence) {
                job.image_sequence = Some(seq);
            }
            match outcome {
                Ok(()) => {
                    info!("Processing complete");
                    state.last_result = ResultCode::LastStep;
                }
                Err(Interrupt::Aborted) => {
                    warn!("Processing aborted");
                    state.last_result = ResultCode::Aborted;
                }
                Err(Interrupt::Failed(e)) => {
                    error!(error = %e, "Processing failed");
                    state.last_result = ResultCode::from(&e);
                }
            }
            state.last_result.clone()
        });
        self.shared.notifier.notify(Notification::Finished { result });
    }
}
