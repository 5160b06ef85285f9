mod common;

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use saturn_core::error::{FailureKind, SaturnError};
use saturn_core::frame::Point;
use saturn_core::job::{Job, JobSettings};
use saturn_core::worker::{
    ChannelNotifier, Interpolation, Notification, Phase, ResultCode, Worker,
};

const TIMEOUT: Duration = Duration::from_secs(60);

fn new_worker() -> (Worker, Receiver<Notification>) {
    let (notifier, rx) = ChannelNotifier::channel();
    (Worker::new(Arc::new(notifier)), rx)
}

fn planet_job(frames: usize, settings: JobSettings) -> Job {
    Job::new("planet.ser", planet_sequence(frames), settings)
}

fn manual_settings() -> JobSettings {
    JobSettings {
        automatic_ref_points_placement: false,
        ..test_settings()
    }
}

/// Anchor suggested on the first frame, as the controller would place it.
fn with_anchor(mut job: Job) -> Job {
    let seq = job.image_sequence.as_mut().unwrap();
    let first = seq.image_at(0).unwrap().luminance();
    let anchor = saturn_core::align::suggest_anchor_pos(&first.data, 0.33, 24).unwrap();
    job.anchors = vec![anchor];
    job
}

/// Collect notifications up to and including `Finished`.
fn until_finished(rx: &Receiver<Notification>) -> Vec<Notification> {
    let mut seen = Vec::new();
    loop {
        let n = rx.recv_timeout(TIMEOUT).expect("worker stalled");
        let done = matches!(n, Notification::Finished { .. });
        seen.push(n);
        if done {
            return seen;
        }
    }
}

fn until_awaiting(rx: &Receiver<Notification>) -> Vec<Notification> {
    let mut seen = Vec::new();
    loop {
        let n = rx.recv_timeout(TIMEOUT).expect("worker stalled");
        match n {
            Notification::AwaitingReferencePoints => return seen,
            Notification::Finished { result } => panic!("finished early: {result:?}"),
            other => seen.push(other),
        }
    }
}

fn finished_result(notifications: &[Notification]) -> ResultCode {
    match notifications.last() {
        Some(Notification::Finished { result }) => result.clone(),
        other => panic!("expected Finished, got {other:?}"),
    }
}

#[test]
fn test_automatic_run_completes() {
    let (worker, rx) = new_worker();
    worker
        .start_processing(with_anchor(planet_job(20, test_settings())))
        .unwrap();
    let notifications = until_finished(&rx);

    assert_eq!(finished_result(&notifications), ResultCode::LastStep);
    assert!(!notifications.contains(&Notification::AwaitingReferencePoints));
    assert!(!worker.is_running());
    assert_eq!(worker.phase(), Phase::Idle);
    assert_eq!(worker.last_result(), ResultCode::LastStep);

    let job = worker.take_job().unwrap();
    assert!(job.image_sequence.is_some());
    assert!(job.stacked_img.is_some());
    assert!(job.best_fragments_img.is_some());
    assert!(!job.ref_points.is_empty());

    assert_eq!(job.quality.frames_chrono.len(), 20);
    let sorted = &job.quality.frames_sorted;
    assert_eq!(sorted.len(), 20);
    assert!(sorted.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_phase_and_step_ordering() {
    let (worker, rx) = new_worker();
    worker
        .start_processing(with_anchor(planet_job(6, test_settings())))
        .unwrap();
    let notifications = until_finished(&rx);

    let mut phases = Vec::new();
    let mut current = Phase::Idle;
    let mut last_step = 0;
    let mut quality_ready_at = None;
    for (i, n) in notifications.iter().enumerate() {
        match *n {
            Notification::PhaseStarted { phase } => {
                assert!(phase > current, "{phase:?} after {current:?}");
                current = phase;
                last_step = 0;
                phases.push(phase);
            }
            Notification::Step { phase, step } => {
                assert_eq!(phase, current);
                assert_eq!(step, last_step + 1);
                last_step = step;
            }
            Notification::QualityDataReady => {
                assert_eq!(current, Phase::QualityEstimation);
                quality_ready_at = Some(i);
            }
            _ => {}
        }
    }
    assert_eq!(
        phases,
        vec![
            Phase::ImageAlignment,
            Phase::QualityEstimation,
            Phase::ReferencePointAlignment,
            Phase::ImageStacking,
        ]
    );
    // One step per active frame in the final phase.
    assert_eq!(last_step, 6);
    assert!(quality_ready_at.is_some());
}

#[test]
fn test_manual_reference_points() {
    let (worker, rx) = new_worker();
    worker
        .start_processing(with_anchor(planet_job(6, manual_settings())))
        .unwrap();
    let before = until_awaiting(&rx);
    assert!(before.contains(&Notification::QualityDataReady));

    assert!(worker.is_running());
    assert!(worker.is_waiting_for_reference_points());
    let best = worker.best_quality_aligned_image().unwrap();
    assert!(best.width() > 0 && best.width() <= WIDTH as u32);

    {
        let _lock = worker.lock();
        assert!(worker.is_waiting_for_reference_points());
        worker
            .with_job(|job| job.ref_points = vec![Point::new(45, 45)])
            .unwrap();
    }
    assert!(worker.notify_reference_points_set());

    let rest = until_finished(&rx);
    assert_eq!(finished_result(&rest), ResultCode::LastStep);
    assert!(!worker.is_waiting_for_reference_points());
    let job = worker.take_job().unwrap();
    assert_eq!(job.ref_points, vec![Point::new(45, 45)]);
    assert!(!job.settings.automatic_ref_points_placement);
    assert!(job.stacked_img.is_some());
}

#[test]
fn test_no_reference_points_falls_back_to_automatic() {
    let (worker, rx) = new_worker();
    worker
        .start_processing(with_anchor(planet_job(6, manual_settings())))
        .unwrap();
    until_awaiting(&rx);

    assert!(worker.notify_reference_points_set());
    let rest = until_finished(&rx);
    assert_eq!(finished_result(&rest), ResultCode::LastStep);

    let job = worker.take_job().unwrap();
    assert!(job.settings.automatic_ref_points_placement);
    assert!(!job.ref_points.is_empty());
}

#[test]
fn test_stray_release_does_not_resume() {
    let (worker, rx) = new_worker();
    assert!(!worker.notify_reference_points_set());
    assert!(!worker.notify_reference_points_set());

    worker
        .start_processing(with_anchor(planet_job(4, manual_settings())))
        .unwrap();
    until_awaiting(&rx);

    // Still parked: nothing else arrives until a real release.
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    assert!(worker.is_waiting_for_reference_points());

    assert!(worker.notify_reference_points_set());
    assert_eq!(finished_result(&until_finished(&rx)), ResultCode::LastStep);
}

#[test]
fn test_abort_while_waiting_then_restart() {
    let (worker, rx) = new_worker();
    worker
        .start_processing(with_anchor(planet_job(4, manual_settings())))
        .unwrap();
    until_awaiting(&rx);

    worker.abort_processing();
    assert!(!worker.is_running());
    assert!(!worker.is_waiting_for_reference_points());
    let result = finished_result(&until_finished(&rx));
    assert_eq!(result, ResultCode::Aborted);
    assert!(!result.is_failure());
    assert_eq!(worker.last_result(), ResultCode::Aborted);
    assert!(worker.best_quality_aligned_image().is_err());

    let mut job = worker.take_job().unwrap();
    assert!(job.image_sequence.is_some());
    assert!(job.stacked_img.is_none());

    job.settings.automatic_ref_points_placement = true;
    worker.start_processing(job).unwrap();
    assert_eq!(finished_result(&until_finished(&rx)), ResultCode::LastStep);
    assert!(worker.take_job().unwrap().stacked_img.is_some());
}

#[test]
fn test_abort_during_phase() {
    let (worker, rx) = new_worker();
    let sequence = ScriptedSource::slow(20, Duration::from_millis(20)).into_sequence();
    let job = with_anchor(Job::new("slow.ser", sequence, test_settings()));
    worker.start_processing(job).unwrap();

    loop {
        match rx.recv_timeout(TIMEOUT).expect("worker stalled") {
            Notification::Step { .. } => break,
            Notification::Finished { result } => panic!("finished early: {result:?}"),
            _ => {}
        }
    }
    worker.abort_processing();
    assert!(!worker.is_running());

    let result = finished_result(&until_finished(&rx));
    assert_eq!(result, ResultCode::Aborted);
    assert_eq!(worker.last_result(), ResultCode::Aborted);
    assert_eq!(worker.snapshot().last_result, ResultCode::Aborted);

    let job = worker.take_job().unwrap();
    assert!(job.image_sequence.is_some());
    assert!(job.stacked_img.is_none());
}

#[test]
fn test_panic_in_frame_source_is_reported() {
    let (worker, rx) = new_worker();
    let sequence = ScriptedSource::panicking(6, 2).into_sequence();
    let job = with_anchor(Job::new("crash.ser", sequence, test_settings()));
    worker.start_processing(job).unwrap();

    match finished_result(&until_finished(&rx)) {
        ResultCode::Failed { kind, message } => {
            assert_eq!(kind, FailureKind::Internal);
            assert!(message.contains("panicked"));
            assert!(message.contains("frame 2"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    worker.wait_until_finished();
    assert!(!worker.is_running());
    assert!(worker.last_result().is_failure());

    let job = worker.take_job().unwrap();
    assert!(job.image_sequence.is_some());
    assert!(job.stacked_img.is_none());
}

#[test]
fn test_accessors_reenter_while_locked() {
    let (worker, rx) = new_worker();
    worker
        .start_processing(with_anchor(planet_job(4, manual_settings())))
        .unwrap();
    until_awaiting(&rx);

    {
        let _lock = worker.lock();
        worker.set_zoom_factor(2.0);
        let snapshot = worker.snapshot();
        assert!(snapshot.running);
        assert!(snapshot.waiting_for_reference_points);
        assert_eq!(snapshot.phase, Phase::QualityEstimation);

        let nested = worker.with_job(|job| {
            worker.set_zoom_factor(3.0);
            assert!(worker.is_running());
            // The job is detached while the outer closure holds it.
            assert!(worker.with_job(|_| ()).is_none());
            job.ref_points = vec![Point::new(40, 40)];
            job.ref_points.len()
        });
        assert_eq!(nested, Some(1));
        assert_eq!(worker.zoom_factor(), 3.0);
    }

    assert!(worker.notify_reference_points_set());
    assert_eq!(finished_result(&until_finished(&rx)), ResultCode::LastStep);
    assert_eq!(worker.take_job().unwrap().ref_points, vec![Point::new(40, 40)]);
}

#[test]
fn test_missing_flat_field_fails() {
    let (worker, rx) = new_worker();
    let settings = JobSettings {
        flat_field_file_name: Some("/nonexistent/flat.tif".into()),
        ..test_settings()
    };
    worker
        .start_processing(with_anchor(planet_job(4, settings)))
        .unwrap();

    let result = finished_result(&until_finished(&rx));
    assert!(matches!(
        result,
        ResultCode::Failed {
            kind: FailureKind::FlatField,
            ..
        }
    ));
    assert!(!worker.is_running());
    let job = worker.take_job().unwrap();
    assert!(job.stacked_img.is_none());
    assert!(job.image_sequence.is_some());
}

#[test]
fn test_alignment_failure_reported() {
    let (worker, rx) = new_worker();
    let mut job = planet_job(3, test_settings());
    job.anchors = vec![Point::new(2, 2)];
    worker.start_processing(job).unwrap();

    let result = finished_result(&until_finished(&rx));
    assert!(matches!(
        result,
        ResultCode::Failed {
            kind: FailureKind::AlignmentLost,
            ..
        }
    ));
}

#[test]
fn test_start_rejections() {
    let (worker, rx) = new_worker();
    worker
        .start_processing(with_anchor(planet_job(4, manual_settings())))
        .unwrap();
    until_awaiting(&rx);

    let busy = worker
        .start_processing(planet_job(2, test_settings()))
        .unwrap_err();
    assert!(matches!(busy.reason, SaturnError::WorkerBusy));
    assert!(busy.job.image_sequence.is_some());
    // The running job is untouched.
    assert!(worker.take_job().is_none());
    worker.abort_processing();

    let mut no_sequence = planet_job(2, test_settings());
    no_sequence.image_sequence = None;
    let rejected = worker.start_processing(no_sequence).unwrap_err();
    assert!(matches!(rejected.reason, SaturnError::SequenceUnavailable));
}

#[test]
fn test_visualization_frames() {
    let (worker, rx) = new_worker();
    assert!(worker.visualization_image().is_none());
    worker.set_visualization_enabled(true);
    assert!(worker.is_visualization_enabled());
    worker.set_interpolation(Interpolation::Fast);
    assert_eq!(worker.interpolation(), Interpolation::Fast);
    worker.set_zoom_factor(100.0);
    assert_eq!(worker.zoom_factor(), 16.0);
    worker.set_zoom_factor(0.5);

    worker
        .start_processing(with_anchor(planet_job(4, test_settings())))
        .unwrap();
    until_finished(&rx);

    let frame = worker.visualization_image().unwrap();
    let job = worker.take_job().unwrap();
    let stacked = job.stacked_img.unwrap();
    assert_eq!(frame.width(), (stacked.width() as f64 * 0.5).round() as u32);

    worker.set_visualization_enabled(false);
    assert!(worker.visualization_image().is_none());
}
