mod common;

use approx::assert_abs_diff_eq;
use ndarray::{s, Array2};

use common::*;
use saturn_core::align::{centroid, compute_offset_with_confidence, suggest_anchor_pos};
use saturn_core::consts::MIN_CORRELATION_CONFIDENCE;
use saturn_core::engine::{ImageAlignment, Step};
use saturn_core::error::SaturnError;
use saturn_core::frame::{Point, Rect};
use saturn_core::job::AlignmentMethod;
use saturn_core::sequence::ImageSequence;

fn run_alignment(engine: &mut ImageAlignment, seq: &mut ImageSequence) -> usize {
    let mut steps = 0;
    loop {
        steps += 1;
        if engine.step(seq).unwrap() == Step::LastStep {
            return steps;
        }
    }
}

fn anchor_for(seq: &mut ImageSequence) -> Point {
    let first = seq.image_at(0).unwrap().luminance();
    suggest_anchor_pos(&first.data, 0.33, 24).unwrap()
}

#[test]
fn test_phase_correlation_known_shift() {
    let reference = planet_frame(64, 64, 0, 0);
    let target = planet_frame(64, 64, 3, -2);
    let window = s![12..52, 12..52];

    let corr = compute_offset_with_confidence(
        &reference.slice(window).to_owned(),
        &target.slice(window).to_owned(),
    )
    .unwrap();
    assert_abs_diff_eq!(corr.displacement.dx, 3.0, epsilon = 0.3);
    assert_abs_diff_eq!(corr.displacement.dy, -2.0, epsilon = 0.3);
    assert!(corr.confidence >= MIN_CORRELATION_CONFIDENCE);
}

#[test]
fn test_phase_correlation_size_mismatch() {
    let a = Array2::<f32>::zeros((16, 16));
    let b = Array2::<f32>::zeros((16, 8));
    assert!(compute_offset_with_confidence(&a, &b).is_err());
}

#[test]
fn test_centroid_of_single_spot() {
    let mut data = Array2::<f32>::zeros((20, 30));
    data[[5, 12]] = 1.0;
    let c = centroid(&data, 0.1);
    assert_abs_diff_eq!(c.x, 12.0);
    assert_abs_diff_eq!(c.y, 5.0);
}

#[test]
fn test_centroid_black_image_is_centre() {
    let data = Array2::<f32>::zeros((10, 20));
    let c = centroid(&data, 0.1);
    assert_abs_diff_eq!(c.x, 10.0);
    assert_abs_diff_eq!(c.y, 5.0);
}

#[test]
fn test_suggest_anchor_on_planet() {
    let frame = planet_frame(WIDTH, HEIGHT, 0, 0);
    let anchor = suggest_anchor_pos(&frame, 0.33, 24).unwrap();
    // Keeps a one-block margin and lands on the disc.
    assert!(anchor.x >= 24 && anchor.x <= WIDTH as i32 - 24);
    assert!(anchor.y >= 24 && anchor.y <= HEIGHT as i32 - 24);
    assert!(frame[[anchor.y as usize, anchor.x as usize]] > 0.1);
}

#[test]
fn test_suggest_anchor_too_small_image() {
    let frame = Array2::<f32>::from_elem((20, 20), 0.5);
    assert!(suggest_anchor_pos(&frame, 0.33, 16).is_none());
}

#[test]
fn test_anchor_alignment_recovers_jitter() {
    let mut seq = planet_sequence(8);
    let anchor = anchor_for(&mut seq);
    let mut engine = ImageAlignment::new(&seq, AlignmentMethod::Anchors, &[anchor], 24).unwrap();

    assert_eq!(run_alignment(&mut engine, &mut seq), 8);
    assert!(engine.is_complete());

    for (i, offset) in engine.offsets().iter().enumerate() {
        let (dx, dy) = jitter(i);
        assert_eq!((offset.x, offset.y), (dx, dy), "frame {i}");
    }
    assert!(engine.anchors().iter().all(|&(_, valid)| valid));

    // Offsets span -3..=3 on both axes.
    assert_eq!(engine.intersection(), Some(Rect::new(3, 3, 90, 90)));
    let last = engine.frame_intersection(7).unwrap();
    assert_eq!((last.x, last.y), (3, 0));
}

#[test]
fn test_centroid_alignment_recovers_jitter() {
    let mut seq = planet_sequence(6);
    let mut engine = ImageAlignment::new(&seq, AlignmentMethod::Centroid, &[], 24).unwrap();
    run_alignment(&mut engine, &mut seq);

    for (i, offset) in engine.offsets().iter().enumerate() {
        let (dx, dy) = jitter(i);
        assert!((offset.x - dx).abs() <= 1 && (offset.y - dy).abs() <= 1, "frame {i}");
    }
    assert!(engine.centroid().is_some());
    assert!(engine.anchors().is_empty());
}

#[test]
fn test_anchor_method_requires_anchors() {
    let seq = planet_sequence(3);
    assert!(matches!(
        ImageAlignment::new(&seq, AlignmentMethod::Anchors, &[], 24),
        Err(SaturnError::InvalidParameters(_))
    ));
}

#[test]
fn test_anchor_outside_frame_loses_alignment() {
    let mut seq = planet_sequence(3);
    let mut engine =
        ImageAlignment::new(&seq, AlignmentMethod::Anchors, &[Point::new(2, 2)], 24).unwrap();
    assert!(matches!(engine.step(&mut seq), Err(SaturnError::AlignmentLost(_))));
}

#[test]
fn test_large_offset_shrinks_intersection() {
    let a = planet_frame(32, 32, 0, 0);
    let mut b = Array2::<f32>::zeros((32, 32));
    b.slice_mut(s![.., 30..]).fill(1.0);
    let mut seq = memory_sequence(vec![a, b]);

    let mut engine = ImageAlignment::new(&seq, AlignmentMethod::Centroid, &[], 8).unwrap();
    assert_eq!(engine.step(&mut seq).unwrap(), Step::Continue);
    assert_eq!(engine.step(&mut seq).unwrap(), Step::LastStep);

    let dx = engine.offsets()[1].x;
    assert!(dx >= 14);
    let rect = engine.intersection().unwrap();
    assert_eq!(rect.width as i32, 32 - dx);
}
