mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use tempfile::tempdir;

use common::*;
use saturn_core::error::SaturnError;
use saturn_core::frame::{CfaPattern, ColorFrame, Frame, ImageData};
use saturn_core::io::ser::{SerColor, SerReader};
use saturn_core::sequence::{FileListSource, FrameSource, ImageSequence, SequenceKind};

#[test]
fn test_parse_8bit_mono() {
    let dir = tempdir().unwrap();
    let frame: Vec<u8> = (0u8..12).collect();
    let path = write_file(dir.path(), "a.ser", &build_ser(4, 3, 8, 0, &[frame]));

    let reader = SerReader::open(&path).unwrap();
    assert_eq!(reader.frame_count(), 1);
    assert_eq!(reader.header.width, 4);
    assert_eq!(reader.header.height, 3);
    assert_eq!(reader.header.color(), SerColor::Mono);
    assert_eq!(reader.header.observer, "Test");
    assert_eq!(reader.header.telescope, "MyScope");

    let ImageData::Mono(frame) = reader.read_frame(0).unwrap() else {
        panic!("expected mono frame");
    };
    assert_abs_diff_eq!(frame.data[[0, 0]], 0.0);
    assert_abs_diff_eq!(frame.data[[0, 1]], 1.0 / 255.0, epsilon = 1e-4);
    assert_abs_diff_eq!(frame.data[[2, 3]], 11.0 / 255.0, epsilon = 1e-4);
}

#[test]
fn test_parse_16bit_mono() {
    let dir = tempdir().unwrap();
    let mut frame = Vec::new();
    for v in [0u16, 1000, 32767, 65535] {
        frame.extend_from_slice(&v.to_le_bytes());
    }
    let path = write_file(dir.path(), "b.ser", &build_ser(2, 2, 16, 0, &[frame]));

    let reader = SerReader::open(&path).unwrap();
    let ImageData::Mono(frame) = reader.read_frame(0).unwrap() else {
        panic!("expected mono frame");
    };
    assert_abs_diff_eq!(frame.data[[0, 1]], 1000.0 / 65535.0, epsilon = 1e-4);
    assert_abs_diff_eq!(frame.data[[1, 1]], 1.0, epsilon = 1e-6);
}

#[test]
fn test_rgb_ser_is_color() {
    let dir = tempdir().unwrap();
    // One 1x2 RGB frame: red pixel, blue pixel.
    let frame = vec![255u8, 0, 0, 0, 0, 255];
    let path = write_file(dir.path(), "c.ser", &build_ser(2, 1, 8, 100, &[frame]));

    let reader = SerReader::open(&path).unwrap();
    let ImageData::Color(color) = reader.read_frame(0).unwrap() else {
        panic!("expected colour frame");
    };
    assert_abs_diff_eq!(color.red.data[[0, 0]], 1.0);
    assert_abs_diff_eq!(color.blue.data[[0, 0]], 0.0);
    assert_abs_diff_eq!(color.blue.data[[0, 1]], 1.0);
}

#[test]
fn test_truncated_ser_rejected() {
    let dir = tempdir().unwrap();
    let mut data = build_ser(4, 4, 8, 0, &[vec![0u8; 16]]);
    data.truncate(data.len() - 4);
    let path = write_file(dir.path(), "t.ser", &data);
    assert!(matches!(SerReader::open(&path), Err(SaturnError::InvalidSer(_))));
}

#[test]
fn test_out_of_range() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "d.ser", &build_ser(2, 2, 8, 0, &[vec![0u8; 4]]));
    let reader = SerReader::open(&path).unwrap();
    assert!(reader.read_frame(1).is_err());
}

#[test]
fn test_bayer_ser_reports_pattern_and_debayers() {
    let dir = tempdir().unwrap();
    let frames = vec![vec![128u8; 16], vec![64u8; 16]];
    let path = write_file(dir.path(), "bayer.ser", &build_ser(4, 4, 8, 8, &frames));

    let mut seq = ImageSequence::open(&path).unwrap();
    assert_eq!(seq.kind(), SequenceKind::Video);
    assert_eq!(seq.cfa_pattern(), Some(CfaPattern::RGGB));
    let image = seq.image_at(0).unwrap();
    assert!(image.is_color());
    assert_eq!((image.width(), image.height()), (4, 4));
}

#[test]
fn test_ser_sequence_cursor() {
    let dir = tempdir().unwrap();
    let path = write_planet_ser(dir.path(), "planet.ser", 5);
    let mut seq = ImageSequence::open(&path).unwrap();

    assert_eq!(seq.len(), 5);
    assert_eq!(seq.active_image_count(), 5);
    assert_eq!(seq.dimensions().unwrap(), (WIDTH as u32, HEIGHT as u32));

    seq.seek_start();
    let mut visited = 1;
    while seq.seek_next() {
        visited += 1;
    }
    assert_eq!(visited, 5);
    assert_eq!(seq.current_active_index(), 4);
    assert!(seq.current_image().is_ok());
}

#[test]
fn test_active_flags_restrict_frames() {
    let frames: Vec<Array2<f32>> = (0..4).map(|i| Array2::from_elem((4, 4), i as f32 * 0.25)).collect();
    let mut seq = memory_sequence(frames);

    seq.set_active_images(&[true, false, true, false]).unwrap();
    assert_eq!(seq.active_image_count(), 2);
    assert_eq!(seq.active_flags(), &[true, false, true, false]);
    assert!(!seq.is_active(1));
    assert_eq!(seq.original_index(1), Some(2));

    let ImageData::Mono(second) = seq.image_at(1).unwrap() else {
        panic!("expected mono frame");
    };
    assert_abs_diff_eq!(second.data[[0, 0]], 0.5);
}

#[test]
fn test_excluded_frames() {
    let mut seq = planet_sequence(5);
    seq.set_excluded_images(&[1, 4, 9]).unwrap();
    assert_eq!(seq.active_flags(), &[true, false, true, true, false]);
    assert_eq!(seq.original_index(1), Some(2));

    // A new selection replaces the previous one.
    seq.set_excluded_images(&[]).unwrap();
    assert_eq!(seq.active_image_count(), 5);

    assert!(matches!(
        seq.set_excluded_images(&[0, 1, 2, 3, 4]),
        Err(SaturnError::NoActiveImages)
    ));
}

#[test]
fn test_all_inactive_rejected() {
    let mut seq = planet_sequence(3);
    assert!(matches!(
        seq.set_active_images(&[false, false, false]),
        Err(SaturnError::NoActiveImages)
    ));
    assert!(seq.set_active_images(&[true, true]).is_err());
    assert_eq!(seq.active_image_count(), 3);
}

#[test]
fn test_deactivate_then_reload() {
    let dir = tempdir().unwrap();
    let path = write_planet_ser(dir.path(), "p.ser", 3);
    let mut seq = ImageSequence::open(&path).unwrap();

    let before = seq.image_at(2).unwrap().luminance();
    seq.deactivate();
    let after = seq.image_at(2).unwrap().luminance();
    assert_eq!(before.data, after.data);
}

#[test]
fn test_reinterpret_as_cfa() {
    let mut seq = planet_sequence(2);
    assert!(!seq.image_at(0).unwrap().is_color());

    seq.reinterpret_as_cfa(Some(CfaPattern::GBRG));
    assert_eq!(seq.cfa_pattern(), Some(CfaPattern::GBRG));
    assert!(seq.image_at(0).unwrap().is_color());

    seq.reinterpret_as_cfa(None);
    assert!(!seq.image_at(0).unwrap().is_color());
}

#[test]
fn test_directory_sequence_sorted() {
    let dir = tempdir().unwrap();
    for (i, name) in ["frame_b.png", "frame_a.png", "frame_c.png"].iter().enumerate() {
        let img = image::GrayImage::from_pixel(8, 6, image::Luma([(i as u8 + 1) * 50]));
        img.save(dir.path().join(name)).unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

    let mut seq = ImageSequence::open(dir.path()).unwrap();
    assert_eq!(seq.kind(), SequenceKind::ImageFiles);
    assert_eq!(seq.len(), 3);
    assert_eq!(seq.dimensions().unwrap(), (8, 6));

    // frame_a.png was written second (value 100).
    let ImageData::Mono(first) = seq.image_at(0).unwrap() else {
        panic!("expected mono frame");
    };
    assert_abs_diff_eq!(first.data[[0, 0]], 100.0 / 255.0, epsilon = 1e-4);
}

#[test]
fn test_file_list_size_mismatch() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    image::GrayImage::new(8, 8).save(&a).unwrap();
    image::GrayImage::new(9, 8).save(&b).unwrap();
    assert!(ImageSequence::from_files(vec![a, b]).is_err());
}

#[test]
fn test_memory_sequence_rejects_empty() {
    assert!(ImageSequence::from_images(Vec::new()).is_err());
}

#[test]
fn test_file_list_follows_first_frame_layout() {
    let dir = tempdir().unwrap();
    let gray = dir.path().join("a_gray.png");
    let rgb = dir.path().join("b_rgb.png");
    image::GrayImage::from_pixel(6, 4, image::Luma([128])).save(&gray).unwrap();
    image::RgbImage::from_pixel(6, 4, image::Rgb([255, 0, 0])).save(&rgb).unwrap();

    // Gray first: the color frame is reduced to luminance.
    let mut source = FileListSource::new(vec![gray.clone(), rgb.clone()]).unwrap();
    assert!(!source.is_color());
    let ImageData::Mono(reduced) = source.load(1).unwrap() else {
        panic!("expected mono frame");
    };
    assert!(reduced.data[[0, 0]] > 0.0 && reduced.data[[0, 0]] < 1.0);

    // Color first: the gray frame is replicated into every channel.
    let mut seq = ImageSequence::from_files(vec![rgb, gray]).unwrap();
    let ImageData::Color(expanded) = seq.image_at(1).unwrap() else {
        panic!("expected color frame");
    };
    assert_abs_diff_eq!(expanded.red.data[[2, 3]], 128.0 / 255.0, epsilon = 1e-3);
    assert_eq!(expanded.red.data, expanded.green.data);
    assert_eq!(expanded.red.data, expanded.blue.data);
}

#[test]
fn test_memory_sequence_rejects_mixed_layouts() {
    let plane = Array2::from_elem((4, 4), 0.5f32);
    let gray = ImageData::Mono(Frame::new(plane.clone(), 8));
    let color = ImageData::Color(ColorFrame {
        red: Frame::new(plane.clone(), 8),
        green: Frame::new(plane.clone(), 8),
        blue: Frame::new(plane, 8),
    });
    assert!(matches!(
        ImageSequence::from_images(vec![gray, color]),
        Err(SaturnError::InvalidParameters(_))
    ));
}
