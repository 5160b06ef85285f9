#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ndarray::Array2;

use saturn_core::frame::{Frame, ImageData};
use saturn_core::job::{AlignmentMethod, JobSettings, OutputSaveMode};
use saturn_core::quality::box_blur;
use saturn_core::error::Result;
use saturn_core::sequence::{FrameSource, ImageSequence, SequenceKind};

pub const SER_HEADER_SIZE: usize = 178;

pub const WIDTH: usize = 96;
pub const HEIGHT: usize = 96;

/// Brightness of a textured disc ("planet") centred at (`cx`, `cy`),
/// sampled at continuous coordinates so shifted copies stay exact.
pub fn planet_value(x: f64, y: f64, cx: f64, cy: f64, radius: f64) -> f32 {
    let (dx, dy) = (x - cx, y - cy);
    let r = (dx * dx + dy * dy).sqrt();
    if r > radius {
        return 0.03;
    }
    let bands = 0.18 * (dy * 0.45).sin() + 0.08 * (dx * 0.7 + dy * 0.2).cos();
    let spots = 0.1 * ((dx * 1.3).sin() * (dy * 1.1).cos());
    let limb = 0.15 * (1.0 - r / radius);
    (0.45 + bands + spots + limb).clamp(0.0, 1.0) as f32
}

/// A planet frame whose content is displaced by (`dx`, `dy`) pixels.
pub fn planet_frame(width: usize, height: usize, dx: i32, dy: i32) -> Array2<f32> {
    let cx = width as f64 / 2.0 + dx as f64;
    let cy = height as f64 / 2.0 + dy as f64;
    let radius = width.min(height) as f64 * 0.33;
    Array2::from_shape_fn((height, width), |(y, x)| {
        planet_value(x as f64, y as f64, cx, cy, radius)
    })
}

/// Small deterministic jitter pattern used as per-frame shifts.
pub fn jitter(index: usize) -> (i32, i32) {
    const SHIFTS: [(i32, i32); 8] = [
        (0, 0),
        (2, -1),
        (-1, 2),
        (3, 1),
        (-2, -2),
        (1, 3),
        (-3, 0),
        (0, -3),
    ];
    SHIFTS[index % SHIFTS.len()]
}

/// `count` jittered planet frames; every third frame is blurred so frame
/// quality varies. Two box passes keep the blur's spectrum non-negative.
pub fn planet_frames(count: usize) -> Vec<Array2<f32>> {
    (0..count)
        .map(|i| {
            let (dx, dy) = jitter(i);
            let frame = planet_frame(WIDTH, HEIGHT, dx, dy);
            if i % 3 == 2 {
                let once = box_blur(&frame.view(), 1);
                box_blur(&once.view(), 1)
            } else {
                frame
            }
        })
        .collect()
}

pub fn mono(data: Array2<f32>) -> ImageData {
    ImageData::Mono(Frame::new(data, 8))
}

pub fn memory_sequence(frames: Vec<Array2<f32>>) -> ImageSequence {
    ImageSequence::from_images(frames.into_iter().map(mono).collect()).unwrap()
}

pub fn planet_sequence(count: usize) -> ImageSequence {
    memory_sequence(planet_frames(count))
}

/// Planet frames served with a delay per decode, optionally panicking when
/// one particular frame is requested.
pub struct ScriptedSource {
    frames: Vec<Array2<f32>>,
    delay: Duration,
    panic_at: Option<usize>,
}

impl ScriptedSource {
    pub fn slow(count: usize, delay: Duration) -> Self {
        Self {
            frames: planet_frames(count),
            delay,
            panic_at: None,
        }
    }

    pub fn panicking(count: usize, index: usize) -> Self {
        Self {
            frames: planet_frames(count),
            delay: Duration::ZERO,
            panic_at: Some(index),
        }
    }

    pub fn into_sequence(self) -> ImageSequence {
        ImageSequence::new(Box::new(self))
    }
}

impl FrameSource for ScriptedSource {
    fn kind(&self) -> SequenceKind {
        SequenceKind::Memory
    }

    fn len(&self) -> usize {
        self.frames.len()
    }

    fn dimensions(&self) -> Result<(u32, u32)> {
        Ok((WIDTH as u32, HEIGHT as u32))
    }

    fn load(&mut self, index: usize) -> Result<ImageData> {
        if self.panic_at == Some(index) {
            panic!("decoder crashed on frame {index}");
        }
        std::thread::sleep(self.delay);
        Ok(mono(self.frames[index].clone()))
    }
}

/// Settings scaled down for the small synthetic frames.
pub fn test_settings() -> JobSettings {
    let mut settings = JobSettings {
        alignment_method: AlignmentMethod::Anchors,
        anchor_block_size: 24,
        ref_pt_block_size: 12,
        ref_pt_search_radius: 4,
        quality_area_size: 16,
        quality_detail_scale: 2,
        output_save_mode: OutputSaveMode::None,
        ..JobSettings::default()
    };
    settings.ref_pt_auto_placement.spacing = 16;
    settings
}

/// Build a SER file header with configurable bit depth and color mode.
///
/// `color_id`: 0=MONO, 8=BAYER_RGGB, 9=BAYER_GRBG, 10=BAYER_GBRG, 11=BAYER_BGGR,
///             100=RGB, 101=BGR
pub fn build_ser_header(
    width: u32,
    height: u32,
    bit_depth: u32,
    num_frames: usize,
    color_id: i32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SER_HEADER_SIZE);

    // Magic (14 bytes)
    buf.extend_from_slice(b"LUCAM-RECORDER");
    // LuID
    buf.extend_from_slice(&0i32.to_le_bytes());
    // ColorID
    buf.extend_from_slice(&color_id.to_le_bytes());
    // LittleEndian = 0 (little-endian data)
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&(width as i32).to_le_bytes());
    buf.extend_from_slice(&(height as i32).to_le_bytes());
    buf.extend_from_slice(&(bit_depth as i32).to_le_bytes());
    buf.extend_from_slice(&(num_frames as i32).to_le_bytes());
    // Observer
    let mut observer = [0u8; 40];
    observer[..4].copy_from_slice(b"Test");
    buf.extend_from_slice(&observer);
    // Instrument
    buf.extend_from_slice(&[0u8; 40]);
    // Telescope
    let mut telescope = [0u8; 40];
    telescope[..7].copy_from_slice(b"MyScope");
    buf.extend_from_slice(&telescope);
    // DateTime, DateTimeUTC
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes());

    assert_eq!(buf.len(), SER_HEADER_SIZE);
    buf
}

/// Complete SER file with raw frame payloads appended.
pub fn build_ser(
    width: u32,
    height: u32,
    bit_depth: u32,
    color_id: i32,
    frames: &[Vec<u8>],
) -> Vec<u8> {
    let mut buf = build_ser_header(width, height, bit_depth, frames.len(), color_id);
    for frame in frames {
        buf.extend_from_slice(frame);
    }
    buf
}

/// 8-bit mono SER payloads from float frames in [0, 1].
pub fn to_u8_frames(frames: &[Array2<f32>]) -> Vec<Vec<u8>> {
    frames
        .iter()
        .map(|f| f.iter().map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8).collect())
        .collect()
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).expect("create file");
    f.write_all(data).expect("write data");
    f.flush().expect("flush");
    path
}

/// Write a SER video of jittered planet frames into `dir`.
pub fn write_planet_ser(dir: &Path, name: &str, count: usize) -> PathBuf {
    let frames = to_u8_frames(&planet_frames(count));
    let data = build_ser(WIDTH as u32, HEIGHT as u32, 8, 0, &frames);
    write_file(dir, name, &data)
}
