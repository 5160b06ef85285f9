use std::fs::File;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{Result, SaturnError};
use crate::frame::{CfaPattern, ColorFrame, Frame, ImageData};

const SER_HEADER_SIZE: usize = 178;
const SER_MAGIC: &[u8; 14] = b"LUCAM-RECORDER";

/// Pixel layout declared by the SER `ColorID` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerColor {
    Mono,
    Bayer(CfaPattern),
    Rgb,
    Bgr,
}

/// SER file header (178 bytes).
#[derive(Clone, Debug)]
pub struct SerHeader {
    pub color_id: i32,
    pub little_endian: bool,
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
}

impl SerHeader {
    /// Bytes per pixel plane (1 for 8-bit, 2 for 9-16 bit).
    pub fn bytes_per_pixel_plane(&self) -> usize {
        if self.pixel_depth <= 8 { 1 } else { 2 }
    }

    /// Number of planes per pixel (1 for mono/bayer, 3 for RGB/BGR).
    pub fn planes_per_pixel(&self) -> usize {
        match self.color() {
            SerColor::Rgb | SerColor::Bgr => 3,
            SerColor::Mono | SerColor::Bayer(_) => 1,
        }
    }

    /// Total bytes per frame, `None` on overflow.
    pub fn frame_byte_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.bytes_per_pixel_plane() * self.planes_per_pixel())
    }

    pub fn color(&self) -> SerColor {
        match self.color_id {
            8 => SerColor::Bayer(CfaPattern::RGGB),
            9 => SerColor::Bayer(CfaPattern::GRBG),
            10 => SerColor::Bayer(CfaPattern::GBRG),
            11 => SerColor::Bayer(CfaPattern::BGGR),
            100 => SerColor::Rgb,
            101 => SerColor::Bgr,
            _ => SerColor::Mono,
        }
    }
}

/// Memory-mapped SER file reader.
pub struct SerReader {
    mmap: Mmap,
    frame_size: usize,
    pub header: SerHeader,
}

impl SerReader {
    /// Open a SER file and parse its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and the file is not truncated
        // while the reader is alive.
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < SER_HEADER_SIZE {
            return Err(SaturnError::InvalidSer(
                "File too small for SER header".into(),
            ));
        }

        if &mmap[0..14] != SER_MAGIC {
            return Err(SaturnError::InvalidSer(
                "Missing LUCAM-RECORDER magic".into(),
            ));
        }

        let header = parse_header(&mmap[..SER_HEADER_SIZE])?;
        let frame_size = header
            .frame_byte_size()
            .ok_or_else(|| SaturnError::InvalidSer("Frame size overflow".into()))?;

        let expected_data_size = frame_size
            .checked_mul(header.frame_count as usize)
            .and_then(|n| n.checked_add(SER_HEADER_SIZE))
            .ok_or_else(|| SaturnError::InvalidSer("Frame data size overflow".into()))?;
        if mmap.len() < expected_data_size {
            return Err(SaturnError::InvalidSer(format!(
                "File truncated: expected at least {} bytes, got {}",
                expected_data_size,
                mmap.len()
            )));
        }

        Ok(Self {
            mmap,
            frame_size,
            header,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    /// CFA pattern of Bayer recordings.
    pub fn cfa_pattern(&self) -> Option<CfaPattern> {
        match self.header.color() {
            SerColor::Bayer(p) => Some(p),
            _ => None,
        }
    }

    /// Get the raw bytes for a single frame (zero-copy from mmap).
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        let count = self.frame_count();
        if index >= count {
            return Err(SaturnError::FrameIndexOutOfRange {
                index,
                total: count,
            });
        }
        let offset = SER_HEADER_SIZE + index * self.frame_size;
        Ok(&self.mmap[offset..offset + self.frame_size])
    }

    /// Read a single frame, converting to f32 in [0.0, 1.0].
    ///
    /// Mono and Bayer frames are returned as the raw mosaic; RGB/BGR frames
    /// are split into channels.
    pub fn read_frame(&self, index: usize) -> Result<ImageData> {
        let raw = self.frame_raw(index)?;
        let layout = PlaneLayout {
            height: self.header.height as usize,
            width: self.header.width as usize,
            bytes_per_sample: self.header.bytes_per_pixel_plane(),
            planes: self.header.planes_per_pixel(),
            bit_depth: self.header.pixel_depth.clamp(1, 16),
            little_endian: self.header.little_endian,
        };
        let bit_depth = (layout.bytes_per_sample * 8) as u8;

        let image = match self.header.color() {
            SerColor::Mono | SerColor::Bayer(_) => {
                ImageData::Mono(Frame::new(layout.decode(raw, 0), bit_depth))
            }
            SerColor::Rgb | SerColor::Bgr => {
                let (r_idx, b_idx) = if self.header.color() == SerColor::Rgb {
                    (0, 2)
                } else {
                    (2, 0)
                };
                ImageData::Color(ColorFrame {
                    red: Frame::new(layout.decode(raw, r_idx), bit_depth),
                    green: Frame::new(layout.decode(raw, 1), bit_depth),
                    blue: Frame::new(layout.decode(raw, b_idx), bit_depth),
                })
            }
        };
        Ok(image)
    }
}

fn parse_header(buf: &[u8]) -> Result<SerHeader> {
    let mut cursor = std::io::Cursor::new(&buf[14..]); // skip magic

    let _lu_id = cursor.read_i32::<LittleEndian>()?;
    let color_id = cursor.read_i32::<LittleEndian>()?;
    let le_flag = cursor.read_i32::<LittleEndian>()?;
    let width = cursor.read_i32::<LittleEndian>()?;
    let height = cursor.read_i32::<LittleEndian>()?;
    let pixel_depth = cursor.read_i32::<LittleEndian>()? as u32;
    let frame_count = cursor.read_i32::<LittleEndian>()?.max(0) as u32;

    if width <= 0 || height <= 0 {
        return Err(SaturnError::InvalidDimensions {
            width: width.max(0) as u32,
            height: height.max(0) as u32,
        });
    }

    // Many writers store 0 for little-endian data despite the format
    // description; only an explicit 1 selects big-endian.
    let little_endian = le_flag != 1;

    Ok(SerHeader {
        color_id,
        little_endian,
        width: width as u32,
        height: height as u32,
        pixel_depth,
        frame_count,
        observer: read_fixed_string(&buf[42..82]),
        instrument: read_fixed_string(&buf[82..122]),
        telescope: read_fixed_string(&buf[122..162]),
    })
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

struct PlaneLayout {
    height: usize,
    width: usize,
    bytes_per_sample: usize,
    planes: usize,
    bit_depth: u32,
    little_endian: bool,
}

impl PlaneLayout {
    /// Extract one plane from (possibly interleaved) pixel data.
    fn decode(&self, raw: &[u8], plane_index: usize) -> Array2<f32> {
        let max_val = ((1u32 << self.bit_depth) - 1) as f32;
        let bps = self.bytes_per_sample;
        let mut data = Array2::<f32>::zeros((self.height, self.width));

        for row in 0..self.height {
            for col in 0..self.width {
                let idx = ((row * self.width + col) * self.planes + plane_index) * bps;
                let val = if bps == 1 {
                    raw[idx] as f32
                } else {
                    let pair = [raw[idx], raw[idx + 1]];
                    if self.little_endian {
                        u16::from_le_bytes(pair) as f32
                    } else {
                        u16::from_be_bytes(pair) as f32
                    }
                };
                data[[row, col]] = (val / max_val).min(1.0);
            }
        }

        data
    }
}
