//! Raw video frame payload.
//!
//! A `RawFrame` is the immutable pixel payload shared between the WebCodecs
//! `VideoFrame` handles and the codec contexts. The bytes live in a
//! [`MediaBuf`]; cloning a `RawFrame` shares them.

use super::buffer::MediaBuf;
use super::{CodecError, CodecResult};

/// Video pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp (1 Cr & Cb sample per 2x2 Y samples)
    I420,
    /// Planar YUV 4:2:0, 12bpp, with alpha plane
    I420A,
    /// Planar YUV 4:2:2, 16bpp
    I422,
    /// Planar YUV 4:4:4, 24bpp
    I444,
    /// Semi-planar YUV 4:2:0 (Y plane + interleaved UV)
    Nv12,
    /// RGBA 32bpp
    Rgba,
    /// RGBX 32bpp (alpha ignored)
    Rgbx,
    /// BGRA 32bpp
    Bgra,
    /// BGRX 32bpp (alpha ignored)
    Bgrx,
}

impl PixelFormat {
    /// Number of planes for this format.
    pub fn num_planes(&self) -> usize {
        match self {
            PixelFormat::Rgba | PixelFormat::Rgbx | PixelFormat::Bgra | PixelFormat::Bgrx => 1,
            PixelFormat::Nv12 => 2,
            PixelFormat::I420 | PixelFormat::I422 | PixelFormat::I444 => 3,
            PixelFormat::I420A => 4,
        }
    }

    /// Whether the format carries an alpha channel.
    pub fn has_alpha(&self) -> bool {
        matches!(self, PixelFormat::I420A | PixelFormat::Rgba | PixelFormat::Bgra)
    }

    /// Tightly-packed plane layouts for a frame of the given coded size.
    ///
    /// Chroma dimensions round up for odd coded sizes.
    pub fn plane_layouts(&self, width: u32, height: u32) -> Vec<PlaneLayout> {
        let w = width;
        let h = height;
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);
        match self {
            PixelFormat::I420 => {
                let y = w * h;
                let c = cw * ch;
                vec![
                    PlaneLayout { offset: 0, stride: w },
                    PlaneLayout { offset: y, stride: cw },
                    PlaneLayout { offset: y + c, stride: cw },
                ]
            }
            PixelFormat::I420A => {
                let y = w * h;
                let c = cw * ch;
                vec![
                    PlaneLayout { offset: 0, stride: w },
                    PlaneLayout { offset: y, stride: cw },
                    PlaneLayout { offset: y + c, stride: cw },
                    PlaneLayout { offset: y + 2 * c, stride: w },
                ]
            }
            PixelFormat::I422 => {
                let y = w * h;
                let c = cw * h;
                vec![
                    PlaneLayout { offset: 0, stride: w },
                    PlaneLayout { offset: y, stride: cw },
                    PlaneLayout { offset: y + c, stride: cw },
                ]
            }
            PixelFormat::I444 => {
                let p = w * h;
                vec![
                    PlaneLayout { offset: 0, stride: w },
                    PlaneLayout { offset: p, stride: w },
                    PlaneLayout { offset: 2 * p, stride: w },
                ]
            }
            PixelFormat::Nv12 => {
                let y = w * h;
                vec![
                    PlaneLayout { offset: 0, stride: w },
                    PlaneLayout { offset: y, stride: cw * 2 },
                ]
            }
            PixelFormat::Rgba | PixelFormat::Rgbx | PixelFormat::Bgra | PixelFormat::Bgrx => {
                vec![PlaneLayout { offset: 0, stride: w * 4 }]
            }
        }
    }

    /// Stable wire tag used by the packet headers.
    pub(crate) fn wire_tag(&self) -> u8 {
        match self {
            PixelFormat::I420 => 0,
            PixelFormat::I420A => 1,
            PixelFormat::I422 => 2,
            PixelFormat::I444 => 3,
            PixelFormat::Nv12 => 4,
            PixelFormat::Rgba => 5,
            PixelFormat::Rgbx => 6,
            PixelFormat::Bgra => 7,
            PixelFormat::Bgrx => 8,
        }
    }

    pub(crate) fn from_wire_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => PixelFormat::I420,
            1 => PixelFormat::I420A,
            2 => PixelFormat::I422,
            3 => PixelFormat::I444,
            4 => PixelFormat::Nv12,
            5 => PixelFormat::Rgba,
            6 => PixelFormat::Rgbx,
            7 => PixelFormat::Bgra,
            8 => PixelFormat::Bgrx,
            _ => return None,
        })
    }

    /// Total byte size of a tightly-packed frame of the given coded size.
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        let cw = width.div_ceil(2) as usize;
        let ch = height.div_ceil(2) as usize;
        match self {
            PixelFormat::I420 => w * h + 2 * cw * ch,
            PixelFormat::I420A => 2 * w * h + 2 * cw * ch,
            PixelFormat::I422 => w * h + 2 * cw * h,
            PixelFormat::I444 => 3 * w * h,
            PixelFormat::Nv12 => w * h + 2 * cw * ch,
            PixelFormat::Rgba | PixelFormat::Rgbx | PixelFormat::Bgra | PixelFormat::Bgrx => {
                4 * w * h
            }
        }
    }
}

/// Layout information for a single plane: byte offset from the start of the
/// buffer and bytes per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub offset: u32,
    pub stride: u32,
}

/// A raw, tightly-packed video frame.
///
/// Cloning is cheap: the pixel payload is shared, the timing fields are
/// per-clone.
#[derive(Debug, Clone)]
pub struct RawFrame {
    format: PixelFormat,
    width: u32,
    height: u32,
    pts: i64,
    duration: Option<i64>,
    data: MediaBuf,
}

impl RawFrame {
    /// Wrap `data` as a frame, validating the buffer size against the format.
    pub fn from_data(
        format: PixelFormat,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> CodecResult<Self> {
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidConfig(format!(
                "invalid frame size {}x{}",
                width, height
            )));
        }
        let expected = format.buffer_size(width, height);
        if data.len() < expected {
            return Err(CodecError::InvalidData(format!(
                "frame buffer too small: need {} bytes, got {}",
                expected,
                data.len()
            )));
        }
        let mut data = data;
        data.truncate(expected);
        Ok(Self {
            format,
            width,
            height,
            pts: 0,
            duration: None,
            data: MediaBuf::new(data),
        })
    }

    /// Wrap an existing shared payload without copying.
    pub fn from_buf(
        format: PixelFormat,
        width: u32,
        height: u32,
        data: MediaBuf,
    ) -> CodecResult<Self> {
        if data.len() < format.buffer_size(width, height) {
            return Err(CodecError::InvalidData(format!(
                "frame payload too small for {:?} {}x{}",
                format, width, height
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            pts: 0,
            duration: None,
            data,
        })
    }

    /// Allocate a zero-filled frame.
    pub fn black(format: PixelFormat, width: u32, height: u32) -> CodecResult<Self> {
        Self::from_data(format, width, height, vec![0u8; format.buffer_size(width, height)])
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn set_pts(&mut self, pts: i64) {
        self.pts = pts;
    }

    pub fn duration(&self) -> Option<i64> {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Option<i64>) {
        self.duration = duration;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The shared payload behind this frame.
    pub fn buf(&self) -> &MediaBuf {
        &self.data
    }

    /// Plane layouts for this frame's format and coded size.
    pub fn plane_layouts(&self) -> Vec<PlaneLayout> {
        self.format.plane_layouts(self.width, self.height)
    }

    /// Copy the full payload into `dst`. `dst` must be at least as large as
    /// the payload.
    pub fn copy_to_buffer(&self, dst: &mut [u8]) -> CodecResult<()> {
        let src = self.data();
        if dst.len() < src.len() {
            return Err(CodecError::InvalidData(format!(
                "destination too small: need {} bytes, got {}",
                src.len(),
                dst.len()
            )));
        }
        dst[..src.len()].copy_from_slice(src);
        Ok(())
    }
}
