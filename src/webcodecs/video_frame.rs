//! VideoFrame media resource.
//!
//! A `VideoFrame` is a handle onto a shared, immutable pixel payload
//! ([`RawFrame`]) plus per-handle presentation metadata. Handles are cloned
//! cheaply (the payload is reference counted) and closed independently; the
//! payload's buffers are released when the last handle drops.

use std::sync::Mutex;

use crate::codec::{PixelFormat, PlaneLayout, RawFrame};

use super::error::{invalid_state_error, type_error, WebCodecsError};

/// Video pixel format (the codec library's pixel format vocabulary).
pub use crate::codec::PixelFormat as VideoPixelFormat;

/// Video color primaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoColorPrimaries {
    /// BT.709 / sRGB primaries
    Bt709,
    /// BT.470 BG (PAL)
    Bt470bg,
    /// SMPTE 170M (NTSC)
    Smpte170m,
    /// BT.2020 (UHD)
    Bt2020,
}

/// Video transfer characteristics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoTransferCharacteristics {
    /// BT.709 transfer
    Bt709,
    /// SMPTE 170M transfer
    Smpte170m,
    /// sRGB transfer
    Srgb,
    /// Linear transfer
    Linear,
    /// Perceptual Quantizer (HDR)
    Pq,
    /// Hybrid Log-Gamma (HDR)
    Hlg,
}

/// Video matrix coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoMatrixCoefficients {
    /// RGB (identity matrix)
    Rgb,
    /// BT.709
    Bt709,
    /// BT.470 BG
    Bt470bg,
    /// SMPTE 170M
    Smpte170m,
    /// BT.2020 non-constant luminance
    Bt2020Ncl,
}

/// Video color space parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoColorSpace {
    pub primaries: Option<VideoColorPrimaries>,
    pub transfer: Option<VideoTransferCharacteristics>,
    pub matrix: Option<VideoMatrixCoefficients>,
    pub full_range: Option<bool>,
}

impl VideoColorSpace {
    /// The BT.709 video color space.
    pub fn rec709() -> Self {
        Self {
            primaries: Some(VideoColorPrimaries::Bt709),
            transfer: Some(VideoTransferCharacteristics::Bt709),
            matrix: Some(VideoMatrixCoefficients::Bt709),
            full_range: Some(false),
        }
    }

    /// The sRGB color space used for RGBA frames.
    pub fn srgb() -> Self {
        Self {
            primaries: Some(VideoColorPrimaries::Bt709),
            transfer: Some(VideoTransferCharacteristics::Srgb),
            matrix: Some(VideoMatrixCoefficients::Rgb),
            full_range: Some(true),
        }
    }
}

/// Rectangle for specifying a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFrameRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Options for creating a VideoFrame from raw buffer data
#[derive(Debug, Clone)]
pub struct VideoFrameBufferInit {
    /// Pixel format (required)
    pub format: VideoPixelFormat,
    /// Coded width in pixels (required)
    pub coded_width: u32,
    /// Coded height in pixels (required)
    pub coded_height: u32,
    /// Timestamp in microseconds (required)
    pub timestamp: i64,
    /// Duration in microseconds
    pub duration: Option<i64>,
    /// Visible rect within the coded size (defaults to the full coded size)
    pub visible_rect: Option<VideoFrameRect>,
    /// Rotation in degrees clockwise, rounded to the nearest quarter turn
    pub rotation: f64,
    /// Horizontal flip
    pub flip: bool,
    /// Display width (defaults to the visible width, swapped for 90/270)
    pub display_width: Option<u32>,
    /// Display height (defaults to the visible height, swapped for 90/270)
    pub display_height: Option<u32>,
    /// Color space parameters
    pub color_space: Option<VideoColorSpace>,
}

impl VideoFrameBufferInit {
    pub fn new(format: VideoPixelFormat, coded_width: u32, coded_height: u32, timestamp: i64) -> Self {
        Self {
            format,
            coded_width,
            coded_height,
            timestamp,
            duration: None,
            visible_rect: None,
            rotation: 0.0,
            flip: false,
            display_width: None,
            display_height: None,
            color_space: None,
        }
    }
}

/// Round to the nearest quarter turn and normalize into 0..360.
fn parse_rotation(rotation: f64) -> u32 {
    let aligned = (rotation / 90.0).round() * 90.0;
    let full_turns = (aligned / 360.0).floor() * 360.0;
    (aligned - full_turns) as u32
}

struct VideoFrameInner {
    frame: RawFrame,
    timestamp: i64,
    duration: Option<i64>,
    visible_rect: VideoFrameRect,
    display_width: u32,
    display_height: u32,
    /// Rotation in degrees clockwise (0, 90, 180, 270)
    rotation: u32,
    flip: bool,
    color_space: VideoColorSpace,
}

/// A frame of video: shared pixel payload, per-handle metadata.
pub struct VideoFrame {
    inner: Mutex<Option<VideoFrameInner>>,
}

impl VideoFrame {
    /// Create a VideoFrame from raw pixel data. The data is copied.
    pub fn from_buffer(data: &[u8], init: VideoFrameBufferInit) -> Result<Self, WebCodecsError> {
        if init.coded_width == 0 || init.coded_height == 0 {
            return Err(type_error("codedWidth and codedHeight must be greater than 0"));
        }
        let expected = init.format.buffer_size(init.coded_width, init.coded_height);
        if data.len() < expected {
            return Err(type_error(format!(
                "buffer too small: need {} bytes, got {}",
                expected,
                data.len()
            )));
        }
        if let Some(rect) = &init.visible_rect {
            if rect.x + rect.width > init.coded_width || rect.y + rect.height > init.coded_height {
                return Err(type_error("visibleRect exceeds the coded size"));
            }
            if rect.width == 0 || rect.height == 0 {
                return Err(type_error("visibleRect must not be empty"));
            }
        }

        let mut frame = RawFrame::from_data(
            init.format,
            init.coded_width,
            init.coded_height,
            data[..expected].to_vec(),
        )
        .map_err(|e| type_error(e.to_string()))?;
        frame.set_pts(init.timestamp);
        frame.set_duration(init.duration);

        Ok(Self::assemble(frame, init))
    }

    fn assemble(frame: RawFrame, init: VideoFrameBufferInit) -> Self {
        let visible_rect = init.visible_rect.unwrap_or(VideoFrameRect {
            x: 0,
            y: 0,
            width: frame.width(),
            height: frame.height(),
        });
        let rotation = parse_rotation(init.rotation);
        let quarter_turned = rotation == 90 || rotation == 270;
        let display_width = init.display_width.unwrap_or(if quarter_turned {
            visible_rect.height
        } else {
            visible_rect.width
        });
        let display_height = init.display_height.unwrap_or(if quarter_turned {
            visible_rect.width
        } else {
            visible_rect.height
        });

        Self {
            inner: Mutex::new(Some(VideoFrameInner {
                timestamp: init.timestamp,
                duration: init.duration,
                visible_rect,
                display_width,
                display_height,
                rotation,
                flip: init.flip,
                color_space: init.color_space.unwrap_or_default(),
                frame,
            })),
        }
    }

    /// Wrap a decoded payload (decoder and image decoder output).
    pub(crate) fn from_raw(frame: RawFrame, color_space: VideoColorSpace) -> Self {
        let mut init =
            VideoFrameBufferInit::new(frame.format(), frame.width(), frame.height(), frame.pts());
        init.duration = frame.duration();
        init.color_space = Some(color_space);
        Self::assemble(frame, init)
    }

    fn with_inner<T>(
        &self,
        f: impl FnOnce(&VideoFrameInner) -> T,
    ) -> Result<T, WebCodecsError> {
        let guard = self.inner.lock().expect("frame handle poisoned");
        match guard.as_ref() {
            Some(inner) => Ok(f(inner)),
            None => Err(invalid_state_error("VideoFrame is closed")),
        }
    }

    /// Pixel format, or `None` once closed.
    pub fn format(&self) -> Option<VideoPixelFormat> {
        self.with_inner(|i| i.frame.format()).ok()
    }

    /// Coded width in pixels (0 once closed).
    pub fn coded_width(&self) -> u32 {
        self.with_inner(|i| i.frame.width()).unwrap_or(0)
    }

    /// Coded height in pixels (0 once closed).
    pub fn coded_height(&self) -> u32 {
        self.with_inner(|i| i.frame.height()).unwrap_or(0)
    }

    /// The rectangle of coded pixel data.
    pub fn coded_rect(&self) -> Result<VideoFrameRect, WebCodecsError> {
        self.with_inner(|i| VideoFrameRect {
            x: 0,
            y: 0,
            width: i.frame.width(),
            height: i.frame.height(),
        })
    }

    /// The rectangle of pixels intended for display.
    pub fn visible_rect(&self) -> Result<VideoFrameRect, WebCodecsError> {
        self.with_inner(|i| i.visible_rect)
    }

    /// Display width in pixels (0 once closed).
    pub fn display_width(&self) -> u32 {
        self.with_inner(|i| i.display_width).unwrap_or(0)
    }

    /// Display height in pixels (0 once closed).
    pub fn display_height(&self) -> u32 {
        self.with_inner(|i| i.display_height).unwrap_or(0)
    }

    /// Presentation timestamp in microseconds (0 once closed).
    pub fn timestamp(&self) -> i64 {
        self.with_inner(|i| i.timestamp).unwrap_or(0)
    }

    /// Duration in microseconds.
    pub fn duration(&self) -> Option<i64> {
        self.with_inner(|i| i.duration).ok().flatten()
    }

    /// Rotation in degrees clockwise: 0, 90, 180 or 270.
    pub fn rotation(&self) -> u32 {
        self.with_inner(|i| i.rotation).unwrap_or(0)
    }

    /// Whether a horizontal flip applies before rotation.
    pub fn flip(&self) -> bool {
        self.with_inner(|i| i.flip).unwrap_or(false)
    }

    pub fn color_space(&self) -> Result<VideoColorSpace, WebCodecsError> {
        self.with_inner(|i| i.color_space.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("frame handle poisoned").is_none()
    }

    /// Byte size a `copy_to` destination must have.
    pub fn allocation_size(&self) -> Result<usize, WebCodecsError> {
        self.with_inner(|i| i.frame.data().len())
    }

    /// Copy the pixel payload into `destination` and describe its planes.
    pub fn copy_to(&self, destination: &mut [u8]) -> Result<Vec<PlaneLayout>, WebCodecsError> {
        let guard = self.inner.lock().expect("frame handle poisoned");
        let inner = guard
            .as_ref()
            .ok_or_else(|| invalid_state_error("VideoFrame is closed"))?;
        let src = inner.frame.data();
        if destination.len() < src.len() {
            return Err(type_error(format!(
                "destination buffer too small: need {} bytes, got {}",
                src.len(),
                destination.len()
            )));
        }
        destination[..src.len()].copy_from_slice(src);
        Ok(inner.frame.plane_layouts())
    }

    /// Create another handle sharing this frame's payload.
    pub fn try_clone(&self) -> Result<VideoFrame, WebCodecsError> {
        self.with_inner(|i| VideoFrame {
            inner: Mutex::new(Some(VideoFrameInner {
                frame: i.frame.clone(),
                timestamp: i.timestamp,
                duration: i.duration,
                visible_rect: i.visible_rect,
                display_width: i.display_width,
                display_height: i.display_height,
                rotation: i.rotation,
                flip: i.flip,
                color_space: i.color_space.clone(),
            })),
        })
    }

    /// Move this handle across a boundary: produces an equivalent handle and
    /// closes this one.
    pub fn transfer(&self) -> Result<VideoFrame, WebCodecsError> {
        let transferred = self.try_clone()?;
        self.close();
        Ok(transferred)
    }

    /// Drop this handle's reference to the payload. Idempotent.
    pub fn close(&self) {
        self.inner.lock().expect("frame handle poisoned").take();
    }

    /// Payload snapshot for the encoder worker, with this handle's timing.
    pub(crate) fn snapshot(&self) -> Result<RawFrame, WebCodecsError> {
        self.with_inner(|i| {
            let mut raw = i.frame.clone();
            raw.set_pts(i.timestamp);
            raw.set_duration(i.duration);
            raw
        })
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("format", &self.format())
            .field("coded_width", &self.coded_width())
            .field("coded_height", &self.coded_height())
            .field("timestamp", &self.timestamp())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::buffer::live_buffer_count;

    fn rgba_frame(width: u32, height: u32, timestamp: i64) -> VideoFrame {
        let data = vec![128u8; (width * height * 4) as usize];
        VideoFrame::from_buffer(
            &data,
            VideoFrameBufferInit::new(PixelFormat::Rgba, width, height, timestamp),
        )
        .unwrap()
    }

    #[test]
    fn test_buffer_too_small_is_type_error() {
        let err = VideoFrame::from_buffer(
            &[0u8; 10],
            VideoFrameBufferInit::new(PixelFormat::Rgba, 4, 4, 0),
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::webcodecs::error::ErrorKind::Type);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let err = VideoFrame::from_buffer(
            &[0u8; 16],
            VideoFrameBufferInit::new(PixelFormat::Rgba, 0, 4, 0),
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::webcodecs::error::ErrorKind::Type);
    }

    #[test]
    fn test_close_is_idempotent_and_invalidates_data_ops() {
        let frame = rgba_frame(4, 4, 1000);
        frame.close();
        frame.close();
        assert!(frame.is_closed());
        assert_eq!(frame.coded_width(), 0);
        assert!(frame.format().is_none());
        let mut buf = vec![0u8; 64];
        assert!(frame.copy_to(&mut buf).is_err());
        assert!(frame.try_clone().is_err());
    }

    #[test]
    fn test_clone_shares_payload_until_last_close() {
        let baseline = live_buffer_count();
        let frame = rgba_frame(8, 8, 0);
        assert_eq!(live_buffer_count(), baseline + 1);

        let clones: Vec<VideoFrame> = (0..5).map(|_| frame.try_clone().unwrap()).collect();
        assert_eq!(live_buffer_count(), baseline + 1);

        // Closing all but one handle keeps the payload live.
        frame.close();
        for clone in &clones[..4] {
            clone.close();
        }
        assert_eq!(live_buffer_count(), baseline + 1);
        assert_eq!(clones[4].coded_width(), 8);

        clones[4].close();
        assert_eq!(live_buffer_count(), baseline);
    }

    #[test]
    fn test_many_frames_release_memory() {
        let baseline = live_buffer_count();
        for i in 0..1000 {
            let frame = rgba_frame(320, 240, i);
            frame.close();
        }
        assert_eq!(live_buffer_count(), baseline);
    }

    #[test]
    fn test_transfer_closes_source() {
        let frame = rgba_frame(4, 4, 77);
        let moved = frame.transfer().unwrap();
        assert!(frame.is_closed());
        assert_eq!(moved.timestamp(), 77);
        assert_eq!(moved.coded_width(), 4);
        assert!(frame.transfer().is_err());
        moved.close();
    }

    #[test]
    fn test_rotation_parsing_and_display_swap() {
        let data = vec![0u8; 6 * 4 * 4];
        let mut init = VideoFrameBufferInit::new(PixelFormat::Rgba, 6, 4, 0);
        init.rotation = 450.0; // rounds into a quarter turn
        let frame = VideoFrame::from_buffer(&data, init).unwrap();
        assert_eq!(frame.rotation(), 90);
        assert_eq!(frame.display_width(), 4);
        assert_eq!(frame.display_height(), 6);
        frame.close();
    }

    #[test]
    fn test_copy_to_roundtrip() {
        let data: Vec<u8> = (0..4 * 2 * 4).map(|i| i as u8).collect();
        let frame = VideoFrame::from_buffer(
            &data,
            VideoFrameBufferInit::new(PixelFormat::Rgba, 4, 2, 0),
        )
        .unwrap();
        let mut out = vec![0u8; frame.allocation_size().unwrap()];
        let layouts = frame.copy_to(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].stride, 16);
        frame.close();
    }
}
