//! The built-in codec library.
//!
//! This module is the boundary between the WebCodecs surface and the actual
//! codec implementations. `CodecContext` exposes the classic
//! send-frame/receive-packet contract (and its decode mirror) over the
//! software codecs in [`video`] and [`audio`]; [`image`] holds the
//! still/animated image formats the image decoder delegates to. Contexts are
//! single-threaded: a handle must only ever be driven from one thread at a
//! time.

pub mod audio;
pub mod buffer;
pub mod context;
pub mod frame;
pub mod image;
pub mod packet;
pub mod sample_buffer;
pub mod video;

pub use buffer::MediaBuf;
pub use context::{CodecContext, CodecType};
pub use frame::{PixelFormat, PlaneLayout, RawFrame};
pub use packet::Packet;
pub use sample_buffer::{AudioSampleFormat, SampleBuffer};

/// Identifiers for the codecs the library knows about.
///
/// Knowing about a codec does not imply an implementation exists for it;
/// `CodecContext` creation reports `EncoderNotFound`/`DecoderNotFound` for
/// identifiers without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    // Video
    H264,
    Hevc,
    Vp8,
    Vp9,
    Av1,
    // Audio
    Opus,
    Aac,
    Flac,
    Vorbis,
    Pcm,
}

impl CodecId {
    /// Whether this identifier names a video codec.
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            CodecId::H264 | CodecId::Hevc | CodecId::Vp8 | CodecId::Vp9 | CodecId::Av1
        )
    }

    /// Whether this identifier names an audio codec.
    pub fn is_audio(&self) -> bool {
        !self.is_video()
    }
}

/// Video encoder configuration
#[derive(Debug, Clone)]
pub struct VideoEncoderSettings {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format of submitted frames
    pub pixel_format: PixelFormat,
    /// Target bitrate in bits per second (rate-control hint)
    pub bitrate: u64,
    /// Frames per second (numerator)
    pub framerate_num: u32,
    /// Frames per second (denominator)
    pub framerate_den: u32,
    /// Group of pictures size (keyframe interval)
    pub gop_size: u32,
}

impl Default for VideoEncoderSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            pixel_format: PixelFormat::I420,
            bitrate: 5_000_000, // 5 Mbps
            framerate_num: 30,
            framerate_den: 1,
            gop_size: 60, // 2 seconds at 30fps
        }
    }
}

/// Video decoder configuration
#[derive(Debug, Clone, Default)]
pub struct VideoDecoderSettings {
    /// Codec configuration blob emitted by the matching encoder
    pub description: Option<Vec<u8>>,
}

/// Audio encoder configuration
#[derive(Debug, Clone)]
pub struct AudioEncoderSettings {
    /// Samples per second
    pub sample_rate: u32,
    /// Channel count
    pub channels: u32,
    /// Sample format of submitted buffers
    pub sample_format: AudioSampleFormat,
    /// Target bitrate in bits per second (rate-control hint)
    pub bitrate: Option<u64>,
}

impl Default for AudioEncoderSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            sample_format: AudioSampleFormat::F32,
            bitrate: None,
        }
    }
}

/// Audio decoder configuration
#[derive(Debug, Clone, Default)]
pub struct AudioDecoderSettings {
    /// Codec configuration blob emitted by the matching encoder
    pub description: Option<Vec<u8>>,
}

/// Codec error type
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Encoder not found for codec: {0:?}")]
    EncoderNotFound(CodecId),

    #[error("Decoder not found for codec: {0:?}")]
    DecoderNotFound(CodecId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Codec not configured")]
    NotConfigured,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Unsupported pixel format: {0:?}")]
    UnsupportedPixelFormat(PixelFormat),

    #[error("Unsupported image type: {0}")]
    UnsupportedImage(String),
}

pub type CodecResult<T> = Result<T, CodecError>;
