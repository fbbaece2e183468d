//! EncodedVideoChunk and the video codec configurations.

use crate::codec::MediaBuf;

use super::error::{type_error, WebCodecsError};
use super::video_frame::VideoColorSpace;

/// Type of encoded video chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedVideoChunkType {
    /// Keyframe, decodable independently
    Key,
    /// Delta frame, depends on previous frames
    Delta,
}

/// Hardware acceleration preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareAcceleration {
    /// No preference, may use hardware or software
    #[default]
    NoPreference,
    /// Prefer hardware acceleration
    PreferHardware,
    /// Prefer software implementation
    PreferSoftware,
}

/// Latency mode for video encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatencyMode {
    /// Optimize for quality (default)
    #[default]
    Quality,
    /// Optimize for low latency
    Realtime,
}

/// Bitrate mode for encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitrateMode {
    /// Variable bitrate (default)
    #[default]
    Variable,
    /// Constant bitrate
    Constant,
    /// Use quantizer parameters from codec-specific options
    Quantizer,
}

/// Alpha channel handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaOption {
    /// Keep the alpha channel if present
    Keep,
    /// Discard the alpha channel (default)
    #[default]
    Discard,
}

/// Options for creating an EncodedVideoChunk
#[derive(Debug, Clone)]
pub struct EncodedVideoChunkInit {
    /// Chunk type (key or delta)
    pub chunk_type: EncodedVideoChunkType,
    /// Timestamp in microseconds
    pub timestamp: i64,
    /// Duration in microseconds
    pub duration: Option<i64>,
    /// Encoded bytes; copied into the chunk
    pub data: Vec<u8>,
}

/// A chunk of encoded video data. Immutable after construction; clones share
/// the payload.
#[derive(Clone)]
pub struct EncodedVideoChunk {
    chunk_type: EncodedVideoChunkType,
    timestamp: i64,
    duration: Option<i64>,
    data: MediaBuf,
}

impl EncodedVideoChunk {
    pub fn new(init: EncodedVideoChunkInit) -> Self {
        Self {
            chunk_type: init.chunk_type,
            timestamp: init.timestamp,
            duration: init.duration,
            data: MediaBuf::new(init.data),
        }
    }

    pub(crate) fn from_parts(
        chunk_type: EncodedVideoChunkType,
        timestamp: i64,
        duration: Option<i64>,
        data: MediaBuf,
    ) -> Self {
        Self {
            chunk_type,
            timestamp,
            duration,
            data,
        }
    }

    pub fn chunk_type(&self) -> EncodedVideoChunkType {
        self.chunk_type
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn duration(&self) -> Option<i64> {
        self.duration
    }

    pub fn byte_length(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn payload(&self) -> &MediaBuf {
        &self.data
    }

    /// Copy the encoded bytes into `destination`.
    pub fn copy_to(&self, destination: &mut [u8]) -> Result<(), WebCodecsError> {
        if destination.len() < self.data.len() {
            return Err(type_error(format!(
                "destination buffer too small: need {} bytes, got {}",
                self.data.len(),
                destination.len()
            )));
        }
        destination[..self.data.len()].copy_from_slice(&self.data);
        Ok(())
    }
}

impl std::fmt::Debug for EncodedVideoChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedVideoChunk")
            .field("type", &self.chunk_type)
            .field("timestamp", &self.timestamp)
            .field("byte_length", &self.byte_length())
            .finish()
    }
}

/// Video encoder configuration
#[derive(Debug, Clone)]
pub struct VideoEncoderConfig {
    /// Codec string (e.g. "avc1.42001E", "vp8")
    pub codec: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Display width, if different from the coded width
    pub display_width: Option<u32>,
    /// Display height, if different from the coded height
    pub display_height: Option<u32>,
    /// Target bitrate in bits per second
    pub bitrate: Option<u64>,
    /// Bitrate mode
    pub bitrate_mode: BitrateMode,
    /// Expected frames per second
    pub framerate: Option<f64>,
    /// Hardware acceleration preference
    pub hardware_acceleration: HardwareAcceleration,
    /// Latency mode
    pub latency_mode: LatencyMode,
    /// Scalability mode (e.g. "L1T1", "L1T3")
    pub scalability_mode: Option<String>,
    /// Alpha handling
    pub alpha: AlphaOption,
}

impl VideoEncoderConfig {
    pub fn new(codec: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            codec: codec.into(),
            width,
            height,
            display_width: None,
            display_height: None,
            bitrate: None,
            bitrate_mode: BitrateMode::default(),
            framerate: None,
            hardware_acceleration: HardwareAcceleration::default(),
            latency_mode: LatencyMode::default(),
            scalability_mode: None,
            alpha: AlphaOption::default(),
        }
    }
}

/// Video decoder configuration
#[derive(Debug, Clone)]
pub struct VideoDecoderConfig {
    /// Codec string
    pub codec: String,
    /// Coded width in pixels
    pub coded_width: Option<u32>,
    /// Coded height in pixels
    pub coded_height: Option<u32>,
    /// Codec configuration blob from the encoder
    pub description: Option<Vec<u8>>,
    /// Color space override for decoded frames
    pub color_space: Option<VideoColorSpace>,
    /// Hardware acceleration preference
    pub hardware_acceleration: HardwareAcceleration,
    /// Prefer lower latency over throughput
    pub optimize_for_latency: Option<bool>,
}

impl VideoDecoderConfig {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
            coded_width: None,
            coded_height: None,
            description: None,
            color_space: None,
            hardware_acceleration: HardwareAcceleration::default(),
            optimize_for_latency: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webcodecs::error::ErrorKind;

    #[test]
    fn test_chunk_owns_an_independent_copy() {
        let mut source = vec![1u8, 2, 3, 4];
        let chunk = EncodedVideoChunk::new(EncodedVideoChunkInit {
            chunk_type: EncodedVideoChunkType::Key,
            timestamp: 0,
            duration: None,
            data: source.clone(),
        });
        source[0] = 99;
        let mut out = vec![0u8; 4];
        chunk.copy_to(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_copy_to_small_destination_fails() {
        let chunk = EncodedVideoChunk::new(EncodedVideoChunkInit {
            chunk_type: EncodedVideoChunkType::Delta,
            timestamp: 5,
            duration: Some(10),
            data: vec![0u8; 16],
        });
        let mut out = vec![0u8; 8];
        assert_eq!(chunk.copy_to(&mut out).unwrap_err().kind(), ErrorKind::Type);
    }

    #[test]
    fn test_config_clone_is_deep() {
        let mut config = VideoDecoderConfig::new("vp8");
        config.description = Some(vec![1, 2, 3]);
        let cloned = config.clone();
        config.description.as_mut().unwrap()[0] = 9;
        assert_eq!(cloned.description.unwrap(), vec![1, 2, 3]);
    }
}
