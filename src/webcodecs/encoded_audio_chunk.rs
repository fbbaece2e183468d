//! EncodedAudioChunk and the audio codec configurations.

use crate::codec::MediaBuf;

use super::error::{type_error, WebCodecsError};

/// Type of encoded audio chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedAudioChunkType {
    /// Chunk decodable independently
    Key,
    /// Chunk depending on previous chunks
    Delta,
}

/// Options for creating an EncodedAudioChunk
#[derive(Debug, Clone)]
pub struct EncodedAudioChunkInit {
    /// Chunk type (key or delta)
    pub chunk_type: EncodedAudioChunkType,
    /// Timestamp in microseconds
    pub timestamp: i64,
    /// Duration in microseconds
    pub duration: Option<i64>,
    /// Encoded bytes; copied into the chunk
    pub data: Vec<u8>,
}

/// A chunk of encoded audio data. Immutable after construction; clones share
/// the payload.
#[derive(Clone)]
pub struct EncodedAudioChunk {
    chunk_type: EncodedAudioChunkType,
    timestamp: i64,
    duration: Option<i64>,
    data: MediaBuf,
}

impl EncodedAudioChunk {
    pub fn new(init: EncodedAudioChunkInit) -> Self {
        Self {
            chunk_type: init.chunk_type,
            timestamp: init.timestamp,
            duration: init.duration,
            data: MediaBuf::new(init.data),
        }
    }

    pub(crate) fn from_parts(
        chunk_type: EncodedAudioChunkType,
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

    pub fn chunk_type(&self) -> EncodedAudioChunkType {
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

impl std::fmt::Debug for EncodedAudioChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedAudioChunk")
            .field("type", &self.chunk_type)
            .field("timestamp", &self.timestamp)
            .field("byte_length", &self.byte_length())
            .finish()
    }
}

/// Opus application preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpusApplication {
    /// Optimize for speech
    Voip,
    /// Optimize for general audio (default)
    #[default]
    Audio,
    /// Optimize for latency
    LowDelay,
}

/// Opus-specific encoder options
#[derive(Debug, Clone, Default)]
pub struct OpusEncoderConfig {
    pub application: OpusApplication,
    /// Encoder complexity, 0 to 10
    pub complexity: Option<u32>,
    /// Frame duration in microseconds
    pub frame_duration: Option<u64>,
}

/// AAC bitstream format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AacFormat {
    /// Raw AAC frames, description carried out of band (default)
    #[default]
    Aac,
    /// Self-contained ADTS frames
    Adts,
}

/// AAC-specific encoder options
#[derive(Debug, Clone, Default)]
pub struct AacEncoderConfig {
    pub format: AacFormat,
}

/// Audio encoder configuration
#[derive(Debug, Clone)]
pub struct AudioEncoderConfig {
    /// Codec string (e.g. "opus", "mp4a.40.2")
    pub codec: String,
    /// Samples per second
    pub sample_rate: u32,
    /// Channel count
    pub number_of_channels: u32,
    /// Target bitrate in bits per second
    pub bitrate: Option<u64>,
    /// Opus-specific options
    pub opus: Option<OpusEncoderConfig>,
    /// AAC-specific options
    pub aac: Option<AacEncoderConfig>,
}

impl AudioEncoderConfig {
    pub fn new(codec: impl Into<String>, sample_rate: u32, number_of_channels: u32) -> Self {
        Self {
            codec: codec.into(),
            sample_rate,
            number_of_channels,
            bitrate: None,
            opus: None,
            aac: None,
        }
    }
}

/// Audio decoder configuration
#[derive(Debug, Clone)]
pub struct AudioDecoderConfig {
    /// Codec string
    pub codec: String,
    /// Samples per second
    pub sample_rate: u32,
    /// Channel count
    pub number_of_channels: u32,
    /// Codec configuration blob from the encoder
    pub description: Option<Vec<u8>>,
}

impl AudioDecoderConfig {
    pub fn new(codec: impl Into<String>, sample_rate: u32, number_of_channels: u32) -> Self {
        Self {
            codec: codec.into(),
            sample_rate,
            number_of_channels,
            description: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_metadata() {
        let chunk = EncodedAudioChunk::new(EncodedAudioChunkInit {
            chunk_type: EncodedAudioChunkType::Key,
            timestamp: 42,
            duration: Some(10_000),
            data: vec![5u8; 20],
        });
        assert_eq!(chunk.chunk_type(), EncodedAudioChunkType::Key);
        assert_eq!(chunk.timestamp(), 42);
        assert_eq!(chunk.byte_length(), 20);
    }

    #[test]
    fn test_copy_to_checks_destination() {
        let chunk = EncodedAudioChunk::new(EncodedAudioChunkInit {
            chunk_type: EncodedAudioChunkType::Key,
            timestamp: 0,
            duration: None,
            data: vec![1u8; 10],
        });
        let mut exact = vec![0u8; 10];
        chunk.copy_to(&mut exact).unwrap();
        assert_eq!(exact, vec![1u8; 10]);
        let mut small = vec![0u8; 9];
        assert!(chunk.copy_to(&mut small).is_err());
    }
}
