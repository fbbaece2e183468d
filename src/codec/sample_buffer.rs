//! Raw audio sample payload.

use super::buffer::MediaBuf;
use super::{CodecError, CodecResult};

/// Audio sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioSampleFormat {
    /// Unsigned 8-bit integer samples, interleaved
    U8,
    /// Signed 16-bit integer samples, interleaved
    S16,
    /// Signed 32-bit integer samples, interleaved
    S32,
    /// 32-bit float samples, interleaved
    F32,
    /// Unsigned 8-bit integer samples, planar
    U8Planar,
    /// Signed 16-bit integer samples, planar
    S16Planar,
    /// Signed 32-bit integer samples, planar
    S32Planar,
    /// 32-bit float samples, planar
    F32Planar,
}

impl AudioSampleFormat {
    /// Bytes per sample for this format.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            AudioSampleFormat::U8 | AudioSampleFormat::U8Planar => 1,
            AudioSampleFormat::S16 | AudioSampleFormat::S16Planar => 2,
            AudioSampleFormat::S32
            | AudioSampleFormat::S32Planar
            | AudioSampleFormat::F32
            | AudioSampleFormat::F32Planar => 4,
        }
    }

    /// Whether samples are stored one plane per channel.
    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            AudioSampleFormat::U8Planar
                | AudioSampleFormat::S16Planar
                | AudioSampleFormat::S32Planar
                | AudioSampleFormat::F32Planar
        )
    }

    /// Stable wire tag used by the packet headers.
    pub(crate) fn wire_tag(&self) -> u8 {
        match self {
            AudioSampleFormat::U8 => 0,
            AudioSampleFormat::S16 => 1,
            AudioSampleFormat::S32 => 2,
            AudioSampleFormat::F32 => 3,
            AudioSampleFormat::U8Planar => 4,
            AudioSampleFormat::S16Planar => 5,
            AudioSampleFormat::S32Planar => 6,
            AudioSampleFormat::F32Planar => 7,
        }
    }

    pub(crate) fn from_wire_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => AudioSampleFormat::U8,
            1 => AudioSampleFormat::S16,
            2 => AudioSampleFormat::S32,
            3 => AudioSampleFormat::F32,
            4 => AudioSampleFormat::U8Planar,
            5 => AudioSampleFormat::S16Planar,
            6 => AudioSampleFormat::S32Planar,
            7 => AudioSampleFormat::F32Planar,
            _ => return None,
        })
    }
}

/// A raw block of audio samples.
///
/// Planar formats store `channels` planes of `frames` samples each; interleaved
/// formats store a single plane of `frames * channels` samples. Cloning shares
/// the payload.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    format: AudioSampleFormat,
    sample_rate: u32,
    channels: u32,
    frames: u32,
    pts: i64,
    data: MediaBuf,
}

impl SampleBuffer {
    pub fn from_data(
        format: AudioSampleFormat,
        sample_rate: u32,
        channels: u32,
        frames: u32,
        data: Vec<u8>,
    ) -> CodecResult<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(CodecError::InvalidConfig(format!(
                "invalid audio layout: rate {}, channels {}",
                sample_rate, channels
            )));
        }
        let expected = format.bytes_per_sample() * frames as usize * channels as usize;
        if data.len() < expected {
            return Err(CodecError::InvalidData(format!(
                "sample buffer too small: need {} bytes, got {}",
                expected,
                data.len()
            )));
        }
        let mut data = data;
        data.truncate(expected);
        Ok(Self {
            format,
            sample_rate,
            channels,
            frames,
            pts: 0,
            data: MediaBuf::new(data),
        })
    }

    /// Wrap an existing shared payload without copying.
    pub fn from_buf(
        format: AudioSampleFormat,
        sample_rate: u32,
        channels: u32,
        frames: u32,
        data: MediaBuf,
    ) -> CodecResult<Self> {
        let expected = format.bytes_per_sample() * frames as usize * channels as usize;
        if data.len() < expected {
            return Err(CodecError::InvalidData(format!(
                "sample payload too small: need {} bytes, got {}",
                expected,
                data.len()
            )));
        }
        Ok(Self {
            format,
            sample_rate,
            channels,
            frames,
            pts: 0,
            data,
        })
    }

    pub fn format(&self) -> AudioSampleFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn set_pts(&mut self, pts: i64) {
        self.pts = pts;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn buf(&self) -> &MediaBuf {
        &self.data
    }

    /// Duration of this buffer in microseconds.
    pub fn duration_us(&self) -> i64 {
        (self.frames as i64 * 1_000_000) / self.sample_rate as i64
    }

    /// Byte size of one plane (the whole payload for interleaved formats).
    pub fn plane_size(&self) -> usize {
        if self.format.is_planar() {
            self.format.bytes_per_sample() * self.frames as usize
        } else {
            self.data.len()
        }
    }

    /// Copy one plane into `dst`.
    pub fn copy_plane_to(&self, plane_index: u32, dst: &mut [u8]) -> CodecResult<()> {
        let planes = if self.format.is_planar() { self.channels } else { 1 };
        if plane_index >= planes {
            return Err(CodecError::InvalidData(format!(
                "plane index {} out of range ({} planes)",
                plane_index, planes
            )));
        }
        let size = self.plane_size();
        if dst.len() < size {
            return Err(CodecError::InvalidData(format!(
                "destination too small: need {} bytes, got {}",
                size,
                dst.len()
            )));
        }
        let start = plane_index as usize * size;
        dst[..size].copy_from_slice(&self.data[start..start + size]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_rate() {
        let buf =
            SampleBuffer::from_data(AudioSampleFormat::F32, 48_000, 2, 480, vec![0u8; 480 * 2 * 4])
                .unwrap();
        assert_eq!(buf.duration_us(), 10_000);
    }

    #[test]
    fn test_size_validation() {
        let err = SampleBuffer::from_data(AudioSampleFormat::S16, 44_100, 2, 100, vec![0u8; 10]);
        assert!(err.is_err());
    }

    #[test]
    fn test_copy_plane_planar() {
        let mut data = vec![0u8; 8];
        data[4..].copy_from_slice(&[1, 2, 3, 4]);
        let buf = SampleBuffer::from_data(AudioSampleFormat::S16Planar, 8000, 2, 2, data).unwrap();
        let mut out = [0u8; 4];
        buf.copy_plane_to(1, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        assert!(buf.copy_plane_to(2, &mut out).is_err());
    }
}
