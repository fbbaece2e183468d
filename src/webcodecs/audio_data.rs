//! AudioData media resource.
//!
//! The audio counterpart of `VideoFrame`: a handle onto a shared, immutable
//! sample payload ([`SampleBuffer`]) with the same clone/close/transfer
//! contract.

use std::sync::Mutex;

use crate::codec::SampleBuffer;

use super::error::{invalid_state_error, type_error, WebCodecsError};

/// Audio sample format (the codec library's sample format vocabulary).
pub use crate::codec::AudioSampleFormat;

/// Options for creating AudioData from raw sample bytes
#[derive(Debug, Clone)]
pub struct AudioDataInit {
    /// Sample format (required)
    pub format: AudioSampleFormat,
    /// Samples per second (required)
    pub sample_rate: u32,
    /// Frames per channel (required)
    pub number_of_frames: u32,
    /// Channel count (required)
    pub number_of_channels: u32,
    /// Timestamp in microseconds (required)
    pub timestamp: i64,
}

struct AudioDataInner {
    buffer: SampleBuffer,
    timestamp: i64,
}

/// A block of uncompressed audio: shared sample payload, per-handle metadata.
pub struct AudioData {
    inner: Mutex<Option<AudioDataInner>>,
}

impl AudioData {
    /// Create AudioData from raw sample bytes. The data is copied.
    pub fn from_buffer(data: &[u8], init: AudioDataInit) -> Result<Self, WebCodecsError> {
        if init.number_of_frames == 0 || init.number_of_channels == 0 {
            return Err(type_error(
                "numberOfFrames and numberOfChannels must be greater than 0",
            ));
        }
        if init.sample_rate == 0 {
            return Err(type_error("sampleRate must be greater than 0"));
        }
        let mut buffer = SampleBuffer::from_data(
            init.format,
            init.sample_rate,
            init.number_of_channels,
            init.number_of_frames,
            data.to_vec(),
        )
        .map_err(|e| type_error(e.to_string()))?;
        buffer.set_pts(init.timestamp);
        Ok(Self {
            inner: Mutex::new(Some(AudioDataInner {
                timestamp: init.timestamp,
                buffer,
            })),
        })
    }

    /// Wrap a decoded payload (decoder output).
    pub(crate) fn from_raw(buffer: SampleBuffer) -> Self {
        Self {
            inner: Mutex::new(Some(AudioDataInner {
                timestamp: buffer.pts(),
                buffer,
            })),
        }
    }

    fn with_inner<T>(&self, f: impl FnOnce(&AudioDataInner) -> T) -> Result<T, WebCodecsError> {
        let guard = self.inner.lock().expect("audio handle poisoned");
        match guard.as_ref() {
            Some(inner) => Ok(f(inner)),
            None => Err(invalid_state_error("AudioData is closed")),
        }
    }

    /// Sample format, or `None` once closed.
    pub fn format(&self) -> Option<AudioSampleFormat> {
        self.with_inner(|i| i.buffer.format()).ok()
    }

    /// Samples per second (0 once closed).
    pub fn sample_rate(&self) -> u32 {
        self.with_inner(|i| i.buffer.sample_rate()).unwrap_or(0)
    }

    /// Frames per channel (0 once closed).
    pub fn number_of_frames(&self) -> u32 {
        self.with_inner(|i| i.buffer.frames()).unwrap_or(0)
    }

    /// Channel count (0 once closed).
    pub fn number_of_channels(&self) -> u32 {
        self.with_inner(|i| i.buffer.channels()).unwrap_or(0)
    }

    /// Presentation timestamp in microseconds (0 once closed).
    pub fn timestamp(&self) -> i64 {
        self.with_inner(|i| i.timestamp).unwrap_or(0)
    }

    /// Duration in microseconds, computed from frames and sample rate.
    pub fn duration(&self) -> i64 {
        self.with_inner(|i| i.buffer.duration_us()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("audio handle poisoned").is_none()
    }

    /// Byte size a `copy_to` destination for `plane_index` must have.
    pub fn allocation_size(&self, plane_index: u32) -> Result<usize, WebCodecsError> {
        self.with_inner(|i| {
            let planes = if i.buffer.format().is_planar() {
                i.buffer.channels()
            } else {
                1
            };
            if plane_index >= planes {
                Err(range_check_error(plane_index, planes))
            } else {
                Ok(i.buffer.plane_size())
            }
        })?
    }

    /// Copy one plane of samples into `destination`.
    pub fn copy_to(&self, destination: &mut [u8], plane_index: u32) -> Result<(), WebCodecsError> {
        let guard = self.inner.lock().expect("audio handle poisoned");
        let inner = guard
            .as_ref()
            .ok_or_else(|| invalid_state_error("AudioData is closed"))?;
        inner
            .buffer
            .copy_plane_to(plane_index, destination)
            .map_err(|e| type_error(e.to_string()))
    }

    /// Create another handle sharing this payload.
    pub fn try_clone(&self) -> Result<AudioData, WebCodecsError> {
        self.with_inner(|i| AudioData {
            inner: Mutex::new(Some(AudioDataInner {
                buffer: i.buffer.clone(),
                timestamp: i.timestamp,
            })),
        })
    }

    /// Move this handle across a boundary: produces an equivalent handle and
    /// closes this one.
    pub fn transfer(&self) -> Result<AudioData, WebCodecsError> {
        let transferred = self.try_clone()?;
        self.close();
        Ok(transferred)
    }

    /// Drop this handle's reference to the payload. Idempotent.
    pub fn close(&self) {
        self.inner.lock().expect("audio handle poisoned").take();
    }

    /// Payload snapshot for the encoder worker, with this handle's timing.
    pub(crate) fn snapshot(&self) -> Result<SampleBuffer, WebCodecsError> {
        self.with_inner(|i| {
            let mut raw = i.buffer.clone();
            raw.set_pts(i.timestamp);
            raw
        })
    }
}

fn range_check_error(plane_index: u32, planes: u32) -> WebCodecsError {
    super::error::range_error(format!(
        "plane index {} out of range ({} planes)",
        plane_index, planes
    ))
}

impl std::fmt::Debug for AudioData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioData")
            .field("format", &self.format())
            .field("sample_rate", &self.sample_rate())
            .field("frames", &self.number_of_frames())
            .field("channels", &self.number_of_channels())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_audio(frames: u32, channels: u32) -> AudioData {
        let data = vec![0u8; (frames * channels * 4) as usize];
        AudioData::from_buffer(
            &data,
            AudioDataInit {
                format: AudioSampleFormat::F32,
                sample_rate: 48_000,
                number_of_frames: frames,
                number_of_channels: channels,
                timestamp: 0,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_duration_is_computed() {
        let audio = f32_audio(24_000, 2);
        assert_eq!(audio.duration(), 500_000);
        audio.close();
    }

    #[test]
    fn test_close_invalidates_and_is_idempotent() {
        let audio = f32_audio(100, 1);
        audio.close();
        audio.close();
        assert!(audio.is_closed());
        assert_eq!(audio.sample_rate(), 0);
        let mut out = vec![0u8; 400];
        assert!(audio.copy_to(&mut out, 0).is_err());
        assert!(audio.try_clone().is_err());
    }

    #[test]
    fn test_clone_then_transfer() {
        let audio = f32_audio(10, 2);
        let clone = audio.try_clone().unwrap();
        let moved = clone.transfer().unwrap();
        assert!(clone.is_closed());
        assert_eq!(moved.number_of_frames(), 10);
        audio.close();
        moved.close();
    }

    #[test]
    fn test_interleaved_has_single_plane() {
        let audio = f32_audio(8, 2);
        assert_eq!(audio.allocation_size(0).unwrap(), 8 * 2 * 4);
        assert!(audio.allocation_size(1).is_err());
        audio.close();
    }
}
