//! Software audio codec.
//!
//! A block passthrough codec: each submitted sample buffer becomes one
//! self-contained packet carrying the raw samples, so every packet is a key
//! packet. The header mirrors the video bitstream's self-describing shape.
//!
//! Bitstream layout, little-endian:
//!
//! ```text
//! packet:      "WA" | version u8 | format u8 | rate u32 | channels u8
//!              | frames u32 | raw samples
//! description: "WAC0" | format u8 | rate u32 | channels u8
//! ```

use std::collections::VecDeque;

use super::packet::Packet;
use super::sample_buffer::{AudioSampleFormat, SampleBuffer};
use super::{AudioDecoderSettings, AudioEncoderSettings, CodecError, CodecResult};

const PACKET_MAGIC: &[u8; 2] = b"WA";
const DESCRIPTION_MAGIC: &[u8; 4] = b"WAC0";
const BITSTREAM_VERSION: u8 = 1;
const PACKET_HEADER_LEN: usize = 13;

/// Serialize the out-of-band decoder description for a stream.
pub fn encode_description(format: AudioSampleFormat, sample_rate: u32, channels: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    out.extend_from_slice(DESCRIPTION_MAGIC);
    out.push(format.wire_tag());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.push(channels as u8);
    out
}

/// Parse a decoder description blob.
pub fn parse_description(blob: &[u8]) -> CodecResult<(AudioSampleFormat, u32, u32)> {
    if blob.len() < 10 || &blob[..4] != DESCRIPTION_MAGIC {
        return Err(CodecError::InvalidConfig(
            "unrecognized codec description".into(),
        ));
    }
    let format = AudioSampleFormat::from_wire_tag(blob[4])
        .ok_or_else(|| CodecError::InvalidConfig("unknown sample format in description".into()))?;
    let rate = u32::from_le_bytes([blob[5], blob[6], blob[7], blob[8]]);
    Ok((format, rate, blob[9] as u32))
}

/// Software audio encoder state.
pub struct BlockAudioEncoder {
    settings: AudioEncoderSettings,
    pending: VecDeque<Packet>,
}

impl BlockAudioEncoder {
    pub fn new(settings: &AudioEncoderSettings) -> CodecResult<Self> {
        if settings.sample_rate == 0 {
            return Err(CodecError::InvalidConfig("sample rate must be non-zero".into()));
        }
        if settings.channels == 0 || settings.channels > 255 {
            return Err(CodecError::InvalidConfig(format!(
                "unsupported channel count {}",
                settings.channels
            )));
        }
        Ok(Self {
            settings: settings.clone(),
            pending: VecDeque::new(),
        })
    }

    /// Decoder description for this stream.
    pub fn extradata(&self) -> Vec<u8> {
        encode_description(
            self.settings.sample_format,
            self.settings.sample_rate,
            self.settings.channels,
        )
    }

    /// Encode one sample buffer. Produced packets are queued for
    /// `receive_packet`.
    pub fn send_buffer(&mut self, buffer: &SampleBuffer) -> CodecResult<()> {
        if buffer.sample_rate() != self.settings.sample_rate
            || buffer.channels() != self.settings.channels
            || buffer.format() != self.settings.sample_format
        {
            return Err(CodecError::InvalidConfig(format!(
                "buffer {:?} {} Hz x{} does not match configured {:?} {} Hz x{}",
                buffer.format(),
                buffer.sample_rate(),
                buffer.channels(),
                self.settings.sample_format,
                self.settings.sample_rate,
                self.settings.channels
            )));
        }

        let mut data = Vec::with_capacity(PACKET_HEADER_LEN + buffer.data().len());
        data.extend_from_slice(PACKET_MAGIC);
        data.push(BITSTREAM_VERSION);
        data.push(buffer.format().wire_tag());
        data.extend_from_slice(&buffer.sample_rate().to_le_bytes());
        data.push(buffer.channels() as u8);
        data.extend_from_slice(&buffer.frames().to_le_bytes());
        data.extend_from_slice(buffer.data());

        self.pending.push_back(
            Packet::new(data, buffer.pts())
                .with_duration(Some(buffer.duration_us()))
                .with_key(true),
        );
        Ok(())
    }

    pub fn receive_packet(&mut self) -> Option<Packet> {
        self.pending.pop_front()
    }

    /// Drain everything still buffered. The codec stays usable afterwards.
    pub fn flush(&mut self) -> Vec<Packet> {
        self.pending.drain(..).collect()
    }
}

/// Software audio decoder state.
pub struct BlockAudioDecoder {
    /// Stream parameters from the out-of-band description, when provided.
    expected: Option<(AudioSampleFormat, u32, u32)>,
    pending: VecDeque<SampleBuffer>,
}

impl BlockAudioDecoder {
    pub fn new(settings: &AudioDecoderSettings) -> CodecResult<Self> {
        let expected = match settings.description.as_deref() {
            Some(blob) => Some(parse_description(blob)?),
            None => None,
        };
        Ok(Self {
            expected,
            pending: VecDeque::new(),
        })
    }

    /// Decode one packet. Produced buffers are queued for `receive_buffer`.
    pub fn send_packet(&mut self, packet: &Packet) -> CodecResult<()> {
        let data = packet.data();
        if data.len() < PACKET_HEADER_LEN || &data[..2] != PACKET_MAGIC {
            return Err(CodecError::InvalidData("not an audio packet".into()));
        }
        if data[2] != BITSTREAM_VERSION {
            return Err(CodecError::InvalidData(format!(
                "unsupported bitstream version {}",
                data[2]
            )));
        }
        let format = AudioSampleFormat::from_wire_tag(data[3])
            .ok_or_else(|| CodecError::InvalidData("unknown sample format tag".into()))?;
        let rate = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let channels = data[8] as u32;
        let frames = u32::from_le_bytes([data[9], data[10], data[11], data[12]]);

        if let Some((exp_format, exp_rate, exp_channels)) = self.expected {
            if format != exp_format || rate != exp_rate || channels != exp_channels {
                return Err(CodecError::InvalidData(format!(
                    "packet {:?} {} Hz x{} does not match stream description {:?} {} Hz x{}",
                    format, rate, channels, exp_format, exp_rate, exp_channels
                )));
            }
        }

        let payload = &data[PACKET_HEADER_LEN..];
        let expected_len = format.bytes_per_sample() * frames as usize * channels as usize;
        if payload.len() != expected_len {
            return Err(CodecError::InvalidData(format!(
                "audio payload is {} bytes, expected {}",
                payload.len(),
                expected_len
            )));
        }

        let mut buffer = SampleBuffer::from_data(format, rate, channels, frames, payload.to_vec())?;
        buffer.set_pts(packet.pts());
        self.pending.push_back(buffer);
        Ok(())
    }

    pub fn receive_buffer(&mut self) -> Option<SampleBuffer> {
        self.pending.pop_front()
    }

    /// Drain everything still buffered. The codec stays usable afterwards.
    pub fn flush(&mut self) -> Vec<SampleBuffer> {
        self.pending.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let settings = AudioEncoderSettings {
            sample_rate: 48_000,
            channels: 2,
            sample_format: AudioSampleFormat::F32,
            bitrate: Some(128_000),
        };
        let mut enc = BlockAudioEncoder::new(&settings).unwrap();
        let mut dec = BlockAudioDecoder::new(&AudioDecoderSettings {
            description: Some(enc.extradata()),
        })
        .unwrap();

        let samples: Vec<f32> = (0..960).map(|i| (i as f32 / 960.0).sin()).collect();
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut buffer =
            SampleBuffer::from_data(AudioSampleFormat::F32, 48_000, 2, 480, bytes.clone()).unwrap();
        buffer.set_pts(5_000);

        enc.send_buffer(&buffer).unwrap();
        let pkt = enc.receive_packet().unwrap();
        assert!(pkt.is_key());
        assert_eq!(pkt.duration(), Some(10_000));

        dec.send_packet(&pkt).unwrap();
        let out = dec.receive_buffer().unwrap();
        assert_eq!(out.pts(), 5_000);
        assert_eq!(out.frames(), 480);
        assert_eq!(out.data(), &bytes[..]);
    }

    #[test]
    fn test_description_mismatch_rejected() {
        let settings = AudioEncoderSettings {
            sample_rate: 44_100,
            channels: 1,
            sample_format: AudioSampleFormat::S16,
            bitrate: None,
        };
        let mut enc = BlockAudioEncoder::new(&settings).unwrap();
        let buffer =
            SampleBuffer::from_data(AudioSampleFormat::S16, 44_100, 1, 4, vec![0u8; 8]).unwrap();
        enc.send_buffer(&buffer).unwrap();
        let pkt = enc.receive_packet().unwrap();

        let mut dec = BlockAudioDecoder::new(&AudioDecoderSettings {
            description: Some(encode_description(AudioSampleFormat::F32, 48_000, 2)),
        })
        .unwrap();
        assert!(matches!(
            dec.send_packet(&pkt),
            Err(CodecError::InvalidData(_))
        ));
    }

    #[test]
    fn test_corrupt_packet_rejected() {
        let mut dec = BlockAudioDecoder::new(&AudioDecoderSettings::default()).unwrap();
        assert!(dec.send_packet(&Packet::new(vec![1, 2, 3], 0)).is_err());
    }
}
