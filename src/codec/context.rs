//! Codec context handle.
//!
//! The create/configure/open/send/receive/flush surface over the software
//! codecs, one context per stream. A context is owned by exactly one thread;
//! the WebCodecs layer keeps each context on its codec's worker.

use super::audio::{BlockAudioDecoder, BlockAudioEncoder};
use super::frame::RawFrame;
use super::packet::Packet;
use super::sample_buffer::SampleBuffer;
use super::video::{BlockVideoDecoder, BlockVideoEncoder};
use super::{
    AudioDecoderSettings, AudioEncoderSettings, CodecError, CodecId, CodecResult,
    VideoDecoderSettings, VideoEncoderSettings,
};

/// Type of codec (encoder or decoder)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecType {
    Encoder,
    Decoder,
}

/// Codec identifiers the library has a video implementation for.
const VIDEO_CODECS: &[CodecId] = &[CodecId::H264, CodecId::Vp8, CodecId::Vp9, CodecId::Av1];

/// Codec identifiers the library has an audio implementation for.
const AUDIO_CODECS: &[CodecId] = &[CodecId::Opus, CodecId::Aac, CodecId::Pcm];

/// Whether an encoder implementation exists for `codec_id`.
pub fn has_encoder(codec_id: CodecId) -> bool {
    VIDEO_CODECS.contains(&codec_id) || AUDIO_CODECS.contains(&codec_id)
}

/// Whether a decoder implementation exists for `codec_id`.
pub fn has_decoder(codec_id: CodecId) -> bool {
    has_encoder(codec_id)
}

enum Pipeline {
    VideoEncoder {
        settings: Option<VideoEncoderSettings>,
        state: Option<BlockVideoEncoder>,
    },
    VideoDecoder {
        settings: Option<VideoDecoderSettings>,
        state: Option<BlockVideoDecoder>,
    },
    AudioEncoder {
        settings: Option<AudioEncoderSettings>,
        state: Option<BlockAudioEncoder>,
    },
    AudioDecoder {
        settings: Option<AudioDecoderSettings>,
        state: Option<BlockAudioDecoder>,
    },
}

/// A configured or configurable codec stream handle.
pub struct CodecContext {
    codec_id: CodecId,
    codec_type: CodecType,
    pipeline: Pipeline,
}

impl CodecContext {
    // ========================================================================
    // Creation
    // ========================================================================

    /// Create a new video encoder context for the given codec ID.
    pub fn new_video_encoder(codec_id: CodecId) -> CodecResult<Self> {
        if !VIDEO_CODECS.contains(&codec_id) {
            return Err(CodecError::EncoderNotFound(codec_id));
        }
        Ok(Self {
            codec_id,
            codec_type: CodecType::Encoder,
            pipeline: Pipeline::VideoEncoder {
                settings: None,
                state: None,
            },
        })
    }

    /// Create a new video decoder context for the given codec ID.
    pub fn new_video_decoder(codec_id: CodecId) -> CodecResult<Self> {
        if !VIDEO_CODECS.contains(&codec_id) {
            return Err(CodecError::DecoderNotFound(codec_id));
        }
        Ok(Self {
            codec_id,
            codec_type: CodecType::Decoder,
            pipeline: Pipeline::VideoDecoder {
                settings: None,
                state: None,
            },
        })
    }

    /// Create a new audio encoder context for the given codec ID.
    pub fn new_audio_encoder(codec_id: CodecId) -> CodecResult<Self> {
        if !AUDIO_CODECS.contains(&codec_id) {
            return Err(CodecError::EncoderNotFound(codec_id));
        }
        Ok(Self {
            codec_id,
            codec_type: CodecType::Encoder,
            pipeline: Pipeline::AudioEncoder {
                settings: None,
                state: None,
            },
        })
    }

    /// Create a new audio decoder context for the given codec ID.
    pub fn new_audio_decoder(codec_id: CodecId) -> CodecResult<Self> {
        if !AUDIO_CODECS.contains(&codec_id) {
            return Err(CodecError::DecoderNotFound(codec_id));
        }
        Ok(Self {
            codec_id,
            codec_type: CodecType::Decoder,
            pipeline: Pipeline::AudioDecoder {
                settings: None,
                state: None,
            },
        })
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Configure the video encoder with the given settings.
    pub fn configure_video_encoder(&mut self, config: &VideoEncoderSettings) -> CodecResult<()> {
        match &mut self.pipeline {
            Pipeline::VideoEncoder { settings, .. } => {
                *settings = Some(config.clone());
                Ok(())
            }
            _ => Err(CodecError::InvalidState("not a video encoder context".into())),
        }
    }

    /// Configure the video decoder with the given settings.
    pub fn configure_video_decoder(&mut self, config: &VideoDecoderSettings) -> CodecResult<()> {
        match &mut self.pipeline {
            Pipeline::VideoDecoder { settings, .. } => {
                *settings = Some(config.clone());
                Ok(())
            }
            _ => Err(CodecError::InvalidState("not a video decoder context".into())),
        }
    }

    /// Configure the audio encoder with the given settings.
    pub fn configure_audio_encoder(&mut self, config: &AudioEncoderSettings) -> CodecResult<()> {
        match &mut self.pipeline {
            Pipeline::AudioEncoder { settings, .. } => {
                *settings = Some(config.clone());
                Ok(())
            }
            _ => Err(CodecError::InvalidState("not an audio encoder context".into())),
        }
    }

    /// Configure the audio decoder with the given settings.
    pub fn configure_audio_decoder(&mut self, config: &AudioDecoderSettings) -> CodecResult<()> {
        match &mut self.pipeline {
            Pipeline::AudioDecoder { settings, .. } => {
                *settings = Some(config.clone());
                Ok(())
            }
            _ => Err(CodecError::InvalidState("not an audio decoder context".into())),
        }
    }

    /// Open the codec (must be called after configuration).
    pub fn open(&mut self) -> CodecResult<()> {
        match &mut self.pipeline {
            Pipeline::VideoEncoder { settings, state } => {
                let settings = settings.as_ref().ok_or(CodecError::NotConfigured)?;
                *state = Some(BlockVideoEncoder::new(settings)?);
            }
            Pipeline::VideoDecoder { settings, state } => {
                let settings = settings.clone().unwrap_or_default();
                *state = Some(BlockVideoDecoder::new(&settings)?);
            }
            Pipeline::AudioEncoder { settings, state } => {
                let settings = settings.as_ref().ok_or(CodecError::NotConfigured)?;
                *state = Some(BlockAudioEncoder::new(settings)?);
            }
            Pipeline::AudioDecoder { settings, state } => {
                let settings = settings.clone().unwrap_or_default();
                *state = Some(BlockAudioDecoder::new(&settings)?);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Send a video frame to the encoder.
    pub fn send_frame(&mut self, frame: &RawFrame) -> CodecResult<()> {
        match &mut self.pipeline {
            Pipeline::VideoEncoder { state: Some(enc), .. } => enc.send_frame(frame),
            Pipeline::VideoEncoder { state: None, .. } => Err(CodecError::NotConfigured),
            _ => Err(CodecError::InvalidState("not a video encoder context".into())),
        }
    }

    /// Send an audio sample buffer to the encoder.
    pub fn send_samples(&mut self, buffer: &SampleBuffer) -> CodecResult<()> {
        match &mut self.pipeline {
            Pipeline::AudioEncoder { state: Some(enc), .. } => enc.send_buffer(buffer),
            Pipeline::AudioEncoder { state: None, .. } => Err(CodecError::NotConfigured),
            _ => Err(CodecError::InvalidState("not an audio encoder context".into())),
        }
    }

    /// Receive an encoded packet from the encoder, if one is available.
    pub fn receive_packet(&mut self) -> CodecResult<Option<Packet>> {
        match &mut self.pipeline {
            Pipeline::VideoEncoder { state: Some(enc), .. } => Ok(enc.receive_packet()),
            Pipeline::AudioEncoder { state: Some(enc), .. } => Ok(enc.receive_packet()),
            Pipeline::VideoEncoder { state: None, .. }
            | Pipeline::AudioEncoder { state: None, .. } => Err(CodecError::NotConfigured),
            _ => Err(CodecError::InvalidState("not an encoder context".into())),
        }
    }

    /// Encode a video frame and return all available packets.
    pub fn encode(&mut self, frame: &RawFrame) -> CodecResult<Vec<Packet>> {
        self.send_frame(frame)?;
        let mut packets = Vec::new();
        while let Some(pkt) = self.receive_packet()? {
            packets.push(pkt);
        }
        Ok(packets)
    }

    /// Encode an audio buffer and return all available packets.
    pub fn encode_samples(&mut self, buffer: &SampleBuffer) -> CodecResult<Vec<Packet>> {
        self.send_samples(buffer)?;
        let mut packets = Vec::new();
        while let Some(pkt) = self.receive_packet()? {
            packets.push(pkt);
        }
        Ok(packets)
    }

    /// Flush the encoder, returning everything still buffered. The context
    /// stays usable.
    pub fn flush_encoder(&mut self) -> CodecResult<Vec<Packet>> {
        match &mut self.pipeline {
            Pipeline::VideoEncoder { state: Some(enc), .. } => Ok(enc.flush()),
            Pipeline::AudioEncoder { state: Some(enc), .. } => Ok(enc.flush()),
            Pipeline::VideoEncoder { state: None, .. }
            | Pipeline::AudioEncoder { state: None, .. } => Err(CodecError::NotConfigured),
            _ => Err(CodecError::InvalidState("not an encoder context".into())),
        }
    }

    /// Force the next encoded video frame to be a keyframe.
    pub fn request_key_frame(&mut self) -> CodecResult<()> {
        match &mut self.pipeline {
            Pipeline::VideoEncoder { state: Some(enc), .. } => {
                enc.request_key_frame();
                Ok(())
            }
            Pipeline::VideoEncoder { state: None, .. } => Err(CodecError::NotConfigured),
            _ => Err(CodecError::InvalidState("not a video encoder context".into())),
        }
    }

    // ========================================================================
    // Decoding
    // ========================================================================

    /// Send an encoded packet to the decoder.
    pub fn send_packet(&mut self, packet: &Packet) -> CodecResult<()> {
        match &mut self.pipeline {
            Pipeline::VideoDecoder { state: Some(dec), .. } => dec.send_packet(packet),
            Pipeline::AudioDecoder { state: Some(dec), .. } => dec.send_packet(packet),
            Pipeline::VideoDecoder { state: None, .. }
            | Pipeline::AudioDecoder { state: None, .. } => Err(CodecError::NotConfigured),
            _ => Err(CodecError::InvalidState("not a decoder context".into())),
        }
    }

    /// Receive a decoded video frame, if one is available.
    pub fn receive_frame(&mut self) -> CodecResult<Option<RawFrame>> {
        match &mut self.pipeline {
            Pipeline::VideoDecoder { state: Some(dec), .. } => Ok(dec.receive_frame()),
            Pipeline::VideoDecoder { state: None, .. } => Err(CodecError::NotConfigured),
            _ => Err(CodecError::InvalidState("not a video decoder context".into())),
        }
    }

    /// Receive a decoded audio buffer, if one is available.
    pub fn receive_samples(&mut self) -> CodecResult<Option<SampleBuffer>> {
        match &mut self.pipeline {
            Pipeline::AudioDecoder { state: Some(dec), .. } => Ok(dec.receive_buffer()),
            Pipeline::AudioDecoder { state: None, .. } => Err(CodecError::NotConfigured),
            _ => Err(CodecError::InvalidState("not an audio decoder context".into())),
        }
    }

    /// Decode a packet and return all available video frames.
    pub fn decode(&mut self, packet: &Packet) -> CodecResult<Vec<RawFrame>> {
        self.send_packet(packet)?;
        let mut frames = Vec::new();
        while let Some(frame) = self.receive_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Decode a packet and return all available audio buffers.
    pub fn decode_samples(&mut self, packet: &Packet) -> CodecResult<Vec<SampleBuffer>> {
        self.send_packet(packet)?;
        let mut buffers = Vec::new();
        while let Some(buffer) = self.receive_samples()? {
            buffers.push(buffer);
        }
        Ok(buffers)
    }

    /// Drop decoder reference state. The next video packet must be a keyframe.
    pub fn flush_buffers(&mut self) {
        if let Pipeline::VideoDecoder { state: Some(dec), .. } = &mut self.pipeline {
            dec.flush_buffers();
        }
    }

    // ========================================================================
    // Utility
    // ========================================================================

    #[inline]
    pub fn codec_id(&self) -> CodecId {
        self.codec_id
    }

    #[inline]
    pub fn codec_type(&self) -> CodecType {
        self.codec_type
    }

    /// Codec configuration blob for consumers (the decoder `description`).
    pub fn extradata(&self) -> Option<Vec<u8>> {
        match &self.pipeline {
            Pipeline::VideoEncoder { state: Some(enc), .. } => Some(enc.extradata()),
            Pipeline::AudioEncoder { state: Some(enc), .. } => Some(enc.extradata()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for CodecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecContext")
            .field("codec", &self.codec_id)
            .field("type", &self.codec_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PixelFormat;

    #[test]
    fn test_unknown_codec_rejected() {
        assert!(matches!(
            CodecContext::new_video_encoder(CodecId::Hevc),
            Err(CodecError::EncoderNotFound(CodecId::Hevc))
        ));
        assert!(matches!(
            CodecContext::new_audio_decoder(CodecId::Vorbis),
            Err(CodecError::DecoderNotFound(CodecId::Vorbis))
        ));
    }

    #[test]
    fn test_open_requires_encoder_settings() {
        let mut ctx = CodecContext::new_video_encoder(CodecId::H264).unwrap();
        assert!(matches!(ctx.open(), Err(CodecError::NotConfigured)));
        ctx.configure_video_encoder(&VideoEncoderSettings {
            width: 16,
            height: 16,
            ..Default::default()
        })
        .unwrap();
        ctx.open().unwrap();
        assert!(ctx.extradata().is_some());
    }

    #[test]
    fn test_video_encode_decode_through_context() {
        let mut enc = CodecContext::new_video_encoder(CodecId::Vp8).unwrap();
        enc.configure_video_encoder(&VideoEncoderSettings {
            width: 8,
            height: 8,
            pixel_format: PixelFormat::Rgba,
            ..Default::default()
        })
        .unwrap();
        enc.open().unwrap();

        let mut dec = CodecContext::new_video_decoder(CodecId::Vp8).unwrap();
        dec.configure_video_decoder(&VideoDecoderSettings {
            description: enc.extradata(),
        })
        .unwrap();
        dec.open().unwrap();

        let frame = RawFrame::from_data(PixelFormat::Rgba, 8, 8, vec![42u8; 8 * 8 * 4]).unwrap();
        let packets = enc.encode(&frame).unwrap();
        assert_eq!(packets.len(), 1);
        let frames = dec.decode(&packets[0]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data(), frame.data());
    }

    #[test]
    fn test_kind_mismatch_is_invalid_state() {
        let mut ctx = CodecContext::new_audio_encoder(CodecId::Opus).unwrap();
        let frame = RawFrame::black(PixelFormat::I420, 4, 4).unwrap();
        assert!(matches!(
            ctx.send_frame(&frame),
            Err(CodecError::InvalidState(_))
        ));
    }
}
