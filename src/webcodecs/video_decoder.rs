//! VideoDecoder codec object.
//!
//! Decodes `EncodedVideoChunk`s into `VideoFrame`s. The first chunk after
//! `configure()` or `reset()` must be a key chunk; a delta chunk in that
//! position fails the decoder through the error callback with a *data* error.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::codec::context::{self, CodecContext};
use crate::codec::{CodecError, Packet, VideoDecoderSettings};

use super::codec_string::parse_video_codec;
use super::encoded_video_chunk::{EncodedVideoChunk, EncodedVideoChunkType, VideoDecoderConfig};
use super::error::{
    data_error, encoding_error, invalid_state_error, type_error, ErrorKind, WebCodecsError,
};
use super::processor::{CodecEngine, CodecProcessor, CodecState};
use super::promise::Promise;
use super::resource_manager::{CodecKind, ResourceManager};
use super::video_frame::{VideoColorSpace, VideoFrame};

/// Result of `is_config_supported`
#[derive(Debug, Clone)]
pub struct VideoDecoderSupport {
    /// Whether the configuration is supported
    pub supported: bool,
    /// The configuration that was checked
    pub config: VideoDecoderConfig,
}

/// Constructor callbacks. Output and error handlers run on the decoder's
/// callback thread.
pub struct VideoDecoderInit {
    pub output: Box<dyn FnMut(VideoFrame) + Send>,
    pub error: Box<dyn FnMut(WebCodecsError) + Send>,
}

/// Worker-side decoder: owns the codec-library context.
pub(crate) struct VideoDecodeEngine {
    context: CodecContext,
    color_space: VideoColorSpace,
}

fn process_error(err: CodecError) -> WebCodecsError {
    match err {
        CodecError::InvalidData(_) => data_error(err.to_string()),
        other => encoding_error(other.to_string()),
    }
}

impl CodecEngine for VideoDecodeEngine {
    type Config = VideoDecoderConfig;
    type Input = EncodedVideoChunk;
    type Output = VideoFrame;

    const KIND: CodecKind = CodecKind::VideoDecoder;

    fn configure(config: &VideoDecoderConfig) -> Result<Self, WebCodecsError> {
        let codec_id = parse_video_codec(&config.codec)?;
        let mut context = CodecContext::new_video_decoder(codec_id)?;
        context.configure_video_decoder(&VideoDecoderSettings {
            description: config.description.clone(),
        })?;
        context.open()?;
        Ok(Self {
            context,
            color_space: config
                .color_space
                .clone()
                .unwrap_or_else(VideoColorSpace::rec709),
        })
    }

    fn process(&mut self, chunk: EncodedVideoChunk) -> Result<Vec<VideoFrame>, WebCodecsError> {
        let packet = Packet::from_buf(chunk.payload().clone(), chunk.timestamp())
            .with_duration(chunk.duration())
            .with_key(chunk.chunk_type() == EncodedVideoChunkType::Key);
        let frames = self.context.decode(&packet).map_err(process_error)?;
        Ok(frames
            .into_iter()
            .map(|raw| VideoFrame::from_raw(raw, self.color_space.clone()))
            .collect())
    }

    fn flush(&mut self) -> Result<Vec<VideoFrame>, WebCodecsError> {
        // The codec library delivers frames as packets arrive; a flush
        // barrier has nothing left to drain.
        Ok(Vec::new())
    }
}

/// WebCodecs video decoder.
pub struct VideoDecoder {
    processor: CodecProcessor<VideoDecodeEngine>,
    /// Set after configure/reset: the next chunk must be a key chunk.
    key_chunk_required: AtomicBool,
}

impl VideoDecoder {
    /// Create a decoder delivering results through `init`'s callbacks.
    pub fn new(init: VideoDecoderInit) -> Self {
        Self::with_resource_manager(init, ResourceManager::global().clone())
    }

    /// Create a decoder registered with a specific resource manager.
    pub fn with_resource_manager(init: VideoDecoderInit, manager: ResourceManager) -> Self {
        Self {
            processor: CodecProcessor::new(init.output, init.error, manager),
            key_chunk_required: AtomicBool::new(true),
        }
    }

    pub fn state(&self) -> CodecState {
        self.processor.state()
    }

    /// Number of submissions whose outputs have not been delivered yet.
    pub fn decode_queue_size(&self) -> u32 {
        self.processor.queue_size()
    }

    /// Install or clear the coalesced dequeue notification handler.
    pub fn set_ondequeue(&self, handler: Option<Box<dyn FnMut() + Send>>) {
        self.processor.set_ondequeue(handler);
    }

    /// Adjust the backpressure threshold gating `ready`.
    pub fn set_ready_threshold(&self, threshold: u32) {
        self.processor.set_ready_threshold(threshold);
    }

    /// Mark the decoder as background work for the resource manager.
    pub fn set_background(&self, background: bool) {
        self.processor.set_background(background);
    }

    /// Resolves when the decoder can absorb more work without queuing past
    /// its backpressure threshold.
    pub fn ready(&self) -> Promise<()> {
        self.processor.ready()
    }

    /// Configure the decoder. Malformed configs fail synchronously with a
    /// *type* error; unsupported ones surface later through the error
    /// callback.
    pub fn configure(&self, config: VideoDecoderConfig) -> Result<(), WebCodecsError> {
        if let Err(err) = parse_video_codec(&config.codec) {
            if err.kind() == ErrorKind::Type {
                return Err(err);
            }
        }
        if config.coded_width == Some(0) || config.coded_height == Some(0) {
            return Err(type_error("codedWidth and codedHeight must be greater than 0"));
        }
        self.key_chunk_required.store(true, Ordering::SeqCst);
        self.processor.configure(config)
    }

    /// Submit a chunk for decoding.
    pub fn decode(&self, chunk: &EncodedVideoChunk) -> Result<(), WebCodecsError> {
        if self.state() != CodecState::Configured {
            return Err(invalid_state_error("decoder is not configured"));
        }
        if self.key_chunk_required.load(Ordering::SeqCst) {
            if chunk.chunk_type() != EncodedVideoChunkType::Key {
                self.processor.fail(data_error(
                    "the first chunk after configure or reset must be a key chunk",
                ));
                return Ok(());
            }
            self.key_chunk_required.store(false, Ordering::SeqCst);
        }
        self.processor.submit(chunk.clone())
    }

    /// Resolves once every prior submission's outputs have been delivered.
    pub fn flush(&self) -> Result<Promise<()>, WebCodecsError> {
        self.processor.flush()
    }

    /// Return to `Unconfigured`, discarding queued work and aborting pending
    /// flushes. The next chunk must again be a key chunk.
    pub fn reset(&self) -> Result<(), WebCodecsError> {
        self.key_chunk_required.store(true, Ordering::SeqCst);
        self.processor.reset()
    }

    /// Run reset semantics and release the underlying codec. Idempotent.
    pub fn close(&self) {
        self.processor.close();
    }

    /// Probe a configuration without touching any codec object.
    pub fn is_config_supported(config: VideoDecoderConfig) -> Promise<VideoDecoderSupport> {
        if config.coded_width == Some(0) || config.coded_height == Some(0) {
            return Promise::rejected(type_error(
                "codedWidth and codedHeight must be greater than 0",
            ));
        }
        let supported = match parse_video_codec(&config.codec) {
            Ok(codec_id) => context::has_decoder(codec_id),
            Err(err) if err.kind() == ErrorKind::Type => return Promise::rejected(err),
            Err(_) => false,
        };
        Promise::resolved(VideoDecoderSupport { supported, config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PixelFormat;
    use crate::webcodecs::encoded_video_chunk::{EncodedVideoChunkInit, VideoEncoderConfig};
    use crate::webcodecs::video_encoder::{
        EncodedVideoChunkMetadata, VideoEncoder, VideoEncoderInit,
    };
    use crate::webcodecs::video_frame::VideoFrameBufferInit;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn test_manager() -> ResourceManager {
        ResourceManager::with_timeout(Duration::from_secs(600))
    }

    fn collecting_decoder() -> (
        VideoDecoder,
        Arc<Mutex<Vec<VideoFrame>>>,
        Arc<Mutex<Vec<WebCodecsError>>>,
    ) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let frames_clone = frames.clone();
        let errors_clone = errors.clone();
        let decoder = VideoDecoder::with_resource_manager(
            VideoDecoderInit {
                output: Box::new(move |frame| frames_clone.lock().unwrap().push(frame)),
                error: Box::new(move |err| errors_clone.lock().unwrap().push(err)),
            },
            test_manager(),
        );
        (decoder, frames, errors)
    }

    /// Encode a short sequence and hand back the chunks plus the stream's
    /// decoder config from the first chunk's metadata.
    fn encode_sequence(
        width: u32,
        height: u32,
        count: usize,
    ) -> (Vec<EncodedVideoChunk>, VideoDecoderConfig, Vec<Vec<u8>>) {
        let collected: Arc<Mutex<Vec<(EncodedVideoChunk, EncodedVideoChunkMetadata)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let collected_clone = collected.clone();
        let encoder = VideoEncoder::with_resource_manager(
            VideoEncoderInit {
                output: Box::new(move |chunk, metadata| {
                    collected_clone.lock().unwrap().push((chunk, metadata));
                }),
                error: Box::new(|err| panic!("encoder error: {}", err)),
            },
            test_manager(),
        );
        encoder
            .configure(VideoEncoderConfig::new("avc1.42001E", width, height))
            .unwrap();

        let mut originals = Vec::new();
        for i in 0..count {
            let size = PixelFormat::I420.buffer_size(width, height);
            let data: Vec<u8> = (0..size).map(|b| (b as u8).wrapping_add(i as u8)).collect();
            originals.push(data.clone());
            let frame = VideoFrame::from_buffer(
                &data,
                VideoFrameBufferInit::new(PixelFormat::I420, width, height, i as i64 * 1000),
            )
            .unwrap();
            encoder.encode(&frame, None).unwrap();
            frame.close();
        }
        encoder.flush().unwrap().wait().unwrap();

        let collected = collected.lock().unwrap();
        let config = {
            let meta = collected[0].1.decoder_config.as_ref().unwrap();
            let mut config = VideoDecoderConfig::new(meta.codec.clone());
            config.coded_width = meta.coded_width;
            config.coded_height = meta.coded_height;
            config.description = meta.description.clone();
            config
        };
        (
            collected.iter().map(|(c, _)| c.clone()).collect(),
            config,
            originals,
        )
    }

    #[test]
    fn test_encode_decode_roundtrip_is_lossless() {
        let (chunks, config, originals) = encode_sequence(32, 24, 5);
        let (decoder, frames, errors) = collecting_decoder();
        decoder.configure(config).unwrap();
        for chunk in &chunks {
            decoder.decode(chunk).unwrap();
        }
        decoder.flush().unwrap().wait().unwrap();

        let frames = frames.lock().unwrap();
        assert!(errors.lock().unwrap().is_empty());
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.format(), Some(PixelFormat::I420));
            assert_eq!(frame.coded_width(), 32);
            assert_eq!(frame.coded_height(), 24);
            assert_eq!(frame.timestamp(), i as i64 * 1000);
            let mut out = vec![0u8; frame.allocation_size().unwrap()];
            frame.copy_to(&mut out).unwrap();
            assert_eq!(out, originals[i], "pixel mismatch on frame {}", i);
            frame.close();
        }
    }

    #[test]
    fn test_outputs_preserve_submission_order() {
        let (chunks, config, _) = encode_sequence(16, 16, 8);
        let (decoder, frames, _errors) = collecting_decoder();
        decoder.configure(config).unwrap();
        for chunk in &chunks {
            decoder.decode(chunk).unwrap();
        }
        decoder.flush().unwrap().wait().unwrap();
        let timestamps: Vec<i64> = frames.lock().unwrap().iter().map(|f| f.timestamp()).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
        for frame in frames.lock().unwrap().iter() {
            frame.close();
        }
    }

    #[test]
    fn test_delta_first_chunk_fails_with_data_error() {
        let (_chunks, config, _) = encode_sequence(16, 16, 2);
        let (decoder, frames, errors) = collecting_decoder();
        decoder.configure(config).unwrap();

        let delta = EncodedVideoChunk::new(EncodedVideoChunkInit {
            chunk_type: EncodedVideoChunkType::Delta,
            timestamp: 0,
            duration: None,
            data: vec![0u8; 8],
        });
        decoder.decode(&delta).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while errors.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(errors.lock().unwrap()[0].kind(), ErrorKind::Data);
        assert_eq!(decoder.state(), CodecState::Closed);
        assert!(frames.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reset_requires_key_chunk_again_and_drops_outputs() {
        let (chunks, config, _) = encode_sequence(16, 16, 6);
        let (decoder, frames, errors) = collecting_decoder();
        decoder.configure(config).unwrap();

        for chunk in &chunks[..5] {
            decoder.decode(chunk).unwrap();
        }
        decoder.reset().unwrap();
        assert_eq!(decoder.decode_queue_size(), 0);

        // Re-configure and submit a delta chunk first: data error.
        let (chunks2, config2, _) = encode_sequence(16, 16, 2);
        decoder.configure(config2).unwrap();
        decoder.decode(&chunks2[1]).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while errors.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(errors.lock().unwrap()[0].kind(), ErrorKind::Data);

        // The pre-reset submissions produced no outputs that survive.
        for frame in frames.lock().unwrap().iter() {
            frame.close();
        }
    }

    #[test]
    fn test_corrupt_key_chunk_is_a_data_error() {
        let (_chunks, config, _) = encode_sequence(16, 16, 1);
        let (decoder, _frames, errors) = collecting_decoder();
        decoder.configure(config).unwrap();
        let garbage = EncodedVideoChunk::new(EncodedVideoChunkInit {
            chunk_type: EncodedVideoChunkType::Key,
            timestamp: 0,
            duration: None,
            data: vec![0xFFu8; 32],
        });
        decoder.decode(&garbage).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while errors.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(errors.lock().unwrap()[0].kind(), ErrorKind::Data);
    }

    #[test]
    fn test_is_config_supported() {
        let support = VideoDecoder::is_config_supported(VideoDecoderConfig::new("vp8"))
            .wait()
            .unwrap();
        assert!(support.supported);
        let support = VideoDecoder::is_config_supported(VideoDecoderConfig::new("hev1.1.6.L93.B0"))
            .wait()
            .unwrap();
        assert!(!support.supported);
    }
}
