//! VideoEncoder codec object.
//!
//! Encodes `VideoFrame`s into `EncodedVideoChunk`s. Submissions validate
//! synchronously, queue through the control message queue and execute on the
//! encoder's worker thread; chunks come back through the output callback in
//! submission order.

use std::sync::Mutex;

use crate::codec::context::{self, CodecContext};
use crate::codec::{CodecError, RawFrame, VideoEncoderSettings};

use super::codec_string::parse_video_codec;
use super::encoded_video_chunk::{
    EncodedVideoChunk, EncodedVideoChunkType, LatencyMode, VideoEncoderConfig,
};
use super::error::{data_error, encoding_error, type_error, ErrorKind, WebCodecsError};
use super::processor::{CodecEngine, CodecProcessor, CodecState};
use super::promise::Promise;
use super::resource_manager::{CodecKind, ResourceManager};
use super::video_frame::VideoFrame;

/// Decoder configuration describing an encoder's output stream.
#[derive(Debug, Clone)]
pub struct VideoDecoderConfigOutput {
    /// Codec string
    pub codec: String,
    /// Coded width
    pub coded_width: Option<u32>,
    /// Coded height
    pub coded_height: Option<u32>,
    /// Codec configuration blob for the decoder
    pub description: Option<Vec<u8>>,
}

/// Metadata delivered alongside each output chunk.
#[derive(Debug, Clone, Default)]
pub struct EncodedVideoChunkMetadata {
    /// Present on the first output after each successful configure.
    pub decoder_config: Option<VideoDecoderConfigOutput>,
}

/// Per-submission encode options
#[derive(Debug, Clone, Default)]
pub struct VideoEncoderEncodeOptions {
    /// Force this frame to be encoded as a keyframe
    pub key_frame: Option<bool>,
}

/// Result of `is_config_supported`
#[derive(Debug, Clone)]
pub struct VideoEncoderSupport {
    /// Whether the configuration is supported
    pub supported: bool,
    /// The configuration that was checked
    pub config: VideoEncoderConfig,
}

/// Constructor callbacks. Output and error handlers run on the encoder's
/// callback thread.
pub struct VideoEncoderInit {
    pub output: Box<dyn FnMut(EncodedVideoChunk, EncodedVideoChunkMetadata) + Send>,
    pub error: Box<dyn FnMut(WebCodecsError) + Send>,
}

pub(crate) struct VideoEncodeJob {
    frame: RawFrame,
    key_frame: bool,
}

/// Worker-side encoder: owns the codec-library context.
pub(crate) struct VideoEncodeEngine {
    config: VideoEncoderConfig,
    context: CodecContext,
    opened: bool,
    decoder_config_pending: bool,
}

impl VideoEncodeEngine {
    /// The context opens against the first frame's pixel format.
    fn ensure_open(&mut self, frame: &RawFrame) -> Result<(), WebCodecsError> {
        if self.opened {
            return Ok(());
        }
        let (gop_size, _max_delay) = match self.config.latency_mode {
            LatencyMode::Realtime => (10u32, 0u32),
            LatencyMode::Quality => (60, 2),
        };
        let settings = VideoEncoderSettings {
            width: self.config.width,
            height: self.config.height,
            pixel_format: frame.format(),
            bitrate: self.config.bitrate.unwrap_or(5_000_000),
            framerate_num: self.config.framerate.unwrap_or(30.0) as u32,
            framerate_den: 1,
            gop_size,
        };
        self.context.configure_video_encoder(&settings)?;
        self.context.open()?;
        self.opened = true;
        Ok(())
    }
}

fn process_error(err: CodecError) -> WebCodecsError {
    match err {
        CodecError::InvalidData(_) => data_error(err.to_string()),
        other => encoding_error(other.to_string()),
    }
}

impl CodecEngine for VideoEncodeEngine {
    type Config = VideoEncoderConfig;
    type Input = VideoEncodeJob;
    type Output = (EncodedVideoChunk, EncodedVideoChunkMetadata);

    const KIND: CodecKind = CodecKind::VideoEncoder;

    fn configure(config: &VideoEncoderConfig) -> Result<Self, WebCodecsError> {
        let codec_id = parse_video_codec(&config.codec)?;
        let context = CodecContext::new_video_encoder(codec_id)?;
        Ok(Self {
            config: config.clone(),
            context,
            opened: false,
            decoder_config_pending: true,
        })
    }

    fn process(&mut self, job: VideoEncodeJob) -> Result<Vec<Self::Output>, WebCodecsError> {
        self.ensure_open(&job.frame)?;
        if job.key_frame {
            self.context.request_key_frame().map_err(process_error)?;
        }
        let packets = self.context.encode(&job.frame).map_err(process_error)?;

        let mut outputs = Vec::with_capacity(packets.len());
        for packet in packets {
            let chunk_type = if packet.is_key() {
                EncodedVideoChunkType::Key
            } else {
                EncodedVideoChunkType::Delta
            };
            let chunk = EncodedVideoChunk::from_parts(
                chunk_type,
                packet.pts(),
                packet.duration(),
                packet.buf().clone(),
            );
            let metadata = if self.decoder_config_pending {
                self.decoder_config_pending = false;
                EncodedVideoChunkMetadata {
                    decoder_config: Some(VideoDecoderConfigOutput {
                        codec: self.config.codec.clone(),
                        coded_width: Some(self.config.width),
                        coded_height: Some(self.config.height),
                        description: self.context.extradata(),
                    }),
                }
            } else {
                EncodedVideoChunkMetadata::default()
            };
            outputs.push((chunk, metadata));
        }
        Ok(outputs)
    }

    fn flush(&mut self) -> Result<Vec<Self::Output>, WebCodecsError> {
        if !self.opened {
            return Ok(Vec::new());
        }
        let packets = self.context.flush_encoder().map_err(process_error)?;
        Ok(packets
            .into_iter()
            .map(|packet| {
                let chunk_type = if packet.is_key() {
                    EncodedVideoChunkType::Key
                } else {
                    EncodedVideoChunkType::Delta
                };
                (
                    EncodedVideoChunk::from_parts(
                        chunk_type,
                        packet.pts(),
                        packet.duration(),
                        packet.buf().clone(),
                    ),
                    EncodedVideoChunkMetadata::default(),
                )
            })
            .collect())
    }
}

/// WebCodecs video encoder.
pub struct VideoEncoder {
    processor: CodecProcessor<VideoEncodeEngine>,
    /// Rotation/flip snapshot taken from the first frame of each
    /// configuration; mismatching frames are rejected through the error
    /// callback.
    active_orientation: Mutex<Option<(u32, bool)>>,
}

impl VideoEncoder {
    /// Create an encoder delivering results through `init`'s callbacks.
    pub fn new(init: VideoEncoderInit) -> Self {
        Self::with_resource_manager(init, ResourceManager::global().clone())
    }

    /// Create an encoder registered with a specific resource manager.
    pub fn with_resource_manager(init: VideoEncoderInit, manager: ResourceManager) -> Self {
        let mut output = init.output;
        Self {
            processor: CodecProcessor::new(
                Box::new(move |(chunk, metadata)| output(chunk, metadata)),
                init.error,
                manager,
            ),
            active_orientation: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CodecState {
        self.processor.state()
    }

    /// Number of submissions whose outputs have not been delivered yet.
    pub fn encode_queue_size(&self) -> u32 {
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

    /// Mark the encoder as background work for the resource manager.
    pub fn set_background(&self, background: bool) {
        self.processor.set_background(background);
    }

    /// Resolves when the encoder can absorb more work without queuing past
    /// its backpressure threshold.
    pub fn ready(&self) -> Promise<()> {
        self.processor.ready()
    }

    /// Configure the encoder. Malformed configs fail synchronously with a
    /// *type* error; unsupported ones surface later through the error
    /// callback.
    pub fn configure(&self, config: VideoEncoderConfig) -> Result<(), WebCodecsError> {
        if config.width == 0 || config.height == 0 {
            return Err(type_error("width and height must be greater than 0"));
        }
        if let Err(err) = parse_video_codec(&config.codec) {
            if err.kind() == ErrorKind::Type {
                return Err(err);
            }
        }
        if let Some(mode) = &config.scalability_mode {
            if parse_scalability_mode(mode).is_none() {
                return Err(type_error(format!("malformed scalability mode: {}", mode)));
            }
        }
        self.active_orientation.lock().expect("orientation poisoned").take();
        self.processor.configure(config)
    }

    /// Submit a frame for encoding.
    pub fn encode(
        &self,
        frame: &VideoFrame,
        options: Option<VideoEncoderEncodeOptions>,
    ) -> Result<(), WebCodecsError> {
        if self.state() != CodecState::Configured {
            return Err(super::error::invalid_state_error("encoder is not configured"));
        }
        if frame.is_closed() {
            return Err(type_error("cannot encode a closed VideoFrame"));
        }

        let orientation = (frame.rotation(), frame.flip());
        {
            let active = self.active_orientation.lock().expect("orientation poisoned");
            if let Some(expected) = *active {
                if expected != orientation {
                    drop(active);
                    self.processor.fail(data_error(format!(
                        "frame orientation {:?} does not match the active orientation {:?}",
                        orientation, expected
                    )));
                    return Ok(());
                }
            }
        }

        let raw = frame.snapshot()?;
        let key_frame = options.unwrap_or_default().key_frame.unwrap_or(false);
        self.processor.submit(VideoEncodeJob { frame: raw, key_frame })?;
        self.active_orientation
            .lock()
            .expect("orientation poisoned")
            .get_or_insert(orientation);
        Ok(())
    }

    /// Resolves once every prior submission's outputs have been delivered.
    pub fn flush(&self) -> Result<Promise<()>, WebCodecsError> {
        self.processor.flush()
    }

    /// Return to `Unconfigured`, discarding queued work and aborting pending
    /// flushes.
    pub fn reset(&self) -> Result<(), WebCodecsError> {
        self.active_orientation.lock().expect("orientation poisoned").take();
        self.processor.reset()
    }

    /// Run reset semantics and release the underlying codec. Idempotent.
    pub fn close(&self) {
        self.active_orientation.lock().expect("orientation poisoned").take();
        self.processor.close();
    }

    /// Probe a configuration without touching any codec object.
    pub fn is_config_supported(config: VideoEncoderConfig) -> Promise<VideoEncoderSupport> {
        if config.width == 0 || config.height == 0 {
            return Promise::rejected(type_error("width and height must be greater than 0"));
        }
        let supported = match parse_video_codec(&config.codec) {
            Ok(codec_id) => {
                let scalability_ok = config
                    .scalability_mode
                    .as_deref()
                    .is_none_or(|m| parse_scalability_mode(m).is_some());
                context::has_encoder(codec_id) && scalability_ok
            }
            Err(err) if err.kind() == ErrorKind::Type => return Promise::rejected(err),
            Err(_) => false,
        };
        Promise::resolved(VideoEncoderSupport { supported, config })
    }
}

/// Parse a scalability mode string such as "L1T1" or "L1T3".
/// Returns (spatial_layers, temporal_layers).
fn parse_scalability_mode(mode: &str) -> Option<(u32, u32)> {
    let rest = mode.strip_prefix('L')?;
    let (spatial, temporal) = rest.split_once('T')?;
    let spatial = spatial.parse::<u32>().ok()?;
    let temporal = temporal.parse::<u32>().ok()?;
    if spatial == 0 || temporal == 0 {
        return None;
    }
    Some((spatial, temporal))
}
