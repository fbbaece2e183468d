//! AudioEncoder codec object.

use crate::codec::context::{self, CodecContext};
use crate::codec::{AudioEncoderSettings, CodecError, SampleBuffer};

use super::audio_data::AudioData;
use super::codec_string::parse_audio_codec;
use super::encoded_audio_chunk::{
    AudioEncoderConfig, EncodedAudioChunk, EncodedAudioChunkType,
};
use super::error::{data_error, encoding_error, type_error, ErrorKind, WebCodecsError};
use super::processor::{CodecEngine, CodecProcessor, CodecState};
use super::promise::Promise;
use super::resource_manager::{CodecKind, ResourceManager};

/// Decoder configuration describing an encoder's output stream.
#[derive(Debug, Clone)]
pub struct AudioDecoderConfigOutput {
    /// Codec string
    pub codec: String,
    /// Sample rate
    pub sample_rate: Option<u32>,
    /// Number of channels
    pub number_of_channels: Option<u32>,
    /// Codec configuration blob for the decoder
    pub description: Option<Vec<u8>>,
}

/// Metadata delivered alongside each output chunk.
#[derive(Debug, Clone, Default)]
pub struct EncodedAudioChunkMetadata {
    /// Present on the first output after each successful configure.
    pub decoder_config: Option<AudioDecoderConfigOutput>,
}

/// Result of `is_config_supported`
#[derive(Debug, Clone)]
pub struct AudioEncoderSupport {
    /// Whether the configuration is supported
    pub supported: bool,
    /// The configuration that was checked
    pub config: AudioEncoderConfig,
}

/// Constructor callbacks. Output and error handlers run on the encoder's
/// callback thread.
pub struct AudioEncoderInit {
    pub output: Box<dyn FnMut(EncodedAudioChunk, EncodedAudioChunkMetadata) + Send>,
    pub error: Box<dyn FnMut(WebCodecsError) + Send>,
}

/// Worker-side encoder: owns the codec-library context.
pub(crate) struct AudioEncodeEngine {
    config: AudioEncoderConfig,
    context: CodecContext,
    opened: bool,
    decoder_config_pending: bool,
}

impl AudioEncodeEngine {
    /// The context opens against the first buffer's sample format.
    fn ensure_open(&mut self, buffer: &SampleBuffer) -> Result<(), WebCodecsError> {
        if self.opened {
            return Ok(());
        }
        let settings = AudioEncoderSettings {
            sample_rate: self.config.sample_rate,
            channels: self.config.number_of_channels,
            sample_format: buffer.format(),
            bitrate: self.config.bitrate,
        };
        self.context.configure_audio_encoder(&settings)?;
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

impl CodecEngine for AudioEncodeEngine {
    type Config = AudioEncoderConfig;
    type Input = SampleBuffer;
    type Output = (EncodedAudioChunk, EncodedAudioChunkMetadata);

    const KIND: CodecKind = CodecKind::AudioEncoder;

    fn configure(config: &AudioEncoderConfig) -> Result<Self, WebCodecsError> {
        let codec_id = parse_audio_codec(&config.codec)?;
        let context = CodecContext::new_audio_encoder(codec_id)?;
        Ok(Self {
            config: config.clone(),
            context,
            opened: false,
            decoder_config_pending: true,
        })
    }

    fn process(&mut self, buffer: SampleBuffer) -> Result<Vec<Self::Output>, WebCodecsError> {
        self.ensure_open(&buffer)?;
        let packets = self.context.encode_samples(&buffer).map_err(process_error)?;
        let mut outputs = Vec::with_capacity(packets.len());
        for packet in packets {
            let chunk = EncodedAudioChunk::from_parts(
                if packet.is_key() {
                    EncodedAudioChunkType::Key
                } else {
                    EncodedAudioChunkType::Delta
                },
                packet.pts(),
                packet.duration(),
                packet.buf().clone(),
            );
            let metadata = if self.decoder_config_pending {
                self.decoder_config_pending = false;
                EncodedAudioChunkMetadata {
                    decoder_config: Some(AudioDecoderConfigOutput {
                        codec: self.config.codec.clone(),
                        sample_rate: Some(self.config.sample_rate),
                        number_of_channels: Some(self.config.number_of_channels),
                        description: self.context.extradata(),
                    }),
                }
            } else {
                EncodedAudioChunkMetadata::default()
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
                (
                    EncodedAudioChunk::from_parts(
                        EncodedAudioChunkType::Key,
                        packet.pts(),
                        packet.duration(),
                        packet.buf().clone(),
                    ),
                    EncodedAudioChunkMetadata::default(),
                )
            })
            .collect())
    }
}

/// WebCodecs audio encoder.
pub struct AudioEncoder {
    processor: CodecProcessor<AudioEncodeEngine>,
}

impl AudioEncoder {
    /// Create an encoder delivering results through `init`'s callbacks.
    pub fn new(init: AudioEncoderInit) -> Self {
        Self::with_resource_manager(init, ResourceManager::global().clone())
    }

    /// Create an encoder registered with a specific resource manager.
    pub fn with_resource_manager(init: AudioEncoderInit, manager: ResourceManager) -> Self {
        let mut output = init.output;
        Self {
            processor: CodecProcessor::new(
                Box::new(move |(chunk, metadata)| output(chunk, metadata)),
                init.error,
                manager,
            ),
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
    pub fn configure(&self, config: AudioEncoderConfig) -> Result<(), WebCodecsError> {
        if config.sample_rate == 0 || config.number_of_channels == 0 {
            return Err(type_error(
                "sampleRate and numberOfChannels must be greater than 0",
            ));
        }
        if let Err(err) = parse_audio_codec(&config.codec) {
            if err.kind() == ErrorKind::Type {
                return Err(err);
            }
        }
        if let Some(opus) = &config.opus {
            if opus.complexity.is_some_and(|c| c > 10) {
                return Err(type_error("opus complexity must be between 0 and 10"));
            }
        }
        self.processor.configure(config)
    }

    /// Submit an audio buffer for encoding.
    pub fn encode(&self, data: &AudioData) -> Result<(), WebCodecsError> {
        if self.state() != CodecState::Configured {
            return Err(super::error::invalid_state_error("encoder is not configured"));
        }
        if data.is_closed() {
            return Err(type_error("cannot encode closed AudioData"));
        }
        self.processor.submit(data.snapshot()?)
    }

    /// Resolves once every prior submission's outputs have been delivered.
    pub fn flush(&self) -> Result<Promise<()>, WebCodecsError> {
        self.processor.flush()
    }

    /// Return to `Unconfigured`, discarding queued work and aborting pending
    /// flushes.
    pub fn reset(&self) -> Result<(), WebCodecsError> {
        self.processor.reset()
    }

    /// Run reset semantics and release the underlying codec. Idempotent.
    pub fn close(&self) {
        self.processor.close();
    }

    /// Probe a configuration without touching any codec object.
    pub fn is_config_supported(config: AudioEncoderConfig) -> Promise<AudioEncoderSupport> {
        if config.sample_rate == 0 || config.number_of_channels == 0 {
            return Promise::rejected(type_error(
                "sampleRate and numberOfChannels must be greater than 0",
            ));
        }
        let supported = match parse_audio_codec(&config.codec) {
            Ok(codec_id) => context::has_encoder(codec_id),
            Err(err) if err.kind() == ErrorKind::Type => return Promise::rejected(err),
            Err(_) => false,
        };
        Promise::resolved(AudioEncoderSupport { supported, config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webcodecs::audio_data::{AudioDataInit, AudioSampleFormat};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn test_manager() -> ResourceManager {
        ResourceManager::with_timeout(Duration::from_secs(600))
    }

    type Collected = Arc<Mutex<Vec<(EncodedAudioChunk, EncodedAudioChunkMetadata)>>>;

    fn collecting_encoder() -> (AudioEncoder, Collected, Arc<Mutex<Vec<WebCodecsError>>>) {
        let chunks: Collected = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let chunks_clone = chunks.clone();
        let errors_clone = errors.clone();
        let encoder = AudioEncoder::with_resource_manager(
            AudioEncoderInit {
                output: Box::new(move |chunk, metadata| {
                    chunks_clone.lock().unwrap().push((chunk, metadata));
                }),
                error: Box::new(move |err| errors_clone.lock().unwrap().push(err)),
            },
            test_manager(),
        );
        (encoder, chunks, errors)
    }

    fn sine_audio(frames: u32, timestamp: i64) -> AudioData {
        let samples: Vec<f32> = (0..frames * 2)
            .map(|i| (i as f32 * 0.01).sin())
            .collect();
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        AudioData::from_buffer(
            &bytes,
            AudioDataInit {
                format: AudioSampleFormat::F32,
                sample_rate: 48_000,
                number_of_frames: frames,
                number_of_channels: 2,
                timestamp,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_encode_produces_ordered_key_chunks() {
        let (encoder, chunks, errors) = collecting_encoder();
        encoder
            .configure(AudioEncoderConfig::new("opus", 48_000, 2))
            .unwrap();
        for i in 0..10i64 {
            let audio = sine_audio(480, i * 10_000);
            encoder.encode(&audio).unwrap();
            audio.close();
        }
        encoder.flush().unwrap().wait().unwrap();

        let chunks = chunks.lock().unwrap();
        assert!(errors.lock().unwrap().is_empty());
        assert_eq!(chunks.len(), 10);
        for (i, (chunk, _)) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_type(), EncodedAudioChunkType::Key);
            assert_eq!(chunk.timestamp(), i as i64 * 10_000);
            assert_eq!(chunk.duration(), Some(10_000));
        }
        let first_meta = chunks[0].1.decoder_config.as_ref().unwrap();
        assert_eq!(first_meta.codec, "opus");
        assert_eq!(first_meta.sample_rate, Some(48_000));
        assert!(first_meta.description.is_some());
        assert!(chunks[1..].iter().all(|(_, m)| m.decoder_config.is_none()));
    }

    #[test]
    fn test_unsupported_codec_reports_async() {
        let (encoder, _chunks, errors) = collecting_encoder();
        encoder
            .configure(AudioEncoderConfig::new("vorbis", 44_100, 2))
            .unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while errors.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(errors.lock().unwrap()[0].kind(), ErrorKind::NotSupported);
        assert_eq!(encoder.state(), CodecState::Closed);
    }

    #[test]
    fn test_invalid_config_throws_type_error() {
        let (encoder, _chunks, _errors) = collecting_encoder();
        assert_eq!(
            encoder
                .configure(AudioEncoderConfig::new("opus", 0, 2))
                .unwrap_err()
                .kind(),
            ErrorKind::Type
        );
        let mut config = AudioEncoderConfig::new("opus", 48_000, 2);
        config.opus = Some(crate::webcodecs::encoded_audio_chunk::OpusEncoderConfig {
            complexity: Some(11),
            ..Default::default()
        });
        assert_eq!(encoder.configure(config).unwrap_err().kind(), ErrorKind::Type);
    }

    #[test]
    fn test_is_config_supported() {
        let support =
            AudioEncoder::is_config_supported(AudioEncoderConfig::new("mp4a.40.2", 44_100, 2))
                .wait()
                .unwrap();
        assert!(support.supported);
        let support =
            AudioEncoder::is_config_supported(AudioEncoderConfig::new("flac", 44_100, 2))
                .wait()
                .unwrap();
        assert!(!support.supported);
    }
}
