//! AudioDecoder codec object.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::codec::context::{self, CodecContext};
use crate::codec::{AudioDecoderSettings, CodecError, Packet};

use super::audio_data::AudioData;
use super::codec_string::parse_audio_codec;
use super::encoded_audio_chunk::{AudioDecoderConfig, EncodedAudioChunk, EncodedAudioChunkType};
use super::error::{
    data_error, encoding_error, invalid_state_error, type_error, ErrorKind, WebCodecsError,
};
use super::processor::{CodecEngine, CodecProcessor, CodecState};
use super::promise::Promise;
use super::resource_manager::{CodecKind, ResourceManager};

/// Result of `is_config_supported`
#[derive(Debug, Clone)]
pub struct AudioDecoderSupport {
    /// Whether the configuration is supported
    pub supported: bool,
    /// The configuration that was checked
    pub config: AudioDecoderConfig,
}

/// Constructor callbacks. Output and error handlers run on the decoder's
/// callback thread.
pub struct AudioDecoderInit {
    pub output: Box<dyn FnMut(AudioData) + Send>,
    pub error: Box<dyn FnMut(WebCodecsError) + Send>,
}

/// Worker-side decoder: owns the codec-library context.
pub(crate) struct AudioDecodeEngine {
    context: CodecContext,
}

fn process_error(err: CodecError) -> WebCodecsError {
    match err {
        CodecError::InvalidData(_) => data_error(err.to_string()),
        other => encoding_error(other.to_string()),
    }
}

impl CodecEngine for AudioDecodeEngine {
    type Config = AudioDecoderConfig;
    type Input = EncodedAudioChunk;
    type Output = AudioData;

    const KIND: CodecKind = CodecKind::AudioDecoder;

    fn configure(config: &AudioDecoderConfig) -> Result<Self, WebCodecsError> {
        let codec_id = parse_audio_codec(&config.codec)?;
        let mut context = CodecContext::new_audio_decoder(codec_id)?;
        context.configure_audio_decoder(&AudioDecoderSettings {
            description: config.description.clone(),
        })?;
        context.open()?;
        Ok(Self { context })
    }

    fn process(&mut self, chunk: EncodedAudioChunk) -> Result<Vec<AudioData>, WebCodecsError> {
        let packet = Packet::from_buf(chunk.payload().clone(), chunk.timestamp())
            .with_duration(chunk.duration())
            .with_key(chunk.chunk_type() == EncodedAudioChunkType::Key);
        let buffers = self.context.decode_samples(&packet).map_err(process_error)?;
        Ok(buffers.into_iter().map(AudioData::from_raw).collect())
    }

    fn flush(&mut self) -> Result<Vec<AudioData>, WebCodecsError> {
        Ok(Vec::new())
    }
}

/// WebCodecs audio decoder.
pub struct AudioDecoder {
    processor: CodecProcessor<AudioDecodeEngine>,
    /// Set after configure/reset: the next chunk must be a key chunk.
    key_chunk_required: AtomicBool,
}

impl AudioDecoder {
    /// Create a decoder delivering results through `init`'s callbacks.
    pub fn new(init: AudioDecoderInit) -> Self {
        Self::with_resource_manager(init, ResourceManager::global().clone())
    }

    /// Create a decoder registered with a specific resource manager.
    pub fn with_resource_manager(init: AudioDecoderInit, manager: ResourceManager) -> Self {
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
    pub fn configure(&self, config: AudioDecoderConfig) -> Result<(), WebCodecsError> {
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
        self.key_chunk_required.store(true, Ordering::SeqCst);
        self.processor.configure(config)
    }

    /// Submit a chunk for decoding.
    pub fn decode(&self, chunk: &EncodedAudioChunk) -> Result<(), WebCodecsError> {
        if self.state() != CodecState::Configured {
            return Err(invalid_state_error("decoder is not configured"));
        }
        if self.key_chunk_required.load(Ordering::SeqCst) {
            if chunk.chunk_type() != EncodedAudioChunkType::Key {
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
    pub fn is_config_supported(config: AudioDecoderConfig) -> Promise<AudioDecoderSupport> {
        if config.sample_rate == 0 || config.number_of_channels == 0 {
            return Promise::rejected(type_error(
                "sampleRate and numberOfChannels must be greater than 0",
            ));
        }
        let supported = match parse_audio_codec(&config.codec) {
            Ok(codec_id) => context::has_decoder(codec_id),
            Err(err) if err.kind() == ErrorKind::Type => return Promise::rejected(err),
            Err(_) => false,
        };
        Promise::resolved(AudioDecoderSupport { supported, config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webcodecs::audio_data::{AudioDataInit, AudioSampleFormat};
    use crate::webcodecs::audio_encoder::{AudioEncoder, AudioEncoderInit};
    use crate::webcodecs::encoded_audio_chunk::{AudioEncoderConfig, EncodedAudioChunkInit};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn test_manager() -> ResourceManager {
        ResourceManager::with_timeout(Duration::from_secs(600))
    }

    fn collecting_decoder() -> (
        AudioDecoder,
        Arc<Mutex<Vec<AudioData>>>,
        Arc<Mutex<Vec<WebCodecsError>>>,
    ) {
        let outputs = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let outputs_clone = outputs.clone();
        let errors_clone = errors.clone();
        let decoder = AudioDecoder::with_resource_manager(
            AudioDecoderInit {
                output: Box::new(move |data| outputs_clone.lock().unwrap().push(data)),
                error: Box::new(move |err| errors_clone.lock().unwrap().push(err)),
            },
            test_manager(),
        );
        (decoder, outputs, errors)
    }

    fn encode_tone(count: usize) -> (Vec<EncodedAudioChunk>, AudioDecoderConfig, Vec<Vec<u8>>) {
        let collected: Arc<
            Mutex<Vec<(EncodedAudioChunk, crate::webcodecs::audio_encoder::EncodedAudioChunkMetadata)>>,
        > = Arc::new(Mutex::new(Vec::new()));
        let collected_clone = collected.clone();
        let encoder = AudioEncoder::with_resource_manager(
            AudioEncoderInit {
                output: Box::new(move |chunk, metadata| {
                    collected_clone.lock().unwrap().push((chunk, metadata));
                }),
                error: Box::new(|err| panic!("encoder error: {}", err)),
            },
            test_manager(),
        );
        encoder
            .configure(AudioEncoderConfig::new("opus", 48_000, 1))
            .unwrap();

        let mut originals = Vec::new();
        for i in 0..count {
            let samples: Vec<f32> = (0..480).map(|n| ((n + i * 480) as f32 * 0.02).sin()).collect();
            let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
            originals.push(bytes.clone());
            let audio = AudioData::from_buffer(
                &bytes,
                AudioDataInit {
                    format: AudioSampleFormat::F32,
                    sample_rate: 48_000,
                    number_of_frames: 480,
                    number_of_channels: 1,
                    timestamp: i as i64 * 10_000,
                },
            )
            .unwrap();
            encoder.encode(&audio).unwrap();
            audio.close();
        }
        encoder.flush().unwrap().wait().unwrap();

        let collected = collected.lock().unwrap();
        let meta = collected[0].1.decoder_config.as_ref().unwrap();
        let mut config = AudioDecoderConfig::new(
            meta.codec.clone(),
            meta.sample_rate.unwrap(),
            meta.number_of_channels.unwrap(),
        );
        config.description = meta.description.clone();
        (
            collected.iter().map(|(c, _)| c.clone()).collect(),
            config,
            originals,
        )
    }

    #[test]
    fn test_roundtrip_preserves_samples_and_timing() {
        let (chunks, config, originals) = encode_tone(4);
        let (decoder, outputs, errors) = collecting_decoder();
        decoder.configure(config).unwrap();
        for chunk in &chunks {
            decoder.decode(chunk).unwrap();
        }
        decoder.flush().unwrap().wait().unwrap();

        assert!(errors.lock().unwrap().is_empty());
        let outputs = outputs.lock().unwrap();
        assert_eq!(outputs.len(), 4);
        for (i, data) in outputs.iter().enumerate() {
            assert_eq!(data.format(), Some(AudioSampleFormat::F32));
            assert_eq!(data.sample_rate(), 48_000);
            assert_eq!(data.number_of_frames(), 480);
            assert_eq!(data.timestamp(), i as i64 * 10_000);
            assert_eq!(data.duration(), 10_000);
            let mut bytes = vec![0u8; data.allocation_size(0).unwrap()];
            data.copy_to(&mut bytes, 0).unwrap();
            assert_eq!(bytes, originals[i]);
            data.close();
        }
    }

    #[test]
    fn test_delta_first_chunk_is_a_data_error() {
        let (_chunks, config, _) = encode_tone(1);
        let (decoder, outputs, errors) = collecting_decoder();
        decoder.configure(config).unwrap();
        let delta = EncodedAudioChunk::new(EncodedAudioChunkInit {
            chunk_type: EncodedAudioChunkType::Delta,
            timestamp: 0,
            duration: None,
            data: vec![0u8; 4],
        });
        decoder.decode(&delta).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while errors.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(errors.lock().unwrap()[0].kind(), ErrorKind::Data);
        assert_eq!(decoder.state(), CodecState::Closed);
        assert!(outputs.lock().unwrap().is_empty());
    }

    #[test]
    fn test_flush_while_unconfigured_is_invalid_state() {
        let (decoder, _outputs, _errors) = collecting_decoder();
        assert_eq!(
            decoder.flush().unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_is_config_supported() {
        let support =
            AudioDecoder::is_config_supported(AudioDecoderConfig::new("opus", 48_000, 2))
                .wait()
                .unwrap();
        assert!(support.supported);
        let support =
            AudioDecoder::is_config_supported(AudioDecoderConfig::new("vorbis", 48_000, 2))
                .wait()
                .unwrap();
        assert!(!support.supported);
        let err = AudioDecoder::is_config_supported(AudioDecoderConfig::new("opus", 0, 2))
            .wait()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }
}
