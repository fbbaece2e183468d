//! WebCodecs API surface.
//!
//! The five codec objects with their state machines and queues, the media
//! resource and encoded chunk types, and the process-wide resource manager.

mod audio_data;
mod audio_decoder;
mod audio_encoder;
pub mod codec_string;
mod control_queue;
mod dispatcher;
mod encoded_audio_chunk;
mod encoded_video_chunk;
pub mod error;
mod image_decoder;
mod processor;
mod promise;
mod resource_manager;
mod video_decoder;
mod video_encoder;
mod video_frame;
mod work_queue;

pub use audio_data::{AudioData, AudioDataInit, AudioSampleFormat};
pub use audio_decoder::{AudioDecoder, AudioDecoderInit, AudioDecoderSupport};
pub use audio_encoder::{
    AudioDecoderConfigOutput, AudioEncoder, AudioEncoderInit, AudioEncoderSupport,
    EncodedAudioChunkMetadata,
};
pub use encoded_audio_chunk::{
    AacEncoderConfig, AacFormat, AudioDecoderConfig, AudioEncoderConfig, EncodedAudioChunk,
    EncodedAudioChunkInit, EncodedAudioChunkType, OpusApplication, OpusEncoderConfig,
};
pub use encoded_video_chunk::{
    AlphaOption, BitrateMode, EncodedVideoChunk, EncodedVideoChunkInit, EncodedVideoChunkType,
    HardwareAcceleration, LatencyMode, VideoDecoderConfig, VideoEncoderConfig,
};
pub use error::{ErrorKind, WebCodecsError};
pub use image_decoder::{
    ColorSpaceConversion, ImageDataSource, ImageDecodeOptions, ImageDecodeResult, ImageDecoder,
    ImageDecoderInit, ImageTrack, ImageTrackList,
};
pub use processor::{CodecState, DEFAULT_HARD_CAP, DEFAULT_READY_THRESHOLD};
pub use promise::Promise;
pub use resource_manager::{CodecKind, ResourceManager, DEFAULT_INACTIVITY_TIMEOUT};
pub use video_decoder::{VideoDecoder, VideoDecoderInit, VideoDecoderSupport};
pub use video_encoder::{
    EncodedVideoChunkMetadata, VideoDecoderConfigOutput, VideoEncoder, VideoEncoderEncodeOptions,
    VideoEncoderInit, VideoEncoderSupport,
};
pub use video_frame::{
    VideoColorPrimaries, VideoColorSpace, VideoFrame, VideoFrameBufferInit, VideoFrameRect,
    VideoMatrixCoefficients, VideoPixelFormat, VideoTransferCharacteristics,
};
