#![deny(clippy::all)]

//! WebCodecs codec processing core.
//!
//! An implementation of the WebCodecs codec objects: audio/video
//! encoders and decoders plus an image decoder, each backed by a control
//! message queue, a bounded work queue with a dedicated worker thread, and a
//! dispatcher that delivers outputs and errors back through application
//! callbacks. A process-wide resource manager reclaims codecs that go idle.

// Built-in codec library (software codecs, RAII contexts)
pub mod codec;

// WebCodecs API surface
pub mod webcodecs;

// Re-export WebCodecs types at crate root
pub use webcodecs::{
    // Video types
    AlphaOption, BitrateMode, CodecState, EncodedVideoChunk, EncodedVideoChunkInit,
    EncodedVideoChunkMetadata, EncodedVideoChunkType, HardwareAcceleration, LatencyMode,
    VideoColorSpace, VideoDecoder, VideoDecoderConfig, VideoDecoderConfigOutput, VideoDecoderInit,
    VideoDecoderSupport, VideoEncoder, VideoEncoderConfig, VideoEncoderEncodeOptions,
    VideoEncoderInit, VideoEncoderSupport, VideoFrame, VideoFrameBufferInit, VideoFrameRect,
    VideoPixelFormat,
    // Audio types
    AudioData, AudioDataInit, AudioDecoder, AudioDecoderConfig, AudioDecoderConfigOutput,
    AudioDecoderInit, AudioDecoderSupport, AudioEncoder, AudioEncoderConfig, AudioEncoderInit,
    AudioEncoderSupport, AudioSampleFormat, EncodedAudioChunk, EncodedAudioChunkInit,
    EncodedAudioChunkMetadata, EncodedAudioChunkType,
    // Image decoding
    ColorSpaceConversion, ImageDataSource, ImageDecodeOptions, ImageDecodeResult, ImageDecoder,
    ImageDecoderInit, ImageTrack, ImageTrackList,
    // Shared machinery
    CodecKind, ErrorKind, Promise, ResourceManager, WebCodecsError,
};
