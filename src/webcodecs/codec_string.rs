//! Codec string parsing.
//!
//! Maps WebCodecs codec strings to the library's codec identifiers.
//! A string that is not even shaped like a codec string is a *type* error;
//! a well-formed string naming a codec family the registry does not know is
//! *not-supported*. Whether an implementation actually exists for a known
//! identifier is the codec library's call, not this module's.

use crate::codec::CodecId;

use super::error::{not_supported_error, type_error, WebCodecsError};

fn validate_shape(codec: &str) -> Result<(), WebCodecsError> {
    if codec.is_empty() {
        return Err(type_error("codec string must not be empty"));
    }
    if codec.chars().any(|c| c.is_whitespace()) || !codec.is_ascii() {
        return Err(type_error(format!("malformed codec string: {:?}", codec)));
    }
    Ok(())
}

/// Parse a video codec string (e.g. `avc1.42001E`, `vp8`, `vp09.00.10.08`).
pub fn parse_video_codec(codec: &str) -> Result<CodecId, WebCodecsError> {
    validate_shape(codec)?;
    let lower = codec.to_ascii_lowercase();

    if lower.starts_with("avc1.") || lower.starts_with("avc3.") {
        Ok(CodecId::H264)
    } else if lower.starts_with("hev1.") || lower.starts_with("hvc1.") {
        Ok(CodecId::Hevc)
    } else if lower == "vp8" {
        Ok(CodecId::Vp8)
    } else if lower == "vp9" || lower.starts_with("vp09.") {
        Ok(CodecId::Vp9)
    } else if lower.starts_with("av01.") {
        Ok(CodecId::Av1)
    } else {
        Err(not_supported_error(format!(
            "unrecognized video codec: {}",
            codec
        )))
    }
}

/// Parse an audio codec string (e.g. `opus`, `mp4a.40.2`, `pcm-f32`).
pub fn parse_audio_codec(codec: &str) -> Result<CodecId, WebCodecsError> {
    validate_shape(codec)?;
    let lower = codec.to_ascii_lowercase();

    if lower == "opus" {
        Ok(CodecId::Opus)
    } else if lower == "mp4a.40.2" || lower == "mp4a.40.02" || lower == "mp4a.40.5" {
        Ok(CodecId::Aac)
    } else if lower.starts_with("pcm-") {
        Ok(CodecId::Pcm)
    } else if lower == "flac" {
        Ok(CodecId::Flac)
    } else if lower == "vorbis" {
        Ok(CodecId::Vorbis)
    } else {
        Err(not_supported_error(format!(
            "unrecognized audio codec: {}",
            codec
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webcodecs::error::ErrorKind;

    #[test]
    fn test_video_families() {
        assert_eq!(parse_video_codec("avc1.42001E").unwrap(), CodecId::H264);
        assert_eq!(parse_video_codec("AVC3.64001f").unwrap(), CodecId::H264);
        assert_eq!(parse_video_codec("vp8").unwrap(), CodecId::Vp8);
        assert_eq!(parse_video_codec("vp09.00.10.08").unwrap(), CodecId::Vp9);
        assert_eq!(parse_video_codec("av01.0.04M.08").unwrap(), CodecId::Av1);
        assert_eq!(parse_video_codec("hvc1.1.6.L93.B0").unwrap(), CodecId::Hevc);
    }

    #[test]
    fn test_audio_families() {
        assert_eq!(parse_audio_codec("opus").unwrap(), CodecId::Opus);
        assert_eq!(parse_audio_codec("mp4a.40.2").unwrap(), CodecId::Aac);
        assert_eq!(parse_audio_codec("pcm-f32").unwrap(), CodecId::Pcm);
    }

    #[test]
    fn test_malformed_is_type_error() {
        assert_eq!(parse_video_codec("").unwrap_err().kind(), ErrorKind::Type);
        assert_eq!(
            parse_video_codec("avc1 42001E").unwrap_err().kind(),
            ErrorKind::Type
        );
    }

    #[test]
    fn test_unrecognized_is_not_supported() {
        assert_eq!(
            parse_video_codec("theora").unwrap_err().kind(),
            ErrorKind::NotSupported
        );
        assert_eq!(
            parse_audio_codec("mp3").unwrap_err().kind(),
            ErrorKind::NotSupported
        );
    }
}
