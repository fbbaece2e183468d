//! Image format library.
//!
//! The image decoder delegates demuxing and pixel decoding here. All formats
//! decode to RGBA [`RawFrame`]s; metadata probing tolerates truncated input so
//! streaming callers can surface track information before the payload is
//! fully received.

pub mod gif;
pub mod png;

use super::frame::{PixelFormat, RawFrame};
use super::{CodecError, CodecResult};

/// Image formats the library can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Gif,
    Png,
}

/// Map a MIME type to a supported format.
pub fn format_for_mime(mime_type: &str) -> Option<ImageFormat> {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/gif" => Some(ImageFormat::Gif),
        "image/png" => Some(ImageFormat::Png),
        _ => None,
    }
}

/// Parsed stream metadata. `frame_count` may still grow while
/// `parsed_to_end` is false.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub animated: bool,
    /// Number of times the animation repeats; `None` means loop forever.
    pub repetitions: Option<u32>,
    /// Whether the structural end of the stream was reached.
    pub parsed_to_end: bool,
}

/// Probe `data` for stream metadata.
///
/// `Ok(None)` means more bytes are needed before anything can be said;
/// corruption is an error.
pub fn probe(format: ImageFormat, data: &[u8]) -> CodecResult<Option<ImageInfo>> {
    match format {
        ImageFormat::Gif => {
            let Some(stream) = gif::scan(data)? else {
                return Ok(None);
            };
            let complete_frames = stream.frames.iter().filter(|f| f.complete).count() as u32;
            Ok(Some(ImageInfo {
                width: stream.width,
                height: stream.height,
                frame_count: complete_frames,
                animated: complete_frames > 1 || stream.loop_count.is_some(),
                repetitions: match stream.loop_count {
                    None => Some(0),
                    Some(0) => None,
                    Some(n) => Some(n as u32),
                },
                parsed_to_end: stream.trailer_seen,
            }))
        }
        ImageFormat::Png => {
            let Some((width, height)) = png::probe(data)? else {
                return Ok(None);
            };
            // A PNG is a single static frame; it is final once it decodes.
            let parsed_to_end = png::decode(data)?.is_some();
            Ok(Some(ImageInfo {
                width,
                height,
                frame_count: 1,
                animated: false,
                repetitions: Some(0),
                parsed_to_end,
            }))
        }
    }
}

/// Decode frame `index` of the stream to an RGBA frame.
///
/// `Ok(None)` means the frame's bytes have not fully arrived yet. The frame's
/// timestamp and duration carry the animation timing.
pub fn decode_frame(format: ImageFormat, data: &[u8], index: u32) -> CodecResult<Option<RawFrame>> {
    match format {
        ImageFormat::Gif => {
            let Some(stream) = gif::scan(data)? else {
                return Ok(None);
            };
            match stream.frames.get(index as usize) {
                Some(frame) if frame.complete => {}
                _ => return Ok(None),
            }
            let (rgba, timestamp, duration) = gif::compose_frame(&stream, index as usize)?;
            let mut frame = RawFrame::from_data(PixelFormat::Rgba, stream.width, stream.height, rgba)?;
            frame.set_pts(timestamp);
            frame.set_duration(Some(duration));
            Ok(Some(frame))
        }
        ImageFormat::Png => {
            if index != 0 {
                return Err(CodecError::InvalidData("PNG has a single frame".into()));
            }
            let Some((rgba, width, height)) = png::decode(data)? else {
                return Ok(None);
            };
            RawFrame::from_data(PixelFormat::Rgba, width, height, rgba).map(Some)
        }
    }
}

/// Nearest-neighbor scale of an RGBA frame.
pub fn scale_rgba(frame: &RawFrame, width: u32, height: u32) -> CodecResult<RawFrame> {
    if frame.format() != PixelFormat::Rgba {
        return Err(CodecError::UnsupportedPixelFormat(frame.format()));
    }
    let width = width.max(1);
    let height = height.max(1);
    if width == frame.width() && height == frame.height() {
        return Ok(frame.clone());
    }
    let src = frame.data();
    let (sw, sh) = (frame.width() as usize, frame.height() as usize);
    let mut dst = vec![0u8; width as usize * height as usize * 4];
    for y in 0..height as usize {
        let sy = y * sh / height as usize;
        for x in 0..width as usize {
            let sx = x * sw / width as usize;
            let s = (sy * sw + sx) * 4;
            let d = (y * width as usize + x) * 4;
            dst[d..d + 4].copy_from_slice(&src[s..s + 4]);
        }
    }
    let mut scaled = RawFrame::from_data(PixelFormat::Rgba, width, height, dst)?;
    scaled.set_pts(frame.pts());
    scaled.set_duration(frame.duration());
    Ok(scaled)
}


#[cfg(test)]
mod tests {
    use super::test_support::{animated_gif_fixture, png_fixture, static_gif_fixture};
    use super::*;

    #[test]
    fn test_mime_mapping() {
        assert_eq!(format_for_mime("image/gif"), Some(ImageFormat::Gif));
        assert_eq!(format_for_mime("IMAGE/PNG"), Some(ImageFormat::Png));
        assert_eq!(format_for_mime("image/webp"), None);
    }

    #[test]
    fn test_probe_animated_gif() {
        let info = probe(ImageFormat::Gif, &animated_gif_fixture()).unwrap().unwrap();
        assert_eq!(info.frame_count, 2);
        assert!(info.animated);
        assert_eq!(info.repetitions, None);
        assert!(info.parsed_to_end);
    }

    #[test]
    fn test_probe_static_gif() {
        let info = probe(ImageFormat::Gif, &static_gif_fixture()).unwrap().unwrap();
        assert_eq!(info.frame_count, 1);
        assert!(!info.animated);
        assert_eq!(info.repetitions, Some(0));
    }

    #[test]
    fn test_decode_frame_timing() {
        let bytes = animated_gif_fixture();
        let frame = decode_frame(ImageFormat::Gif, &bytes, 1).unwrap().unwrap();
        assert_eq!(frame.pts(), 100_000);
        assert_eq!(frame.duration(), Some(100_000));
        assert_eq!((frame.width(), frame.height()), (2, 2));
    }

    #[test]
    fn test_decode_png() {
        let bytes = png_fixture(4, 4, [9, 8, 7, 255]);
        let frame = decode_frame(ImageFormat::Png, &bytes, 0).unwrap().unwrap();
        assert_eq!(frame.data()[..4], [9, 8, 7, 255]);
    }

    #[test]
    fn test_scale_rgba() {
        let bytes = png_fixture(4, 4, [1, 2, 3, 255]);
        let frame = decode_frame(ImageFormat::Png, &bytes, 0).unwrap().unwrap();
        let scaled = scale_rgba(&frame, 2, 8).unwrap();
        assert_eq!((scaled.width(), scaled.height()), (2, 8));
        assert_eq!(scaled.data()[..4], [1, 2, 3, 255]);
    }
}
