//! PNG decoding via the `png` crate.

use crate::codec::{CodecError, CodecResult};

/// Parse the image dimensions from the signature and IHDR chunk.
///
/// Returns `Ok(None)` while fewer than the first 24 bytes have arrived.
pub fn probe(data: &[u8]) -> CodecResult<Option<(u32, u32)>> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    if data.len() < 8 {
        return Ok(None);
    }
    if data[..8] != SIGNATURE {
        return Err(CodecError::InvalidData("not a PNG signature".into()));
    }
    // Signature, IHDR length + tag, then width/height big-endian.
    if data.len() < 24 {
        return Ok(None);
    }
    if &data[12..16] != b"IHDR" {
        return Err(CodecError::InvalidData("first PNG chunk is not IHDR".into()));
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    if width == 0 || height == 0 {
        return Err(CodecError::InvalidData("zero PNG dimensions".into()));
    }
    Ok(Some((width, height)))
}

/// Decode the image to RGBA.
///
/// Returns `Ok(None)` when the data is merely truncated (still streaming in);
/// anything structurally wrong is an error.
pub fn decode(data: &[u8]) -> CodecResult<Option<(Vec<u8>, u32, u32)>> {
    let mut decoder = png::Decoder::new(std::io::Cursor::new(data));
    decoder.set_transformations(png::Transformations::normalize_to_color8());

    let mut reader = match decoder.read_info() {
        Ok(reader) => reader,
        Err(err) => return map_error(err),
    };
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = match reader.next_frame(&mut buf) {
        Ok(info) => info,
        Err(err) => return map_error(err),
    };
    buf.truncate(info.buffer_size());

    let rgba = match info.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::Rgb => buf
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect(),
        png::ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .flat_map(|px| [px[0], px[0], px[0], px[1]])
            .collect(),
        other => {
            return Err(CodecError::InvalidData(format!(
                "unexpected PNG color type {:?} after expansion",
                other
            )))
        }
    };
    Ok(Some((rgba, info.width, info.height)))
}

fn map_error<T>(err: png::DecodingError) -> CodecResult<Option<T>> {
    match err {
        png::DecodingError::IoError(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            Ok(None)
        }
        other => Err(CodecError::InvalidData(format!("PNG decode failed: {}", other))),
    }
}
