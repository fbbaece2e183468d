//! GIF demuxing and decoding.
//!
//! The scanner is tolerant of truncated input so callers can parse metadata
//! while bytes are still arriving: it reports every frame it has seen and
//! whether each frame's pixel data is fully present. Decoding composites
//! frames onto a canvas honoring disposal, transparency and interlacing.

use crate::codec::{CodecError, CodecResult};

const TRAILER: u8 = 0x3B;
const EXTENSION: u8 = 0x21;
const IMAGE_DESCRIPTOR: u8 = 0x2C;
const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
const APPLICATION_LABEL: u8 = 0xFF;

/// A scanned GIF stream, possibly still growing.
pub struct GifStream {
    pub width: u32,
    pub height: u32,
    /// Global color table, present only once fully received.
    pub global_palette: Option<Vec<[u8; 3]>>,
    /// Loop count from the NETSCAPE extension: `Some(0)` means loop forever.
    pub loop_count: Option<u16>,
    pub frames: Vec<GifFrame>,
    /// Whether the trailer byte was seen (the stream is structurally final).
    pub trailer_seen: bool,
}

pub struct GifFrame {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub local_palette: Option<Vec<[u8; 3]>>,
    pub interlaced: bool,
    pub min_code_size: u8,
    /// Concatenated LZW sub-block payload.
    pub data: Vec<u8>,
    /// Whether all sub-blocks (including the terminator) were received.
    pub complete: bool,
    /// Frame delay in centiseconds.
    pub delay_cs: u16,
    pub transparent_index: Option<u8>,
    pub disposal: u8,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    fn byte(&mut self) -> Option<u8> {
        self.take(1).map(|s| s[0])
    }

    fn u16_le(&mut self) -> Option<u16> {
        self.take(2).map(|s| u16::from_le_bytes([s[0], s[1]]))
    }

    /// Read data sub-blocks until the 0 terminator. Returns the concatenated
    /// payload and whether the terminator was reached before the data ran out.
    fn sub_blocks(&mut self) -> (Vec<u8>, bool) {
        let mut out = Vec::new();
        loop {
            let Some(size) = self.byte() else {
                return (out, false);
            };
            if size == 0 {
                return (out, true);
            }
            match self.take(size as usize) {
                Some(block) => out.extend_from_slice(block),
                None => return (out, false),
            }
        }
    }
}

fn read_palette(cursor: &mut Cursor<'_>, packed: u8, flag_mask: u8) -> Option<Option<Vec<[u8; 3]>>> {
    if packed & flag_mask == 0 {
        return Some(None);
    }
    let entries = 2usize << (packed & 0x07);
    let bytes = cursor.take(entries * 3)?;
    Some(Some(
        bytes.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
    ))
}

/// Scan as much of `data` as is currently parseable.
///
/// Returns `Ok(None)` when not even the header and screen descriptor have
/// arrived yet. Structural corruption is an error; truncation is not.
pub fn scan(data: &[u8]) -> CodecResult<Option<GifStream>> {
    if data.len() < 6 {
        return Ok(None);
    }
    if &data[..6] != b"GIF87a" && &data[..6] != b"GIF89a" {
        return Err(CodecError::InvalidData("not a GIF header".into()));
    }
    let mut cursor = Cursor { data, pos: 6 };
    let (Some(width), Some(height)) = (cursor.u16_le(), cursor.u16_le()) else {
        return Ok(None);
    };
    let Some(packed) = cursor.byte() else {
        return Ok(None);
    };
    // Background color index and pixel aspect ratio.
    if cursor.take(2).is_none() {
        return Ok(None);
    }

    let mut stream = GifStream {
        width: width as u32,
        height: height as u32,
        global_palette: None,
        loop_count: None,
        frames: Vec::new(),
        trailer_seen: false,
    };

    match read_palette(&mut cursor, packed, 0x80) {
        Some(palette) => stream.global_palette = palette,
        // Global color table still in flight; no frame can decode yet.
        None => return Ok(Some(stream)),
    }

    // Graphic control state applies to the next image descriptor.
    let mut pending_delay: u16 = 0;
    let mut pending_transparent: Option<u8> = None;
    let mut pending_disposal: u8 = 0;

    loop {
        let Some(block) = cursor.byte() else {
            break;
        };
        match block {
            TRAILER => {
                stream.trailer_seen = true;
                break;
            }
            EXTENSION => {
                let Some(label) = cursor.byte() else { break };
                match label {
                    GRAPHIC_CONTROL_LABEL => {
                        let (payload, terminated) = cursor.sub_blocks();
                        if !terminated {
                            break;
                        }
                        if payload.len() >= 4 {
                            pending_disposal = (payload[0] >> 2) & 0x07;
                            pending_delay = u16::from_le_bytes([payload[1], payload[2]]);
                            pending_transparent = if payload[0] & 0x01 != 0 {
                                Some(payload[3])
                            } else {
                                None
                            };
                        }
                    }
                    APPLICATION_LABEL => {
                        let (payload, terminated) = cursor.sub_blocks();
                        if !terminated {
                            break;
                        }
                        // NETSCAPE2.0 looping block: app id (11 bytes), then
                        // sub-block id 1 followed by the loop count.
                        if payload.len() >= 14 && &payload[..11] == b"NETSCAPE2.0" && payload[11] == 1
                        {
                            stream.loop_count =
                                Some(u16::from_le_bytes([payload[12], payload[13]]));
                        }
                    }
                    _ => {
                        let (_, terminated) = cursor.sub_blocks();
                        if !terminated {
                            break;
                        }
                    }
                }
            }
            IMAGE_DESCRIPTOR => {
                let (Some(left), Some(top), Some(w), Some(h)) = (
                    cursor.u16_le(),
                    cursor.u16_le(),
                    cursor.u16_le(),
                    cursor.u16_le(),
                ) else {
                    break;
                };
                let Some(packed) = cursor.byte() else { break };
                let Some(local_palette) = read_palette(&mut cursor, packed, 0x80) else {
                    break;
                };
                let Some(min_code_size) = cursor.byte() else { break };
                if !(2..=8).contains(&min_code_size) {
                    return Err(CodecError::InvalidData(format!(
                        "invalid LZW minimum code size {}",
                        min_code_size
                    )));
                }
                let (pixel_data, terminated) = cursor.sub_blocks();
                stream.frames.push(GifFrame {
                    left: left as u32,
                    top: top as u32,
                    width: w as u32,
                    height: h as u32,
                    local_palette,
                    interlaced: packed & 0x40 != 0,
                    min_code_size,
                    data: pixel_data,
                    complete: terminated,
                    delay_cs: pending_delay,
                    transparent_index: pending_transparent,
                    disposal: pending_disposal,
                });
                pending_delay = 0;
                pending_transparent = None;
                pending_disposal = 0;
                if !terminated {
                    break;
                }
            }
            other => {
                return Err(CodecError::InvalidData(format!(
                    "unexpected GIF block 0x{:02x}",
                    other
                )));
            }
        }
    }

    Ok(Some(stream))
}

// ============================================================================
// LZW
// ============================================================================

fn read_code(data: &[u8], bit_pos: usize, width: u32) -> Option<u16> {
    let mut code: u32 = 0;
    for i in 0..width {
        let pos = bit_pos + i as usize;
        let byte = *data.get(pos / 8)?;
        if byte >> (pos % 8) & 1 != 0 {
            code |= 1 << i;
        }
    }
    Some(code as u16)
}

/// Decode a GIF LZW pixel stream into exactly `expected` color indices.
pub(crate) fn lzw_decode(min_code_size: u8, data: &[u8], expected: usize) -> CodecResult<Vec<u8>> {
    let clear = 1u16 << min_code_size;
    let eoi = clear + 1;
    let base_width = min_code_size as u32 + 1;

    let make_dict = || -> Vec<Vec<u8>> {
        let mut dict: Vec<Vec<u8>> = (0..clear).map(|i| vec![i as u8]).collect();
        dict.push(Vec::new()); // clear
        dict.push(Vec::new()); // end of information
        dict
    };

    let mut dict = make_dict();
    let mut width = base_width;
    let mut out = Vec::with_capacity(expected);
    let mut bit_pos = 0usize;
    let mut prev: Option<u16> = None;

    loop {
        let code = read_code(data, bit_pos, width)
            .ok_or_else(|| CodecError::InvalidData("truncated LZW stream".into()))?;
        bit_pos += width as usize;

        if code == clear {
            dict = make_dict();
            width = base_width;
            prev = None;
            continue;
        }
        if code == eoi {
            break;
        }

        let entry: Vec<u8> = if (code as usize) < dict.len() {
            dict[code as usize].clone()
        } else if code as usize == dict.len() {
            // The KwKwK case: the code being defined right now.
            let prev_entry = prev
                .map(|p| dict[p as usize].clone())
                .ok_or_else(|| CodecError::InvalidData("invalid LZW code".into()))?;
            let mut entry = prev_entry.clone();
            entry.push(prev_entry[0]);
            entry
        } else {
            return Err(CodecError::InvalidData("LZW code out of range".into()));
        };

        out.extend_from_slice(&entry);
        if out.len() > expected {
            return Err(CodecError::InvalidData("LZW output overruns frame".into()));
        }

        if let Some(p) = prev {
            if dict.len() < 4096 {
                let mut new_entry = dict[p as usize].clone();
                new_entry.push(entry[0]);
                dict.push(new_entry);
                if dict.len() == 1 << width && width < 12 {
                    width += 1;
                }
            }
        }
        prev = Some(code);

        if out.len() == expected {
            break;
        }
    }

    if out.len() != expected {
        return Err(CodecError::InvalidData(format!(
            "LZW stream decodes {} of {} pixels",
            out.len(),
            expected
        )));
    }
    Ok(out)
}

// ============================================================================
// Compositing
// ============================================================================

fn deinterlace(rows: u32) -> Vec<u32> {
    let mut order = Vec::with_capacity(rows as usize);
    for start_step in [(0u32, 8u32), (4, 8), (2, 4), (1, 2)] {
        let mut row = start_step.0;
        while row < rows {
            order.push(row);
            row += start_step.1;
        }
    }
    order
}

/// Composite frames `0..=index` and return the canvas as RGBA, together with
/// the frame's presentation timestamp and duration in microseconds.
pub fn compose_frame(stream: &GifStream, index: usize) -> CodecResult<(Vec<u8>, i64, i64)> {
    let frame = stream
        .frames
        .get(index)
        .ok_or_else(|| CodecError::InvalidData("frame index out of range".into()))?;
    if !frame.complete {
        return Err(CodecError::InvalidData("frame data incomplete".into()));
    }

    let cw = stream.width as usize;
    let ch = stream.height as usize;
    let mut canvas = vec![0u8; cw * ch * 4];
    let mut timestamp: i64 = 0;

    for (i, f) in stream.frames.iter().enumerate().take(index + 1) {
        let palette = f
            .local_palette
            .as_ref()
            .or(stream.global_palette.as_ref())
            .ok_or_else(|| CodecError::InvalidData("frame has no color table".into()))?;
        let pixel_count = f.width as usize * f.height as usize;
        let indices = lzw_decode(f.min_code_size, &f.data, pixel_count)?;

        let snapshot = if f.disposal == 3 { Some(canvas.clone()) } else { None };

        let row_order: Vec<u32> = if f.interlaced {
            deinterlace(f.height)
        } else {
            (0..f.height).collect()
        };
        for (src_row, dst_row) in row_order.iter().enumerate() {
            let canvas_y = f.top as usize + *dst_row as usize;
            if canvas_y >= ch {
                continue;
            }
            for col in 0..f.width as usize {
                let canvas_x = f.left as usize + col;
                if canvas_x >= cw {
                    continue;
                }
                let color_index = indices[src_row * f.width as usize + col];
                if f.transparent_index == Some(color_index) {
                    continue;
                }
                let rgb = palette.get(color_index as usize).ok_or_else(|| {
                    CodecError::InvalidData("pixel references missing palette entry".into())
                })?;
                let offset = (canvas_y * cw + canvas_x) * 4;
                canvas[offset] = rgb[0];
                canvas[offset + 1] = rgb[1];
                canvas[offset + 2] = rgb[2];
                canvas[offset + 3] = 255;
            }
        }

        if i == index {
            break;
        }

        // Dispose of this frame before the next one draws.
        match f.disposal {
            2 => {
                for row in 0..f.height as usize {
                    let canvas_y = f.top as usize + row;
                    if canvas_y >= ch {
                        continue;
                    }
                    for col in 0..f.width as usize {
                        let canvas_x = f.left as usize + col;
                        if canvas_x >= cw {
                            continue;
                        }
                        let offset = (canvas_y * cw + canvas_x) * 4;
                        canvas[offset..offset + 4].fill(0);
                    }
                }
            }
            3 => {
                if let Some(snapshot) = snapshot {
                    canvas = snapshot;
                }
            }
            _ => {}
        }

        timestamp += f.delay_cs as i64 * 10_000;
    }

    let duration = frame.delay_cs as i64 * 10_000;
    Ok((canvas, timestamp, duration))
}
