//! Software video codec.
//!
//! A lossless intra/inter codec: key packets carry a run-length-compressed
//! copy of the frame, delta packets carry the run-length-compressed XOR
//! against the previously reconstructed frame. Every packet is
//! self-describing (format and coded size travel in the header), and the
//! encoder additionally exposes the same description as an out-of-band
//! configuration blob for decoders fed from a container.
//!
//! Bitstream layout, little-endian:
//!
//! ```text
//! packet:      "WV" | version u8 | flags u8 (bit0 = key) | format u8
//!              | width u32 | height u32 | rle payload
//! description: "WVC0" | format u8 | width u32 | height u32
//! ```

use std::collections::VecDeque;

use super::frame::{PixelFormat, RawFrame};
use super::packet::Packet;
use super::{CodecError, CodecResult, VideoDecoderSettings, VideoEncoderSettings};

const PACKET_MAGIC: &[u8; 2] = b"WV";
const DESCRIPTION_MAGIC: &[u8; 4] = b"WVC0";
const BITSTREAM_VERSION: u8 = 1;
const FLAG_KEY: u8 = 0x01;
const PACKET_HEADER_LEN: usize = 13;

/// Serialize the out-of-band decoder description for a stream.
pub fn encode_description(format: PixelFormat, width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(13);
    out.extend_from_slice(DESCRIPTION_MAGIC);
    out.push(format.wire_tag());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out
}

/// Parse a decoder description blob.
pub fn parse_description(blob: &[u8]) -> CodecResult<(PixelFormat, u32, u32)> {
    if blob.len() < 13 || &blob[..4] != DESCRIPTION_MAGIC {
        return Err(CodecError::InvalidConfig(
            "unrecognized codec description".into(),
        ));
    }
    let format = PixelFormat::from_wire_tag(blob[4])
        .ok_or_else(|| CodecError::InvalidConfig("unknown pixel format in description".into()))?;
    let width = u32::from_le_bytes([blob[5], blob[6], blob[7], blob[8]]);
    let height = u32::from_le_bytes([blob[9], blob[10], blob[11], blob[12]]);
    Ok((format, width, height))
}

struct PacketHeader {
    key: bool,
    format: PixelFormat,
    width: u32,
    height: u32,
}

fn write_header(out: &mut Vec<u8>, key: bool, format: PixelFormat, width: u32, height: u32) {
    out.extend_from_slice(PACKET_MAGIC);
    out.push(BITSTREAM_VERSION);
    out.push(if key { FLAG_KEY } else { 0 });
    out.push(format.wire_tag());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
}

fn parse_header(data: &[u8]) -> CodecResult<PacketHeader> {
    if data.len() < PACKET_HEADER_LEN || &data[..2] != PACKET_MAGIC {
        return Err(CodecError::InvalidData("not a video packet".into()));
    }
    if data[2] != BITSTREAM_VERSION {
        return Err(CodecError::InvalidData(format!(
            "unsupported bitstream version {}",
            data[2]
        )));
    }
    let format = PixelFormat::from_wire_tag(data[4])
        .ok_or_else(|| CodecError::InvalidData("unknown pixel format tag".into()))?;
    let width = u32::from_le_bytes([data[5], data[6], data[7], data[8]]);
    let height = u32::from_le_bytes([data[9], data[10], data[11], data[12]]);
    if width == 0 || height == 0 {
        return Err(CodecError::InvalidData("zero frame dimensions".into()));
    }
    Ok(PacketHeader {
        key: data[3] & FLAG_KEY != 0,
        format,
        width,
        height,
    })
}

// ============================================================================
// Run-length entropy coding
// ============================================================================

// Control byte 0..=127: literal segment of (control + 1) bytes follows.
// Control byte 128..=255: the next byte repeats (control - 128 + 3) times.
const MIN_RUN: usize = 3;
const MAX_RUN: usize = 130;
const MAX_LITERAL: usize = 128;

fn rle_compress(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() / 4 + 16);
    let mut i = 0;
    while i < src.len() {
        let byte = src[i];
        let mut run = 1;
        while i + run < src.len() && src[i + run] == byte && run < MAX_RUN {
            run += 1;
        }
        if run >= MIN_RUN {
            out.push(128 + (run - MIN_RUN) as u8);
            out.push(byte);
            i += run;
            continue;
        }
        // Literal segment up to the next worthwhile run.
        let start = i;
        let mut end = i;
        while end < src.len() && end - start < MAX_LITERAL {
            let b = src[end];
            let mut r = 1;
            while end + r < src.len() && src[end + r] == b && r < MIN_RUN {
                r += 1;
            }
            if r >= MIN_RUN {
                break;
            }
            end += r;
        }
        let end = end.min(start + MAX_LITERAL);
        out.push((end - start - 1) as u8);
        out.extend_from_slice(&src[start..end]);
        i = end;
    }
    out
}

fn rle_decompress(src: &[u8], expected_len: usize) -> CodecResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut i = 0;
    while i < src.len() {
        let control = src[i];
        i += 1;
        if control < 128 {
            let count = control as usize + 1;
            if i + count > src.len() {
                return Err(CodecError::InvalidData("truncated literal segment".into()));
            }
            out.extend_from_slice(&src[i..i + count]);
            i += count;
        } else {
            if i >= src.len() {
                return Err(CodecError::InvalidData("truncated run".into()));
            }
            let count = (control - 128) as usize + MIN_RUN;
            out.extend(std::iter::repeat(src[i]).take(count));
            i += 1;
        }
        if out.len() > expected_len {
            return Err(CodecError::InvalidData("payload overruns frame size".into()));
        }
    }
    if out.len() != expected_len {
        return Err(CodecError::InvalidData(format!(
            "payload decodes to {} bytes, expected {}",
            out.len(),
            expected_len
        )));
    }
    Ok(out)
}

// ============================================================================
// Encoder
// ============================================================================

/// Software video encoder state.
pub struct BlockVideoEncoder {
    settings: VideoEncoderSettings,
    previous: Option<Vec<u8>>,
    frame_index: u64,
    force_key: bool,
    pending: VecDeque<Packet>,
}

impl BlockVideoEncoder {
    pub fn new(settings: &VideoEncoderSettings) -> CodecResult<Self> {
        if settings.width == 0 || settings.height == 0 {
            return Err(CodecError::InvalidConfig(format!(
                "invalid coded size {}x{}",
                settings.width, settings.height
            )));
        }
        if settings.gop_size == 0 {
            return Err(CodecError::InvalidConfig("gop size must be non-zero".into()));
        }
        Ok(Self {
            settings: settings.clone(),
            previous: None,
            frame_index: 0,
            force_key: false,
            pending: VecDeque::new(),
        })
    }

    /// Decoder description for this stream (format and coded size).
    pub fn extradata(&self) -> Vec<u8> {
        encode_description(
            self.settings.pixel_format,
            self.settings.width,
            self.settings.height,
        )
    }

    /// Force the next submitted frame to be encoded as a keyframe.
    pub fn request_key_frame(&mut self) {
        self.force_key = true;
    }

    /// Encode one frame. Produced packets are queued for `receive_packet`.
    pub fn send_frame(&mut self, frame: &RawFrame) -> CodecResult<()> {
        if frame.format() != self.settings.pixel_format
            || frame.width() != self.settings.width
            || frame.height() != self.settings.height
        {
            return Err(CodecError::InvalidConfig(format!(
                "frame {:?} {}x{} does not match configured {:?} {}x{}",
                frame.format(),
                frame.width(),
                frame.height(),
                self.settings.pixel_format,
                self.settings.width,
                self.settings.height
            )));
        }

        let key = self.force_key
            || self.previous.is_none()
            || self.frame_index % self.settings.gop_size as u64 == 0;

        let mut data = Vec::new();
        write_header(
            &mut data,
            key,
            frame.format(),
            frame.width(),
            frame.height(),
        );
        if key {
            data.extend_from_slice(&rle_compress(frame.data()));
        } else {
            let previous = self.previous.as_ref().ok_or(CodecError::NotConfigured)?;
            let residual: Vec<u8> = frame
                .data()
                .iter()
                .zip(previous.iter())
                .map(|(cur, prev)| cur ^ prev)
                .collect();
            data.extend_from_slice(&rle_compress(&residual));
        }

        self.previous = Some(frame.data().to_vec());
        self.frame_index += 1;
        self.force_key = false;
        self.pending.push_back(
            Packet::new(data, frame.pts())
                .with_duration(frame.duration())
                .with_key(key),
        );
        Ok(())
    }

    /// Pop the next produced packet, if any.
    pub fn receive_packet(&mut self) -> Option<Packet> {
        self.pending.pop_front()
    }

    /// Drain everything still buffered. The codec stays usable afterwards.
    pub fn flush(&mut self) -> Vec<Packet> {
        self.pending.drain(..).collect()
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Software video decoder state.
pub struct BlockVideoDecoder {
    /// Stream parameters from the out-of-band description, when provided.
    expected: Option<(PixelFormat, u32, u32)>,
    previous: Option<(PacketKind, Vec<u8>)>,
    pending: VecDeque<RawFrame>,
}

struct PacketKind {
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl BlockVideoDecoder {
    pub fn new(settings: &VideoDecoderSettings) -> CodecResult<Self> {
        let expected = match settings.description.as_deref() {
            Some(blob) => Some(parse_description(blob)?),
            None => None,
        };
        Ok(Self {
            expected,
            previous: None,
            pending: VecDeque::new(),
        })
    }

    /// Decode one packet. Produced frames are queued for `receive_frame`.
    pub fn send_packet(&mut self, packet: &Packet) -> CodecResult<()> {
        let header = parse_header(packet.data())?;
        if let Some((format, width, height)) = self.expected {
            if header.format != format || header.width != width || header.height != height {
                return Err(CodecError::InvalidData(format!(
                    "packet {:?} {}x{} does not match stream description {:?} {}x{}",
                    header.format, header.width, header.height, format, width, height
                )));
            }
        }

        let frame_size = header.format.buffer_size(header.width, header.height);
        let payload = &packet.data()[PACKET_HEADER_LEN..];
        let reconstructed = if header.key {
            rle_decompress(payload, frame_size)?
        } else {
            let (prev_kind, prev_data) = self
                .previous
                .as_ref()
                .ok_or_else(|| CodecError::InvalidData("delta packet without reference".into()))?;
            if prev_kind.format != header.format
                || prev_kind.width != header.width
                || prev_kind.height != header.height
            {
                return Err(CodecError::InvalidData(
                    "delta packet does not match reference frame".into(),
                ));
            }
            let residual = rle_decompress(payload, frame_size)?;
            residual
                .iter()
                .zip(prev_data.iter())
                .map(|(delta, prev)| delta ^ prev)
                .collect()
        };

        let mut frame = RawFrame::from_data(
            header.format,
            header.width,
            header.height,
            reconstructed.clone(),
        )?;
        frame.set_pts(packet.pts());
        frame.set_duration(packet.duration());

        self.previous = Some((
            PacketKind {
                format: header.format,
                width: header.width,
                height: header.height,
            },
            reconstructed,
        ));
        self.pending.push_back(frame);
        Ok(())
    }

    /// Pop the next decoded frame, if any.
    pub fn receive_frame(&mut self) -> Option<RawFrame> {
        self.pending.pop_front()
    }

    /// Drain everything still buffered. The codec stays usable afterwards.
    pub fn flush(&mut self) -> Vec<RawFrame> {
        self.pending.drain(..).collect()
    }

    /// Drop reference state. The next packet must be a keyframe.
    pub fn flush_buffers(&mut self) {
        self.previous = None;
        self.pending.clear();
    }
}
