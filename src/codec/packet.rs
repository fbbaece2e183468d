//! Encoded packet type.
//!
//! The unit of encoded data moving between the codec contexts and their
//! callers. Payload bytes are shared via [`MediaBuf`]; timing is in
//! microseconds.

use super::buffer::MediaBuf;

/// An encoded packet with timing and keyframe metadata.
#[derive(Debug, Clone)]
pub struct Packet {
    data: MediaBuf,
    pts: i64,
    duration: Option<i64>,
    key: bool,
}

impl Packet {
    pub fn new(data: Vec<u8>, pts: i64) -> Self {
        Self {
            data: MediaBuf::new(data),
            pts,
            duration: None,
            key: false,
        }
    }

    /// Wrap an existing shared payload without copying.
    pub fn from_buf(data: MediaBuf, pts: i64) -> Self {
        Self {
            data,
            pts,
            duration: None,
            key: false,
        }
    }

    pub fn with_duration(mut self, duration: Option<i64>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_key(mut self, key: bool) -> Self {
        self.key = key;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn buf(&self) -> &MediaBuf {
        &self.data
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn duration(&self) -> Option<i64> {
        self.duration
    }

    pub fn is_key(&self) -> bool {
        self.key
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_metadata() {
        let pkt = Packet::new(vec![1, 2, 3], 42).with_key(true).with_duration(Some(33_333));
        assert!(pkt.is_key());
        assert_eq!(pkt.pts(), 42);
        assert_eq!(pkt.duration(), Some(33_333));
        assert_eq!(pkt.size(), 3);
    }
}
