//! Shared media payload buffer.
//!
//! Raw frames, audio sample buffers and encoded packets all carry their bytes
//! in a `MediaBuf`: an immutable, atomically reference-counted allocation.
//! Cloning a `MediaBuf` is cheap and never copies; the underlying allocation
//! is released when the last clone drops. Payloads can be large (a single
//! 1080p I420 frame is ~3 MiB), so the module keeps a live-allocation counter
//! that the tests use to prove buffers are actually released.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static LIVE_BUFFERS: AtomicUsize = AtomicUsize::new(0);

/// Number of `MediaBuf` allocations currently alive in the process.
pub(crate) fn live_buffer_count() -> usize {
    LIVE_BUFFERS.load(Ordering::SeqCst)
}

struct Allocation {
    bytes: Box<[u8]>,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        LIVE_BUFFERS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Immutable, reference-counted byte payload.
#[derive(Clone)]
pub struct MediaBuf {
    inner: Arc<Allocation>,
}

impl MediaBuf {
    /// Take ownership of `bytes` as a new shared payload.
    pub fn new(bytes: Vec<u8>) -> Self {
        LIVE_BUFFERS.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: Arc::new(Allocation {
                bytes: bytes.into_boxed_slice(),
            }),
        }
    }

    /// Copy `bytes` into a new shared payload.
    pub fn copy_from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.inner.bytes
    }

    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    /// Number of handles currently sharing this allocation.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl Deref for MediaBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Debug for MediaBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaBuf")
            .field("len", &self.len())
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl From<Vec<u8>> for MediaBuf {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}
