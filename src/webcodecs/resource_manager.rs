//! Codec resource manager.
//!
//! A registry of configured codecs with their last-activity timestamps.
//! Codecs that go idle (or sit in the background unprotected) are reclaimed:
//! their close algorithm runs with a *quota-exceeded* error through the error
//! callback. The process-wide instance sweeps periodically; tests inject a
//! fresh manager with a short timeout instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};

/// The kinds of codec objects the manager tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    AudioEncoder,
    VideoEncoder,
    AudioDecoder,
    VideoDecoder,
    ImageDecoder,
}

impl CodecKind {
    pub fn is_encoder(&self) -> bool {
        matches!(self, CodecKind::AudioEncoder | CodecKind::VideoEncoder)
    }

    /// For decoders, the encoder kind whose activity protects them.
    fn paired_encoder(&self) -> Option<CodecKind> {
        match self {
            CodecKind::AudioDecoder => Some(CodecKind::AudioEncoder),
            CodecKind::VideoDecoder => Some(CodecKind::VideoEncoder),
            _ => None,
        }
    }
}

/// Implemented by codec internals so the manager can force-close them.
pub(crate) trait Reclaimable: Send + Sync {
    /// Run the codec's close algorithm with a quota-exceeded error.
    fn reclaim(&self);
}

struct Entry {
    kind: CodecKind,
    last_activity: Arc<Mutex<Instant>>,
    background: Arc<AtomicBool>,
    hook: Weak<dyn Reclaimable>,
}

struct ManagerInner {
    timeout: Duration,
    entries: Mutex<HashMap<u64, Entry>>,
    next_id: AtomicU64,
}

/// Registry of configured codecs; reclaims the inactive ones.
#[derive(Clone)]
pub struct ResourceManager {
    inner: Arc<ManagerInner>,
}

/// Default inactivity window before a codec becomes reclaimable.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

impl ResourceManager {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_INACTIVITY_TIMEOUT)
    }

    /// A manager with a custom inactivity window (primarily for tests).
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                timeout,
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// The process-wide manager used by codecs unless one is injected.
    /// Starts a sweeper on first use.
    pub fn global() -> &'static ResourceManager {
        static GLOBAL: OnceLock<ResourceManager> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let manager = ResourceManager::new();
            manager.start_sweeper(DEFAULT_INACTIVITY_TIMEOUT / 2);
            manager
        })
    }

    pub fn inactivity_timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Spawn a background thread calling `reclaim_inactive` on an interval.
    /// The thread ends when the manager (all clones) is dropped.
    pub fn start_sweeper(&self, interval: Duration) {
        let weak = Arc::downgrade(&self.inner);
        std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            match weak.upgrade() {
                Some(inner) => {
                    let reclaimed = ResourceManager { inner }.reclaim_inactive();
                    if reclaimed > 0 {
                        log::info!("reclaimed {} inactive codec(s)", reclaimed);
                    }
                }
                None => return,
            }
        });
    }

    pub(crate) fn register(
        &self,
        kind: CodecKind,
        hook: Weak<dyn Reclaimable>,
        last_activity: Arc<Mutex<Instant>>,
        background: Arc<AtomicBool>,
    ) -> ResourceToken {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .lock()
            .expect("resource registry poisoned")
            .insert(
                id,
                Entry {
                    kind,
                    last_activity,
                    background,
                    hook,
                },
            );
        log::debug!("registered {:?} codec #{}", kind, id);
        ResourceToken {
            manager: self.clone(),
            id,
        }
    }

    fn unregister(&self, id: u64) {
        self.inner
            .entries
            .lock()
            .expect("resource registry poisoned")
            .remove(&id);
    }

    /// Number of codecs currently registered.
    pub fn registered_count(&self) -> usize {
        self.inner
            .entries
            .lock()
            .expect("resource registry poisoned")
            .len()
    }

    /// Close every reclaimable codec and return how many were reclaimed.
    ///
    /// A codec is *inactive* when it has seen no activity within the timeout
    /// window, and *reclaimable* when it is inactive or backgrounded, unless
    /// protected: active encoders are never reclaimed, and a decoder is kept
    /// while an active encoder of its media kind exists in the process.
    pub fn reclaim_inactive(&self) -> usize {
        let now = Instant::now();
        let timeout = self.inner.timeout;

        let (victims, dead): (Vec<(u64, Arc<dyn Reclaimable>)>, Vec<u64>) = {
            let entries = self.inner.entries.lock().expect("resource registry poisoned");

            let is_inactive = |entry: &Entry| {
                let last = *entry.last_activity.lock().expect("activity clock poisoned");
                now.duration_since(last) > timeout
            };

            let mut active_encoders: Vec<CodecKind> = Vec::new();
            for entry in entries.values() {
                if entry.kind.is_encoder() && !is_inactive(entry) {
                    active_encoders.push(entry.kind);
                }
            }

            let mut victims = Vec::new();
            let mut dead = Vec::new();
            for (&id, entry) in entries.iter() {
                let Some(hook) = entry.hook.upgrade() else {
                    dead.push(id);
                    continue;
                };
                let inactive = is_inactive(entry);
                let background = entry.background.load(Ordering::SeqCst);
                let protected = if entry.kind.is_encoder() {
                    !inactive
                } else {
                    entry
                        .kind
                        .paired_encoder()
                        .is_some_and(|enc| active_encoders.contains(&enc))
                };
                if (inactive || background) && !protected {
                    victims.push((id, hook));
                }
            }
            (victims, dead)
        };

        for id in dead {
            self.unregister(id);
        }

        let count = victims.len();
        for (id, hook) in victims {
            log::info!("reclaiming inactive codec #{}", id);
            hook.reclaim();
            self.unregister(id);
        }
        count
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A codec's registration handle; unregisters on drop.
pub(crate) struct ResourceToken {
    manager: ResourceManager,
    id: u64,
}

impl Drop for ResourceToken {
    fn drop(&mut self) {
        self.manager.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct TestCodec {
        reclaimed: AtomicUsize,
    }

    impl Reclaimable for TestCodec {
        fn reclaim(&self) {
            self.reclaimed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn register_codec(
        manager: &ResourceManager,
        kind: CodecKind,
        last_activity: Instant,
    ) -> (Arc<TestCodec>, ResourceToken, Arc<Mutex<Instant>>) {
        let codec = Arc::new(TestCodec {
            reclaimed: AtomicUsize::new(0),
        });
        let activity = Arc::new(Mutex::new(last_activity));
        let token = manager.register(
            kind,
            Arc::downgrade(&codec) as Weak<dyn Reclaimable>,
            activity.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        (codec, token, activity)
    }

    #[test]
    fn test_inactive_encoder_is_reclaimed() {
        let manager = ResourceManager::with_timeout(Duration::from_millis(10));
        let stale = Instant::now() - Duration::from_secs(1);
        let (codec, _token, _) = register_codec(&manager, CodecKind::VideoEncoder, stale);
        assert_eq!(manager.reclaim_inactive(), 1);
        assert_eq!(codec.reclaimed.load(Ordering::SeqCst), 1);
        assert_eq!(manager.registered_count(), 0);
    }

    #[test]
    fn test_active_encoder_is_kept() {
        let manager = ResourceManager::with_timeout(Duration::from_secs(60));
        let (codec, _token, _) =
            register_codec(&manager, CodecKind::VideoEncoder, Instant::now());
        assert_eq!(manager.reclaim_inactive(), 0);
        assert_eq!(codec.reclaimed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_decoder_protected_by_active_paired_encoder() {
        let manager = ResourceManager::with_timeout(Duration::from_millis(10));
        let stale = Instant::now() - Duration::from_secs(1);
        let (_enc, _enc_token, _) =
            register_codec(&manager, CodecKind::VideoEncoder, Instant::now());
        let (dec, _dec_token, _) = register_codec(&manager, CodecKind::VideoDecoder, stale);
        let (audio_dec, _audio_token, _) =
            register_codec(&manager, CodecKind::AudioDecoder, stale);

        // The stale video encoder's pairing protects the video decoder only.
        manager.reclaim_inactive();
        assert_eq!(dec.reclaimed.load(Ordering::SeqCst), 0);
        assert_eq!(audio_dec.reclaimed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_background_codec_reclaimed_even_when_recently_active() {
        let manager = ResourceManager::with_timeout(Duration::from_secs(60));
        let codec = Arc::new(TestCodec {
            reclaimed: AtomicUsize::new(0),
        });
        let background = Arc::new(AtomicBool::new(true));
        let _token = manager.register(
            CodecKind::VideoDecoder,
            Arc::downgrade(&codec) as Weak<dyn Reclaimable>,
            Arc::new(Mutex::new(Instant::now())),
            background,
        );
        assert_eq!(manager.reclaim_inactive(), 1);
        assert_eq!(codec.reclaimed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_background_active_encoder_is_protected() {
        let manager = ResourceManager::with_timeout(Duration::from_secs(60));
        let codec = Arc::new(TestCodec {
            reclaimed: AtomicUsize::new(0),
        });
        let _token = manager.register(
            CodecKind::VideoEncoder,
            Arc::downgrade(&codec) as Weak<dyn Reclaimable>,
            Arc::new(Mutex::new(Instant::now())),
            Arc::new(AtomicBool::new(true)),
        );
        assert_eq!(manager.reclaim_inactive(), 0);
    }

    #[test]
    fn test_idle_encoder_is_reclaimed_through_its_error_callback() {
        use crate::webcodecs::encoded_video_chunk::VideoEncoderConfig;
        use crate::webcodecs::error::ErrorKind;
        use crate::webcodecs::processor::CodecState;
        use crate::webcodecs::video_encoder::{VideoEncoder, VideoEncoderInit};

        let manager = ResourceManager::with_timeout(Duration::from_millis(100));
        let errors: Arc<Mutex<Vec<crate::webcodecs::error::WebCodecsError>>> =
            Arc::new(Mutex::new(Vec::new()));
        let errors_clone = errors.clone();
        let encoder = VideoEncoder::with_resource_manager(
            VideoEncoderInit {
                output: Box::new(|_, _| {}),
                error: Box::new(move |err| errors_clone.lock().unwrap().push(err)),
            },
            manager.clone(),
        );
        encoder
            .configure(VideoEncoderConfig::new("vp8", 64, 64))
            .unwrap();
        assert_eq!(manager.registered_count(), 1);

        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(manager.reclaim_inactive(), 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while errors.lock().unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            errors.lock().unwrap()[0].kind(),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(encoder.state(), CodecState::Closed);
        assert_eq!(manager.registered_count(), 0);
    }

    #[test]
    fn test_sweeper_reclaims_without_manual_calls() {
        use crate::webcodecs::encoded_video_chunk::VideoEncoderConfig;
        use crate::webcodecs::processor::CodecState;
        use crate::webcodecs::video_encoder::{VideoEncoder, VideoEncoderInit};

        let manager = ResourceManager::with_timeout(Duration::from_millis(50));
        manager.start_sweeper(Duration::from_millis(25));
        let encoder = VideoEncoder::with_resource_manager(
            VideoEncoderInit {
                output: Box::new(|_, _| {}),
                error: Box::new(|_| {}),
            },
            manager.clone(),
        );
        encoder
            .configure(VideoEncoderConfig::new("vp8", 64, 64))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while encoder.state() != CodecState::Closed && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(encoder.state(), CodecState::Closed);
    }

    #[test]
    fn test_dropped_token_unregisters() {
        let manager = ResourceManager::with_timeout(Duration::from_secs(60));
        let (_codec, token, _) =
            register_codec(&manager, CodecKind::VideoEncoder, Instant::now());
        assert_eq!(manager.registered_count(), 1);
        drop(token);
        assert_eq!(manager.registered_count(), 0);
    }
}
