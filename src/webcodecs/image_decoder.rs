//! ImageDecoder codec object.
//!
//! Unlike the streaming codecs, the image decoder demuxes and decodes in one
//! step from a `{type, data}` pair. Data arrives either as a complete buffer
//! or as a chunked stream; a single worker thread multiplexes ingestion and
//! decode requests, so `decode` promises can settle incrementally as bytes
//! arrive. Decode failures reject only their own promise; the decoder stays
//! usable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender};

use crate::codec::image::{self, ImageFormat, ImageInfo};
use crate::codec::RawFrame;

use super::error::{
    abort_error, encoding_error, invalid_state_error, range_error, type_error, WebCodecsError,
};
use super::promise::{promise, Promise, PromiseResolver};
use super::video_frame::{VideoColorSpace, VideoFrame};

/// Color space conversion policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpaceConversion {
    /// Apply the default conversion to sRGB
    #[default]
    Default,
    /// Leave pixel values untouched
    None,
}

/// Data source for the image decoder.
pub enum ImageDataSource {
    /// A complete encoded image.
    Buffer(Vec<u8>),
    /// A chunked stream; ingestion finishes when the channel closes.
    Stream(Receiver<Vec<u8>>),
}

/// Image decoder init options
pub struct ImageDecoderInit {
    /// The encoded image bytes or stream
    pub data: ImageDataSource,
    /// MIME type of the image (e.g. "image/gif")
    pub mime_type: String,
    /// Color space conversion mode
    pub color_space_conversion: ColorSpaceConversion,
    /// Desired output width; must be paired with `desired_height`
    pub desired_width: Option<u32>,
    /// Desired output height; must be paired with `desired_width`
    pub desired_height: Option<u32>,
    /// Whether to prefer an animated track when both kinds exist
    pub prefer_animation: Option<bool>,
}

/// Image decode options
#[derive(Debug, Clone)]
pub struct ImageDecodeOptions {
    /// Frame index to decode (for animated images)
    pub frame_index: u32,
    /// Only resolve with fully received frames
    pub complete_frames_only: bool,
}

impl Default for ImageDecodeOptions {
    fn default() -> Self {
        Self {
            frame_index: 0,
            complete_frames_only: true,
        }
    }
}

/// Image decode result
#[derive(Debug)]
pub struct ImageDecodeResult {
    /// The decoded frame
    pub image: VideoFrame,
    /// Whether the frame is final quality
    pub complete: bool,
}

// ============================================================================
// Track list
// ============================================================================

#[derive(Debug, Clone)]
struct TrackData {
    animated: bool,
    frame_count: u32,
    /// `f64::INFINITY` for loop-forever animations.
    repetition_count: f64,
    width: u32,
    height: u32,
}

struct TrackListInner {
    tracks: Vec<TrackData>,
    selected: Option<usize>,
    ready: Option<Result<(), WebCodecsError>>,
    ready_waiters: Vec<PromiseResolver<()>>,
}

/// The image's track list. Metadata appears once `ready` resolves.
#[derive(Clone)]
pub struct ImageTrackList {
    inner: Arc<Mutex<TrackListInner>>,
}

impl ImageTrackList {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackListInner {
                tracks: Vec::new(),
                selected: None,
                ready: None,
                ready_waiters: Vec::new(),
            })),
        }
    }

    /// Number of tracks.
    pub fn length(&self) -> u32 {
        self.inner.lock().expect("track list poisoned").tracks.len() as u32
    }

    /// Index of the selected track, or -1.
    pub fn selected_index(&self) -> i32 {
        self.inner
            .lock()
            .expect("track list poisoned")
            .selected
            .map(|i| i as i32)
            .unwrap_or(-1)
    }

    /// The selected track, if any.
    pub fn selected_track(&self) -> Option<ImageTrack> {
        let inner = self.inner.lock().expect("track list poisoned");
        inner.selected.map(|index| ImageTrack {
            list: self.inner.clone(),
            index,
        })
    }

    /// Track at `index`, if it exists.
    pub fn item(&self, index: u32) -> Option<ImageTrack> {
        let inner = self.inner.lock().expect("track list poisoned");
        ((index as usize) < inner.tracks.len()).then(|| ImageTrack {
            list: self.inner.clone(),
            index: index as usize,
        })
    }

    /// Resolves once track metadata has been established.
    pub fn ready(&self) -> Promise<()> {
        let mut inner = self.inner.lock().expect("track list poisoned");
        match &inner.ready {
            Some(Ok(())) => Promise::resolved(()),
            Some(Err(err)) => Promise::rejected(err.clone()),
            None => {
                let (resolver, pending) = promise();
                inner.ready_waiters.push(resolver);
                pending
            }
        }
    }

    fn install(&self, info: &ImageInfo) {
        let mut inner = self.inner.lock().expect("track list poisoned");
        let track = TrackData {
            animated: info.animated,
            frame_count: info.frame_count,
            repetition_count: match info.repetitions {
                None => f64::INFINITY,
                Some(n) => n as f64,
            },
            width: info.width,
            height: info.height,
        };
        if inner.tracks.is_empty() {
            inner.tracks.push(track);
            inner.selected = Some(0);
        } else {
            inner.tracks[0] = track;
        }
        if inner.ready.is_none() {
            inner.ready = Some(Ok(()));
            for waiter in inner.ready_waiters.drain(..) {
                waiter.resolve(());
            }
        }
    }

    fn fail_ready(&self, error: WebCodecsError) {
        let mut inner = self.inner.lock().expect("track list poisoned");
        if inner.ready.is_none() {
            inner.ready = Some(Err(error.clone()));
            for waiter in inner.ready_waiters.drain(..) {
                waiter.reject(error.clone());
            }
        }
    }
}

/// One image track.
pub struct ImageTrack {
    list: Arc<Mutex<TrackListInner>>,
    index: usize,
}

impl ImageTrack {
    fn read<T>(&self, f: impl FnOnce(&TrackData) -> T, fallback: T) -> T {
        let inner = self.list.lock().expect("track list poisoned");
        inner.tracks.get(self.index).map(f).unwrap_or(fallback)
    }

    /// Whether this track is animated.
    pub fn animated(&self) -> bool {
        self.read(|t| t.animated, false)
    }

    /// Number of frames in this track.
    pub fn frame_count(&self) -> u32 {
        self.read(|t| t.frame_count, 0)
    }

    /// Number of times the animation repeats; infinity for loop-forever.
    pub fn repetition_count(&self) -> f64 {
        self.read(|t| t.repetition_count, 0.0)
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.read(|t| t.width, 0)
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.read(|t| t.height, 0)
    }

    /// Whether this track is selected.
    pub fn selected(&self) -> bool {
        let inner = self.list.lock().expect("track list poisoned");
        inner.selected == Some(self.index)
    }

    /// Select or deselect this track. Selecting deselects every other track.
    pub fn set_selected(&self, selected: bool) {
        let mut inner = self.list.lock().expect("track list poisoned");
        if selected {
            inner.selected = Some(self.index);
        } else if inner.selected == Some(self.index) {
            inner.selected = None;
        }
    }
}

// ============================================================================
// Decoder
// ============================================================================

enum WorkerMsg {
    Decode {
        index: u32,
        generation: u64,
        resolver: PromiseResolver<ImageDecodeResult>,
    },
    Reset {
        generation: u64,
    },
    Shutdown,
}

struct PendingDecode {
    index: u32,
    generation: u64,
    resolver: PromiseResolver<ImageDecodeResult>,
}

struct CompletedSlot {
    state: Option<Result<(), WebCodecsError>>,
    waiters: Vec<PromiseResolver<()>>,
}

struct ImageDecoderShared {
    format: ImageFormat,
    mime_type: String,
    desired_size: Option<(u32, u32)>,
    color_space_conversion: ColorSpaceConversion,
    prefer_animation: Option<bool>,
    closed: AtomicBool,
    complete: AtomicBool,
    generation: AtomicU64,
    completed: Mutex<CompletedSlot>,
    tracks: ImageTrackList,
}

impl ImageDecoderShared {
    fn settle_completed(&self, result: Result<(), WebCodecsError>) {
        let mut slot = self.completed.lock().expect("completed slot poisoned");
        if slot.state.is_some() {
            return;
        }
        slot.state = Some(result.clone());
        for waiter in slot.waiters.drain(..) {
            match &result {
                Ok(()) => waiter.resolve(()),
                Err(err) => waiter.reject(err.clone()),
            }
        }
    }
}

/// WebCodecs image decoder.
pub struct ImageDecoder {
    shared: Arc<ImageDecoderShared>,
    control: Sender<WorkerMsg>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ImageDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDecoder").finish_non_exhaustive()
    }
}

impl ImageDecoder {
    /// Create a decoder and start consuming the data source.
    pub fn new(init: ImageDecoderInit) -> Result<Self, WebCodecsError> {
        if !init.mime_type.contains('/') {
            return Err(type_error(format!(
                "invalid image MIME type: {:?}",
                init.mime_type
            )));
        }
        let Some(format) = image::format_for_mime(&init.mime_type) else {
            return Err(super::error::not_supported_error(format!(
                "unsupported image type: {}",
                init.mime_type
            )));
        };
        if init.desired_width.is_some() != init.desired_height.is_some() {
            return Err(type_error(
                "desiredWidth and desiredHeight must be provided together",
            ));
        }

        let shared = Arc::new(ImageDecoderShared {
            format,
            mime_type: init.mime_type,
            desired_size: init.desired_width.zip(init.desired_height),
            color_space_conversion: init.color_space_conversion,
            prefer_animation: init.prefer_animation,
            closed: AtomicBool::new(false),
            complete: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            completed: Mutex::new(CompletedSlot {
                state: None,
                waiters: Vec::new(),
            }),
            tracks: ImageTrackList::new(),
        });

        let (control_tx, control_rx) = crossbeam::channel::unbounded();
        let worker = {
            let shared = shared.clone();
            std::thread::spawn(move || run_image_worker(shared, init.data, control_rx))
        };

        Ok(Self {
            shared,
            control: control_tx,
            worker: Some(worker),
        })
    }

    /// The MIME type this decoder was constructed for.
    pub fn mime_type(&self) -> &str {
        &self.shared.mime_type
    }

    /// The configured color space conversion policy.
    pub fn color_space_conversion(&self) -> ColorSpaceConversion {
        self.shared.color_space_conversion
    }

    /// Whether an animated track is preferred when both kinds exist.
    pub fn prefer_animation(&self) -> Option<bool> {
        self.shared.prefer_animation
    }

    /// Whether the full input has been ingested.
    pub fn complete(&self) -> bool {
        self.shared.complete.load(Ordering::SeqCst)
    }

    /// Resolves once the full input has been ingested.
    pub fn completed(&self) -> Promise<()> {
        let mut slot = self.shared.completed.lock().expect("completed slot poisoned");
        match &slot.state {
            Some(Ok(())) => Promise::resolved(()),
            Some(Err(err)) => Promise::rejected(err.clone()),
            None => {
                let (resolver, pending) = promise();
                slot.waiters.push(resolver);
                pending
            }
        }
    }

    /// The image's track list.
    pub fn tracks(&self) -> ImageTrackList {
        self.shared.tracks.clone()
    }

    /// Decode one frame of the selected track.
    pub fn decode(&self, options: Option<ImageDecodeOptions>) -> Promise<ImageDecodeResult> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Promise::rejected(invalid_state_error("ImageDecoder is closed"));
        }
        let options = options.unwrap_or_default();
        let (resolver, pending) = promise();
        let message = WorkerMsg::Decode {
            index: options.frame_index,
            generation: self.shared.generation.load(Ordering::SeqCst),
            resolver,
        };
        if self.control.send(message).is_err() {
            return Promise::rejected(invalid_state_error("ImageDecoder is closed"));
        }
        pending
    }

    /// Abort pending decodes. Track metadata and ingested data are kept.
    pub fn reset(&self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.control.send(WorkerMsg::Reset { generation });
    }

    /// Release resources. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        let _ = self.control.send(WorkerMsg::Shutdown);
        self.shared
            .settle_completed(Err(abort_error("ImageDecoder closed")));
        self.shared
            .tracks
            .fail_ready(abort_error("ImageDecoder closed"));
    }

    /// Whether a MIME type is decodable.
    pub fn is_type_supported(mime_type: &str) -> Promise<bool> {
        Promise::resolved(image::format_for_mime(mime_type).is_some())
    }
}

impl Drop for ImageDecoder {
    fn drop(&mut self) {
        self.close();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

struct ImageWorker {
    shared: Arc<ImageDecoderShared>,
    data: Vec<u8>,
    info: Option<ImageInfo>,
    ingest_done: bool,
    /// Set when the stream turned out to be structurally corrupt.
    poisoned: Option<WebCodecsError>,
    pending: VecDeque<PendingDecode>,
}

fn run_image_worker(
    shared: Arc<ImageDecoderShared>,
    source: ImageDataSource,
    control: Receiver<WorkerMsg>,
) {
    let mut worker = ImageWorker {
        shared,
        data: Vec::new(),
        info: None,
        ingest_done: false,
        poisoned: None,
        pending: VecDeque::new(),
    };

    let mut stream = match source {
        ImageDataSource::Buffer(bytes) => {
            worker.data = bytes;
            worker.on_progress();
            worker.finish_ingest();
            None
        }
        ImageDataSource::Stream(rx) => Some(rx),
    };

    enum Incoming {
        Data(Option<Vec<u8>>),
        Control(Option<WorkerMsg>),
    }

    loop {
        let incoming = if let Some(rx) = &stream {
            crossbeam::select! {
                recv(rx) -> chunk => Incoming::Data(chunk.ok()),
                recv(control) -> message => Incoming::Control(message.ok()),
            }
        } else {
            Incoming::Control(control.recv().ok())
        };

        match incoming {
            Incoming::Data(Some(bytes)) => {
                worker.data.extend_from_slice(&bytes);
                worker.on_progress();
            }
            Incoming::Data(None) => {
                stream = None;
                worker.finish_ingest();
            }
            Incoming::Control(Some(WorkerMsg::Decode { index, generation, resolver })) => {
                worker.handle_decode(PendingDecode { index, generation, resolver });
            }
            Incoming::Control(Some(WorkerMsg::Reset { generation })) => {
                worker.abort_stale(generation);
            }
            Incoming::Control(Some(WorkerMsg::Shutdown)) | Incoming::Control(None) => break,
        }
    }

    for pending in worker.pending.drain(..) {
        pending.resolver.reject(abort_error("ImageDecoder closed"));
    }
    log::debug!("image decoder worker exiting");
}

impl ImageWorker {
    /// Re-probe after new bytes and surface track metadata / serve waiters.
    fn on_progress(&mut self) {
        match image::probe(self.shared.format, &self.data) {
            Ok(Some(info)) => {
                if info.frame_count > 0 || info.parsed_to_end {
                    self.shared.tracks.install(&info);
                }
                self.info = Some(info);
            }
            Ok(None) => {}
            Err(err) => {
                let error = encoding_error(err.to_string());
                self.poisoned = Some(error.clone());
                self.shared.tracks.fail_ready(error.clone());
                self.shared.settle_completed(Err(error.clone()));
                for pending in self.pending.drain(..) {
                    pending.resolver.reject(error.clone());
                }
                return;
            }
        }
        self.service_pending();
    }

    fn finish_ingest(&mut self) {
        self.ingest_done = true;
        if self.poisoned.is_some() {
            return;
        }
        self.shared.complete.store(true, Ordering::SeqCst);
        self.shared.settle_completed(Ok(()));
        match &self.info {
            Some(_) => {}
            None => {
                let error = encoding_error("image data ended before metadata was parsed");
                self.poisoned = Some(error.clone());
                self.shared.tracks.fail_ready(error.clone());
            }
        }
        self.service_pending();
    }

    fn abort_stale(&mut self, current_generation: u64) {
        let stale: Vec<PendingDecode> = {
            let mut keep = VecDeque::new();
            let mut stale = Vec::new();
            for pending in self.pending.drain(..) {
                if pending.generation < current_generation {
                    stale.push(pending);
                } else {
                    keep.push_back(pending);
                }
            }
            self.pending = keep;
            stale
        };
        for pending in stale {
            pending.resolver.reject(abort_error("decode aborted by reset"));
        }
    }

    fn handle_decode(&mut self, request: PendingDecode) {
        if request.generation != self.shared.generation.load(Ordering::SeqCst) {
            request.resolver.reject(abort_error("decode aborted by reset"));
            return;
        }
        if let Some(error) = &self.poisoned {
            request.resolver.reject(error.clone());
            return;
        }
        if self.shared.tracks.selected_track().is_none()
            && self.shared.tracks.length() > 0
        {
            request
                .resolver
                .reject(invalid_state_error("no image track is selected"));
            return;
        }
        match self.try_decode(request.index) {
            DecodeAttempt::Done(result) => request.resolver.resolve(result),
            DecodeAttempt::Failed(error) => request.resolver.reject(error),
            DecodeAttempt::NeedMoreData => self.pending.push_back(request),
        }
    }

    fn service_pending(&mut self) {
        let mut remaining = VecDeque::new();
        while let Some(request) = self.pending.pop_front() {
            if request.generation != self.shared.generation.load(Ordering::SeqCst) {
                request.resolver.reject(abort_error("decode aborted by reset"));
                continue;
            }
            match self.try_decode(request.index) {
                DecodeAttempt::Done(result) => request.resolver.resolve(result),
                DecodeAttempt::Failed(error) => request.resolver.reject(error),
                DecodeAttempt::NeedMoreData => remaining.push_back(request),
            }
        }
        self.pending = remaining;
    }

    fn try_decode(&self, index: u32) -> DecodeAttempt {
        if let Some(info) = &self.info {
            if info.parsed_to_end && index >= info.frame_count {
                return DecodeAttempt::Failed(range_error(format!(
                    "frame index {} out of range ({} frames)",
                    index, info.frame_count
                )));
            }
        }
        match image::decode_frame(self.shared.format, &self.data, index) {
            Ok(Some(raw)) => DecodeAttempt::Done(self.finish_frame(raw)),
            Ok(None) => {
                if self.ingest_done {
                    let frames = self.info.as_ref().map(|i| i.frame_count).unwrap_or(0);
                    if index >= frames {
                        DecodeAttempt::Failed(range_error(format!(
                            "frame index {} out of range ({} frames)",
                            index, frames
                        )))
                    } else {
                        DecodeAttempt::Failed(encoding_error("image frame data is truncated"))
                    }
                } else {
                    DecodeAttempt::NeedMoreData
                }
            }
            Err(err) => DecodeAttempt::Failed(encoding_error(err.to_string())),
        }
    }

    fn finish_frame(&self, raw: RawFrame) -> ImageDecodeResult {
        let raw = match self.shared.desired_size {
            Some((width, height)) => {
                image::scale_rgba(&raw, width, height).unwrap_or(raw)
            }
            None => raw,
        };
        let color_space = match self.shared.color_space_conversion {
            ColorSpaceConversion::Default => VideoColorSpace::srgb(),
            ColorSpaceConversion::None => VideoColorSpace::default(),
        };
        ImageDecodeResult {
            image: VideoFrame::from_raw(raw, color_space),
            complete: true,
        }
    }
}

enum DecodeAttempt {
    Done(ImageDecodeResult),
    Failed(WebCodecsError),
    NeedMoreData,
}
