//! Output dispatcher.
//!
//! Marshals worker results back to the codec's callback thread. Each codec
//! spawns one dispatch thread at construction; the application's `output`,
//! `error` and `dequeue` callbacks only ever run there, serialized, in the
//! order events were posted. Events from a superseded generation (reset,
//! reconfigure) are dropped before they reach a callback, and nothing is
//! delivered once the codec detaches on close.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender};

use super::error::WebCodecsError;
use super::promise::PromiseResolver;

pub(crate) enum Event<O> {
    Output { item: O, generation: u64 },
    Dequeue,
    FlushDone { id: u64, generation: u64 },
    FatalError { error: WebCodecsError },
    Shutdown,
}

pub(crate) struct FlushEntry {
    pub id: u64,
    pub resolver: PromiseResolver<()>,
}

/// State shared between the dispatch thread and the codec it serves.
pub(crate) struct DispatchState {
    /// Bumped on reset/close/reconfigure; stale events are dropped.
    pub generation: AtomicU64,
    /// Set on close: nothing may be delivered anymore.
    pub detached: AtomicBool,
    /// Coalescing flag for dequeue notifications.
    pub dequeue_scheduled: AtomicBool,
    /// The application's dequeue handler slot.
    pub ondequeue: Mutex<Option<Box<dyn FnMut() + Send>>>,
    /// Pending flush promises, resolved in completion order.
    pub flushes: Mutex<Vec<FlushEntry>>,
}

impl DispatchState {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            detached: AtomicBool::new(false),
            dequeue_scheduled: AtomicBool::new(false),
            ondequeue: Mutex::new(None),
            flushes: Mutex::new(Vec::new()),
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}

/// Run a callback, reporting and swallowing panics so a throwing handler
/// cannot corrupt the codec.
fn guarded<F: FnOnce()>(what: &str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::error!("{} callback panicked; continuing", what);
    }
}

/// Spawn the dispatch thread for one codec.
pub(crate) fn spawn_dispatcher<O: Send + 'static>(
    receiver: Receiver<Event<O>>,
    state: Arc<DispatchState>,
    mut output: Box<dyn FnMut(O) + Send>,
    mut error: Box<dyn FnMut(WebCodecsError) + Send>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::Shutdown => break,
                Event::Output { item, generation } => {
                    if state.is_detached() || generation != state.current_generation() {
                        log::debug!("dropping output from superseded generation");
                        continue;
                    }
                    guarded("output", || output(item));
                }
                Event::Dequeue => {
                    state.dequeue_scheduled.store(false, Ordering::SeqCst);
                    if state.is_detached() {
                        continue;
                    }
                    // Take the handler out for the call so it can re-enter the
                    // codec (including replacing itself) without deadlocking.
                    let handler = state
                        .ondequeue
                        .lock()
                        .expect("dequeue slot poisoned")
                        .take();
                    if let Some(mut handler) = handler {
                        guarded("dequeue", || handler());
                        let mut slot = state.ondequeue.lock().expect("dequeue slot poisoned");
                        if slot.is_none() {
                            *slot = Some(handler);
                        }
                    }
                }
                Event::FlushDone { id, generation } => {
                    if generation != state.current_generation() {
                        continue;
                    }
                    let entry = {
                        let mut flushes = state.flushes.lock().expect("flush list poisoned");
                        flushes
                            .iter()
                            .position(|e| e.id == id)
                            .map(|idx| flushes.remove(idx))
                    };
                    if let Some(entry) = entry {
                        entry.resolver.resolve(());
                    }
                }
                Event::FatalError { error: err } => {
                    if state.is_detached() {
                        continue;
                    }
                    guarded("error", || error(err));
                }
            }
        }
    })
}

/// Post an event, dropping it when the codec has detached. `Shutdown` always
/// goes through so the thread can exit.
pub(crate) fn post<O>(sender: &Sender<Event<O>>, state: &DispatchState, event: Event<O>) {
    if state.is_detached() && !matches!(event, Event::Shutdown) {
        return;
    }
    // A disconnected channel means the dispatch thread is already gone.
    let _ = sender.send(event);
}
