//! Codec processor.
//!
//! The machinery shared by the four streaming codec objects: the per-codec
//! state machine, the control message queue drained on the submitting thread,
//! the work queue feeding the dedicated worker thread that owns the
//! codec-library context, and the dispatcher delivering results back through
//! the callback thread. Each codec object wraps a `CodecProcessor`
//! parameterized with its engine (the worker-side configure/process/flush
//! logic).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam::channel::Sender;

use super::control_queue::{ControlMessageQueue, MessageOutcome};
use super::dispatcher::{post, spawn_dispatcher, DispatchState, Event, FlushEntry};
use super::error::{abort_error, invalid_state_error, quota_exceeded_error, WebCodecsError};
use super::promise::{promise, Promise, PromiseResolver};
use super::resource_manager::{CodecKind, Reclaimable, ResourceManager, ResourceToken};
use super::work_queue::{CodecWorkQueue, WorkItem};

/// Codec state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecState {
    /// Codec not configured
    #[default]
    Unconfigured,
    /// Codec configured and ready
    Configured,
    /// Codec closed
    Closed,
}

/// Soft backpressure threshold: the `ready` signal parks at or above this
/// many outstanding submissions.
pub const DEFAULT_READY_THRESHOLD: u32 = 16;

/// Hard cap: submissions beyond this many outstanding fail synchronously
/// with a quota-exceeded error.
pub const DEFAULT_HARD_CAP: u32 = 64;

/// Worker-side codec logic. `configure` builds the codec-library context;
/// `process` runs one submission; `flush` drains whatever the context still
/// buffers. All three run exclusively on the codec's worker thread.
pub(crate) trait CodecEngine: Send + Sized + 'static {
    type Config: Clone + Send + 'static;
    type Input: Send + 'static;
    type Output: Send + 'static;

    const KIND: CodecKind;

    fn configure(config: &Self::Config) -> Result<Self, WebCodecsError>;
    fn process(&mut self, input: Self::Input) -> Result<Vec<Self::Output>, WebCodecsError>;
    fn flush(&mut self) -> Result<Vec<Self::Output>, WebCodecsError>;
}

enum ControlMessage<E: CodecEngine> {
    Configure { config: E::Config, generation: u64 },
    Process { input: E::Input, generation: u64 },
    Flush { id: u64, generation: u64 },
}

pub(crate) struct CodecShared<E: CodecEngine> {
    state: Mutex<CodecState>,
    control: ControlMessageQueue<ControlMessage<E>>,
    work: CodecWorkQueue<E::Config, E::Input>,
    events: Sender<Event<E::Output>>,
    dispatch: Arc<DispatchState>,
    queue_size: AtomicU32,
    ready_threshold: AtomicU32,
    hard_cap: u32,
    next_flush_id: AtomicU64,
    ready_waiters: Mutex<Vec<PromiseResolver<()>>>,
    manager: ResourceManager,
    registration: Mutex<Option<ResourceToken>>,
    last_activity: Arc<Mutex<Instant>>,
    background: Arc<AtomicBool>,
    self_weak: Mutex<Option<Weak<CodecShared<E>>>>,
}

impl<E: CodecEngine> CodecShared<E> {
    fn current_generation(&self) -> u64 {
        self.dispatch.current_generation()
    }

    fn post(&self, event: Event<E::Output>) {
        post(&self.events, &self.dispatch, event);
    }

    fn record_activity(&self) {
        *self.last_activity.lock().expect("activity clock poisoned") = Instant::now();
    }

    /// Register with the resource manager on first configure.
    fn register_if_needed(&self) {
        let mut registration = self.registration.lock().expect("registration poisoned");
        if registration.is_none() {
            let weak = self
                .self_weak
                .lock()
                .expect("self weak poisoned")
                .clone();
            if let Some(weak) = weak {
                let hook: Weak<dyn Reclaimable> = weak;
                *registration = Some(self.manager.register(
                    E::KIND,
                    hook,
                    self.last_activity.clone(),
                    self.background.clone(),
                ));
            }
        }
    }

    /// Invalidate queued work and settle every pending one-shot. Runs under
    /// reset, close and the fatal error path.
    fn teardown(&self, rejection: WebCodecsError) {
        self.dispatch.generation.fetch_add(1, Ordering::SeqCst);
        self.control.clear();
        self.work.clear_pending();
        self.queue_size.store(0, Ordering::SeqCst);

        let flushes: Vec<FlushEntry> = {
            let mut list = self.dispatch.flushes.lock().expect("flush list poisoned");
            list.drain(..).collect()
        };
        for entry in flushes {
            entry.resolver.reject(rejection.clone());
        }

        let waiters: Vec<PromiseResolver<()>> = {
            let mut list = self.ready_waiters.lock().expect("ready waiters poisoned");
            list.drain(..).collect()
        };
        for waiter in waiters {
            waiter.resolve(());
        }

        self.registration.lock().expect("registration poisoned").take();
    }

    /// Close the codec because of an asynchronous failure, then report it
    /// through the error callback.
    fn fatal_error(&self, error: WebCodecsError) {
        {
            let mut state = self.state.lock().expect("state poisoned");
            if *state == CodecState::Closed {
                return;
            }
            *state = CodecState::Closed;
        }
        log::debug!("codec closing on error: {}", error);
        self.teardown(abort_error("codec closed with an error"));
        self.post(Event::FatalError { error });
        self.work.shutdown();
    }

    /// Account for one completed (or discarded) submission.
    fn finish_job(&self, generation: u64) {
        if generation != self.current_generation() {
            return;
        }
        let new_size = match self
            .queue_size
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            // Already zeroed by a concurrent reset.
            Err(_) => return,
        };

        // Coalesced dequeue notification.
        if !self.dispatch.dequeue_scheduled.swap(true, Ordering::SeqCst) {
            self.post(Event::Dequeue);
        }

        if new_size < self.ready_threshold.load(Ordering::SeqCst) {
            let waiters: Vec<PromiseResolver<()>> = {
                let mut list = self.ready_waiters.lock().expect("ready waiters poisoned");
                list.drain(..).collect()
            };
            for waiter in waiters {
                waiter.resolve(());
            }
        }
    }
}

impl<E: CodecEngine> Reclaimable for CodecShared<E> {
    fn reclaim(&self) {
        self.fatal_error(quota_exceeded_error(
            "codec reclaimed after a period of inactivity",
        ));
    }
}

/// Drain the control queue on the calling thread. Messages from a superseded
/// generation fall through; a configure waiting on outstanding work from the
/// previous configuration blocks the queue until the worker drains.
fn drain_control<E: CodecEngine>(shared: &Arc<CodecShared<E>>) {
    shared.control.drain(|message| match message {
        ControlMessage::Configure { config, generation } => {
            if generation != shared.current_generation() {
                return MessageOutcome::Processed;
            }
            if shared.work.outstanding() > 0 {
                return MessageOutcome::Blocked(ControlMessage::Configure { config, generation });
            }
            {
                let mut state = shared.state.lock().expect("state poisoned");
                if *state == CodecState::Closed {
                    return MessageOutcome::Processed;
                }
                *state = CodecState::Configured;
            }
            shared.register_if_needed();
            shared.record_activity();
            shared.work.push(WorkItem::Configure { config, generation });
            MessageOutcome::Processed
        }
        ControlMessage::Process { input, generation } => {
            if generation == shared.current_generation() {
                shared.work.push(WorkItem::Process { input, generation });
            }
            MessageOutcome::Processed
        }
        ControlMessage::Flush { id, generation } => {
            if generation == shared.current_generation() {
                shared.work.push(WorkItem::Flush { id, generation });
            }
            MessageOutcome::Processed
        }
    });
}

/// The worker thread: exclusive owner of the codec-library context.
fn run_worker<E: CodecEngine>(shared: Arc<CodecShared<E>>) {
    let mut engine: Option<E> = None;
    loop {
        match shared.work.pop_blocking() {
            WorkItem::Shutdown => break,
            WorkItem::Configure { config, generation } => {
                if generation == shared.current_generation() {
                    match E::configure(&config) {
                        Ok(new_engine) => {
                            engine = Some(new_engine);
                            log::debug!("worker installed a new codec context");
                        }
                        Err(error) => {
                            engine = None;
                            shared.fatal_error(error);
                        }
                    }
                }
                shared.work.mark_idle();
            }
            WorkItem::Process { input, generation } => {
                if generation == shared.current_generation() {
                    if let Some(active) = engine.as_mut() {
                        match active.process(input) {
                            Ok(outputs) => {
                                shared.record_activity();
                                for item in outputs {
                                    shared.post(Event::Output { item, generation });
                                }
                                shared.work.mark_idle();
                                shared.finish_job(generation);
                            }
                            Err(error) => {
                                shared.work.mark_idle();
                                shared.finish_job(generation);
                                shared.fatal_error(error);
                            }
                        }
                    } else {
                        shared.work.mark_idle();
                        shared.finish_job(generation);
                    }
                } else {
                    log::debug!("discarding work from a superseded generation");
                    shared.work.mark_idle();
                }
            }
            WorkItem::Flush { id, generation } => {
                if generation == shared.current_generation() {
                    if let Some(active) = engine.as_mut() {
                        match active.flush() {
                            Ok(outputs) => {
                                for item in outputs {
                                    shared.post(Event::Output { item, generation });
                                }
                                shared.post(Event::FlushDone { id, generation });
                            }
                            Err(error) => shared.fatal_error(error),
                        }
                    }
                }
                shared.work.mark_idle();
            }
        }

        // A configure may be parked behind the work that just cleared.
        if shared.control.is_blocked() && shared.work.outstanding() == 0 {
            shared.control.unblock();
            drain_control(&shared);
        }
    }
    log::debug!("codec worker exiting");
}

/// State machine + queues + dispatcher for one codec object.
pub(crate) struct CodecProcessor<E: CodecEngine> {
    shared: Arc<CodecShared<E>>,
    worker: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl<E: CodecEngine> CodecProcessor<E> {
    pub fn new(
        output: Box<dyn FnMut(E::Output) + Send>,
        error: Box<dyn FnMut(WebCodecsError) + Send>,
        manager: ResourceManager,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam::channel::unbounded();
        let dispatch = Arc::new(DispatchState::new());

        let shared = Arc::new(CodecShared {
            state: Mutex::new(CodecState::Unconfigured),
            control: ControlMessageQueue::new(),
            work: CodecWorkQueue::new(),
            events: events_tx,
            dispatch: dispatch.clone(),
            queue_size: AtomicU32::new(0),
            ready_threshold: AtomicU32::new(DEFAULT_READY_THRESHOLD),
            hard_cap: DEFAULT_HARD_CAP,
            next_flush_id: AtomicU64::new(1),
            ready_waiters: Mutex::new(Vec::new()),
            manager,
            registration: Mutex::new(None),
            last_activity: Arc::new(Mutex::new(Instant::now())),
            background: Arc::new(AtomicBool::new(false)),
            self_weak: Mutex::new(None),
        });
        *shared.self_weak.lock().expect("self weak poisoned") = Some(Arc::downgrade(&shared));

        let dispatcher = spawn_dispatcher(events_rx, dispatch, output, error);
        let worker = {
            let shared = shared.clone();
            std::thread::spawn(move || run_worker(shared))
        };

        Self {
            shared,
            worker: Some(worker),
            dispatcher: Some(dispatcher),
        }
    }

    pub fn state(&self) -> CodecState {
        *self.shared.state.lock().expect("state poisoned")
    }

    pub fn queue_size(&self) -> u32 {
        self.shared.queue_size.load(Ordering::SeqCst)
    }

    pub fn set_ondequeue(&self, handler: Option<Box<dyn FnMut() + Send>>) {
        *self
            .shared
            .dispatch
            .ondequeue
            .lock()
            .expect("dequeue slot poisoned") = handler;
    }

    /// Adjust the soft backpressure threshold for this codec.
    pub fn set_ready_threshold(&self, threshold: u32) {
        self.shared
            .ready_threshold
            .store(threshold.max(1), Ordering::SeqCst);
    }

    /// Mark this codec as running in the background for reclamation purposes.
    pub fn set_background(&self, background: bool) {
        self.shared.background.store(background, Ordering::SeqCst);
    }

    /// Enqueue a configure. Validation has already happened on the caller.
    pub fn configure(&self, config: E::Config) -> Result<(), WebCodecsError> {
        if self.state() == CodecState::Closed {
            return Err(invalid_state_error("codec is closed"));
        }
        let generation = self.shared.current_generation();
        self.shared.control.push(ControlMessage::Configure { config, generation });
        drain_control(&self.shared);
        Ok(())
    }

    /// Enqueue one encode/decode submission.
    pub fn submit(&self, input: E::Input) -> Result<(), WebCodecsError> {
        if self.state() != CodecState::Configured {
            return Err(invalid_state_error("codec is not configured"));
        }
        let cap = self.shared.hard_cap;
        if self
            .shared
            .queue_size
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                if v >= cap {
                    None
                } else {
                    Some(v + 1)
                }
            })
            .is_err()
        {
            return Err(quota_exceeded_error(format!(
                "codec queue is saturated ({} outstanding)",
                cap
            )));
        }
        self.shared.record_activity();
        let generation = self.shared.current_generation();
        self.shared.control.push(ControlMessage::Process { input, generation });
        drain_control(&self.shared);
        Ok(())
    }

    /// Enqueue a flush barrier. The promise resolves once every prior
    /// submission's outputs have been delivered.
    pub fn flush(&self) -> Result<Promise<()>, WebCodecsError> {
        if self.state() != CodecState::Configured {
            return Err(invalid_state_error("codec is not configured"));
        }
        let id = self.shared.next_flush_id.fetch_add(1, Ordering::Relaxed);
        let (resolver, pending) = promise();
        self.shared
            .dispatch
            .flushes
            .lock()
            .expect("flush list poisoned")
            .push(FlushEntry { id, resolver });
        let generation = self.shared.current_generation();
        self.shared.control.push(ControlMessage::Flush { id, generation });
        drain_control(&self.shared);
        Ok(pending)
    }

    /// Synchronously return to `Unconfigured`, discarding queued work and
    /// rejecting pending flushes with an abort error.
    pub fn reset(&self) -> Result<(), WebCodecsError> {
        {
            let mut state = self.shared.state.lock().expect("state poisoned");
            if *state == CodecState::Closed {
                return Err(invalid_state_error("codec is closed"));
            }
            *state = CodecState::Unconfigured;
        }
        self.shared.teardown(abort_error("codec reset"));
        Ok(())
    }

    /// Run reset semantics and transition to `Closed`. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock().expect("state poisoned");
            if *state == CodecState::Closed {
                return;
            }
            *state = CodecState::Closed;
        }
        self.shared.teardown(abort_error("codec closed"));
        self.shared.dispatch.detached.store(true, Ordering::SeqCst);
        self.shared.work.shutdown();
    }

    /// Report an asynchronous failure: closes the codec and fires the error
    /// callback.
    pub fn fail(&self, error: WebCodecsError) {
        self.shared.fatal_error(error);
    }

    /// Backpressure signal: resolves once outstanding work drops below the
    /// soft threshold.
    pub fn ready(&self) -> Promise<()> {
        let threshold = self.shared.ready_threshold.load(Ordering::SeqCst);
        if self.shared.queue_size.load(Ordering::SeqCst) < threshold {
            return Promise::resolved(());
        }
        let (resolver, pending) = promise();
        {
            let mut waiters = self
                .shared
                .ready_waiters
                .lock()
                .expect("ready waiters poisoned");
            waiters.push(resolver);
            // The queue may have drained between the check and the insert.
            if self.shared.queue_size.load(Ordering::SeqCst) < threshold {
                for waiter in waiters.drain(..) {
                    waiter.resolve(());
                }
            }
        }
        pending
    }
}

impl<E: CodecEngine> Drop for CodecProcessor<E> {
    fn drop(&mut self) {
        self.close();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let _ = self.shared.events.send(Event::Shutdown);
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webcodecs::error::{data_error, ErrorKind};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    /// A controllable engine: inputs are u32 tokens, outputs echo them.
    /// A gate channel can make `process` block until released.
    struct TestEngine {
        gate: Option<mpsc::Receiver<()>>,
        fail_on: Option<u32>,
    }

    #[derive(Clone)]
    struct TestConfig {
        gated: Option<GateHandle>,
        fail_on: Option<u32>,
    }

    #[derive(Clone)]
    struct GateHandle(Arc<Mutex<Option<mpsc::Receiver<()>>>>);

    impl CodecEngine for TestEngine {
        type Config = TestConfig;
        type Input = u32;
        type Output = u32;

        const KIND: CodecKind = CodecKind::VideoEncoder;

        fn configure(config: &TestConfig) -> Result<Self, WebCodecsError> {
            let gate = config
                .gated
                .as_ref()
                .and_then(|g| g.0.lock().expect("gate poisoned").take());
            Ok(TestEngine {
                gate,
                fail_on: config.fail_on,
            })
        }

        fn process(&mut self, input: u32) -> Result<Vec<u32>, WebCodecsError> {
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            if self.fail_on == Some(input) {
                return Err(data_error("poisoned input"));
            }
            Ok(vec![input])
        }

        fn flush(&mut self) -> Result<Vec<u32>, WebCodecsError> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        // Declared before the processor so a failing test drops the gate
        // sender first, releasing a blocked worker before the join in Drop.
        gate_tx: mpsc::Sender<()>,
        processor: CodecProcessor<TestEngine>,
        outputs: Arc<Mutex<Vec<u32>>>,
        errors: Arc<Mutex<Vec<WebCodecsError>>>,
    }

    fn harness(config: TestConfig) -> Harness {
        let _ = env_logger::builder().is_test(true).try_init();
        let outputs = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (gate_tx, gate_rx) = mpsc::channel();
        let config = TestConfig {
            gated: config
                .gated
                .is_some()
                .then(|| GateHandle(Arc::new(Mutex::new(Some(gate_rx))))),
            fail_on: config.fail_on,
        };
        let outputs_clone = outputs.clone();
        let errors_clone = errors.clone();
        let processor = CodecProcessor::new(
            Box::new(move |o| outputs_clone.lock().unwrap().push(o)),
            Box::new(move |e| errors_clone.lock().unwrap().push(e)),
            ResourceManager::with_timeout(Duration::from_secs(600)),
        );
        processor.configure(config).unwrap();
        Harness {
            gate_tx,
            processor,
            outputs,
            errors,
        }
    }

    fn ungated() -> TestConfig {
        TestConfig { gated: None, fail_on: None }
    }

    fn gated() -> TestConfig {
        TestConfig {
            gated: Some(GateHandle(Arc::new(Mutex::new(None)))),
            fail_on: None,
        }
    }

    #[test]
    fn test_outputs_arrive_in_submission_order() {
        let h = harness(ungated());
        for i in 0..50 {
            h.processor.submit(i).unwrap();
        }
        h.processor.flush().unwrap().wait().unwrap();
        assert_eq!(*h.outputs.lock().unwrap(), (0..50).collect::<Vec<_>>());
        assert_eq!(h.processor.queue_size(), 0);
    }

    #[test]
    fn test_flush_resolves_after_prior_outputs() {
        let h = harness(ungated());
        for i in 0..10 {
            h.processor.submit(i).unwrap();
        }
        h.processor.flush().unwrap().wait().unwrap();
        // By the time the flush promise resolves, every prior output has been
        // delivered to the callback.
        assert_eq!(h.outputs.lock().unwrap().len(), 10);
    }

    #[test]
    fn test_hard_cap_is_synchronous_quota_exceeded() {
        let h = harness(gated());
        let mut accepted = 0;
        let overflow = loop {
            match h.processor.submit(accepted) {
                Ok(()) => accepted += 1,
                Err(err) => break err,
            }
        };
        assert_eq!(overflow.kind(), ErrorKind::QuotaExceeded);
        assert_eq!(accepted, DEFAULT_HARD_CAP);
        // The rejected submission did not bump the counter.
        assert_eq!(h.processor.queue_size(), DEFAULT_HARD_CAP);

        for _ in 0..accepted {
            h.gate_tx.send(()).unwrap();
        }
        h.processor.flush().unwrap().wait().unwrap();
        assert_eq!(h.processor.queue_size(), 0);
    }

    #[test]
    fn test_reset_zeroes_queue_and_aborts_flushes() {
        let h = harness(gated());
        for i in 0..8 {
            h.processor.submit(i).unwrap();
        }
        let pending_flush = h.processor.flush().unwrap();
        h.processor.reset().unwrap();

        assert_eq!(h.processor.queue_size(), 0);
        assert_eq!(h.processor.state(), CodecState::Unconfigured);
        assert_eq!(pending_flush.wait().unwrap_err().kind(), ErrorKind::Abort);

        // Release the worker; no outputs from the superseded generation may
        // surface.
        for _ in 0..8 {
            let _ = h.gate_tx.send(());
        }
        std::thread::sleep(Duration::from_millis(50));
        assert!(h.outputs.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dequeue_events_are_coalesced() {
        let h = harness(ungated());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        h.processor
            .set_ondequeue(Some(Box::new(move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })));

        let n = 30;
        for i in 0..n {
            h.processor.submit(i).unwrap();
        }
        h.processor.flush().unwrap().wait().unwrap();

        let count = fired.load(Ordering::SeqCst);
        assert!(count >= 1, "at least one dequeue event fires");
        assert!(count <= n as usize, "no more events than submissions");
    }

    #[test]
    fn test_ready_parks_at_threshold_and_recovers() {
        let h = harness(gated());
        h.processor.set_ready_threshold(4);
        for i in 0..4 {
            h.processor.submit(i).unwrap();
        }
        let parked = h.processor.ready();

        // Complete one job; the queue drops below the threshold.
        h.gate_tx.send(()).unwrap();
        parked.wait().unwrap();
        assert!(h.processor.queue_size() < 4);

        for _ in 0..3 {
            h.gate_tx.send(()).unwrap();
        }
        h.processor.flush().unwrap().wait().unwrap();
        // Below the threshold the signal is immediately ready.
        h.processor.ready().wait().unwrap();
    }

    #[test]
    fn test_engine_error_closes_codec_and_fires_error_callback() {
        let h = harness(TestConfig { gated: None, fail_on: Some(3) });
        for i in 0..5 {
            h.processor.submit(i).unwrap();
        }
        // Wait for the error to land.
        let deadline = Instant::now() + Duration::from_secs(5);
        while h.errors.lock().unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let errors = h.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::Data);
        drop(errors);
        assert_eq!(h.processor.state(), CodecState::Closed);
        assert_eq!(h.processor.queue_size(), 0);

        // Submissions after the failure are invalid-state.
        assert_eq!(
            h.processor.submit(9).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_reconfigure_blocks_until_outstanding_work_clears() {
        let h = harness(gated());
        for i in 0..3 {
            h.processor.submit(i).unwrap();
        }
        // Reconfigure while work is outstanding, then submit more.
        h.processor.configure(ungated()).unwrap();
        h.processor.submit(100).unwrap();

        for _ in 0..3 {
            h.gate_tx.send(()).unwrap();
        }
        h.processor.flush().unwrap().wait().unwrap();
        let outputs = h.outputs.lock().unwrap();
        assert_eq!(*outputs, vec![0, 1, 2, 100]);
    }

    #[test]
    fn test_close_is_idempotent_and_silences_outputs() {
        let h = harness(gated());
        for i in 0..4 {
            h.processor.submit(i).unwrap();
        }
        h.processor.close();
        h.processor.close();
        assert_eq!(h.processor.state(), CodecState::Closed);
        for _ in 0..4 {
            let _ = h.gate_tx.send(());
        }
        std::thread::sleep(Duration::from_millis(50));
        assert!(h.outputs.lock().unwrap().is_empty());
        assert!(h.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_output_callback_is_contained() {
        let outputs_seen = Arc::new(AtomicUsize::new(0));
        let seen = outputs_seen.clone();
        let processor: CodecProcessor<TestEngine> = CodecProcessor::new(
            Box::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                panic!("handler bug");
            }),
            Box::new(|_| {}),
            ResourceManager::with_timeout(Duration::from_secs(600)),
        );
        processor.configure(ungated()).unwrap();
        processor.submit(1).unwrap();
        processor.submit(2).unwrap();
        processor.flush().unwrap().wait().unwrap();
        // Both outputs were attempted despite the first handler panic.
        assert_eq!(outputs_seen.load(Ordering::SeqCst), 2);
    }
}
