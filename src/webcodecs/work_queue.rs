//! Codec work queue.
//!
//! The bounded queue feeding a codec's worker thread. The worker owns the
//! codec-library context; everything the context touches arrives as a
//! [`WorkItem`] through here. A mutex plus condvar pair gates the worker;
//! `outstanding()` counts queued items plus the one the worker is holding, so
//! callers can tell when the previous configuration's work has fully cleared.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

pub(crate) enum WorkItem<Cfg, In> {
    /// Install a fresh codec-library context.
    Configure { config: Cfg, generation: u64 },
    /// Run one encode/decode submission.
    Process { input: In, generation: u64 },
    /// Flush barrier: drain the context and report completion.
    Flush { id: u64, generation: u64 },
    /// Stop the worker thread.
    Shutdown,
}

struct QueueState<Cfg, In> {
    items: VecDeque<WorkItem<Cfg, In>>,
    /// 1 while the worker holds a popped item, 0 otherwise.
    active: u32,
    quit: bool,
}

pub(crate) struct CodecWorkQueue<Cfg, In> {
    state: Mutex<QueueState<Cfg, In>>,
    cond: Condvar,
}

impl<Cfg, In> CodecWorkQueue<Cfg, In> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                active: 0,
                quit: false,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn push(&self, item: WorkItem<Cfg, In>) {
        let mut state = self.state.lock().expect("work queue poisoned");
        if state.quit {
            return;
        }
        state.items.push_back(item);
        self.cond.notify_one();
    }

    /// Block until an item is available. Returns `Shutdown` once the queue is
    /// told to quit; pending items are discarded at that point.
    pub fn pop_blocking(&self) -> WorkItem<Cfg, In> {
        let mut state = self.state.lock().expect("work queue poisoned");
        loop {
            if state.quit {
                return WorkItem::Shutdown;
            }
            if let Some(item) = state.items.pop_front() {
                state.active = 1;
                return item;
            }
            state = self.cond.wait(state).expect("work queue poisoned");
        }
    }

    /// The worker finished (or discarded) the item it popped.
    pub fn mark_idle(&self) {
        let mut state = self.state.lock().expect("work queue poisoned");
        state.active = 0;
    }

    /// Queued items plus the item currently held by the worker.
    pub fn outstanding(&self) -> usize {
        let state = self.state.lock().expect("work queue poisoned");
        state.items.len() + state.active as usize
    }

    /// Discard queued items without touching the worker.
    pub fn clear_pending(&self) {
        let mut state = self.state.lock().expect("work queue poisoned");
        state.items.clear();
    }

    /// Discard queued items and stop the worker after its current item.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().expect("work queue poisoned");
        state.quit = true;
        state.items.clear();
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    type TestQueue = CodecWorkQueue<(), u32>;

    #[test]
    fn test_pop_returns_pushed_items_in_order() {
        let queue: Arc<TestQueue> = Arc::new(CodecWorkQueue::new());
        queue.push(WorkItem::Process { input: 1, generation: 0 });
        queue.push(WorkItem::Process { input: 2, generation: 0 });
        for expected in [1, 2] {
            match queue.pop_blocking() {
                WorkItem::Process { input, .. } => assert_eq!(input, expected),
                _ => panic!("unexpected item"),
            }
            queue.mark_idle();
        }
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn test_outstanding_counts_held_item() {
        let queue: TestQueue = CodecWorkQueue::new();
        queue.push(WorkItem::Process { input: 1, generation: 0 });
        assert_eq!(queue.outstanding(), 1);
        let _ = queue.pop_blocking();
        assert_eq!(queue.outstanding(), 1);
        queue.mark_idle();
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn test_shutdown_wakes_blocked_worker() {
        let queue: Arc<TestQueue> = Arc::new(CodecWorkQueue::new());
        let clone = queue.clone();
        let handle = std::thread::spawn(move || matches!(clone.pop_blocking(), WorkItem::Shutdown));
        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.shutdown();
        assert!(handle.join().unwrap());
    }
}
