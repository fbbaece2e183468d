//! Control message queue.
//!
//! Each codec object owns one: a strictly ordered FIFO of deferred operations
//! that touch codec state. Draining is serialized by a dedicated mutex so
//! messages never run concurrently for the same codec, no matter which thread
//! triggers the drain. A message that finds its precondition unmet returns
//! itself as `Blocked`; the queue parks until `unblock()` and the next drain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub(crate) enum MessageOutcome<M> {
    Processed,
    Blocked(M),
}

pub(crate) struct ControlMessageQueue<M> {
    queue: Mutex<VecDeque<M>>,
    blocked: AtomicBool,
    drain_lock: Mutex<()>,
}

impl<M> ControlMessageQueue<M> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            blocked: AtomicBool::new(false),
            drain_lock: Mutex::new(()),
        }
    }

    pub fn push(&self, message: M) {
        self.queue.lock().expect("control queue poisoned").push_back(message);
    }

    /// Drop every queued message and clear the blocked flag.
    pub fn clear(&self) {
        self.queue.lock().expect("control queue poisoned").clear();
        self.blocked.store(false, Ordering::Release);
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    pub fn unblock(&self) {
        self.blocked.store(false, Ordering::Release);
    }

    /// Process queued messages in order until the queue empties or a message
    /// blocks. Concurrent callers serialize; each runs the handler on the
    /// messages it manages to pop.
    pub fn drain(&self, mut handler: impl FnMut(M) -> MessageOutcome<M>) {
        let _guard = self.drain_lock.lock().expect("control drain poisoned");
        loop {
            if self.blocked.load(Ordering::Acquire) {
                return;
            }
            let message = {
                let mut queue = self.queue.lock().expect("control queue poisoned");
                queue.pop_front()
            };
            let Some(message) = message else { return };
            match handler(message) {
                MessageOutcome::Processed => {}
                MessageOutcome::Blocked(message) => {
                    self.queue
                        .lock()
                        .expect("control queue poisoned")
                        .push_front(message);
                    self.blocked.store(true, Ordering::Release);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = ControlMessageQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        let mut seen = Vec::new();
        queue.drain(|m| {
            seen.push(m);
            MessageOutcome::Processed
        });
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_blocked_message_stays_at_front() {
        let queue = ControlMessageQueue::new();
        queue.push(10);
        queue.push(20);
        queue.drain(|m| {
            if m == 10 {
                MessageOutcome::Blocked(m)
            } else {
                MessageOutcome::Processed
            }
        });
        assert!(queue.is_blocked());

        // Nothing processes while blocked.
        let mut seen = Vec::new();
        queue.drain(|m| {
            seen.push(m);
            MessageOutcome::Processed
        });
        assert!(seen.is_empty());

        queue.unblock();
        queue.drain(|m| {
            seen.push(m);
            MessageOutcome::Processed
        });
        assert_eq!(seen, vec![10, 20]);
    }

    #[test]
    fn test_clear_unblocks() {
        let queue = ControlMessageQueue::new();
        queue.push(1);
        queue.drain(|m| MessageOutcome::Blocked(m));
        queue.clear();
        assert!(!queue.is_blocked());
        let mut seen = Vec::new();
        queue.drain(|m: i32| {
            seen.push(m);
            MessageOutcome::Processed
        });
        assert!(seen.is_empty());
    }
}
