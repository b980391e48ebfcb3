//! Thread identity and priority bookkeeping (spec §3 "Thread", §4.3), a
//! `std::thread`-based translation of the teacher's `Task`/`Priority`
//! bookkeeping in `kern/src/task.rs`. The host OS does the actual
//! preemptive scheduling (spec §5 "the kernel relies on the host for
//! time-slicing"); what lives here is the priority-inheritance bookkeeping
//! layered on top of it.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

/// Thread priority, 0 (lowest) to 255 (highest). Unlike the teacher's
/// Hubris tasks, where a *lower* number means more important (an artifact
/// of the static priority-ceiling scheme used for a fixed task set), this
/// runtime treats priority the conventional way: higher outranks lower,
/// matching the Java-style priority scheme the original object runtime's
/// threads use.
pub type Priority = u8;

pub const LOWEST: Priority = 0;
pub const NORMAL: Priority = 128;
pub const HIGHEST: Priority = 255;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ThreadState {
    New,
    Runnable,
    Running,
    Blocked,
    Waiting,
    TimedWaiting,
    Terminated,
}

/// A unit of execution tracked by the concurrency kernel. One `Thread`
/// backs exactly one `std::thread`; the kernel does not multiplex several
/// logical threads onto one OS thread.
pub struct Thread {
    pub id: u64,
    base_priority: Priority,
    effective_priority: AtomicU8,
    state: Mutex<ThreadState>,
    /// Monitors currently owned by this thread, used to recompute
    /// `effective_priority` when one of them is released (spec §5 "the
    /// owner recomputes from the remaining monitors it still holds").
    pub(crate) owned_monitors: Mutex<Vec<Arc<crate::monitor::Monitor>>>,
    /// The monitor this thread is currently blocked trying to acquire, if
    /// any. Forms one edge of the thread→monitor→owner blocking graph that
    /// `is_deadlocked` walks (spec §4.3 "the blocking graph must remain
    /// acyclic").
    blocked_on: Mutex<Option<Arc<crate::monitor::Monitor>>>,
    locals: Mutex<std::collections::HashMap<String, String>>,
}

impl Thread {
    pub fn new(id: u64, base_priority: Priority) -> Arc<Self> {
        Arc::new(Thread {
            id,
            base_priority,
            effective_priority: AtomicU8::new(base_priority),
            state: Mutex::new(ThreadState::New),
            owned_monitors: Mutex::new(Vec::new()),
            blocked_on: Mutex::new(None),
            locals: Mutex::new(std::collections::HashMap::new()),
        })
    }

    pub fn base_priority(&self) -> Priority {
        self.base_priority
    }

    pub fn effective_priority(&self) -> Priority {
        self.effective_priority.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, s: ThreadState) {
        *self.state.lock().unwrap() = s;
    }

    pub fn set_local(&self, key: impl Into<String>, value: impl Into<String>) {
        self.locals.lock().unwrap().insert(key.into(), value.into());
    }

    pub fn local(&self, key: &str) -> Option<String> {
        self.locals.lock().unwrap().get(key).cloned()
    }

    /// Recomputes this thread's effective priority as `max(base, max over
    /// owned monitors of the highest-priority waiter on each)`, per spec §5.
    /// Called on `unlock` of any monitor this thread owns, and whenever a
    /// new thread starts waiting on one of them.
    pub(crate) fn recompute_effective_priority(&self) {
        let mut best = self.base_priority;
        for m in self.owned_monitors.lock().unwrap().iter() {
            if let Some(p) = m.highest_waiter_priority() {
                best = best.max(p);
            }
        }
        self.effective_priority.store(best, Ordering::Release);
    }

    pub(crate) fn set_blocked_on(&self, m: Option<Arc<crate::monitor::Monitor>>) {
        *self.blocked_on.lock().unwrap() = m;
    }

    pub(crate) fn blocked_on(&self) -> Option<Arc<crate::monitor::Monitor>> {
        self.blocked_on.lock().unwrap().clone()
    }

    /// Walks the blocking graph starting from this thread (thread →
    /// monitor it's blocked on → that monitor's owner → ...), grounded in
    /// `original_source/neeraj/trunk/os/kernel/port/monitor.cpp`'s
    /// `ASSERT(!current->isDeadlocked())` check performed before a thread
    /// commits to blocking. Returns `true` if the walk loops back to `self`,
    /// i.e. the graph contains a cycle.
    pub(crate) fn is_deadlocked(self: &Arc<Self>) -> bool {
        let mut current = self.clone();
        loop {
            let Some(monitor) = current.blocked_on() else {
                return false;
            };
            let Some(owner) = monitor.current_owner() else {
                return false;
            };
            if Arc::ptr_eq(&owner, self) {
                return true;
            }
            current = owner;
        }
    }
}

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

pub fn next_thread_id() -> u64 {
    NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed) as u64
}

thread_local! {
    static CURRENT: std::cell::RefCell<Option<Arc<Thread>>> = const { std::cell::RefCell::new(None) };
}

/// Binds `t` as the kernel's notion of "the thread running on this OS
/// thread". Must be called once at the top of every `std::thread` the
/// kernel spawns.
pub fn set_current(t: Arc<Thread>) {
    t.set_state(ThreadState::Running);
    CURRENT.with(|c| *c.borrow_mut() = Some(t));
}

pub fn current() -> Arc<Thread> {
    CURRENT.with(|c| {
        c.borrow()
            .clone()
            .expect("set_current was not called on this OS thread")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_priority_defaults_to_base() {
        let t = Thread::new(1, 10);
        assert_eq!(t.effective_priority(), 10);
    }
}
