//! Alarms and the timer task (spec §3 "Alarm / Timer task", §4.3), a
//! `std::thread`-based translation of the teacher's bare-metal deadline
//! queue. A dedicated timer thread pops the earliest-due entry from an
//! ordered set, sleeps until it fires (or until preempted by an earlier
//! insertion), and re-inserts periodic tasks with `fire_at += period` so
//! they never accumulate drift.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub type Callback = Box<dyn FnMut() + Send>;

struct Entry {
    /// Guards `fire_at` only; the field is mutated solely while the entry
    /// has already been removed from the ordered set (see `run`), so the
    /// set's ordering invariant is never observed to change out from
    /// under it.
    fire_at: Mutex<Instant>,
    seq: u64,
    period: Option<Duration>,
    callback: Mutex<Callback>,
    enabled: AtomicBool,
}

impl Entry {
    fn key(&self) -> (Instant, u64) {
        (*self.fire_at.lock().unwrap(), self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

/// A handle to a scheduled alarm; dropping it does not cancel the alarm —
/// use `TimerWheel::cancel`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AlarmId(u64);

struct Inner {
    queue: BTreeSet<Arc<Entry>>,
    by_id: std::collections::HashMap<u64, Arc<Entry>>,
}

/// The ordered, time-keyed set of pending alarms plus the monitor/condvar
/// pair the dedicated timer thread blocks on (spec §4.3 "a dedicated
/// highest-priority thread pops the earliest due entry ... under a
/// monitor, sleeps with a bounded timeout").
pub struct TimerWheel {
    inner: Mutex<Inner>,
    cv: Condvar,
    next_seq: AtomicU64,
}

impl TimerWheel {
    pub fn new() -> Arc<Self> {
        Arc::new(TimerWheel {
            inner: Mutex::new(Inner {
                queue: BTreeSet::new(),
                by_id: std::collections::HashMap::new(),
            }),
            cv: Condvar::new(),
            next_seq: AtomicU64::new(1),
        })
    }

    /// Schedules `callback` to fire at `fire_at`, repeating every `period`
    /// if given.
    pub fn schedule(
        &self,
        fire_at: Instant,
        period: Option<Duration>,
        callback: Callback,
    ) -> AlarmId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(Entry {
            fire_at: Mutex::new(fire_at),
            seq,
            period,
            callback: Mutex::new(callback),
            enabled: AtomicBool::new(true),
        });
        let mut inner = self.inner.lock().unwrap();
        inner.by_id.insert(seq, entry.clone());
        inner.queue.insert(entry);
        self.cv.notify_all();
        AlarmId(seq)
    }

    /// Disables and removes a pending alarm. A scheduled task is considered
    /// live in the queue iff its enabled flag is set (spec invariant), so
    /// cancellation clears the flag and removes the entry from the ordered
    /// set in the same critical section — the two never observably diverge.
    pub fn cancel(&self, id: AlarmId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(e) = inner.by_id.remove(&id.0) {
            e.enabled.store(false, Ordering::Release);
            inner.queue.remove(&e);
        }
        self.cv.notify_all();
    }

    /// Runs the timer loop on the calling (dedicated) thread; never
    /// returns. Due entries are popped from the ordered set, fired outside
    /// the lock (so a slow callback does not block new `schedule` calls),
    /// then re-armed at `fire_at + period` with no drift if periodic.
    pub fn run(self: &Arc<Self>) -> ! {
        loop {
            let due = self.wait_for_due();
            for entry in due {
                if entry.enabled.load(Ordering::Acquire) {
                    (entry.callback.lock().unwrap())();
                }
                let rearm = entry.enabled.load(Ordering::Acquire) && entry.period.is_some();
                let mut inner = self.inner.lock().unwrap();
                if rearm {
                    let period = entry.period.unwrap();
                    let mut fire_at = entry.fire_at.lock().unwrap();
                    *fire_at += period;
                    drop(fire_at);
                    inner.queue.insert(entry.clone());
                } else {
                    inner.by_id.remove(&entry.seq);
                }
            }
        }
    }

    fn wait_for_due(&self) -> Vec<Arc<Entry>> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            let Some(next) = inner.queue.iter().next().cloned() else {
                inner = self.cv.wait(inner).unwrap();
                continue;
            };
            let now = Instant::now();
            if *next.fire_at.lock().unwrap() > now {
                let timeout = *next.fire_at.lock().unwrap() - now;
                let (next_inner, _) = self.cv.wait_timeout(inner, timeout).unwrap();
                inner = next_inner;
                continue;
            }
            let mut due = Vec::new();
            while let Some(candidate) = inner.queue.iter().next().cloned() {
                if *candidate.fire_at.lock().unwrap() > now {
                    break;
                }
                inner.queue.remove(&candidate);
                due.push(candidate);
            }
            return due;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_entry_is_enqueued() {
        let wheel = TimerWheel::new();
        wheel.schedule(Instant::now(), None, Box::new(|| {}));
        let inner = wheel.inner.lock().unwrap();
        assert_eq!(inner.queue.len(), 1);
    }

    #[test]
    fn cancel_removes_the_entry_from_the_queue() {
        let wheel = TimerWheel::new();
        let id = wheel.schedule(
            Instant::now() + Duration::from_secs(60),
            None,
            Box::new(|| {}),
        );
        wheel.cancel(id);
        let inner = wheel.inner.lock().unwrap();
        assert!(inner.by_id.get(&id.0).is_none());
        assert!(inner.queue.is_empty());
    }

    #[test]
    fn due_entries_are_popped_in_fire_time_order() {
        let wheel = TimerWheel::new();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let now = Instant::now();
        for (i, delay) in [20u64, 0, 10].into_iter().enumerate() {
            let fired = fired.clone();
            wheel.schedule(
                now + Duration::from_millis(delay),
                None,
                Box::new(move || fired.lock().unwrap().push(i)),
            );
        }
        let due = wheel.wait_for_due();
        // Only the entry at delay=0 should be immediately due.
        assert_eq!(due.len(), 1);
    }
}
