//! Ring buffer for recording diagnostic events from the kernel, the conduit
//! framework, and the network stack.
//!
//! This is a hosted translation of the teacher's ring buffer: instead of a
//! `no_std` `StaticCell` over a single-threaded target, entries are recorded
//! through a `Mutex` since the concurrency kernel runs several OS threads at
//! once. The macro surface (`ringbuf!`, `ringbuf_entry!`, `counted_ringbuf!`)
//! and the de-duplication behavior are unchanged.
//!
//! ## Creating a ring buffer
//!
//! ```
//! ringbuf::ringbuf!(u32, 16, 0);
//! ringbuf::ringbuf_entry!(42);
//! ```
//!
//! An entry identical to the previous one (same source line, same payload)
//! increments that entry's count instead of allocating a new slot, so a burst
//! of repeated events doesn't crowd out history.

use std::sync::Mutex;

pub use counters::Count;

/// The structure of a single [`Ringbuf`] entry.
#[derive(Debug, Copy, Clone)]
pub struct RingbufEntry<T: Copy, C> {
    pub line: u32,
    pub generation: u32,
    pub payload: T,
    pub count: C,
}

/// A fixed-capacity ring buffer of parametrized entry type, guarded by a
/// mutex so it can be shared across the OS threads that make up a process.
pub struct Ringbuf<T: Copy, C, const N: usize> {
    inner: Mutex<RingbufState<T, C, N>>,
}

struct RingbufState<T: Copy, C, const N: usize> {
    last: Option<usize>,
    buffer: [RingbufEntry<T, C>; N],
}

/// A ring buffer plus per-variant event counters (see [`counters::Count`]),
/// so history survives even once old entries have been overwritten.
pub struct CountedRingbuf<T: Count + Copy, C, const N: usize> {
    pub ringbuf: Ringbuf<T, C, N>,
    pub counters: T::Counters,
}

/// Abstraction over ringbuf-like types so [`ringbuf_entry!`] can record into
/// either a [`Ringbuf`] or a [`CountedRingbuf`] without knowing which.
pub trait RecordEntry<T: Copy> {
    fn record_entry(&self, line: u32, payload: T);
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, u32, N> {
    pub const fn new(init: T) -> Self
    where
        T: Copy,
    {
        Ringbuf {
            inner: Mutex::new(RingbufState {
                last: None,
                buffer: [RingbufEntry {
                    line: 0,
                    generation: 0,
                    payload: init,
                    count: 0,
                }; N],
            }),
        }
    }
}

impl<T: Copy + PartialEq, const N: usize> RecordEntry<T> for Ringbuf<T, u32, N> {
    fn record_entry(&self, line: u32, payload: T) {
        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        let last = state.last.unwrap_or(usize::MAX);
        if let Some(ent) = state.buffer.get_mut(last) {
            if ent.line == line && ent.payload == payload {
                if let Some(new_count) = ent.count.checked_add(1) {
                    ent.count = new_count;
                    return;
                }
            }
        }
        state.do_record(last, line, 1, payload);
    }
}

impl<T: Copy, C, const N: usize> RingbufState<T, C, N> {
    fn do_record(&mut self, last: usize, line: u32, count: C, payload: T) {
        let ndx = {
            let next = last.wrapping_add(1);
            if next >= self.buffer.len() {
                0
            } else {
                next
            }
        };
        let generation = self.buffer[ndx].generation.wrapping_add(1);
        self.buffer[ndx] = RingbufEntry {
            line,
            payload,
            count,
            generation,
        };
        self.last = Some(ndx);
    }
}

impl<T, const N: usize> RecordEntry<T> for CountedRingbuf<T, u32, N>
where
    T: Count + Copy + PartialEq,
{
    fn record_entry(&self, line: u32, payload: T) {
        payload.count(&self.counters);
        self.ringbuf.record_entry(line, payload);
    }
}

/// Declares a ring buffer in the current module. `ringbuf!(Type, N, init)`
/// declares it under the name `__RINGBUF`; `ringbuf!(NAME, Type, N, init)`
/// names it explicitly.
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        static $name: $crate::Ringbuf<$t, u32, $n> = $crate::Ringbuf::new($init);
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

/// Declares a ring buffer with per-variant event counters. `Type` must
/// implement [`counters::Count`], typically via `#[derive(counters::Count)]`.
#[macro_export]
macro_rules! counted_ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        static $name: $crate::CountedRingbuf<$t, u32, $n> = $crate::CountedRingbuf {
            ringbuf: $crate::Ringbuf::new($init),
            counters: <$t as $crate::Count>::NEW_COUNTERS,
        };
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::counted_ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

/// Records an entry. `ringbuf_entry!(NAME, expr)` records into the named
/// buffer; `ringbuf_entry!(expr)` records into the module's `__RINGBUF`.
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        let (payload, buf) = ($payload, &$buf);
        $crate::RecordEntry::record_entry(buf, line!(), payload);
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    ringbuf!(TEST_RING, u32, 4, 0);

    #[test]
    fn entries_wrap_after_capacity() {
        for i in 0..10u32 {
            ringbuf_entry!(TEST_RING, i);
        }
        let state = TEST_RING.inner.lock().unwrap();
        assert_eq!(state.buffer.len(), 4);
        assert!(state.last.is_some());
    }

    #[test]
    fn repeated_entry_increments_count_instead_of_advancing() {
        ringbuf!(DEDUP_RING, u32, 4, 0);
        for _ in 0..2 {
            ringbuf_entry!(DEDUP_RING, 7u32);
        }
        let state = DEDUP_RING.inner.lock().unwrap();
        let last = state.last.unwrap();
        assert_eq!(state.buffer[last].count, 2);
    }
}
