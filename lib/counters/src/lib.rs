//! Per-variant event counters, so a diagnostic ring buffer retains some
//! history even once old entries have scrolled off.
//!
//! The teacher derives [`Count`] with a proc macro over variant counts
//! packed into a few bytes of static memory. Our process threads share
//! actual cache lines, so counters here are atomic and the impl is written
//! by hand per enum rather than derived — there's no `#[derive(Count)]`
//! here, just the trait and the two macros that drive it.

use std::sync::atomic::{AtomicU32, Ordering};

/// A countable event, generally an enum whose variants are the events of
/// interest to a particular ring buffer.
pub trait Count {
    /// A type that counts occurrences of this event, one counter per
    /// variant.
    type Counters;

    /// Initializer for a new, zeroed set of counters.
    const NEW_COUNTERS: Self::Counters;

    /// Increments the counter matching this event.
    fn count(&self, counters: &Self::Counters);
}

/// A single atomic counter, the building block hand-written `Count` impls
/// compose into a per-enum `Counters` struct.
#[derive(Debug, Default)]
pub struct Counter(AtomicU32);

impl Counter {
    pub const fn new() -> Self {
        Counter(AtomicU32::new(0))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Declares a set of event counters. `counters!(NAME, Type)` creates a
/// static named `NAME` counting occurrences of `Type`; `counters!(Type)`
/// defaults the name to `__COUNTERS`.
#[macro_export]
macro_rules! counters {
    ($name:ident, $Type:ident) => {
        static $name: <$Type as $crate::Count>::Counters = <$Type as $crate::Count>::NEW_COUNTERS;
    };
    ($Type:ident) => {
        $crate::counters!(__COUNTERS, $Type);
    };
}

/// Counts an event into a set of counters declared with [`counters!`].
#[macro_export]
macro_rules! count {
    ($counters:expr, $event:expr) => {{
        let (e, ctrs) = ($event, &$counters);
        $crate::Count::count(&e, ctrs);
    }};
    ($event:expr) => {
        $crate::count!(__COUNTERS, $event);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum TestEvent {
        Idle,
        Fired,
        Dropped,
    }

    #[derive(Default)]
    struct TestEventCounters {
        idle: Counter,
        fired: Counter,
        dropped: Counter,
    }

    impl Count for TestEvent {
        type Counters = TestEventCounters;

        const NEW_COUNTERS: Self::Counters = TestEventCounters {
            idle: Counter::new(),
            fired: Counter::new(),
            dropped: Counter::new(),
        };

        fn count(&self, counters: &Self::Counters) {
            match self {
                TestEvent::Idle => counters.idle.increment(),
                TestEvent::Fired => counters.fired.increment(),
                TestEvent::Dropped => counters.dropped.increment(),
            }
        }
    }

    #[test]
    fn counts_increment_the_matching_variant_only() {
        let counters = TestEvent::NEW_COUNTERS;
        TestEvent::Fired.count(&counters);
        TestEvent::Fired.count(&counters);
        TestEvent::Idle.count(&counters);
        assert_eq!(counters.fired.get(), 2);
        assert_eq!(counters.idle.get(), 1);
        assert_eq!(counters.dropped.get(), 0);
    }
}
