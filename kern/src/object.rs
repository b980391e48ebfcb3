//! Object runtime (Component B, the non-broker half): the reference-counted
//! contract every in-process object implements, grounded in
//! `original_source/include/es/broker.h`'s `Broker<...>::Object` template,
//! which wraps a method table behind `queryInterface`/`addRef`/`release`.
//!
//! Rust's ownership model makes bare `Arc<dyn Trait>` the idiomatic stand-in
//! for reference counting, but the spec's capability table (`CapTable`)
//! needs a refcount it controls directly (so that a `put` reaching zero is
//! exactly when destruction happens, not whenever the last `Arc` clone
//! drops) — so objects here carry their own atomic count rather than
//! relying on `Arc`'s.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use abi::{Any, Code};

/// Every object reachable through the broker implements this. `query_interface`
/// follows the universal-object invariant from spec §3: it must succeed for
/// any interface name the concrete object (or a base) implements. `invoke`
/// is spec §4.2's "Invocation": the broker (or a local caller) has already
/// resolved the target and validated the call against the interface store;
/// this is where the method actually runs.
pub trait Object: Send + Sync {
    fn interface_name(&self) -> &str;
    fn query_interface(&self, iid: &str) -> Option<Arc<dyn Object>>;
    fn invoke(&self, method_index: u32, args: Vec<Any>) -> Result<Any, Code>;
}

/// The reference count an `Object` impl embeds. `add_ref`/`release` mirror
/// spec §4.2's public per-object contract exactly.
#[derive(Debug)]
pub struct RefCount(AtomicU32);

impl RefCount {
    pub fn new() -> Self {
        RefCount(AtomicU32::new(1))
    }

    pub fn add_ref(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the count after release; callers must treat `0` as "now
    /// destroy this object" and must not call any other method on it
    /// afterward (spec §4.2 "destruction must not run concurrently with any
    /// in-flight method").
    pub fn release(&self) -> u32 {
        self.0.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

/// A process-local table of locally-implemented objects, keyed by object id,
/// used by the broker to resolve an `ObjectRef` whose `owner_pid` is this
/// process into the concrete `Arc<dyn Object>`.
pub struct ObjectTable {
    next_id: AtomicU32,
    objects: std::sync::Mutex<std::collections::HashMap<u64, Arc<dyn Object>>>,
}

impl ObjectTable {
    pub fn new() -> Self {
        ObjectTable {
            next_id: AtomicU32::new(1),
            objects: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Registers a freshly created object, returning the object id to embed
    /// in its `ObjectRef`.
    pub fn publish(&self, obj: Arc<dyn Object>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) as u64;
        self.objects.lock().unwrap().insert(id, obj);
        id
    }

    pub fn resolve(&self, object_id: u64) -> Result<Arc<dyn Object>, Code> {
        self.objects
            .lock()
            .unwrap()
            .get(&object_id)
            .cloned()
            .ok_or(Code::NotFound)
    }

    /// Drops this process's last reference to an object; called when the
    /// owning capability table slot's refcount reaches zero for a locally
    /// owned object.
    pub fn retire(&self, object_id: u64) {
        self.objects.lock().unwrap().remove(&object_id);
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget {
        refs: RefCount,
    }

    impl Object for Widget {
        fn interface_name(&self) -> &str {
            "Widget"
        }

        fn query_interface(&self, iid: &str) -> Option<Arc<dyn Object>> {
            if iid == "Widget" || iid == abi::idl::OBJECT_INTERFACE {
                self.refs.add_ref();
                None
            } else {
                None
            }
        }

        fn invoke(&self, method_index: u32, args: Vec<Any>) -> Result<Any, Code> {
            match method_index {
                0 => Ok(Any::Long(42)),
                1 => match args.as_slice() {
                    [Any::Long(a), Any::Long(b)] => Ok(Any::Long(a + b)),
                    _ => Err(Code::BadMessage),
                },
                _ => Err(Code::UnsupportedOperation),
            }
        }
    }

    #[test]
    fn publish_and_resolve_round_trips() {
        let table = ObjectTable::new();
        let w = Arc::new(Widget {
            refs: RefCount::new(),
        });
        let id = table.publish(w);
        assert!(table.resolve(id).is_ok());
        table.retire(id);
        assert_eq!(table.resolve(id).err(), Some(Code::NotFound));
    }

    #[test]
    fn refcount_reaches_zero_exactly_once() {
        let refs = RefCount::new();
        assert_eq!(refs.add_ref(), 2);
        assert_eq!(refs.release(), 1);
        assert_eq!(refs.release(), 0);
    }

    #[test]
    fn invoke_dispatches_by_method_index_and_arguments() {
        let table = ObjectTable::new();
        let id = table.publish(Arc::new(Widget {
            refs: RefCount::new(),
        }));
        let obj = table.resolve(id).unwrap();
        assert_eq!(obj.invoke(0, vec![]), Ok(Any::Long(42)));
        assert_eq!(
            obj.invoke(1, vec![Any::Long(2), Any::Long(3)]),
            Ok(Any::Long(5))
        );
        assert_eq!(obj.invoke(1, vec![Any::Long(2)]), Err(Code::BadMessage));
        assert_eq!(obj.invoke(9, vec![]), Err(Code::UnsupportedOperation));
    }
}
