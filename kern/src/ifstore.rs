//! Interface store & metadata (Component A), grounded in
//! `original_source/os/libes++/src/interfaceStore.cpp`'s `InterfaceStore`:
//! a process-wide name → descriptor registry plus a name → constructor map.
//!
//! Registration is a two-pass operation (spec §4.1 "Registration must be
//! able to resolve forward references"): all descriptors in a blob are
//! inserted first, then `inherited_method_count` is computed for each, once
//! every base name in the blob is resolvable.

use std::collections::HashMap;
use std::sync::RwLock;

use abi::idl::{InterfaceDescriptor, OBJECT_INTERFACE};
use abi::Code;

struct Entry {
    descriptor: InterfaceDescriptor,
    inherited_method_count: usize,
    constructor: Option<abi::idl::ObjectRef>,
}

/// Read-mostly registry: registration is rare (startup, optional dynamic
/// extension) while lookup happens on every method dispatch, so a
/// `RwLock` is the natural fit (spec §4.1 "safe under concurrent readers").
pub struct InterfaceStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InterfaceStore {
    /// A freshly constructed store already knows about the universal object
    /// interface every other interface must transitively reach.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            OBJECT_INTERFACE.to_string(),
            Entry {
                descriptor: InterfaceDescriptor::universal_object(),
                inherited_method_count: 3,
                constructor: None,
            },
        );
        InterfaceStore {
            entries: RwLock::new(entries),
        }
    }

    /// Registers a whole blob of descriptors at once, so that bases within
    /// the same blob can refer forward to interfaces not yet inserted.
    pub fn register_blob(&self, blob: Vec<InterfaceDescriptor>) -> Result<(), Code> {
        let mut entries = self.entries.write().unwrap();
        for descriptor in &blob {
            if let Some(existing) = entries.get(&descriptor.name) {
                if existing.descriptor == *descriptor {
                    continue;
                }
                return Err(Code::AlreadyExists);
            }
        }
        for descriptor in blob {
            let name = descriptor.name.clone();
            entries.entry(name).or_insert(Entry {
                descriptor,
                inherited_method_count: 0,
                constructor: None,
            });
        }
        // Second pass: every base in this blob is now resolvable, so we can
        // fold in inherited method counts. Interfaces that are not reachable
        // from the universal object are a self-inflicted invariant
        // violation on the caller's part and are rejected below.
        let names: Vec<String> = entries.keys().cloned().collect();
        for name in names {
            let count = self.resolve_inherited_count(&entries, &name)?;
            entries.get_mut(&name).unwrap().inherited_method_count = count;
        }
        Ok(())
    }

    pub fn register(&self, descriptor: InterfaceDescriptor) -> Result<(), Code> {
        self.register_blob(vec![descriptor])
    }

    fn resolve_inherited_count(
        &self,
        entries: &HashMap<String, Entry>,
        name: &str,
    ) -> Result<usize, Code> {
        if name == OBJECT_INTERFACE {
            return Ok(3);
        }
        let entry = entries.get(name).ok_or(Code::NotFound)?;
        if entry.descriptor.bases.is_empty() {
            // Every interface must transitively reach ObjectInterface; a
            // base interface with no bases of its own and a name other
            // than ObjectInterface is a dangling root.
            return Err(Code::InvalidArg);
        }
        let mut total = entry.descriptor.methods.len();
        for base in &entry.descriptor.bases {
            total += self.resolve_inherited_count(entries, base)?;
        }
        Ok(total)
    }

    pub fn lookup(&self, name: &str) -> Result<InterfaceDescriptor, Code> {
        self.entries
            .read()
            .unwrap()
            .get(name)
            .map(|e| e.descriptor.clone())
            .ok_or(Code::NotFound)
    }

    pub fn inherited_method_count(&self, name: &str) -> Result<usize, Code> {
        self.entries
            .read()
            .unwrap()
            .get(name)
            .map(|e| e.inherited_method_count)
            .ok_or(Code::NotFound)
    }

    pub fn set_constructor(&self, name: &str, obj: abi::idl::ObjectRef) -> Result<(), Code> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries.get_mut(name).ok_or(Code::NotFound)?;
        entry.constructor = Some(obj);
        Ok(())
    }

    pub fn get_constructor(&self, name: &str) -> Option<abi::idl::ObjectRef> {
        self.entries.read().unwrap().get(name)?.constructor.clone()
    }

    pub fn remove(&self, name: &str) -> Result<(), Code> {
        let mut entries = self.entries.write().unwrap();
        if name == OBJECT_INTERFACE {
            return Err(Code::PermissionDenied);
        }
        entries.remove(name).map(|_| ()).ok_or(Code::NotFound)
    }
}

impl Default for InterfaceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::idl::MethodSignature;
    use abi::any::ParamKind;

    fn sig(name: &str) -> MethodSignature {
        MethodSignature {
            name: name.into(),
            params: vec![],
            returns: ParamKind::Void,
        }
    }

    #[test]
    fn universal_object_is_preregistered() {
        let store = InterfaceStore::new();
        assert!(store.lookup(OBJECT_INTERFACE).is_ok());
    }

    #[test]
    fn forward_reference_within_a_blob_resolves() {
        let store = InterfaceStore::new();
        let base = InterfaceDescriptor::new("Base")
            .with_base(OBJECT_INTERFACE)
            .with_method(sig("baseMethod"));
        let derived = InterfaceDescriptor::new("Derived")
            .with_base("Base")
            .with_method(sig("derivedMethod"));
        store.register_blob(vec![derived, base]).unwrap();
        assert_eq!(store.inherited_method_count("Derived").unwrap(), 1 + 1 + 3);
    }

    #[test]
    fn re_registering_identical_descriptor_is_a_no_op() {
        let store = InterfaceStore::new();
        let d = InterfaceDescriptor::new("Widget").with_base(OBJECT_INTERFACE);
        store.register(d.clone()).unwrap();
        store.register(d).unwrap();
    }

    #[test]
    fn re_registering_changed_descriptor_fails() {
        let store = InterfaceStore::new();
        store
            .register(InterfaceDescriptor::new("Widget").with_base(OBJECT_INTERFACE))
            .unwrap();
        let changed = InterfaceDescriptor::new("Widget")
            .with_base(OBJECT_INTERFACE)
            .with_method(sig("extra"));
        assert_eq!(store.register(changed), Err(Code::AlreadyExists));
    }

    #[test]
    fn lookup_of_unknown_name_fails() {
        let store = InterfaceStore::new();
        assert_eq!(store.lookup("Nope"), Err(Code::NotFound));
    }
}
