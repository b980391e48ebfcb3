//! The root naming context (spec §6 "Name-service surface"): a `/`-separated
//! path tree of subcontexts (`interface/`, `class/`, `device/…`, `file/…`,
//! `network/…`) binding names to object references, grounded in
//! `original_source/os/kernel/testsuite/context.cpp`'s `Context` exerciser —
//! `bind`/`unbind`/`lookup`/`list` over path components resolved one
//! segment at a time.
//!
//! This is the data model a client walks to turn `"network/config"` into an
//! `ObjectRef`; `userlib::Client::lookup` is the ergonomic front end to it.

use std::collections::HashMap;
use std::sync::RwLock;

use abi::idl::ObjectRef;
use abi::Code;

enum Node {
    Context(NamingContext),
    Bound(ObjectRef),
}

/// One level of the naming tree. The root context is just a `NamingContext`
/// with no parent; subcontexts are created on demand by `bind_context`.
#[derive(Default)]
pub struct NamingContext {
    children: RwLock<HashMap<String, Node>>,
}

impl NamingContext {
    pub fn new() -> Self {
        NamingContext::default()
    }

    /// Creates (if absent) and returns the subcontext at `name` directly
    /// under this context — used to build out `network/`, `network/interface/0/`, etc.
    pub fn bind_context(&self, name: &str) -> Result<(), Code> {
        let mut children = self.children.write().unwrap();
        match children.get(name) {
            Some(Node::Context(_)) => Ok(()),
            Some(Node::Bound(_)) => Err(Code::AlreadyExists),
            None => {
                children.insert(name.to_string(), Node::Context(NamingContext::new()));
                Ok(())
            }
        }
    }

    /// Binds `name` directly under this context to an object reference.
    pub fn bind(&self, name: &str, obj: ObjectRef) -> Result<(), Code> {
        let mut children = self.children.write().unwrap();
        if children.contains_key(name) {
            return Err(Code::AlreadyExists);
        }
        children.insert(name.to_string(), Node::Bound(obj));
        Ok(())
    }

    pub fn unbind(&self, name: &str) -> Result<(), Code> {
        self.children
            .write()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or(Code::NotFound)
    }

    /// Resolves a `/`-separated path, walking one context per segment and
    /// requiring the final segment to be a bound object.
    pub fn lookup(&self, path: &str) -> Result<ObjectRef, Code> {
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        let Some(first) = segments.next() else {
            return Err(Code::InvalidArg);
        };
        let children = self.children.read().unwrap();
        match (children.get(first), segments.peek()) {
            (Some(Node::Bound(obj)), None) => Ok(obj.clone()),
            (Some(Node::Bound(_)), Some(_)) => Err(Code::InvalidArg),
            (Some(Node::Context(ctx)), None) => {
                // A context alone does not resolve to an object reference.
                let _ = ctx;
                Err(Code::InvalidArg)
            }
            (Some(Node::Context(ctx)), Some(_)) => {
                let rest: Vec<&str> = segments.collect();
                ctx.lookup(&rest.join("/"))
            }
            (None, _) => Err(Code::NotFound),
        }
    }

    /// Lists the names bound directly under this context (not recursive).
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.children.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Builds the root context with the standard subcontexts spec §6 names
/// (`interface/`, `class/`, `device/`, `file/`, `network/`), leaving their
/// contents for the owning process to populate.
pub fn standard_root() -> NamingContext {
    let root = NamingContext::new();
    for name in ["interface", "class", "device", "file", "network"] {
        root.bind_context(name).unwrap();
    }
    root
}

impl NamingContext {
    /// Resolves (creating intermediate contexts as needed) the subcontext
    /// chain named by `path`'s directory components.
    pub fn resolve_context(&self, path: &str) -> Result<(), Code> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.resolve_context_rec(&segments)
    }

    fn resolve_context_rec(&self, segments: &[&str]) -> Result<(), Code> {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(());
        };
        self.bind_context(head)?;
        if rest.is_empty() {
            return Ok(());
        }
        let children = self.children.read().unwrap();
        match children.get(*head) {
            Some(Node::Context(ctx)) => ctx.resolve_context_rec(rest),
            _ => Err(Code::InvalidArg),
        }
    }

    /// Binds `obj` at `path`, creating any missing intermediate contexts
    /// first.
    pub fn bind_path(&self, path: &str, obj: ObjectRef) -> Result<(), Code> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((leaf, dirs)) = segments.split_last() else {
            return Err(Code::InvalidArg);
        };
        self.resolve_context_rec(dirs)?;
        self.bind_at(dirs, leaf, obj)
    }

    fn bind_at(&self, dirs: &[&str], leaf: &str, obj: ObjectRef) -> Result<(), Code> {
        let Some((head, rest)) = dirs.split_first() else {
            return self.bind(leaf, obj);
        };
        let children = self.children.read().unwrap();
        match children.get(*head) {
            Some(Node::Context(ctx)) => ctx.bind_at(rest, leaf, obj),
            _ => Err(Code::InvalidArg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(id: u64) -> ObjectRef {
        ObjectRef::new(1, id, "Widget")
    }

    #[test]
    fn standard_root_has_the_spec_subcontexts() {
        let root = standard_root();
        assert_eq!(
            root.list(),
            vec!["class", "device", "file", "interface", "network"]
        );
    }

    #[test]
    fn bind_path_creates_intermediate_contexts() {
        let root = standard_root();
        root.bind_path("network/config", r(1)).unwrap();
        assert_eq!(root.lookup("network/config").unwrap(), r(1));
    }

    #[test]
    fn nested_interface_paths_resolve_per_spec_surface() {
        let root = standard_root();
        root.bind_path("network/interface/0/interface", r(10)).unwrap();
        root.bind_path("network/interface/0/dhcp", r(11)).unwrap();
        assert_eq!(root.lookup("network/interface/0/interface").unwrap(), r(10));
        assert_eq!(root.lookup("network/interface/0/dhcp").unwrap(), r(11));
    }

    #[test]
    fn looking_up_a_bare_context_fails() {
        let root = standard_root();
        assert_eq!(root.lookup("network"), Err(Code::InvalidArg));
    }

    #[test]
    fn looking_up_an_unbound_name_fails() {
        let root = standard_root();
        assert_eq!(root.lookup("network/resolver"), Err(Code::NotFound));
    }

    #[test]
    fn rebinding_the_same_name_fails() {
        let root = standard_root();
        root.bind_path("network/config", r(1)).unwrap();
        assert_eq!(root.bind_path("network/config", r(2)), Err(Code::AlreadyExists));
    }
}
