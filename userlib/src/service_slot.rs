//! Compile-time-named placeholders for well-known services, the hosted
//! analog of the teacher's `TaskSlot`/`task_slot!`: instead of a linker
//! section patched by a post-compile tool, a `ServiceSlot` names a fixed
//! root-context path and resolves it lazily on first use, caching the
//! result for the life of the process.

use std::sync::OnceLock;

use crate::{Client, Code, Handle};

/// A lazily-resolved, cached handle to a path in the root naming context.
/// Analogous to `TaskSlot::UNBOUND` panicking if queried before being
/// patched: here, `get` returns the lookup's `Err` instead of panicking,
/// since a hosted process can reasonably retry rather than fault.
pub struct ServiceSlot {
    path: &'static str,
    cached: OnceLock<ObjectRefCache>,
}

struct ObjectRefCache(abi::idl::ObjectRef);

impl ServiceSlot {
    pub const fn new(path: &'static str) -> Self {
        ServiceSlot {
            path,
            cached: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    /// Resolves the slot against `client`'s root context the first time
    /// it's called, and hands back a fresh [`Handle`] (a new capability
    /// table entry) on every call thereafter from the cached object
    /// reference — mirroring how `TaskSlot::get_task_id` re-derives a
    /// `TaskId` on every call rather than caching the ID itself.
    pub fn get(&self, client: &Client) -> Result<Handle, Code> {
        if let Some(cached) = self.cached.get() {
            return client.adopt(cached.0.clone());
        }
        let handle = client.lookup(self.path)?;
        let _ = self.cached.set(ObjectRefCache(handle.object_ref()));
        Ok(handle)
    }
}

/// Declares a `static` [`ServiceSlot`] bound to a root-context path, for use
/// the way the teacher's generated code uses `task_slot!(NET, net)`.
#[macro_export]
macro_rules! service_slot {
    ($name:ident, $path:expr) => {
        static $name: $crate::service_slot::ServiceSlot =
            $crate::service_slot::ServiceSlot::new($path);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Client;
    use std::path::PathBuf;

    service_slot!(NETWORK_CONFIG, "network/config");

    #[test]
    fn slot_resolves_once_and_then_serves_from_cache() {
        let client = Client::new(1, PathBuf::from("/tmp/es-test"), 4);
        let target = abi::idl::ObjectRef::new(client.pid(), 9, "Widget");
        client.root().bind_path("network/config", target.clone()).unwrap();

        let first = NETWORK_CONFIG.get(&client).unwrap();
        assert_eq!(first.object_ref(), target);
        drop(first);

        // Unbind so a second live lookup would fail; the cached path must
        // still resolve because `get` no longer consults the naming
        // context once cached.
        client.root().unbind("network").ok();
        let second = NETWORK_CONFIG.get(&client);
        assert!(second.is_ok());
    }
}
