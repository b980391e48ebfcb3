//! Client-facing ergonomic API for application code reaching the root
//! naming context and invoking methods on handles, in the manner of the
//! teacher's `sys/userlib`: that crate wraps raw `sys_send`/`sys_recv`
//! syscalls in a `Client`-shaped API over task IDs; this crate wraps the
//! broker's `RpcReq`/`RpcRes` control-channel exchange in the same shape
//! over object handles.
//!
//! Where the teacher resolves a peer with `sys_refresh_task_id` against a
//! compile-time `TaskSlot`, a process here resolves a peer with
//! `Client::lookup` against a path in the root naming context
//! (`kern::naming`); see [`service_slot`] for the compile-time-placeholder
//! analog.

pub mod hl;
pub mod service_slot;

pub use abi::idl::ObjectRef;
pub use abi::{Any, Code};

use std::path::PathBuf;
use std::sync::Arc;

use kern::broker::{call_remote, socket_path, Broker};
use kern::naming::{self, NamingContext};

/// A process's view of the broker: its own local object/capability tables
/// plus the runtime directory used to reach every other process's control
/// channel (spec §6 `es-socket-<pid>`).
pub struct Client {
    pid: u32,
    runtime_dir: PathBuf,
    broker: Arc<Broker>,
    root: NamingContext,
}

impl Client {
    pub fn new(pid: u32, runtime_dir: PathBuf, captable_capacity: usize) -> Self {
        Client {
            pid,
            runtime_dir,
            broker: Arc::new(Broker::new(captable_capacity)),
            root: naming::standard_root(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn root(&self) -> &NamingContext {
        &self.root
    }

    /// Resolves a name-service path (e.g. `"network/config"`) to a
    /// [`Handle`] installed in this process's capability table.
    pub fn lookup(&self, path: &str) -> Result<Handle, Code> {
        let obj = self
            .root
            .lookup(path)
            .map_err(|_| Code::NotFound)?;
        self.adopt(obj)
    }

    /// Installs an already-resolved object reference as a capability,
    /// mirroring what a successful `ChanReq`/`ChanRes` exchange does for an
    /// object reference carried in on another channel.
    pub fn adopt(&self, obj: ObjectRef) -> Result<Handle, Code> {
        let slot = self.broker.captable.add(obj.clone());
        if slot < 0 {
            return Err(Code::OutOfMemory);
        }
        Ok(Handle {
            client: HandleClient {
                runtime_dir: self.runtime_dir.clone(),
                pid: self.pid,
                broker: self.broker.clone(),
            },
            target: obj,
            slot,
        })
    }
}

/// The slice of `Client` a `Handle` needs to keep alive after the `Client`
/// itself may have gone out of scope — the broker and runtime directory, not
/// the naming context (a handle never needs to re-resolve a name).
#[derive(Clone)]
struct HandleClient {
    runtime_dir: PathBuf,
    pid: u32,
    broker: Arc<Broker>,
}

/// A capability: a live entry in this process's capability table naming a
/// remote or local object, plus enough context to invoke methods on it.
/// Dropping a `Handle` releases its capability-table slot, exactly as
/// `CapTable::put` reaching zero retires the table entry (spec §3).
pub struct Handle {
    client: HandleClient,
    target: ObjectRef,
    slot: i64,
}

impl Handle {
    pub fn object_ref(&self) -> ObjectRef {
        self.target.clone()
    }

    /// Invokes a method by index with already-marshalled arguments,
    /// dispatching locally when the target lives in this process and over
    /// the broker's control channel otherwise (spec §4.2 "Invocation").
    pub fn call(&self, method_index: u32, args: Vec<Any>) -> Result<Any, Code> {
        if self.target.owner_pid == self.client.pid {
            let obj = self.client.broker.objects.resolve(self.target.object_id)?;
            obj.invoke(method_index, args)
        } else {
            let reply = call_remote(
                &self.client.runtime_dir,
                self.target.clone(),
                method_index,
                args,
            )
            .map_err(|_| Code::NotConnected)?;
            match reply {
                abi::broker::Command::RpcRes { status: None, ret } => Ok(ret),
                abi::broker::Command::RpcRes { status: Some(code), .. } => Err(code),
                _ => Err(Code::BadMessage),
            }
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.client.broker.captable.put(self.slot);
    }
}

impl Clone for Handle {
    /// Cloning a handle acquires a second capability-table slot for the
    /// same target, matching `add_ref`'s semantics rather than `Arc`'s
    /// (spec §4.2: every live reference is its own table entry).
    fn clone(&self) -> Self {
        let slot = self.client.broker.captable.add(self.target.clone());
        Handle {
            client: self.client.clone(),
            target: self.target.clone(),
            slot,
        }
    }
}

/// Convenience for tests and host tooling that want a `Client` without
/// wiring up a real runtime directory.
pub fn socket_path_for(runtime_dir: &std::path::Path, pid: u32) -> PathBuf {
    socket_path(runtime_dir, pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_of_an_unbound_path_fails() {
        let client = Client::new(1, PathBuf::from("/tmp/es-test"), 8);
        assert_eq!(client.lookup("network/config").err(), Some(Code::NotFound));
    }

    #[test]
    fn bound_path_resolves_to_a_handle_in_this_process() {
        let client = Client::new(1, PathBuf::from("/tmp/es-test"), 8);
        let target = ObjectRef::new(client.pid(), 42, "Widget");
        client.root().bind_path("network/config", target.clone()).unwrap();
        let handle = client.lookup("network/config").unwrap();
        assert_eq!(handle.object_ref(), target);
    }

    #[test]
    fn dropping_a_handle_frees_its_capability_slot() {
        let client = Client::new(1, PathBuf::from("/tmp/es-test"), 1);
        let target = ObjectRef::new(client.pid(), 7, "Widget");
        client.root().bind_path("network/config", target.clone()).unwrap();
        {
            let _handle = client.lookup("network/config").unwrap();
            // The single-slot table is full while the handle is alive.
            assert!(client.adopt(target.clone()).is_err());
        }
        assert!(client.adopt(target).is_ok());
    }

    #[test]
    fn cloning_a_handle_takes_a_second_slot() {
        let client = Client::new(1, PathBuf::from("/tmp/es-test"), 2);
        let target = ObjectRef::new(client.pid(), 7, "Widget");
        client.root().bind_path("network/config", target.clone()).unwrap();
        let handle = client.lookup("network/config").unwrap();
        let _clone = handle.clone();
        assert!(client.adopt(target).is_err());
    }
}
