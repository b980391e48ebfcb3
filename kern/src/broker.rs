//! The per-process broker (Component B's cross-process half, spec §4.2 and
//! §6), grounded in `original_source/include/es/broker.h`'s
//! `Broker<broker_fn, maxInterface>` dispatch pattern: a control channel
//! that turns an incoming `(method_index, argument vector)` into a call on
//! a locally owned object, and a client stub that turns an `ObjectRef`
//! living in another process plus a method call into a wire request.
//!
//! The control channel is a Unix-domain socket rather than Hubris's
//! syscall-mediated IPC, since this runtime is hosted rather than running
//! under its own microkernel scheduler; the broker is this crate's
//! equivalent of what `sys/kipc` does for the teacher.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;

use abi::broker::Command;
use abi::{Any, Code};

use crate::captable::CapTable;
use crate::ifstore::InterfaceStore;
use crate::object::ObjectTable;

ringbuf::ringbuf!(BrokerEvent, 64, BrokerEvent::Idle);

#[derive(Copy, Clone, Debug, PartialEq)]
enum BrokerEvent {
    Idle,
    Accepted,
    RpcDispatched { method_index: u32 },
    RpcFailed { code: Code },
    ForkStub,
}

/// Resolves the control-channel endpoint name from spec §6
/// (`es-socket-<pid>`) to a filesystem path. True Linux abstract-namespace
/// sockets (a leading NUL byte in the address) are a platform-specific
/// extension outside what `std::os::unix::net` exposes portably, so the
/// endpoint lives under a runtime directory instead — see DESIGN.md for
/// this Open Question's resolution.
pub fn socket_path(runtime_dir: &std::path::Path, pid: u32) -> PathBuf {
    runtime_dir.join(format!("es-socket-{pid}"))
}

/// A process-local broker: owns this process's object table and capability
/// table, and serves RPCs arriving on its control-channel listener.
pub struct Broker {
    pub objects: Arc<ObjectTable>,
    pub captable: Arc<CapTable>,
    pub ifstore: Arc<InterfaceStore>,
}

impl Broker {
    pub fn new(captable_capacity: usize) -> Self {
        Broker {
            objects: Arc::new(ObjectTable::new()),
            captable: Arc::new(CapTable::new(captable_capacity)),
            ifstore: Arc::new(InterfaceStore::new()),
        }
    }

    /// Binds the control-channel listener at `es-socket-<pid>` and serves
    /// connections until the listener is dropped or accept fails.
    pub fn listen(&self, runtime_dir: &std::path::Path, pid: u32) -> std::io::Result<()> {
        let path = socket_path(runtime_dir, pid);
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        for stream in listener.incoming() {
            let stream = stream?;
            ringbuf::ringbuf_entry!(BrokerEvent::Accepted);
            self.serve_connection(stream)?;
        }
        Ok(())
    }

    fn serve_connection(&self, mut stream: UnixStream) -> std::io::Result<()> {
        loop {
            let cmd = match read_command(&mut stream) {
                Ok(Some(cmd)) => cmd,
                Ok(None) => return Ok(()),
                Err(e) => return Err(e),
            };
            let reply = self.handle_command(cmd);
            if let Some(reply) = reply {
                write_command(&mut stream, &reply)?;
            }
        }
    }

    fn handle_command(&self, cmd: Command) -> Option<Command> {
        match cmd {
            Command::ChanReq { pid, carried } => {
                let handle = self.captable.add(carried);
                Some(Command::ChanRes {
                    pid,
                    accepted: handle >= 0,
                })
            }
            Command::ForkReq { pid } => {
                // Process forking within one object universe is explicitly
                // out of scope for a hosted reimplementation (spec's
                // general-purpose-OS-kernel non-goal); modeled on the wire
                // for compatibility but always refused.
                ringbuf::ringbuf_entry!(BrokerEvent::ForkStub);
                Some(Command::ForkRes {
                    pid,
                    child_pid: None,
                })
            }
            Command::RpcReq {
                target,
                method_index,
                args,
            } => Some(self.dispatch_rpc(target, method_index, args)),
            // Replies are only ever sent by us, never received.
            Command::ChanRes { .. } | Command::ForkRes { .. } | Command::RpcRes { .. } => None,
        }
    }

    fn dispatch_rpc(
        &self,
        target: abi::idl::ObjectRef,
        method_index: u32,
        args: Vec<Any>,
    ) -> Command {
        let obj = match self.objects.resolve(target.object_id) {
            Ok(obj) => obj,
            Err(code) => {
                ringbuf::ringbuf_entry!(BrokerEvent::RpcFailed { code });
                return Command::RpcRes {
                    status: Some(code),
                    ret: Any::Void,
                };
            }
        };
        // The interface store supplies the expected signature; a real
        // dispatch would use it to lift each `Any` into the method's
        // concrete argument types before calling through a generated stub.
        // That codegen step is out of scope here (it is the IDL compiler's
        // job, explicitly a non-goal); this broker validates arity against
        // the registered descriptor when one is known, then hands the
        // already-marshalled arguments straight to the object.
        if let Ok(descriptor) = self.ifstore.lookup(&target.interface) {
            if let Some(sig) = descriptor.methods.get(method_index as usize) {
                if sig.params.len() != args.len() {
                    ringbuf::ringbuf_entry!(BrokerEvent::RpcFailed {
                        code: Code::InvalidArg
                    });
                    return Command::RpcRes {
                        status: Some(Code::InvalidArg),
                        ret: Any::Void,
                    };
                }
            }
        }
        ringbuf::ringbuf_entry!(BrokerEvent::RpcDispatched { method_index });
        match obj.invoke(method_index, args) {
            Ok(ret) => Command::RpcRes { status: None, ret },
            Err(code) => {
                ringbuf::ringbuf_entry!(BrokerEvent::RpcFailed { code });
                Command::RpcRes {
                    status: Some(code),
                    ret: Any::Void,
                }
            }
        }
    }
}

/// Sends one RPC request to a remote broker and awaits its reply. Used by
/// client-side stubs (`userlib`) when an `ObjectRef`'s `owner_pid` is not
/// this process.
pub fn call_remote(
    runtime_dir: &std::path::Path,
    target: abi::idl::ObjectRef,
    method_index: u32,
    args: Vec<Any>,
) -> std::io::Result<Command> {
    let path = socket_path(runtime_dir, target.owner_pid);
    let mut stream = UnixStream::connect(path)?;
    let req = Command::RpcReq {
        target,
        method_index,
        args,
    };
    write_command(&mut stream, &req)?;
    read_command(&mut stream)?.ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "broker closed connection")
    })
}

/// Frame format: a 4-byte big-endian length prefix followed by an
/// `ssmarshal`-encoded `Command`, matching the teacher's preference for
/// fixed-shape wire structs over a self-describing format.
fn write_command(stream: &mut UnixStream, cmd: &Command) -> std::io::Result<()> {
    let mut buf = [0u8; 4096];
    let len = ssmarshal::serialize(&mut buf, cmd)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "command too large"))?;
    stream.write_all(&(len as u32).to_be_bytes())?;
    stream.write_all(&buf[..len])?;
    Ok(())
}

fn read_command(stream: &mut UnixStream) -> std::io::Result<Option<Command>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    let (cmd, _) = ssmarshal::deserialize(&buf)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed command"))?;
    Ok(Some(cmd))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_embeds_pid() {
        let p = socket_path(std::path::Path::new("/tmp/es"), 42);
        assert_eq!(p, std::path::PathBuf::from("/tmp/es/es-socket-42"));
    }

    #[test]
    fn rpc_against_unknown_object_returns_not_found() {
        let broker = Broker::new(8);
        let reply = broker.dispatch_rpc(abi::idl::ObjectRef::new(1, 99, "Widget"), 0, vec![]);
        match reply {
            Command::RpcRes { status, .. } => assert_eq!(status, Some(Code::NotFound)),
            _ => panic!("wrong variant"),
        }
    }

    struct Echo;

    impl crate::object::Object for Echo {
        fn interface_name(&self) -> &str {
            "Echo"
        }

        fn query_interface(&self, _iid: &str) -> Option<std::sync::Arc<dyn crate::object::Object>> {
            None
        }

        fn invoke(&self, method_index: u32, args: Vec<Any>) -> Result<Any, Code> {
            match (method_index, args.as_slice()) {
                (0, [Any::Long(v)]) => Ok(Any::Long(*v)),
                _ => Err(Code::UnsupportedOperation),
            }
        }
    }

    #[test]
    fn rpc_dispatches_to_the_resolved_objects_invoke() {
        let broker = Broker::new(8);
        let id = broker.objects.publish(std::sync::Arc::new(Echo));
        let reply = broker.dispatch_rpc(
            abi::idl::ObjectRef::new(1, id, "Echo"),
            0,
            vec![Any::Long(7)],
        );
        match reply {
            Command::RpcRes { status: None, ret } => assert_eq!(ret, Any::Long(7)),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn rpc_with_wrong_arity_against_a_registered_interface_is_rejected() {
        let broker = Broker::new(8);
        broker
            .ifstore
            .register(
                abi::idl::InterfaceDescriptor::new("Echo")
                    .with_base(abi::idl::OBJECT_INTERFACE)
                    .with_method(abi::idl::MethodSignature {
                        name: "echo".into(),
                        params: vec![abi::any::ParamKind::Long],
                        returns: abi::any::ParamKind::Long,
                    }),
            )
            .unwrap();
        let id = broker.objects.publish(std::sync::Arc::new(Echo));
        let reply = broker.dispatch_rpc(abi::idl::ObjectRef::new(1, id, "Echo"), 0, vec![]);
        match reply {
            Command::RpcRes { status, .. } => assert_eq!(status, Some(Code::InvalidArg)),
            _ => panic!("wrong variant"),
        }
    }
}
