//! The local broker's control-channel protocol (spec §6).
//!
//! A process listens on a Unix-domain socket named `es-socket-<pid>`.
//! `Command` is the fixed-shape struct tagged by command enum that travels
//! over that socket; `kern::broker` is what actually drives a socket with
//! these values.

use serde::{Deserialize, Serialize};

use crate::any::Any;
use crate::error::Code;
use crate::idl::ObjectRef;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Command {
    /// A process asks another to open a dedicated channel; carries one
    /// right (an object reference whose handle the callee should import).
    ChanReq { pid: u32, carried: ObjectRef },
    ChanRes { pid: u32, accepted: bool },

    /// Create a new process image in the same object universe. Modeled for
    /// wire compatibility; the handler is a documented stub (see DESIGN.md).
    ForkReq { pid: u32 },
    ForkRes { pid: u32, child_pid: Option<u32> },

    /// A method call. `args` is the marshalled argument vector; handle-typed
    /// arguments are represented as `Any::Object` and the receiving broker
    /// installs them as new handles in its own capability table.
    RpcReq {
        target: ObjectRef,
        method_index: u32,
        args: Vec<Any>,
    },
    RpcRes {
        status: Option<Code>,
        ret: Any,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_req_carries_argument_vector() {
        let cmd = Command::RpcReq {
            target: ObjectRef::new(1, 42, "Widget"),
            method_index: 3,
            args: vec![Any::Long(-1), Any::String("x".into())],
        };
        match cmd {
            Command::RpcReq { args, .. } => assert_eq!(args.len(), 2),
            _ => panic!("wrong variant"),
        }
    }
}
