//! Error codes shared across the object runtime, the broker wire protocol,
//! and the network stack.

use serde::{Deserialize, Serialize};

/// Error kinds used at the core boundary (spec §7).
///
/// Inside a process these travel as the `Err` side of a `Result`. Across
/// processes, only the code crosses the wire (broker replies carry a `Code`,
/// never a backtrace or a thrown exception).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Code {
    NotFound,
    AlreadyExists,
    InvalidArg,
    PermissionDenied,
    OutOfMemory,
    WouldBlock,
    TimedOut,
    InProgress,
    NotConnected,
    ConnectionReset,
    ConnectionRefused,
    HostUnreachable,
    NetUnreachable,
    NetDown,
    AddrInUse,
    BadMessage,
    UnsupportedOperation,
    Deadlock,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::InvalidArg => "INVALID_ARG",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::OutOfMemory => "OUT_OF_MEMORY",
            Code::WouldBlock => "WOULD_BLOCK",
            Code::TimedOut => "TIMED_OUT",
            Code::InProgress => "IN_PROGRESS",
            Code::NotConnected => "NOT_CONNECTED",
            Code::ConnectionReset => "CONNECTION_RESET",
            Code::ConnectionRefused => "CONNECTION_REFUSED",
            Code::HostUnreachable => "HOST_UNREACHABLE",
            Code::NetUnreachable => "NET_UNREACHABLE",
            Code::NetDown => "NET_DOWN",
            Code::AddrInUse => "ADDR_IN_USE",
            Code::BadMessage => "BAD_MESSAGE",
            Code::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            Code::Deadlock => "DEADLOCK",
        }
    }
}

impl core::fmt::Display for Code {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for Code {}

pub type Result<T> = core::result::Result<T, Code>;
