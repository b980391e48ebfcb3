//! The object runtime (Components A and B) and the concurrency kernel
//! (Component C).
//!
//! `kern` has no networking code; `net` builds the TCP/IP stack on top of
//! `conduit`, which in turn depends only on `abi`. The dependency direction
//! mirrors spec §2: "lower components do not know the higher ones".

pub mod broker;
pub mod captable;
pub mod err;
pub mod ifstore;
pub mod monitor;
pub mod naming;
pub mod object;
pub mod thread;
pub mod timer;

pub use err::{KernelError, Result};
