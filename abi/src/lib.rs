//! Shared wire types and data model for the object runtime, concurrency
//! kernel, conduit framework, and TCP/IP stack.
//!
//! This crate carries no logic beyond encode/decode and small invariant
//! checks; it is the vocabulary the other workspace crates share across
//! process and module boundaries.

pub mod any;
pub mod broker;
pub mod error;
pub mod idl;
pub mod wire;

pub use any::{Any, AnyFlags, FlaggedAny, ParamKind};
pub use broker::Command;
pub use error::{Code, Result};
pub use idl::{InterfaceDescriptor, MethodSignature, ObjectRef, OBJECT_INTERFACE};
