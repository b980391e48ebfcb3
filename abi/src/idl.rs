//! Interface-descriptor (IDL) data model shared between the interface store
//! (Component A) and the broker (Component B).
//!
//! This is data only: no registry logic lives here (see `kern::ifstore`).

use serde::{Deserialize, Serialize};

use crate::any::ParamKind;

/// The fully-qualified name every interface transitively inherits from
/// (Data Model invariant in spec §3).
pub const OBJECT_INTERFACE: &str = "ObjectInterface";

/// One method's signature: ordered parameter kinds and a return kind.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<ParamKind>,
    pub returns: ParamKind,
}

/// A named type with an ordered method list, an ordered base-interface list,
/// and an optional constructor reference (spec §3 "Interface descriptor").
///
/// Interface descriptors are immutable once registered.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub name: String,
    pub methods: Vec<MethodSignature>,
    pub bases: Vec<String>,
    pub constructor: Option<String>,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        InterfaceDescriptor {
            name: name.into(),
            methods: Vec::new(),
            bases: Vec::new(),
            constructor: None,
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.bases.push(base.into());
        self
    }

    pub fn with_method(mut self, sig: MethodSignature) -> Self {
        self.methods.push(sig);
        self
    }

    /// The universal object interface every other interface must reach
    /// transitively (spec §3 invariant).
    pub fn universal_object() -> Self {
        InterfaceDescriptor::new(OBJECT_INTERFACE)
            .with_method(MethodSignature {
                name: "query_interface".into(),
                params: vec![ParamKind::String],
                returns: ParamKind::Object,
            })
            .with_method(MethodSignature {
                name: "add_ref".into(),
                params: vec![],
                returns: ParamKind::UnsignedLong,
            })
            .with_method(MethodSignature {
                name: "release".into(),
                params: vec![],
                returns: ParamKind::UnsignedLong,
            })
    }
}

/// The triple identifying an object reference (spec §3 "Object reference"):
/// owning process, object id within that process, and the interface it was
/// acquired through. The interface name is carried as an owned `String`
/// rather than a registry handle since a reference can cross into a process
/// that has never registered the interface's descriptor (it only needs the
/// name to call `query_interface`/look the name up locally on demand).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub owner_pid: u32,
    pub object_id: u64,
    pub interface: String,
}

impl ObjectRef {
    pub fn new(owner_pid: u32, object_id: u64, interface: impl Into<String>) -> Self {
        ObjectRef {
            owner_pid,
            object_id,
            interface: interface.into(),
        }
    }
}
