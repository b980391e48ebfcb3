//! The `Any` taxonomy (spec §6): a tagged value used by the broker and by
//! reflective dispatch to marshal method arguments and return values across
//! the process boundary.

use serde::{Deserialize, Serialize};

use crate::idl::ObjectRef;

/// A tagged value. Variants mirror the IDL base types plus `Object`, which
/// carries a capability (a remote object reference, marshalled as a handle
/// by the receiving broker).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Any {
    Void,
    Bool(bool),
    Octet(u8),
    Short(i16),
    UnsignedShort(u16),
    Long(i32),
    UnsignedLong(u32),
    LongLong(i64),
    UnsignedLongLong(u64),
    Float(f32),
    Double(f64),
    String(String),
    Object(ObjectRef),
}

bitflags::bitflags! {
    /// A `FlagAny` bit marks variant-typed values that must be preserved
    /// across marshalling rather than automatically coerced to the
    /// signature's declared type.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
    pub struct AnyFlags: u8 {
        const VARIANT = 1 << 0;
    }
}

/// An `Any` value paired with the `FlagAny` marking from spec §6.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlaggedAny {
    pub value: Any,
    pub flags: AnyFlags,
}

impl Any {
    /// The IDL parameter kind this value was tagged with.
    pub fn kind(&self) -> ParamKind {
        match self {
            Any::Void => ParamKind::Void,
            Any::Bool(_) => ParamKind::Bool,
            Any::Octet(_) => ParamKind::Octet,
            Any::Short(_) => ParamKind::Short,
            Any::UnsignedShort(_) => ParamKind::UnsignedShort,
            Any::Long(_) => ParamKind::Long,
            Any::UnsignedLong(_) => ParamKind::UnsignedLong,
            Any::LongLong(_) => ParamKind::LongLong,
            Any::UnsignedLongLong(_) => ParamKind::UnsignedLongLong,
            Any::Float(_) => ParamKind::Float,
            Any::Double(_) => ParamKind::Double,
            Any::String(_) => ParamKind::String,
            Any::Object(_) => ParamKind::Object,
        }
    }
}

/// The declared type of a method parameter or return value, per the
/// interface descriptor (Component A). Used by the broker to validate an
/// incoming `Any` against the signature before lifting it to a concrete type.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ParamKind {
    Void,
    Bool,
    Octet,
    Short,
    UnsignedShort,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
    String,
    Object,
}
