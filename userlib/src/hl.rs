//! High-level user interface: a thin layer over [`crate::Handle::call`] that
//! takes care of the paperwork a caller would otherwise repeat at every call
//! site, in the spirit of the teacher's `hl::recv` wrapping raw `sys_recv`.

use crate::{Any, Code, Handle};

/// Calls a method expected to return nothing useful, discarding a
/// `Void` reply and treating any other reply shape as `BadMessage`.
pub fn call_void(handle: &Handle, method_index: u32, args: Vec<Any>) -> Result<(), Code> {
    match handle.call(method_index, args)? {
        Any::Void => Ok(()),
        _ => Err(Code::BadMessage),
    }
}

/// Calls a method and requires the reply to be a `Long`, the common case
/// for status/count-returning operations.
pub fn call_long(handle: &Handle, method_index: u32, args: Vec<Any>) -> Result<i32, Code> {
    match handle.call(method_index, args)? {
        Any::Long(v) => Ok(v),
        _ => Err(Code::BadMessage),
    }
}

/// Calls a method and requires the reply to be a `String`.
pub fn call_string(handle: &Handle, method_index: u32, args: Vec<Any>) -> Result<String, Code> {
    match handle.call(method_index, args)? {
        Any::String(v) => Ok(v),
        _ => Err(Code::BadMessage),
    }
}

/// Retries a call a bounded number of times while it fails with
/// `WouldBlock`, matching how a client should treat a network stack object
/// that reports backpressure rather than block the caller's thread.
pub fn call_with_retry(
    handle: &Handle,
    method_index: u32,
    args: impl Fn() -> Vec<Any>,
    max_attempts: u32,
) -> Result<Any, Code> {
    let mut last = Code::WouldBlock;
    for _ in 0..max_attempts {
        match handle.call(method_index, args()) {
            Ok(v) => return Ok(v),
            Err(Code::WouldBlock) => last = Code::WouldBlock,
            Err(e) => return Err(e),
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Client, ObjectRef};
    use std::path::PathBuf;

    #[test]
    fn call_void_fails_against_an_unpublished_local_object() {
        let client = Client::new(1, PathBuf::from("/tmp/es-test"), 4);
        // The target is local (owner_pid == client.pid()) but was never
        // published to the object table, so dispatch must fail with
        // NotFound rather than silently succeeding.
        let target = ObjectRef::new(client.pid(), 1, "Widget");
        client.root().bind_path("network/config", target).unwrap();
        let handle = client.lookup("network/config").unwrap();
        assert_eq!(call_void(&handle, 0, vec![]), Err(Code::NotFound));
    }
}
