//! `Messenger`: the mutable packet descriptor carried along a conduit walk
//! (spec §3 "Messenger"), and the concrete `Visitor` that drives `accept`
//! across the network stack's conduit graph — the piece
//! `conduit` itself deliberately stays ignorant of.

use std::net::Ipv4Addr;

use abi::Code;
use conduit::{Conduit, Side, Visitor};
use std::sync::Arc;

/// Direction a messenger is travelling: input messengers arrive from an
/// adapter and are consumed by protocols on the way up; output messengers
/// originate at a protocol/socket and are consumed by an adapter on the way
/// down.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Input,
    Output,
}

/// A mutable packet descriptor: payload buffer with head/tail positions,
/// source/destination address and port, scope (interface) id, IP protocol
/// number, and an error code set by a refusing receiver.
#[derive(Clone, Debug)]
pub struct Messenger {
    pub direction: Direction,
    buf: Vec<u8>,
    /// Offset of the first byte of the current chunk (grows as headers are
    /// stripped on input, shrinks as they are prepended on output).
    pub head: usize,
    pub tail: usize,
    pub scope_id: u32,
    pub protocol: u8,
    pub local_addr: Ipv4Addr,
    pub local_port: u16,
    pub remote_addr: Ipv4Addr,
    pub remote_port: u16,
    pub error: Option<Code>,
}

impl Messenger {
    pub fn input(buf: Vec<u8>, scope_id: u32) -> Self {
        let tail = buf.len();
        Messenger {
            direction: Direction::Input,
            buf,
            head: 0,
            tail,
            scope_id,
            protocol: 0,
            local_addr: Ipv4Addr::UNSPECIFIED,
            local_port: 0,
            remote_addr: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
            error: None,
        }
    }

    pub fn output(capacity: usize, scope_id: u32) -> Self {
        Messenger {
            direction: Direction::Output,
            buf: vec![0; capacity],
            head: capacity,
            tail: capacity,
            scope_id,
            protocol: 0,
            local_addr: Ipv4Addr::UNSPECIFIED,
            local_port: 0,
            remote_addr: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
            error: None,
        }
    }

    /// The current chunk: `[head, tail)`.
    pub fn chunk(&self) -> &[u8] {
        &self.buf[self.head..self.tail]
    }

    pub fn chunk_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.head..self.tail]
    }

    pub fn chunk_len(&self) -> usize {
        self.tail - self.head
    }

    /// Consumes `n` bytes from the front of the chunk (stripping a header on
    /// input).
    pub fn pop_front(&mut self, n: usize) {
        self.head += n;
    }

    /// Reserves `n` bytes at the front of the chunk for a header that will
    /// be written in place (prepending on output), returning that slice.
    pub fn push_front(&mut self, n: usize) -> &mut [u8] {
        self.head -= n;
        &mut self.buf[self.head..self.head + n]
    }

    pub fn set_error(&mut self, code: Code) -> bool {
        self.error = Some(code);
        false
    }

    /// Replaces the chunk with freshly assembled bytes (used once
    /// fragmentation reassembly produces a contiguous payload that may not
    /// live at the same offsets as any single fragment).
    pub fn replace_payload(&mut self, data: Vec<u8>) {
        self.tail = data.len();
        self.head = 0;
        self.buf = data;
    }
}

/// The concrete `Visitor` implementation that drives a `Messenger` through
/// the conduit graph; `at` is a no-op hook point (spec's visitor contract
/// allows a subclass to intercept/stop a walk, but the base network stack
/// never needs to).
pub struct MessengerVisitor {
    pub msg: Messenger,
}

impl MessengerVisitor {
    pub fn new(msg: Messenger) -> Self {
        MessengerVisitor { msg }
    }

    pub fn walk(mut self, start: &Arc<Conduit<Messenger>>, exit_side: Side) -> Messenger {
        start.accept(&mut self, exit_side);
        self.msg
    }
}

impl Visitor<Messenger> for MessengerVisitor {
    fn at(&mut self, _node: &Arc<Conduit<Messenger>>) -> bool {
        true
    }

    fn messenger(&mut self) -> &mut Messenger {
        &mut self.msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_front_move_the_chunk_window() {
        let mut m = Messenger::output(64, 1);
        m.push_front(4).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(m.chunk_len(), 4);
        assert_eq!(m.chunk(), &[1, 2, 3, 4]);

        let mut input = Messenger::input(vec![9, 9, 1, 2, 3, 4], 1);
        input.pop_front(2);
        assert_eq!(input.chunk(), &[1, 2, 3, 4]);
    }
}
