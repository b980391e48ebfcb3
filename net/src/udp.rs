//! UDP: a thin protocol over the IP mux with per-port demultiplexing (spec
//! §4.5.3 "UDP is a thin protocol over the IP mux with per-port mux").

use std::collections::HashMap;
use std::sync::Mutex;

use abi::wire::UdpHeader;
use abi::Code;
use conduit::{Accessor, Receiver};
use zerocopy::{AsBytes, FromBytes};

use crate::message::{Direction, Messenger};

/// Strips/prepends the UDP header and fixes up the checksum; sibling of
/// `Ipv4Protocol` one level up the stack.
pub struct UdpProtocol;

impl Receiver<Messenger> for UdpProtocol {
    fn receive(&self, msg: &mut Messenger) -> bool {
        match msg.direction {
            Direction::Input => {
                let chunk = msg.chunk();
                let Some(hdr) = UdpHeader::read_from_prefix(chunk) else {
                    return msg.set_error(Code::BadMessage);
                };
                let len = hdr.length() as usize;
                if len < UdpHeader::SIZE || chunk.len() < len {
                    return msg.set_error(Code::BadMessage);
                }
                msg.remote_port = hdr.src_port();
                msg.local_port = hdr.dst_port();
                msg.pop_front(UdpHeader::SIZE);
                true
            }
            Direction::Output => {
                let hdr = UdpHeader::new(msg.local_port, msg.remote_port, msg.chunk_len() as u16);
                let mut hdr = hdr;
                let src = msg.local_addr.octets();
                let dst = msg.remote_addr.octets();
                hdr.fix_checksum(src, dst, msg.chunk());
                msg.push_front(UdpHeader::SIZE).copy_from_slice(hdr.as_bytes());
                true
            }
        }
    }
}

/// Extracts the destination port from an inbound messenger, the key a UDP
/// port mux routes by.
pub struct PortAccessor;

impl Accessor<Messenger> for PortAccessor {
    fn key(&self, msg: &Messenger) -> u64 {
        match msg.direction {
            Direction::Input => msg.local_port as u64,
            Direction::Output => msg.remote_port as u64,
        }
    }
}

/// A registry mapping local UDP ports to the socket adapter that owns them,
/// used by a `Factory` to materialise a `Mux` branch lazily on first bind.
#[derive(Default)]
pub struct PortTable {
    bound: Mutex<HashMap<u16, ()>>,
}

impl PortTable {
    pub fn new() -> Self {
        PortTable::default()
    }

    pub fn bind(&self, port: u16) -> bool {
        self.bound.lock().unwrap().insert(port, ()).is_none()
    }

    pub fn release(&self, port: u16) {
        self.bound.lock().unwrap().remove(&port);
    }

    pub fn is_bound(&self, port: u16) -> bool {
        self.bound.lock().unwrap().contains_key(&port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_datagram_through_output_then_input() {
        let udp = UdpProtocol;
        let mut out = Messenger::output(64, 1);
        out.push_front(4).copy_from_slice(b"ping");
        out.local_port = 9000;
        out.remote_port = 53;
        out.local_addr = [10, 0, 0, 1].into();
        out.remote_addr = [10, 0, 0, 2].into();
        assert!(udp.receive(&mut out));

        let mut input = Messenger::input(out.chunk().to_vec(), 1);
        assert!(udp.receive(&mut input));
        assert_eq!(input.remote_port, 9000);
        assert_eq!(input.local_port, 53);
        assert_eq!(input.chunk(), b"ping");
    }

    #[test]
    fn port_table_rejects_a_duplicate_bind() {
        let table = PortTable::new();
        assert!(table.bind(9000));
        assert!(!table.bind(9000));
        table.release(9000);
        assert!(table.bind(9000));
    }
}
