//! The IP protocol node (spec §4.5): header encode/decode, checksum, TTL
//! handling, and fragment reassembly, sitting between the scope mux (keyed
//! by interface id) and the per-protocol mux (keyed by IP protocol number).

use std::collections::HashMap;
use std::sync::Mutex;

use abi::wire::Ipv4Header;
use abi::Code;
use conduit::Receiver;
use zerocopy::{AsBytes, FromBytes};

use crate::message::{Direction, Messenger};

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
struct FragKey {
    src: [u8; 4],
    dst: [u8; 4],
    id: u16,
}

struct Reassembly {
    total_len: Option<usize>,
    have: Vec<(usize, Vec<u8>)>,
}

/// Reassembles fragmented datagrams (RFC 791 §3.2) before the unfragmented
/// payload is handed to the protocol mux.
#[derive(Default)]
pub struct FragmentTable {
    pending: Mutex<HashMap<FragKey, Reassembly>>,
}

impl FragmentTable {
    pub fn new() -> Self {
        FragmentTable::default()
    }

    /// Feeds one fragment in; returns the reassembled payload once every
    /// fragment up to the one carrying `MF=0` has arrived.
    fn accept(&self, hdr: &Ipv4Header, payload: &[u8]) -> Option<Vec<u8>> {
        if !hdr.more_fragments() && hdr.fragment_offset() == 0 {
            return Some(payload.to_vec());
        }
        let key = FragKey {
            src: hdr.src,
            dst: hdr.dst,
            id: u16::from_be_bytes(hdr.id),
        };
        let mut pending = self.pending.lock().unwrap();
        let entry = pending.entry(key).or_insert_with(|| Reassembly {
            total_len: None,
            have: Vec::new(),
        });
        let offset = hdr.fragment_offset() as usize * 8;
        entry.have.push((offset, payload.to_vec()));
        if !hdr.more_fragments() {
            entry.total_len = Some(offset + payload.len());
        }
        let Some(total_len) = entry.total_len else {
            return None;
        };
        let mut have_bytes = 0usize;
        for (_, frag) in &entry.have {
            have_bytes += frag.len();
        }
        if have_bytes < total_len {
            return None;
        }
        let mut assembled = vec![0u8; total_len];
        let mut fragments = entry.have.clone();
        fragments.sort_by_key(|(off, _)| *off);
        for (off, frag) in &fragments {
            assembled[*off..*off + frag.len()].copy_from_slice(frag);
        }
        pending.remove(&key);
        Some(assembled)
    }
}

/// The conduit `Receiver` for the IPv4 protocol node. On input, validates
/// and strips the header and reassembles fragments; on output, prepends a
/// freshly-built header with a fixed-up checksum.
pub struct Ipv4Protocol {
    pub local_addr: [u8; 4],
    pub ttl: u8,
    fragments: FragmentTable,
}

impl Ipv4Protocol {
    pub fn new(local_addr: [u8; 4]) -> Self {
        Ipv4Protocol {
            local_addr,
            ttl: 64,
            fragments: FragmentTable::new(),
        }
    }
}

impl Receiver<Messenger> for Ipv4Protocol {
    fn receive(&self, msg: &mut Messenger) -> bool {
        match msg.direction {
            Direction::Input => {
                let chunk = msg.chunk();
                let Some(hdr) = Ipv4Header::read_from_prefix(chunk) else {
                    return msg.set_error(Code::BadMessage);
                };
                if hdr.version() != 4 || !hdr.checksum_is_valid() {
                    return msg.set_error(Code::BadMessage);
                }
                let ihl = hdr.ihl();
                let total_len = hdr.total_len() as usize;
                if chunk.len() < total_len || ihl > chunk.len() {
                    return msg.set_error(Code::BadMessage);
                }
                let payload = &chunk[ihl..total_len];
                let Some(full) = self.fragments.accept(&hdr, payload) else {
                    // Fragment stored, nothing more to deliver yet.
                    return true;
                };
                msg.protocol = hdr.protocol;
                msg.remote_addr = hdr.src.into();
                msg.local_addr = hdr.dst.into();
                msg.replace_payload(full);
                true
            }
            Direction::Output => {
                let payload_len = msg.chunk_len() as u16;
                let hdr = Ipv4Header::new(
                    self.local_addr,
                    msg.remote_addr.octets(),
                    msg.protocol,
                    payload_len,
                    self.ttl,
                );
                msg.push_front(Ipv4Header::SIZE)
                    .copy_from_slice(hdr.as_bytes());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_prepends_a_checksummed_header() {
        let ip = Ipv4Protocol::new([10, 0, 0, 1]);
        let mut m = Messenger::output(64, 1);
        m.push_front(4).copy_from_slice(b"data");
        m.remote_addr = [10, 0, 0, 2].into();
        m.protocol = Ipv4Header::PROTO_UDP;
        assert!(ip.receive(&mut m));
        let hdr = Ipv4Header::read_from_prefix(m.chunk()).unwrap();
        assert!(hdr.checksum_is_valid());
        assert_eq!(hdr.src, [10, 0, 0, 1]);
        assert_eq!(hdr.dst, [10, 0, 0, 2]);
    }

    #[test]
    fn input_rejects_a_corrupted_checksum() {
        let ip = Ipv4Protocol::new([10, 0, 0, 1]);
        let mut hdr = Ipv4Header::new([1, 2, 3, 4], [5, 6, 7, 8], Ipv4Header::PROTO_UDP, 4, 32);
        hdr.checksum = [0xff, 0xff];
        let mut bytes = hdr.as_bytes().to_vec();
        bytes.extend_from_slice(b"data");
        let mut m = Messenger::input(bytes, 1);
        assert!(!ip.receive(&mut m));
        assert_eq!(m.error, Some(Code::BadMessage));
    }

    #[test]
    fn single_unfragmented_datagram_passes_straight_through() {
        let ip = Ipv4Protocol::new([10, 0, 0, 1]);
        let hdr = Ipv4Header::new([1, 2, 3, 4], [5, 6, 7, 8], Ipv4Header::PROTO_UDP, 4, 32);
        let mut bytes = hdr.as_bytes().to_vec();
        bytes.extend_from_slice(b"data");
        let mut m = Messenger::input(bytes, 1);
        assert!(ip.receive(&mut m));
        assert_eq!(m.protocol, Ipv4Header::PROTO_UDP);
    }
}
