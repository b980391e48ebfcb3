//! TCP (spec §4.5.2): initial-sequence-number generation (RFC 1948), the
//! per-protocol connection table, and the conduit glue tying `Endpoint`
//! into the packet-processing graph. The state machine itself lives in
//! [`endpoint`]; the loss-recovery scoreboard in [`scoreboard`]; the timer
//! math in [`timer`].

pub mod endpoint;
pub mod scoreboard;
pub mod timer;

use std::collections::HashMap;
use std::sync::Mutex;

use abi::wire::TcpHeader;
use abi::Code;
use conduit::{Accessor, Receiver};
use zerocopy::{AsBytes, FromBytes};

use crate::message::{Direction, Messenger};
use endpoint::{Endpoint, TcpState};

/// Derives an initial sequence number per RFC 1948: MD5 of (local addr,
/// local port, remote addr, remote port, a per-host secret) folded to 32
/// bits, plus a clock-derived counter so successive connections to the same
/// peer never reuse a sequence space.
pub fn initial_sequence_number(
    local_addr: [u8; 4],
    local_port: u16,
    remote_addr: [u8; 4],
    remote_port: u16,
    secret: &[u8],
    clock_ticks: u32,
) -> u32 {
    let mut input = Vec::with_capacity(4 + 2 + 4 + 2 + secret.len());
    input.extend_from_slice(&local_addr);
    input.extend_from_slice(&local_port.to_be_bytes());
    input.extend_from_slice(&remote_addr);
    input.extend_from_slice(&remote_port.to_be_bytes());
    input.extend_from_slice(secret);
    let hash = md5(&input);
    let folded = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
    folded.wrapping_add(clock_ticks)
}

/// A minimal MD5 (RFC 1321) sufficient for ISN generation; the stack has no
/// other need for a general-purpose hash, so a local implementation avoids
/// pulling in a whole crate for four words of output.
fn md5(data: &[u8]) -> [u8; 16] {
    const S: [u32; 64] = [
        7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 5, 9, 14, 20, 5, 9, 14, 20, 5,
        9, 14, 20, 5, 9, 14, 20, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 6,
        10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
    ];
    const K: [u32; 64] = [
        0xd76aa478, 0xe8c7b756, 0x242070db, 0xc1bdceee, 0xf57c0faf, 0x4787c62a, 0xa8304613,
        0xfd469501, 0x698098d8, 0x8b44f7af, 0xffff5bb1, 0x895cd7be, 0x6b901122, 0xfd987193,
        0xa679438e, 0x49b40821, 0xf61e2562, 0xc040b340, 0x265e5a51, 0xe9b6c7aa, 0xd62f105d,
        0x02441453, 0xd8a1e681, 0xe7d3fbc8, 0x21e1cde6, 0xc33707d6, 0xf4d50d87, 0x455a14ed,
        0xa9e3e905, 0xfcefa3f8, 0x676f02d9, 0x8d2a4c8a, 0xfffa3942, 0x8771f681, 0x6d9d6122,
        0xfde5380c, 0xa4beea44, 0x4bdecfa9, 0xf6bb4b60, 0xbebfbc70, 0x289b7ec6, 0xeaa127fa,
        0xd4ef3085, 0x04881d05, 0xd9d4d039, 0xe6db99e5, 0x1fa27cf8, 0xc4ac5665, 0xf4292244,
        0x432aff97, 0xab9423a7, 0xfc93a039, 0x655b59c3, 0x8f0ccc92, 0xffeff47d, 0x85845dd1,
        0x6fa87e4f, 0xfe2ce6e0, 0xa3014314, 0x4e0811a1, 0xf7537e82, 0xbd3af235, 0x2ad7d2bb,
        0xeb86d391,
    ];

    let mut msg = data.to_vec();
    let bit_len = (data.len() as u64).wrapping_mul(8);
    msg.push(0x80);
    while msg.len() % 64 != 56 {
        msg.push(0);
    }
    msg.extend_from_slice(&bit_len.to_le_bytes());

    let (mut a0, mut b0, mut c0, mut d0) = (0x67452301u32, 0xefcdab89u32, 0x98badcfeu32, 0x10325476u32);

    for chunk in msg.chunks_exact(64) {
        let mut m = [0u32; 16];
        for (i, word) in chunk.chunks_exact(4).enumerate() {
            m[i] = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        }
        let (mut a, mut b, mut c, mut d) = (a0, b0, c0, d0);
        for i in 0..64 {
            let (f, g) = match i {
                0..=15 => ((b & c) | (!b & d), i),
                16..=31 => ((d & b) | (!d & c), (5 * i + 1) % 16),
                32..=47 => (b ^ c ^ d, (3 * i + 5) % 16),
                _ => (c ^ (b | !d), (7 * i) % 16),
            };
            let f = f
                .wrapping_add(a)
                .wrapping_add(K[i])
                .wrapping_add(m[g]);
            a = d;
            d = c;
            c = b;
            b = b.wrapping_add(f.rotate_left(S[i]));
        }
        a0 = a0.wrapping_add(a);
        b0 = b0.wrapping_add(b);
        c0 = c0.wrapping_add(c);
        d0 = d0.wrapping_add(d);
    }

    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&a0.to_le_bytes());
    out[4..8].copy_from_slice(&b0.to_le_bytes());
    out[8..12].copy_from_slice(&c0.to_le_bytes());
    out[12..16].copy_from_slice(&d0.to_le_bytes());
    out
}

/// Keys a TCP mux by local port, the same way the UDP port mux does (spec
/// §4.5 "protocol mux (by IP protocol number) → per-protocol subgraph").
pub struct TcpPortAccessor;

impl Accessor<Messenger> for TcpPortAccessor {
    fn key(&self, msg: &Messenger) -> u64 {
        match msg.direction {
            Direction::Input => msg.local_port as u64,
            Direction::Output => msg.remote_port as u64,
        }
    }
}

#[derive(Hash, Eq, PartialEq, Copy, Clone)]
struct FourTuple {
    local_port: u16,
    remote_addr: [u8; 4],
    remote_port: u16,
}

/// Owns every `Endpoint` for one local port: the listener (if any) plus
/// every established connection, keyed by the remote half of the tuple.
pub struct TcpStack {
    secret: Vec<u8>,
    listeners: Mutex<HashMap<u16, Endpoint>>,
    connections: Mutex<HashMap<FourTuple, Endpoint>>,
}

impl TcpStack {
    pub fn new(secret: Vec<u8>) -> Self {
        TcpStack {
            secret,
            listeners: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn listen(&self, port: u16, backlog: usize, mss: u32) {
        let mut e = Endpoint::new_closed(mss);
        e.listen(port, backlog);
        self.listeners.lock().unwrap().insert(port, e);
    }

    pub fn connect(
        &self,
        local_addr: [u8; 4],
        local_port: u16,
        remote_addr: [u8; 4],
        remote_port: u16,
        mss: u32,
        clock_ticks: u32,
    ) -> u32 {
        let iss = initial_sequence_number(
            local_addr,
            local_port,
            remote_addr,
            remote_port,
            &self.secret,
            clock_ticks,
        );
        let mut e = Endpoint::new_closed(mss);
        e.connect(local_port, remote_port, iss);
        self.connections.lock().unwrap().insert(
            FourTuple {
                local_port,
                remote_addr,
                remote_port,
            },
            e,
        );
        iss
    }

    pub fn state_of(&self, local_port: u16, remote_addr: [u8; 4], remote_port: u16) -> Option<TcpState> {
        self.connections
            .lock()
            .unwrap()
            .get(&FourTuple {
                local_port,
                remote_addr,
                remote_port,
            })
            .map(|e| e.state)
    }
}

impl Receiver<Messenger> for TcpStack {
    fn receive(&self, msg: &mut Messenger) -> bool {
        match msg.direction {
            Direction::Input => {
                let chunk = msg.chunk();
                let Some(hdr) = TcpHeader::read_from_prefix(chunk) else {
                    return msg.set_error(Code::BadMessage);
                };
                let data_off = hdr.data_offset();
                if data_off < TcpHeader::SIZE || chunk.len() < data_off {
                    return msg.set_error(Code::BadMessage);
                }
                let (_opts, sack) = abi::wire::tcp::parse_options(&chunk[TcpHeader::SIZE..data_off]);
                let tuple = FourTuple {
                    local_port: hdr.dst_port(),
                    remote_addr: msg.remote_addr.octets(),
                    remote_port: hdr.src_port(),
                };
                let mut connections = self.connections.lock().unwrap();
                if let Some(endpoint) = connections.get_mut(&tuple) {
                    if hdr.has_flag(TcpHeader::FLAG_ACK) {
                        let blocks: Vec<(u32, u32)> = sack
                            .map(|s| s.edges.into_iter().map(|e| (e.left, e.right)).collect())
                            .unwrap_or_default();
                        endpoint.on_ack(hdr.ack(), &blocks);
                    }
                    if hdr.has_flag(TcpHeader::FLAG_FIN) {
                        endpoint.on_fin();
                    }
                    msg.pop_front(data_off);
                    true
                } else if let Some(listener) = self.listeners.lock().unwrap().get_mut(&hdr.dst_port()) {
                    if hdr.has_flag(TcpHeader::FLAG_SYN) && !hdr.has_flag(TcpHeader::FLAG_ACK) {
                        let iss = initial_sequence_number(
                            msg.local_addr.octets(),
                            hdr.dst_port(),
                            msg.remote_addr.octets(),
                            hdr.src_port(),
                            &self.secret,
                            0,
                        );
                        let _ = listener.on_syn_to_listener(hdr.src_port(), hdr.seq(), iss);
                    }
                    true
                } else {
                    msg.set_error(Code::ConnectionRefused)
                }
            }
            Direction::Output => {
                let mut hdr = TcpHeader::new(
                    msg.local_port,
                    msg.remote_port,
                    0,
                    0,
                    TcpHeader::FLAG_ACK,
                    u16::MAX,
                );
                let src = msg.local_addr.octets();
                let dst = msg.remote_addr.octets();
                hdr.fix_checksum(src, dst, msg.chunk());
                msg.push_front(TcpHeader::SIZE).copy_from_slice(hdr.as_bytes());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isn_generation_is_reproducible_for_the_same_inputs() {
        let a = initial_sequence_number([10, 0, 0, 1], 9000, [10, 0, 0, 2], 80, b"secret", 1000);
        let b = initial_sequence_number([10, 0, 0, 1], 9000, [10, 0, 0, 2], 80, b"secret", 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn isn_generation_differs_across_peers() {
        let a = initial_sequence_number([10, 0, 0, 1], 9000, [10, 0, 0, 2], 80, b"secret", 0);
        let b = initial_sequence_number([10, 0, 0, 1], 9000, [10, 0, 0, 3], 80, b"secret", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn isn_advances_with_the_clock_component() {
        let a = initial_sequence_number([1, 2, 3, 4], 1, [5, 6, 7, 8], 2, b"x", 100);
        let b = initial_sequence_number([1, 2, 3, 4], 1, [5, 6, 7, 8], 2, b"x", 200);
        assert_eq!(b.wrapping_sub(a), 100);
    }

    #[test]
    fn connect_registers_a_connection_in_syn_sent() {
        let stack = TcpStack::new(b"secret".to_vec());
        stack.connect([10, 0, 0, 1], 9000, [10, 0, 0, 2], 80, 1460, 0);
        assert_eq!(
            stack.state_of(9000, [10, 0, 0, 2], 80),
            Some(TcpState::SynSent)
        );
    }
}
