//! A minimal DNS resolver glue layer (RFC 1035), grounded in
//! `original_source/include/es/net/dns.h`'s `DNSHdr`/`DNSType`/`DNSRR`
//! layout. Dropped by the distilled spec; implemented as a supplement since
//! a hostname resolver is the natural client of the UDP conduit stack.

use std::collections::HashMap;

pub const PORT: u16 = 53;
const LABEL_MAX: usize = 63;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum RecordType {
    A = 1,
    Ns = 2,
    Cname = 5,
    Ptr = 12,
    Mx = 15,
    Aaaa = 28,
}

const CLASS_IN: u16 = 1;

/// Encodes a question section for `name` and returns `(packet, id)`.
pub fn build_query(id: u16, name: &str, qtype: RecordType) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&0x0100u16.to_be_bytes()); // RD
    out.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    out.extend_from_slice(&0u16.to_be_bytes()); // ancount
    out.extend_from_slice(&0u16.to_be_bytes()); // nscount
    out.extend_from_slice(&0u16.to_be_bytes()); // arcount
    encode_name(&mut out, name);
    out.extend_from_slice(&(qtype as u16).to_be_bytes());
    out.extend_from_slice(&CLASS_IN.to_be_bytes());
    out
}

/// Encodes `name` as a sequence of length-prefixed labels terminated by a
/// zero-length root label (no compression, as `build_query` never needs it).
fn encode_name(out: &mut Vec<u8>, name: &str) {
    for label in name.split('.') {
        if label.is_empty() {
            continue;
        }
        let bytes = label.as_bytes();
        let len = bytes.len().min(LABEL_MAX);
        out.push(len as u8);
        out.extend_from_slice(&bytes[..len]);
    }
    out.push(0);
}

#[derive(Clone, Debug)]
pub struct Answer {
    pub name: String,
    pub record_type: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct Response {
    pub id: u16,
    pub is_response: bool,
    pub rcode: u8,
    pub answers: Vec<Answer>,
}

/// Parses a DNS response, following compression pointers per RFC 1035 §4.1.4.
pub fn parse_response(buf: &[u8]) -> Option<Response> {
    if buf.len() < 12 {
        return None;
    }
    let id = u16::from_be_bytes([buf[0], buf[1]]);
    let flags = u16::from_be_bytes([buf[2], buf[3]]);
    let qdcount = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    let ancount = u16::from_be_bytes([buf[6], buf[7]]) as usize;

    let mut pos = 12;
    for _ in 0..qdcount {
        let (_, next) = decode_name(buf, pos)?;
        pos = next + 4; // qtype + qclass
    }

    let mut answers = Vec::with_capacity(ancount);
    for _ in 0..ancount {
        let (name, next) = decode_name(buf, pos)?;
        pos = next;
        if pos + 10 > buf.len() {
            return None;
        }
        let record_type = u16::from_be_bytes([buf[pos], buf[pos + 1]]);
        let ttl = u32::from_be_bytes([buf[pos + 4], buf[pos + 5], buf[pos + 6], buf[pos + 7]]);
        let rdlength = u16::from_be_bytes([buf[pos + 8], buf[pos + 9]]) as usize;
        pos += 10;
        if pos + rdlength > buf.len() {
            return None;
        }
        let rdata = buf[pos..pos + rdlength].to_vec();
        pos += rdlength;
        answers.push(Answer {
            name,
            record_type,
            ttl,
            rdata,
        });
    }

    Some(Response {
        id,
        is_response: flags & 0x8000 != 0,
        rcode: (flags & 0x000f) as u8,
        answers,
    })
}

/// Decodes a (possibly compressed) domain name starting at `offset`,
/// returning the dotted name and the offset just past it in the original
/// message (not following into a pointer's target).
fn decode_name(buf: &[u8], offset: usize) -> Option<(String, usize)> {
    let mut labels = Vec::new();
    let mut pos = offset;
    let mut end = None;
    let mut jumps = 0;
    loop {
        if pos >= buf.len() {
            return None;
        }
        let len = buf[pos];
        if len == 0 {
            pos += 1;
            break;
        }
        if len & 0xc0 == 0xc0 {
            if pos + 1 >= buf.len() {
                return None;
            }
            if end.is_none() {
                end = Some(pos + 2);
            }
            let pointer = (((len & 0x3f) as usize) << 8) | buf[pos + 1] as usize;
            jumps += 1;
            if jumps > 16 || pointer >= buf.len() {
                return None;
            }
            pos = pointer;
            continue;
        }
        let len = len as usize;
        if pos + 1 + len > buf.len() {
            return None;
        }
        labels.push(String::from_utf8_lossy(&buf[pos + 1..pos + 1 + len]).into_owned());
        pos += 1 + len;
    }
    let name = labels.join(".");
    Some((name, end.unwrap_or(pos)))
}

/// Only `A` records contribute an address; `from_be_bytes` on other RR
/// types would misinterpret their rdata.
pub fn addresses(response: &Response) -> Vec<[u8; 4]> {
    response
        .answers
        .iter()
        .filter(|a| a.record_type == RecordType::A as u16 && a.rdata.len() == 4)
        .map(|a| <[u8; 4]>::try_from(a.rdata.as_slice()).unwrap())
        .collect()
}

/// A tiny resolver: tracks in-flight queries by id and a resolved-name
/// cache keyed by hostname, matching the shape of `InternetConfig`'s other
/// lookup tables.
pub struct Resolver {
    next_id: u16,
    pending: HashMap<u16, String>,
    cache: HashMap<String, Vec<[u8; 4]>>,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            next_id: 1,
            pending: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    pub fn query(&mut self, name: &str) -> Vec<u8> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.pending.insert(id, name.to_string());
        build_query(id, name, RecordType::A)
    }

    /// Feeds a reply datagram in; returns the resolved addresses if this
    /// completes an outstanding query.
    pub fn receive(&mut self, payload: &[u8]) -> Option<Vec<[u8; 4]>> {
        let response = parse_response(payload)?;
        if !response.is_response {
            return None;
        }
        let name = self.pending.remove(&response.id)?;
        let addrs = addresses(&response);
        self.cache.insert(name, addrs.clone());
        Some(addrs)
    }

    pub fn cached(&self, name: &str) -> Option<&[[u8; 4]]> {
        self.cache.get(name).map(|v| v.as_slice())
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_a_response(id: u16, name: &str, addr: [u8; 4]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&0x8180u16.to_be_bytes()); // response, RD+RA
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        encode_name(&mut out, name);
        out.extend_from_slice(&(RecordType::A as u16).to_be_bytes());
        out.extend_from_slice(&CLASS_IN.to_be_bytes());
        // answer, using a compression pointer back to the question's name
        out.extend_from_slice(&0xc00cu16.to_be_bytes());
        out.extend_from_slice(&(RecordType::A as u16).to_be_bytes());
        out.extend_from_slice(&CLASS_IN.to_be_bytes());
        out.extend_from_slice(&300u32.to_be_bytes());
        out.extend_from_slice(&4u16.to_be_bytes());
        out.extend_from_slice(&addr);
        out
    }

    #[test]
    fn query_encodes_labels_with_length_prefixes() {
        let q = build_query(7, "example.com", RecordType::A);
        assert_eq!(q[12], 7); // "example" length
        assert_eq!(&q[13..20], b"example");
        assert_eq!(q[20], 3); // "com" length
    }

    #[test]
    fn response_with_compression_pointer_resolves_to_an_address() {
        let payload = build_a_response(7, "example.com", [93, 184, 216, 34]);
        let response = parse_response(&payload).unwrap();
        assert!(response.is_response);
        assert_eq!(response.answers.len(), 1);
        assert_eq!(addresses(&response), vec![[93, 184, 216, 34]]);
    }

    #[test]
    fn resolver_matches_reply_to_its_outstanding_query_by_id() {
        let mut resolver = Resolver::new();
        let query = resolver.query("example.com");
        let id = u16::from_be_bytes([query[0], query[1]]);
        let reply = build_a_response(id, "example.com", [10, 0, 0, 1]);
        let addrs = resolver.receive(&reply).unwrap();
        assert_eq!(addrs, vec![[10, 0, 0, 1]]);
        assert_eq!(resolver.cached("example.com"), Some(&[[10, 0, 0, 1]][..]));
    }

    #[test]
    fn unmatched_id_does_not_resolve() {
        let mut resolver = Resolver::new();
        resolver.query("example.com");
        let reply = build_a_response(9999, "example.com", [10, 0, 0, 1]);
        assert!(resolver.receive(&reply).is_none());
    }
}
