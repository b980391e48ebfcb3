//! UDP (RFC 768).

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, FromZeroes, AsBytes, Unaligned)]
#[repr(C)]
pub struct UdpHeader {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
    pub length: [u8; 2],
    pub checksum: [u8; 2],
}

impl UdpHeader {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn new(src_port: u16, dst_port: u16, payload_len: u16) -> Self {
        UdpHeader {
            src_port: src_port.to_be_bytes(),
            dst_port: dst_port.to_be_bytes(),
            length: (Self::SIZE as u16 + payload_len).to_be_bytes(),
            checksum: [0, 0],
        }
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes(self.src_port)
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes(self.dst_port)
    }

    pub fn length(&self) -> u16 {
        u16::from_be_bytes(self.length)
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes(self.checksum)
    }

    /// Fixes the checksum over an IPv4 pseudo-header, this header, and the
    /// payload. UDP checksum is optional over IPv4 (a zero result is sent as
    /// all-ones per RFC 768) but the conduit stack always computes it.
    pub fn fix_checksum(&mut self, src: [u8; 4], dst: [u8; 4], payload: &[u8]) {
        self.checksum = [0, 0];
        let mut buf = Vec::with_capacity(12 + Self::SIZE + payload.len());
        buf.extend_from_slice(&src);
        buf.extend_from_slice(&dst);
        buf.push(0);
        buf.push(crate::wire::ipv4::Ipv4Header::PROTO_UDP);
        buf.extend_from_slice(&self.length);
        buf.extend_from_slice(self.as_bytes());
        buf.extend_from_slice(payload);
        let sum = crate::wire::internet_checksum(&buf);
        self.checksum = if sum == 0 { 0xffff } else { sum }.to_be_bytes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_covers_header_and_payload() {
        let hdr = UdpHeader::new(68, 67, 300);
        assert_eq!(hdr.length(), UdpHeader::SIZE as u16 + 300);
    }

    #[test]
    fn checksum_never_encodes_as_zero() {
        let mut hdr = UdpHeader::new(1, 1, 0);
        hdr.fix_checksum([0, 0, 0, 0], [0, 0, 0, 0], &[]);
        assert_ne!(hdr.checksum(), 0);
    }
}
