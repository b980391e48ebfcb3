//! ARP (RFC 826) plus ARP Probe/Announcement (RFC 3927), grounded in
//! `original_source/os/net/src/arp.cpp`'s `ARPHdr`.

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, FromZeroes, AsBytes, Unaligned)]
#[repr(C)]
pub struct ArpHeader {
    pub hrd: [u8; 2],
    pub pro: [u8; 2],
    pub hln: u8,
    pub pln: u8,
    pub op: [u8; 2],
    pub sha: [u8; 6],
    pub spa: [u8; 4],
    pub tha: [u8; 6],
    pub tpa: [u8; 4],
}

impl ArpHeader {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub const HRD_ETHERNET: u16 = 1;
    pub const PRO_IP: u16 = 0x0800;

    pub const OP_REQUEST: u16 = 1;
    pub const OP_REPLY: u16 = 2;

    // RFC 3927 ARP timing parameters (seconds).
    pub const PROBE_WAIT: u64 = 1;
    pub const PROBE_MIN: u64 = 1;
    pub const PROBE_MAX: u64 = 2;
    pub const PROBE_NUM: u32 = 3;
    pub const ANNOUNCE_WAIT: u64 = 2;
    pub const ANNOUNCE_NUM: u32 = 2;
    pub const ANNOUNCE_INTERVAL: u64 = 2;

    pub fn request(sha: [u8; 6], spa: [u8; 4], tpa: [u8; 4]) -> Self {
        ArpHeader {
            hrd: Self::HRD_ETHERNET.to_be_bytes(),
            pro: Self::PRO_IP.to_be_bytes(),
            hln: 6,
            pln: 4,
            op: Self::OP_REQUEST.to_be_bytes(),
            sha,
            spa,
            tha: [0; 6],
            tpa,
        }
    }

    pub fn reply(sha: [u8; 6], spa: [u8; 4], tha: [u8; 6], tpa: [u8; 4]) -> Self {
        ArpHeader {
            hrd: Self::HRD_ETHERNET.to_be_bytes(),
            pro: Self::PRO_IP.to_be_bytes(),
            hln: 6,
            pln: 4,
            op: Self::OP_REPLY.to_be_bytes(),
            sha,
            spa,
            tha,
            tpa,
        }
    }

    pub fn hrd(&self) -> u16 {
        u16::from_be_bytes(self.hrd)
    }

    pub fn pro(&self) -> u16 {
        u16::from_be_bytes(self.pro)
    }

    pub fn op(&self) -> u16 {
        u16::from_be_bytes(self.op)
    }

    /// Validates header shape per `ARPReceiver::input` in the original
    /// source: Ethernet hardware type, IP protocol type, 6-byte MAC, 4-byte
    /// IPv4 address.
    pub fn is_valid_ethernet_ipv4(&self) -> bool {
        self.hrd() == Self::HRD_ETHERNET
            && self.pro() == Self::PRO_IP
            && self.hln == 6
            && self.pln == 4
    }
}
