//! A DHCPv4 client state machine (DISCOVER/OFFER/REQUEST/ACK), present in
//! `original_source/neeraj/trunk/include/es/net/dhcp.h` but dropped by the
//! distilled specification; implemented as a natural peer of the
//! `InternetConfig` surface (spec §4.5.4), which needs somewhere to learn
//! addresses, routers, and name servers from besides static configuration.

use abi::wire::dhcp::{self, opt, DhcpHeader, MessageType};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClientState {
    Init,
    Selecting,
    Requesting,
    Bound,
    Renewing,
    Rebinding,
}

#[derive(Clone, Debug, Default)]
pub struct Lease {
    pub address: [u8; 4],
    pub subnet_mask: Option<[u8; 4]>,
    pub routers: Vec<[u8; 4]>,
    pub name_servers: Vec<[u8; 4]>,
    pub lease_time: Option<u32>,
    pub renewal_time: Option<u32>,
    pub rebinding_time: Option<u32>,
    pub server_id: Option<[u8; 4]>,
}

/// One client's negotiation state, keyed by a transaction id chosen at
/// `discover()` time.
pub struct DhcpClient {
    pub state: ClientState,
    pub xid: u32,
    pub chaddr: [u8; 6],
    pub lease: Option<Lease>,
}

impl DhcpClient {
    pub fn new(chaddr: [u8; 6]) -> Self {
        DhcpClient {
            state: ClientState::Init,
            xid: 0,
            chaddr,
            lease: None,
        }
    }

    /// Builds a DHCPDISCOVER datagram and moves to `Selecting`.
    pub fn discover(&mut self, xid: u32) -> Vec<u8> {
        self.xid = xid;
        self.state = ClientState::Selecting;
        self.build(MessageType::Discover, None, &[])
    }

    /// Handles an inbound DHCPOFFER; builds the matching DHCPREQUEST.
    pub fn offer(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        if self.state != ClientState::Selecting {
            return None;
        }
        let (hdr, options) = parse(payload)?;
        if hdr.xid() != self.xid {
            return None;
        }
        let msg_type = lookup_message_type(&options)?;
        if msg_type != MessageType::Offer {
            return None;
        }
        let server_id = lookup_addr(&options, opt::SERVER_ID);
        self.state = ClientState::Requesting;
        Some(self.build(MessageType::Request, server_id, &hdr.yiaddr))
    }

    /// Handles an inbound DHCPACK/DHCPNAK; populates the lease on ACK.
    pub fn ack(&mut self, payload: &[u8]) -> bool {
        if self.state != ClientState::Requesting
            && self.state != ClientState::Renewing
            && self.state != ClientState::Rebinding
        {
            return false;
        }
        let Some((hdr, options)) = parse(payload) else {
            return false;
        };
        if hdr.xid() != self.xid {
            return false;
        }
        match lookup_message_type(&options) {
            Some(MessageType::Ack) => {
                self.lease = Some(Lease {
                    address: hdr.yiaddr,
                    subnet_mask: lookup_addr(&options, opt::SUBNET_MASK),
                    routers: lookup_addrs(&options, opt::ROUTER),
                    name_servers: lookup_addrs(&options, opt::DOMAIN_NAME_SERVER),
                    lease_time: lookup_u32(&options, opt::LEASE_TIME),
                    renewal_time: lookup_u32(&options, opt::RENEWAL_TIME),
                    rebinding_time: lookup_u32(&options, opt::REBINDING_TIME),
                    server_id: lookup_addr(&options, opt::SERVER_ID),
                });
                self.state = ClientState::Bound;
                true
            }
            Some(MessageType::Nak) => {
                self.state = ClientState::Init;
                self.lease = None;
                false
            }
            _ => false,
        }
    }

    /// Builds a renewal request (unicast to the lease's server, per RFC
    /// 2131 §4.4.5 T1 handling).
    pub fn renew(&mut self, xid: u32) -> Option<Vec<u8>> {
        let lease = self.lease.clone()?;
        self.xid = xid;
        self.state = ClientState::Renewing;
        Some(self.build_with_ciaddr(MessageType::Request, lease.server_id, &[], lease.address))
    }

    fn build(&self, msg_type: MessageType, server_id: Option<[u8; 4]>, requested: &[u8]) -> Vec<u8> {
        self.build_with_ciaddr(msg_type, server_id, requested, [0; 4])
    }

    fn build_with_ciaddr(
        &self,
        msg_type: MessageType,
        server_id: Option<[u8; 4]>,
        requested_addr: &[u8],
        ciaddr: [u8; 4],
    ) -> Vec<u8> {
        use zerocopy::AsBytes;
        let mut hdr = DhcpHeader::request(self.xid, self.chaddr);
        hdr.ciaddr = ciaddr;
        let mut out = hdr.as_bytes().to_vec();
        out.extend_from_slice(&dhcp::MAGIC_COOKIE);
        dhcp::encode_option(&mut out, opt::MESSAGE_TYPE, &[msg_type as u8]);
        if requested_addr.len() == 4 {
            dhcp::encode_option(&mut out, opt::REQUESTED_ADDRESS, requested_addr);
        }
        if let Some(sid) = server_id {
            dhcp::encode_option(&mut out, opt::SERVER_ID, &sid);
        }
        dhcp::encode_option(
            &mut out,
            opt::PARAMETER_REQUEST_LIST,
            &[opt::SUBNET_MASK, opt::ROUTER, opt::DOMAIN_NAME_SERVER],
        );
        out.push(opt::END);
        out
    }
}

fn parse(payload: &[u8]) -> Option<(DhcpHeader, Vec<(u8, &[u8])>)> {
    use zerocopy::FromBytes;
    let hdr = DhcpHeader::read_from_prefix(payload)?;
    let rest = &payload[DhcpHeader::SIZE..];
    if rest.len() < 4 || rest[..4] != dhcp::MAGIC_COOKIE {
        return None;
    }
    Some((hdr, dhcp::parse_options(&rest[4..])))
}

fn lookup_message_type(options: &[(u8, &[u8])]) -> Option<MessageType> {
    options
        .iter()
        .find(|(c, _)| *c == opt::MESSAGE_TYPE)
        .and_then(|(_, v)| v.first().copied())
        .and_then(MessageType::from_u8)
}

fn lookup_addr(options: &[(u8, &[u8])], code: u8) -> Option<[u8; 4]> {
    options
        .iter()
        .find(|(c, _)| *c == code)
        .and_then(|(_, v)| <[u8; 4]>::try_from(*v).ok())
}

fn lookup_addrs(options: &[(u8, &[u8])], code: u8) -> Vec<[u8; 4]> {
    options
        .iter()
        .filter(|(c, _)| *c == code)
        .flat_map(|(_, v)| v.chunks_exact(4))
        .filter_map(|c| <[u8; 4]>::try_from(c).ok())
        .collect()
}

fn lookup_u32(options: &[(u8, &[u8])], code: u8) -> Option<u32> {
    options
        .iter()
        .find(|(c, _)| *c == code)
        .and_then(|(_, v)| <[u8; 4]>::try_from(*v).ok())
        .map(u32::from_be_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_offer_or_ack(xid: u32, msg_type: MessageType, yiaddr: [u8; 4]) -> Vec<u8> {
        use zerocopy::AsBytes;
        let mut hdr = DhcpHeader::request(xid, [1, 2, 3, 4, 5, 6]);
        hdr.op = DhcpHeader::OP_BOOTREPLY;
        hdr.yiaddr = yiaddr;
        let mut out = hdr.as_bytes().to_vec();
        out.extend_from_slice(&dhcp::MAGIC_COOKIE);
        dhcp::encode_option(&mut out, opt::MESSAGE_TYPE, &[msg_type as u8]);
        dhcp::encode_option(&mut out, opt::SERVER_ID, &[10, 0, 0, 1]);
        dhcp::encode_option(&mut out, opt::SUBNET_MASK, &[255, 255, 255, 0]);
        dhcp::encode_option(&mut out, opt::ROUTER, &[10, 0, 0, 1]);
        dhcp::encode_option(&mut out, opt::LEASE_TIME, &3600u32.to_be_bytes());
        out.push(opt::END);
        out
    }

    #[test]
    fn discover_offer_request_ack_sequence_binds_a_lease() {
        let mut client = DhcpClient::new([1, 2, 3, 4, 5, 6]);
        let _discover = client.discover(42);
        assert_eq!(client.state, ClientState::Selecting);

        let offer = build_offer_or_ack(42, MessageType::Offer, [10, 0, 0, 5]);
        let request = client.offer(&offer).unwrap();
        assert_eq!(client.state, ClientState::Requesting);
        assert!(!request.is_empty());

        let ack = build_offer_or_ack(42, MessageType::Ack, [10, 0, 0, 5]);
        assert!(client.ack(&ack));
        assert_eq!(client.state, ClientState::Bound);
        let lease = client.lease.as_ref().unwrap();
        assert_eq!(lease.address, [10, 0, 0, 5]);
        assert_eq!(lease.subnet_mask, Some([255, 255, 255, 0]));
        assert_eq!(lease.lease_time, Some(3600));
    }

    #[test]
    fn nak_returns_the_client_to_init() {
        let mut client = DhcpClient::new([1, 2, 3, 4, 5, 6]);
        client.discover(7);
        let offer = build_offer_or_ack(7, MessageType::Offer, [10, 0, 0, 9]);
        client.offer(&offer);
        let nak = build_offer_or_ack(7, MessageType::Nak, [0, 0, 0, 0]);
        assert!(!client.ack(&nak));
        assert_eq!(client.state, ClientState::Init);
    }

    #[test]
    fn mismatched_transaction_id_is_ignored() {
        let mut client = DhcpClient::new([1, 2, 3, 4, 5, 6]);
        client.discover(1);
        let offer = build_offer_or_ack(999, MessageType::Offer, [10, 0, 0, 9]);
        assert!(client.offer(&offer).is_none());
        assert_eq!(client.state, ClientState::Selecting);
    }
}
