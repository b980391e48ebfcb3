//! ICMP echo responders (spec §4.5.3): "installed as adapters under an
//! echo-request mux keyed by destination address, giving each address-in-
//! Preferred its own responder."

use abi::wire::IcmpHeader;
use abi::Code;
use conduit::{Accessor, Receiver};
use zerocopy::{AsBytes, FromBytes};

use crate::message::{Direction, Messenger};

/// Keys an inbound echo request by its destination address, so each local
/// address gets its own echo-responder adapter once it reaches `Preferred`
/// (spec §4.5.1).
pub struct DestAddrAccessor;

impl Accessor<Messenger> for DestAddrAccessor {
    fn key(&self, msg: &Messenger) -> u64 {
        u32::from_be_bytes(msg.local_addr.octets()) as u64
    }
}

/// Answers ICMP echo requests addressed to one specific local address.
pub struct EchoResponder {
    pub address: [u8; 4],
}

impl Receiver<Messenger> for EchoResponder {
    fn receive(&self, msg: &mut Messenger) -> bool {
        match msg.direction {
            Direction::Input => {
                let chunk = msg.chunk();
                let Some(hdr) = IcmpHeader::read_from_prefix(chunk) else {
                    return msg.set_error(Code::BadMessage);
                };
                if hdr.icmp_type != IcmpHeader::TYPE_ECHO_REQUEST {
                    return true;
                }
                let payload = chunk[IcmpHeader::SIZE..].to_vec();
                let mut reply = IcmpHeader::echo_reply_from(&hdr);
                reply.fix_checksum(&payload);

                let dst = msg.remote_addr;
                msg.remote_addr = msg.local_addr;
                msg.local_addr = dst;
                msg.direction = Direction::Output;
                msg.replace_payload(payload);
                let mut out = Vec::with_capacity(IcmpHeader::SIZE + msg.chunk().len());
                out.extend_from_slice(reply.as_bytes());
                out.extend_from_slice(msg.chunk());
                msg.replace_payload(out);
                true
            }
            Direction::Output => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_request_produces_a_reply_with_swapped_addresses() {
        let responder = EchoResponder {
            address: [10, 0, 0, 1],
        };
        let mut req = IcmpHeader::echo_request(42, 1);
        req.fix_checksum(b"payload");
        let mut bytes = req.as_bytes().to_vec();
        bytes.extend_from_slice(b"payload");

        let mut msg = Messenger::input(bytes, 1);
        msg.local_addr = [10, 0, 0, 1].into();
        msg.remote_addr = [10, 0, 0, 2].into();
        assert!(responder.receive(&mut msg));

        let reply = IcmpHeader::read_from_prefix(msg.chunk()).unwrap();
        assert_eq!(reply.icmp_type, IcmpHeader::TYPE_ECHO_REPLY);
        assert_eq!(reply.ident(), 42);
        assert_eq!(msg.local_addr, std::net::Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(msg.remote_addr, std::net::Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn non_echo_types_pass_through_untouched() {
        let responder = EchoResponder {
            address: [10, 0, 0, 1],
        };
        let hdr = IcmpHeader::dest_unreachable(IcmpHeader::CODE_PORT_UNREACHABLE);
        let mut msg = Messenger::input(hdr.as_bytes().to_vec(), 1);
        assert!(responder.receive(&mut msg));
        assert_eq!(msg.direction, Direction::Input);
    }
}
