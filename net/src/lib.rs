//! The TCP/IP conduit stack (spec §4.5 "TCP/IP stack on conduits"): NIC
//! adapter through ARP, IPv4, ICMP, UDP, and TCP, wired as a graph of
//! [`conduit::Conduit<Messenger>`] nodes. Supplemented with DHCP and DNS
//! client glue and the `InternetConfig` ambient configuration surface
//! (spec §4.5.4).

pub mod arp;
pub mod config;
pub mod dhcp;
pub mod dns;
pub mod icmp;
pub mod ipv4;
pub mod message;
pub mod ring;
pub mod tcp;
pub mod udp;

pub use config::InternetConfig;
pub use message::{Direction, Messenger, MessengerVisitor};
