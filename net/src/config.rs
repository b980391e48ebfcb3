//! The `InternetConfig` surface (spec §4.5.4): add/remove interfaces,
//! addresses, routers, name servers, and search domains. Each address is
//! backed by an [`crate::arp::Inet4Address`] whose state machine is driven
//! by ARP exactly as in spec §4.5.1; `InternetConfig` itself only owns the
//! tables, not the ARP logic.

use std::collections::HashMap;
use std::sync::Arc;

use crate::arp::Inet4Address;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Interface {
    pub name: String,
    pub mac: [u8; 6],
}

/// The ambient network configuration: interfaces, the addresses bound to
/// each, routers, name servers, and DNS search domains. Populated
/// programmatically; there is no on-disk config format.
#[derive(Default)]
pub struct InternetConfig {
    interfaces: HashMap<String, Interface>,
    addresses: HashMap<String, Vec<Arc<Inet4Address>>>,
    routers: Vec<[u8; 4]>,
    name_servers: Vec<[u8; 4]>,
    search_domains: Vec<String>,
}

impl InternetConfig {
    pub fn new() -> Self {
        InternetConfig::default()
    }

    pub fn add_interface(&mut self, name: &str, mac: [u8; 6]) {
        self.interfaces.insert(
            name.to_string(),
            Interface {
                name: name.to_string(),
                mac,
            },
        );
        self.addresses.entry(name.to_string()).or_default();
    }

    pub fn remove_interface(&mut self, name: &str) -> bool {
        self.addresses.remove(name);
        self.interfaces.remove(name).is_some()
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    /// Adds a local address on `interface`, starting its ARP state machine
    /// in the Tentative state per spec §4.5.1.
    pub fn add_address(&mut self, interface: &str, addr: [u8; 4]) -> Result<Arc<Inet4Address>, ()> {
        self.interfaces.get(interface).ok_or(())?;
        let address = Inet4Address::new_local(addr);
        self.addresses
            .entry(interface.to_string())
            .or_default()
            .push(address.clone());
        Ok(address)
    }

    pub fn remove_address(&mut self, interface: &str, addr: [u8; 4]) -> bool {
        if let Some(list) = self.addresses.get_mut(interface) {
            let before = list.len();
            list.retain(|a| a.address() != addr);
            return list.len() != before;
        }
        false
    }

    pub fn addresses(&self, interface: &str) -> &[Arc<Inet4Address>] {
        self.addresses
            .get(interface)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn add_router(&mut self, addr: [u8; 4]) {
        if !self.routers.contains(&addr) {
            self.routers.push(addr);
        }
    }

    pub fn remove_router(&mut self, addr: [u8; 4]) {
        self.routers.retain(|a| *a != addr);
    }

    pub fn routers(&self) -> &[[u8; 4]] {
        &self.routers
    }

    pub fn add_name_server(&mut self, addr: [u8; 4]) {
        if !self.name_servers.contains(&addr) {
            self.name_servers.push(addr);
        }
    }

    pub fn remove_name_server(&mut self, addr: [u8; 4]) {
        self.name_servers.retain(|a| *a != addr);
    }

    pub fn name_servers(&self) -> &[[u8; 4]] {
        &self.name_servers
    }

    pub fn add_search_domain(&mut self, domain: &str) {
        if !self.search_domains.iter().any(|d| d == domain) {
            self.search_domains.push(domain.to_string());
        }
    }

    pub fn remove_search_domain(&mut self, domain: &str) {
        self.search_domains.retain(|d| d != domain);
    }

    pub fn search_domains(&self) -> &[String] {
        &self.search_domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_an_address_requires_an_existing_interface() {
        let mut config = InternetConfig::new();
        assert!(config.add_address("eth0", [10, 0, 0, 1]).is_err());
        config.add_interface("eth0", [1, 2, 3, 4, 5, 6]);
        let address = config.add_address("eth0", [10, 0, 0, 1]).unwrap();
        assert_eq!(address.address(), [10, 0, 0, 1]);
        assert_eq!(config.addresses("eth0").len(), 1);
    }

    #[test]
    fn removing_an_interface_drops_its_addresses() {
        let mut config = InternetConfig::new();
        config.add_interface("eth0", [1, 2, 3, 4, 5, 6]);
        config.add_address("eth0", [10, 0, 0, 1]).unwrap();
        assert!(config.remove_interface("eth0"));
        assert!(config.addresses("eth0").is_empty());
    }

    #[test]
    fn routers_and_name_servers_deduplicate() {
        let mut config = InternetConfig::new();
        config.add_router([10, 0, 0, 1]);
        config.add_router([10, 0, 0, 1]);
        assert_eq!(config.routers().len(), 1);
        config.add_name_server([8, 8, 8, 8]);
        config.remove_name_server([8, 8, 8, 8]);
        assert!(config.name_servers().is_empty());
    }

    #[test]
    fn search_domains_preserve_insertion_order() {
        let mut config = InternetConfig::new();
        config.add_search_domain("corp.example");
        config.add_search_domain("example.com");
        assert_eq!(config.search_domains(), &["corp.example", "example.com"]);
    }
}
