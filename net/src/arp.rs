//! ARP (RFC 826) plus the RFC 3927 address-claiming extensions: the
//! `Inet4Address` state machine of spec §4.5.1, grounded in
//! `original_source/os/net/src/arp.cpp`'s `Inet4Address::State*` classes —
//! `StateInit`/`StateIncomplete`/`StateReachable`/`StateProbe` there map
//! directly onto the variants below, with `StateTentative`/`StatePreferred`/
//! `StateDeprecated` added for local-address claiming.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use abi::wire::ArpHeader;
use counters::Count;

/// The seven states of one IPv4 address's ARP lifecycle (spec §4.5.1 table).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressState {
    Init,
    Incomplete,
    Reachable,
    Probe,
    Tentative,
    Preferred,
    Deprecated,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArpEvent {
    EnterInit,
    EnterIncomplete,
    EnterReachable,
    EnterProbe,
    EnterTentative,
    EnterPreferred,
    EnterDeprecated,
    Collision,
}

#[derive(Default)]
pub struct ArpEventCounters {
    pub enter_init: counters::Counter,
    pub enter_incomplete: counters::Counter,
    pub enter_reachable: counters::Counter,
    pub enter_probe: counters::Counter,
    pub enter_tentative: counters::Counter,
    pub enter_preferred: counters::Counter,
    pub enter_deprecated: counters::Counter,
    pub collision: counters::Counter,
}

impl Count for ArpEvent {
    type Counters = ArpEventCounters;
    const NEW_COUNTERS: Self::Counters = ArpEventCounters {
        enter_init: counters::Counter::new(),
        enter_incomplete: counters::Counter::new(),
        enter_reachable: counters::Counter::new(),
        enter_probe: counters::Counter::new(),
        enter_tentative: counters::Counter::new(),
        enter_preferred: counters::Counter::new(),
        enter_deprecated: counters::Counter::new(),
        collision: counters::Counter::new(),
    };
    fn count(&self, counters: &Self::Counters) {
        match self {
            ArpEvent::EnterInit => counters.enter_init.increment(),
            ArpEvent::EnterIncomplete => counters.enter_incomplete.increment(),
            ArpEvent::EnterReachable => counters.enter_reachable.increment(),
            ArpEvent::EnterProbe => counters.enter_probe.increment(),
            ArpEvent::EnterTentative => counters.enter_tentative.increment(),
            ArpEvent::EnterPreferred => counters.enter_preferred.increment(),
            ArpEvent::EnterDeprecated => counters.enter_deprecated.increment(),
            ArpEvent::Collision => counters.collision.increment(),
        }
    }
}

ringbuf::counted_ringbuf!(ArpEvent, 64, ArpEvent::EnterInit);

const REACHABLE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

struct Inner {
    state: AddressState,
    mac: Option<[u8; 6]>,
    timeout_count: u32,
    /// Packets queued while the address is not Reachable (spec: "Packets
    /// needing resolution while not Reachable are queued at the address and
    /// flushed on entry to Reachable").
    queued: Vec<Vec<u8>>,
    deadline: Option<Instant>,
}

/// One local or peer IPv4 address's resolution/claiming state machine.
pub struct Inet4Address {
    addr: [u8; 4],
    local: bool,
    inner: Mutex<Inner>,
}

impl Inet4Address {
    /// Creates a peer address entry, which begins life unresolved
    /// (`Init` → `Incomplete` happens on first `start`).
    pub fn new_peer(addr: [u8; 4]) -> Arc<Self> {
        Arc::new(Inet4Address {
            addr,
            local: false,
            inner: Mutex::new(Inner {
                state: AddressState::Init,
                mac: None,
                timeout_count: 0,
                queued: Vec::new(),
                deadline: None,
            }),
        })
    }

    /// Creates a local address entry, which starts claiming the address
    /// immediately (`Tentative`).
    pub fn new_local(addr: [u8; 4]) -> Arc<Self> {
        let a = Arc::new(Inet4Address {
            addr,
            local: true,
            inner: Mutex::new(Inner {
                state: AddressState::Tentative,
                mac: None,
                timeout_count: 0,
                queued: Vec::new(),
                deadline: None,
            }),
        });
        ringbuf::ringbuf_entry!(ArpEvent::EnterTentative);
        a
    }

    pub fn address(&self) -> [u8; 4] {
        self.addr
    }

    pub fn state(&self) -> AddressState {
        self.inner.lock().unwrap().state
    }

    pub fn mac(&self) -> Option<[u8; 6]> {
        self.inner.lock().unwrap().mac
    }

    /// Starts resolution for a peer address: `Init` installs itself then
    /// immediately transitions to `Incomplete` (mirrors `StateInit::start`).
    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == AddressState::Init {
            inner.state = AddressState::Incomplete;
            inner.timeout_count = 0;
            ringbuf::ringbuf_entry!(ArpEvent::EnterIncomplete);
        }
    }

    /// Queues a packet whose link-layer address is not yet known.
    pub fn queue(&self, packet: Vec<u8>) {
        self.inner.lock().unwrap().queued.push(packet);
    }

    /// Timer expiry for the current state (spec table's "On expiry" column).
    /// Returns any probe/announce ARP payload that should now be sent.
    pub fn on_expiry(&self) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            AddressState::Incomplete | AddressState::Probe => {
                inner.timeout_count += 1;
                if inner.timeout_count > 6 {
                    let was_probe = inner.state == AddressState::Probe;
                    inner.state = AddressState::Init;
                    inner.mac = None;
                    ringbuf::ringbuf_entry!(ArpEvent::EnterInit);
                    if was_probe {
                        // caller drops the cache entry on seeing Init after Probe
                    }
                    None
                } else {
                    Some(self.build_request())
                }
            }
            AddressState::Reachable => {
                inner.state = AddressState::Probe;
                inner.timeout_count = 0;
                ringbuf::ringbuf_entry!(ArpEvent::EnterProbe);
                None
            }
            AddressState::Tentative => {
                inner.timeout_count += 1;
                let probe = self.build_request();
                if inner.timeout_count >= ArpHeader::PROBE_NUM {
                    inner.state = AddressState::Preferred;
                    ringbuf::ringbuf_entry!(ArpEvent::EnterPreferred);
                }
                Some(probe)
            }
            AddressState::Preferred => Some(self.build_announce()),
            AddressState::Init | AddressState::Deprecated => None,
        }
    }

    fn build_request(&self) -> Vec<u8> {
        ArpHeader::request([0; 6], [0; 4], self.addr).as_bytes_vec()
    }

    fn build_announce(&self) -> Vec<u8> {
        ArpHeader::request([0; 6], self.addr, self.addr).as_bytes_vec()
    }

    /// Handles an inbound ARP packet whose `spa`/`tpa` concerns this address
    /// (spec table's "On inbound ARP (matching spa)" column). For a local
    /// address in `Tentative`, a match is a collision (spec: "receiving an
    /// ARP whose spa matches a local address in Tentative state is a
    /// collision").
    pub fn on_arp(&self, sha: [u8; 6]) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            AddressState::Incomplete => {
                inner.mac = Some(sha);
                inner.state = AddressState::Reachable;
                inner.deadline = Some(Instant::now() + REACHABLE_TIMEOUT);
                ringbuf::ringbuf_entry!(ArpEvent::EnterReachable);
            }
            AddressState::Reachable | AddressState::Probe => {
                inner.mac = Some(sha);
                if inner.state == AddressState::Probe {
                    inner.state = AddressState::Reachable;
                    ringbuf::ringbuf_entry!(ArpEvent::EnterReachable);
                }
                inner.deadline = Some(Instant::now() + REACHABLE_TIMEOUT);
            }
            AddressState::Tentative if self.local => {
                inner.state = AddressState::Init;
                ringbuf::ringbuf_entry!(ArpEvent::Collision);
            }
            _ => {}
        }
    }

    /// Drains packets queued while unresolved; called on entry to
    /// `Reachable`.
    pub fn take_queued(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.inner.lock().unwrap().queued)
    }

    pub fn deprecate(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = AddressState::Deprecated;
        ringbuf::ringbuf_entry!(ArpEvent::EnterDeprecated);
    }
}

trait AsBytesVec {
    fn as_bytes_vec(&self) -> Vec<u8>;
}

impl AsBytesVec for ArpHeader {
    fn as_bytes_vec(&self) -> Vec<u8> {
        use zerocopy::AsBytes;
        self.as_bytes().to_vec()
    }
}
