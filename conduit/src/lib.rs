//! The conduit framework (Component D): a graph of message-processing
//! nodes walked by visitors, generic over the message type `M` so that
//! `net` is this crate's only consumer but nothing networking-specific
//! leaks in here — grounded in
//! `original_source/kala/CopyTrunk/os/net/testsuite/conduit.cpp`, whose
//! `Ethernet`/`Socket` receivers and `PortAccessor` ride the same
//! `Conduit`/`Mux`/`Accessor`/`Visitor` shapes the real network stack uses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use abi::Code;

/// The two named ports every conduit node has (spec §3 "Conduit node").
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// A receiver consumes or originates messages at a `Protocol` or `Adapter`
/// node. Returning `false` means "the message was rejected"; the caller is
/// responsible for recording the error on the message itself (the
/// framework does not know `M`'s error-reporting shape).
pub trait Receiver<M>: Send + Sync {
    fn receive(&self, msg: &mut M) -> bool;
}

/// Extracts the routing key a `Mux` uses to select a sub-conduit.
pub trait Accessor<M>: Send + Sync {
    fn key(&self, msg: &M) -> u64;
}

/// Given a key and the mux's own table, instantiates a missing branch.
/// Mirrors `ConduitFactory` in the original source: on an output-side miss,
/// the mux asks its factory to clone a template sub-graph and wire it in.
pub trait Factory<M>: Send + Sync {
    fn create(&self, key: u64) -> Arc<Conduit<M>>;
}

/// A visitor walks the graph by calling `at` for each node it passes
/// through; returning `false` stops the walk without error (spec §4.4
/// "A visitor that returns stop (false) terminates the walk without
/// error").
pub trait Visitor<M> {
    fn at(&mut self, node: &Arc<Conduit<M>>) -> bool;
    fn messenger(&mut self) -> &mut M;
}

enum Kind<M> {
    Protocol {
        receiver: Arc<dyn Receiver<M>>,
    },
    Adapter {
        receiver: Arc<dyn Receiver<M>>,
    },
    Mux {
        accessor: Arc<dyn Accessor<M>>,
        table: Mutex<HashMap<u64, Arc<Conduit<M>>>>,
        factory: Mutex<Option<Arc<dyn Factory<M>>>>,
    },
}

/// A node in the conduit graph (spec §3 "Conduit node"). Every node has a
/// name for diagnostics and references to its A- and B-side neighbors;
/// `connect_*` is the only way those references are installed.
pub struct Conduit<M> {
    name: String,
    a: Mutex<Option<Arc<Conduit<M>>>>,
    b: Mutex<Option<Arc<Conduit<M>>>>,
    kind: Kind<M>,
}

impl<M> Conduit<M> {
    pub fn protocol(name: impl Into<String>, receiver: Arc<dyn Receiver<M>>) -> Arc<Self> {
        Arc::new(Conduit {
            name: name.into(),
            a: Mutex::new(None),
            b: Mutex::new(None),
            kind: Kind::Protocol { receiver },
        })
    }

    pub fn adapter(name: impl Into<String>, receiver: Arc<dyn Receiver<M>>) -> Arc<Self> {
        Arc::new(Conduit {
            name: name.into(),
            a: Mutex::new(None),
            b: Mutex::new(None),
            kind: Kind::Adapter { receiver },
        })
    }

    pub fn mux(name: impl Into<String>, accessor: Arc<dyn Accessor<M>>) -> Arc<Self> {
        Arc::new(Conduit {
            name: name.into(),
            a: Mutex::new(None),
            b: Mutex::new(None),
            kind: Kind::Mux {
                accessor,
                table: Mutex::new(HashMap::new()),
                factory: Mutex::new(None),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs (or replaces) the factory a `Mux` consults on a lookup miss
    /// while building an outbound message (spec §4.4 "on a miss during
    /// output, a Mux consults its Factory to materialise the missing
    /// branch").
    pub fn set_factory(&self, factory: Arc<dyn Factory<M>>) {
        if let Kind::Mux { factory: slot, .. } = &self.kind {
            *slot.lock().unwrap() = Some(factory);
        }
    }

    /// Wires a sub-conduit into a `Mux`'s routing table under `key`.
    pub fn route(self: &Arc<Self>, key: u64, sub: Arc<Conduit<M>>) {
        if let Kind::Mux { table, .. } = &self.kind {
            table.lock().unwrap().insert(key, sub);
        }
    }

    fn neighbor(&self, side: Side) -> Option<Arc<Conduit<M>>> {
        match side {
            Side::A => self.a.lock().unwrap().clone(),
            Side::B => self.b.lock().unwrap().clone(),
        }
    }

    /// Walks the graph starting at this node (spec §4.4 "accept"). Returns
    /// `true` if the walk reached a terminal `Adapter` (or a visitor-chosen
    /// stop) without error, `false` if a receiver refused the message or a
    /// `Mux` lookup missed with no factory to cover it.
    pub fn accept(self: &Arc<Self>, visitor: &mut dyn Visitor<M>, exit_side: Side) -> bool {
        if !visitor.at(self) {
            return true;
        }
        match &self.kind {
            Kind::Adapter { receiver } => receiver.receive(visitor.messenger()),
            Kind::Protocol { receiver } => {
                if !receiver.receive(visitor.messenger()) {
                    return false;
                }
                match self.neighbor(exit_side.opposite()) {
                    Some(next) => next.accept(visitor, exit_side),
                    None => true,
                }
            }
            Kind::Mux {
                accessor,
                table,
                factory,
            } => {
                let key = accessor.key(visitor.messenger());
                let existing = table.lock().unwrap().get(&key).cloned();
                let target = match existing {
                    Some(t) => Some(t),
                    None => factory.lock().unwrap().as_ref().map(|f| {
                        let sub = f.create(key);
                        table.lock().unwrap().insert(key, sub.clone());
                        sub
                    }),
                };
                match target {
                    Some(t) => t.accept(visitor, exit_side),
                    None => false,
                }
            }
        }
    }
}

/// Connects the A side of `x` to the A side of `y`.
pub fn connect_aa<M>(x: &Arc<Conduit<M>>, y: &Arc<Conduit<M>>) {
    *x.a.lock().unwrap() = Some(y.clone());
    *y.a.lock().unwrap() = Some(x.clone());
}

/// Connects the A side of `x` to the B side of `y`.
pub fn connect_ab<M>(x: &Arc<Conduit<M>>, y: &Arc<Conduit<M>>) {
    *x.a.lock().unwrap() = Some(y.clone());
    *y.b.lock().unwrap() = Some(x.clone());
}

/// Connects the B side of `x` to the A side of `y`.
pub fn connect_ba<M>(x: &Arc<Conduit<M>>, y: &Arc<Conduit<M>>) {
    *x.b.lock().unwrap() = Some(y.clone());
    *y.a.lock().unwrap() = Some(x.clone());
}

/// Connects the B side of `x` to the B side of `y`.
pub fn connect_bb<M>(x: &Arc<Conduit<M>>, y: &Arc<Conduit<M>>) {
    *x.b.lock().unwrap() = Some(y.clone());
    *y.b.lock().unwrap() = Some(x.clone());
}

/// Used by nodes that need to report a graph-level failure back through a
/// messenger whose concrete type they don't know (e.g. a generic test
/// harness); `net`'s own receivers set `abi::Code` directly on their
/// concrete `Messenger` instead.
pub fn unsupported() -> Code {
    Code::UnsupportedOperation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting(std::sync::atomic::AtomicUsize);

    impl Receiver<Vec<u8>> for Counting {
        fn receive(&self, msg: &mut Vec<u8>) -> bool {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            msg.push(0xAA);
            true
        }
    }

    struct RecordingVisitor {
        msg: Vec<u8>,
        visited: Vec<String>,
    }

    impl Visitor<Vec<u8>> for RecordingVisitor {
        fn at(&mut self, node: &Arc<Conduit<Vec<u8>>>) -> bool {
            self.visited.push(node.name().to_string());
            true
        }
        fn messenger(&mut self) -> &mut Vec<u8> {
            &mut self.msg
        }
    }

    #[test]
    fn protocol_forwards_to_neighbor_then_terminates_at_adapter() {
        let adapter = Conduit::adapter("nic", Arc::new(Counting::default()));
        let protocol = Conduit::protocol("eth", Arc::new(Counting::default()));
        connect_ab(&protocol, &adapter);

        let mut visitor = RecordingVisitor {
            msg: Vec::new(),
            visited: Vec::new(),
        };
        let ok = protocol.accept(&mut visitor, Side::B);
        assert!(ok);
        assert_eq!(visitor.visited, vec!["eth", "nic"]);
        assert_eq!(visitor.msg, vec![0xAA, 0xAA]);
    }

    #[test]
    fn mux_miss_without_factory_fails_without_panicking() {
        struct FixedKey;
        impl Accessor<Vec<u8>> for FixedKey {
            fn key(&self, _msg: &Vec<u8>) -> u64 {
                7
            }
        }
        let mux = Conduit::mux("scope-mux", Arc::new(FixedKey));
        let mut visitor = RecordingVisitor {
            msg: Vec::new(),
            visited: Vec::new(),
        };
        assert!(!mux.accept(&mut visitor, Side::A));
    }

    #[test]
    fn mux_hit_routes_to_the_registered_sub_conduit() {
        struct FixedKey;
        impl Accessor<Vec<u8>> for FixedKey {
            fn key(&self, _msg: &Vec<u8>) -> u64 {
                7
            }
        }
        let mux = Conduit::mux("scope-mux", Arc::new(FixedKey));
        let sub = Conduit::adapter("sub", Arc::new(Counting::default()));
        mux.route(7, sub);

        let mut visitor = RecordingVisitor {
            msg: Vec::new(),
            visited: Vec::new(),
        };
        assert!(mux.accept(&mut visitor, Side::A));
        assert_eq!(visitor.visited, vec!["scope-mux", "sub"]);
    }

    #[test]
    fn visitor_stop_terminates_without_error() {
        struct StopImmediately;
        impl Visitor<Vec<u8>> for StopImmediately {
            fn at(&mut self, _node: &Arc<Conduit<Vec<u8>>>) -> bool {
                false
            }
            fn messenger(&mut self) -> &mut Vec<u8> {
                unreachable!("never called once at() returns false")
            }
        }
        let adapter = Conduit::adapter("nic", Arc::new(Counting::default()));
        let mut visitor = StopImmediately;
        assert!(adapter.accept(&mut visitor, Side::A));
    }
}
