//! The TCP endpoint state machine (spec §4.5.2): eleven states per RFC 793,
//! NewReno congestion control with optional SACK recovery, half-close, and
//! the listening endpoint's accept queue. Grounded in
//! `original_source/os/net/src/stream.h`'s `Stream` state hierarchy,
//! translated from a State-pattern class hierarchy into a single enum
//! dispatched over in inherent methods (idiomatic for a translation this
//! size; Hubris's own state machines, e.g. `task_config` generation
//! tracking, favor a plain enum over virtual dispatch too).

use std::collections::VecDeque;
use std::time::Duration;

use abi::wire::TcpHeader;
use abi::Code;

use crate::tcp::scoreboard::Scoreboard;
use crate::tcp::timer::{RetransmitTimer, RttEstimator};

/// The eleven TCP states (RFC 793 §3.2), plus `Closed` as both initial and
/// final.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    LastAck,
    Closing,
    TimeWait,
}

/// Whether the congestion window is growing exponentially (slow start) or
/// linearly (congestion avoidance); threshold is `cwnd < ssthresh`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum CongestionPhase {
    SlowStart,
    CongestionAvoidance,
    FastRecovery,
}

struct Congestion {
    phase: CongestionPhase,
    cwnd: u32,
    ssthresh: u32,
    mss: u32,
    dup_acks: u32,
}

impl Congestion {
    fn new(mss: u32) -> Self {
        Congestion {
            phase: CongestionPhase::SlowStart,
            cwnd: mss,
            ssthresh: u32::MAX,
            mss,
            dup_acks: 0,
        }
    }

    /// One new byte's worth of ACK progress arrived (not a duplicate).
    fn on_new_ack(&mut self, acked_bytes: u32) {
        self.dup_acks = 0;
        match self.phase {
            CongestionPhase::SlowStart => {
                self.cwnd += self.mss.min(acked_bytes);
                if self.cwnd >= self.ssthresh {
                    self.phase = CongestionPhase::CongestionAvoidance;
                }
            }
            CongestionPhase::CongestionAvoidance => {
                let growth = (self.mss as u64 * self.mss as u64) / self.cwnd.max(1) as u64;
                self.cwnd += growth.max(1) as u32;
            }
            CongestionPhase::FastRecovery => {
                self.phase = CongestionPhase::CongestionAvoidance;
                self.cwnd = self.ssthresh;
            }
        }
    }

    /// A duplicate ACK arrived; returns `true` the instant the connection
    /// should enter fast recovery (the third duplicate).
    fn on_duplicate_ack(&mut self, send_max: u32, send_una: u32) -> bool {
        if self.phase == CongestionPhase::FastRecovery {
            self.cwnd += self.mss;
            return false;
        }
        self.dup_acks += 1;
        if self.dup_acks == 3 {
            self.ssthresh = (2 * self.mss).max((send_max - send_una) / 2);
            self.cwnd = self.ssthresh + 3 * self.mss;
            self.phase = CongestionPhase::FastRecovery;
            return true;
        }
        false
    }

    fn on_timeout(&mut self, send_max: u32, send_una: u32) {
        self.ssthresh = (2 * self.mss).max((send_max - send_una) / 2);
        self.cwnd = self.mss;
        self.phase = CongestionPhase::SlowStart;
        self.dup_acks = 0;
    }
}

/// One TCP connection's complete mutable state.
pub struct Endpoint {
    pub state: TcpState,
    pub local_port: u16,
    pub remote_port: u16,
    pub mss: u32,

    pub send_una: u32,
    pub send_next: u32,
    pub send_max: u32,
    pub send_recover: u32,
    pub iss: u32,

    pub recv_next: u32,
    pub irs: u32,

    congestion: Congestion,
    pub scoreboard: Scoreboard,
    pub rtt: RttEstimator,
    pub retransmit: RetransmitTimer,
    fast_rxmit: bool,

    shutdown_input: bool,
    shutdown_output: bool,
    input_eof_delivered: bool,

    /// Endpoints accepted by a listening endpoint but not yet handed to the
    /// application (spec §4.5.2 "Accept queue").
    accept_queue: VecDeque<Endpoint>,
    backlog: usize,
}

impl Endpoint {
    pub fn new_closed(mss: u32) -> Self {
        Endpoint {
            state: TcpState::Closed,
            local_port: 0,
            remote_port: 0,
            mss,
            send_una: 0,
            send_next: 0,
            send_max: 0,
            send_recover: 0,
            iss: 0,
            recv_next: 0,
            irs: 0,
            congestion: Congestion::new(mss),
            scoreboard: Scoreboard::new(),
            rtt: RttEstimator::new(),
            retransmit: RetransmitTimer::new(Duration::from_secs(1), true),
            fast_rxmit: false,
            shutdown_input: false,
            shutdown_output: false,
            input_eof_delivered: false,
            accept_queue: VecDeque::new(),
            backlog: 0,
        }
    }

    pub fn cwnd(&self) -> u32 {
        self.congestion.cwnd
    }

    pub fn ssthresh(&self) -> u32 {
        self.congestion.ssthresh
    }

    /// `sendAwin = (sendNext - sendFack) + rxmitData` (spec §4.5.2 step 5).
    pub fn send_awin(&self) -> u32 {
        self.send_next
            .wrapping_sub(self.scoreboard.send_fack)
            .wrapping_add(self.scoreboard.rxmit_data())
    }

    pub fn listen(&mut self, local_port: u16, backlog: usize) {
        self.local_port = local_port;
        self.backlog = backlog;
        self.state = TcpState::Listen;
    }

    /// Active open: picks an ISS and moves to `SynSent`.
    pub fn connect(&mut self, local_port: u16, remote_port: u16, iss: u32) {
        self.local_port = local_port;
        self.remote_port = remote_port;
        self.iss = iss;
        self.send_una = iss;
        self.send_next = iss.wrapping_add(1);
        self.send_max = self.send_next;
        self.state = TcpState::SynSent;
    }

    /// A listening endpoint receives a SYN: spawns a child endpoint in
    /// `SynReceived` (the three-way handshake completes when the matching
    /// ACK arrives via `on_ack`).
    pub fn on_syn_to_listener(&mut self, remote_port: u16, irs: u32, iss: u32) -> Result<(), Code> {
        if self.state != TcpState::Listen {
            return Err(Code::InvalidArg);
        }
        if self.accept_queue.len() >= self.backlog {
            return Err(Code::WouldBlock);
        }
        let mut child = Endpoint::new_closed(self.mss);
        child.local_port = self.local_port;
        child.remote_port = remote_port;
        child.irs = irs;
        child.recv_next = irs.wrapping_add(1);
        child.iss = iss;
        child.send_una = iss;
        child.send_next = iss.wrapping_add(1);
        child.send_max = child.send_next;
        child.state = TcpState::SynReceived;
        self.accept_queue.push_back(child);
        Ok(())
    }

    /// The SYN-ACK arrives at the active opener.
    pub fn on_syn_ack(&mut self, irs: u32, ack: u32) -> bool {
        if self.state != TcpState::SynSent || ack != self.send_next {
            return false;
        }
        self.irs = irs;
        self.recv_next = irs.wrapping_add(1);
        self.send_una = ack;
        self.state = TcpState::Established;
        true
    }

    /// Completes a `SynReceived` child once the handshake's final ACK
    /// arrives, moving it into the accept queue as `Established`.
    pub fn on_handshake_ack(&mut self, ack: u32) -> bool {
        if self.state != TcpState::SynReceived || ack != self.send_next {
            return false;
        }
        self.send_una = ack;
        self.state = TcpState::Established;
        true
    }

    /// Blocks conceptually until an endpoint is ready; the caller (socket
    /// adapter) is responsible for actual thread blocking via a monitor —
    /// this just detaches the head once non-empty (spec "accept blocks
    /// until non-empty ... and detaches the head").
    pub fn try_accept(&mut self) -> Option<Endpoint> {
        self.accept_queue
            .iter()
            .position(|e| e.state == TcpState::Established)
            .map(|i| self.accept_queue.remove(i).unwrap())
    }

    /// Applies one incoming ACK's effect on congestion control and the SACK
    /// scoreboard (spec §4.5.2 "SACK scoreboard" steps 1-5).
    pub fn on_ack(&mut self, ack: u32, sack_blocks: &[(u32, u32)]) {
        let is_dup = ack == self.send_una && ack != self.send_max;
        if !is_dup && ack > self.send_una {
            let acked = ack.wrapping_sub(self.send_una);
            self.send_una = ack;
            self.scoreboard.purge_acked(ack);
            self.congestion.on_new_ack(acked);
            self.retransmit.reset(self.retransmit.current);
            self.fast_rxmit = false;
        } else if is_dup {
            for &(s, e) in sack_blocks {
                self.scoreboard.merge_block(ack, self.send_max, s, e, self.mss);
            }
            self.scoreboard.bump_dup_acks_before_last_sack();
            if self.congestion.on_duplicate_ack(self.send_max, self.send_una) {
                self.fast_rxmit = true;
                self.send_recover = self.send_max;
            }
        }
    }

    /// Retransmission timeout (spec §4.5.2 "On retransmission timeout").
    /// Returns `false` if R2 has been exceeded and the connection must
    /// abort with `ETIMEDOUT`.
    pub fn on_rto(&mut self) -> bool {
        let alive = self.retransmit.on_timeout();
        if alive {
            self.congestion.on_timeout(self.send_max, self.send_una);
            self.scoreboard.clear();
            self.send_recover = self.send_max;
            self.fast_rxmit = false;
            self.send_next = self.send_una;
        }
        alive
    }

    /// Application-level half-close of the write side (spec "shutdown_output
    /// sends FIN via the normal state transition: Established → FinWait1,
    /// CloseWait → LastAck").
    pub fn shutdown_output(&mut self) {
        self.shutdown_output = true;
        self.state = match self.state {
            TcpState::Established => TcpState::FinWait1,
            TcpState::CloseWait => TcpState::LastAck,
            other => other,
        };
    }

    /// Application-level half-close of the read side: future reads return
    /// EOF once the receive buffer drains (enforced by the socket adapter;
    /// this just records the flag).
    pub fn shutdown_input(&mut self) {
        self.shutdown_input = true;
    }

    pub fn input_is_shutdown(&self) -> bool {
        self.shutdown_input
    }

    /// `close` under a non-blocking socket with a zero timeout aborts (RST)
    /// instead of a graceful FIN (spec §4.5.2 "Half-close").
    pub fn abortive_close(&mut self) {
        self.state = TcpState::Closed;
    }

    pub fn graceful_close(&mut self) {
        if !self.shutdown_output {
            self.shutdown_output();
        }
    }

    /// Peer's FIN arrives.
    pub fn on_fin(&mut self) {
        self.recv_next = self.recv_next.wrapping_add(1);
        self.state = match self.state {
            TcpState::Established => TcpState::CloseWait,
            TcpState::FinWait1 => TcpState::Closing,
            TcpState::FinWait2 => TcpState::TimeWait,
            other => other,
        };
    }

    /// ACK of our own FIN arrives.
    pub fn on_fin_acked(&mut self) {
        self.state = match self.state {
            TcpState::FinWait1 => TcpState::FinWait2,
            TcpState::Closing => TcpState::TimeWait,
            TcpState::LastAck => TcpState::Closed,
            other => other,
        };
    }

    pub fn on_time_wait_expired(&mut self) {
        if self.state == TcpState::TimeWait {
            self.state = TcpState::Closed;
        }
    }

    pub fn header_flags_for_current_state(&self) -> u8 {
        match self.state {
            TcpState::SynSent => TcpHeader::FLAG_SYN,
            TcpState::SynReceived => TcpHeader::FLAG_SYN | TcpHeader::FLAG_ACK,
            TcpState::FinWait1 | TcpState::LastAck => TcpHeader::FLAG_FIN | TcpHeader::FLAG_ACK,
            _ => TcpHeader::FLAG_ACK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_way_handshake_reaches_established_on_both_ends() {
        let mut client = Endpoint::new_closed(1460);
        client.connect(9000, 80, 1000);
        assert_eq!(client.state, TcpState::SynSent);

        let mut server = Endpoint::new_closed(1460);
        server.listen(80, 4);
        server.on_syn_to_listener(9000, 1000, 5000).unwrap();
        let mut accepted = server.try_accept();
        assert!(accepted.is_none()); // still SynReceived, not yet Established

        let child_ack = 5001u32;
        assert!(client.on_syn_ack(5000, child_ack));
        assert_eq!(client.state, TcpState::Established);

        let child = &mut server.accept_queue[0];
        assert!(child.on_handshake_ack(child_ack));
        accepted = server.try_accept();
        assert!(accepted.is_some());
        assert_eq!(accepted.unwrap().state, TcpState::Established);
    }

    #[test]
    fn half_close_then_peer_fin_reaches_closing_or_time_wait() {
        let mut e = Endpoint::new_closed(1460);
        e.state = TcpState::Established;
        e.shutdown_output();
        assert_eq!(e.state, TcpState::FinWait1);
        e.on_fin();
        assert_eq!(e.state, TcpState::Closing);
        e.on_fin_acked();
        assert_eq!(e.state, TcpState::TimeWait);
        e.on_time_wait_expired();
        assert_eq!(e.state, TcpState::Closed);
    }

    #[test]
    fn passive_close_sequence_reaches_closed_via_last_ack() {
        let mut e = Endpoint::new_closed(1460);
        e.state = TcpState::Established;
        e.on_fin();
        assert_eq!(e.state, TcpState::CloseWait);
        e.shutdown_output();
        assert_eq!(e.state, TcpState::LastAck);
        e.on_fin_acked();
        assert_eq!(e.state, TcpState::Closed);
    }

    #[test]
    fn third_duplicate_ack_enters_fast_recovery_and_inflates_cwnd() {
        let mut e = Endpoint::new_closed(1460);
        e.send_una = 1000;
        e.send_next = 5000;
        e.send_max = 5000;
        e.on_ack(1000, &[(1500, 2000)]);
        e.on_ack(1000, &[(1500, 2000)]);
        let before = e.cwnd();
        e.on_ack(1000, &[(1500, 2000)]);
        assert!(e.cwnd() > before);
        assert!(e.fast_rxmit);
    }

    #[test]
    fn timeout_resets_cwnd_to_one_mss_and_clears_scoreboard() {
        let mut e = Endpoint::new_closed(1460);
        e.send_una = 1000;
        e.send_max = 5000;
        e.scoreboard.merge_block(1000, 5000, 2000, 2500, 1460);
        assert!(e.on_rto());
        assert_eq!(e.cwnd(), 1460);
        assert!(e.scoreboard.is_empty());
    }

    #[test]
    fn abortive_close_skips_the_fin_handshake() {
        let mut e = Endpoint::new_closed(1460);
        e.state = TcpState::Established;
        e.abortive_close();
        assert_eq!(e.state, TcpState::Closed);
    }
}
