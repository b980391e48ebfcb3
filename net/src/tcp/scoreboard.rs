//! The SACK scoreboard (spec §4.5.2 "SACK scoreboard"), ported from
//! `original_source/os/net/src/streamScoreboard.cpp`'s `StreamReceiver`
//! hole-tracking array — sequence-number holes the receiver has reported
//! via SACK blocks, used to drive selective retransmission.

pub const RXMIT_THRESH: u32 = 3;
pub const ASB_MAX: usize = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Hole {
    pub start: u32,
    pub end: u32,
    pub rxmit: u32,
    pub dup_acks: u32,
}

/// One TCP sender's SACK hole scoreboard plus the derived quantities the
/// congestion controller needs (`send_fack`, `rxmit_data`, `send_awin`).
#[derive(Default)]
pub struct Scoreboard {
    holes: Vec<Hole>,
    pub send_fack: u32,
    pub last_sack: u32,
}

impl Scoreboard {
    pub fn new() -> Self {
        Scoreboard::default()
    }

    pub fn is_empty(&self) -> bool {
        self.holes.is_empty()
    }

    pub fn holes(&self) -> &[Hole] {
        &self.holes
    }

    /// Removes holes fully covered by a newly cumulative-acked sequence
    /// (spec step 1: "Purge holes whose end <= cumulative_ack"), trimming
    /// the first remaining hole's start up to `ack` if it straddles it.
    pub fn purge_acked(&mut self, ack: u32) {
        self.holes.retain(|h| ack < h.end);
        if let Some(first) = self.holes.first_mut() {
            if first.start < ack {
                first.start = ack;
                if first.rxmit < first.start {
                    first.rxmit = first.start;
                }
            }
        }
    }

    /// Merges one SACK block `[start, end)` into the scoreboard (spec step
    /// 2), rejecting malformed or stale blocks per the rules in spec §4.5.2.
    pub fn merge_block(&mut self, ack: u32, send_max: u32, start: u32, end: u32, mss: u32) {
        if end <= start || end <= ack || start <= ack || send_max < end {
            return; // malformed, old, or D-SACK
        }
        if end > self.send_fack {
            self.send_fack = end;
        }

        if self.holes.is_empty() {
            let dup_acks = ((end.saturating_sub(start)) / mss.max(1)).clamp(1, RXMIT_THRESH);
            self.holes.push(Hole {
                start: ack,
                end: start,
                rxmit: ack,
                dup_acks,
            });
            self.last_sack = end;
            return;
        }

        // Find the hole whose range contains or abuts [start, end); split,
        // trim, or bump dup_acks as appropriate.
        let mut i = 0;
        while i < self.holes.len() {
            let hole = self.holes[i];
            if end <= hole.start {
                // The SACKed block lies entirely before this hole: a new
                // hole opens between the previous right edge and `start`.
                let left_edge = if i == 0 { ack } else { self.holes[i - 1].end };
                if left_edge < start && self.holes.len() < ASB_MAX {
                    self.holes.insert(
                        i,
                        Hole {
                            start: left_edge,
                            end: start,
                            rxmit: left_edge,
                            dup_acks: 1,
                        },
                    );
                }
                self.last_sack = end;
                return;
            }
            if start <= hole.start && hole.end <= end {
                // Whole hole is now SACKed: remove it.
                self.holes.remove(i);
                continue;
            }
            if hole.start < start && start < hole.end && end >= hole.end {
                // Right overlap: trim the hole's right edge.
                self.holes[i].end = start;
                i += 1;
                continue;
            }
            if hole.start < end && end < hole.end && start <= hole.start {
                // Left overlap: trim the hole's left edge.
                self.holes[i].start = end;
                if self.holes[i].rxmit < self.holes[i].start {
                    self.holes[i].rxmit = self.holes[i].start;
                }
                i += 1;
                continue;
            }
            if hole.start < start && end < hole.end {
                // Middle overlap: split into two holes.
                let right = Hole {
                    start: end,
                    end: hole.end,
                    rxmit: end,
                    dup_acks: hole.dup_acks,
                };
                self.holes[i].end = start;
                if self.holes.len() < ASB_MAX {
                    self.holes.insert(i + 1, right);
                } else {
                    // Overflow: evict the newest hole to make room.
                    self.holes.pop();
                    self.holes.insert(i + 1, right);
                }
                self.last_sack = end;
                return;
            }
            i += 1;
        }
        if self.holes.len() < ASB_MAX {
            let left_edge = self.holes.last().map(|h| h.end).unwrap_or(ack);
            if left_edge < start {
                self.holes.push(Hole {
                    start: left_edge,
                    end: start,
                    rxmit: left_edge,
                    dup_acks: 1,
                });
            }
        }
        self.last_sack = end;
    }

    /// Bumps `dup_acks` (capped at `RXMIT_THRESH`) on holes that precede the
    /// most recently SACKed block (spec step 4).
    pub fn bump_dup_acks_before_last_sack(&mut self) {
        for hole in &mut self.holes {
            if hole.end <= self.last_sack {
                hole.dup_acks = (hole.dup_acks + 1).min(RXMIT_THRESH);
            }
        }
    }

    /// Spec step 5: `rxmitData = Σ (hole.rxmit − hole.start)`.
    pub fn rxmit_data(&self) -> u32 {
        self.holes
            .iter()
            .map(|h| h.rxmit.saturating_sub(h.start))
            .sum()
    }

    /// Selects the lowest-start hole eligible for retransmission: its
    /// `rxmit < end`, it is either in fast retransmit or has crossed the
    /// dup-ack threshold, and it is not stale (`rxmit >= send_una`).
    pub fn pending_retransmit(&self, send_una: u32, fast_rxmit: bool) -> Option<Hole> {
        self.holes
            .iter()
            .find(|h| {
                h.rxmit < h.end
                    && (fast_rxmit || h.dup_acks >= RXMIT_THRESH)
                    && h.rxmit >= send_una
            })
            .copied()
    }

    pub fn mark_retransmitted(&mut self, start: u32, up_to: u32) {
        if let Some(hole) = self.holes.iter_mut().find(|h| h.start == start) {
            hole.rxmit = up_to;
        }
    }

    pub fn clear(&mut self) {
        self.holes.clear();
        self.send_fack = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sack_block_opens_one_hole() {
        let mut sb = Scoreboard::new();
        sb.merge_block(100, 1000, 300, 400, 100);
        assert_eq!(sb.holes().len(), 1);
        assert_eq!(sb.holes()[0], Hole { start: 100, end: 300, rxmit: 100, dup_acks: 1 });
        assert_eq!(sb.send_fack, 400);
    }

    #[test]
    fn purge_acked_removes_fully_covered_holes() {
        let mut sb = Scoreboard::new();
        sb.merge_block(100, 1000, 300, 400, 100);
        sb.purge_acked(350);
        assert_eq!(sb.holes()[0].start, 350);
    }

    #[test]
    fn malformed_block_is_rejected() {
        let mut sb = Scoreboard::new();
        sb.merge_block(100, 1000, 400, 300, 100); // end <= start
        assert!(sb.is_empty());
    }

    #[test]
    fn d_sack_block_is_ignored() {
        let mut sb = Scoreboard::new();
        sb.merge_block(100, 1000, 50, 90, 100); // start <= ack
        assert!(sb.is_empty());
    }

    #[test]
    fn pending_retransmit_skips_stale_holes() {
        let mut sb = Scoreboard::new();
        sb.merge_block(100, 1000, 300, 400, 100);
        sb.bump_dup_acks_before_last_sack();
        sb.bump_dup_acks_before_last_sack();
        sb.bump_dup_acks_before_last_sack();
        let hole = sb.pending_retransmit(100, false);
        assert!(hole.is_some());
        assert!(sb.pending_retransmit(500, false).is_none());
    }
}
