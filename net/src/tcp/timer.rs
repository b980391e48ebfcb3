//! TCP timers (spec §4.5.2 "Timers"), ported from
//! `original_source/os/net/src/streamTimer.cpp`: Jacobson/Karels RTO
//! smoothing, delayed ACK, persist, and TIME-WAIT.

use std::time::Duration;

pub const RTT_MIN: Duration = Duration::from_secs(1);
pub const MSL: Duration = Duration::from_secs(60);
pub const DELAYED_ACK: Duration = Duration::from_millis(200);
pub const PMTUD_BACKOFF: u32 = 7;
pub const R2_ESTABLISHED: Duration = Duration::from_secs(100);
pub const R2_SYN: Duration = Duration::from_secs(30 * 60);
const MAX_BACKOFF: u32 = 12;

pub fn rtt_max() -> Duration {
    MSL * 2
}

pub fn persist_max() -> Duration {
    rtt_max() * MAX_BACKOFF
}

pub fn time_wait() -> Duration {
    MSL * 2
}

/// Smoothed round-trip-time estimator (Jacobson/Karels): `srtt += (rtt -
/// srtt)/8`, `rttde += (|rtt - srtt| - rttde)/4`, `rto = clamp(srtt +
/// 4*rttde, RTT_MIN, RTT_MAX)`.
pub struct RttEstimator {
    srtt: Option<Duration>,
    rttde: Duration,
}

impl RttEstimator {
    pub fn new() -> Self {
        RttEstimator {
            srtt: None,
            rttde: Duration::ZERO,
        }
    }

    /// Folds in one RTT sample. Samples taken during a retransmission must
    /// be discarded by the caller (Karn's algorithm) before calling this.
    pub fn sample(&mut self, rtt: Duration) {
        match self.srtt {
            None => {
                self.srtt = Some(rtt);
                self.rttde = rtt / 2;
            }
            Some(srtt) => {
                let delta = rtt.as_secs_f64() - srtt.as_secs_f64();
                let new_srtt = srtt.as_secs_f64() + delta / 8.0;
                let new_rttde = self.rttde.as_secs_f64() + (delta.abs() - self.rttde.as_secs_f64()) / 4.0;
                self.srtt = Some(Duration::from_secs_f64(new_srtt.max(0.0)));
                self.rttde = Duration::from_secs_f64(new_rttde.max(0.0));
            }
        }
    }

    pub fn rto(&self) -> Duration {
        let srtt = self.srtt.unwrap_or(RTT_MIN);
        let candidate = srtt + self.rttde * 4;
        candidate.clamp(RTT_MIN, rtt_max())
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Retransmit-timeout backoff state: doubles on each timeout (capped), and
/// tracks whether the connection should give up with `ETIMEDOUT`.
pub struct RetransmitTimer {
    pub current: Duration,
    pub rxmit_count: u32,
    is_syn: bool,
    elapsed: Duration,
}

impl RetransmitTimer {
    pub fn new(rto: Duration, is_syn: bool) -> Self {
        RetransmitTimer {
            current: rto,
            rxmit_count: 0,
            is_syn,
            elapsed: Duration::ZERO,
        }
    }

    /// Call on each timeout. Returns `false` once R2 has been exceeded,
    /// meaning the caller should abort the connection with `ETIMEDOUT`.
    pub fn on_timeout(&mut self) -> bool {
        self.rxmit_count += 1;
        self.elapsed += self.current;
        self.current = (self.current * 2).min(rtt_max());
        let r2 = if self.is_syn { R2_SYN } else { R2_ESTABLISHED };
        self.elapsed < r2
    }

    pub fn should_fall_back_mss(&self) -> bool {
        !self.is_syn && self.rxmit_count >= PMTUD_BACKOFF
    }

    pub fn reset(&mut self, rto: Duration) {
        self.current = rto;
        self.rxmit_count = 0;
        self.elapsed = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rto_is_clamped_to_rtt_min_before_any_sample() {
        let e = RttEstimator::new();
        assert_eq!(e.rto(), RTT_MIN);
    }

    #[test]
    fn rto_widens_as_variance_grows() {
        let mut e = RttEstimator::new();
        e.sample(Duration::from_millis(100));
        let first = e.rto();
        e.sample(Duration::from_millis(900));
        assert!(e.rto() > first);
    }

    #[test]
    fn retransmit_timer_doubles_and_caps_at_rtt_max() {
        let mut t = RetransmitTimer::new(Duration::from_secs(1), false);
        for _ in 0..20 {
            t.on_timeout();
        }
        assert!(t.current <= rtt_max());
    }

    #[test]
    fn established_connection_gives_up_after_r2() {
        let mut t = RetransmitTimer::new(Duration::from_secs(1), false);
        let mut alive = true;
        for _ in 0..40 {
            alive = t.on_timeout();
            if !alive {
                break;
            }
        }
        assert!(!alive);
    }

    #[test]
    fn pmtud_backoff_trips_after_seven_timeouts_when_established() {
        let mut t = RetransmitTimer::new(Duration::from_secs(1), false);
        for _ in 0..PMTUD_BACKOFF {
            t.on_timeout();
        }
        assert!(t.should_fall_back_mss());
    }
}
