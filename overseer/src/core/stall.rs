//! Planning-dwell stall detection.
//!
//! The remote agent cannot report that its planner has hung. A dwell in
//! `planning` longer than the threshold is flagged as stuck. The flag is
//! advisory: it never alters the remote process.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::types::AgentStatus;

pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(30);

/// Debounced one-shot timer over consecutive `planning` observations.
#[derive(Debug, Clone)]
pub struct StallDetector {
    threshold: Duration,
    /// Deadline of the current planning dwell; `None` outside a dwell or once fired.
    deadline: Option<Instant>,
    in_dwell: bool,
    stuck: bool,
}

impl StallDetector {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            deadline: None,
            in_dwell: false,
            stuck: false,
        }
    }

    /// Feed the latest observed status.
    ///
    /// Entering `planning` arms the timer (unless already dwelling); any other
    /// status cancels it and clears the flag. Returns true when `is_stuck` changed.
    pub fn observe(&mut self, status: &AgentStatus, now: Instant) -> bool {
        if *status != AgentStatus::Planning {
            let was_stuck = self.stuck;
            self.reset();
            return was_stuck;
        }

        if !self.in_dwell {
            self.in_dwell = true;
            self.deadline = Some(now + self.threshold);
            return false;
        }

        // A late poll may observe the dwell past its deadline before the timer is serviced.
        self.fire(now)
    }

    /// Timer callback. Sets the flag if the dwell deadline has passed.
    ///
    /// Returns true only on the transition to stuck, so it fires at most once per dwell.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.stuck = true;
                true
            }
            _ => false,
        }
    }

    /// Pending deadline the driver should sleep until, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_stuck(&self) -> bool {
        self.stuck
    }

    pub fn reset(&mut self) {
        self.deadline = None;
        self.in_dwell = false;
        self.stuck = false;
    }
}

impl Default for StallDetector {
    fn default() -> Self {
        Self::new(DEFAULT_STALL_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn continuous_planning_flags_stuck_once_at_threshold() {
        let start = Instant::now();
        let mut detector = StallDetector::default();

        assert!(!detector.observe(&AgentStatus::Planning, start));
        assert_eq!(detector.deadline(), Some(start + secs(30)));

        let mut transitions = 0;
        for elapsed in [2, 10, 29] {
            if detector.observe(&AgentStatus::Planning, start + secs(elapsed)) {
                transitions += 1;
            }
        }
        assert_eq!(transitions, 0);
        assert!(!detector.is_stuck());
        assert!(!detector.fire(start + secs(29)));

        assert!(detector.fire(start + secs(30)));
        assert!(detector.is_stuck());

        for elapsed in [31, 40, 90] {
            assert!(!detector.observe(&AgentStatus::Planning, start + secs(elapsed)));
            assert!(!detector.fire(start + secs(elapsed)));
        }
        assert!(detector.is_stuck());
        assert_eq!(detector.deadline(), None);
    }

    #[test]
    fn late_poll_past_deadline_flags_without_timer() {
        let start = Instant::now();
        let mut detector = StallDetector::default();
        detector.observe(&AgentStatus::Planning, start);
        assert!(detector.observe(&AgentStatus::Planning, start + secs(45)));
        assert!(detector.is_stuck());
    }

    #[test]
    fn leaving_planning_clears_immediately() {
        let start = Instant::now();
        let mut detector = StallDetector::default();
        detector.observe(&AgentStatus::Planning, start);
        detector.fire(start + secs(31));
        assert!(detector.is_stuck());

        assert!(detector.observe(&AgentStatus::Other("executing_plan".into()), start + secs(32)));
        assert!(!detector.is_stuck());
        assert_eq!(detector.deadline(), None);
    }

    #[test]
    fn leaving_before_deadline_cancels_timer() {
        let start = Instant::now();
        let mut detector = StallDetector::default();
        detector.observe(&AgentStatus::Planning, start);
        assert!(!detector.observe(&AgentStatus::Idle, start + secs(5)));
        assert!(!detector.fire(start + secs(60)));
        assert!(!detector.is_stuck());
    }

    #[test]
    fn reentering_planning_restarts_dwell_from_zero() {
        let start = Instant::now();
        let mut detector = StallDetector::default();
        detector.observe(&AgentStatus::Planning, start);
        detector.observe(&AgentStatus::Other("executing_plan".into()), start + secs(20));
        detector.observe(&AgentStatus::Planning, start + secs(25));

        assert!(!detector.fire(start + secs(50)));
        assert_eq!(detector.deadline(), Some(start + secs(55)));
        assert!(detector.fire(start + secs(55)));
    }

    #[test]
    fn quota_exceeded_forces_flag_off() {
        let start = Instant::now();
        let mut detector = StallDetector::default();
        detector.observe(&AgentStatus::Planning, start);
        detector.fire(start + secs(30));
        detector.observe(&AgentStatus::QuotaExceeded, start + secs(31));
        assert!(!detector.is_stuck());
    }
}
