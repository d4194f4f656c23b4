//! Coalescing debounce timers. One concern owns one `Debounce`; repeated
//! triggers while a timer is pending are no-ops, never reschedules, so a
//! burst of input produces exactly one fire.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Debounce { delay, deadline: None }
    }

    pub fn from_millis(millis: u64) -> Self {
        Debounce::new(Duration::from_millis(millis))
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arm the timer. Returns `true` if this call armed it; `false` when a
    /// timer was already pending.
    pub fn trigger(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.delay);
        true
    }

    /// Fire and disarm if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_while_pending_is_noop() {
        let mut debounce = Debounce::from_millis(250);
        let start = Instant::now();
        assert!(debounce.trigger(start));
        // Later triggers must not push the deadline out.
        assert!(!debounce.trigger(start + Duration::from_millis(200)));
        assert!(debounce.fire_if_due(start + Duration::from_millis(250)));
        assert!(!debounce.is_pending());
    }

    #[test]
    fn test_does_not_fire_early() {
        let mut debounce = Debounce::from_millis(250);
        let start = Instant::now();
        debounce.trigger(start);
        assert!(!debounce.fire_if_due(start + Duration::from_millis(249)));
        assert!(debounce.is_pending());
    }

    #[test]
    fn test_fires_once_per_arm() {
        let mut debounce = Debounce::from_millis(10);
        let start = Instant::now();
        debounce.trigger(start);
        let later = start + Duration::from_millis(20);
        assert!(debounce.fire_if_due(later));
        assert!(!debounce.fire_if_due(later));
        // A new trigger arms a fresh timer.
        assert!(debounce.trigger(later));
    }

    #[test]
    fn test_cancel_disarms() {
        let mut debounce = Debounce::from_millis(10);
        let start = Instant::now();
        debounce.trigger(start);
        debounce.cancel();
        assert!(!debounce.fire_if_due(start + Duration::from_secs(1)));
    }
}
