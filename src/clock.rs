/// Injectable time source, so Retry-After arithmetic and renewal windows
/// are testable against a virtual clock.
use jiff::Timestamp;
use std::sync::Mutex;

/// A source of the current instant
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current instant
    fn now(&self) -> Timestamp;
}

/// The wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to. For tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a manual clock frozen at the given instant
    pub fn new(now: Timestamp) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Move the clock to the given instant
    pub fn set(&self, now: Timestamp) {
        *self.now.lock().expect("clock poisoned") = now;
    }

    /// Advance the clock by the given number of seconds
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().expect("clock poisoned");
        *now = now
            .checked_add(jiff::SignedDuration::from_secs(secs))
            .expect("clock overflow");
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().expect("clock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(Timestamp::UNIX_EPOCH);
        assert_eq!(clock.now(), Timestamp::UNIX_EPOCH);
        clock.advance_secs(90);
        assert_eq!(clock.now().as_second(), 90);
    }
}
