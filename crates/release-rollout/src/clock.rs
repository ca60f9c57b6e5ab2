use jiff::Timestamp;

/// Supplies the current point in time.
///
/// The controller never reads the wall clock directly, which keeps every cycle deterministic in
/// tests.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// A [`Clock`] backed by the system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A [`Clock`] which always returns the same point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
