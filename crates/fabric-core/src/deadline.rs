use std::time::Duration;
use std::time::Instant;

/// An absolute point in time an operation must complete by, carried
/// explicitly through every async host operation (spec §5, "suspension
/// points"). Built from a relative timeout at the call site rather than
/// re-deriving "time remaining" at each await point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Deadline(Instant::now() + timeout)
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    pub fn into_instant(self) -> Instant {
        self.0
    }
}
