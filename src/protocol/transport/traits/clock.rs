//! Monotonic time source. Every timeout in the node is level-triggered: it is
//! checked against `now()` on each call instead of being scheduled.
use embassy_time::Instant;

pub trait Clock {
    fn now(&self) -> Instant;
}

/// Reads the `embassy_time` driver of the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
