//! Cooperative wait hook.
//!
//! The planner never blocks on its own: whenever it has to wait for the
//! step generator (queue full, stop being acknowledged, queue running
//! empty) it calls [`Idle::idle`] in a loop and re-checks.

use embedded_hal::delay::DelayNs;

/// Called by the planner while it waits for the step generator.
pub trait Idle {
    /// Give the rest of the system a chance to run.
    fn idle(&mut self);
}

impl<F: FnMut()> Idle for F {
    #[inline]
    fn idle(&mut self) {
        self()
    }
}

/// Waits by sleeping on an `embedded-hal` delay provider.
pub struct DelayIdle<D: DelayNs> {
    delay: D,
    period_us: u32,
}

impl<D: DelayNs> DelayIdle<D> {
    /// Sleep `period_us` microseconds per idle call.
    pub fn new(delay: D, period_us: u32) -> Self {
        Self { delay, period_us }
    }

    /// Release the delay provider.
    pub fn into_inner(self) -> D {
        self.delay
    }
}

impl<D: DelayNs> Idle for DelayIdle<D> {
    #[inline]
    fn idle(&mut self) {
        self.delay.delay_us(self.period_us);
    }
}
