//! STEP/DIR output for step pulses.
//!
//! Generic over embedded-hal 1.0 pin and delay types.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::config::units::{Axis, AXIS_COUNT};
use crate::error::{PlannerError, Result};
use crate::motion::{Direction, StepPulse};

/// Default STEP pulse width, ns. Most drivers need 1 to 2 µs.
const DEFAULT_PULSE_WIDTH_NS: u32 = 2_000;

/// STEP and DIR pins of one axis.
pub struct AxisPins<STEP, DIR>
where
    STEP: OutputPin,
    DIR: OutputPin,
{
    /// STEP pin (pulse to move one step).
    step: STEP,
    /// DIR pin (high = positive, unless inverted).
    dir: DIR,
    /// Whether direction pin logic is inverted.
    invert_direction: bool,
}

impl<STEP, DIR> AxisPins<STEP, DIR>
where
    STEP: OutputPin,
    DIR: OutputPin,
{
    /// Pair a STEP and a DIR pin.
    pub fn new(step: STEP, dir: DIR) -> Self {
        Self {
            step,
            dir,
            invert_direction: false,
        }
    }

    /// Invert the DIR pin logic.
    pub fn inverted(mut self, invert: bool) -> Self {
        self.invert_direction = invert;
        self
    }

    /// Release the pins.
    pub fn into_inner(self) -> (STEP, DIR) {
        (self.step, self.dir)
    }

    fn set_direction(&mut self, direction: Direction) -> core::result::Result<(), ()> {
        let high = (direction == Direction::Positive) != self.invert_direction;
        if high {
            self.dir.set_high().map_err(|_| ())
        } else {
            self.dir.set_low().map_err(|_| ())
        }
    }
}

/// Drives the STEP/DIR pins of every axis from [`StepPulse`]s.
///
/// Timing between pulses belongs to the caller (normally the step timer,
/// reloaded with [`StepPulse::interval_ticks`]); only the STEP pulse width
/// is produced here.
pub struct StepPins<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    axes: [AxisPins<STEP, DIR>; AXIS_COUNT],
    delay: DELAY,
    pulse_width_ns: u32,
    /// Direction bits last written (cached to avoid unnecessary pin writes).
    direction_bits: Option<u8>,
}

impl<STEP, DIR, DELAY> StepPins<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    /// Take the pins of X, Y, Z and E, in that order.
    pub fn new(axes: [AxisPins<STEP, DIR>; AXIS_COUNT], delay: DELAY) -> Self {
        Self {
            axes,
            delay,
            pulse_width_ns: DEFAULT_PULSE_WIDTH_NS,
            direction_bits: None,
        }
    }

    /// Set the STEP pulse width.
    pub fn with_pulse_width_ns(mut self, pulse_width_ns: u32) -> Self {
        self.pulse_width_ns = pulse_width_ns;
        self
    }

    /// Release the pins and the delay.
    pub fn into_inner(self) -> ([AxisPins<STEP, DIR>; AXIS_COUNT], DELAY) {
        (self.axes, self.delay)
    }

    /// Output one pulse: update DIR pins whose direction changed, then raise
    /// and lower the STEP pins of the stepping axes.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::PinError`] for the first pin that fails.
    pub fn output(&mut self, pulse: &StepPulse) -> Result<()> {
        if self.direction_bits != Some(pulse.direction_bits) {
            for axis in Axis::ALL {
                let changed = self
                    .direction_bits
                    .map_or(true, |bits| (bits ^ pulse.direction_bits) & axis.bit() != 0);
                if changed {
                    self.axes[axis.index()]
                        .set_direction(Direction::from_bits(pulse.direction_bits, axis))
                        .map_err(|_| PlannerError::PinError { axis })?;
                }
            }
            self.direction_bits = Some(pulse.direction_bits);
        }

        if pulse.axes == 0 {
            return Ok(());
        }

        for axis in Axis::ALL {
            if pulse.steps(axis) {
                self.axes[axis.index()]
                    .step
                    .set_high()
                    .map_err(|_| PlannerError::PinError { axis })?;
            }
        }

        self.delay.delay_ns(self.pulse_width_ns);

        for axis in Axis::ALL {
            if pulse.steps(axis) {
                self.axes[axis.index()]
                    .step
                    .set_low()
                    .map_err(|_| PlannerError::PinError { axis })?;
            }
        }
        Ok(())
    }
}
