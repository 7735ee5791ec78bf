//! The motion planner.
//!
//! [`Planner`] owns the producer end of a [`BlockQueue`] and is the only
//! way moves get into it. Every admitted move is turned into a block,
//! committed, and followed by a lookahead pass over the unsettled part of
//! the queue.
//!
//! [`BlockQueue`]: crate::queue::BlockQueue

mod drain;
mod idle;
mod ingest;
mod lookahead;
mod position;

pub use drain::QueueState;
pub use idle::{DelayIdle, Idle};
pub use ingest::{ExtruderState, MoveHints, Placement};
pub use position::Position;

use heapless::String;

use crate::config::units::{Axis, AxisArray};
use crate::config::{
    validate_config, validate_settings, AxisScaling, JunctionStrategy, MotionParameters, PlannerConfig,
    PlannerSettings, StealthLimits, UserSettings,
};
use crate::error::{ConfigError, Error, PlannerError, Result};
use crate::motion::{JunctionLimit, JunctionPlanner};
use crate::queue::{BlockQueue, Producer};

/// Planner constants fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlannerOptions {
    /// Moves with fewer step events are coalesced into the next one.
    pub min_segment_steps: u32,
    /// Speed every block may enter and leave at, mm/s.
    pub minimum_planner_speed: f32,
    /// Step generator timer frequency, Hz.
    pub step_timer_hz: u32,
    /// Longest single extrusion accepted, mm.
    pub max_extrude_length_mm: f32,
    /// Accept E moves while the hotend is too cold.
    pub allow_cold_extrusion: bool,
}

impl PlannerOptions {
    /// Extract the options from a configuration.
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            min_segment_steps: config.motion.min_segment_steps,
            minimum_planner_speed: config.motion.minimum_planner_speed.value(),
            step_timer_hz: config.motion.step_timer_hz,
            max_extrude_length_mm: config.extrusion.max_length_mm,
            allow_cold_extrusion: config.extrusion.allow_cold_extrusion,
        }
    }
}

/// The motion planner: producer side of the block queue.
///
/// `I` is the hook called while the planner waits for the step generator,
/// `N` the queue capacity.
pub struct Planner<'q, I: Idle, const N: usize> {
    producer: Producer<'q, N>,
    idle: I,
    name: String<32>,
    /// Limits as requested.
    user: UserSettings,
    /// Limits as planned with.
    settings: PlannerSettings,
    stealth: StealthLimits,
    stealth_mode: bool,
    scaling: AxisScaling,
    junction: JunctionPlanner,
    options: PlannerOptions,
    position: Position,
    /// Position forced while draining, to be pushed to the step
    /// generator on resume.
    position_override: bool,
}

impl<'q, I: Idle, const N: usize> Planner<'q, I, N> {
    /// Create a planner on a freshly split queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(producer: Producer<'q, N>, config: &PlannerConfig, idle: I) -> Result<Self> {
        validate_config(config)?;

        let user = config.user_settings();
        let settings = user.working_table(None);
        let planner = Self {
            producer,
            idle,
            name: config.name.clone(),
            user,
            settings,
            stealth: config.stealth,
            stealth_mode: false,
            scaling: AxisScaling::from_settings(&settings),
            junction: JunctionPlanner::new(config.junction.strategy),
            options: PlannerOptions::from_config(config),
            position: Position::default(),
            position_override: false,
        };

        info!(
            "planner {=str} ready, {} slots, {}",
            planner.name.as_str(),
            N,
            planner.junction.strategy()
        );
        Ok(planner)
    }

    /// Start building a planner.
    pub fn builder() -> PlannerBuilder<I> {
        PlannerBuilder::new()
    }

    /// Machine name from the configuration.
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// The shared queue.
    #[inline]
    pub fn queue(&self) -> &'q BlockQueue<N> {
        self.producer.queue()
    }

    /// Limits as requested by the user.
    #[inline]
    pub fn user_settings(&self) -> &UserSettings {
        &self.user
    }

    /// Limits the planner plans with (stealth caps applied).
    #[inline]
    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Conversion constants derived from the working table.
    #[inline]
    pub fn scaling(&self) -> &AxisScaling {
        &self.scaling
    }

    /// Construction-time constants.
    #[inline]
    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// Cornering model in use.
    #[inline]
    pub fn junction_strategy(&self) -> JunctionStrategy {
        self.junction.strategy()
    }

    /// Replace the user limit table.
    ///
    /// The working table is re-derived from it (with stealth caps when
    /// stealth mode is on). If the calibration changed, the tracked
    /// position is re-anchored at the same millimeter position.
    ///
    /// # Errors
    ///
    /// Rejects a table that does not validate, or a calibration under which
    /// the current position no longer fits in the step range. The previous
    /// settings stay in force.
    pub fn apply_settings(&mut self, user: UserSettings) -> Result<()> {
        validate_settings(user.settings())?;

        let settings = user.working_table(self.stealth_mode.then_some(&self.stealth));
        let scaling = AxisScaling::from_settings(&settings);
        let rescaled = scaling.steps_per_mm != self.scaling.steps_per_mm;
        let anchor = if rescaled {
            Some(scaling.position_to_steps(self.position.mm())?)
        } else {
            None
        };

        self.user = user;
        self.settings = settings;
        self.scaling = scaling;
        if let Some(steps) = anchor {
            let mm = *self.position.mm();
            self.anchor_position(steps, mm);
        }

        debug!("settings applied, stealth {}, rescaled {}", self.stealth_mode, rescaled);
        Ok(())
    }

    /// Switch reduced-noise mode, capping or uncapping the working table.
    pub fn set_stealth_mode(&mut self, enabled: bool) {
        if self.stealth_mode == enabled {
            return;
        }
        self.stealth_mode = enabled;
        // Calibration is untouched, so only the limits change.
        self.settings = self.user.working_table(enabled.then_some(&self.stealth));
        self.scaling = AxisScaling::from_settings(&self.settings);
        debug!("stealth mode {}", enabled);
    }

    /// Reduced-noise mode is on.
    #[inline]
    pub fn is_stealth_mode(&self) -> bool {
        self.stealth_mode
    }

    /// Set the acceleration ceiling of one axis, mm/s².
    pub fn set_max_acceleration(&mut self, axis: Axis, value: f32) -> Result<()> {
        if !(value.is_finite() && value > 0.0) {
            return Err(PlannerError::InvalidAxisValue { axis, value }.into());
        }
        let mut user = self.user;
        user.settings_mut().max_acceleration_mm_s2[axis] = value;
        self.apply_settings(user)
    }

    /// Set the feedrate ceiling of one axis, mm/s.
    pub fn set_max_feedrate(&mut self, axis: Axis, value: f32) -> Result<()> {
        if !(value.is_finite() && value > 0.0) {
            return Err(PlannerError::InvalidAxisValue { axis, value }.into());
        }
        let mut user = self.user;
        user.settings_mut().max_feedrate_mm_s[axis] = value;
        self.apply_settings(user)
    }

    /// Set the jerk of one axis, mm/s. Zero is allowed.
    pub fn set_max_jerk(&mut self, axis: Axis, value: f32) -> Result<()> {
        if !(value.is_finite() && value >= 0.0) {
            return Err(PlannerError::InvalidAxisValue { axis, value }.into());
        }
        let mut user = self.user;
        user.settings_mut().max_jerk_mm_s[axis] = value;
        self.apply_settings(user)
    }

    /// Set the junction deviation, mm.
    pub fn set_junction_deviation(&mut self, deviation_mm: f32) -> Result<()> {
        if !(deviation_mm.is_finite() && deviation_mm > 0.0) {
            return Err(ConfigError::InvalidJunctionDeviation(deviation_mm).into());
        }
        let mut user = self.user;
        user.settings_mut().junction_deviation_mm = deviation_mm;
        self.apply_settings(user)
    }

    /// Snapshot of the requested limits, calibration excluded.
    pub fn motion_parameters(&self) -> MotionParameters {
        MotionParameters::from_settings(self.user.settings())
    }

    /// Restore limits saved with [`motion_parameters`](Self::motion_parameters).
    pub fn restore_motion_parameters(&mut self, parameters: &MotionParameters) -> Result<()> {
        let mut user = self.user;
        parameters.apply_to(user.settings_mut());
        self.apply_settings(user)
    }

    /// Make `steps` the tracked position and tell the step generator.
    fn anchor_position(&mut self, steps: AxisArray<i32>, mm: AxisArray<f32>) {
        self.position.set(steps, mm);
        // The previous move does not lead into the next one.
        self.junction.reset();

        let queue = self.producer.queue();
        if queue.is_draining() {
            self.position_override = true;
        } else if queue.is_processing() {
            self.append_sync_block();
        } else {
            self.producer.preset_step_position(&steps);
        }
    }
}

/// Builder for [`Planner`].
pub struct PlannerBuilder<I: Idle> {
    config: PlannerConfig,
    idle: Option<I>,
    stealth_mode: bool,
    position_mm: Option<AxisArray<f32>>,
}

impl<I: Idle> Default for PlannerBuilder<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Idle> PlannerBuilder<I> {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: PlannerConfig::default(),
            idle: None,
            stealth_mode: false,
            position_mm: None,
        }
    }

    /// Use `config` instead of the defaults.
    pub fn from_config(mut self, config: &PlannerConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Set the wait hook.
    pub fn idle(mut self, idle: I) -> Self {
        self.idle = Some(idle);
        self
    }

    /// Start in reduced-noise mode.
    pub fn stealth_mode(mut self, enabled: bool) -> Self {
        self.stealth_mode = enabled;
        self
    }

    /// Start at a machine position instead of the origin.
    pub fn position_mm(mut self, position: AxisArray<f32>) -> Self {
        self.position_mm = Some(position);
        self
    }

    /// Set the cornering model.
    pub fn junction_strategy(mut self, strategy: JunctionStrategy) -> Self {
        self.config.junction.strategy = strategy;
        self
    }

    /// Build the planner on `producer`.
    ///
    /// # Errors
    ///
    /// Returns an error if no idle hook was set, the configuration does
    /// not validate, or the start position is out of range.
    pub fn build<const N: usize>(self, producer: Producer<'_, N>) -> Result<Planner<'_, I, N>> {
        let idle = self.idle.ok_or_else(|| {
            Error::Config(ConfigError::ParseError(
                String::try_from("idle hook is required").unwrap_or_default(),
            ))
        })?;

        let mut planner = Planner::new(producer, &self.config, idle)?;
        planner.set_stealth_mode(self.stealth_mode);
        if let Some(position) = self.position_mm {
            planner.set_machine_position(&position)?;
        }
        Ok(planner)
    }
}
