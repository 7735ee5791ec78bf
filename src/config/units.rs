//! Unit types for physical quantities.
//!
//! Provides type-safe representations of lengths, feedrates, accelerations
//! and step counts, plus the fixed four-axis layout (X, Y, Z, E) every
//! per-axis table in the planner is indexed by.

use core::fmt;
use core::ops::{Add, Index, IndexMut, Mul, Sub};

use serde::Deserialize;

/// Number of planner axes.
pub const AXIS_COUNT: usize = 4;

/// A planner axis. `E` is the extruder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// X carriage
    X,
    /// Y carriage
    Y,
    /// Z carriage
    Z,
    /// Extruder
    E,
}

impl Axis {
    /// All axes in index order.
    pub const ALL: [Axis; AXIS_COUNT] = [Axis::X, Axis::Y, Axis::Z, Axis::E];

    /// Cartesian axes only.
    pub const XYZ: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Array index of this axis.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bit of this axis in a direction or axis mask.
    #[inline]
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::E => "E",
        };
        f.write_str(name)
    }
}

/// A value per axis, indexed by [`Axis`].
///
/// Deserialises from a table with `x`, `y`, `z` and `e` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(from = "NamedAxes<T>")]
pub struct AxisArray<T>(pub [T; AXIS_COUNT]);

impl<T: Copy> AxisArray<T> {
    /// Same value on every axis.
    #[inline]
    pub const fn splat(value: T) -> Self {
        Self([value; AXIS_COUNT])
    }

    /// Build from per-axis values.
    #[inline]
    pub const fn new(x: T, y: T, z: T, e: T) -> Self {
        Self([x, y, z, e])
    }

    /// Apply `f` to every axis.
    pub fn map<U, F: FnMut(Axis, T) -> U>(self, mut f: F) -> AxisArray<U> {
        AxisArray([
            f(Axis::X, self.0[0]),
            f(Axis::Y, self.0[1]),
            f(Axis::Z, self.0[2]),
            f(Axis::E, self.0[3]),
        ])
    }

    /// Iterate `(axis, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, T)> + '_ {
        Axis::ALL.iter().map(move |&axis| (axis, self.0[axis.index()]))
    }
}

impl<T> Index<Axis> for AxisArray<T> {
    type Output = T;

    #[inline]
    fn index(&self, axis: Axis) -> &T {
        &self.0[axis.index()]
    }
}

impl<T> IndexMut<Axis> for AxisArray<T> {
    #[inline]
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        &mut self.0[axis.index()]
    }
}

#[derive(Deserialize)]
struct NamedAxes<T> {
    x: T,
    y: T,
    z: T,
    e: T,
}

impl<T> From<NamedAxes<T>> for AxisArray<T> {
    fn from(n: NamedAxes<T>) -> Self {
        Self([n.x, n.y, n.z, n.e])
    }
}

/// Position or length in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(transparent)]
pub struct Millimeters(pub f32);

impl Millimeters {
    /// Create a new Millimeters value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> f32 {
        self.0
    }
}

impl Add for Millimeters {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Millimeters {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Feedrate in millimeters per second.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(transparent)]
pub struct MmPerSec(pub f32);

impl MmPerSec {
    /// Create a new MmPerSec value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> f32 {
        self.0
    }

    /// Convert a G-code style mm/min feedrate.
    #[inline]
    pub fn from_mm_per_min(value: f32) -> Self {
        Self(value / 60.0)
    }
}

impl Mul<f32> for MmPerSec {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self(self.0 * rhs)
    }
}

/// Acceleration in millimeters per second squared.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(transparent)]
pub struct MmPerSecSquared(pub f32);

impl MmPerSecSquared {
    /// Create a new MmPerSecSquared value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> f32 {
        self.0
    }
}

impl Mul<f32> for MmPerSecSquared {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self(self.0 * rhs)
    }
}

/// Axis position in steps (absolute from the machine origin).
///
/// The step counters shared with the step generator are 32-bit, so positions
/// are `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Steps(pub i32);

impl Steps {
    /// Create a new Steps value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Get absolute value as u32.
    #[inline]
    pub fn abs(self) -> u32 {
        self.0.unsigned_abs()
    }

    /// Convert to millimeters using a mm-per-step ratio.
    #[inline]
    pub fn to_mm(self, mm_per_step: f32) -> Millimeters {
        Millimeters(self.0 as f32 * mm_per_step)
    }

    /// Create from millimeters, rounding to the nearest step.
    ///
    /// Returns `None` when the result does not fit in the step counter.
    #[inline]
    pub fn from_mm(mm: Millimeters, steps_per_mm: f32) -> Option<Self> {
        let steps = libm::roundf(mm.0 * steps_per_mm);
        if steps.is_finite() && steps >= i32::MIN as f32 && steps < i32::MAX as f32 {
            Some(Self(steps as i32))
        } else {
            None
        }
    }
}

impl Add for Steps {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for Steps {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

/// Extension trait for creating unit types from primitives.
pub trait UnitExt {
    /// Convert to Millimeters.
    fn mm(self) -> Millimeters;
    /// Convert to MmPerSec.
    fn mm_per_sec(self) -> MmPerSec;
    /// Convert to MmPerSecSquared.
    fn mm_per_sec_squared(self) -> MmPerSecSquared;
}

impl UnitExt for f32 {
    #[inline]
    fn mm(self) -> Millimeters {
        Millimeters(self)
    }

    #[inline]
    fn mm_per_sec(self) -> MmPerSec {
        MmPerSec(self)
    }

    #[inline]
    fn mm_per_sec_squared(self) -> MmPerSecSquared {
        MmPerSecSquared(self)
    }
}
