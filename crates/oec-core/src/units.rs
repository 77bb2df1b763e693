//! Unit-safe wrappers for the physical quantities shared between layers.
//!
//! The three control layers exchange powers, energies and normalized values.
//! Configuration stores absolute quantities in kW and kWh; energy balances are
//! written in per-unit of `grid.base_kw`. Every conversion between the two goes
//! through these types, and watts only appear at the pump's hydraulic formula.
//!
//! # Usage
//!
//! ```
//! use oec_core::units::{Kilowatts, PerUnit};
//!
//! let base = Kilowatts(10_000.0);
//! let gtg = Kilowatts(4_500.0);
//!
//! let pu: PerUnit = gtg.to_per_unit(base);
//! assert!((pu.value() - 0.45).abs() < 1e-12);
//! assert_eq!(pu.to_kilowatts(base), gtg);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Implements the arithmetic shared by every unit type
macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl Div<$type> for $type {
            type Output = f64;
            fn div(self, rhs: $type) -> Self::Output {
                self.0 / rhs.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Check if value is finite
            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }
    };
}

// =============================================================================
// Power and energy
// =============================================================================

/// Active power in kilowatts (kW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Kilowatts(pub f64);

impl_unit_ops!(Kilowatts, "kW");

/// Energy in kilowatt-hours (kWh)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct KilowattHours(pub f64);

impl_unit_ops!(KilowattHours, "kWh");

/// Dimensionless value normalized to a base quantity
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct PerUnit(pub f64);

impl_unit_ops!(PerUnit, "pu");

impl Kilowatts {
    /// Normalize against a base power
    #[inline]
    pub fn to_per_unit(self, base: Kilowatts) -> PerUnit {
        PerUnit(self.0 / base.0)
    }

    /// Convert to watts
    #[inline]
    pub fn to_watts(self) -> f64 {
        self.0 * 1e3
    }

    /// Build from a value in watts
    #[inline]
    pub fn from_watts(watts: f64) -> Self {
        Kilowatts(watts * 1e-3)
    }

    /// Energy delivered when held for `hours`
    #[inline]
    pub fn over_hours(self, hours: f64) -> KilowattHours {
        KilowattHours(self.0 * hours)
    }
}

impl PerUnit {
    /// Scale back to kilowatts
    #[inline]
    pub fn to_kilowatts(self, base: Kilowatts) -> Kilowatts {
        Kilowatts(self.0 * base.0)
    }

    /// Re-express a per-unit value against another base
    ///
    /// `from` is the base the value is currently expressed in.
    #[inline]
    pub fn rebase(self, from: Kilowatts, to: Kilowatts) -> PerUnit {
        PerUnit(self.0 * from.0 / to.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_unit_round_trip() {
        let base = Kilowatts(10_000.0);
        let p = Kilowatts(15_000.0);
        let pu = p.to_per_unit(base);
        assert!((pu.value() - 1.5).abs() < 1e-12);
        assert!((pu.to_kilowatts(base).value() - 15_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_rebase_between_platform_and_grid_bases() {
        // 0.5 pu of the 15 MW delivery cap is 0.75 pu of the 10 MW grid base
        let delivered = PerUnit(0.5);
        let rebased = delivered.rebase(Kilowatts(15_000.0), Kilowatts(10_000.0));
        assert!((rebased.value() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_watts_conversion() {
        let p = Kilowatts::from_watts(15_000_000.0);
        assert_eq!(p, Kilowatts(15_000.0));
        assert_eq!(p.to_watts(), 15_000_000.0);
    }

    #[test]
    fn test_energy_over_hours() {
        let e = Kilowatts(2_000.0).over_hours(0.5);
        assert_eq!(e, KilowattHours(1_000.0));
        assert_eq!(format!("{}", e), "1000.0000 kWh");
    }

    #[test]
    fn test_ratio_is_dimensionless() {
        let ratio = Kilowatts(4_500.0) / Kilowatts(9_000.0);
        assert!((ratio - 0.5).abs() < 1e-12);
    }
}
