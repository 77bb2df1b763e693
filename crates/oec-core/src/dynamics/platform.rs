//! Platform dynamics: one pump and two structurally identical GTGs.

use super::{GasTurbine, Pump, Stack};
use crate::config::{GtgConfig, PumpConfig};

/// `Stack(Pump, Stack(GasTurbine, GasTurbine))`: 8 states, 3 controls
pub type PlatformDynamics = Stack<Pump, Stack<GasTurbine, GasTurbine>>;

pub fn platform_dynamics(gtg: &GtgConfig, pump: &PumpConfig) -> PlatformDynamics {
    Stack::new(
        Pump::new("pump", pump),
        Stack::new(GasTurbine::new("gtg1", gtg), GasTurbine::new("gtg2", gtg)),
    )
}

impl PlatformDynamics {
    pub fn pump(&self) -> &Pump {
        self.first()
    }

    pub fn gtg1(&self) -> &GasTurbine {
        self.second().first()
    }

    pub fn gtg2(&self) -> &GasTurbine {
        self.second().second()
    }
}

/// Indices into the platform state vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformState {
    PumpPower = 0,
    PumpFlow = 1,
    Fuel1 = 2,
    Load1 = 3,
    Valve1 = 4,
    Fuel2 = 5,
    Load2 = 6,
    Valve2 = 7,
}

impl PlatformState {
    pub const COUNT: usize = 8;

    pub const fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{Dimensions, Dynamics, DynamicsSpec};

    #[test]
    fn test_platform_layout() {
        let spec = DynamicsSpec::new(platform_dynamics(&GtgConfig::default(), &PumpConfig::default())).unwrap();
        assert_eq!(spec.dimensions(), Dimensions::new(8, 3, 0));
        let names = spec.state_names();
        assert_eq!(names[PlatformState::PumpFlow.index()], "pump.flow");
        assert_eq!(names[PlatformState::Load1.index()], "gtg1.load");
        assert_eq!(names[PlatformState::Valve2.index()], "gtg2.valve");
        assert_eq!(
            spec.control_names(),
            vec!["pump.power_rate", "gtg1.valve_rate", "gtg2.valve_rate"]
        );
    }

    #[test]
    fn test_gtg_blocks_are_independent() {
        let model = platform_dynamics(&GtgConfig::default(), &PumpConfig::default());
        let x = [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let dx = model.derivative(&x, &[0.0, 0.0, 0.0], &[]);
        // only gtg1's fuel responds to its open valve
        assert_eq!(dx[PlatformState::Fuel1.index()], 2.0);
        assert_eq!(dx[PlatformState::Fuel2.index()], 0.0);
        assert_eq!(model.gtg1().name(), "gtg1");
        assert_eq!(model.pump().name(), "pump");
    }
}
