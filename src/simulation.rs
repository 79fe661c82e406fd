//! Synthetic live-telemetry jitter
//!
//! Nudges the selected vessel's readings between backend polls so gauges
//! move. The values produced here are never sent back to the backend.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{config::SimulationConfig, models::Vessel};

pub struct JitterSimulator<R = StdRng> {
    speed_delta: f64,
    rpm_delta: f64,
    fuel_delta: f64,
    rng: R,
}

impl JitterSimulator<StdRng> {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    pub fn seeded(config: &SimulationConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> JitterSimulator<R> {
    pub fn with_rng(config: &SimulationConfig, rng: R) -> Self {
        Self {
            speed_delta: config.speed_delta,
            rpm_delta: config.rpm_delta,
            fuel_delta: config.fuel_delta,
            rng,
        }
    }

    /// Largest change a single step can make to any reading
    pub fn max_step(&self) -> f64 {
        self.speed_delta.max(self.rpm_delta).max(self.fuel_delta) / 2.0
    }

    /// Perturbed copy of `vessel`
    ///
    /// Returns `None` unless speed and all three RPM channels are known.
    pub fn perturb(&mut self, vessel: &Vessel) -> Option<Vessel> {
        let speed = vessel.speed?;
        let (rpm_1, rpm_2, rpm_3) = (vessel.rpm_1?, vessel.rpm_2?, vessel.rpm_3?);

        let mut next = vessel.clone();
        next.speed = Some(speed + self.noise(self.speed_delta));
        next.rpm_1 = Some(rpm_1 + self.noise(self.rpm_delta));
        next.rpm_2 = Some(rpm_2 + self.noise(self.rpm_delta));
        next.rpm_3 = Some(rpm_3 + self.noise(self.rpm_delta));
        next.fuel_consumption = vessel.fuel_consumption + self.noise(self.fuel_delta);
        Some(next)
    }

    /// Uniform noise in `[-delta/2, delta/2]`
    fn noise(&mut self, delta: f64) -> f64 {
        if delta <= 0.0 {
            return 0.0;
        }
        let half = delta / 2.0;
        self.rng.random_range(-half..=half)
    }
}
