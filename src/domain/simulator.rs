use rand::Rng;
use serde::Serialize;
use thiserror::Error;

const SECONDS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChargingState {
    Idle,
    Charging,
    Stopped,
    Error,
}

/// Bounds of the synthetic power model. One tick is one simulated second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationProfile {
    pub seed_power_min_w: i32,
    pub seed_power_max_w: i32,
    pub walk_step_w: i32,
    pub power_floor_w: i32,
    pub power_ceiling_w: i32,
    pub rate_per_kwh: f64,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            seed_power_min_w: 1000,
            seed_power_max_w: 7000,
            walk_step_w: 100,
            power_floor_w: 500,
            power_ceiling_w: 7500,
            rate_per_kwh: 8.0,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorError {
    #[error("simulation is already charging")]
    AlreadyCharging,
    #[error("simulation is not charging")]
    NotCharging,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSnapshot {
    pub status: ChargingState,
    pub power: i32,
    pub energy_kwh: f64,
    pub amount_paid: f64,
    pub duration: u64,
    pub rate_per_kwh: f64,
}

#[derive(Debug, Clone)]
pub struct SessionSimulator {
    profile: SimulationProfile,
    state: ChargingState,
    power_w: i32,
    energy_kwh: f64,
    cost: f64,
    elapsed_secs: u64,
}

impl SessionSimulator {
    pub fn new(profile: SimulationProfile) -> Self {
        Self {
            profile,
            state: ChargingState::Idle,
            power_w: 0,
            energy_kwh: 0.0,
            cost: 0.0,
            elapsed_secs: 0,
        }
    }

    pub fn state(&self) -> ChargingState {
        self.state
    }

    /// Enters `Charging` with fresh counters and a seeded power draw.
    /// A stopped or failed simulation may be started again.
    pub fn start<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), SimulatorError> {
        if self.state == ChargingState::Charging {
            return Err(SimulatorError::AlreadyCharging);
        }

        let low = self.profile.seed_power_min_w;
        let high = self.profile.seed_power_max_w.max(low);

        self.state = ChargingState::Charging;
        self.power_w = rng.gen_range(low..=high);
        self.energy_kwh = 0.0;
        self.cost = 0.0;
        self.elapsed_secs = 0;

        Ok(())
    }

    /// Advances one simulated second. Returns false outside `Charging`.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.state != ChargingState::Charging {
            return false;
        }

        let power_kw = f64::from(self.power_w) / 1000.0;
        self.energy_kwh += power_kw * (1.0 / SECONDS_PER_HOUR);
        self.cost = self.energy_kwh * self.profile.rate_per_kwh;
        self.elapsed_secs += 1;

        let step = self.profile.walk_step_w.abs();
        let drift = rng.gen_range(-step..=step);
        self.power_w = (self.power_w + drift).clamp(
            self.profile.power_floor_w,
            self.profile.power_ceiling_w.max(self.profile.power_floor_w),
        );

        true
    }

    pub fn stop(&mut self) -> Result<(), SimulatorError> {
        self.leave_charging(ChargingState::Stopped)
    }

    pub fn fail(&mut self) -> Result<(), SimulatorError> {
        self.leave_charging(ChargingState::Error)
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            status: self.state,
            power: self.power_w,
            energy_kwh: self.energy_kwh,
            amount_paid: self.cost,
            duration: self.elapsed_secs,
            rate_per_kwh: self.profile.rate_per_kwh,
        }
    }

    fn leave_charging(&mut self, next: ChargingState) -> Result<(), SimulatorError> {
        if self.state != ChargingState::Charging {
            return Err(SimulatorError::NotCharging);
        }

        self.state = next;
        self.power_w = 0;
        Ok(())
    }
}
