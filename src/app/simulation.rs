use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::domain::simulator::{
    ChargingState, SessionSimulator, SimulationProfile, SimulationSnapshot, SimulatorError,
};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("simulation registry lock poisoned")]
    LockPoisoned,
    #[error("no simulation for charger {0}")]
    UnknownCharger(String),
    #[error(transparent)]
    Simulator(#[from] SimulatorError),
}

/// Live charging figures per charger, advanced by one shared ticker.
pub struct SimulationRegistry {
    profile: SimulationProfile,
    simulators: Mutex<HashMap<String, SessionSimulator>>,
    rng: Mutex<StdRng>,
}

impl SimulationRegistry {
    pub fn new(profile: SimulationProfile) -> Self {
        Self::with_rng(profile, StdRng::from_entropy())
    }

    pub fn with_rng(profile: SimulationProfile, rng: StdRng) -> Self {
        Self {
            profile,
            simulators: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Starts the charger's simulation, restarting it if it was still charging.
    pub fn start(&self, charger_id: &str) -> Result<SimulationSnapshot, SimulationError> {
        let mut simulators = self
            .simulators
            .lock()
            .map_err(|_| SimulationError::LockPoisoned)?;
        let mut rng = self.rng.lock().map_err(|_| SimulationError::LockPoisoned)?;

        let simulator = simulators
            .entry(charger_id.to_string())
            .or_insert_with(|| SessionSimulator::new(self.profile));
        if simulator.state() == ChargingState::Charging {
            simulator.stop()?;
        }
        simulator.start(&mut *rng)?;

        let snapshot = simulator.snapshot();
        tracing::info!(charger_id, power = snapshot.power, "charging simulation started");
        Ok(snapshot)
    }

    pub fn stop(&self, charger_id: &str) -> Result<SimulationSnapshot, SimulationError> {
        self.leave_charging(charger_id, SessionSimulator::stop)
    }

    pub fn fail(&self, charger_id: &str) -> Result<SimulationSnapshot, SimulationError> {
        self.leave_charging(charger_id, SessionSimulator::fail)
    }

    pub fn snapshot(&self, charger_id: &str) -> Option<SimulationSnapshot> {
        let simulators = self.simulators.lock().ok()?;
        simulators.get(charger_id).map(SessionSimulator::snapshot)
    }

    /// Advances every charging simulation by one second; returns how many moved.
    pub fn tick_all(&self) -> Result<usize, SimulationError> {
        let mut simulators = self
            .simulators
            .lock()
            .map_err(|_| SimulationError::LockPoisoned)?;
        let mut rng = self.rng.lock().map_err(|_| SimulationError::LockPoisoned)?;

        let mut advanced = 0;
        for simulator in simulators.values_mut() {
            if simulator.tick(&mut *rng) {
                advanced += 1;
            }
        }
        Ok(advanced)
    }

    fn leave_charging(
        &self,
        charger_id: &str,
        transition: fn(&mut SessionSimulator) -> Result<(), SimulatorError>,
    ) -> Result<SimulationSnapshot, SimulationError> {
        let mut simulators = self
            .simulators
            .lock()
            .map_err(|_| SimulationError::LockPoisoned)?;
        let simulator = simulators
            .get_mut(charger_id)
            .ok_or_else(|| SimulationError::UnknownCharger(charger_id.to_string()))?;

        transition(simulator)?;
        let snapshot = simulator.snapshot();
        tracing::info!(
            charger_id,
            status = ?snapshot.status,
            energy_kwh = snapshot.energy_kwh,
            amount_paid = snapshot.amount_paid,
            "charging simulation ended"
        );
        Ok(snapshot)
    }
}

pub fn start_ticker(
    registry: Arc<SimulationRegistry>,
    tick_interval: Duration,
    stop_flag: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop_flag.load(Ordering::Relaxed) {
            if let Err(error) = registry.tick_all() {
                tracing::warn!(error = %error, "simulation tick failed");
            }
            std::thread::sleep(tick_interval);
        }
        tracing::debug!("simulation ticker stopped");
    })
}
