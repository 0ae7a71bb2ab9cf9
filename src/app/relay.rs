use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::adapters::command_cache::{CachedCommand, CommandCache};
use crate::app::services::{PersistenceGateway, ServiceError};
use crate::app::simulation::{SimulationError, SimulationRegistry};
use crate::domain::clock::Clock;
use crate::domain::models::{
    Command, CommandKind, LogLevel, NewChargingSession, NewCommand, SessionStatus, SessionUpdate,
};
use crate::domain::simulator::SimulatorError;

const SIMPLE_COMMAND_KEY: &str = "latest";
const RELAY_SOURCE: &str = "api";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Missing required fields: command, chargerId, stationName")]
    MissingFields,
    #[error("Invalid command.")]
    InvalidCommand(String),
    #[error("command persistence failed: {0}")]
    Persistence(#[from] ServiceError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandIntent {
    pub command: Option<String>,
    pub charger_id: Option<String>,
    pub station_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedCommand {
    pub command_id: String,
    pub command: CommandKind,
    pub charger_id: String,
    pub station_name: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayedCommand {
    Persisted(Command),
    Cached {
        charger_id: String,
        entry: CachedCommand,
    },
}

#[derive(Clone)]
pub struct CommandRelay {
    gateway: Arc<dyn PersistenceGateway>,
    cache: Arc<dyn CommandCache>,
    simple_cache: Arc<dyn CommandCache>,
    simulations: Arc<SimulationRegistry>,
    clock: Arc<dyn Clock>,
}

impl CommandRelay {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        cache: Arc<dyn CommandCache>,
        simple_cache: Arc<dyn CommandCache>,
        simulations: Arc<SimulationRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            cache,
            simple_cache,
            simulations,
            clock,
        }
    }

    /// Validates and queues a command for the charger's poller. A `start`
    /// also opens the charger's session and its live simulation.
    pub fn submit(&self, intent: CommandIntent) -> Result<AcceptedCommand, RelayError> {
        let (Some(raw_command), Some(charger_id), Some(station_name)) = (
            non_empty(intent.command),
            non_empty(intent.charger_id),
            non_empty(intent.station_name),
        ) else {
            return Err(RelayError::MissingFields);
        };
        let command: CommandKind = raw_command
            .parse()
            .map_err(|_| RelayError::InvalidCommand(raw_command.clone()))?;

        let session_id = match command {
            CommandKind::Start => Some(self.open_session(&charger_id, &station_name)?),
            _ => None,
        };

        let command_id = self.gateway.save_command(&NewCommand {
            command_id: uuid::Uuid::new_v4().to_string(),
            charger_id: charger_id.clone(),
            station_name: station_name.clone(),
            command,
        })?;

        self.cache.put(
            &charger_id,
            CachedCommand {
                command_id: Some(command_id.clone()),
                command,
                station_name: station_name.clone(),
                stored_at: self.clock.now(),
            },
        );

        match command {
            CommandKind::Start => {
                if let Err(error) = self.simulations.start(&charger_id) {
                    tracing::warn!(charger_id = %charger_id, error = %error, "failed to start simulation");
                }
            }
            CommandKind::Stop => self.end_simulation(&charger_id),
            CommandKind::Status | CommandKind::Reset => {}
        }

        self.gateway.log_activity(
            LogLevel::Info,
            &format!("Command '{command}' sent to charger {charger_id} at {station_name}"),
            RELAY_SOURCE,
            None,
        );
        tracing::info!(
            command_id = %command_id,
            command = command.as_str(),
            charger_id = %charger_id,
            "command relayed"
        );

        Ok(AcceptedCommand {
            command_id,
            command,
            charger_id,
            station_name,
            session_id,
        })
    }

    /// Latest pending command from the store, then the cache, then nothing.
    pub fn latest(&self, charger_id: &str) -> Option<RelayedCommand> {
        if let Some(command) = self.gateway.get_latest_command(charger_id) {
            return Some(RelayedCommand::Persisted(command));
        }

        self.cache
            .get(charger_id)
            .map(|entry| RelayedCommand::Cached {
                charger_id: charger_id.to_string(),
                entry,
            })
    }

    /// Memory-only start/stop toggle used by single-charger pollers.
    pub fn submit_simple(&self, raw_command: Option<String>) -> Result<CachedCommand, RelayError> {
        let command = match raw_command.as_deref() {
            Some("start") => CommandKind::Start,
            Some("stop") => CommandKind::Stop,
            other => {
                return Err(RelayError::InvalidCommand(
                    other.unwrap_or_default().to_string(),
                ));
            }
        };

        let entry = CachedCommand {
            command_id: None,
            command,
            station_name: String::new(),
            stored_at: self.clock.now(),
        };
        self.simple_cache.put(SIMPLE_COMMAND_KEY, entry.clone());
        tracing::info!(command = command.as_str(), "simple command stored");
        Ok(entry)
    }

    pub fn latest_simple(&self) -> Option<CachedCommand> {
        self.simple_cache.get(SIMPLE_COMMAND_KEY)
    }

    fn open_session(&self, charger_id: &str, station_name: &str) -> Result<String, RelayError> {
        let current = self.gateway.get_sessions(Some(charger_id), 1).into_iter().next();
        if let Some(current) = current
            && current.status == SessionStatus::Active
        {
            self.gateway.update_session(
                &current.session_id,
                &SessionUpdate {
                    status: Some(SessionStatus::Cancelled),
                    end_time: Some(self.clock.now().to_rfc3339()),
                    ..SessionUpdate::default()
                },
            )?;
            tracing::info!(
                session_id = %current.session_id,
                charger_id,
                "cancelled previous active session"
            );
        }

        let session_id = self.gateway.create_session(&NewChargingSession {
            session_id: uuid::Uuid::new_v4().to_string(),
            charger_id: charger_id.to_string(),
            station_name: station_name.to_string(),
            user_id: None,
            status: SessionStatus::Active,
            payment_method: None,
        })?;
        Ok(session_id)
    }

    fn end_simulation(&self, charger_id: &str) {
        match self.simulations.stop(charger_id) {
            Ok(_) => {}
            Err(SimulationError::UnknownCharger(_))
            | Err(SimulationError::Simulator(SimulatorError::NotCharging)) => {
                tracing::debug!(charger_id, "stop relayed for charger that is not charging");
            }
            Err(error) => {
                tracing::warn!(charger_id, error = %error, "failed to stop simulation");
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}
