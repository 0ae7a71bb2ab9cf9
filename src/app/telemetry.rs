use std::sync::Arc;

use thiserror::Error;

use crate::adapters::command_cache::CommandCache;
use crate::app::services::{PersistenceGateway, ServiceError};
use crate::app::simulation::{SimulationError, SimulationRegistry};
use crate::domain::clock::Clock;
use crate::domain::models::{
    CommandResponse, EventData, EventType, LogLevel, NewChargingEvent, SessionStatus,
    SessionUpdate, TelemetryPayload, TelemetryReport,
};
use crate::domain::simulator::SimulatorError;

const TELEMETRY_SOURCE: &str = "telemetry";
const STOPPED_STATUS: &str = "stopped";
const ERROR_STATUS: &str = "error";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Missing required fields: chargerId, stationName, status")]
    MissingFields,
    #[error("telemetry persistence failed: {0}")]
    Persistence(#[from] ServiceError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub report: TelemetryReport,
    pub event_id: String,
    pub completed_session_id: Option<String>,
    pub executed_command_id: Option<String>,
}

#[derive(Clone)]
pub struct TelemetryIngest {
    gateway: Arc<dyn PersistenceGateway>,
    cache: Arc<dyn CommandCache>,
    simulations: Arc<SimulationRegistry>,
    clock: Arc<dyn Clock>,
}

impl TelemetryIngest {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        cache: Arc<dyn CommandCache>,
        simulations: Arc<SimulationRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            cache,
            simulations,
            clock,
        }
    }

    /// Records a charger status report: logs an event, completes the active
    /// session on a timed stop, and acknowledges the referenced command.
    ///
    /// Reports are not de-duplicated. A repeated stop finds the session
    /// already completed and leaves it alone.
    pub fn ingest(&self, payload: TelemetryPayload) -> Result<IngestOutcome, TelemetryError> {
        let report = self.normalize(&payload)?;

        self.process(report, payload.command_id).inspect_err(|error| {
            self.gateway.log_activity(
                LogLevel::Error,
                &format!("Failed to process charger response: {error}"),
                TELEMETRY_SOURCE,
                None,
            );
        })
    }

    fn normalize(&self, payload: &TelemetryPayload) -> Result<TelemetryReport, TelemetryError> {
        let required = |value: &Option<String>| value.clone().filter(|value| !value.is_empty());

        let (Some(charger_id), Some(station_name), Some(status)) = (
            required(&payload.charger_id),
            required(&payload.station_name),
            required(&payload.status),
        ) else {
            return Err(TelemetryError::MissingFields);
        };

        Ok(TelemetryReport {
            charger_id,
            station_name,
            status,
            duration: payload
                .duration
                .filter(|duration| duration.is_finite())
                .map(|duration| duration.round() as i64),
            cost_per_unit: payload.cost_per_unit,
            cost_per_minute: payload.cost_per_minute,
            total_cost: payload.total_cost,
            timestamp: self.clock.now().0,
        })
    }

    fn process(
        &self,
        report: TelemetryReport,
        command_id: Option<String>,
    ) -> Result<IngestOutcome, TelemetryError> {
        let event_id = self.gateway.log_event(&NewChargingEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            charger_id: report.charger_id.clone(),
            station_name: report.station_name.clone(),
            event_type: EventType::from_report_status(&report.status),
            data: EventData {
                status: report.status.clone(),
                duration: report.duration,
                cost_per_unit: report.cost_per_unit,
                cost_per_minute: report.cost_per_minute,
                total_cost: report.total_cost,
                ..EventData::default()
            },
            session_id: None,
        })?;

        let completed_session_id = self.complete_session(&report)?;
        self.sync_simulation(&report);

        self.gateway.log_activity(
            LogLevel::Info,
            &format!("Charger response processed for charger {}", report.charger_id),
            TELEMETRY_SOURCE,
            serde_json::to_value(&report).ok().as_ref(),
        );

        let executed_command_id = match command_id.filter(|id| !id.is_empty()) {
            Some(command_id) => {
                self.gateway.mark_command_executed(
                    &command_id,
                    Some(&CommandResponse {
                        status: report.status.clone(),
                        duration: report.duration,
                        cost_per_unit: report.cost_per_unit,
                        cost_per_minute: report.cost_per_minute,
                        total_cost: report.total_cost,
                        message: Some("Command executed successfully".to_string()),
                    }),
                )?;
                self.cache.remove_if(&report.charger_id, &command_id);
                Some(command_id)
            }
            None => None,
        };

        tracing::info!(
            charger_id = %report.charger_id,
            status = %report.status,
            completed_session = ?completed_session_id,
            command_id = ?executed_command_id,
            "charger response ingested"
        );

        Ok(IngestOutcome {
            report,
            event_id,
            completed_session_id,
            executed_command_id,
        })
    }

    fn complete_session(&self, report: &TelemetryReport) -> Result<Option<String>, TelemetryError> {
        let Some(duration) = report.duration.filter(|duration| *duration != 0) else {
            return Ok(None);
        };
        if report.status != STOPPED_STATUS {
            return Ok(None);
        }

        let Some(latest) = self
            .gateway
            .get_sessions(Some(&report.charger_id), 1)
            .into_iter()
            .next()
        else {
            tracing::debug!(charger_id = %report.charger_id, "stop report without any session");
            return Ok(None);
        };
        if latest.status != SessionStatus::Active {
            return Ok(None);
        }

        self.gateway.update_session(
            &latest.session_id,
            &SessionUpdate {
                status: Some(SessionStatus::Completed),
                end_time: Some(self.clock.now().to_rfc3339()),
                duration: Some(duration),
                total_cost: report.total_cost,
                cost_per_unit: report.cost_per_unit,
                cost_per_minute: report.cost_per_minute,
                ..SessionUpdate::default()
            },
        )?;
        Ok(Some(latest.session_id))
    }

    fn sync_simulation(&self, report: &TelemetryReport) {
        let result = match report.status.as_str() {
            STOPPED_STATUS => self.simulations.stop(&report.charger_id),
            ERROR_STATUS => self.simulations.fail(&report.charger_id),
            _ => return,
        };

        match result {
            Ok(_)
            | Err(SimulationError::UnknownCharger(_))
            | Err(SimulationError::Simulator(SimulatorError::NotCharging)) => {}
            Err(error) => {
                tracing::warn!(charger_id = %report.charger_id, error = %error, "failed to update simulation");
            }
        }
    }
}
