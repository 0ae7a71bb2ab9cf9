use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde_json::Value;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::DbError;
use crate::domain::clock::Clock;
use crate::domain::models::{
    ChargingEvent, ChargingSession, Command, CommandResponse, LogLevel, NewChargingEvent,
    NewChargingSession, NewCommand, SessionUpdate, SystemLog,
};

const AUDIT_SOURCE: &str = "database";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
}

/// Collection-level access to events, sessions, logs and commands.
///
/// Reads degrade to an empty result on failure. Writes record an audit row
/// and propagate failures, except `log_activity`, which never fails.
pub trait PersistenceGateway: Send + Sync {
    fn log_event(&self, event: &NewChargingEvent) -> Result<String, ServiceError>;
    fn get_events(&self, charger_id: Option<&str>, limit: u32) -> Vec<ChargingEvent>;
    fn create_session(&self, session: &NewChargingSession) -> Result<String, ServiceError>;
    fn update_session(&self, session_id: &str, update: &SessionUpdate)
    -> Result<(), ServiceError>;
    fn get_sessions(&self, charger_id: Option<&str>, limit: u32) -> Vec<ChargingSession>;
    fn log_activity(&self, level: LogLevel, message: &str, source: &str, data: Option<&Value>);
    fn get_logs(&self, level: Option<LogLevel>, limit: u32) -> Vec<SystemLog>;
    fn save_command(&self, command: &NewCommand) -> Result<String, ServiceError>;
    fn get_latest_command(&self, charger_id: &str) -> Option<Command>;
    fn mark_command_executed(
        &self,
        command_id: &str,
        response: Option<&CommandResponse>,
    ) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct SqliteGateway {
    connection: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteGateway {
    pub fn new(connection: Arc<Mutex<Connection>>, clock: Arc<dyn Clock>) -> Self {
        Self { connection, clock }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }

    fn now(&self) -> String {
        self.clock.now().to_rfc3339()
    }

    fn audit(&self, message: &str) {
        self.log_activity(LogLevel::Info, message, AUDIT_SOURCE, None);
    }

    fn write<T>(
        &self,
        failure: &str,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        self.with_connection(op).inspect_err(|error| {
            self.log_activity(
                LogLevel::Error,
                &format!("Failed to {failure}: {error}"),
                AUDIT_SOURCE,
                None,
            );
        })
    }

    fn read<T>(
        &self,
        failure: &str,
        op: impl FnOnce(&Connection) -> Result<Vec<T>, DbError>,
    ) -> Vec<T> {
        match self.with_connection(op) {
            Ok(rows) => rows,
            Err(error) => {
                self.log_activity(
                    LogLevel::Error,
                    &format!("Failed to {failure}: {error}"),
                    AUDIT_SOURCE,
                    None,
                );
                Vec::new()
            }
        }
    }
}

impl PersistenceGateway for SqliteGateway {
    fn log_event(&self, event: &NewChargingEvent) -> Result<String, ServiceError> {
        let now = self.now();
        let event_id = self.write("log event", |connection| {
            db::insert_event(connection, event, &now)
        })?;

        self.audit(&format!(
            "Event logged: {} for charger {} at {}",
            event.event_type.as_str(),
            event.charger_id,
            event.station_name
        ));
        Ok(event_id)
    }

    fn get_events(&self, charger_id: Option<&str>, limit: u32) -> Vec<ChargingEvent> {
        self.read("get events", |connection| {
            db::list_events(connection, charger_id, limit)
        })
    }

    fn create_session(&self, session: &NewChargingSession) -> Result<String, ServiceError> {
        let now = self.now();
        let session_id = self.write("create session", |connection| {
            db::insert_session(connection, session, &now)
        })?;

        self.audit(&format!(
            "Session created: {} for charger {}",
            session.session_id, session.charger_id
        ));
        Ok(session_id)
    }

    fn update_session(
        &self,
        session_id: &str,
        update: &SessionUpdate,
    ) -> Result<(), ServiceError> {
        let now = self.now();
        let changed = self.write("update session", |connection| {
            db::update_session(connection, session_id, update, &now)
        })?;

        if changed == 0 {
            tracing::warn!(session_id, "session update matched no rows");
        }
        self.audit(&format!("Session updated: {session_id}"));
        Ok(())
    }

    fn get_sessions(&self, charger_id: Option<&str>, limit: u32) -> Vec<ChargingSession> {
        self.read("get sessions", |connection| {
            db::list_sessions(connection, charger_id, limit)
        })
    }

    fn log_activity(&self, level: LogLevel, message: &str, source: &str, data: Option<&Value>) {
        let now = self.now();
        let result = self.with_connection(|connection| {
            db::insert_log(connection, level, message, source, data, &now)
        });

        if let Err(error) = result {
            tracing::error!(
                error = %error,
                level = level.as_str(),
                source,
                message,
                "failed to log activity"
            );
        }
    }

    fn get_logs(&self, level: Option<LogLevel>, limit: u32) -> Vec<SystemLog> {
        match self.with_connection(|connection| db::list_logs(connection, level, limit)) {
            Ok(logs) => logs,
            Err(error) => {
                tracing::error!(error = %error, "failed to get logs");
                Vec::new()
            }
        }
    }

    fn save_command(&self, command: &NewCommand) -> Result<String, ServiceError> {
        let now = self.now();
        let command_id = self.write("save command", |connection| {
            db::insert_command(connection, command, &now)
        })?;

        self.audit(&format!(
            "Command saved: {} for charger {} at {}",
            command.command, command.charger_id, command.station_name
        ));
        Ok(command_id)
    }

    fn get_latest_command(&self, charger_id: &str) -> Option<Command> {
        match self.with_connection(|connection| {
            db::get_latest_pending_command(connection, charger_id)
        }) {
            Ok(command) => command,
            Err(error) => {
                self.log_activity(
                    LogLevel::Error,
                    &format!("Failed to get latest command: {error}"),
                    AUDIT_SOURCE,
                    None,
                );
                None
            }
        }
    }

    fn mark_command_executed(
        &self,
        command_id: &str,
        response: Option<&CommandResponse>,
    ) -> Result<(), ServiceError> {
        let now = self.now();
        let changed = self.write("mark command executed", |connection| {
            db::mark_command_executed(connection, command_id, response, &now)
        })?;

        if changed == 0 {
            tracing::warn!(command_id, "executed command not found");
        }
        self.audit(&format!("Command executed: {command_id}"));
        Ok(())
    }
}
