use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::domain::models::{
    ChargingEvent, ChargingSession, Command, CommandResponse, LogLevel, NewChargingEvent,
    NewChargingSession, NewCommand, SessionUpdate, SystemLog,
};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    charger_id TEXT NOT NULL,
    station_name TEXT NOT NULL,
    event_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    data_json TEXT NOT NULL,
    session_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_events_charger_timestamp
ON events (charger_id, timestamp DESC);

CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL UNIQUE,
    charger_id TEXT NOT NULL,
    station_name TEXT NOT NULL,
    user_id TEXT,
    start_time TEXT NOT NULL,
    end_time TEXT,
    status TEXT NOT NULL,
    duration INTEGER,
    total_energy REAL,
    total_cost REAL,
    cost_per_unit REAL,
    cost_per_minute REAL,
    payment_method TEXT,
    last_updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_charger_start_time
ON sessions (charger_id, start_time DESC);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_single_active
ON sessions (charger_id) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    source TEXT NOT NULL,
    data_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_logs_timestamp
ON logs (timestamp DESC);

CREATE TABLE IF NOT EXISTS commands (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    command_id TEXT NOT NULL UNIQUE,
    charger_id TEXT NOT NULL,
    station_name TEXT NOT NULL,
    command TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    executed INTEGER NOT NULL DEFAULT 0,
    response_json TEXT,
    executed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_commands_pending
ON commands (charger_id, executed, timestamp DESC);
"#,
)];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to encode document column: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

pub fn insert_event(
    connection: &Connection,
    event: &NewChargingEvent,
    timestamp: &str,
) -> Result<String, DbError> {
    let data_json = serde_json::to_string(&event.data)?;

    connection.execute(
        "INSERT INTO events (event_id, charger_id, station_name, event_type, timestamp, data_json, session_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.charger_id,
            event.station_name,
            event.event_type.as_str(),
            timestamp,
            data_json,
            event.session_id,
        ],
    )?;

    Ok(event.event_id.clone())
}

pub fn list_events(
    connection: &Connection,
    charger_id: Option<&str>,
    limit: u32,
) -> Result<Vec<ChargingEvent>, DbError> {
    let mut statement = connection.prepare(
        "SELECT event_id, charger_id, station_name, event_type, timestamp, data_json, session_id
         FROM events
         WHERE (?1 IS NULL OR charger_id = ?1)
         ORDER BY timestamp DESC, id DESC
         LIMIT ?2",
    )?;

    let rows = statement.query_map(params![charger_id, i64::from(limit)], |row| {
        Ok(ChargingEvent {
            event_id: row.get(0)?,
            charger_id: row.get(1)?,
            station_name: row.get(2)?,
            event_type: parse_text(row, 3)?,
            timestamp: row.get(4)?,
            data: parse_json(row, 5)?.unwrap_or_default(),
            session_id: row.get(6)?,
        })
    })?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }

    Ok(events)
}

pub fn insert_session(
    connection: &Connection,
    session: &NewChargingSession,
    now: &str,
) -> Result<String, DbError> {
    connection.execute(
        "INSERT INTO sessions (session_id, charger_id, station_name, user_id, start_time, status, payment_method, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?5)",
        params![
            session.session_id,
            session.charger_id,
            session.station_name,
            session.user_id,
            now,
            session.status.as_str(),
            session.payment_method,
        ],
    )?;

    Ok(session.session_id.clone())
}

/// Applies the populated fields of `update` and stamps `last_updated`.
/// Returns the number of rows touched (0 when the session is unknown).
pub fn update_session(
    connection: &Connection,
    session_id: &str,
    update: &SessionUpdate,
    now: &str,
) -> Result<usize, DbError> {
    let changed = connection.execute(
        "UPDATE sessions SET
            status = COALESCE(?2, status),
            end_time = COALESCE(?3, end_time),
            duration = COALESCE(?4, duration),
            total_energy = COALESCE(?5, total_energy),
            total_cost = COALESCE(?6, total_cost),
            cost_per_unit = COALESCE(?7, cost_per_unit),
            cost_per_minute = COALESCE(?8, cost_per_minute),
            last_updated = ?9
         WHERE session_id = ?1",
        params![
            session_id,
            update.status.map(|status| status.as_str()),
            update.end_time,
            update.duration,
            update.total_energy,
            update.total_cost,
            update.cost_per_unit,
            update.cost_per_minute,
            now,
        ],
    )?;

    Ok(changed)
}

pub fn list_sessions(
    connection: &Connection,
    charger_id: Option<&str>,
    limit: u32,
) -> Result<Vec<ChargingSession>, DbError> {
    let mut statement = connection.prepare(
        "SELECT session_id, charger_id, station_name, user_id, start_time, end_time, status,
                duration, total_energy, total_cost, cost_per_unit, cost_per_minute,
                payment_method, last_updated
         FROM sessions
         WHERE (?1 IS NULL OR charger_id = ?1)
         ORDER BY start_time DESC, id DESC
         LIMIT ?2",
    )?;

    let rows = statement.query_map(params![charger_id, i64::from(limit)], |row| {
        Ok(ChargingSession {
            session_id: row.get(0)?,
            charger_id: row.get(1)?,
            station_name: row.get(2)?,
            user_id: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            status: parse_text(row, 6)?,
            duration: row.get(7)?,
            total_energy: row.get(8)?,
            total_cost: row.get(9)?,
            cost_per_unit: row.get(10)?,
            cost_per_minute: row.get(11)?,
            payment_method: row.get(12)?,
            last_updated: row.get(13)?,
        })
    })?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }

    Ok(sessions)
}

pub fn insert_log(
    connection: &Connection,
    level: LogLevel,
    message: &str,
    source: &str,
    data: Option<&Value>,
    timestamp: &str,
) -> Result<i64, DbError> {
    let data_json = data.map(serde_json::to_string).transpose()?;

    connection.execute(
        "INSERT INTO logs (level, message, timestamp, source, data_json) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![level.as_str(), message, timestamp, source, data_json],
    )?;

    Ok(connection.last_insert_rowid())
}

pub fn list_logs(
    connection: &Connection,
    level: Option<LogLevel>,
    limit: u32,
) -> Result<Vec<SystemLog>, DbError> {
    let mut statement = connection.prepare(
        "SELECT id, level, message, timestamp, source, data_json
         FROM logs
         WHERE (?1 IS NULL OR level = ?1)
         ORDER BY timestamp DESC, id DESC
         LIMIT ?2",
    )?;

    let rows = statement.query_map(
        params![level.map(|level| level.as_str()), i64::from(limit)],
        |row| {
            Ok(SystemLog {
                id: row.get(0)?,
                level: parse_text(row, 1)?,
                message: row.get(2)?,
                timestamp: row.get(3)?,
                source: row.get(4)?,
                data: parse_json(row, 5)?,
            })
        },
    )?;

    let mut logs = Vec::new();
    for row in rows {
        logs.push(row?);
    }

    Ok(logs)
}

pub fn insert_command(
    connection: &Connection,
    command: &NewCommand,
    timestamp: &str,
) -> Result<String, DbError> {
    connection.execute(
        "INSERT INTO commands (command_id, charger_id, station_name, command, timestamp, executed)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        params![
            command.command_id,
            command.charger_id,
            command.station_name,
            command.command.as_str(),
            timestamp,
        ],
    )?;

    Ok(command.command_id.clone())
}

pub fn get_latest_pending_command(
    connection: &Connection,
    charger_id: &str,
) -> Result<Option<Command>, DbError> {
    let command = connection
        .query_row(
            "SELECT command_id, charger_id, station_name, command, timestamp, executed, response_json, executed_at
             FROM commands
             WHERE charger_id = ?1 AND executed = 0
             ORDER BY timestamp DESC, id DESC
             LIMIT 1",
            params![charger_id],
            command_from_row,
        )
        .optional()?;

    Ok(command)
}

pub fn get_command(connection: &Connection, command_id: &str) -> Result<Option<Command>, DbError> {
    let command = connection
        .query_row(
            "SELECT command_id, charger_id, station_name, command, timestamp, executed, response_json, executed_at
             FROM commands
             WHERE command_id = ?1",
            params![command_id],
            command_from_row,
        )
        .optional()?;

    Ok(command)
}

pub fn mark_command_executed(
    connection: &Connection,
    command_id: &str,
    response: Option<&CommandResponse>,
    executed_at: &str,
) -> Result<usize, DbError> {
    let response_json = response.map(serde_json::to_string).transpose()?;

    let changed = connection.execute(
        "UPDATE commands SET executed = 1, response_json = ?2, executed_at = ?3 WHERE command_id = ?1",
        params![command_id, response_json, executed_at],
    )?;

    Ok(changed)
}

fn command_from_row(row: &Row<'_>) -> rusqlite::Result<Command> {
    Ok(Command {
        command_id: row.get(0)?,
        charger_id: row.get(1)?,
        station_name: row.get(2)?,
        command: parse_text(row, 3)?,
        timestamp: row.get(4)?,
        executed: row.get(5)?,
        response: parse_json(row, 6)?,
        executed_at: row.get(7)?,
    })
}

fn parse_text<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(index)?;
    raw.parse()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}

fn parse_json<T: DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|value| {
        serde_json::from_str(&value).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
        })
    })
    .transpose()
}
