use std::path::Path;
use std::sync::{Arc, Mutex};

use ev_charge_portal::adapters::db::{open_connection, run_migrations, schema_version};
use ev_charge_portal::app::services::{PersistenceGateway, SqliteGateway};
use ev_charge_portal::domain::clock::{Clock, SystemClock};
use ev_charge_portal::domain::models::{
    CommandKind, CommandResponse, EventData, EventType, NewChargingEvent, NewChargingSession,
    NewCommand, SessionStatus, SessionUpdate,
};

fn main() {
    if let Err(error) = run() {
        eprintln!("failed to create test db: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut path = if cfg!(windows) {
        ".\\data\\ev_charge_test.db".to_string()
    } else {
        "./data/ev_charge_test.db".to_string()
    };
    let mut force = false;
    let mut seed = false;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--path" => {
                let Some(value) = args.get(index + 1) else {
                    return Err("--path requires a value".to_string());
                };
                path = value.clone();
                index += 2;
            }
            "--force" => {
                force = true;
                index += 1;
            }
            "--seed" => {
                seed = true;
                index += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    let path_ref = Path::new(&path);
    if let Some(parent) = path_ref.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|error| format!("failed to create parent directory: {error}"))?;
    }

    if force && path_ref.exists() {
        std::fs::remove_file(path_ref)
            .map_err(|error| format!("failed to remove existing db file: {error}"))?;
    }

    let mut connection = open_connection(&path).map_err(|error| error.to_string())?;
    run_migrations(&mut connection).map_err(|error| error.to_string())?;
    let version = schema_version(&connection).map_err(|error| error.to_string())?;

    if seed {
        let gateway = SqliteGateway::new(Arc::new(Mutex::new(connection)), Arc::new(SystemClock));
        seed_demo_history(&gateway).map_err(|error| error.to_string())?;
        println!("seeded one completed demo session for charger 1");
    }

    println!("created/updated test db at: {path}");
    println!("schema version: {version}");
    Ok(())
}

/// Writes the rows a finished start/stop round trip leaves behind.
fn seed_demo_history(
    gateway: &SqliteGateway,
) -> Result<(), ev_charge_portal::app::services::ServiceError> {
    let station_name = "Mumbai Central Station".to_string();
    let session_id = uuid::Uuid::new_v4().to_string();
    let command_id = uuid::Uuid::new_v4().to_string();

    gateway.save_command(&NewCommand {
        command_id: command_id.clone(),
        charger_id: "1".to_string(),
        station_name: station_name.clone(),
        command: CommandKind::Stop,
    })?;
    gateway.create_session(&NewChargingSession {
        session_id: session_id.clone(),
        charger_id: "1".to_string(),
        station_name: station_name.clone(),
        user_id: None,
        status: SessionStatus::Active,
        payment_method: Some("razorpay".to_string()),
    })?;
    gateway.log_event(&NewChargingEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        charger_id: "1".to_string(),
        station_name,
        event_type: EventType::Stop,
        data: EventData {
            status: "stopped".to_string(),
            duration: Some(300),
            total_cost: Some(40.0),
            ..EventData::default()
        },
        session_id: Some(session_id.clone()),
    })?;
    gateway.update_session(
        &session_id,
        &SessionUpdate {
            status: Some(SessionStatus::Completed),
            end_time: Some(SystemClock.now().to_rfc3339()),
            duration: Some(300),
            total_cost: Some(40.0),
            ..SessionUpdate::default()
        },
    )?;
    gateway.mark_command_executed(
        &command_id,
        Some(&CommandResponse {
            status: "stopped".to_string(),
            duration: Some(300),
            total_cost: Some(40.0),
            ..CommandResponse::default()
        }),
    )
}

fn print_help() {
    println!("create_test_db");
    println!();
    println!("Usage:");
    println!("  cargo run --bin create_test_db -- [--path <file>] [--force] [--seed]");
    println!();
    println!("Options:");
    println!(
        "  --path <file>   target sqlite file (default: .\\\\data\\\\ev_charge_test.db on Windows)"
    );
    println!("  --force         delete existing file before creating");
    println!("  --seed          insert one completed demo session with its command and event");
}
