use std::sync::Arc;
use std::time::Duration;

use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, Responder, get, post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::adapters::payment::{OrderRequest, PaymentError, RazorpayClient};
use crate::app::relay::{CommandIntent, CommandRelay, RelayError, RelayedCommand};
use crate::app::services::PersistenceGateway;
use crate::app::simulation::SimulationRegistry;
use crate::app::telemetry::{TelemetryError, TelemetryIngest};
use crate::domain::clock::{Clock, rfc3339_to_millis};
use crate::domain::models::{
    ChargingEvent, ChargingSession, EventData, LogLevel, SystemLog, TelemetryPayload,
    TelemetryReport,
};
use crate::domain::simulator::SimulationSnapshot;

const DEFAULT_EVENT_LIMIT: u32 = 100;
const DEFAULT_SESSION_LIMIT: u32 = 50;
const DEFAULT_LOG_LIMIT: u32 = 100;
const MAX_LIST_LIMIT: u32 = 1000;
const API_SOURCE: &str = "api";

#[derive(Clone)]
pub struct ApiState {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub relay: CommandRelay,
    pub telemetry: TelemetryIngest,
    pub simulations: Arc<SimulationRegistry>,
    pub payments: RazorpayClient,
    pub clock: Arc<dyn Clock>,
    pub stop_charging_delay: Duration,
}

#[derive(Debug, Deserialize)]
pub struct SimpleCommandRequest {
    pub command: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargerQuery {
    pub charger_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub charger_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub level: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub amount: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub event_id: String,
    pub charger_id: String,
    pub station_name: String,
    pub event_type: &'static str,
    pub timestamp: i64,
    pub data: EventData,
    pub session_id: Option<String>,
}

impl From<ChargingEvent> for EventResponse {
    fn from(event: ChargingEvent) -> Self {
        Self {
            timestamp: rfc3339_to_millis(&event.timestamp).unwrap_or_default(),
            event_type: event.event_type.wire_command(),
            event_id: event.event_id,
            charger_id: event.charger_id,
            station_name: event.station_name,
            data: event.data,
            session_id: event.session_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub events: Vec<EventResponse>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<ChargingSession>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct LogListResponse {
    pub logs: Vec<SystemLog>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCommandResponse {
    pub command_id: Option<String>,
    pub charger_id: String,
    pub station_name: String,
    pub command: &'static str,
    pub timestamp: i64,
}

impl From<RelayedCommand> for PendingCommandResponse {
    fn from(relayed: RelayedCommand) -> Self {
        match relayed {
            RelayedCommand::Persisted(command) => Self {
                timestamp: rfc3339_to_millis(&command.timestamp).unwrap_or_default(),
                command: command.command.as_str(),
                command_id: Some(command.command_id),
                charger_id: command.charger_id,
                station_name: command.station_name,
            },
            RelayedCommand::Cached { charger_id, entry } => Self {
                command_id: entry.command_id,
                charger_id,
                station_name: entry.station_name,
                command: entry.command.as_str(),
                timestamp: entry.stored_at.0,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TelemetryAck {
    pub message: &'static str,
    pub received: TelemetryReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStatusResponse {
    pub charger_id: String,
    #[serde(flatten)]
    pub snapshot: SimulationSnapshot,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .service(health)
        .service(post_simple_command)
        .service(get_simple_command)
        .service(post_set_command)
        .service(get_set_command)
        .service(get_command_for_charger)
        .service(post_charger_response)
        .service(list_events_endpoint)
        .service(list_sessions_endpoint)
        .service(list_logs_endpoint)
        .service(stop_charging)
        .service(create_order)
        .service(charging_status);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

#[post("/command")]
async fn post_simple_command(
    state: web::Data<ApiState>,
    body: web::Json<SimpleCommandRequest>,
) -> impl Responder {
    match state.relay.submit_simple(body.into_inner().command) {
        Ok(entry) => HttpResponse::Ok().json(json!({
            "message": format!("Command '{}' received and stored.", entry.command)
        })),
        Err(_) => HttpResponse::BadRequest().json(json!({ "message": "Invalid command." })),
    }
}

#[get("/command")]
async fn get_simple_command(state: web::Data<ApiState>) -> impl Responder {
    match state.relay.latest_simple() {
        Some(entry) => HttpResponse::Ok().json(json!({
            "command": entry.command.as_str(),
            "timestamp": entry.stored_at.0,
        })),
        None => HttpResponse::Ok().json(json!({
            "command": null,
            "message": "No new command."
        })),
    }
}

#[post("/set-command")]
async fn post_set_command(
    state: web::Data<ApiState>,
    body: web::Json<CommandIntent>,
) -> impl Responder {
    match state.relay.submit(body.into_inner()) {
        Ok(accepted) => HttpResponse::Ok().json(json!({
            "message": format!(
                "Command '{}' sent to charger {} at {}",
                accepted.command, accepted.charger_id, accepted.station_name
            ),
            "commandId": accepted.command_id,
        })),
        Err(error @ (RelayError::MissingFields | RelayError::InvalidCommand(_))) => {
            HttpResponse::BadRequest().json(json!({ "message": error.to_string() }))
        }
        Err(error @ RelayError::Persistence(_)) => {
            tracing::error!(error = %error, "failed to relay command");
            HttpResponse::InternalServerError().json(json!({
                "message": "Error processing request."
            }))
        }
    }
}

#[get("/set-command")]
async fn get_set_command(
    state: web::Data<ApiState>,
    query: web::Query<ChargerQuery>,
) -> impl Responder {
    let Some(charger_id) = non_empty(query.into_inner().charger_id) else {
        return HttpResponse::BadRequest().json(json!({
            "message": "chargerId parameter required"
        }));
    };

    match state.relay.latest(&charger_id) {
        Some(relayed) => HttpResponse::Ok().json(PendingCommandResponse::from(relayed)),
        None => HttpResponse::Ok().json(json!({
            "message": "No commands found for this charger"
        })),
    }
}

#[get("/get-command")]
async fn get_command_for_charger(
    state: web::Data<ApiState>,
    query: web::Query<ChargerQuery>,
) -> impl Responder {
    let Some(charger_id) = non_empty(query.into_inner().charger_id) else {
        return HttpResponse::BadRequest().json(json!({ "error": "chargerId_missing" }));
    };

    let (command, timestamp) = match state.relay.latest(&charger_id) {
        Some(relayed) => {
            let pending = PendingCommandResponse::from(relayed);
            (pending.command, pending.timestamp)
        }
        None => ("none", state.clock.now().0),
    };

    tracing::debug!(charger_id = %charger_id, command, "command polled");

    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"))
        .insert_header((header::PRAGMA, "no-cache"))
        .insert_header((header::EXPIRES, "0"))
        .json(json!({
            "chargerId": charger_id,
            "command": command,
            "timestamp": timestamp,
        }))
}

#[post("/esp32-response")]
async fn post_charger_response(
    state: web::Data<ApiState>,
    body: web::Json<TelemetryPayload>,
) -> impl Responder {
    match state.telemetry.ingest(body.into_inner()) {
        Ok(outcome) => HttpResponse::Ok().json(TelemetryAck {
            message: "ESP32 response processed successfully",
            received: outcome.report,
        }),
        Err(error @ TelemetryError::MissingFields) => {
            HttpResponse::BadRequest().json(json!({ "message": error.to_string() }))
        }
        Err(error @ TelemetryError::Persistence(_)) => {
            tracing::error!(error = %error, "failed to ingest charger response");
            HttpResponse::InternalServerError().json(json!({
                "message": "Error processing ESP32 response."
            }))
        }
    }
}

#[get("/get-events")]
async fn list_events_endpoint(
    state: web::Data<ApiState>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let query = query.into_inner();
    let limit = list_limit(query.limit, DEFAULT_EVENT_LIMIT);
    let charger_id = non_empty(query.charger_id);

    let events: Vec<EventResponse> = state
        .gateway
        .get_events(charger_id.as_deref(), limit)
        .into_iter()
        .map(EventResponse::from)
        .collect();

    state.gateway.log_activity(
        LogLevel::Info,
        &format!("Retrieved {} events", events.len()),
        API_SOURCE,
        None,
    );

    HttpResponse::Ok().json(EventListResponse {
        count: events.len(),
        events,
    })
}

#[get("/get-sessions")]
async fn list_sessions_endpoint(
    state: web::Data<ApiState>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let query = query.into_inner();
    let limit = list_limit(query.limit, DEFAULT_SESSION_LIMIT);
    let charger_id = non_empty(query.charger_id);

    let sessions = state.gateway.get_sessions(charger_id.as_deref(), limit);

    state.gateway.log_activity(
        LogLevel::Info,
        &format!("Retrieved {} sessions", sessions.len()),
        API_SOURCE,
        None,
    );

    HttpResponse::Ok().json(SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

#[get("/get-logs")]
async fn list_logs_endpoint(
    state: web::Data<ApiState>,
    query: web::Query<LogQuery>,
) -> impl Responder {
    let query = query.into_inner();
    let limit = list_limit(query.limit, DEFAULT_LOG_LIMIT);

    let logs = match non_empty(query.level) {
        None => state.gateway.get_logs(None, limit),
        Some(raw) => match raw.parse::<LogLevel>() {
            Ok(level) => state.gateway.get_logs(Some(level), limit),
            Err(_) => Vec::new(),
        },
    };

    HttpResponse::Ok().json(LogListResponse {
        count: logs.len(),
        logs,
    })
}

#[get("/stop-charging")]
async fn stop_charging(state: web::Data<ApiState>) -> impl Responder {
    tracing::info!("stop charging request received");
    actix_web::rt::time::sleep(state.stop_charging_delay).await;

    HttpResponse::Ok().json(json!({ "message": "Charging stopped successfully via API" }))
}

#[post("/create-order")]
async fn create_order(
    state: web::Data<ApiState>,
    body: web::Json<CreateOrderRequest>,
) -> impl Responder {
    let order = match body
        .amount
        .ok_or(PaymentError::InvalidAmount)
        .and_then(|amount| OrderRequest::new(amount, state.clock.now()))
    {
        Ok(order) => order,
        Err(error) => {
            return HttpResponse::BadRequest().json(json!({ "error": error.to_string() }));
        }
    };

    match state.payments.create_order(&order).await {
        Ok(created) => {
            tracing::info!(amount = order.amount, receipt = %order.receipt, "payment order created");
            HttpResponse::Ok().json(created)
        }
        Err(error) => {
            tracing::error!(error = %error, "payment order creation failed");
            HttpResponse::InternalServerError().json(json!({
                "error": "Razorpay order creation failed"
            }))
        }
    }
}

#[get("/charging-status")]
async fn charging_status(
    state: web::Data<ApiState>,
    query: web::Query<ChargerQuery>,
) -> impl Responder {
    let Some(charger_id) = non_empty(query.into_inner().charger_id) else {
        return HttpResponse::BadRequest().json(json!({
            "message": "chargerId parameter required"
        }));
    };

    match state.simulations.snapshot(&charger_id) {
        Some(snapshot) => HttpResponse::Ok()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .json(ChargingStatusResponse {
                charger_id,
                snapshot,
            }),
        None => HttpResponse::NotFound().json(json!({
            "message": "No charging data for this charger"
        })),
    }
}

/// A missing or zero limit means the endpoint default.
fn list_limit(requested: Option<u32>, default: u32) -> u32 {
    requested
        .filter(|limit| *limit > 0)
        .unwrap_or(default)
        .min(MAX_LIST_LIMIT)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn json_error_handler(error: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(json!({
        "message": format!("Invalid request body: {error}")
    }));
    InternalError::from_response(error, response).into()
}

fn query_error_handler(error: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(json!({
        "message": format!("Invalid query string: {error}")
    }));
    InternalError::from_response(error, response).into()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use actix_web::http::StatusCode;
    use actix_web::http::header::{self, HeaderMap};
    use actix_web::{App, body::to_bytes, test, web};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rusqlite::Connection;
    use serde_json::{Value, json};

    use crate::adapters::command_cache::InMemoryCommandCache;
    use crate::adapters::payment::RazorpayClient;
    use crate::app::relay::CommandRelay;
    use crate::app::services::SqliteGateway;
    use crate::app::simulation::SimulationRegistry;
    use crate::app::telemetry::TelemetryIngest;
    use crate::domain::models::{CommandKind, NewChargingSession, NewCommand, SessionStatus};
    use crate::domain::simulator::SimulationProfile;
    use crate::test_support::{ManualClock, open_test_connection};

    use super::{ApiState, configure_routes};

    fn build_state_with_migrated_db(name: &str) -> (ApiState, Arc<Mutex<Connection>>) {
        let connection = Arc::new(Mutex::new(open_test_connection(name)));
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let gateway = Arc::new(SqliteGateway::new(Arc::clone(&connection), clock.clone()));
        let cache = Arc::new(InMemoryCommandCache::new(300_000, 64, clock.clone()));
        let simulations = Arc::new(SimulationRegistry::with_rng(
            SimulationProfile::default(),
            StdRng::seed_from_u64(11),
        ));

        let state = ApiState {
            gateway: gateway.clone(),
            relay: CommandRelay::new(
                gateway.clone(),
                cache.clone(),
                Arc::new(InMemoryCommandCache::new(300_000, 1, clock.clone())),
                Arc::clone(&simulations),
                clock.clone(),
            ),
            telemetry: TelemetryIngest::new(
                gateway,
                cache,
                Arc::clone(&simulations),
                clock.clone(),
            ),
            simulations,
            payments: RazorpayClient::new("http://127.0.0.1:9", None)
                .expect("client should build"),
            clock,
            stop_charging_delay: Duration::ZERO,
        };

        (state, connection)
    }

    async fn send(state: &ApiState, request: test::TestRequest) -> (StatusCode, HeaderMap, Value) {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure_routes),
        )
        .await;

        let resp = test::call_service(&app, request.to_request()).await;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).expect("body should be json")
        };

        (status, headers, json)
    }

    fn count(connection: &Arc<Mutex<Connection>>, table: &str) -> i64 {
        connection
            .lock()
            .expect("lock should be available")
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .expect("count should succeed")
    }

    fn set_command(command: &str, charger_id: &str) -> test::TestRequest {
        test::TestRequest::post().uri("/set-command").set_json(json!({
            "command": command,
            "chargerId": charger_id,
            "stationName": "Bangalore Tech Park",
        }))
    }

    #[actix_web::test]
    async fn health_endpoint_returns_ok() {
        let (state, _) = build_state_with_migrated_db("api-health");

        let (status, _, body) = send(&state, test::TestRequest::get().uri("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[actix_web::test]
    async fn set_command_persists_each_valid_command() {
        let (state, connection) = build_state_with_migrated_db("api-set-command");

        for command in ["start", "stop", "status", "reset"] {
            let (status, _, body) = send(&state, set_command(command, "CHG-1")).await;
            assert_eq!(status, StatusCode::OK, "{command} should be accepted");
            assert!(body["commandId"].as_str().is_some());
            assert_eq!(
                body["message"],
                format!("Command '{command}' sent to charger CHG-1 at Bangalore Tech Park")
            );
        }

        assert_eq!(count(&connection, "commands"), 4);
    }

    #[actix_web::test]
    async fn set_command_rejects_bad_input_without_persisting() {
        let (state, connection) = build_state_with_migrated_db("api-set-command-invalid");

        let (status, _, body) = send(&state, set_command("reboot", "CHG-1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid command.");

        let missing = test::TestRequest::post()
            .uri("/set-command")
            .set_json(json!({ "command": "start", "chargerId": "CHG-1" }));
        let (status, _, body) = send(&state, missing).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Missing required fields: command, chargerId, stationName"
        );

        let malformed = test::TestRequest::post()
            .uri("/set-command")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json");
        let (status, _, body) = send(&state, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().is_some());

        assert_eq!(count(&connection, "commands"), 0);
    }

    #[actix_web::test]
    async fn get_set_command_returns_latest_pending_command() {
        let (state, _) = build_state_with_migrated_db("api-get-set-command");

        let (status, _, body) =
            send(&state, test::TestRequest::get().uri("/set-command")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "chargerId parameter required");

        let (status, _, body) = send(
            &state,
            test::TestRequest::get().uri("/set-command?chargerId=CHG-9"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "No commands found for this charger");

        send(&state, set_command("reset", "CHG-9")).await;
        let (status, _, body) = send(
            &state,
            test::TestRequest::get().uri("/set-command?chargerId=CHG-9"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["command"], "reset");
        assert_eq!(body["chargerId"], "CHG-9");
        assert_eq!(body["stationName"], "Bangalore Tech Park");
        assert_eq!(body["timestamp"], 1_700_000_000_000_i64);
    }

    #[actix_web::test]
    async fn get_command_is_never_cached_and_defaults_to_none() {
        let (state, _) = build_state_with_migrated_db("api-get-command");

        let (status, headers, body) = send(
            &state,
            test::TestRequest::get().uri("/get-command?chargerId=CHG-2"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["command"], "none");
        assert_eq!(body["chargerId"], "CHG-2");
        assert_eq!(
            headers
                .get(header::CACHE_CONTROL)
                .and_then(|value| value.to_str().ok()),
            Some("no-cache, no-store, must-revalidate")
        );
        assert_eq!(
            headers.get(header::PRAGMA).and_then(|value| value.to_str().ok()),
            Some("no-cache")
        );
        assert_eq!(
            headers.get(header::EXPIRES).and_then(|value| value.to_str().ok()),
            Some("0")
        );

        send(&state, set_command("stop", "CHG-2")).await;
        let (_, _, body) = send(
            &state,
            test::TestRequest::get().uri("/get-command?chargerId=CHG-2"),
        )
        .await;
        assert_eq!(body["command"], "stop");

        let (status, _, _) = send(&state, test::TestRequest::get().uri("/get-command")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn charger_response_without_required_fields_persists_nothing() {
        let (state, connection) = build_state_with_migrated_db("api-esp32-missing");

        let request = test::TestRequest::post()
            .uri("/esp32-response")
            .set_json(json!({ "chargerId": "C1", "status": "stopped" }));
        let (status, _, body) = send(&state, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Missing required fields: chargerId, stationName, status"
        );
        for table in ["events", "sessions", "commands", "logs"] {
            assert_eq!(count(&connection, table), 0, "{table} should stay empty");
        }
    }

    #[actix_web::test]
    async fn stop_report_completes_session_and_acknowledges_command() {
        let (state, _) = build_state_with_migrated_db("api-esp32-stop");
        state
            .gateway
            .create_session(&NewChargingSession {
                session_id: "session-c1".to_string(),
                charger_id: "C1".to_string(),
                station_name: "S1".to_string(),
                user_id: None,
                status: SessionStatus::Active,
                payment_method: None,
            })
            .expect("session should be created");
        state
            .gateway
            .save_command(&NewCommand {
                command_id: "abc".to_string(),
                charger_id: "C1".to_string(),
                station_name: "S1".to_string(),
                command: CommandKind::Stop,
            })
            .expect("command should be saved");

        let request = test::TestRequest::post().uri("/esp32-response").set_json(json!({
            "chargerId": "C1",
            "stationName": "S1",
            "status": "stopped",
            "duration": 300,
            "totalCost": 40.0,
            "commandId": "abc",
        }));
        let (status, _, body) = send(&state, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "ESP32 response processed successfully");
        assert_eq!(body["received"]["chargerId"], "C1");
        assert_eq!(body["received"]["duration"], 300);

        let sessions = state.gateway.get_sessions(Some("C1"), 10);
        assert_eq!(sessions[0].status, SessionStatus::Completed);
        assert_eq!(sessions[0].duration, Some(300));
        assert_eq!(sessions[0].total_cost, Some(40.0));
        assert!(sessions[0].end_time.is_some());
        assert!(state.gateway.get_latest_command("C1").is_none());
    }

    #[actix_web::test]
    async fn get_events_honours_limit_and_normalizes_event_type() {
        let (state, _) = build_state_with_migrated_db("api-get-events");

        for status in ["started", "charging", "stopped"] {
            let request = test::TestRequest::post().uri("/esp32-response").set_json(json!({
                "chargerId": "C7",
                "stationName": "S7",
                "status": status,
            }));
            send(&state, request).await;
        }

        let (status, _, body) = send(
            &state,
            test::TestRequest::get().uri("/get-events?chargerId=C7&limit=2"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        let events = body["events"].as_array().expect("events should be an array");
        assert_eq!(events.len(), 2);
        for event in events {
            let event_type = event["eventType"].as_str().expect("eventType should be set");
            assert!(["start", "stop", "status"].contains(&event_type));
            assert_eq!(event["timestamp"], 1_700_000_000_000_i64);
        }

        let (_, _, body) = send(
            &state,
            test::TestRequest::get().uri("/get-events?chargerId=other"),
        )
        .await;
        assert_eq!(body["count"], 0);
    }

    #[actix_web::test]
    async fn get_sessions_and_logs_report_counts() {
        let (state, _) = build_state_with_migrated_db("api-list-sessions-logs");

        send(&state, set_command("start", "C3")).await;

        let (status, _, body) = send(
            &state,
            test::TestRequest::get().uri("/get-sessions?chargerId=C3"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["sessions"][0]["status"], "active");

        let (status, _, body) =
            send(&state, test::TestRequest::get().uri("/get-logs?level=info&limit=1000")).await;
        assert_eq!(status, StatusCode::OK);
        let logs = body["logs"].as_array().expect("logs should be an array");
        assert_eq!(body["count"], logs.len());
        assert!(!logs.is_empty());
        assert!(logs.iter().all(|log| log["level"] == "info"));

        let (_, _, body) =
            send(&state, test::TestRequest::get().uri("/get-logs?level=fatal")).await;
        assert_eq!(body["count"], 0);

        let (status, _, _) =
            send(&state, test::TestRequest::get().uri("/get-logs?limit=lots")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn legacy_command_endpoint_stores_latest_start_or_stop() {
        let (state, _) = build_state_with_migrated_db("api-legacy-command");

        let (_, _, body) = send(&state, test::TestRequest::get().uri("/command")).await;
        assert_eq!(body["command"], Value::Null);
        assert_eq!(body["message"], "No new command.");

        let request = test::TestRequest::post()
            .uri("/command")
            .set_json(json!({ "command": "start" }));
        let (status, _, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Command 'start' received and stored.");

        let request = test::TestRequest::post()
            .uri("/command")
            .set_json(json!({ "command": "reset" }));
        let (status, _, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid command.");

        let (_, _, body) = send(&state, test::TestRequest::get().uri("/command")).await;
        assert_eq!(body["command"], "start");
        assert_eq!(body["timestamp"], 1_700_000_000_000_i64);
    }

    #[actix_web::test]
    async fn charging_status_reflects_started_simulation() {
        let (state, _) = build_state_with_migrated_db("api-charging-status");

        let (status, _, _) = send(
            &state,
            test::TestRequest::get().uri("/charging-status?chargerId=C5"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(&state, set_command("start", "C5")).await;
        state.simulations.tick_all().expect("tick should succeed");

        let (status, _, body) = send(
            &state,
            test::TestRequest::get().uri("/charging-status?chargerId=C5"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chargerId"], "C5");
        assert_eq!(body["status"], "Charging");
        assert_eq!(body["duration"], 1);
        assert_eq!(body["ratePerKwh"], 8.0);
        assert!(body["energyKwh"].as_f64().expect("energy should be numeric") > 0.0);
    }

    #[actix_web::test]
    async fn create_order_validates_amount_and_reports_gateway_failure() {
        let (state, _) = build_state_with_migrated_db("api-create-order");

        let request = test::TestRequest::post()
            .uri("/create-order")
            .set_json(json!({ "amount": -5 }));
        let (status, _, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = test::TestRequest::post()
            .uri("/create-order")
            .set_json(json!({}));
        let (status, _, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = test::TestRequest::post()
            .uri("/create-order")
            .set_json(json!({ "amount": 250.0 }));
        let (status, _, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Razorpay order creation failed");
    }

    #[actix_web::test]
    async fn stop_charging_acknowledges_after_delay() {
        let (state, _) = build_state_with_migrated_db("api-stop-charging");

        let (status, _, body) =
            send(&state, test::TestRequest::get().uri("/stop-charging")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Charging stopped successfully via API");
    }

    #[actix_web::test]
    async fn fractional_duration_is_accepted_as_whole_seconds() {
        let (state, _) = build_state_with_migrated_db("api-esp32-fractional");
        state
            .gateway
            .create_session(&NewChargingSession {
                session_id: "session-c1".to_string(),
                charger_id: "C1".to_string(),
                station_name: "S1".to_string(),
                user_id: None,
                status: SessionStatus::Active,
                payment_method: None,
            })
            .expect("session should be created");

        let request = test::TestRequest::post().uri("/esp32-response").set_json(json!({
            "chargerId": "C1",
            "stationName": "S1",
            "status": "stopped",
            "duration": 120.0,
        }));
        let (status, _, body) = send(&state, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"]["duration"], 120);
        let sessions = state.gateway.get_sessions(Some("C1"), 1);
        assert_eq!(sessions[0].status, SessionStatus::Completed);
        assert_eq!(sessions[0].duration, Some(120));
    }

    #[actix_web::test]
    async fn zero_limit_falls_back_to_default() {
        let (state, _) = build_state_with_migrated_db("api-zero-limit");

        for status in ["charging", "stopped"] {
            let request = test::TestRequest::post().uri("/esp32-response").set_json(json!({
                "chargerId": "C8",
                "stationName": "S8",
                "status": status,
            }));
            send(&state, request).await;
        }

        let (status, _, body) = send(
            &state,
            test::TestRequest::get().uri("/get-events?chargerId=C8&limit=0"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
    }
}
