//! HTTP API for location ingestion and vehicle queries
//!
//! Routes:
//! - `POST /location-event` - apply one `{vehicle_id, lat, lon}` report
//! - `GET /vehicle/{id}` - current state of a vehicle
//! - `GET /vehicle/{id}/history` - transition history of a vehicle
//! - `GET /vehicles` - ids of all vehicles seen
//! - `GET /zones` - configured zones in declaration order
//! - `GET /health` - liveness probe
//! - `GET /metrics` - Prometheus text format
//!
//! Every response carries `Access-Control-Allow-Origin: *`; `OPTIONS` on any
//! path answers the CORS preflight. Errors use a `{"detail": "..."}` body.

use crate::domain::{Error, TransitionEvent, VehicleRecord};
use crate::io::prometheus::format_prometheus_metrics;
use crate::services::processor::LocationEventProcessor;
use crate::services::zone_set::{ZoneDefinition, ZoneSet};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Maximum accepted request body size
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared state handed to every connection
pub struct AppState {
    processor: Arc<LocationEventProcessor>,
    zones: Arc<ZoneSet>,
    site_id: String,
}

impl AppState {
    pub fn new(processor: Arc<LocationEventProcessor>, zones: Arc<ZoneSet>, site_id: &str) -> Self {
        Self { processor, zones, site_id: site_id.to_string() }
    }
}

/// Body of `POST /location-event`
#[derive(Debug, Deserialize)]
pub struct LocationEventRequest {
    pub vehicle_id: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize)]
struct VehicleResponse {
    vehicle_id: String,
    /// None when outside all zones
    zone: Option<String>,
    lat: f64,
    lon: f64,
    /// Transition caused by the latest report, if any
    transition: Option<String>,
    report_count: u64,
    updated_at: u64,
}

impl From<VehicleRecord> for VehicleResponse {
    fn from(record: VehicleRecord) -> Self {
        Self {
            vehicle_id: record.vehicle_id.0,
            zone: record.current_zone.map(|z| z.to_string()),
            lat: record.last_coordinate.lat(),
            lon: record.last_coordinate.lon(),
            transition: record.last_transition.map(|e| e.transition.to_string()),
            report_count: record.report_count,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    event_id: String,
    transition: String,
    kind: &'static str,
    zone: Option<String>,
    lat: f64,
    lon: f64,
    /// Epoch ms
    timestamp: u64,
}

impl From<TransitionEvent> for HistoryEntry {
    fn from(event: TransitionEvent) -> Self {
        Self {
            kind: event.transition.kind_str(),
            transition: event.transition.to_string(),
            zone: event.zone.map(|z| z.to_string()),
            lat: event.coordinate.lat(),
            lon: event.coordinate.lon(),
            timestamp: event.ts,
            event_id: event.event_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct HistoryResponse<'a> {
    vehicle_id: &'a str,
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
struct VehiclesResponse {
    vehicles: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ZonesResponse {
    zones: Vec<ZoneDefinition>,
}

/// Resolved request path; vehicle ids are percent-decoded
#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    LocationEvent,
    Vehicle(Cow<'a, str>),
    VehicleHistory(Cow<'a, str>),
    Vehicles,
    Zones,
    Health,
    Metrics,
    NotFound,
}

fn resolve(path: &str) -> Route<'_> {
    match path {
        "/location-event" => Route::LocationEvent,
        "/vehicles" => Route::Vehicles,
        "/zones" => Route::Zones,
        "/health" => Route::Health,
        "/metrics" => Route::Metrics,
        _ => {
            let Some(rest) = path.strip_prefix("/vehicle/") else {
                return Route::NotFound;
            };
            let (id, history) = match rest.strip_suffix("/history") {
                Some(id) => (id, true),
                None => (rest, false),
            };
            if id.is_empty() || id.contains('/') {
                return Route::NotFound;
            }
            let id = match percent_decode_str(id).decode_utf8() {
                Ok(id) if is_addressable_id(&id) => id,
                _ => return Route::NotFound,
            };
            if history {
                Route::VehicleHistory(id)
            } else {
                Route::Vehicle(id)
            }
        }
    }
}

/// Ids that `GET /vehicle/{id}` can reach once decoded
fn is_addressable_id(id: &str) -> bool {
    !id.is_empty() && !id.contains('/')
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "http_response_serialize_failed");
            detail_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal processing error")
        }
    }
}

fn detail_response(status: StatusCode, detail: &str) -> Response<Full<Bytes>> {
    let body = format!(r#"{{"detail":{}}}"#, serde_json::Value::from(detail));
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn text_response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert("Access-Control-Allow-Headers", HeaderValue::from_static("*"));
    response
}

fn error_response(err: &Error) -> Response<Full<Bytes>> {
    match err {
        Error::InvalidCoordinate { .. } => {
            detail_response(StatusCode::BAD_REQUEST, "Invalid coordinates")
        }
        Error::VehicleNotFound(_) => detail_response(StatusCode::NOT_FOUND, "Vehicle not found"),
        Error::Configuration(_) | Error::InternalProcessing => {
            detail_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal processing error")
        }
    }
}

/// Read a size-capped JSON body
async fn read_json<T: DeserializeOwned>(body: Incoming) -> Result<T, Response<Full<Bytes>>> {
    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(detail_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"));
        }
        Err(e) => {
            warn!(error = %e, "http_body_read_failed");
            return Err(detail_response(StatusCode::BAD_REQUEST, "Failed to read request body"));
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| {
        debug!(error = %e, "http_body_invalid");
        detail_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())
    })
}

async fn post_location_event(body: Incoming, state: &AppState) -> Response<Full<Bytes>> {
    let event: LocationEventRequest = match read_json(body).await {
        Ok(event) => event,
        Err(response) => return response,
    };
    if !is_addressable_id(&event.vehicle_id) {
        return detail_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "vehicle_id must be non-empty and must not contain '/'",
        );
    }

    match state.processor.process(&event.vehicle_id, event.lat, event.lon) {
        Ok(result) => json_response(StatusCode::OK, &result),
        Err(e) => error_response(&e),
    }
}

async fn route(req: Request<Incoming>, state: &AppState) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if method == Method::OPTIONS {
        return preflight_response();
    }

    match (method, resolve(&path)) {
        (Method::POST, Route::LocationEvent) => post_location_event(req.into_body(), state).await,
        (Method::GET, Route::Vehicle(id)) => match state.processor.vehicle(&id) {
            Ok(record) => json_response(StatusCode::OK, &VehicleResponse::from(record)),
            Err(e) => error_response(&e),
        },
        (Method::GET, Route::VehicleHistory(id)) => {
            let history = state.processor.history(&id).into_iter().map(HistoryEntry::from).collect();
            json_response(StatusCode::OK, &HistoryResponse { vehicle_id: &id, history })
        }
        (Method::GET, Route::Vehicles) => {
            let vehicles = state.processor.vehicle_ids().into_iter().map(|v| v.0).collect();
            json_response(StatusCode::OK, &VehiclesResponse { vehicles })
        }
        (Method::GET, Route::Zones) => {
            let zones = state
                .zones
                .zones()
                .iter()
                .map(|z| ZoneDefinition { name: z.name().to_string(), coordinates: z.vertices() })
                .collect();
            json_response(StatusCode::OK, &ZonesResponse { zones })
        }
        (Method::GET, Route::Health) => json_response(StatusCode::OK, &serde_json::json!({"status": "ok"})),
        (Method::GET, Route::Metrics) => text_response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(
                state.processor.metrics(),
                state.processor.tracked_vehicles(),
                &state.site_id,
            ),
        ),
        (_, Route::NotFound) => detail_response(StatusCode::NOT_FOUND, "Not Found"),
        (_, _) => detail_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
    }
}

/// Handle one request: route, add CORS header, log
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let mut response = route(req, &state).await;
    response
        .headers_mut()
        .insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %format!("{:.2}", duration_ms),
        "http_request"
    );

    Ok(response)
}

/// Accept connections on `listener` until shutdown is signalled
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, site = %state.site_id, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                debug!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind `addr` and serve the API until shutdown
pub async fn start_http_server(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown).await?;
    Ok(())
}
