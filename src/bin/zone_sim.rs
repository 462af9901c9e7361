//! Zone Tracker Simulation Client
//!
//! Drives simulated vehicles against a running zone-tracker and checks the
//! answers against a local copy of the zone set.
//!
//! Usage:
//!   cargo run --bin zone-sim                                # 4 vehicles against localhost:8000
//!   cargo run --bin zone-sim -- --url http://depot:8000 --vehicles 20
//!
//! Each vehicle visits every zone's interior point in declaration order and
//! then leaves to a point outside all zones. Every response is compared with
//! the zone and transition the local zone set predicts. Exit code is 1 if any
//! vehicle saw an unexpected answer.

use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use zone_tracker::domain::types::epoch_ms;
use zone_tracker::domain::{Coordinate, ZoneName, NO_TRANSITION, OUTSIDE_ZONES};
use zone_tracker::services::{classify, ProcessResult, ZoneDefinition, ZoneSet};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "zone-sim")]
#[command(about = "Zone tracker simulation client - drives vehicles through every zone")]
struct Args {
    /// Base URL of the zone-tracker HTTP API
    #[arg(short, long, default_value = "http://127.0.0.1:8000")]
    url: String,

    /// Number of simulated vehicles (run concurrently)
    #[arg(short = 'n', long, default_value = "4")]
    vehicles: usize,

    /// Vehicle id prefix; a run-unique suffix is appended
    #[arg(long, default_value = "sim")]
    prefix: String,

    /// Delay between reports of one vehicle
    #[arg(long, default_value = "0")]
    step_delay_ms: u64,

    /// Print every report and response
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct ZonesBody {
    zones: Vec<ZoneDefinition>,
}

#[derive(Debug, Deserialize)]
struct VehicleBody {
    zone: Option<String>,
}

// ============================================================================
// Route planning
// ============================================================================

/// One planned report and the answer the server should give
#[derive(Debug, Clone)]
struct Step {
    label: String,
    coordinate: Coordinate,
    expected_zone: String,
    expected_transition: String,
}

/// A point outside every zone: just beyond the zones' bounding box
fn outside_point(zones: &ZoneSet) -> Option<Coordinate> {
    let mut max_lon = f64::MIN;
    let mut max_lat = f64::MIN;
    let mut min_lon = f64::MAX;
    let mut min_lat = f64::MAX;
    for zone in zones.zones() {
        for [lon, lat] in zone.vertices() {
            max_lon = max_lon.max(lon);
            max_lat = max_lat.max(lat);
            min_lon = min_lon.min(lon);
            min_lat = min_lat.min(lat);
        }
    }
    if zones.is_empty() {
        return Coordinate::new(0.0, 0.0).ok();
    }

    let candidates = [
        (max_lat + 0.01, max_lon + 0.01),
        (min_lat - 0.01, min_lon - 0.01),
        (max_lat + 0.01, min_lon - 0.01),
        (min_lat - 0.01, max_lon + 0.01),
    ];
    candidates
        .into_iter()
        .filter_map(|(lat, lon)| Coordinate::new(lat, lon).ok())
        .find(|c| zones.lookup(*c).is_none())
}

/// Visit every zone's interior point, then leave
fn plan_route(zones: &ZoneSet) -> Result<Vec<Step>, String> {
    let outside = outside_point(zones).ok_or("no coordinate outside all zones")?;

    let mut targets: Vec<(String, Coordinate)> = Vec::with_capacity(zones.len() + 1);
    for zone in zones.zones() {
        let point = zone
            .interior_point()
            .ok_or_else(|| format!("zone {} has no interior point", zone.name()))?;
        targets.push((format!("visit {}", zone.name()), point));
    }
    targets.push(("leave".to_string(), outside));

    let mut previous: Option<ZoneName> = None;
    let mut steps = Vec::with_capacity(targets.len());
    for (label, coordinate) in targets {
        // Overlaps resolve by declaration order, so ask the zone set
        let current = zones.lookup(coordinate).cloned();
        let transition = classify(previous.as_ref(), current.as_ref());
        steps.push(Step {
            label,
            coordinate,
            expected_zone: current
                .as_ref()
                .map_or_else(|| OUTSIDE_ZONES.to_string(), |z| z.to_string()),
            expected_transition: transition
                .map_or_else(|| NO_TRANSITION.to_string(), |t| t.to_string()),
        });
        previous = current;
    }
    Ok(steps)
}

// ============================================================================
// Vehicle runner
// ============================================================================

async fn run_vehicle(
    client: reqwest::Client,
    base_url: Arc<String>,
    vehicle_id: String,
    steps: Arc<Vec<Step>>,
    step_delay: Duration,
    verbose: bool,
) -> Result<usize, String> {
    let url = format!("{base_url}/location-event");

    for step in steps.iter() {
        let body = json!({
            "vehicle_id": vehicle_id,
            "lat": step.coordinate.lat(),
            "lon": step.coordinate.lon(),
        });
        let resp = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("{}: request failed: {e}", step.label))?;
        if !resp.status().is_success() {
            return Err(format!("{}: HTTP {}", step.label, resp.status()));
        }
        let result: ProcessResult =
            resp.json().await.map_err(|e| format!("{}: bad response: {e}", step.label))?;

        if verbose {
            println!(
                "  {vehicle_id} {} -> {} / {}",
                step.label, result.current_zone, result.transition
            );
        }

        if result.current_zone != step.expected_zone {
            return Err(format!(
                "{}: zone {:?}, expected {:?}",
                step.label, result.current_zone, step.expected_zone
            ));
        }
        if result.transition != step.expected_transition {
            return Err(format!(
                "{}: transition {:?}, expected {:?}",
                step.label, result.transition, step.expected_transition
            ));
        }

        if !step_delay.is_zero() {
            tokio::time::sleep(step_delay).await;
        }
    }

    // Final state must agree with the last answer
    let resp = client
        .get(format!("{base_url}/vehicle/{vehicle_id}"))
        .send()
        .await
        .map_err(|e| format!("state query failed: {e}"))?;
    if !resp.status().is_success() {
        return Err(format!("state query: HTTP {}", resp.status()));
    }
    let state: VehicleBody = resp.json().await.map_err(|e| format!("bad state: {e}"))?;
    let last_zone = steps.last().map(|s| s.expected_zone.as_str());
    let reported = state.zone.as_deref().unwrap_or(OUTSIDE_ZONES);
    if Some(reported) != last_zone {
        return Err(format!("final zone {reported:?}, expected {last_zone:?}"));
    }

    Ok(steps.len())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let base_url = Arc::new(args.url.trim_end_matches('/').to_string());
    let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;

    let zones_body: ZonesBody =
        client.get(format!("{base_url}/zones")).send().await?.error_for_status()?.json().await?;
    let zones = ZoneSet::from_definitions(zones_body.zones)?;
    println!("Loaded {} zones from {}: {:?}", zones.len(), base_url, zones.names());

    let steps = Arc::new(plan_route(&zones)?);
    let run_id = epoch_ms();
    let start = Instant::now();

    let mut tasks = JoinSet::new();
    for i in 0..args.vehicles {
        let vehicle_id = format!("{}-{run_id}-{i}", args.prefix);
        tasks.spawn({
            let client = client.clone();
            let base_url = base_url.clone();
            let steps = steps.clone();
            let delay = Duration::from_millis(args.step_delay_ms);
            let verbose = args.verbose;
            async move {
                let outcome =
                    run_vehicle(client, base_url, vehicle_id.clone(), steps, delay, verbose).await;
                (vehicle_id, outcome)
            }
        });
    }

    let mut results: Vec<(String, Result<usize, String>)> = Vec::with_capacity(args.vehicles);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => results.push(("<task>".to_string(), Err(format!("task failed: {e}")))),
        }
    }
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut passed = 0;
    let mut failed = 0;
    let mut reports = 0;

    println!();
    println!("==================== SIMULATION RESULTS ====================");
    for (vehicle_id, outcome) in &results {
        match outcome {
            Ok(n) => {
                passed += 1;
                reports += n;
                println!("  PASS {vehicle_id} ({n} reports)");
            }
            Err(msg) => {
                failed += 1;
                println!("  FAIL {vehicle_id}: {msg}");
            }
        }
    }
    println!("------------------------------------------------------------");
    println!(
        "  Total: {passed} passed, {failed} failed, {reports} reports in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    println!("============================================================");

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
