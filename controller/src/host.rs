use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use aircon_common::{
    parse_override_topic, parse_sensor_topic, parse_zone_state_topic, CycleReport, ErrorCounters,
    HvacMode, Notification, RuntimeConfig, Schedule, SensorKind, SensorSnapshot,
    TOPIC_CMD_OVERRIDE_WILDCARD, TOPIC_CMD_TARGET, TOPIC_CONTROLLER_NOTIFICATION,
    TOPIC_CONTROLLER_STATE, TOPIC_OUTDOOR_TEMP, TOPIC_SENSOR_WILDCARD, TOPIC_UNIT_STATE,
    TOPIC_WEATHER_TEMP, TOPIC_ZONE_STATE_WILDCARD,
};

use crate::actuator::MqttActuator;
use crate::advisory::build_client;
use crate::optimizer::Optimizer;
use crate::readings::{
    parse_fan_speed, parse_humidity, parse_temperature, LiveReadings, UnitStatePayload,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 1024;
const STATE_PUBLISH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct AppState {
    runtime: Arc<Mutex<RuntimeConfig>>,
    readings: Arc<Mutex<LiveReadings>>,
    snapshot: Arc<Mutex<SensorSnapshot>>,
    latest_report: Arc<Mutex<Option<CycleReport>>>,
    optimizer: Arc<Optimizer>,
    mqtt: AsyncClient,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    #[serde(rename = "cycleInFlight")]
    cycle_in_flight: bool,
    #[serde(rename = "lastCycleEpoch")]
    last_cycle_epoch: Option<i64>,
    #[serde(rename = "nextCycleInSecs")]
    next_cycle_in_secs: Option<u64>,
    #[serde(rename = "baseTarget")]
    base_target_c: f32,
    #[serde(rename = "hvacMode")]
    hvac_mode: HvacMode,
    counters: ErrorCounters,
    #[serde(rename = "lastError")]
    last_error: Option<String>,
    report: Option<CycleReport>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.controller.sanitize();
    if let Ok(key) = std::env::var("ADVISORY_API_KEY") {
        runtime.controller.advisory.api_key = key;
    }

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("aircon-controller-rust", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let advisor = build_client(&runtime.controller.advisory)?;
    match &advisor {
        Some(client) => info!("advisory provider: {}", client.provider()),
        None => info!("advisory service disabled, using rule fallback only"),
    }
    let actuator = Arc::new(MqttActuator::new(mqtt.clone()));

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.http_port);

    let app_state = AppState {
        runtime: Arc::new(Mutex::new(runtime)),
        readings: Arc::new(Mutex::new(LiveReadings::default())),
        snapshot: Arc::new(Mutex::new(SensorSnapshot::default())),
        latest_report: Arc::new(Mutex::new(None)),
        optimizer: Arc::new(Optimizer::new(advisor, actuator)),
        mqtt,
        store,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_poll_loop(app_state.clone()).await;
    spawn_optimize_loop(app_state.clone()).await;
    spawn_state_publish_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/target", post(handle_set_target))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/rooms/{id}/override", post(handle_set_override))
        .route(
            "/api/schedules",
            get(handle_get_schedules).put(handle_put_schedules),
        )
        .route("/api/optimize", post(handle_optimize_now))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_WILDCARD,
        TOPIC_WEATHER_TEMP,
        TOPIC_ZONE_STATE_WILDCARD,
        TOPIC_UNIT_STATE,
        TOPIC_CMD_TARGET,
        TOPIC_CMD_OVERRIDE_WILDCARD,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// Refreshes the shared snapshot from live readings on the poll cadence.
async fn spawn_poll_loop(app_state: AppState) {
    let period = Duration::from_secs(app_state.runtime.lock().await.controller.poll_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            refresh_snapshot(&app_state).await;
        }
    });
}

async fn refresh_snapshot(app_state: &AppState) -> SensorSnapshot {
    let config = app_state.runtime.lock().await.controller.clone();
    let known_speeds = app_state.optimizer.state().await.applied_speeds;
    let snapshot = {
        let readings = app_state.readings.lock().await;
        readings.snapshot(&config, monotonic_ms(), &known_speeds)
    };
    *app_state.snapshot.lock().await = snapshot.clone();
    snapshot
}

/// Runs the optimization cycle on its own cadence. The first cycle waits one
/// poll period so sensors have a chance to report.
async fn spawn_optimize_loop(app_state: AppState) {
    let (period, warmup) = {
        let runtime = app_state.runtime.lock().await;
        (
            Duration::from_secs(runtime.controller.optimize_interval_secs),
            Duration::from_secs(runtime.controller.poll_interval_secs),
        )
    };
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + warmup;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let state = app_state.clone();
            // Detached so a slow cycle cannot delay the next tick; overlap is rejected inside.
            tokio::spawn(async move {
                if let Err(err) = run_cycle(&state).await {
                    warn!("optimization cycle not run: {err:#}");
                }
            });
        }
    });
}

/// Returns `Ok(false)` when another cycle was already in flight.
async fn run_cycle(app_state: &AppState) -> anyhow::Result<bool> {
    let (config, timezone) = {
        let runtime = app_state.runtime.lock().await;
        (runtime.controller.clone(), runtime.timezone.clone())
    };
    let now_local =
        now_in_timezone(&timezone).with_context(|| format!("unknown timezone {timezone:?}"))?;
    let snapshot = app_state.snapshot.lock().await.clone();
    let now_ms = monotonic_ms();
    let startup_grace = now_ms < config.startup_grace_secs.saturating_mul(1_000);

    let Some(outcome) = app_state
        .optimizer
        .run_once(&config, &snapshot, now_local, now_ms, startup_grace)
        .await
    else {
        return Ok(false);
    };

    for notification in &outcome.notifications {
        publish_notification(&app_state.mqtt, notification).await;
    }
    *app_state.latest_report.lock().await = Some(outcome.report);
    publish_state(app_state).await;
    Ok(true)
}

fn spawn_state_publish_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATE_PUBLISH_INTERVAL);
        loop {
            interval.tick().await;
            publish_state(&app_state).await;
        }
    });
}

async fn publish_state(app_state: &AppState) {
    match serde_json::to_vec(&build_status(app_state).await) {
        Ok(body) => {
            if let Err(err) = app_state
                .mqtt
                .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                .await
            {
                warn!("controller state publish failed: {err}");
            }
        }
        Err(err) => warn!("controller state serialization failed: {err}"),
    }
}

async fn publish_notification(mqtt: &AsyncClient, notification: &Notification) {
    match serde_json::to_vec(notification) {
        Ok(body) => {
            if let Err(err) = mqtt
                .publish(TOPIC_CONTROLLER_NOTIFICATION, QoS::AtLeastOnce, false, body)
                .await
            {
                warn!("notification publish failed: {err}");
            }
        }
        Err(err) => warn!("notification serialization failed: {err}"),
    }
}

async fn build_status(app_state: &AppState) -> StatusPayload {
    let (base_target_c, hvac_mode, optimize_secs) = {
        let runtime = app_state.runtime.lock().await;
        (
            runtime.controller.target_temp_c,
            runtime.controller.hvac_mode,
            runtime.controller.optimize_interval_secs,
        )
    };
    let system = app_state.optimizer.state().await;
    let next_cycle_in_secs = system.last_cycle_ms.map(|last| {
        let elapsed_secs = monotonic_ms().saturating_sub(last) / 1_000;
        optimize_secs.saturating_sub(elapsed_secs)
    });

    StatusPayload {
        cycle_in_flight: app_state.optimizer.is_running(),
        last_cycle_epoch: system.last_cycle_epoch,
        next_cycle_in_secs,
        base_target_c,
        hvac_mode,
        counters: system.counters,
        last_error: system.last_error,
        report: app_state.latest_report.lock().await.clone(),
    }
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let now_ms = monotonic_ms();

    match topic.as_str() {
        TOPIC_OUTDOOR_TEMP => {
            if let Some(celsius) = parse_temperature(&message) {
                app_state.readings.lock().await.record_outdoor(celsius, now_ms);
            }
        }
        TOPIC_WEATHER_TEMP => {
            if let Some(celsius) = parse_temperature(&message) {
                app_state.readings.lock().await.record_weather(celsius, now_ms);
            }
        }
        TOPIC_UNIT_STATE => {
            let payload: UnitStatePayload =
                serde_json::from_str(&message).context("invalid unit state payload")?;
            app_state.readings.lock().await.record_unit(payload.into_report());
        }
        TOPIC_CMD_TARGET => {
            if let Ok(target) = message.trim().parse::<f32>() {
                set_base_target(app_state, target).await?;
            }
        }
        other => {
            if let Some((room, kind)) = parse_sensor_topic(other) {
                let mut readings = app_state.readings.lock().await;
                match kind {
                    SensorKind::Temperature => match parse_temperature(&message) {
                        Some(celsius) => readings.record_temperature(room, celsius, now_ms),
                        None => debug!("ignoring temperature {message:?} for {room}"),
                    },
                    SensorKind::Humidity => {
                        if let Some(percent) = parse_humidity(&message) {
                            readings.record_humidity(room, percent, now_ms);
                        }
                    }
                }
            } else if let Some(room) = parse_zone_state_topic(other) {
                if let Some(percent) = parse_fan_speed(&message) {
                    app_state.readings.lock().await.record_fan_speed(room, percent);
                }
            } else if let Some(room) = parse_override_topic(other) {
                let disabled = match message.trim().to_ascii_lowercase().as_str() {
                    "on" | "true" | "1" => true,
                    "off" | "false" | "0" => false,
                    _ => return Ok(()),
                };
                set_room_override(app_state, room, disabled).await?;
            }
        }
    }

    Ok(())
}

async fn set_base_target(app_state: &AppState, target: f32) -> anyhow::Result<bool> {
    if !target.is_finite() || !(16.0..=30.0).contains(&target) {
        return Ok(false);
    }
    let changed = {
        let mut runtime = app_state.runtime.lock().await;
        let changed = runtime.controller.target_temp_c != target;
        runtime.controller.target_temp_c = target;
        changed
    };
    if changed {
        persist_runtime(app_state).await?;
    }
    Ok(changed)
}

/// Returns `None` for an unknown room.
async fn set_room_override(
    app_state: &AppState,
    room_id: &str,
    disabled: bool,
) -> anyhow::Result<Option<bool>> {
    let changed = {
        let mut runtime = app_state.runtime.lock().await;
        let Some(room) = runtime
            .controller
            .rooms
            .iter_mut()
            .find(|room| room.id == room_id)
        else {
            return Ok(None);
        };
        let changed = room.override_disabled != disabled;
        room.override_disabled = disabled;
        changed
    };
    if changed {
        info!("room {room_id} override disabled={disabled}");
        persist_runtime(app_state).await?;
        refresh_snapshot(app_state).await;
    }
    Ok(Some(changed))
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(build_status(&state).await)
}

async fn handle_set_target(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(target) = value.parse::<f32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };
    if !(16.0..=30.0).contains(&target) {
        return error_response(StatusCode::BAD_REQUEST, "Target must be between 16 and 30");
    }

    if let Err(err) = set_base_target(&state, target).await {
        warn!("failed to persist target update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(mode) = HvacMode::parse(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid mode. Use 'cooling', 'heating' or 'auto'",
        );
    };

    let changed = {
        let mut runtime = state.runtime.lock().await;
        let changed = runtime.controller.hvac_mode != mode;
        runtime.controller.hvac_mode = mode;
        changed
    };

    if changed {
        if let Err(err) = persist_runtime(&state).await {
            warn!("failed to persist mode update: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist runtime settings",
            );
        }
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_override(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("disabled") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'disabled' parameter");
    };
    let Ok(disabled) = value.parse::<bool>() else {
        return error_response(StatusCode::BAD_REQUEST, "Use disabled=true or disabled=false");
    };

    match set_room_override(&state, &room_id, disabled).await {
        Ok(Some(_)) => handle_get_status(State(state)).await.into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Unknown room"),
        Err(err) => {
            warn!("failed to persist override update: {err:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist runtime settings",
            )
        }
    }
}

async fn handle_get_schedules(State(state): State<AppState>) -> impl IntoResponse {
    let schedules = state.runtime.lock().await.controller.schedules.clone();
    Json(schedules)
}

async fn handle_put_schedules(
    State(state): State<AppState>,
    Json(mut schedules): Json<Vec<Schedule>>,
) -> impl IntoResponse {
    for schedule in &mut schedules {
        schedule.sanitize();
    }
    {
        let mut runtime = state.runtime.lock().await;
        runtime.controller.schedules = schedules;
    }

    if let Err(err) = persist_runtime(&state).await {
        warn!("failed to persist schedule update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist schedules",
        );
    }

    handle_get_schedules(State(state)).await.into_response()
}

async fn handle_optimize_now(State(state): State<AppState>) -> impl IntoResponse {
    if state.optimizer.is_running() {
        return error_response(StatusCode::CONFLICT, "Optimization cycle already in flight");
    }
    match run_cycle(&state).await {
        Ok(true) => handle_get_status(State(state)).await.into_response(),
        Ok(false) => error_response(StatusCode::CONFLICT, "Optimization cycle already in flight"),
        Err(err) => {
            warn!("manual optimization cycle not run: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{err:#}"))
        }
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("AIRCON_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.aircon"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

/// Writes the live config back, keeping the stored credential rather than an env override.
async fn persist_runtime(state: &AppState) -> anyhow::Result<()> {
    let mut runtime = state.runtime.lock().await.clone();
    let stored = state.store.load_runtime_config().await.unwrap_or_default();
    runtime.controller.advisory.api_key = stored.controller.advisory.api_key;
    state.store.save_runtime_config(&runtime).await
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_named_timezones() {
        assert!(now_in_timezone("Australia/Sydney").is_some());
        assert!(now_in_timezone("Mars/Olympus").is_none());
    }

    fn app_state(timezone: &str) -> AppState {
        let runtime = RuntimeConfig {
            timezone: timezone.to_string(),
            ..RuntimeConfig::default()
        };
        let (mqtt, _eventloop) = AsyncClient::new(MqttOptions::new("aircon-test", "localhost", 1883), 8);
        let actuator = Arc::new(MqttActuator::new(mqtt.clone()));
        AppState {
            runtime: Arc::new(Mutex::new(runtime)),
            readings: Arc::new(Mutex::new(LiveReadings::default())),
            snapshot: Arc::new(Mutex::new(SensorSnapshot::default())),
            latest_report: Arc::new(Mutex::new(None)),
            optimizer: Arc::new(Optimizer::new(None, actuator)),
            mqtt,
            store: AppStore::new(),
        }
    }

    #[tokio::test]
    async fn manual_cycle_with_bad_timezone_is_not_a_conflict() {
        let state = app_state("Mars/Olympus");

        let response = handle_optimize_now(State(state.clone())).await.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(run_cycle(&state)
            .await
            .unwrap_err()
            .to_string()
            .contains("Mars/Olympus"));
        assert_eq!(state.optimizer.state().await.last_cycle_ms, None);
    }

    #[test]
    fn monotonic_clock_never_goes_back() {
        let first = monotonic_ms();
        let second = monotonic_ms();
        assert!(second >= first);
    }
}
