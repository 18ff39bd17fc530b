//! The optimization cycle as two pure steps around the single suspension
//! point. `plan` reads one snapshot and decides whether the advisory service
//! is needed; `finish` folds in its answer (or failure) and produces the next
//! `SystemState`, the actuator commands and a report. The host owns timing,
//! I/O and the advisory call.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::advisory::{AdvisoryError, AdvisoryRequest, AdvisoryResponse, AdvisoryRoom};
use crate::command::{ActuatorCommand, Notification};
use crate::config::ControllerConfig;
use crate::fallback::{fallback_speed, FallbackPhase};
use crate::gate::{self, GateDecision, SkipReason};
use crate::humidity::{humidity_status, next_mode};
use crate::overshoot::{correct, OvershootBand};
use crate::room::{RoomStats, SensorSnapshot};
use crate::target::{resolve_target, select_outdoor, ResolvedTarget};
use crate::types::{
    ControlDirection, HumidityMode, HumidityStatus, HvacMode, MainFanSpeed, PowerState, RoomStatus,
    UnitMode,
};
use crate::unit::{power_step, round_half, select_main_fan, select_setpoint, PowerDecision, SetpointTier};

/// Minimum setpoint change worth sending to the unit.
const SETPOINT_CHANGE_THRESHOLD_C: f32 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounters {
    pub advisory_failures: u64,
    pub sensor_unavailable: u64,
    pub actuator_failures: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub base_target_c: Option<f32>,
    pub effective_target_c: Option<f32>,
    pub direction: Option<ControlDirection>,
    pub last_recommendations: BTreeMap<String, u8>,
    /// Zone speeds the actuator accepted. Differs from the recommendation
    /// cache when a zone command failed.
    pub applied_speeds: BTreeMap<String, u8>,
    pub last_main_fan: Option<MainFanSpeed>,
    pub last_advisory_ms: Option<u64>,
    pub last_poll_ms: Option<u64>,
    pub last_cycle_ms: Option<u64>,
    pub last_cycle_epoch: Option<i64>,
    pub unit_power: Option<PowerState>,
    pub last_power_change_ms: Option<u64>,
    pub unit_mode: Option<UnitMode>,
    pub unit_setpoint_c: Option<f32>,
    pub humidity_mode: HumidityMode,
    pub active_schedule: Option<String>,
    pub counters: ErrorCounters,
    pub last_error: Option<String>,
}

impl SystemState {
    pub fn record_actuator_failure(&mut self, message: String) {
        self.counters.actuator_failures += 1;
        self.last_error = Some(message);
    }

    /// Rolls back what `finish` recorded for a command the actuator rejected,
    /// so the next cycle sees the old value and issues it again.
    pub fn revert_failed(&mut self, command: &ActuatorCommand, previous: &SystemState) {
        match command {
            ActuatorCommand::SetZoneFanSpeed { room, .. } => {
                match previous.applied_speeds.get(room) {
                    Some(speed) => self.applied_speeds.insert(room.clone(), *speed),
                    None => self.applied_speeds.remove(room),
                };
            }
            ActuatorCommand::SetMainFanSpeed { .. } => self.last_main_fan = previous.last_main_fan,
            ActuatorCommand::SetUnitPower { .. } => {
                self.unit_power = previous.unit_power;
                self.last_power_change_ms = previous.last_power_change_ms;
            }
            ActuatorCommand::SetUnitMode { .. } => self.unit_mode = previous.unit_mode,
            ActuatorCommand::SetUnitSetpoint { .. } => self.unit_setpoint_c = previous.unit_setpoint_c,
        }
    }
}

/// Everything one tick reads, captured once at cycle start.
#[derive(Debug, Clone, Copy)]
pub struct CycleInput<'a> {
    pub config: &'a ControllerConfig,
    pub snapshot: &'a SensorSnapshot,
    pub state: &'a SystemState,
    pub now_local: DateTime<FixedOffset>,
    pub now_ms: u64,
    /// Sensors may still be coming up; gaps are not counted as errors.
    pub startup_grace: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvisoryStep {
    NotNeeded,
    Disabled,
    Request(AdvisoryRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CyclePlan {
    pub direction: ControlDirection,
    pub unit_power: PowerState,
    pub target: ResolvedTarget,
    pub stats: Option<RoomStats>,
    pub gate: GateDecision,
    pub phase: Option<FallbackPhase>,
    pub advisory: AdvisoryStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Advisory,
    Fallback,
    Cached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomReport {
    pub id: String,
    pub name: String,
    pub available: bool,
    pub temperature_c: Option<f32>,
    pub humidity_percent: Option<f32>,
    pub deviation_c: Option<f32>,
    pub status: Option<RoomStatus>,
    pub recommended: Option<u8>,
    pub applied: u8,
    pub source: Option<RecommendationSource>,
    pub overshoot: Option<OvershootBand>,
    pub override_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_epoch: i64,
    pub effective_target_c: f32,
    pub base_target_c: f32,
    pub weather_adjustment_c: f32,
    pub outdoor_c: Option<f32>,
    pub active_schedule: Option<String>,
    pub hvac_mode: HvacMode,
    pub direction: ControlDirection,
    pub gate: GateDecision,
    pub source: RecommendationSource,
    pub phase: Option<FallbackPhase>,
    pub rooms: Vec<RoomReport>,
    pub main_fan: Option<MainFanSpeed>,
    pub unit_power: PowerState,
    pub power_decision: Option<PowerDecision>,
    pub setpoint_c: Option<f32>,
    pub setpoint_tier: Option<SetpointTier>,
    pub unit_mode: Option<UnitMode>,
    pub humidity_mode: HumidityMode,
    pub humidity_status: HumidityStatus,
    pub average_humidity: Option<f32>,
    pub advisory_humidity_hint: Option<HumidityMode>,
    pub counters: ErrorCounters,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub state: SystemState,
    pub commands: Vec<ActuatorCommand>,
    pub notifications: Vec<Notification>,
    pub report: CycleReport,
}

pub fn plan(input: &CycleInput<'_>) -> CyclePlan {
    let config = input.config;
    let snapshot = input.snapshot;

    let unit_power = snapshot
        .unit
        .power
        .or(input.state.unit_power)
        .unwrap_or(PowerState::On);
    let unit_mode = snapshot.unit.mode.or(input.state.unit_mode);
    let direction = config.hvac_mode.resolve(unit_mode);

    let outdoor = select_outdoor(&config.weather, snapshot.outdoor_sensor_c, snapshot.weather_feed_c);
    let target = resolve_target(config, direction, outdoor, input.now_local);
    let stats = RoomStats::compute(&snapshot.rooms, target.effective_c, direction);
    let cache_complete = snapshot
        .rooms
        .iter()
        .filter(|room| room.is_controlled() && room.temperature_c.is_some())
        .all(|room| input.state.last_recommendations.contains_key(&room.id));
    let gate = gate::evaluate(unit_power, stats.as_ref(), config.deadband_c, cache_complete);
    let phase = stats
        .as_ref()
        .map(|stats| FallbackPhase::select(stats, config.deadband_c));

    let advisory = match gate {
        GateDecision::Skip(_) => AdvisoryStep::NotNeeded,
        GateDecision::Consult if !config.advisory.enabled() => AdvisoryStep::Disabled,
        GateDecision::Consult => AdvisoryStep::Request(build_request(
            config,
            snapshot,
            &target,
            direction,
            unit_power,
        )),
    };

    CyclePlan {
        direction,
        unit_power,
        target,
        stats,
        gate,
        phase,
        advisory,
    }
}

fn build_request(
    config: &ControllerConfig,
    snapshot: &SensorSnapshot,
    target: &ResolvedTarget,
    direction: ControlDirection,
    unit_power: PowerState,
) -> AdvisoryRequest {
    let rooms = snapshot
        .rooms
        .iter()
        .filter(|room| !room.override_disabled)
        .filter_map(|room| {
            let temperature_c = room.temperature_c?;
            let deviation_c = temperature_c - target.effective_c;
            Some(AdvisoryRoom {
                id: room.id.clone(),
                name: room.name.clone(),
                temperature_c,
                target_c: target.effective_c,
                deviation_c,
                status: RoomStatus::classify(deviation_c, config.deadband_c),
                fan_speed: room.fan_speed,
                humidity_percent: room.humidity_percent,
            })
        })
        .collect();

    AdvisoryRequest {
        rooms,
        target_c: target.effective_c,
        deadband_c: config.deadband_c,
        hvac_mode: config.hvac_mode,
        direction,
        unit_power,
        outdoor_c: target.outdoor_c,
        auto_setpoint: config.auto_setpoint,
        humidity_control: config.humidity.enabled,
    }
}

struct RoomDecision {
    recommended: u8,
    applied: u8,
    source: RecommendationSource,
    overshoot: Option<OvershootBand>,
}

pub fn finish(
    input: &CycleInput<'_>,
    plan: CyclePlan,
    advice: Option<Result<AdvisoryResponse, AdvisoryError>>,
) -> CycleOutcome {
    let config = input.config;
    let snapshot = input.snapshot;
    let effective = plan.target.effective_c;

    let mut state = input.state.clone();
    let mut commands = Vec::new();
    let mut notifications = Vec::new();
    let mut notify = |title: &str, message: String| {
        if config.notifications_enabled {
            notifications.push(Notification::new(title, message));
        }
    };

    state.base_target_c = Some(plan.target.base_c);
    state.effective_target_c = Some(effective);
    state.direction = Some(plan.direction);
    state.active_schedule = plan.target.schedule.clone();
    if snapshot.polled_at_ms > 0 {
        state.last_poll_ms = Some(snapshot.polled_at_ms);
    }

    if !input.startup_grace {
        let missing = snapshot
            .rooms
            .iter()
            .filter(|room| !room.override_disabled && room.temperature_c.is_none())
            .count() as u64;
        state.counters.sensor_unavailable += missing;
    }

    let advice = match advice {
        Some(Ok(advice)) => {
            state.last_advisory_ms = Some(input.now_ms);
            Some(advice)
        }
        Some(Err(err)) => {
            state.last_advisory_ms = Some(input.now_ms);
            state.counters.advisory_failures += 1;
            state.last_error = Some(err.to_string());
            notify("Advisory service failed", format!("{err}; using fallback rules"));
            None
        }
        None => None,
    };

    let consult = plan.gate == GateDecision::Consult;
    let mut decisions: BTreeMap<&str, RoomDecision> = BTreeMap::new();

    if consult {
        let phase = plan.phase.unwrap_or(FallbackPhase::Equalizing);
        for room in snapshot.rooms.iter().filter(|room| room.is_controlled()) {
            let Some(temperature) = room.temperature_c else {
                continue;
            };
            let demand = plan.direction.demand(temperature, effective);
            let previous = input
                .state
                .last_recommendations
                .get(&room.id)
                .copied()
                .or(Some(room.fan_speed));

            let advised = advice
                .as_ref()
                .and_then(|advice| advice.room_fan_speeds.get(&room.id).copied());
            let (recommended, source) = match advised {
                Some(speed) => (speed.min(100), RecommendationSource::Advisory),
                None => (
                    fallback_speed(phase, demand, config.deadband_c, previous, config.max_fan_step_percent),
                    RecommendationSource::Fallback,
                ),
            };

            let corrected = correct(recommended, demand, config.deadband_c);
            if corrected.speed != room.fan_speed {
                commands.push(ActuatorCommand::SetZoneFanSpeed {
                    room: room.id.clone(),
                    percent: corrected.speed,
                });
            }
            state
                .last_recommendations
                .insert(room.id.clone(), corrected.speed);
            state.applied_speeds.insert(room.id.clone(), corrected.speed);
            decisions.insert(
                room.id.as_str(),
                RoomDecision {
                    recommended,
                    applied: corrected.speed,
                    source,
                    overshoot: corrected.band,
                },
            );
        }
        let configured = |id: &String| config.rooms.iter().any(|room| &room.id == id);
        state.last_recommendations.retain(|id, _| configured(id));
        state.applied_speeds.retain(|id, _| configured(id));
    }

    let source = if !consult {
        RecommendationSource::Cached
    } else if advice.is_some() {
        RecommendationSource::Advisory
    } else {
        RecommendationSource::Fallback
    };

    // Main fan.
    let mut main_fan = snapshot.unit.fan.or(state.last_main_fan);
    if consult {
        if let Some(stats) = plan.stats.as_ref() {
            let selected = advice
                .as_ref()
                .and_then(|advice| advice.main_fan_speed)
                .unwrap_or_else(|| select_main_fan(stats));
            if config.control_main_fan {
                if main_fan != Some(selected) {
                    commands.push(ActuatorCommand::SetMainFanSpeed { speed: selected });
                }
                state.last_main_fan = Some(selected);
            }
            main_fan = Some(selected);
        }
    }

    // Power hysteresis runs on every tick but a stability skip.
    let stable_skip = matches!(
        plan.gate,
        GateDecision::Skip(SkipReason::AllRoomsStable | SkipReason::NoReadings)
    );
    let mut unit_power = plan.unit_power;
    let mut power_decision = None;
    if !stable_skip {
        if let (true, Some(stats)) = (config.power.auto_power, plan.stats.as_ref()) {
            let decision = power_step(
                &config.power,
                plan.unit_power,
                state.last_power_change_ms,
                input.now_ms,
                stats.average_temp_c,
                effective,
                plan.direction,
            );
            match decision {
                PowerDecision::TurnOn | PowerDecision::TurnOff => {
                    let on = decision == PowerDecision::TurnOn;
                    commands.push(ActuatorCommand::SetUnitPower { on });
                    state.last_power_change_ms = Some(input.now_ms);
                    notify(
                        "Air conditioner power",
                        format!(
                            "turned {} at average {:.1}°C (target {:.1}°C)",
                            if on { "on" } else { "off" },
                            stats.average_temp_c,
                            effective
                        ),
                    );
                }
                PowerDecision::Hold | PowerDecision::Deferred => {}
            }
            unit_power = decision.next_state(plan.unit_power);
            power_decision = Some(decision);
        }
        state.unit_power = Some(unit_power);
    }
    let turned_on = power_decision == Some(PowerDecision::TurnOn);

    // Humidity switch and unit mode.
    let settled = plan
        .stats
        .as_ref()
        .is_some_and(|stats| stats.all_within(config.deadband_c));
    let average_humidity = plan.stats.as_ref().and_then(|stats| stats.average_humidity);
    state.humidity_mode = next_mode(
        state.humidity_mode,
        &config.humidity,
        plan.direction,
        settled,
        average_humidity,
    );
    let desired_mode = match (plan.direction, state.humidity_mode) {
        (ControlDirection::Cooling, HumidityMode::Dry) => UnitMode::Dry,
        (direction, _) => direction.primary_mode(),
    };
    let known_mode = snapshot.unit.mode.or(state.unit_mode);
    if unit_power.is_on() && (turned_on || known_mode != Some(desired_mode)) {
        commands.push(ActuatorCommand::SetUnitMode { mode: desired_mode });
        state.unit_mode = Some(desired_mode);
    } else {
        state.unit_mode = known_mode;
    }

    // Setpoint.
    let known_setpoint = snapshot.unit.setpoint_c.or(state.unit_setpoint_c);
    let mut setpoint_tier = None;
    let mut setpoint = known_setpoint;
    if let (true, true, Some(stats)) = (config.auto_setpoint, unit_power.is_on(), plan.stats.as_ref()) {
        let (selected, tier) = select_setpoint(stats.max_demand_c, plan.direction);
        let value = advice
            .as_ref()
            .and_then(|advice| advice.setpoint_c)
            .map(round_half)
            .unwrap_or(selected);
        setpoint_tier = Some(tier);

        let changed = known_setpoint
            .is_none_or(|current| (value - current).abs() >= SETPOINT_CHANGE_THRESHOLD_C);
        if changed {
            commands.push(ActuatorCommand::SetUnitSetpoint { celsius: value });
            setpoint = Some(value);
        }
    }
    state.unit_setpoint_c = setpoint;

    state.last_cycle_ms = Some(input.now_ms);
    state.last_cycle_epoch = Some(input.now_local.timestamp());

    let rooms = snapshot
        .rooms
        .iter()
        .map(|room| {
            let deviation_c = room.temperature_c.map(|temp| temp - effective);
            let decision = decisions.get(room.id.as_str());
            RoomReport {
                id: room.id.clone(),
                name: room.name.clone(),
                available: room.temperature_c.is_some(),
                temperature_c: room.temperature_c,
                humidity_percent: room.humidity_percent,
                deviation_c,
                status: deviation_c.map(|deviation| RoomStatus::classify(deviation, config.deadband_c)),
                recommended: decision
                    .map(|decision| decision.recommended)
                    .or_else(|| state.last_recommendations.get(&room.id).copied()),
                applied: decision.map(|decision| decision.applied).unwrap_or(room.fan_speed),
                source: match decision {
                    Some(decision) => Some(decision.source),
                    None if room.is_controlled() => Some(RecommendationSource::Cached),
                    None => None,
                },
                overshoot: decision.and_then(|decision| decision.overshoot),
                override_disabled: room.override_disabled,
            }
        })
        .collect();

    let report = CycleReport {
        cycle_epoch: input.now_local.timestamp(),
        effective_target_c: effective,
        base_target_c: plan.target.base_c,
        weather_adjustment_c: plan.target.weather_adjustment_c,
        outdoor_c: plan.target.outdoor_c,
        active_schedule: plan.target.schedule.clone(),
        hvac_mode: config.hvac_mode,
        direction: plan.direction,
        gate: plan.gate,
        source,
        phase: plan.phase,
        rooms,
        main_fan,
        unit_power,
        power_decision,
        setpoint_c: state.unit_setpoint_c,
        setpoint_tier,
        unit_mode: state.unit_mode,
        humidity_mode: state.humidity_mode,
        humidity_status: humidity_status(average_humidity, &config.humidity),
        average_humidity,
        advisory_humidity_hint: advice.as_ref().and_then(|advice| advice.humidity_mode),
        counters: state.counters.clone(),
        last_error: state.last_error.clone(),
    };

    CycleOutcome {
        state,
        commands,
        notifications,
        report,
    }
}
