use serde::{Deserialize, Serialize};

use crate::config::PowerControlConfig;
use crate::room::RoomStats;
use crate::types::{ControlDirection, MainFanSpeed, PowerState};

pub fn select_main_fan(stats: &RoomStats) -> MainFanSpeed {
    if stats.max_abs_deviation_c >= 3.0 || stats.spread_c >= 3.0 {
        MainFanSpeed::High
    } else if stats.max_abs_deviation_c <= 1.0 && stats.mean_abs_deviation_c <= 0.5 {
        MainFanSpeed::Low
    } else {
        MainFanSpeed::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerDecision {
    Hold,
    TurnOn,
    TurnOff,
    /// A transition was due but the minimum dwell has not elapsed.
    Deferred,
}

impl PowerDecision {
    pub fn next_state(self, current: PowerState) -> PowerState {
        match self {
            Self::TurnOn => PowerState::On,
            Self::TurnOff => PowerState::Off,
            Self::Hold | Self::Deferred => current,
        }
    }
}

/// On/off hysteresis over the average controlled-room temperature. The unit
/// engages `turn_on_threshold_c` past target in the demand direction and
/// disengages `turn_off_threshold_c` past target the other way.
pub fn power_step(
    config: &PowerControlConfig,
    current: PowerState,
    last_change_ms: Option<u64>,
    now_ms: u64,
    average_c: f32,
    target_c: f32,
    direction: ControlDirection,
) -> PowerDecision {
    let demand = direction.demand(average_c, target_c);
    let wanted = match current {
        PowerState::Off if demand >= config.turn_on_threshold_c => PowerDecision::TurnOn,
        PowerState::On if demand <= -config.turn_off_threshold_c => PowerDecision::TurnOff,
        _ => return PowerDecision::Hold,
    };

    let dwell_ms = config.min_dwell_secs.saturating_mul(1_000);
    match last_change_ms {
        Some(last) if now_ms.saturating_sub(last) < dwell_ms => PowerDecision::Deferred,
        _ => wanted,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetpointTier {
    Maintenance,
    Moderate,
    Aggressive,
}

/// Degrees of offset from the neutral setpoint for the worst room's demand.
fn ladder(demand_c: f32) -> f32 {
    const POINTS: [(f32, f32); 4] = [(0.0, 0.0), (0.5, 2.0), (2.0, 4.0), (4.0, 6.0)];
    if demand_c <= 0.0 {
        return 0.0;
    }
    for pair in POINTS.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        if demand_c <= x1 {
            return y0 + (y1 - y0) * (demand_c - x0) / (x1 - x0);
        }
    }
    6.0
}

pub fn round_half(value: f32) -> f32 {
    (value * 2.0).round() / 2.0
}

/// Setpoint for the unit from the largest room demand, rounded to 0.5 °C.
pub fn select_setpoint(max_demand_c: f32, direction: ControlDirection) -> (f32, SetpointTier) {
    let tier = if max_demand_c >= 2.0 {
        SetpointTier::Aggressive
    } else if max_demand_c >= 0.5 {
        SetpointTier::Moderate
    } else {
        SetpointTier::Maintenance
    };
    let offset = ladder(max_demand_c);
    let setpoint = match direction {
        ControlDirection::Cooling => 24.0 - offset,
        ControlDirection::Heating => 20.0 + offset,
    };
    (round_half(setpoint), tier)
}
