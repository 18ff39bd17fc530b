use serde::{Deserialize, Serialize};

use crate::room::RoomStats;

/// Demand at which the equalizing speed saturates.
const FULL_SCALE_C: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPhase {
    Equalizing,
    Maintenance,
}

impl FallbackPhase {
    pub fn select(stats: &RoomStats, deadband_c: f32) -> Self {
        if stats.all_within(deadband_c) {
            Self::Maintenance
        } else {
            Self::Equalizing
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedBand {
    pub min: u8,
    pub max: u8,
}

impl SpeedBand {
    pub fn clamp(self, speed: u8) -> u8 {
        speed.clamp(self.min, self.max)
    }
}

pub fn band(phase: FallbackPhase, demand_c: f32) -> SpeedBand {
    match phase {
        FallbackPhase::Equalizing if demand_c > 0.0 => SpeedBand { min: 75, max: 100 },
        FallbackPhase::Equalizing => SpeedBand { min: 25, max: 50 },
        FallbackPhase::Maintenance => SpeedBand { min: 70, max: 80 },
    }
}

/// Rule speed for one room before rate limiting. Rooms still needing
/// conditioning get more air; rooms past target get less.
pub fn recommend(phase: FallbackPhase, demand_c: f32, deadband_c: f32) -> u8 {
    let speed = match phase {
        FallbackPhase::Equalizing if demand_c > 0.0 => 75.0 + 25.0 * (demand_c / FULL_SCALE_C).min(1.0),
        FallbackPhase::Equalizing => 50.0 - 25.0 * (-demand_c / FULL_SCALE_C).min(1.0),
        FallbackPhase::Maintenance => {
            let ratio = if deadband_c > 0.0 {
                (demand_c / deadband_c).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            75.0 + 5.0 * ratio
        }
    };
    speed.round().clamp(0.0, 100.0) as u8
}

/// Bounds the change from the room's previous recommendation, then pulls the
/// result back into the rule band.
pub fn rate_limit(previous: Option<u8>, proposed: u8, max_step: u8, band: SpeedBand) -> u8 {
    let Some(previous) = previous else {
        return band.clamp(proposed);
    };
    let low = previous.saturating_sub(max_step);
    let high = previous.saturating_add(max_step).min(100);
    band.clamp(proposed.clamp(low, high))
}

/// Full fallback recommendation for one room.
pub fn fallback_speed(
    phase: FallbackPhase,
    demand_c: f32,
    deadband_c: f32,
    previous: Option<u8>,
    max_step: u8,
) -> u8 {
    let proposed = recommend(phase, demand_c, deadband_c);
    rate_limit(previous, proposed, max_step, band(phase, demand_c))
}
