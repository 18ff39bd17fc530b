use serde::{Deserialize, Serialize};

use crate::types::{MainFanSpeed, UnitMode};

/// Commands the cycle hands to the actuator layer, in issue order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum ActuatorCommand {
    SetZoneFanSpeed { room: String, percent: u8 },
    SetMainFanSpeed { speed: MainFanSpeed },
    SetUnitPower { on: bool },
    SetUnitMode { mode: UnitMode },
    SetUnitSetpoint { celsius: f32 },
}

impl ActuatorCommand {
    pub fn describe(&self) -> String {
        match self {
            Self::SetZoneFanSpeed { room, percent } => format!("zone {room} fan {percent}%"),
            Self::SetMainFanSpeed { speed } => format!("main fan {}", speed.as_str()),
            Self::SetUnitPower { on } => format!("unit power {}", if *on { "on" } else { "off" }),
            Self::SetUnitMode { mode } => format!("unit mode {}", mode.as_str()),
            Self::SetUnitSetpoint { celsius } => format!("unit setpoint {celsius:.1}°C"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}
