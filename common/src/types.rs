use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    #[default]
    Cooling,
    Heating,
    Auto,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cooling => "cooling",
            Self::Heating => "heating",
            Self::Auto => "auto",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cooling" | "cool" => Some(Self::Cooling),
            "heating" | "heat" => Some(Self::Heating),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    /// `Auto` follows whatever the controlled unit reports; only `heat` flips it to heating.
    pub fn resolve(self, unit_mode: Option<UnitMode>) -> ControlDirection {
        match self {
            Self::Cooling => ControlDirection::Cooling,
            Self::Heating => ControlDirection::Heating,
            Self::Auto => match unit_mode {
                Some(UnitMode::Heat) => ControlDirection::Heating,
                _ => ControlDirection::Cooling,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlDirection {
    Cooling,
    Heating,
}

impl ControlDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cooling => "cooling",
            Self::Heating => "heating",
        }
    }

    /// Positive when the room still needs conditioning, negative once it has overshot.
    pub fn demand(self, temperature: f32, target: f32) -> f32 {
        match self {
            Self::Cooling => temperature - target,
            Self::Heating => target - temperature,
        }
    }

    pub fn primary_mode(self) -> UnitMode {
        match self {
            Self::Cooling => UnitMode::Cool,
            Self::Heating => UnitMode::Heat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitMode {
    Cool,
    Dry,
    Heat,
}

impl UnitMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cool => "cool",
            Self::Dry => "dry",
            Self::Heat => "heat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cool" | "cooling" => Some(Self::Cool),
            "dry" | "dehumidify" => Some(Self::Dry),
            "heat" | "heating" => Some(Self::Heat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MainFanSpeed {
    Low,
    Medium,
    High,
}

impl MainFanSpeed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }

    pub fn from_bool(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumidityMode {
    #[default]
    Cool,
    Dry,
}

impl HumidityMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cool => "cool",
            Self::Dry => "dry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    TooHot,
    TooCold,
    AtTarget,
}

impl RoomStatus {
    pub fn classify(deviation: f32, deadband: f32) -> Self {
        if deviation.abs() <= deadband {
            Self::AtTarget
        } else if deviation > 0.0 {
            Self::TooHot
        } else {
            Self::TooCold
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TooHot => "too_hot",
            Self::TooCold => "too_cold",
            Self::AtTarget => "at_target",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumidityStatus {
    Dry,
    Comfortable,
    Humid,
    Unknown,
}

/// Converts a reading reported in `unit` to Celsius. Unknown units are taken as Celsius.
pub fn to_celsius(value: f32, unit: &str) -> f32 {
    match unit.trim() {
        "°F" | "F" | "fahrenheit" | "Fahrenheit" => (value - 32.0) * 5.0 / 9.0,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_mode_follows_unit() {
        assert_eq!(
            HvacMode::Auto.resolve(Some(UnitMode::Heat)),
            ControlDirection::Heating
        );
        assert_eq!(
            HvacMode::Auto.resolve(Some(UnitMode::Dry)),
            ControlDirection::Cooling
        );
        assert_eq!(HvacMode::Auto.resolve(None), ControlDirection::Cooling);
        assert_eq!(
            HvacMode::Heating.resolve(Some(UnitMode::Cool)),
            ControlDirection::Heating
        );
    }

    #[test]
    fn demand_sign_follows_direction() {
        assert_eq!(ControlDirection::Cooling.demand(25.0, 22.0), 3.0);
        assert_eq!(ControlDirection::Heating.demand(25.0, 22.0), -3.0);
    }

    #[test]
    fn classifies_room_status_with_deadband() {
        assert_eq!(RoomStatus::classify(0.5, 0.5), RoomStatus::AtTarget);
        assert_eq!(RoomStatus::classify(0.6, 0.5), RoomStatus::TooHot);
        assert_eq!(RoomStatus::classify(-0.6, 0.5), RoomStatus::TooCold);
    }

    #[test]
    fn converts_fahrenheit() {
        assert!((to_celsius(77.0, "°F") - 25.0).abs() < 1e-4);
        assert_eq!(to_celsius(25.0, "°C"), 25.0);
        assert_eq!(to_celsius(25.0, "kelvinish"), 25.0);
    }
}
