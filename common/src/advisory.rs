use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{ControlDirection, HumidityMode, HvacMode, MainFanSpeed, PowerState, RoomStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdvisoryError {
    #[error("advisory service unavailable: {0}")]
    Unavailable(String),
    #[error("advisory service timed out")]
    Timeout,
    #[error("malformed advisory response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRoom {
    pub id: String,
    pub name: String,
    pub temperature_c: f32,
    pub target_c: f32,
    pub deviation_c: f32,
    pub status: RoomStatus,
    pub fan_speed: u8,
    pub humidity_percent: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRequest {
    pub rooms: Vec<AdvisoryRoom>,
    pub target_c: f32,
    pub deadband_c: f32,
    pub hvac_mode: HvacMode,
    pub direction: ControlDirection,
    pub unit_power: PowerState,
    pub outdoor_c: Option<f32>,
    pub auto_setpoint: bool,
    pub humidity_control: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryResponse {
    pub room_fan_speeds: BTreeMap<String, u8>,
    pub main_fan_speed: Option<MainFanSpeed>,
    pub setpoint_c: Option<f32>,
    pub humidity_mode: Option<HumidityMode>,
}

impl AdvisoryRequest {
    pub fn prompt(&self) -> String {
        let mut out = String::new();
        let direction = self.direction.as_str();

        let _ = writeln!(
            out,
            "You balance a multi-zone ducted air conditioner currently {direction}. \
             Each room has a zone damper fan speed from 0 to 100 percent; a higher speed \
             delivers more conditioned air to that room."
        );
        let _ = writeln!(
            out,
            "Target temperature: {:.1}°C (deadband ±{:.1}°C). Configured mode: {}. Unit power: {}.",
            self.target_c,
            self.deadband_c,
            self.hvac_mode.as_str(),
            self.unit_power.as_str()
        );
        if let Some(outdoor) = self.outdoor_c {
            let _ = writeln!(out, "Outdoor temperature: {outdoor:.1}°C.");
        }

        let _ = writeln!(out, "\nRooms:");
        for room in &self.rooms {
            let _ = write!(
                out,
                "- id \"{}\" ({}): {:.1}°C, target {:.1}°C, deviation {:+.1}°C, {}, fan {}%",
                room.id,
                room.name,
                room.temperature_c,
                room.target_c,
                room.deviation_c,
                room.status.as_str(),
                room.fan_speed
            );
            if let Some(humidity) = room.humidity_percent {
                let _ = write!(out, ", humidity {humidity:.0}%");
            }
            out.push('\n');
        }

        let _ = writeln!(
            out,
            "\nRules:\n\
             - Rooms that still need {direction} get 75-100%; rooms already past target get 25-50%.\n\
             - When every room is within the deadband use 70-80% to hold balance.\n\
             - A room that overshot target by under 1°C gets at most 25-35%, 1-2°C 15-25%, \
             2-3°C 5-15%, 3°C or more 0-5%.\n\
             - Change any room by no more than 25% from its current speed."
        );
        if self.auto_setpoint {
            let (aggressive, moderate, maintenance) = match self.direction {
                ControlDirection::Cooling => ("18-20", "20-22", "22-24"),
                ControlDirection::Heating => ("24-26", "22-24", "20-22"),
            };
            let _ = writeln!(
                out,
                "- Unit setpoint: {aggressive}°C when a room is 2°C or more off target, \
                 {moderate}°C when 0.5-2°C off, {maintenance}°C otherwise."
            );
        }
        if self.humidity_control {
            let _ = writeln!(
                out,
                "- Suggest humidity_mode \"dry\" only when temperatures are settled and rooms are humid."
            );
        }

        let _ = writeln!(
            out,
            "\nAnswer with a single JSON object and nothing else:\n\
             {{\"room_fan_speeds\": {{\"<room id>\": <0-100>, ...}}, \
             \"main_fan_speed\": \"low|medium|high\", \"setpoint\": <°C>, \"humidity_mode\": \"cool|dry\"}}\n\
             main_fan_speed, setpoint and humidity_mode are optional."
        );
        out
    }

    fn room_id_for(&self, key: &str) -> Option<&str> {
        let key = key.trim();
        self.rooms
            .iter()
            .find(|room| room.id == key)
            .or_else(|| {
                self.rooms
                    .iter()
                    .find(|room| room.id.eq_ignore_ascii_case(key) || room.name.eq_ignore_ascii_case(key))
            })
            .map(|room| room.id.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct RawAdvice {
    #[serde(default, alias = "fan_speeds", alias = "rooms")]
    room_fan_speeds: BTreeMap<String, Value>,
    #[serde(default)]
    main_fan_speed: Option<Value>,
    #[serde(default, alias = "ac_setpoint")]
    setpoint: Option<Value>,
    #[serde(default)]
    humidity_mode: Option<Value>,
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

/// Extracts the outermost JSON object from `text` and validates it against the
/// rooms that were asked about.
pub fn parse_advice(text: &str, request: &AdvisoryRequest) -> Result<AdvisoryResponse, AdvisoryError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Err(AdvisoryError::MalformedResponse("no JSON object in reply".into())),
    };

    let raw: RawAdvice =
        serde_json::from_str(body).map_err(|err| AdvisoryError::MalformedResponse(err.to_string()))?;

    let mut room_fan_speeds = BTreeMap::new();
    for (key, value) in &raw.room_fan_speeds {
        let (Some(id), Some(speed)) = (request.room_id_for(key), as_number(value)) else {
            continue;
        };
        room_fan_speeds.insert(id.to_string(), speed.round().clamp(0.0, 100.0) as u8);
    }
    if room_fan_speeds.is_empty() {
        return Err(AdvisoryError::MalformedResponse("no usable room fan speeds".into()));
    }

    let main_fan_speed = raw
        .main_fan_speed
        .as_ref()
        .and_then(Value::as_str)
        .and_then(MainFanSpeed::parse);
    let setpoint_c = raw
        .setpoint
        .as_ref()
        .and_then(as_number)
        .map(|value| (value as f32).clamp(16.0, 30.0));
    let humidity_mode = raw
        .humidity_mode
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|mode| match mode.trim().to_ascii_lowercase().as_str() {
            "dry" | "dehumidify" => Some(HumidityMode::Dry),
            "cool" | "cooling" => Some(HumidityMode::Cool),
            _ => None,
        });

    Ok(AdvisoryResponse {
        room_fan_speeds,
        main_fan_speed,
        setpoint_c,
        humidity_mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request() -> AdvisoryRequest {
        let room = |id: &str, name: &str, temp: f32| AdvisoryRoom {
            id: id.to_string(),
            name: name.to_string(),
            temperature_c: temp,
            target_c: 22.0,
            deviation_c: temp - 22.0,
            status: RoomStatus::classify(temp - 22.0, 0.5),
            fan_speed: 50,
            humidity_percent: Some(55.0),
        };
        AdvisoryRequest {
            rooms: vec![room("bedroom", "Bedroom", 25.0), room("study", "Study", 21.0)],
            target_c: 22.0,
            deadband_c: 0.5,
            hvac_mode: HvacMode::Cooling,
            direction: ControlDirection::Cooling,
            unit_power: PowerState::On,
            outdoor_c: Some(31.0),
            auto_setpoint: true,
            humidity_control: false,
        }
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let text = "Here you go:\n```json\n{\"room_fan_speeds\": {\"bedroom\": 95, \"Study\": \"30%\"}, \
                    \"main_fan_speed\": \"High\", \"setpoint\": 19.5, \"humidity_mode\": \"cool\"}\n```";
        let advice = parse_advice(text, &request()).unwrap();

        let expected = AdvisoryResponse {
            room_fan_speeds: BTreeMap::from([("bedroom".to_string(), 95), ("study".to_string(), 30)]),
            main_fan_speed: Some(MainFanSpeed::High),
            setpoint_c: Some(19.5),
            humidity_mode: Some(HumidityMode::Cool),
        };
        assert_eq!(advice, expected);
    }

    #[test]
    fn clamps_and_drops_unknown_rooms() {
        let text = r#"{"room_fan_speeds": {"bedroom": 140, "garage": 50, "study": -4}, "setpoint": 9}"#;
        let advice = parse_advice(text, &request()).unwrap();

        assert_eq!(advice.room_fan_speeds.get("bedroom"), Some(&100));
        assert_eq!(advice.room_fan_speeds.get("study"), Some(&0));
        assert!(!advice.room_fan_speeds.contains_key("garage"));
        assert_eq!(advice.setpoint_c, Some(16.0));
        assert_eq!(advice.main_fan_speed, None);
    }

    #[test]
    fn rejects_replies_without_room_speeds() {
        assert!(matches!(
            parse_advice("I cannot help with that.", &request()),
            Err(AdvisoryError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_advice(r#"{"room_fan_speeds": {"garage": 40}}"#, &request()),
            Err(AdvisoryError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_advice("{not json}", &request()),
            Err(AdvisoryError::MalformedResponse(_))
        ));
    }

    #[test]
    fn prompt_lists_rooms_and_setpoint_rules() {
        let prompt = request().prompt();
        assert!(prompt.contains("id \"bedroom\" (Bedroom): 25.0°C"));
        assert!(prompt.contains("deviation -1.0°C"));
        assert!(prompt.contains("Outdoor temperature: 31.0°C"));
        assert!(prompt.contains("18-20°C"));
        assert!(prompt.contains("room_fan_speeds"));
        assert!(!prompt.contains("humidity_mode \"dry\" only"));
    }
}
