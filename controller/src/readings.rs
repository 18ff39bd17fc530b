use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use aircon_common::{
    to_celsius, ControllerConfig, MainFanSpeed, PowerState, Room, SensorSnapshot, UnitMode,
    UnitReport,
};

const MIN_VALID_TEMP_C: f32 = -40.0;
const MAX_VALID_TEMP_C: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Reading {
    value: f32,
    at_ms: u64,
}

#[derive(Debug, Deserialize)]
struct UnitPayload {
    value: f32,
    #[serde(default)]
    unit: String,
}

fn parse_value(payload: &str) -> Option<(f32, String)> {
    let payload = payload.trim();
    if let Ok(value) = payload.parse::<f32>() {
        return Some((value, String::new()));
    }
    let parsed: UnitPayload = serde_json::from_str(payload).ok()?;
    Some((parsed.value, parsed.unit))
}

/// Bare numbers are Celsius; JSON payloads may carry a unit.
pub fn parse_temperature(payload: &str) -> Option<f32> {
    let (value, unit) = parse_value(payload)?;
    let celsius = to_celsius(value, &unit);
    (celsius.is_finite() && (MIN_VALID_TEMP_C..=MAX_VALID_TEMP_C).contains(&celsius)).then_some(celsius)
}

pub fn parse_humidity(payload: &str) -> Option<f32> {
    let (value, _) = parse_value(payload)?;
    (value.is_finite() && (0.0..=100.0).contains(&value)).then_some(value)
}

pub fn parse_fan_speed(payload: &str) -> Option<u8> {
    let (value, _) = parse_value(payload)?;
    (value.is_finite() && (0.0..=100.0).contains(&value)).then(|| value.round() as u8)
}

#[derive(Debug, Default, Deserialize)]
pub struct UnitStatePayload {
    #[serde(default)]
    pub power: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub setpoint: Option<f32>,
    #[serde(rename = "fanMode", default)]
    pub fan_mode: Option<String>,
}

impl UnitStatePayload {
    pub fn into_report(self) -> UnitReport {
        let power = self.power.as_deref().and_then(|power| {
            match power.trim().to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => Some(PowerState::On),
                "off" | "false" | "0" => Some(PowerState::Off),
                _ => None,
            }
        });
        UnitReport {
            power,
            mode: self.mode.as_deref().and_then(UnitMode::parse),
            setpoint_c: self
                .setpoint
                .filter(|value| value.is_finite() && (10.0..=35.0).contains(value)),
            fan: self.fan_mode.as_deref().and_then(MainFanSpeed::parse),
        }
    }
}

/// Latest values received over MQTT, timestamped for staleness checks.
#[derive(Debug, Clone, Default)]
pub struct LiveReadings {
    temperatures: HashMap<String, Reading>,
    humidity: HashMap<String, Reading>,
    fan_speeds: HashMap<String, u8>,
    outdoor: Option<Reading>,
    weather: Option<Reading>,
    unit: UnitReport,
}

impl LiveReadings {
    pub fn record_temperature(&mut self, room: &str, celsius: f32, now_ms: u64) {
        self.temperatures.insert(room.to_string(), Reading { value: celsius, at_ms: now_ms });
    }

    pub fn record_humidity(&mut self, room: &str, percent: f32, now_ms: u64) {
        self.humidity.insert(room.to_string(), Reading { value: percent, at_ms: now_ms });
    }

    pub fn record_fan_speed(&mut self, room: &str, percent: u8) {
        self.fan_speeds.insert(room.to_string(), percent.min(100));
    }

    pub fn record_outdoor(&mut self, celsius: f32, now_ms: u64) {
        self.outdoor = Some(Reading { value: celsius, at_ms: now_ms });
    }

    pub fn record_weather(&mut self, celsius: f32, now_ms: u64) {
        self.weather = Some(Reading { value: celsius, at_ms: now_ms });
    }

    pub fn record_unit(&mut self, report: UnitReport) {
        self.unit = report;
    }

    /// Builds the per-cycle snapshot for the configured rooms. Readings older
    /// than the stale timeout are reported as unavailable; rooms without fan
    /// feedback fall back to `known_speeds`.
    pub fn snapshot(
        &self,
        config: &ControllerConfig,
        now_ms: u64,
        known_speeds: &BTreeMap<String, u8>,
    ) -> SensorSnapshot {
        let stale_ms = config.sensor_stale_timeout_secs.saturating_mul(1_000);
        let fresh = |reading: Option<&Reading>| {
            reading
                .filter(|reading| now_ms.saturating_sub(reading.at_ms) <= stale_ms)
                .map(|reading| reading.value)
        };

        let rooms = config
            .rooms
            .iter()
            .map(|room| Room {
                id: room.id.clone(),
                name: room.display_name().to_string(),
                temperature_c: fresh(self.temperatures.get(&room.id)),
                humidity_percent: fresh(self.humidity.get(&room.id)),
                fan_speed: self
                    .fan_speeds
                    .get(&room.id)
                    .or_else(|| known_speeds.get(&room.id))
                    .copied()
                    .unwrap_or(0),
                override_disabled: room.override_disabled,
            })
            .collect();

        SensorSnapshot {
            rooms,
            outdoor_sensor_c: fresh(self.outdoor.as_ref()),
            weather_feed_c: fresh(self.weather.as_ref()),
            unit: self.unit.clone(),
            polled_at_ms: now_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircon_common::RoomConfig;

    fn config() -> ControllerConfig {
        ControllerConfig {
            rooms: vec![
                RoomConfig {
                    id: "bedroom".into(),
                    name: "Main Bedroom".into(),
                    override_disabled: false,
                },
                RoomConfig {
                    id: "study".into(),
                    name: String::new(),
                    override_disabled: true,
                },
            ],
            ..ControllerConfig::default()
        }
    }

    #[test]
    fn parses_plain_and_unit_payloads() {
        assert_eq!(parse_temperature("23.5"), Some(23.5));
        let fahrenheit = parse_temperature(r#"{"value": 77, "unit": "°F"}"#).unwrap();
        assert!((fahrenheit - 25.0).abs() < 1e-4);
        assert_eq!(parse_temperature(r#"{"value": 21, "unit": "°C"}"#), Some(21.0));
        assert_eq!(parse_temperature("unavailable"), None);
        assert_eq!(parse_temperature("95"), None);
        assert_eq!(parse_humidity("55"), Some(55.0));
        assert_eq!(parse_humidity("120"), None);
        assert_eq!(parse_fan_speed("74.6"), Some(75));
        assert_eq!(parse_fan_speed("-3"), None);
    }

    #[test]
    fn stale_readings_become_unavailable() {
        let config = config();
        let mut readings = LiveReadings::default();
        readings.record_temperature("bedroom", 24.0, 0);
        readings.record_humidity("bedroom", 60.0, 250_000);
        readings.record_outdoor(31.0, 0);

        let fresh = readings.snapshot(&config, 300_000, &BTreeMap::new());
        assert_eq!(fresh.rooms[0].temperature_c, Some(24.0));
        assert_eq!(fresh.outdoor_sensor_c, Some(31.0));

        let stale = readings.snapshot(&config, 300_001, &BTreeMap::new());
        assert_eq!(stale.rooms[0].temperature_c, None);
        assert_eq!(stale.rooms[0].humidity_percent, Some(60.0));
        assert_eq!(stale.outdoor_sensor_c, None);
    }

    #[test]
    fn snapshot_follows_configured_rooms() {
        let config = config();
        let mut readings = LiveReadings::default();
        readings.record_temperature("garage", 30.0, 0);
        readings.record_fan_speed("bedroom", 80);

        let known = BTreeMap::from([("study".to_string(), 45)]);
        let snapshot = readings.snapshot(&config, 1_000, &known);

        assert_eq!(snapshot.rooms.len(), 2);
        assert_eq!(snapshot.rooms[0].name, "Main Bedroom");
        assert_eq!(snapshot.rooms[0].fan_speed, 80);
        assert_eq!(snapshot.rooms[1].name, "study");
        assert_eq!(snapshot.rooms[1].fan_speed, 45);
        assert!(snapshot.rooms[1].override_disabled);
        assert_eq!(snapshot.polled_at_ms, 1_000);
    }

    #[test]
    fn unit_state_payload_maps_to_report() {
        let payload: UnitStatePayload =
            serde_json::from_str(r#"{"power": "ON", "mode": "dry", "setpoint": 23.0, "fanMode": "medium"}"#)
                .unwrap();
        let report = payload.into_report();
        assert_eq!(report.power, Some(PowerState::On));
        assert_eq!(report.mode, Some(UnitMode::Dry));
        assert_eq!(report.setpoint_c, Some(23.0));
        assert_eq!(report.fan, Some(MainFanSpeed::Medium));

        let unknown = UnitStatePayload {
            power: Some("standby".into()),
            ..UnitStatePayload::default()
        }
        .into_report();
        assert_eq!(unknown.power, None);
        assert_eq!(unknown.power_or_on(), PowerState::On);
    }
}
