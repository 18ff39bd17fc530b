use serde::{Deserialize, Serialize};

use crate::types::{ControlDirection, MainFanSpeed, PowerState, UnitMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    /// `None` when the sensor is missing or stale.
    pub temperature_c: Option<f32>,
    pub humidity_percent: Option<f32>,
    pub fan_speed: u8,
    pub override_disabled: bool,
}

impl Room {
    /// Rooms the cycle may adjust and count toward aggregate statistics.
    pub fn is_controlled(&self) -> bool {
        !self.override_disabled && self.temperature_c.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub power: Option<PowerState>,
    pub mode: Option<UnitMode>,
    pub setpoint_c: Option<f32>,
    pub fan: Option<MainFanSpeed>,
}

impl UnitReport {
    /// Without feedback from the unit it is assumed to be running.
    pub fn power_or_on(&self) -> PowerState {
        self.power.unwrap_or(PowerState::On)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub rooms: Vec<Room>,
    pub outdoor_sensor_c: Option<f32>,
    pub weather_feed_c: Option<f32>,
    pub unit: UnitReport,
    pub polled_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomStats {
    pub count: usize,
    pub average_temp_c: f32,
    pub mean_abs_deviation_c: f32,
    pub max_abs_deviation_c: f32,
    /// Largest demand of any room; positive means some room still needs conditioning.
    pub max_demand_c: f32,
    /// Hottest minus coldest room.
    pub spread_c: f32,
    pub average_humidity: Option<f32>,
}

impl RoomStats {
    /// Statistics over controlled rooms only. `None` when no controlled room has a reading.
    pub fn compute(rooms: &[Room], target_c: f32, direction: ControlDirection) -> Option<Self> {
        let controlled: Vec<(f32, Option<f32>)> = rooms
            .iter()
            .filter(|room| !room.override_disabled)
            .filter_map(|room| room.temperature_c.map(|temp| (temp, room.humidity_percent)))
            .collect();
        if controlled.is_empty() {
            return None;
        }

        let count = controlled.len();
        let n = count as f32;
        let mut sum = 0.0;
        let mut abs_sum = 0.0;
        let mut max_abs = 0.0f32;
        let mut max_demand = f32::MIN;
        let mut min_temp = f32::MAX;
        let mut max_temp = f32::MIN;

        for (temp, _) in &controlled {
            let deviation = temp - target_c;
            sum += temp;
            abs_sum += deviation.abs();
            max_abs = max_abs.max(deviation.abs());
            max_demand = max_demand.max(direction.demand(*temp, target_c));
            min_temp = min_temp.min(*temp);
            max_temp = max_temp.max(*temp);
        }

        let humidities: Vec<f32> = controlled.iter().filter_map(|(_, humidity)| *humidity).collect();
        let average_humidity = if humidities.is_empty() {
            None
        } else {
            Some(humidities.iter().sum::<f32>() / humidities.len() as f32)
        };

        Some(Self {
            count,
            average_temp_c: sum / n,
            mean_abs_deviation_c: abs_sum / n,
            max_abs_deviation_c: max_abs,
            max_demand_c: max_demand,
            spread_c: max_temp - min_temp,
            average_humidity,
        })
    }

    pub fn all_within(&self, deadband_c: f32) -> bool {
        self.max_abs_deviation_c <= deadband_c
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn room(id: &str, temp: Option<f32>, fan: u8) -> Room {
        Room {
            id: id.to_string(),
            name: id.to_string(),
            temperature_c: temp,
            humidity_percent: None,
            fan_speed: fan,
            override_disabled: false,
        }
    }

    #[test]
    fn stats_skip_override_and_missing_rooms() {
        let mut frozen = room("garage", Some(35.0), 40);
        frozen.override_disabled = true;
        let rooms = vec![
            room("bedroom", Some(24.0), 50),
            room("study", Some(21.0), 50),
            room("attic", None, 50),
            frozen,
        ];

        let stats = RoomStats::compute(&rooms, 22.0, ControlDirection::Cooling).unwrap();

        assert_eq!(stats.count, 2);
        assert_eq!(stats.average_temp_c, 22.5);
        assert_eq!(stats.max_abs_deviation_c, 2.0);
        assert_eq!(stats.mean_abs_deviation_c, 1.5);
        assert_eq!(stats.max_demand_c, 2.0);
        assert_eq!(stats.spread_c, 3.0);
        assert!(!stats.all_within(0.5));
    }

    #[test]
    fn heating_demand_measures_cold_rooms() {
        let rooms = vec![room("bedroom", Some(24.0), 50), room("study", Some(19.0), 50)];
        let stats = RoomStats::compute(&rooms, 22.0, ControlDirection::Heating).unwrap();
        assert_eq!(stats.max_demand_c, 3.0);
    }

    #[test]
    fn average_humidity_uses_rooms_with_sensors() {
        let mut wet = room("bath", Some(22.0), 50);
        wet.humidity_percent = Some(70.0);
        let mut dry = room("study", Some(22.0), 50);
        dry.humidity_percent = Some(50.0);
        let rooms = vec![wet, dry, room("hall", Some(22.0), 50)];

        let stats = RoomStats::compute(&rooms, 22.0, ControlDirection::Cooling).unwrap();
        assert_eq!(stats.average_humidity, Some(60.0));
    }

    #[test]
    fn no_readings_yields_no_stats() {
        let rooms = vec![room("attic", None, 50)];
        assert!(RoomStats::compute(&rooms, 22.0, ControlDirection::Cooling).is_none());
    }
}
