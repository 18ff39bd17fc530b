use serde::{Deserialize, Serialize};

use crate::schedule::{Schedule, ScheduleTieBreak};
use crate::types::HvacMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryProvider {
    #[default]
    None,
    Anthropic,
    OpenAi,
}

impl AdvisoryProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    Fast,
    Balanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub provider: AdvisoryProvider,
    pub api_key: String,
    pub tier: ModelTier,
    /// Explicit model name; empty picks the provider's model for `tier`.
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            provider: AdvisoryProvider::None,
            api_key: String::new(),
            tier: ModelTier::Fast,
            model: String::new(),
            base_url: String::new(),
            timeout_secs: 30,
        }
    }
}

impl AdvisoryConfig {
    pub fn enabled(&self) -> bool {
        self.provider != AdvisoryProvider::None && !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerControlConfig {
    pub auto_power: bool,
    /// Degrees past target (in the demand direction) at which the unit engages.
    pub turn_on_threshold_c: f32,
    /// Degrees past target (against the demand direction) at which the unit disengages.
    pub turn_off_threshold_c: f32,
    pub min_dwell_secs: u64,
}

impl Default for PowerControlConfig {
    fn default() -> Self {
        Self {
            auto_power: false,
            turn_on_threshold_c: 1.0,
            turn_off_threshold_c: 2.0,
            min_dwell_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub enabled: bool,
    pub use_outdoor_sensor: bool,
    pub use_weather_feed: bool,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_outdoor_sensor: true,
            use_weather_feed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HumidityConfig {
    pub enabled: bool,
    pub min_percent: f32,
    pub max_percent: f32,
    pub deadband_percent: f32,
}

impl Default for HumidityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_percent: 30.0,
            max_percent: 60.0,
            deadband_percent: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub override_disabled: bool,
}

impl RoomConfig {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub target_temp_c: f32,
    pub deadband_c: f32,
    pub optimize_interval_secs: u64,
    pub poll_interval_secs: u64,
    pub sensor_stale_timeout_secs: u64,
    pub startup_grace_secs: u64,
    pub hvac_mode: HvacMode,
    pub max_fan_step_percent: u8,
    pub control_main_fan: bool,
    pub notifications_enabled: bool,
    pub advisory: AdvisoryConfig,
    pub power: PowerControlConfig,
    pub auto_setpoint: bool,
    pub weather: WeatherConfig,
    pub scheduling_enabled: bool,
    pub schedule_tie_break: ScheduleTieBreak,
    pub schedules: Vec<Schedule>,
    pub humidity: HumidityConfig,
    pub rooms: Vec<RoomConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target_temp_c: 22.0,
            deadband_c: 0.5,
            optimize_interval_secs: 300,
            poll_interval_secs: 30,
            sensor_stale_timeout_secs: 300,
            startup_grace_secs: 120,
            hvac_mode: HvacMode::Cooling,
            max_fan_step_percent: 25,
            control_main_fan: false,
            notifications_enabled: true,
            advisory: AdvisoryConfig::default(),
            power: PowerControlConfig::default(),
            auto_setpoint: false,
            weather: WeatherConfig::default(),
            scheduling_enabled: true,
            schedule_tie_break: ScheduleTieBreak::LastDefined,
            schedules: Vec::new(),
            humidity: HumidityConfig::default(),
            rooms: Vec::new(),
        }
    }
}

impl ControllerConfig {
    pub fn sanitize(&mut self) {
        self.target_temp_c = sane(self.target_temp_c, 22.0).clamp(16.0, 30.0);
        self.deadband_c = sane(self.deadband_c, 0.5).clamp(0.1, 3.0);
        self.optimize_interval_secs = self.optimize_interval_secs.clamp(60, 3_600);
        self.poll_interval_secs = self.poll_interval_secs.clamp(5, 600);
        self.sensor_stale_timeout_secs = self
            .sensor_stale_timeout_secs
            .clamp(self.poll_interval_secs, 86_400);
        self.startup_grace_secs = self.startup_grace_secs.min(3_600);
        self.max_fan_step_percent = self.max_fan_step_percent.clamp(10, 25);

        self.advisory.timeout_secs = self.advisory.timeout_secs.clamp(5, 120);

        self.power.turn_on_threshold_c = sane(self.power.turn_on_threshold_c, 1.0).clamp(0.5, 3.0);
        self.power.turn_off_threshold_c =
            sane(self.power.turn_off_threshold_c, 2.0).clamp(1.0, 5.0);
        self.power.min_dwell_secs = self.power.min_dwell_secs.clamp(60, 3_600);

        let humidity = &mut self.humidity;
        humidity.min_percent = sane(humidity.min_percent, 30.0).clamp(10.0, 60.0);
        humidity.max_percent = sane(humidity.max_percent, 60.0).clamp(humidity.min_percent + 5.0, 90.0);
        humidity.deadband_percent = sane(humidity.deadband_percent, 5.0).clamp(1.0, 15.0);

        for schedule in &mut self.schedules {
            schedule.sanitize();
        }

        // Later duplicates of a room id are dropped.
        let mut seen = std::collections::BTreeSet::new();
        self.rooms
            .retain(|room| !room.id.trim().is_empty() && seen.insert(room.id.clone()));
    }

    pub fn room(&self, id: &str) -> Option<&RoomConfig> {
        self.rooms.iter().find(|room| room.id == id)
    }
}

fn sane(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub controller: ControllerConfig,
    pub timezone: String,
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            timezone: "America/Los_Angeles".to_string(),
            network: NetworkConfig::default(),
        }
    }
}
