use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::config::{ControllerConfig, WeatherConfig};
use crate::schedule::active_schedule;
use crate::types::ControlDirection;
use crate::weather::weather_adjustment;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub effective_c: f32,
    /// Configured target, or the active schedule's target when one matches.
    pub base_c: f32,
    pub schedule: Option<String>,
    pub weather_adjustment_c: f32,
    pub outdoor_c: Option<f32>,
}

/// The dedicated outdoor sensor wins; the weather feed only fills in when it is missing.
pub fn select_outdoor(
    weather: &WeatherConfig,
    outdoor_sensor_c: Option<f32>,
    weather_feed_c: Option<f32>,
) -> Option<f32> {
    if !weather.enabled {
        return None;
    }
    let sensor = outdoor_sensor_c.filter(|_| weather.use_outdoor_sensor);
    let feed = weather_feed_c.filter(|_| weather.use_weather_feed);
    sensor.or(feed)
}

pub fn resolve_target(
    config: &ControllerConfig,
    direction: ControlDirection,
    outdoor_c: Option<f32>,
    now: DateTime<FixedOffset>,
) -> ResolvedTarget {
    let schedule = if config.scheduling_enabled {
        active_schedule(&config.schedules, now, config.schedule_tie_break)
    } else {
        None
    };

    let base_c = schedule
        .map(|schedule| schedule.target_temp_c)
        .unwrap_or(config.target_temp_c);
    let adjustment = weather_adjustment(outdoor_c, direction);

    ResolvedTarget {
        effective_c: base_c + adjustment,
        base_c,
        schedule: schedule.map(|schedule| schedule.name.clone()),
        weather_adjustment_c: adjustment,
        outdoor_c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::tests::{fixed_time, schedule};
    use crate::schedule::DaySelector;

    #[test]
    fn hot_day_lowers_cooling_target() {
        let config = ControllerConfig::default();
        let resolved = resolve_target(&config, ControlDirection::Cooling, Some(32.0), fixed_time(5, 14, 0));

        assert!((21.5..=21.7).contains(&resolved.effective_c), "{}", resolved.effective_c);
        assert_eq!(resolved.base_c, 22.0);
        assert!(resolved.schedule.is_none());
    }

    #[test]
    fn active_schedule_overrides_base_target() {
        let config = ControllerConfig {
            schedules: vec![schedule("Sleep", vec![DaySelector::All], 22 * 60, 8 * 60, 20.0)],
            ..ControllerConfig::default()
        };

        for day in 5..=11 {
            let resolved = resolve_target(&config, ControlDirection::Cooling, None, fixed_time(day, 23, 0));
            assert_eq!(resolved.effective_c, 20.0);
            assert_eq!(resolved.schedule.as_deref(), Some("Sleep"));
        }
    }

    #[test]
    fn disabled_scheduling_ignores_schedules() {
        let config = ControllerConfig {
            scheduling_enabled: false,
            schedules: vec![schedule("Sleep", vec![DaySelector::All], 22 * 60, 8 * 60, 20.0)],
            ..ControllerConfig::default()
        };
        let resolved = resolve_target(&config, ControlDirection::Cooling, None, fixed_time(5, 23, 0));

        assert_eq!(resolved.effective_c, 22.0);
    }

    #[test]
    fn outdoor_sensor_preferred_over_feed() {
        let weather = WeatherConfig::default();
        assert_eq!(select_outdoor(&weather, Some(31.0), Some(28.0)), Some(31.0));
        assert_eq!(select_outdoor(&weather, None, Some(28.0)), Some(28.0));

        let sensor_only = WeatherConfig {
            use_weather_feed: false,
            ..WeatherConfig::default()
        };
        assert_eq!(select_outdoor(&sensor_only, None, Some(28.0)), None);

        let disabled = WeatherConfig {
            enabled: false,
            ..WeatherConfig::default()
        };
        assert_eq!(select_outdoor(&disabled, Some(31.0), Some(28.0)), None);
    }
}
