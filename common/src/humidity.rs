use crate::config::HumidityConfig;
use crate::types::{ControlDirection, HumidityMode, HumidityStatus};

/// Cool/Dry state machine. Temperature always preempts humidity: Dry is only
/// entered, and only kept, while every room sits inside the deadband.
pub fn next_mode(
    current: HumidityMode,
    config: &HumidityConfig,
    direction: ControlDirection,
    temperatures_settled: bool,
    average_humidity: Option<f32>,
) -> HumidityMode {
    if !config.enabled || direction == ControlDirection::Heating {
        return HumidityMode::Cool;
    }
    let Some(humidity) = average_humidity else {
        return HumidityMode::Cool;
    };

    match current {
        HumidityMode::Cool
            if temperatures_settled && humidity > config.max_percent + config.deadband_percent =>
        {
            HumidityMode::Dry
        }
        HumidityMode::Dry if !temperatures_settled || humidity <= config.max_percent => HumidityMode::Cool,
        other => other,
    }
}

pub fn humidity_status(average_humidity: Option<f32>, config: &HumidityConfig) -> HumidityStatus {
    match average_humidity {
        None => HumidityStatus::Unknown,
        Some(value) if value < config.min_percent => HumidityStatus::Dry,
        Some(value) if value > config.max_percent => HumidityStatus::Humid,
        Some(_) => HumidityStatus::Comfortable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> HumidityConfig {
        HumidityConfig {
            enabled: true,
            ..HumidityConfig::default()
        }
    }

    #[test]
    fn enters_dry_only_above_max_plus_deadband() {
        let config = enabled();
        let cooling = ControlDirection::Cooling;
        assert_eq!(next_mode(HumidityMode::Cool, &config, cooling, true, Some(65.0)), HumidityMode::Cool);
        assert_eq!(next_mode(HumidityMode::Cool, &config, cooling, true, Some(65.5)), HumidityMode::Dry);
        assert_eq!(next_mode(HumidityMode::Cool, &config, cooling, false, Some(80.0)), HumidityMode::Cool);
    }

    #[test]
    fn temperature_preempts_dry() {
        let config = enabled();
        assert_eq!(
            next_mode(HumidityMode::Dry, &config, ControlDirection::Cooling, false, Some(80.0)),
            HumidityMode::Cool
        );
    }

    #[test]
    fn leaves_dry_once_back_in_comfort_band() {
        let config = enabled();
        let cooling = ControlDirection::Cooling;
        assert_eq!(next_mode(HumidityMode::Dry, &config, cooling, true, Some(62.0)), HumidityMode::Dry);
        assert_eq!(next_mode(HumidityMode::Dry, &config, cooling, true, Some(60.0)), HumidityMode::Cool);
    }

    #[test]
    fn no_sensors_or_disabled_stays_cool() {
        let cooling = ControlDirection::Cooling;
        assert_eq!(next_mode(HumidityMode::Dry, &enabled(), cooling, true, None), HumidityMode::Cool);
        assert_eq!(
            next_mode(HumidityMode::Cool, &HumidityConfig::default(), cooling, true, Some(90.0)),
            HumidityMode::Cool
        );
        assert_eq!(
            next_mode(HumidityMode::Cool, &enabled(), ControlDirection::Heating, true, Some(90.0)),
            HumidityMode::Cool
        );
    }

    #[test]
    fn reports_status_against_bounds() {
        let config = enabled();
        assert_eq!(humidity_status(None, &config), HumidityStatus::Unknown);
        assert_eq!(humidity_status(Some(25.0), &config), HumidityStatus::Dry);
        assert_eq!(humidity_status(Some(45.0), &config), HumidityStatus::Comfortable);
        assert_eq!(humidity_status(Some(61.0), &config), HumidityStatus::Humid);
    }
}
