use crate::types::ControlDirection;

const COMFORT_LOW_C: f32 = 20.0;
const COMFORT_HIGH_C: f32 = 25.0;
const WARM_C: f32 = 30.0;
const HOT_C: f32 = 35.0;
const COOL_C: f32 = 15.0;
const COLD_C: f32 = 5.0;
const MIN_STEP_C: f32 = 0.25;
const MAX_STEP_C: f32 = 0.5;

/// Unsigned size of the correction for an outdoor temperature.
fn magnitude(outdoor_c: f32) -> f32 {
    if outdoor_c > WARM_C {
        let ratio = ((outdoor_c - WARM_C) / (HOT_C - WARM_C)).min(1.0);
        MIN_STEP_C + (MAX_STEP_C - MIN_STEP_C) * ratio
    } else if outdoor_c > COMFORT_HIGH_C {
        MIN_STEP_C
    } else if outdoor_c >= COMFORT_LOW_C {
        0.0
    } else if outdoor_c >= COOL_C {
        MIN_STEP_C
    } else {
        let ratio = ((COOL_C - outdoor_c) / (COOL_C - COLD_C)).min(1.0);
        MIN_STEP_C + (MAX_STEP_C - MIN_STEP_C) * ratio
    }
}

/// Signed offset added to the target. Hot weather lowers a cooling target and
/// raises a heating one; cold weather does the opposite.
pub fn weather_adjustment(outdoor_c: Option<f32>, direction: ControlDirection) -> f32 {
    let Some(outdoor_c) = outdoor_c.filter(|value| value.is_finite()) else {
        return 0.0;
    };

    let magnitude = magnitude(outdoor_c);
    let hot = outdoor_c > COMFORT_HIGH_C;
    match (direction, hot) {
        (ControlDirection::Cooling, true) | (ControlDirection::Heating, false) => -magnitude,
        (ControlDirection::Cooling, false) | (ControlDirection::Heating, true) => magnitude,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn comfort_band_has_no_adjustment() {
        for outdoor in [20.0, 22.5, 25.0] {
            assert_eq!(weather_adjustment(Some(outdoor), ControlDirection::Cooling), 0.0);
            assert_eq!(weather_adjustment(Some(outdoor), ControlDirection::Heating), 0.0);
        }
    }

    #[test]
    fn hot_weather_scales_between_thresholds() {
        let cooling = ControlDirection::Cooling;
        assert!(close(weather_adjustment(Some(28.0), cooling), -0.25));
        assert!(close(weather_adjustment(Some(30.0), cooling), -0.25));
        assert!(close(weather_adjustment(Some(32.0), cooling), -0.35));
        assert!(close(weather_adjustment(Some(35.0), cooling), -0.5));
        assert!(close(weather_adjustment(Some(42.0), cooling), -0.5));
    }

    #[test]
    fn cold_weather_raises_cooling_target() {
        let cooling = ControlDirection::Cooling;
        assert!(close(weather_adjustment(Some(18.0), cooling), 0.25));
        assert!(close(weather_adjustment(Some(10.0), cooling), 0.375));
        assert!(close(weather_adjustment(Some(-3.0), cooling), 0.5));
    }

    #[test]
    fn heating_mirrors_sign() {
        assert!(close(weather_adjustment(Some(32.0), ControlDirection::Heating), 0.35));
        assert!(close(weather_adjustment(Some(10.0), ControlDirection::Heating), -0.375));
    }

    #[test]
    fn magnitude_outside_comfort_stays_bounded() {
        let mut outdoor = -20.0;
        while outdoor <= 50.0 {
            let value = weather_adjustment(Some(outdoor), ControlDirection::Cooling).abs();
            if (COMFORT_LOW_C..=COMFORT_HIGH_C).contains(&outdoor) {
                assert_eq!(value, 0.0);
            } else {
                assert!((0.25..=0.5).contains(&value), "{outdoor} -> {value}");
            }
            outdoor += 0.5;
        }
    }

    #[test]
    fn missing_outdoor_data_is_zero() {
        assert_eq!(weather_adjustment(None, ControlDirection::Cooling), 0.0);
        assert_eq!(weather_adjustment(Some(f32::NAN), ControlDirection::Cooling), 0.0);
    }
}
