pub const TOPIC_OUTDOOR_TEMP: &str = "aircon/sensor/outdoor/temperature";
pub const TOPIC_WEATHER_TEMP: &str = "aircon/weather/temperature";
pub const TOPIC_UNIT_STATE: &str = "aircon/unit/state";

pub const TOPIC_CONTROLLER_STATE: &str = "aircon/controller/state";
pub const TOPIC_CONTROLLER_NOTIFICATION: &str = "aircon/controller/notification";

pub const TOPIC_CMD_UNIT_POWER: &str = "aircon/cmnd/unit/power";
pub const TOPIC_CMD_UNIT_SETPOINT: &str = "aircon/cmnd/unit/setpoint";
pub const TOPIC_CMD_UNIT_MODE: &str = "aircon/cmnd/unit/mode";
pub const TOPIC_CMD_UNIT_FAN: &str = "aircon/cmnd/unit/fan";
pub const TOPIC_CMD_TARGET: &str = "aircon/cmnd/controller/target";

pub const TOPIC_SENSOR_WILDCARD: &str = "aircon/sensor/+/+";
pub const TOPIC_ZONE_STATE_WILDCARD: &str = "aircon/zone/+/fan/state";
pub const TOPIC_CMD_ZONE_WILDCARD: &str = "aircon/cmnd/zone/+/fan";
pub const TOPIC_CMD_OVERRIDE_WILDCARD: &str = "aircon/cmnd/controller/override/+";

const SENSOR_PREFIX: &str = "aircon/sensor/";
const ZONE_PREFIX: &str = "aircon/zone/";
const CMD_ZONE_PREFIX: &str = "aircon/cmnd/zone/";
const CMD_OVERRIDE_PREFIX: &str = "aircon/cmnd/controller/override/";

pub fn room_temperature_topic(room: &str) -> String {
    format!("{SENSOR_PREFIX}{room}/temperature")
}

pub fn room_humidity_topic(room: &str) -> String {
    format!("{SENSOR_PREFIX}{room}/humidity")
}

pub fn zone_state_topic(room: &str) -> String {
    format!("{ZONE_PREFIX}{room}/fan/state")
}

pub fn zone_command_topic(room: &str) -> String {
    format!("{CMD_ZONE_PREFIX}{room}/fan")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Temperature,
    Humidity,
}

/// Splits `aircon/sensor/<room>/<kind>` into its room and kind.
pub fn parse_sensor_topic(topic: &str) -> Option<(&str, SensorKind)> {
    let rest = topic.strip_prefix(SENSOR_PREFIX)?;
    let (room, kind) = rest.split_once('/')?;
    let kind = match kind {
        "temperature" => SensorKind::Temperature,
        "humidity" => SensorKind::Humidity,
        _ => return None,
    };
    (!room.is_empty()).then_some((room, kind))
}

pub fn parse_zone_state_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(ZONE_PREFIX)?
        .strip_suffix("/fan/state")
        .filter(|room| !room.is_empty() && !room.contains('/'))
}

pub fn parse_zone_command_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(CMD_ZONE_PREFIX)?
        .strip_suffix("/fan")
        .filter(|room| !room.is_empty() && !room.contains('/'))
}

pub fn parse_override_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(CMD_OVERRIDE_PREFIX)
        .filter(|room| !room.is_empty() && !room.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_room_topics() {
        assert_eq!(
            parse_sensor_topic(&room_temperature_topic("bedroom")),
            Some(("bedroom", SensorKind::Temperature))
        );
        assert_eq!(
            parse_sensor_topic(&room_humidity_topic("study")),
            Some(("study", SensorKind::Humidity))
        );
        assert_eq!(parse_sensor_topic("aircon/sensor/bedroom/pressure"), None);
        assert_eq!(parse_zone_state_topic(&zone_state_topic("hall")), Some("hall"));
        assert_eq!(parse_zone_command_topic(&zone_command_topic("hall")), Some("hall"));
        assert_eq!(parse_override_topic("aircon/cmnd/controller/override/den"), Some("den"));
        assert_eq!(parse_override_topic("aircon/cmnd/controller/override/"), None);
    }

    #[test]
    fn outdoor_topic_parses_as_sensor_room() {
        // The outdoor sensor shares the room layout; callers check for it first.
        assert_eq!(
            parse_sensor_topic(TOPIC_OUTDOOR_TEMP),
            Some(("outdoor", SensorKind::Temperature))
        );
    }
}
