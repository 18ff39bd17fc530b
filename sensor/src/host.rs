use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use aircon_common::{
    parse_zone_command_topic, room_humidity_topic, room_temperature_topic, zone_state_topic,
    MainFanSpeed, PowerState, UnitMode, TOPIC_CMD_UNIT_FAN, TOPIC_CMD_UNIT_MODE,
    TOPIC_CMD_UNIT_POWER, TOPIC_CMD_UNIT_SETPOINT, TOPIC_CMD_ZONE_WILDCARD, TOPIC_OUTDOOR_TEMP,
    TOPIC_UNIT_STATE,
};

const DEFAULT_ROOMS: &str = "living,bedroom,study";
const PUBLISH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
struct RoomSim {
    temperature_c: f32,
    humidity_percent: f32,
    fan_speed: u8,
}

#[derive(Debug, Clone, Serialize)]
struct UnitState {
    power: PowerState,
    mode: UnitMode,
    setpoint: f32,
    #[serde(rename = "fanMode")]
    fan_mode: MainFanSpeed,
}

/// Simulated house: zone dampers, one ducted unit and an outdoor probe.
#[derive(Debug, Clone)]
struct House {
    rooms: BTreeMap<String, RoomSim>,
    unit: UnitState,
    outdoor_c: f32,
}

impl House {
    fn new(room_ids: &[String]) -> Self {
        let rooms = room_ids
            .iter()
            .enumerate()
            .map(|(index, id)| {
                (
                    id.clone(),
                    RoomSim {
                        temperature_c: 23.0 + index as f32 * 1.5,
                        humidity_percent: 50.0 + index as f32 * 4.0,
                        fan_speed: 50,
                    },
                )
            })
            .collect();

        Self {
            rooms,
            unit: UnitState {
                power: PowerState::On,
                mode: UnitMode::Cool,
                setpoint: 24.0,
                fan_mode: MainFanSpeed::Medium,
            },
            outdoor_c: 30.0,
        }
    }

    /// Applies a command topic; returns true when state changed.
    fn apply_command(&mut self, topic: &str, payload: &str) -> bool {
        let payload = payload.trim();
        match topic {
            TOPIC_CMD_UNIT_POWER => match payload.to_ascii_uppercase().as_str() {
                "ON" => {
                    self.unit.power = PowerState::On;
                    true
                }
                "OFF" => {
                    self.unit.power = PowerState::Off;
                    true
                }
                _ => false,
            },
            TOPIC_CMD_UNIT_MODE => match UnitMode::parse(payload) {
                Some(mode) => {
                    self.unit.mode = mode;
                    true
                }
                None => false,
            },
            TOPIC_CMD_UNIT_SETPOINT => match payload.parse::<f32>() {
                Ok(setpoint) if setpoint.is_finite() => {
                    self.unit.setpoint = setpoint.clamp(16.0, 30.0);
                    true
                }
                _ => false,
            },
            TOPIC_CMD_UNIT_FAN => match MainFanSpeed::parse(payload) {
                Some(speed) => {
                    self.unit.fan_mode = speed;
                    true
                }
                None => false,
            },
            other => {
                let Some(room) = parse_zone_command_topic(other) else {
                    return false;
                };
                let (Some(sim), Ok(speed)) = (self.rooms.get_mut(room), payload.parse::<f32>())
                else {
                    return false;
                };
                sim.fan_speed = speed.clamp(0.0, 100.0).round() as u8;
                true
            }
        }
    }

    /// Advances one publish interval. Rooms leak towards outdoor temperature
    /// and are pulled towards the unit setpoint in proportion to their damper.
    fn step(&mut self, tick: u64) {
        self.outdoor_c = 30.0 + ((tick % 12) as f32 - 6.0) * 0.5;

        let unit_factor = match self.unit.fan_mode {
            MainFanSpeed::Low => 0.6,
            MainFanSpeed::Medium => 0.8,
            MainFanSpeed::High => 1.0,
        };

        for sim in self.rooms.values_mut() {
            sim.temperature_c += (self.outdoor_c - sim.temperature_c) * 0.02;

            if self.unit.power.is_on() {
                let airflow = f32::from(sim.fan_speed) / 100.0 * unit_factor;
                let pull = (self.unit.setpoint - sim.temperature_c) * 0.15 * airflow;
                let applied = match self.unit.mode {
                    UnitMode::Cool | UnitMode::Dry => pull.min(0.0),
                    UnitMode::Heat => pull.max(0.0),
                };
                sim.temperature_c += applied;
                if self.unit.mode == UnitMode::Dry {
                    sim.humidity_percent -= 1.5 * airflow;
                }
            }

            sim.humidity_percent = (sim.humidity_percent + 0.2).clamp(20.0, 90.0);
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let room_ids = parse_rooms(
        &std::env::var("AIRCON_ROOMS").unwrap_or_else(|_| DEFAULT_ROOMS.to_string()),
    );

    let mut mqtt_options = MqttOptions::new("aircon-sensor-rust", mqtt_host, mqtt_port);

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);
    let house = Arc::new(Mutex::new(House::new(&room_ids)));

    for topic in [
        TOPIC_CMD_ZONE_WILDCARD,
        TOPIC_CMD_UNIT_POWER,
        TOPIC_CMD_UNIT_MODE,
        TOPIC_CMD_UNIT_SETPOINT,
        TOPIC_CMD_UNIT_FAN,
    ] {
        mqtt.subscribe(topic, QoS::AtLeastOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }

    {
        let house = house.clone();
        let mqtt = mqtt.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(message))) => {
                        let payload = String::from_utf8_lossy(&message.payload).to_string();
                        let changed = house.lock().await.apply_command(&message.topic, &payload);
                        if !changed {
                            debug!("ignoring command {payload:?} on {}", message.topic);
                            continue;
                        }
                        let snapshot = house.lock().await.clone();
                        let mqtt = mqtt.clone();
                        // Publishing waits on this event loop, so echo from a separate task.
                        tokio::spawn(async move {
                            if let Err(err) = publish_actuator_state(&mqtt, &snapshot).await {
                                warn!("sensor state echo failed: {err:#}");
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("sensor mqtt poll error: {err}");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });
    }

    info!("sensor simulator started for rooms {room_ids:?}");

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(PUBLISH_INTERVAL);

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        let snapshot = {
            let mut house = house.lock().await;
            house.step(tick);
            house.clone()
        };
        publish_readings(&mqtt, &snapshot).await?;
        publish_actuator_state(&mqtt, &snapshot).await?;
    }
}

fn parse_rooms(raw: &str) -> Vec<String> {
    let mut rooms: Vec<String> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !rooms.iter().any(|known| known == id) {
            rooms.push(id.to_string());
        }
    }
    rooms
}

async fn publish_readings(mqtt: &AsyncClient, house: &House) -> anyhow::Result<()> {
    for (room, sim) in &house.rooms {
        mqtt.publish(
            room_temperature_topic(room),
            QoS::AtLeastOnce,
            true,
            format!("{:.1}", sim.temperature_c),
        )
        .await
        .context("failed to publish room temperature")?;
        mqtt.publish(
            room_humidity_topic(room),
            QoS::AtLeastOnce,
            true,
            format!("{:.1}", sim.humidity_percent),
        )
        .await
        .context("failed to publish room humidity")?;
    }

    mqtt.publish(
        TOPIC_OUTDOOR_TEMP,
        QoS::AtLeastOnce,
        true,
        format!("{:.1}", house.outdoor_c),
    )
    .await
    .context("failed to publish outdoor temperature")?;
    Ok(())
}

async fn publish_actuator_state(mqtt: &AsyncClient, house: &House) -> anyhow::Result<()> {
    for (room, sim) in &house.rooms {
        mqtt.publish(
            zone_state_topic(room),
            QoS::AtLeastOnce,
            true,
            sim.fan_speed.to_string(),
        )
        .await
        .context("failed to publish zone fan state")?;
    }

    let unit = serde_json::to_vec(&house.unit)?;
    mqtt.publish(TOPIC_UNIT_STATE, QoS::AtLeastOnce, true, unit)
        .await
        .context("failed to publish unit state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircon_common::zone_command_topic;

    fn house() -> House {
        House::new(&parse_rooms("living, bedroom,,living"))
    }

    #[test]
    fn room_list_is_trimmed_and_deduplicated() {
        assert_eq!(parse_rooms(" a,b ,, a"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(house().rooms.len(), 2);
    }

    #[test]
    fn zone_commands_move_dampers() {
        let mut house = house();
        assert!(house.apply_command(&zone_command_topic("bedroom"), "85"));
        assert_eq!(house.rooms["bedroom"].fan_speed, 85);
        assert!(house.apply_command(&zone_command_topic("living"), "140"));
        assert_eq!(house.rooms["living"].fan_speed, 100);
        assert!(!house.apply_command(&zone_command_topic("garage"), "50"));
        assert!(!house.apply_command(&zone_command_topic("bedroom"), "fast"));
    }

    #[test]
    fn unit_commands_update_unit_state() {
        let mut house = house();
        assert!(house.apply_command(TOPIC_CMD_UNIT_POWER, "OFF"));
        assert_eq!(house.unit.power, PowerState::Off);
        assert!(house.apply_command(TOPIC_CMD_UNIT_MODE, "dry"));
        assert_eq!(house.unit.mode, UnitMode::Dry);
        assert!(house.apply_command(TOPIC_CMD_UNIT_SETPOINT, "21.5"));
        assert_eq!(house.unit.setpoint, 21.5);
        assert!(!house.apply_command(TOPIC_CMD_UNIT_FAN, "turbo"));
    }

    #[test]
    fn cooling_pulls_open_zones_down_faster() {
        let mut house = house();
        house.apply_command(&zone_command_topic("living"), "100");
        house.apply_command(&zone_command_topic("bedroom"), "0");
        if let Some(sim) = house.rooms.get_mut("bedroom") {
            sim.temperature_c = 23.0;
        }
        house.apply_command(TOPIC_CMD_UNIT_SETPOINT, "18");

        house.step(6);

        assert!(house.rooms["living"].temperature_c < house.rooms["bedroom"].temperature_c);
    }

    #[test]
    fn unit_off_lets_rooms_drift_outdoors() {
        let mut house = house();
        house.apply_command(TOPIC_CMD_UNIT_POWER, "OFF");
        let before = house.rooms["living"].temperature_c;
        house.step(6);
        assert!(house.rooms["living"].temperature_c > before);
    }
}
