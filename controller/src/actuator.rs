use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};

use aircon_common::{
    zone_command_topic, ActuatorCommand, PowerState, TOPIC_CMD_UNIT_FAN, TOPIC_CMD_UNIT_MODE,
    TOPIC_CMD_UNIT_POWER, TOPIC_CMD_UNIT_SETPOINT,
};

#[async_trait]
pub trait Actuator: Send + Sync {
    async fn apply(&self, command: &ActuatorCommand) -> anyhow::Result<()>;
}

/// Topic and payload an actuator command is published as.
pub fn command_message(command: &ActuatorCommand) -> (String, String) {
    match command {
        ActuatorCommand::SetZoneFanSpeed { room, percent } => {
            (zone_command_topic(room), percent.to_string())
        }
        ActuatorCommand::SetMainFanSpeed { speed } => {
            (TOPIC_CMD_UNIT_FAN.to_string(), speed.as_str().to_string())
        }
        ActuatorCommand::SetUnitPower { on } => (
            TOPIC_CMD_UNIT_POWER.to_string(),
            PowerState::from_bool(*on).as_str().to_string(),
        ),
        ActuatorCommand::SetUnitMode { mode } => {
            (TOPIC_CMD_UNIT_MODE.to_string(), mode.as_str().to_string())
        }
        ActuatorCommand::SetUnitSetpoint { celsius } => {
            (TOPIC_CMD_UNIT_SETPOINT.to_string(), format!("{celsius:.1}"))
        }
    }
}

pub struct MqttActuator {
    mqtt: AsyncClient,
}

impl MqttActuator {
    pub fn new(mqtt: AsyncClient) -> Self {
        Self { mqtt }
    }
}

#[async_trait]
impl Actuator for MqttActuator {
    async fn apply(&self, command: &ActuatorCommand) -> anyhow::Result<()> {
        let (topic, payload) = command_message(command);
        self.mqtt
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircon_common::{MainFanSpeed, UnitMode};

    #[test]
    fn commands_map_to_topics() {
        assert_eq!(
            command_message(&ActuatorCommand::SetZoneFanSpeed {
                room: "bedroom".into(),
                percent: 75
            }),
            ("aircon/cmnd/zone/bedroom/fan".to_string(), "75".to_string())
        );
        assert_eq!(
            command_message(&ActuatorCommand::SetUnitPower { on: false }),
            (TOPIC_CMD_UNIT_POWER.to_string(), "OFF".to_string())
        );
        assert_eq!(
            command_message(&ActuatorCommand::SetUnitMode { mode: UnitMode::Dry }).1,
            "dry"
        );
        assert_eq!(
            command_message(&ActuatorCommand::SetUnitSetpoint { celsius: 21.5 }).1,
            "21.5"
        );
        assert_eq!(
            command_message(&ActuatorCommand::SetMainFanSpeed {
                speed: MainFanSpeed::High
            }),
            (TOPIC_CMD_UNIT_FAN.to_string(), "high".to_string())
        );
    }
}
