pub mod advisory;
pub mod command;
pub mod config;
pub mod cycle;
pub mod fallback;
pub mod gate;
pub mod humidity;
pub mod overshoot;
pub mod room;
pub mod schedule;
pub mod target;
pub mod topics;
pub mod types;
pub mod unit;
pub mod weather;

pub use advisory::{parse_advice, AdvisoryError, AdvisoryRequest, AdvisoryResponse, AdvisoryRoom};
pub use command::{ActuatorCommand, Notification};
pub use config::{
    AdvisoryConfig, AdvisoryProvider, ControllerConfig, HumidityConfig, ModelTier, NetworkConfig,
    PowerControlConfig, RoomConfig, RuntimeConfig, WeatherConfig,
};
pub use cycle::{
    finish, plan, AdvisoryStep, CycleInput, CycleOutcome, CyclePlan, CycleReport, ErrorCounters,
    RecommendationSource, RoomReport, SystemState,
};
pub use gate::{GateDecision, SkipReason};
pub use room::{Room, RoomStats, SensorSnapshot, UnitReport};
pub use schedule::{active_schedule, DayOfWeek, DaySelector, Schedule, ScheduleTieBreak};
pub use target::{resolve_target, ResolvedTarget};
pub use topics::*;
pub use types::{
    to_celsius, ControlDirection, HumidityMode, HumidityStatus, HvacMode, MainFanSpeed, PowerState,
    RoomStatus, UnitMode,
};
