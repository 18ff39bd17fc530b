use serde::{Deserialize, Serialize};

use crate::room::RoomStats;
use crate::types::PowerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnitOff,
    AllRoomsStable,
    NoReadings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum GateDecision {
    Consult,
    Skip(SkipReason),
}

impl GateDecision {
    pub fn is_skip(self) -> bool {
        matches!(self, Self::Skip(_))
    }
}

/// Whether this tick needs fresh recommendations. Looks only at the live
/// snapshot and whether every controlled room already has a cached
/// recommendation, never at elapsed time.
pub fn evaluate(
    unit_power: PowerState,
    stats: Option<&RoomStats>,
    deadband_c: f32,
    cache_complete: bool,
) -> GateDecision {
    if !unit_power.is_on() {
        return GateDecision::Skip(SkipReason::UnitOff);
    }
    match stats {
        None => GateDecision::Skip(SkipReason::NoReadings),
        Some(stats) if cache_complete && stats.all_within(deadband_c) => {
            GateDecision::Skip(SkipReason::AllRoomsStable)
        }
        Some(_) => GateDecision::Consult,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::tests::room;
    use crate::types::ControlDirection;

    fn stats(temps: &[f32]) -> RoomStats {
        let rooms: Vec<_> = temps
            .iter()
            .enumerate()
            .map(|(i, temp)| room(&format!("r{i}"), Some(*temp), 50))
            .collect();
        RoomStats::compute(&rooms, 22.0, ControlDirection::Cooling).unwrap()
    }

    #[test]
    fn skips_when_unit_off() {
        let stats = stats(&[26.0]);
        assert_eq!(
            evaluate(PowerState::Off, Some(&stats), 0.5, true),
            GateDecision::Skip(SkipReason::UnitOff)
        );
    }

    #[test]
    fn skips_when_every_room_within_deadband() {
        let stats = stats(&[21.5, 22.5, 22.1]);
        assert_eq!(
            evaluate(PowerState::On, Some(&stats), 0.5, true),
            GateDecision::Skip(SkipReason::AllRoomsStable)
        );
    }

    #[test]
    fn settled_rooms_without_cache_are_consulted() {
        let stats = stats(&[22.2, 21.9]);
        assert_eq!(evaluate(PowerState::On, Some(&stats), 0.5, false), GateDecision::Consult);
    }

    #[test]
    fn consults_when_any_room_drifts() {
        let stats = stats(&[22.0, 22.6]);
        assert_eq!(evaluate(PowerState::On, Some(&stats), 0.5, true), GateDecision::Consult);
    }

    #[test]
    fn skips_without_readings() {
        assert_eq!(
            evaluate(PowerState::On, None, 0.5, false),
            GateDecision::Skip(SkipReason::NoReadings)
        );
    }
}
