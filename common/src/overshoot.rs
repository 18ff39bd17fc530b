use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OvershootBand {
    Slight,
    Moderate,
    High,
    Severe,
}

impl OvershootBand {
    pub fn from_magnitude(overshoot_c: f32) -> Self {
        if overshoot_c < 1.0 {
            Self::Slight
        } else if overshoot_c < 2.0 {
            Self::Moderate
        } else if overshoot_c < 3.0 {
            Self::High
        } else {
            Self::Severe
        }
    }

    /// Ceiling at the start and end of the band, in percent.
    fn ceiling_range(self) -> (f32, f32) {
        match self {
            Self::Slight => (35.0, 25.0),
            Self::Moderate => (25.0, 15.0),
            Self::High => (15.0, 5.0),
            Self::Severe => (5.0, 0.0),
        }
    }

    fn lower_edge(self) -> f32 {
        match self {
            Self::Slight => 0.0,
            Self::Moderate => 1.0,
            Self::High => 2.0,
            Self::Severe => 3.0,
        }
    }
}

/// Maximum fan speed for a room that is `overshoot_c` degrees past target.
/// Falls linearly inside each band and reaches 0 at 4 °C.
pub fn ceiling(overshoot_c: f32) -> u8 {
    let overshoot_c = overshoot_c.max(0.0);
    let band = OvershootBand::from_magnitude(overshoot_c);
    let (start, end) = band.ceiling_range();
    let progress = (overshoot_c - band.lower_edge()).clamp(0.0, 1.0);
    (start + (end - start) * progress).round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    pub speed: u8,
    pub band: Option<OvershootBand>,
}

/// Caps `speed` when the room has overshot (negative demand) by more than the
/// deadband. Never raises a speed.
pub fn correct(speed: u8, demand_c: f32, deadband_c: f32) -> Correction {
    let overshoot_c = -demand_c;
    if overshoot_c <= deadband_c {
        return Correction { speed, band: None };
    }
    Correction {
        speed: speed.min(ceiling(overshoot_c)),
        band: Some(OvershootBand::from_magnitude(overshoot_c)),
    }
}
