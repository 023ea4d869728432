use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Which side secured an objective. `Blue` is the tracked side whose win
/// probability the classifier reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[serde(alias = "side_a")]
    Blue,
    #[serde(alias = "side_b")]
    Red,
    #[serde(alias = "none")]
    Neither,
}

impl Side {
    pub const ALL: [Side; 3] = [Side::Blue, Side::Red, Side::Neither];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Red => "red",
            Self::Neither => "neither",
        }
    }
}

impl std::str::FromStr for Side {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "blue" | "side_a" => Ok(Self::Blue),
            "red" | "side_b" => Ok(Self::Red),
            "neither" | "none" => Ok(Self::Neither),
            other => Err(DomainError::InvalidSignal(format!(
                "unknown side `{other}` (expected blue|red|neither)"
            ))),
        }
    }
}

/// First-objective ownership for the six tracked objectives. Field order is the
/// one-hot group order of the feature vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalSignals {
    pub first_blood: Side,
    pub first_tower: Side,
    pub first_inhibitor: Side,
    pub first_baron: Side,
    pub first_dragon: Side,
    pub first_rift_herald: Side,
}

impl CategoricalSignals {
    pub fn uniform(side: Side) -> Self {
        Self {
            first_blood: side,
            first_tower: side,
            first_inhibitor: side,
            first_baron: side,
            first_dragon: side,
            first_rift_herald: side,
        }
    }

    pub fn in_order(&self) -> [Side; 6] {
        [
            self.first_blood,
            self.first_tower,
            self.first_inhibitor,
            self.first_baron,
            self.first_dragon,
            self.first_rift_herald,
        ]
    }

    pub fn from_ordered(sides: [Side; 6]) -> Self {
        let [first_blood, first_tower, first_inhibitor, first_baron, first_dragon, first_rift_herald] =
            sides;
        Self {
            first_blood,
            first_tower,
            first_inhibitor,
            first_baron,
            first_dragon,
            first_rift_herald,
        }
    }
}

impl Default for CategoricalSignals {
    fn default() -> Self {
        Self::uniform(Side::Neither)
    }
}

/// Objective count differentials, blue minus red.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveDiffs {
    pub tower: i32,
    pub inhibitor: i32,
    pub baron: i32,
    pub dragon: i32,
    pub herald: i32,
}

/// Inclusive bounds accepted at the input boundary, in feature order.
pub const DIFF_BOUNDS: [(&str, i32, i32); 5] = [
    ("tower", -10, 10),
    ("inhibitor", -5, 5),
    ("baron", -3, 3),
    ("dragon", -5, 5),
    ("herald", -3, 3),
];

impl ObjectiveDiffs {
    pub fn in_order(&self) -> [i32; 5] {
        [self.tower, self.inhibitor, self.baron, self.dragon, self.herald]
    }

    pub fn from_ordered(values: [i32; 5]) -> Self {
        let [tower, inhibitor, baron, dragon, herald] = values;
        Self { tower, inhibitor, baron, dragon, herald }
    }

    /// Checks every differential against [`DIFF_BOUNDS`]. The encoder itself
    /// never clamps, so callers run this before submitting.
    pub fn validate(&self) -> Result<(), DomainError> {
        for ((name, min, max), value) in DIFF_BOUNDS.iter().zip(self.in_order()) {
            if value < *min || value > *max {
                return Err(DomainError::DiffOutOfRange {
                    field: (*name).to_string(),
                    value,
                    min: *min,
                    max: *max,
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSignals {
    pub categorical: CategoricalSignals,
    pub diffs: ObjectiveDiffs,
}

impl MatchSignals {
    pub fn new(categorical: CategoricalSignals, diffs: ObjectiveDiffs) -> Self {
        Self { categorical, diffs }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.diffs.validate()
    }
}
