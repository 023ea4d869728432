//! Fixed-order feature encoding consumed by the win classifier.
//!
//! Layout (23 slots): six one-hot groups `[blue, red, neither]` in
//! [`CategoricalSignals`] field order, followed by the five objective
//! differentials in [`ObjectiveDiffs`] field order. The classifier artifact is
//! calibrated against exactly this order, see [`FEATURE_NAMES`].

use serde::{Deserialize, Serialize};

use crate::domain::signals::{CategoricalSignals, MatchSignals, ObjectiveDiffs, Side};
use crate::errors::DomainError;

pub const CATEGORICAL_GROUPS: usize = 6;
pub const ONE_HOT_WIDTH: usize = 3;
pub const DIFF_COUNT: usize = 5;
pub const FEATURE_COUNT: usize = CATEGORICAL_GROUPS * ONE_HOT_WIDTH + DIFF_COUNT;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "first_blood_blue",
    "first_blood_red",
    "first_blood_none",
    "first_tower_blue",
    "first_tower_red",
    "first_tower_none",
    "first_inhibitor_blue",
    "first_inhibitor_red",
    "first_inhibitor_none",
    "first_baron_blue",
    "first_baron_red",
    "first_baron_none",
    "first_dragon_blue",
    "first_dragon_red",
    "first_dragon_none",
    "first_rift_herald_blue",
    "first_rift_herald_red",
    "first_rift_herald_none",
    "tower_diff",
    "inhibitor_diff",
    "baron_diff",
    "dragon_diff",
    "herald_diff",
];

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn from_slice(values: &[f64]) -> Result<Self, DomainError> {
        let array: [f64; FEATURE_COUNT] = values.try_into().map_err(|_| {
            DomainError::InvalidFeatureVector(format!(
                "expected {FEATURE_COUNT} features, got {}",
                values.len()
            ))
        })?;
        Ok(Self(array))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FeatureEncoder;

impl FeatureEncoder {
    pub fn one_hot(side: Side) -> [f64; ONE_HOT_WIDTH] {
        match side {
            Side::Blue => [1.0, 0.0, 0.0],
            Side::Red => [0.0, 1.0, 0.0],
            Side::Neither => [0.0, 0.0, 1.0],
        }
    }

    /// Total and pure: every categorical combination and every differential
    /// value maps to a vector. Differentials pass through unchanged.
    pub fn encode(categorical: &CategoricalSignals, diffs: &ObjectiveDiffs) -> FeatureVector {
        let mut slots = [0.0; FEATURE_COUNT];

        for (group, side) in categorical.in_order().into_iter().enumerate() {
            let offset = group * ONE_HOT_WIDTH;
            slots[offset..offset + ONE_HOT_WIDTH].copy_from_slice(&Self::one_hot(side));
        }

        let diff_offset = CATEGORICAL_GROUPS * ONE_HOT_WIDTH;
        for (index, value) in diffs.in_order().into_iter().enumerate() {
            slots[diff_offset + index] = f64::from(value);
        }

        FeatureVector(slots)
    }

    pub fn encode_signals(signals: &MatchSignals) -> FeatureVector {
        Self::encode(&signals.categorical, &signals.diffs)
    }

    /// Reverses [`FeatureEncoder::encode`]. Rejects vectors whose one-hot groups
    /// do not hold exactly one hot slot or whose differentials are not integral.
    pub fn decode(vector: &FeatureVector) -> Result<MatchSignals, DomainError> {
        let mut sides = [Side::Neither; CATEGORICAL_GROUPS];
        for (group, side) in sides.iter_mut().enumerate() {
            let offset = group * ONE_HOT_WIDTH;
            let slots = &vector.0[offset..offset + ONE_HOT_WIDTH];
            *side = decode_group(slots).ok_or_else(|| {
                DomainError::InvalidFeatureVector(format!(
                    "one-hot group `{}` is not a valid encoding: {slots:?}",
                    group_name(group)
                ))
            })?;
        }

        let diff_offset = CATEGORICAL_GROUPS * ONE_HOT_WIDTH;
        let mut diffs = [0i32; DIFF_COUNT];
        for (index, diff) in diffs.iter_mut().enumerate() {
            let raw = vector.0[diff_offset + index];
            if !raw.is_finite() || raw.fract() != 0.0 || raw.abs() > f64::from(i32::MAX) {
                return Err(DomainError::InvalidFeatureVector(format!(
                    "`{}` must be an integral value, got {raw}",
                    FEATURE_NAMES[diff_offset + index]
                )));
            }
            *diff = raw as i32;
        }

        Ok(MatchSignals::new(
            CategoricalSignals::from_ordered(sides),
            ObjectiveDiffs::from_ordered(diffs),
        ))
    }
}

fn decode_group(slots: &[f64]) -> Option<Side> {
    let hot: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter_map(|(index, value)| if *value == 1.0 { Some(index) } else { None })
        .collect();
    let cold = slots.iter().filter(|value| **value == 0.0).count();
    if hot.len() != 1 || cold != ONE_HOT_WIDTH - 1 {
        return None;
    }
    Side::ALL.get(hot[0]).copied()
}

fn group_name(group: usize) -> &'static str {
    FEATURE_NAMES[group * ONE_HOT_WIDTH].trim_end_matches("_blue")
}

#[cfg(test)]
mod tests {
    use super::{FeatureEncoder, FeatureVector, FEATURE_COUNT, FEATURE_NAMES, ONE_HOT_WIDTH};
    use crate::domain::signals::{CategoricalSignals, ObjectiveDiffs, Side};
    use crate::errors::DomainError;

    fn every_categorical_combination() -> Vec<CategoricalSignals> {
        let mut combos = Vec::with_capacity(3usize.pow(6));
        for code in 0..3usize.pow(6) {
            let mut sides = [Side::Blue; 6];
            let mut rest = code;
            for side in sides.iter_mut() {
                *side = Side::ALL[rest % 3];
                rest /= 3;
            }
            combos.push(CategoricalSignals::from_ordered(sides));
        }
        combos
    }

    #[test]
    fn every_combination_sets_exactly_one_slot_per_group() {
        for signals in every_categorical_combination() {
            let vector = FeatureEncoder::encode(&signals, &ObjectiveDiffs::default());
            assert_eq!(vector.len(), FEATURE_COUNT);
            for group in vector.as_slice()[..18].chunks(ONE_HOT_WIDTH) {
                assert_eq!(group.iter().filter(|v| **v == 1.0).count(), 1, "{signals:?}");
                assert_eq!(group.iter().filter(|v| **v == 0.0).count(), 2, "{signals:?}");
            }
        }
    }

    #[test]
    fn all_blue_with_zero_diffs_matches_reference_layout() {
        let vector = FeatureEncoder::encode(
            &CategoricalSignals::uniform(Side::Blue),
            &ObjectiveDiffs::default(),
        );

        let mut expected = Vec::new();
        for _ in 0..6 {
            expected.extend_from_slice(&[1.0, 0.0, 0.0]);
        }
        expected.extend_from_slice(&[0.0; 5]);

        assert_eq!(vector.as_slice(), expected.as_slice());
    }

    #[test]
    fn differentials_pass_through_unclamped() {
        let diffs = ObjectiveDiffs { tower: 42, inhibitor: -7, baron: 1, dragon: -2, herald: 3 };
        let vector = FeatureEncoder::encode(&CategoricalSignals::default(), &diffs);
        assert_eq!(&vector.as_slice()[18..], &[42.0, -7.0, 1.0, -2.0, 3.0]);
    }

    #[test]
    fn slot_order_follows_feature_names() {
        let signals = CategoricalSignals {
            first_dragon: Side::Red,
            ..CategoricalSignals::default()
        };
        let diffs = ObjectiveDiffs { herald: -1, ..ObjectiveDiffs::default() };
        let vector = FeatureEncoder::encode(&signals, &diffs);

        let dragon_red = FEATURE_NAMES.iter().position(|n| *n == "first_dragon_red").expect("name");
        let herald = FEATURE_NAMES.iter().position(|n| *n == "herald_diff").expect("name");
        assert_eq!(vector.0[dragon_red], 1.0);
        assert_eq!(vector.0[herald], -1.0);
    }

    #[test]
    fn decode_reverses_encode() {
        let signals = CategoricalSignals {
            first_blood: Side::Blue,
            first_tower: Side::Red,
            first_baron: Side::Red,
            ..CategoricalSignals::default()
        };
        let diffs = ObjectiveDiffs { tower: 3, inhibitor: -1, baron: 0, dragon: 2, herald: -3 };
        let decoded = FeatureEncoder::decode(&FeatureEncoder::encode(&signals, &diffs))
            .expect("valid vector decodes");

        assert_eq!(decoded.categorical, signals);
        assert_eq!(decoded.diffs, diffs);
    }

    #[test]
    fn decode_rejects_group_with_two_hot_slots() {
        let mut vector = FeatureEncoder::encode(&CategoricalSignals::default(), &ObjectiveDiffs::default());
        vector.0[3] = 1.0;
        let error = FeatureEncoder::decode(&vector).expect_err("first_tower has two hot slots");
        assert!(matches!(error, DomainError::InvalidFeatureVector(ref m) if m.contains("first_tower")));
    }

    #[test]
    fn decode_rejects_fractional_differential() {
        let mut vector = FeatureEncoder::encode(&CategoricalSignals::default(), &ObjectiveDiffs::default());
        vector.0[20] = 0.5;
        assert!(FeatureEncoder::decode(&vector).is_err());
    }

    #[test]
    fn from_slice_enforces_dimension() {
        assert!(FeatureVector::from_slice(&[0.0; 22]).is_err());
        assert!(FeatureVector::from_slice(&[0.0; FEATURE_COUNT]).is_ok());
    }
}
