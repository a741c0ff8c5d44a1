//! Action selection over estimator outputs.
//!
//! `argmax`, `argmin` and weighted sampling share one scan that keeps a
//! running best value and its action, replacing it only on strict
//! improvement. Available-action sets are `BTreeSet`s scanned ascending, so
//! ties resolve to the lowest action id.

use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Where action values sit in an estimator's output vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValueLayout {
    /// Output slot `a` holds the value of action `a`.
    #[default]
    ActionValues,
    /// Slot 0 holds the state value; action `a` lives at slot `a + 1`.
    StateActionValues,
}

impl ValueLayout {
    pub fn from_flag(state_action_value: bool) -> Self {
        if state_action_value {
            Self::StateActionValues
        } else {
            Self::ActionValues
        }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        match self {
            Self::ActionValues => 0,
            Self::StateActionValues => 1,
        }
    }

    /// Output width needed for `number_of_actions` actions.
    pub fn required_width(&self, number_of_actions: usize) -> usize {
        number_of_actions + self.offset()
    }

    /// Value of `action`, if the output is wide enough.
    #[inline]
    pub fn value(&self, values: &[f32], action: usize) -> Option<f32> {
        values.get(action + self.offset()).copied()
    }
}

#[derive(Debug, Clone, Copy)]
enum Scan {
    Max,
    Min,
    /// First action whose cumulative weight exceeds the threshold.
    Cumulative(f64),
}

fn scan(
    values: &[f32],
    actions: impl IntoIterator<Item = usize>,
    layout: ValueLayout,
    mode: Scan,
) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    let mut cumulative = 0.0f64;
    for action in actions {
        let Some(value) = layout.value(values, action) else {
            continue;
        };
        let replace = match (mode, best) {
            (Scan::Max | Scan::Min, None) => true,
            (Scan::Max, Some((_, current))) => value > current,
            (Scan::Min, Some((_, current))) => value < current,
            (Scan::Cumulative(threshold), None) => {
                cumulative += value.max(0.0) as f64;
                cumulative > threshold
            }
            (Scan::Cumulative(_), Some(_)) => break,
        };
        if replace {
            best = Some((action, value));
        }
    }
    best
}

/// Action with the highest value over `0..number_of_actions`.
pub fn argmax(values: &[f32], number_of_actions: usize, layout: ValueLayout) -> Option<usize> {
    scan(values, 0..number_of_actions, layout, Scan::Max).map(|(a, _)| a)
}

/// Action with the highest value among `available`.
pub fn argmax_available(values: &[f32], available: &BTreeSet<usize>, layout: ValueLayout) -> Option<usize> {
    scan(values, available.iter().copied(), layout, Scan::Max).map(|(a, _)| a)
}

/// Action with the lowest value over `0..number_of_actions`.
pub fn argmin(values: &[f32], number_of_actions: usize, layout: ValueLayout) -> Option<usize> {
    scan(values, 0..number_of_actions, layout, Scan::Min).map(|(a, _)| a)
}

/// Action with the lowest value among `available`.
pub fn argmin_available(values: &[f32], available: &BTreeSet<usize>, layout: ValueLayout) -> Option<usize> {
    scan(values, available.iter().copied(), layout, Scan::Min).map(|(a, _)| a)
}

/// Highest action value among `available`.
pub fn max_value(values: &[f32], available: &BTreeSet<usize>, layout: ValueLayout) -> Option<f32> {
    scan(values, available.iter().copied(), layout, Scan::Max).map(|(_, v)| v)
}

/// Lowest action value among `available`.
pub fn min_value(values: &[f32], available: &BTreeSet<usize>, layout: ValueLayout) -> Option<f32> {
    scan(values, available.iter().copied(), layout, Scan::Min).map(|(_, v)| v)
}

/// Sample an action from `available` with probability proportional to its
/// value. Negative values count as zero weight. Falls back to a uniform draw
/// when no action carries positive weight.
pub fn sample<R: Rng + ?Sized>(
    values: &[f32],
    available: &BTreeSet<usize>,
    layout: ValueLayout,
    rng: &mut R,
) -> Option<usize> {
    let total: f64 = available
        .iter()
        .filter_map(|&a| layout.value(values, a))
        .map(|v| v.max(0.0) as f64)
        .sum();
    if !(total > 0.0) || !total.is_finite() {
        return uniform(available, rng);
    }
    let threshold = rng.random::<f64>() * total;
    scan(values, available.iter().copied(), layout, Scan::Cumulative(threshold))
        .map(|(a, _)| a)
        // Rounding can leave the threshold just above the final sum.
        .or_else(|| {
            available
                .iter()
                .rev()
                .copied()
                .find(|&a| layout.value(values, a).is_some_and(|v| v > 0.0))
        })
}

/// Uniformly random action from `available`.
pub fn uniform<R: Rng + ?Sized>(available: &BTreeSet<usize>, rng: &mut R) -> Option<usize> {
    if available.is_empty() {
        return None;
    }
    let index = rng.random_range(0..available.len());
    available.iter().nth(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn set(actions: &[usize]) -> BTreeSet<usize> {
        actions.iter().copied().collect()
    }

    #[test]
    fn test_argmax_full_space() {
        let values = [0.1, 0.7, 0.3];
        assert_eq!(argmax(&values, 3, ValueLayout::ActionValues), Some(1));
        assert_eq!(argmin(&values, 3, ValueLayout::ActionValues), Some(0));
    }

    #[test]
    fn test_argmax_available_subset() {
        let values = [0.1, 0.7, 0.3, 0.9];
        let available = set(&[0, 2]);
        assert_eq!(argmax_available(&values, &available, ValueLayout::ActionValues), Some(2));
        assert_eq!(argmin_available(&values, &available, ValueLayout::ActionValues), Some(0));
        assert_eq!(max_value(&values, &available, ValueLayout::ActionValues), Some(0.3));
        assert_eq!(min_value(&values, &available, ValueLayout::ActionValues), Some(0.1));
    }

    #[test]
    fn test_ties_resolve_to_lowest_action() {
        let values = [0.5, 0.9, 0.9, 0.5];
        assert_eq!(argmax(&values, 4, ValueLayout::ActionValues), Some(1));
        assert_eq!(argmin(&values, 4, ValueLayout::ActionValues), Some(0));
        let available = set(&[3, 2, 1]);
        assert_eq!(argmax_available(&values, &available, ValueLayout::ActionValues), Some(1));
    }

    #[test]
    fn test_state_action_layout_offset() {
        // Slot 0 is the state value and must never be picked as an action.
        let values = [10.0, 0.2, 0.4];
        assert_eq!(argmax(&values, 2, ValueLayout::StateActionValues), Some(1));
        assert_eq!(ValueLayout::StateActionValues.required_width(2), 3);
    }

    #[test]
    fn test_empty_or_short_values() {
        assert_eq!(argmax(&[], 3, ValueLayout::ActionValues), None);
        assert_eq!(argmax_available(&[1.0], &BTreeSet::new(), ValueLayout::ActionValues), None);
    }

    #[test]
    fn test_sample_respects_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        let values = [0.0, 1.0, 0.0];
        let available = set(&[0, 1, 2]);
        for _ in 0..50 {
            assert_eq!(sample(&values, &available, ValueLayout::ActionValues, &mut rng), Some(1));
        }
    }

    #[test]
    fn test_sample_distribution() {
        let mut rng = StdRng::seed_from_u64(11);
        let values = [1.0, 3.0];
        let available = set(&[0, 1]);
        let ones = (0..4000)
            .filter(|_| sample(&values, &available, ValueLayout::ActionValues, &mut rng) == Some(1))
            .count();
        let fraction = ones as f64 / 4000.0;
        assert!((fraction - 0.75).abs() < 0.05, "fraction {}", fraction);
    }

    #[test]
    fn test_sample_without_positive_weight_is_uniform_over_available() {
        let mut rng = StdRng::seed_from_u64(3);
        let values = [-1.0, -2.0, -3.0];
        let available = set(&[1, 2]);
        for _ in 0..50 {
            let action = sample(&values, &available, ValueLayout::ActionValues, &mut rng).unwrap();
            assert!(available.contains(&action));
        }
    }
}
