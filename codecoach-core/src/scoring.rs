//! Score building blocks: weighted criteria and cutoff tables.
//!
//! Every activity score is a point sum in [0, 1]. Boolean criteria add a
//! fixed weight each; continuous metrics go through a [`CutoffTable`].

use serde::{Deserialize, Serialize};

/// Step function mapping a metric to points.
///
/// The score for a value is the largest score among entries whose cutoff is
/// at or below the value, or 0 when none qualify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutoffTable {
    entries: Vec<(f64, f64)>,
}

impl CutoffTable {
    /// Entries are `(cutoff, score)` pairs in any order.
    pub fn new(entries: impl Into<Vec<(f64, f64)>>) -> Self {
        let mut entries: Vec<(f64, f64)> = entries
            .into()
            .into_iter()
            .filter(|(c, s)| c.is_finite() && s.is_finite())
            .collect();
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { entries }
    }

    pub fn score(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        self.entries
            .iter()
            .take_while(|(cutoff, _)| *cutoff <= value)
            .map(|(_, s)| *s)
            .fold(0.0, f64::max)
    }

    /// Score for an optional metric; a missing metric earns nothing.
    pub fn score_opt(&self, value: Option<f64>) -> f64 {
        value.map_or(0.0, |v| self.score(v))
    }

    /// Highest score the table can award.
    pub fn max_score(&self) -> f64 {
        self.entries.iter().map(|(_, s)| *s).fold(0.0, f64::max)
    }
}

/// One boolean criterion with its point value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Criterion {
    name: String,
    weight: f64,
    satisfied: bool,
}

/// Linear point accumulation over boolean criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedCriteria {
    criteria: Vec<Criterion>,
}

impl WeightedCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn criterion(mut self, name: impl Into<String>, weight: f64, satisfied: bool) -> Self {
        self.criteria.push(Criterion {
            name: name.into(),
            weight,
            satisfied,
        });
        self
    }

    pub fn points(&self) -> f64 {
        self.criteria
            .iter()
            .filter(|c| c.satisfied)
            .map(|c| finite_or_zero(c.weight))
            .sum()
    }

    /// Fraction of criteria satisfied, ignoring weights.
    pub fn fraction(&self) -> f64 {
        if self.criteria.is_empty() {
            return 0.0;
        }
        self.criteria.iter().filter(|c| c.satisfied).count() as f64 / self.criteria.len() as f64
    }

    pub fn unmet(&self) -> impl Iterator<Item = &str> {
        self.criteria
            .iter()
            .filter(|c| !c.satisfied)
            .map(|c| c.name.as_str())
    }
}

pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Final guard applied to every activity score.
pub fn clamp_score(value: f64) -> f64 {
    finite_or_zero(value).clamp(0.0, 1.0)
}

/// Round to two decimals so accumulated float error never shows in reports.
pub fn round_score(value: f64) -> f64 {
    (clamp_score(value) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CutoffTable {
        CutoffTable::new(vec![(0.9, 1.0), (0.5, 0.2), (0.7, 0.6)])
    }

    #[test]
    fn test_cutoff_highest_qualifying_entry() {
        let t = table();
        assert_eq!(t.score(0.49), 0.0);
        assert_eq!(t.score(0.5), 0.2);
        assert_eq!(t.score(0.75), 0.6);
        assert_eq!(t.score(0.95), 1.0);
    }

    #[test]
    fn test_cutoff_non_finite_is_zero() {
        let t = table();
        assert_eq!(t.score(f64::NAN), 0.0);
        assert_eq!(t.score(f64::INFINITY), 0.0);
        assert_eq!(t.score_opt(None), 0.0);
    }

    #[test]
    fn test_cutoff_unsorted_scores_use_max() {
        let t = CutoffTable::new(vec![(0.1, 0.5), (0.2, 0.3)]);
        assert_eq!(t.score(0.25), 0.5);
        assert_eq!(t.max_score(), 0.5);
    }

    #[test]
    fn test_empty_table() {
        let t = CutoffTable::new(Vec::new());
        assert_eq!(t.score(1.0), 0.0);
    }

    #[test]
    fn test_weighted_criteria_points() {
        let c = WeightedCriteria::new()
            .criterion("a", 0.25, true)
            .criterion("b", 0.25, false)
            .criterion("c", 0.5, true);
        assert!((c.points() - 0.75).abs() < 1e-12);
        assert!((c.fraction() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(c.unmet().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_empty_criteria_fraction_is_zero() {
        assert_eq!(WeightedCriteria::new().fraction(), 0.0);
    }

    #[test]
    fn test_clamp_and_round() {
        assert_eq!(clamp_score(f64::NAN), 0.0);
        assert_eq!(clamp_score(1.3), 1.0);
        assert_eq!(clamp_score(-0.2), 0.0);
        assert_eq!(round_score(0.1 + 0.2), 0.3);
        assert_eq!(round_score(0.7 + 0.3), 1.0);
    }
}
