//! Simulation outputs and the summary metrics derived from them.
//!
//! A simulation is one play of an activity's mini-game: the learner's
//! classifier labels a stream of items and the labels are compared against
//! ground truth. Summaries are recomputed on every run and never stored on
//! their own.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Predicted versus expected labels for one simulated play.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub predicted: Vec<String>,
    pub expected: Vec<String>,
}

impl SimulationOutput {
    pub fn new(predicted: Vec<String>, expected: Vec<String>) -> Self {
        Self {
            predicted,
            expected,
        }
    }

    /// Parse plays from validation-cell JSON.
    ///
    /// Accepts `{"predictions": [...], "labels": [...]}` or an array of such
    /// objects. Labels may be strings, numbers or booleans. Anything else is
    /// ignored.
    pub fn from_json(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items.iter().filter_map(Self::from_play).collect(),
            Value::Object(_) => Self::from_play(value).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn from_play(value: &Value) -> Option<Self> {
        let predicted = label_list(value.get("predictions")?)?;
        let expected = label_list(value.get("labels")?)?;
        Some(Self::new(predicted, expected))
    }
}

fn label_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .collect()
}

/// Confusion counts for binary classification. Ratios with an empty
/// denominator are 0, never NaN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl ClassificationMetrics {
    /// Accumulate counts across plays. A label is positive if it is one of
    /// `positive_labels`. Labels beyond the shorter of the two lists in a
    /// play are ignored.
    pub fn from_simulations(simulations: &[SimulationOutput], positive_labels: &[&str]) -> Self {
        let is_positive = |label: &String| positive_labels.contains(&label.as_str());
        let mut m = Self::default();
        for sim in simulations {
            for (predicted, expected) in sim.predicted.iter().zip(&sim.expected) {
                let p = is_positive(predicted);
                let e = is_positive(expected);
                match (p, e) {
                    (true, true) => m.true_positives += 1,
                    (false, false) => m.true_negatives += 1,
                    (true, false) => m.false_positives += 1,
                    (false, true) => m.false_negatives += 1,
                }
            }
        }
        m
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    pub fn precision(&self) -> f64 {
        let denom = self.true_positives + self.false_positives;
        if denom == 0 {
            0.0
        } else {
            self.true_positives as f64 / denom as f64
        }
    }

    pub fn recall(&self) -> f64 {
        let denom = self.true_positives + self.false_negatives;
        if denom == 0 {
            0.0
        } else {
            self.true_positives as f64 / denom as f64
        }
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.true_positives + self.true_negatives) as f64 / total as f64
        }
    }
}

/// Aggregate metrics for one run. Each activity fills the fields it uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub plays: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_shape_ok: Option<bool>,
    #[serde(default)]
    pub error_observed: bool,
}

impl Summary {
    pub fn classification(metrics: &ClassificationMetrics, plays: usize) -> Self {
        Self {
            plays,
            accuracy: Some(metrics.accuracy()),
            precision: Some(metrics.precision()),
            recall: Some(metrics.recall()),
            f1: Some(metrics.f1()),
            ..Self::default()
        }
    }
}
