//! Experiment records: one immutable snapshot per notebook run.
//!
//! Records are built empty by [`ExperimentBuilder`] and then populated by the
//! simulate/score pipeline. Population consumes the record and returns a new
//! one; nothing ever edits a record that has been handed out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::activity::{ActivityId, CodeInfo};
use crate::hints::HintView;
use crate::simulation::{SimulationOutput, Summary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: Uuid,
    pub time: DateTime<Utc>,
    pub activity_id: ActivityId,
    pub train_instances: usize,
    pub test_instances: usize,
    #[serde(default)]
    pub simulations: Vec<SimulationOutput>,
    #[serde(default)]
    pub notebook_content: serde_json::Value,
    #[serde(default)]
    pub code_info: Option<CodeInfo>,
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub evaluation_score: Option<f64>,
    #[serde(default)]
    pub displayed_hints: Vec<HintView>,
}

impl Experiment {
    pub fn with_code_info(self, code_info: CodeInfo) -> Self {
        Self {
            code_info: Some(code_info),
            ..self
        }
    }

    pub fn with_simulations(self, simulations: Vec<SimulationOutput>) -> Self {
        Self {
            simulations,
            ..self
        }
    }

    pub fn with_summary(self, summary: Summary) -> Self {
        Self {
            summary: Some(summary),
            ..self
        }
    }

    /// Non-finite scores are stored as 0; others are clamped to [0, 1].
    pub fn with_score(self, score: f64) -> Self {
        Self {
            evaluation_score: Some(crate::scoring::clamp_score(score)),
            ..self
        }
    }

    pub fn is_scored(&self) -> bool {
        self.evaluation_score.is_some()
    }
}

/// Run inputs recorded with an experiment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInputs {
    pub train_instances: usize,
    pub test_instances: usize,
}

pub struct ExperimentBuilder {
    activity_id: ActivityId,
    inputs: RunInputs,
    notebook_content: serde_json::Value,
    displayed_hints: Vec<HintView>,
}

impl ExperimentBuilder {
    pub fn new(activity_id: ActivityId) -> Self {
        Self {
            activity_id,
            inputs: RunInputs::default(),
            notebook_content: serde_json::Value::Null,
            displayed_hints: Vec::new(),
        }
    }

    pub fn inputs(mut self, inputs: RunInputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn notebook(mut self, content: serde_json::Value) -> Self {
        self.notebook_content = content;
        self
    }

    pub fn displayed_hints(mut self, hints: Vec<HintView>) -> Self {
        self.displayed_hints = hints;
        self
    }

    /// Fresh id and timestamp; simulations, summary, code info and score
    /// start empty.
    pub fn build(self) -> Experiment {
        Experiment {
            id: Uuid::new_v4(),
            time: Utc::now(),
            activity_id: self.activity_id,
            train_instances: self.inputs.train_instances,
            test_instances: self.inputs.test_instances,
            simulations: Vec::new(),
            notebook_content: self.notebook_content,
            code_info: None,
            summary: None,
            evaluation_score: None,
            displayed_hints: self.displayed_hints,
        }
    }
}

/// In-memory experiment history, append-only per activity.
#[derive(Debug, Clone, Default)]
pub struct ExperimentHistory {
    by_activity: HashMap<ActivityId, Vec<Experiment>>,
}

impl ExperimentHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, experiment: Experiment) {
        self.by_activity
            .entry(experiment.activity_id)
            .or_default()
            .push(experiment);
    }

    /// Replace an activity's history wholesale, e.g. after loading from a
    /// store.
    pub fn replace(&mut self, activity: ActivityId, experiments: Vec<Experiment>) {
        self.by_activity.insert(activity, experiments);
    }

    pub fn for_activity(&self, activity: ActivityId) -> &[Experiment] {
        self.by_activity
            .get(&activity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn latest(&self, activity: ActivityId) -> Option<&Experiment> {
        self.for_activity(activity).last()
    }

    pub fn run_count(&self, activity: ActivityId) -> usize {
        self.for_activity(activity).len()
    }

    /// Drop every experiment of one activity at once.
    pub fn clear_activity(&mut self, activity: ActivityId) {
        self.by_activity.insert(activity, Vec::new());
    }
}
