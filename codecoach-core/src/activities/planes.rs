//! Planes: pick a network size and epoch count for an aircraft image
//! classifier without over- or under-fitting.
//!
//! The hints steer the learner through an experiment: train LARGE and SMALL
//! models long enough to see them overfit and underfit, then settle on
//! MEDIUM. Progress is read from the experiment history, not from the
//! current code alone.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::{on_button, on_button_or_return};
use crate::activity::{Activity, ActivityId, CodeInfo, Examination};
use crate::experiment::Experiment;
use crate::hints::{Hint, HintCatalog, HintSelection, HintView};
use crate::notebook::ValidationOutput;
use crate::pattern::{LineMatcher, SourceLines};
use crate::scoring::{CutoffTable, WeightedCriteria, round_score};
use crate::simulation::{SimulationOutput, Summary};

/// Fewest epochs at which size effects become visible.
pub const MIN_EPOCHS: u32 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelSize {
    Small,
    Medium,
    Large,
    #[default]
    Unknown,
}

impl ModelSize {
    fn parse(s: &str) -> Self {
        match s {
            "SMALL" => ModelSize::Small,
            "MEDIUM" => ModelSize::Medium,
            "LARGE" => ModelSize::Large,
            _ => ModelSize::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanesCodeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epochs: Option<u32>,
    pub model_size: ModelSize,
    pub uses_early_stopping: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_accuracy: Option<f64>,
}

impl PlanesCodeInfo {
    fn trained_long_enough(&self) -> bool {
        self.epochs.is_some_and(|e| e >= MIN_EPOCHS)
    }
}

struct PlanesMatchers {
    epochs: LineMatcher,
    model_size: LineMatcher,
    early_stopping: LineMatcher,
    val_accuracy: LineMatcher,
}

static MATCHERS: LazyLock<PlanesMatchers> = LazyLock::new(|| PlanesMatchers {
    epochs: LineMatcher::new("epochs", &[r"\bepochs\s*=\s*(\d+)"]),
    model_size: LineMatcher::new(
        "model_size",
        &[r#"\bmodel_size\s*=\s*["'](SMALL|MEDIUM|LARGE)["']"#],
    ),
    early_stopping: LineMatcher::new("early_stopping", &[r"\bEarlyStopping\("]),
    val_accuracy: LineMatcher::new("val_accuracy", &[r"val_accuracy:\s*([0-9]*\.?[0-9]+)"]),
});

impl PlanesCodeInfo {
    pub fn extract(lines: &SourceLines, validation: Option<&ValidationOutput>) -> Self {
        let m = &*MATCHERS;
        // Keras prints one line per epoch; the last one is the final model.
        let validation_accuracy = validation.and_then(|v| {
            m.val_accuracy
                .capture_last(&v.lines())
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|a| a.is_finite())
        });

        Self {
            epochs: m.epochs.capture_u32(lines),
            model_size: m
                .model_size
                .capture(lines)
                .map_or(ModelSize::Unknown, ModelSize::parse),
            uses_early_stopping: m.early_stopping.matches(lines),
            validation_accuracy,
        }
    }
}

/// Whether some earlier run trained `size` for at least [`MIN_EPOCHS`].
fn tried_size(history: &[Experiment], size: ModelSize) -> bool {
    history
        .iter()
        .filter_map(|e| e.code_info.as_ref()?.as_planes())
        .any(|info| info.model_size == size && info.trained_long_enough())
}

type PlanesHint = Hint<PlanesCodeInfo>;

fn catalog() -> HintCatalog<PlanesCodeInfo> {
    HintCatalog::new(vec![
        PlanesHint::new(
            "Train for longer so the differences between model sizes show up. \
             Set epochs=60.",
            "epochs missing or below 60",
            on_button_or_return(),
            |i| !i.info.trained_long_enough(),
        ),
        PlanesHint::new(
            "Try a LARGE model with 60 epochs and watch how the validation accuracy \
             compares to the training accuracy.",
            "no LARGE run with at least 60 epochs in history",
            on_button_or_return(),
            |i| !tried_size(i.history, ModelSize::Large),
        ),
        PlanesHint::new(
            "The large model memorized the training planes. Now try a SMALL model \
             with 60 epochs.",
            "no SMALL run with at least 60 epochs in history",
            on_button_or_return(),
            |i| !tried_size(i.history, ModelSize::Small),
        ),
        PlanesHint::new(
            "Too big overfits and too small underfits. Try a MEDIUM model.",
            "current size is not MEDIUM",
            on_button(),
            |i| i.info.model_size != ModelSize::Medium,
        ),
        PlanesHint::new(
            "This model seems the best fit for the data. Great work! Submit your results.",
            "always",
            on_button_or_return(),
            |_| true,
        ),
    ])
}

fn accuracy_cutoffs() -> CutoffTable {
    CutoffTable::new(vec![(0.7, 0.1), (0.8, 0.2), (0.9, 0.3)])
}

pub fn evaluate_planes_experiment(experiment: &Experiment) -> f64 {
    let Some(info) = experiment.code_info.as_ref().and_then(CodeInfo::as_planes) else {
        return 0.0;
    };
    let setup = WeightedCriteria::new()
        .criterion("medium model", 0.4, info.model_size == ModelSize::Medium)
        .criterion(
            "epochs in 40..=80",
            0.2,
            info.epochs.is_some_and(|e| (40..=80).contains(&e)),
        )
        .criterion("early stopping", 0.1, info.uses_early_stopping);
    let accuracy = experiment
        .summary
        .as_ref()
        .and_then(|s| s.validation_accuracy)
        .or(info.validation_accuracy);

    tracing::debug!(
        activity = "planes",
        unmet = ?setup.unmet().collect::<Vec<_>>(),
        "scored criteria"
    );
    round_score(setup.points() + accuracy_cutoffs().score_opt(accuracy))
}

pub struct PlanesActivity {
    catalog: HintCatalog<PlanesCodeInfo>,
}

impl PlanesActivity {
    pub fn new() -> Self {
        Self { catalog: catalog() }
    }
}

impl Default for PlanesActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Activity for PlanesActivity {
    fn id(&self) -> ActivityId {
        ActivityId::Planes
    }

    fn title(&self) -> &str {
        "Planes: model size and overfitting"
    }

    fn examine(
        &self,
        code: &SourceLines,
        validation: Option<&ValidationOutput>,
        _run_count: u32,
    ) -> Examination {
        Examination::new(
            CodeInfo::Planes(PlanesCodeInfo::extract(code, validation)),
            code,
        )
    }

    fn select_hints(
        &self,
        code_info: &CodeInfo,
        run_count: u32,
        history: &[Experiment],
    ) -> HintSelection {
        self.catalog
            .select_for(code_info.as_planes(), run_count, history)
    }

    fn hint_catalog(&self) -> Vec<HintView> {
        self.catalog.views()
    }

    fn summarize(&self, code_info: &CodeInfo, simulations: &[SimulationOutput]) -> Summary {
        Summary {
            plays: simulations.len(),
            validation_accuracy: code_info.as_planes().and_then(|i| i.validation_accuracy),
            ..Summary::default()
        }
    }

    fn score(&self, experiment: &Experiment) -> f64 {
        evaluate_planes_experiment(experiment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentBuilder;

    fn code(size: &str, epochs: u32) -> SourceLines {
        SourceLines::from_code(&format!(
            "model = build_model(model_size=\"{size}\")\nmodel.fit(x, y, epochs={epochs})"
        ))
    }

    fn past_run(size: &str, epochs: u32) -> Experiment {
        ExperimentBuilder::new(ActivityId::Planes)
            .build()
            .with_code_info(CodeInfo::Planes(PlanesCodeInfo::extract(
                &code(size, epochs),
                None,
            )))
    }

    fn active_message(info: PlanesCodeInfo, history: &[Experiment]) -> String {
        PlanesActivity::new()
            .select_hints(&CodeInfo::Planes(info), history.len() as u32, history)
            .active
            .map(|h| h.message)
            .unwrap_or_default()
    }

    #[test]
    fn test_extract_size_and_epochs() {
        let info = PlanesCodeInfo::extract(&code("LARGE", 60), None);
        assert_eq!(info.model_size, ModelSize::Large);
        assert_eq!(info.epochs, Some(60));
        assert!(!info.uses_early_stopping);
        assert_eq!(info.validation_accuracy, None);
    }

    #[test]
    fn test_unknown_size_in_other_quotes() {
        let info = PlanesCodeInfo::extract(&SourceLines::from_code("model_size = 'HUGE'"), None);
        assert_eq!(info.model_size, ModelSize::Unknown);
    }

    #[test]
    fn test_validation_accuracy_takes_last_epoch() {
        let out = ValidationOutput::from_text(
            "Epoch 1/2\nloss: 0.9 - val_accuracy: 0.61\nEpoch 2/2\nloss: 0.4 - val_accuracy: 0.83",
        );
        let info = PlanesCodeInfo::extract(&code("MEDIUM", 60), Some(&out));
        assert_eq!(info.validation_accuracy, Some(0.83));
    }

    #[test]
    fn test_short_training_hint_first() {
        let info = PlanesCodeInfo::extract(&code("MEDIUM", 10), None);
        assert!(active_message(info, &[]).contains("epochs=60"));
    }

    #[test]
    fn test_experiment_sequence() {
        let medium = PlanesCodeInfo::extract(&code("MEDIUM", 60), None);

        assert!(active_message(medium.clone(), &[]).contains("LARGE"));

        let history = vec![past_run("LARGE", 60)];
        assert!(active_message(medium.clone(), &history).contains("SMALL"));

        // A LARGE run that was too short does not count.
        let history = vec![past_run("LARGE", 20), past_run("SMALL", 60)];
        assert!(active_message(medium, &history).contains("LARGE"));
    }

    #[test]
    fn test_best_fit_after_large_and_small() {
        let medium = PlanesCodeInfo::extract(&code("MEDIUM", 60), None);
        let history = vec![past_run("LARGE", 60), past_run("SMALL", 60)];
        assert!(active_message(medium, &history).starts_with("This model seems the best fit"));

        let small = PlanesCodeInfo::extract(&code("SMALL", 60), None);
        assert!(active_message(small, &history).contains("MEDIUM"));
    }

    #[test]
    fn test_score() {
        let out = ValidationOutput::from_text("val_accuracy: 0.91");
        let base = code("MEDIUM", 60);
        let lines = SourceLines::from_cells(
            base.iter()
                .chain(std::iter::once("cb = EarlyStopping(patience=3)")),
        );
        let activity = PlanesActivity::new();
        let info = activity.examine(&lines, Some(&out), 1).code_info;
        let summary = activity.summarize(&info, &[]);
        assert_eq!(summary.validation_accuracy, Some(0.91));
        let exp = ExperimentBuilder::new(ActivityId::Planes)
            .build()
            .with_code_info(info)
            .with_summary(summary);
        assert_eq!(evaluate_planes_experiment(&exp), 1.0);
    }

    #[test]
    fn test_score_large_without_run() {
        let exp = past_run("LARGE", 100);
        assert_eq!(evaluate_planes_experiment(&exp), 0.0);
    }
}
