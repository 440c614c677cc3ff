//! Fruit-Picker: a robot arm picks ripe fruit using a classifier trained on
//! fruit measurements.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::{on_button, on_button_or_return, while_active};
use crate::activity::{Activity, ActivityId, CodeInfo, Examination};
use crate::experiment::Experiment;
use crate::hints::{Hint, HintCatalog, HintSelection, HintView};
use crate::notebook::ValidationOutput;
use crate::pattern::{LineMatcher, SourceLines};
use crate::scoring::{CutoffTable, WeightedCriteria, round_score};
use crate::simulation::{ClassificationMetrics, SimulationOutput, Summary};

pub const POSITIVE_LABELS: &[&str] = &["good", "ripe", "1", "true"];

/// F1 at or above this on the last run silences the tuning hint.
pub const TUNED_F1: f64 = 0.8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FruitClassifier {
    KNeighbors,
    DecisionTree,
    RandomForest,
    Dummy,
    #[default]
    None,
}

impl FruitClassifier {
    pub fn is_real(self) -> bool {
        !matches!(self, FruitClassifier::Dummy | FruitClassifier::None)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FruitCodeInfo {
    pub classifier_model_used: FruitClassifier,
    pub splits_train_test: bool,
    pub uses_standard_scaler: bool,
    pub drops_label_column: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_neighbors: Option<u32>,
}

struct FruitMatchers {
    random_forest: LineMatcher,
    decision_tree: LineMatcher,
    k_neighbors: LineMatcher,
    dummy: LineMatcher,
    split: LineMatcher,
    scaler: LineMatcher,
    drop_label: LineMatcher,
    n_neighbors: LineMatcher,
}

static MATCHERS: LazyLock<FruitMatchers> = LazyLock::new(|| FruitMatchers {
    random_forest: LineMatcher::new("random_forest", &[r"\bRandomForestClassifier\("]),
    decision_tree: LineMatcher::new("decision_tree", &[r"\bDecisionTreeClassifier\("]),
    k_neighbors: LineMatcher::new("k_neighbors", &[r"\bKNeighborsClassifier\("]),
    dummy: LineMatcher::new("dummy", &[r"\bDummyClassifier\("]),
    split: LineMatcher::new("split", &[r"\btrain_test_split\("]),
    scaler: LineMatcher::new("scaler", &[r"\bStandardScaler\("]),
    drop_label: LineMatcher::new(
        "drop_label",
        &[r#"\.drop\(.*["']label["']"#, r#"\bdel\s+\w+\[\s*["']label["']\s*\]"#],
    ),
    n_neighbors: LineMatcher::new(
        "n_neighbors",
        &[
            r"n_neighbors\s*=\s*(\d+)",
            r"KNeighborsClassifier\(\s*(\d+)",
        ],
    ),
});

impl FruitCodeInfo {
    pub fn extract(lines: &SourceLines) -> Self {
        let m = &*MATCHERS;
        let classifier_model_used = if m.random_forest.matches(lines) {
            FruitClassifier::RandomForest
        } else if m.decision_tree.matches(lines) {
            FruitClassifier::DecisionTree
        } else if m.k_neighbors.matches(lines) {
            FruitClassifier::KNeighbors
        } else if m.dummy.matches(lines) {
            FruitClassifier::Dummy
        } else {
            FruitClassifier::None
        };

        Self {
            classifier_model_used,
            splits_train_test: m.split.matches(lines),
            uses_standard_scaler: m.scaler.matches(lines),
            drops_label_column: m.drop_label.matches(lines),
            n_neighbors: m.n_neighbors.capture_u32(lines),
        }
    }
}

fn last_run_f1(history: &[Experiment]) -> Option<f64> {
    history.last()?.summary.as_ref()?.f1
}

type FruitHint = Hint<FruitCodeInfo>;

fn catalog() -> HintCatalog<FruitCodeInfo> {
    HintCatalog::new(vec![
        FruitHint::new(
            "The picker is grabbing fruit at random. Train a real classifier such as \
             KNeighborsClassifier or DecisionTreeClassifier.",
            "classifier is DUMMY or NONE",
            on_button_or_return(),
            |i| !i.info.classifier_model_used.is_real(),
        ),
        FruitHint::new(
            "The 'label' column is still among the features, so the model can peek at \
             the answer. Drop it from X before training.",
            "label column is not dropped",
            while_active(),
            |i| !i.info.drops_label_column,
        ),
        FruitHint::new(
            "Hold out some fruit for testing with train_test_split so you can tell \
             whether the picker generalizes.",
            "no train/test split",
            on_button(),
            |i| !i.info.splits_train_test,
        ),
        FruitHint::new(
            "Nearest-neighbor models compare distances, so features on large scales \
             dominate. Try a StandardScaler first.",
            "KNN without scaling",
            while_active(),
            |i| {
                i.info.classifier_model_used == FruitClassifier::KNeighbors
                    && !i.info.uses_standard_scaler
            },
        ),
        FruitHint::new(
            "The last run missed quite a few ripe fruit. Try tuning n_neighbors or \
             switching to RandomForestClassifier.",
            "last run F1 below 0.8",
            on_button_or_return(),
            |i| last_run_f1(i.history).is_some_and(|f1| f1 < TUNED_F1),
        ),
        FruitHint::new(
            "The picker is doing great! Ready to submit your results?",
            "always",
            on_button_or_return(),
            |_| true,
        ),
    ])
}

fn f1_cutoffs() -> CutoffTable {
    CutoffTable::new(vec![(0.6, 0.1), (0.7, 0.2), (0.8, 0.3), (0.9, 0.4)])
}

/// 0.6 for pipeline hygiene plus up to 0.4 for F1.
pub fn evaluate_fruit_experiment(experiment: &Experiment) -> f64 {
    let Some(info) = experiment
        .code_info
        .as_ref()
        .and_then(CodeInfo::as_fruit_picker)
    else {
        return 0.0;
    };
    let pipeline = WeightedCriteria::new()
        .criterion("real classifier", 0.15, info.classifier_model_used.is_real())
        .criterion("label dropped", 0.15, info.drops_label_column)
        .criterion("train/test split", 0.15, info.splits_train_test)
        .criterion("standard scaler", 0.15, info.uses_standard_scaler);
    let f1 = experiment.summary.as_ref().and_then(|s| s.f1);

    tracing::debug!(
        activity = "fruit_picker",
        unmet = ?pipeline.unmet().collect::<Vec<_>>(),
        "scored criteria"
    );
    round_score(pipeline.points() + f1_cutoffs().score_opt(f1))
}

pub struct FruitPickerActivity {
    catalog: HintCatalog<FruitCodeInfo>,
}

impl FruitPickerActivity {
    pub fn new() -> Self {
        Self { catalog: catalog() }
    }
}

impl Default for FruitPickerActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Activity for FruitPickerActivity {
    fn id(&self) -> ActivityId {
        ActivityId::FruitPicker
    }

    fn title(&self) -> &str {
        "Fruit picker"
    }

    fn examine(
        &self,
        code: &SourceLines,
        _validation: Option<&ValidationOutput>,
        _run_count: u32,
    ) -> Examination {
        Examination::new(CodeInfo::FruitPicker(FruitCodeInfo::extract(code)), code)
    }

    fn select_hints(
        &self,
        code_info: &CodeInfo,
        run_count: u32,
        history: &[Experiment],
    ) -> HintSelection {
        self.catalog
            .select_for(code_info.as_fruit_picker(), run_count, history)
    }

    fn hint_catalog(&self) -> Vec<HintView> {
        self.catalog.views()
    }

    fn summarize(&self, _code_info: &CodeInfo, simulations: &[SimulationOutput]) -> Summary {
        let metrics = ClassificationMetrics::from_simulations(simulations, POSITIVE_LABELS);
        Summary::classification(&metrics, simulations.len())
    }

    fn score(&self, experiment: &Experiment) -> f64 {
        evaluate_fruit_experiment(experiment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentBuilder;

    const GOOD: &str = r#"
from sklearn.model_selection import train_test_split
from sklearn.preprocessing import StandardScaler
from sklearn.neighbors import KNeighborsClassifier

X = fruit.drop(columns=['label'])
y = fruit['label']
X_train, X_test, y_train, y_test = train_test_split(X, y)
scaler = StandardScaler()
model = KNeighborsClassifier(n_neighbors=7)
"#;

    fn select(info: FruitCodeInfo, history: &[Experiment]) -> HintSelection {
        FruitPickerActivity::new().select_hints(&CodeInfo::FruitPicker(info), 1, history)
    }

    fn run_with_f1(f1: f64) -> Experiment {
        ExperimentBuilder::new(ActivityId::FruitPicker)
            .build()
            .with_summary(Summary {
                f1: Some(f1),
                ..Summary::default()
            })
    }

    #[test]
    fn test_extract_good_pipeline() {
        let info = FruitCodeInfo::extract(&SourceLines::from_code(GOOD));
        assert_eq!(info.classifier_model_used, FruitClassifier::KNeighbors);
        assert!(info.splits_train_test);
        assert!(info.uses_standard_scaler);
        assert!(info.drops_label_column);
        assert_eq!(info.n_neighbors, Some(7));
    }

    #[test]
    fn test_label_kept_is_flagged() {
        let info = FruitCodeInfo::extract(&SourceLines::from_code(
            "X = fruit\nmodel = DecisionTreeClassifier()",
        ));
        assert!(!info.drops_label_column);
        let s = select(info, &[]);
        assert_eq!(s.active.map(|h| h.index), Some(1));
    }

    #[test]
    fn test_knn_without_scaler() {
        let info = FruitCodeInfo {
            classifier_model_used: FruitClassifier::KNeighbors,
            splits_train_test: true,
            drops_label_column: true,
            ..FruitCodeInfo::default()
        };
        let s = select(info.clone(), &[]);
        assert_eq!(s.active.map(|h| h.index), Some(3));

        // Trees do not care about feature scale.
        let tree = FruitCodeInfo {
            classifier_model_used: FruitClassifier::DecisionTree,
            ..info
        };
        assert!(!select(tree, &[]).is_active(3));
    }

    #[test]
    fn test_tuning_hint_follows_last_run() {
        let info = FruitCodeInfo::extract(&SourceLines::from_code(GOOD));
        let s = select(info.clone(), &[run_with_f1(0.65)]);
        assert_eq!(s.active.map(|h| h.index), Some(4));

        let s = select(info, &[run_with_f1(0.65), run_with_f1(0.85)]);
        assert_eq!(s.active.map(|h| h.index), Some(5));
    }

    #[test]
    fn test_score_full_pipeline_high_f1() {
        let info = FruitCodeInfo::extract(&SourceLines::from_code(GOOD));
        let exp = run_with_f1(0.93).with_code_info(CodeInfo::FruitPicker(info));
        assert_eq!(evaluate_fruit_experiment(&exp), 1.0);
    }

    #[test]
    fn test_score_dummy_only() {
        let info = FruitCodeInfo::extract(&SourceLines::from_code("m = DummyClassifier()"));
        let exp = run_with_f1(0.5).with_code_info(CodeInfo::FruitPicker(info));
        assert_eq!(evaluate_fruit_experiment(&exp), 0.0);
    }

    #[test]
    fn test_summarize_uses_fruit_labels() {
        let sims = vec![SimulationOutput::new(
            vec!["ripe".into(), "rotten".into()],
            vec!["ripe".into(), "rotten".into()],
        )];
        let summary = FruitPickerActivity::new()
            .summarize(&CodeInfo::FruitPicker(FruitCodeInfo::default()), &sims);
        assert_eq!(summary.f1, Some(1.0));
        assert_eq!(summary.accuracy, Some(1.0));
    }
}
