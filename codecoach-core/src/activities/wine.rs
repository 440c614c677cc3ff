//! Wine: cluster unlabeled wines after cleaning and scaling the features.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use super::{on_button, on_button_or_return, while_active};
use crate::activity::{Activity, ActivityId, CodeInfo, Examination};
use crate::experiment::Experiment;
use crate::hints::{Hint, HintCatalog, HintSelection, HintView};
use crate::notebook::ValidationOutput;
use crate::pattern::{LineMatcher, SourceLines};
use crate::scoring::{WeightedCriteria, round_score};
use crate::simulation::{SimulationOutput, Summary};

/// Cluster counts that match the grape varieties in the data.
pub const GOOD_CLUSTER_COUNTS: [u32; 2] = [5, 6];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WineCodeInfo {
    pub drops_wine_column: bool,
    pub drop_wine_uses_axis_1: bool,
    pub saves_quality_column: bool,
    pub drops_quality_column: bool,
    pub uses_standard_scaler: bool,
    pub scaler_fits_and_transforms: bool,
    pub wraps_in_dataframe: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_clusters: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_count: Option<u32>,
}

impl WineCodeInfo {
    /// Cluster count seen in the last run, else the one configured in code.
    pub fn effective_cluster_count(&self) -> Option<u32> {
        self.cluster_count.or(self.n_clusters)
    }
}

struct WineMatchers {
    drop_wine: LineMatcher,
    drop_wine_axis: LineMatcher,
    save_quality: LineMatcher,
    drop_quality: LineMatcher,
    scaler: LineMatcher,
    fit_transform: LineMatcher,
    fit: LineMatcher,
    transform: LineMatcher,
    dataframe: LineMatcher,
    n_clusters: LineMatcher,
    clusters_in_output: LineMatcher,
}

static MATCHERS: LazyLock<WineMatchers> = LazyLock::new(|| WineMatchers {
    drop_wine: LineMatcher::new("drop_wine", &[r#"\.drop\(.*["']Wine["']"#]),
    drop_wine_axis: LineMatcher::new(
        "drop_wine_axis",
        &[
            r#"\.drop\(.*["']Wine["'].*axis\s*=\s*(?:1|["']columns["'])"#,
            r#"\.drop\(.*axis\s*=\s*(?:1|["']columns["']).*["']Wine["']"#,
            r#"\.drop\(.*columns\s*=\s*\[?\s*["']Wine["']"#,
        ],
    ),
    save_quality: LineMatcher::new(
        "save_quality",
        &[r#"\w+\s*=\s*\w+\[\s*["']quality["']\s*\]"#],
    ),
    drop_quality: LineMatcher::new("drop_quality", &[r#"\.drop\(.*["']quality["']"#]),
    scaler: LineMatcher::new("scaler", &[r"\bStandardScaler\("]),
    fit_transform: LineMatcher::new("fit_transform", &[r"\.fit_transform\("]),
    fit: LineMatcher::new("fit", &[r"\.fit\("]),
    transform: LineMatcher::new("transform", &[r"\.transform\("]),
    dataframe: LineMatcher::new("dataframe", &[r"\bDataFrame\("]),
    n_clusters: LineMatcher::new("n_clusters", &[r"\bn_clusters\s*=\s*(\d+)"]),
    clusters_in_output: LineMatcher::new(
        "clusters_in_output",
        &[r"(?i)\bclusters?(?:_count)?\s*[:=]\s*(\d+)"],
    ),
});

fn cluster_count_from_json(values: &[Value]) -> Option<u32> {
    values.iter().rev().find_map(|v| {
        ["cluster_count", "clusters"]
            .iter()
            .find_map(|key| v.get(*key)?.as_u64())
            .and_then(|n| u32::try_from(n).ok())
    })
}

impl WineCodeInfo {
    pub fn extract(lines: &SourceLines, validation: Option<&ValidationOutput>) -> Self {
        let m = &*MATCHERS;
        let n_clusters = m.n_clusters.capture_u32(lines);
        let cluster_count = validation.and_then(|v| {
            cluster_count_from_json(&v.json)
                .or_else(|| {
                    m.clusters_in_output
                        .capture_last(&v.lines())
                        .and_then(|s| s.parse().ok())
                })
                .or(n_clusters)
        });

        Self {
            drops_wine_column: m.drop_wine.matches(lines),
            drop_wine_uses_axis_1: m.drop_wine_axis.matches(lines),
            saves_quality_column: m.save_quality.matches(lines),
            drops_quality_column: m.drop_quality.matches(lines),
            uses_standard_scaler: m.scaler.matches(lines),
            scaler_fits_and_transforms: m.fit_transform.matches(lines)
                || (m.fit.matches(lines) && m.transform.matches(lines)),
            wraps_in_dataframe: m.dataframe.matches(lines),
            n_clusters,
            cluster_count,
        }
    }
}

type WineHint = Hint<WineCodeInfo>;

fn catalog() -> HintCatalog<WineCodeInfo> {
    HintCatalog::new(vec![
        WineHint::new(
            "The 'Wine' column is the answer we are trying to discover. Drop it \
             before clustering.",
            "Wine column kept",
            on_button_or_return(),
            |i| !i.info.drops_wine_column,
        ),
        WineHint::new(
            "drop removes rows by default. Pass axis=1 to drop the 'Wine' column.",
            "Wine dropped without axis=1",
            while_active(),
            |i| !i.info.drop_wine_uses_axis_1,
        ),
        WineHint::new(
            "Save the 'quality' column in its own variable before you remove it, so \
             you can compare it with the clusters later.",
            "quality column not saved",
            on_button(),
            |i| !i.info.saves_quality_column,
        ),
        WineHint::new(
            "Now drop the 'quality' column from the features too.",
            "quality column kept",
            on_button(),
            |i| !i.info.drops_quality_column,
        ),
        WineHint::new(
            "The features are on very different scales. Create a StandardScaler.",
            "no StandardScaler",
            on_button(),
            |i| !i.info.uses_standard_scaler,
        ),
        WineHint::new(
            "The scaler does nothing until you fit it and transform the data. Try \
             fit_transform.",
            "scaler not fit and transformed",
            on_button(),
            |i| !i.info.scaler_fits_and_transforms,
        ),
        WineHint::new(
            "The scaler returns a plain array. Wrap it in pd.DataFrame to keep the \
             column names.",
            "scaled data not wrapped in a DataFrame",
            on_button(),
            |i| !i.info.wraps_in_dataframe,
        ),
        WineHint::new(
            "Look at the elbow in the plot. Try 5 or 6 clusters.",
            "cluster count known and not 5 or 6",
            on_button_or_return(),
            |i| {
                i.info
                    .effective_cluster_count()
                    .is_some_and(|n| !GOOD_CLUSTER_COUNTS.contains(&n))
            },
        ),
        WineHint::new(
            "The clusters look good! Submit your results?",
            "always",
            on_button_or_return(),
            |_| true,
        ),
    ])
}

pub fn evaluate_wine_experiment(experiment: &Experiment) -> f64 {
    let Some(info) = experiment.code_info.as_ref().and_then(CodeInfo::as_wine) else {
        return 0.0;
    };
    let clusters = experiment
        .summary
        .as_ref()
        .and_then(|s| s.cluster_count)
        .or_else(|| info.effective_cluster_count());
    let criteria = WeightedCriteria::new()
        .criterion("Wine column dropped", 0.1, info.drops_wine_column)
        .criterion("axis=1", 0.1, info.drop_wine_uses_axis_1)
        .criterion("quality saved", 0.1, info.saves_quality_column)
        .criterion("quality dropped", 0.1, info.drops_quality_column)
        .criterion("standard scaler", 0.1, info.uses_standard_scaler)
        .criterion("fit and transform", 0.1, info.scaler_fits_and_transforms)
        .criterion("DataFrame", 0.1, info.wraps_in_dataframe)
        .criterion(
            "5 or 6 clusters",
            0.3,
            clusters.is_some_and(|n| GOOD_CLUSTER_COUNTS.contains(&n)),
        );

    tracing::debug!(
        activity = "wine",
        unmet = ?criteria.unmet().collect::<Vec<_>>(),
        "scored criteria"
    );
    round_score(criteria.points())
}

pub struct WineActivity {
    catalog: HintCatalog<WineCodeInfo>,
}

impl WineActivity {
    pub fn new() -> Self {
        Self { catalog: catalog() }
    }
}

impl Default for WineActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Activity for WineActivity {
    fn id(&self) -> ActivityId {
        ActivityId::Wine
    }

    fn title(&self) -> &str {
        "Wine clustering"
    }

    fn examine(
        &self,
        code: &SourceLines,
        validation: Option<&ValidationOutput>,
        _run_count: u32,
    ) -> Examination {
        Examination::new(
            CodeInfo::Wine(WineCodeInfo::extract(code, validation)),
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
            .select_for(code_info.as_wine(), run_count, history)
    }

    fn hint_catalog(&self) -> Vec<HintView> {
        self.catalog.views()
    }

    fn summarize(&self, code_info: &CodeInfo, simulations: &[SimulationOutput]) -> Summary {
        Summary {
            plays: simulations.len(),
            cluster_count: code_info.as_wine().and_then(|i| i.cluster_count),
            ..Summary::default()
        }
    }

    fn score(&self, experiment: &Experiment) -> f64 {
        evaluate_wine_experiment(experiment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentBuilder;
    use serde_json::json;

    const SOLUTION: &str = r#"
import pandas as pd
from sklearn.preprocessing import StandardScaler
from sklearn.cluster import KMeans

wine = wine.drop('Wine', axis=1)
quality = wine['quality']
wine = wine.drop(columns=['quality'])
scaler = StandardScaler()
scaled = pd.DataFrame(scaler.fit_transform(wine), columns=wine.columns)
kmeans = KMeans(n_clusters=5)
"#;

    fn active_index(info: WineCodeInfo) -> Option<usize> {
        WineActivity::new()
            .select_hints(&CodeInfo::Wine(info), 1, &[])
            .active
            .map(|h| h.index)
    }

    #[test]
    fn test_extract_solution() {
        let info = WineCodeInfo::extract(&SourceLines::from_code(SOLUTION), None);
        assert!(info.drops_wine_column);
        assert!(info.drop_wine_uses_axis_1);
        assert!(info.saves_quality_column);
        assert!(info.drops_quality_column);
        assert!(info.uses_standard_scaler);
        assert!(info.scaler_fits_and_transforms);
        assert!(info.wraps_in_dataframe);
        assert_eq!(info.n_clusters, Some(5));
        assert_eq!(info.cluster_count, None);
    }

    #[test]
    fn test_drop_axis_variants() {
        let cases = [
            ("df.drop('Wine', axis=1)", true),
            ("df.drop(axis=1, labels='Wine')", true),
            ("df.drop(columns='Wine')", true),
            ("df.drop(\"Wine\", axis='columns')", true),
            ("df.drop('Wine')", false),
        ];
        for (code, expected) in cases {
            let info = WineCodeInfo::extract(&SourceLines::from_code(code), None);
            assert!(info.drops_wine_column, "{code}");
            assert_eq!(info.drop_wine_uses_axis_1, expected, "{code}");
        }
    }

    #[test]
    fn test_separate_fit_and_transform() {
        let info = WineCodeInfo::extract(
            &SourceLines::from_code("scaler.fit(wine)\nscaled = scaler.transform(wine)"),
            None,
        );
        assert!(info.scaler_fits_and_transforms);
    }

    #[test]
    fn test_hint_order() {
        assert_eq!(active_index(WineCodeInfo::default()), Some(0));

        let info = WineCodeInfo::extract(&SourceLines::from_code("df = df.drop('Wine')"), None);
        assert_eq!(active_index(info), Some(1));

        let mut info = WineCodeInfo::extract(&SourceLines::from_code(SOLUTION), None);
        assert_eq!(active_index(info.clone()), Some(8));
        info.n_clusters = Some(3);
        assert_eq!(active_index(info), Some(7));
    }

    #[test]
    fn test_cluster_count_sources() {
        let lines = SourceLines::from_code(SOLUTION);

        let json_out = ValidationOutput::default().with_json(json!({"clusters": 6}));
        let info = WineCodeInfo::extract(&lines, Some(&json_out));
        assert_eq!(info.cluster_count, Some(6));

        let text_out = ValidationOutput::from_text("Number of clusters: 4");
        let info = WineCodeInfo::extract(&lines, Some(&text_out));
        assert_eq!(info.cluster_count, Some(4));

        let silent = ValidationOutput::from_text("done");
        let info = WineCodeInfo::extract(&lines, Some(&silent));
        assert_eq!(info.cluster_count, Some(5));
    }

    #[test]
    fn test_full_solution_scores_one() {
        let activity = WineActivity::new();
        let out = ValidationOutput::default().with_json(json!({"cluster_count": 5}));
        let info = activity
            .examine(&SourceLines::from_code(SOLUTION), Some(&out), 1)
            .code_info;
        let summary = activity.summarize(&info, &[]);
        assert_eq!(summary.cluster_count, Some(5));
        let exp = ExperimentBuilder::new(ActivityId::Wine)
            .build()
            .with_code_info(info)
            .with_summary(summary);
        assert_eq!(evaluate_wine_experiment(&exp), 1.0);
        assert_eq!(activity.score(&exp), 1.0);
    }

    #[test]
    fn test_wrong_cluster_count_loses_bonus() {
        let info = WineCodeInfo {
            n_clusters: Some(3),
            ..WineCodeInfo::extract(&SourceLines::from_code(SOLUTION), None)
        };
        let exp = ExperimentBuilder::new(ActivityId::Wine)
            .build()
            .with_code_info(CodeInfo::Wine(info));
        assert_eq!(evaluate_wine_experiment(&exp), 0.7);
    }
}
