//! Cafe: classify customer reviews as positive or negative.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::{on_button, on_button_or_return};
use crate::activity::{Activity, ActivityId, CodeInfo, Examination};
use crate::experiment::Experiment;
use crate::hints::{Hint, HintCatalog, HintSelection, HintView};
use crate::notebook::ValidationOutput;
use crate::pattern::{LineMatcher, SourceLines, all_of};
use crate::scoring::{CutoffTable, WeightedCriteria, round_score};
use crate::simulation::{ClassificationMetrics, SimulationOutput, Summary};

pub const POSITIVE_LABELS: &[&str] = &["positive", "1", "true"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CafeClassifier {
    NaiveBayes,
    LogisticRegression,
    Dummy,
    #[default]
    None,
}

impl CafeClassifier {
    pub fn is_real(self) -> bool {
        matches!(
            self,
            CafeClassifier::NaiveBayes | CafeClassifier::LogisticRegression
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CafeCodeInfo {
    pub classifier_model_used: CafeClassifier,
    pub uses_stemming: bool,
    pub removes_stopwords: bool,
    pub lowercases_text: bool,
    pub uses_hashing_vectorizer: bool,
    pub uses_tfidf_vectorizer: bool,
    pub fits_classifier: bool,
}

struct CafeMatchers {
    logistic_regression: LineMatcher,
    naive_bayes: LineMatcher,
    dummy: LineMatcher,
    stemming: LineMatcher,
    stopwords: LineMatcher,
    lowercase: LineMatcher,
    hashing_import: LineMatcher,
    fit_transform: LineMatcher,
    tfidf: LineMatcher,
    fit: LineMatcher,
}

static MATCHERS: LazyLock<CafeMatchers> = LazyLock::new(|| CafeMatchers {
    logistic_regression: LineMatcher::new("logistic_regression", &[r"\bLogisticRegression\("]),
    naive_bayes: LineMatcher::new(
        "naive_bayes",
        &[r"\b(?:Multinomial|Gaussian|Bernoulli|Complement)NB\("],
    ),
    dummy: LineMatcher::new("dummy", &[r"\bDummyClassifier\("]),
    stemming: LineMatcher::new(
        "stemming",
        &[r"\b(?:Porter|Snowball|Lancaster)Stemmer\(", r"\.stem\("],
    ),
    stopwords: LineMatcher::new(
        "stopwords",
        &[
            r"stopwords\.words\(",
            r#"stop_words\s*=\s*["']english["']"#,
            r"\bENGLISH_STOP_WORDS\b",
        ],
    ),
    lowercase: LineMatcher::new("lowercase", &[r"\.lower\(\)", r"lowercase\s*=\s*True"]),
    hashing_import: LineMatcher::new("hashing_import", &[r"\bimport\b.*\bHashingVectorizer\b"]),
    fit_transform: LineMatcher::new("fit_transform", &[r"\.fit_transform\("]),
    tfidf: LineMatcher::new("tfidf", &[r"\bTfidfVectorizer\("]),
    fit: LineMatcher::new("fit", &[r"\.fit\("]),
});

impl CafeCodeInfo {
    pub fn extract(lines: &SourceLines) -> Self {
        let m = &*MATCHERS;
        // A real classifier wins over a leftover dummy one.
        let classifier_model_used = if m.logistic_regression.matches(lines) {
            CafeClassifier::LogisticRegression
        } else if m.naive_bayes.matches(lines) {
            CafeClassifier::NaiveBayes
        } else if m.dummy.matches(lines) {
            CafeClassifier::Dummy
        } else {
            CafeClassifier::None
        };

        Self {
            classifier_model_used,
            uses_stemming: m.stemming.matches(lines),
            removes_stopwords: m.stopwords.matches(lines),
            lowercases_text: m.lowercase.matches(lines),
            uses_hashing_vectorizer: all_of(&[&m.hashing_import, &m.fit_transform], lines),
            uses_tfidf_vectorizer: m.tfidf.matches(lines),
            fits_classifier: m.fit.matches(lines),
        }
    }
}

type CafeHint = Hint<CafeCodeInfo>;

fn catalog() -> HintCatalog<CafeCodeInfo> {
    HintCatalog::new(vec![
        CafeHint::new(
            "The cafe is using a dummy classifier that just guesses. Try a real classifier \
             such as LogisticRegression or MultinomialNB.",
            "classifier is DUMMY or NONE",
            on_button_or_return(),
            |i| !i.info.classifier_model_used.is_real(),
        ),
        CafeHint::new(
            "Consider preprocessing the reviews with stemming (for example nltk's \
             PorterStemmer) so that 'loved' and 'loving' count as the same word.",
            "no stemmer is applied",
            on_button(),
            |i| !i.info.uses_stemming,
        ),
        CafeHint::new(
            "Try removing stopwords like 'the' and 'and'. They carry little sentiment \
             and add noise.",
            "stopwords are kept",
            on_button(),
            |i| !i.info.removes_stopwords,
        ),
        CafeHint::new(
            "Your model is working well! Ready to submit your results?",
            "always",
            on_button_or_return(),
            |_| true,
        ),
    ])
}

fn f1_cutoffs() -> CutoffTable {
    CutoffTable::new(vec![(0.5, 0.1), (0.6, 0.2), (0.7, 0.3), (0.8, 0.4), (0.9, 0.5)])
}

/// Half the score for technique, half for the F1 of the simulated reviews.
pub fn evaluate_cafe_experiment(experiment: &Experiment) -> f64 {
    let Some(info) = experiment.code_info.as_ref().and_then(CodeInfo::as_cafe) else {
        return 0.0;
    };
    let technique = WeightedCriteria::new()
        .criterion("real classifier", 1.0, info.classifier_model_used.is_real())
        .criterion("stemming", 1.0, info.uses_stemming)
        .criterion("stopword removal", 1.0, info.removes_stopwords);
    let f1 = experiment.summary.as_ref().and_then(|s| s.f1);

    tracing::debug!(
        activity = "cafe",
        unmet = ?technique.unmet().collect::<Vec<_>>(),
        "scored criteria"
    );
    round_score(0.5 * technique.fraction() + f1_cutoffs().score_opt(f1))
}

pub struct CafeActivity {
    catalog: HintCatalog<CafeCodeInfo>,
}

impl CafeActivity {
    pub fn new() -> Self {
        Self { catalog: catalog() }
    }
}

impl Default for CafeActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Activity for CafeActivity {
    fn id(&self) -> ActivityId {
        ActivityId::Cafe
    }

    fn title(&self) -> &str {
        "Cafe review sentiment"
    }

    fn examine(
        &self,
        code: &SourceLines,
        _validation: Option<&ValidationOutput>,
        _run_count: u32,
    ) -> Examination {
        Examination::new(CodeInfo::Cafe(CafeCodeInfo::extract(code)), code)
    }

    fn select_hints(
        &self,
        code_info: &CodeInfo,
        run_count: u32,
        history: &[Experiment],
    ) -> HintSelection {
        self.catalog
            .select_for(code_info.as_cafe(), run_count, history)
    }

    fn hint_catalog(&self) -> Vec<HintView> {
        self.catalog.views()
    }

    fn summarize(&self, _code_info: &CodeInfo, simulations: &[SimulationOutput]) -> Summary {
        let metrics = ClassificationMetrics::from_simulations(simulations, POSITIVE_LABELS);
        Summary::classification(&metrics, simulations.len())
    }

    fn score(&self, experiment: &Experiment) -> f64 {
        evaluate_cafe_experiment(experiment)
    }
}
