//! NMT: prepare English/French sentence pairs for a translation model.
//!
//! The preprocessing must tokenize, convert to integer sequences, pad both
//! languages at the end and reshape the targets to three dimensions. The
//! validation cell prints the target shape, which must equal
//! [`EXPECTED_OUTPUT_SHAPE`].

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::{on_button, on_button_or_return, while_active};
use crate::activity::{Activity, ActivityId, CodeInfo, Examination};
use crate::experiment::Experiment;
use crate::hints::{Hint, HintCatalog, HintSelection, HintView};
use crate::notebook::ValidationOutput;
use crate::pattern::{LineMatcher, SourceLines};
use crate::scoring::{WeightedCriteria, round_score};
use crate::simulation::{SimulationOutput, Summary};

/// (sentences, max sequence length, features).
pub const EXPECTED_OUTPUT_SHAPE: (u32, u32, u32) = (137_861, 21, 1);

/// Source and target both need padding.
const REQUIRED_POST_PADDINGS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NmtCodeInfo {
    pub creates_tokenizer: bool,
    pub fits_tokenizer: bool,
    pub converts_texts_to_sequences: bool,
    pub pads_sequences_post: bool,
    pub reshapes_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_shape: Option<(u32, u32, u32)>,
    #[serde(default)]
    pub output_shape_ok: bool,
    #[serde(default)]
    pub key_error_observed: bool,
}

struct NmtMatchers {
    tokenizer: LineMatcher,
    fit_on_texts: LineMatcher,
    texts_to_sequences: LineMatcher,
    pad_post: LineMatcher,
    reshape: LineMatcher,
    shape: LineMatcher,
    key_error: LineMatcher,
}

static MATCHERS: LazyLock<NmtMatchers> = LazyLock::new(|| NmtMatchers {
    tokenizer: LineMatcher::new("tokenizer", &[r"\bTokenizer\("]),
    fit_on_texts: LineMatcher::new("fit_on_texts", &[r"\.fit_on_texts\("]),
    texts_to_sequences: LineMatcher::new("texts_to_sequences", &[r"\.texts_to_sequences\("]),
    pad_post: LineMatcher::new(
        "pad_post",
        &[r#"\bpad_sequences\(.*padding\s*=\s*["']post["']"#],
    ),
    reshape: LineMatcher::new("reshape", &[r"\.reshape\("]),
    shape: LineMatcher::new("shape", &[r"\((\d+,\s*\d+,\s*\d+)\)"]),
    key_error: LineMatcher::new("key_error", &[r"\bKeyError\b"]),
});

fn parse_shape(text: &str) -> Option<(u32, u32, u32)> {
    let mut dims = text.split(',').map(|d| d.trim().parse::<u32>());
    match (dims.next(), dims.next(), dims.next(), dims.next()) {
        (Some(Ok(a)), Some(Ok(b)), Some(Ok(c)), None) => Some((a, b, c)),
        _ => None,
    }
}

impl NmtCodeInfo {
    pub fn extract(lines: &SourceLines, validation: Option<&ValidationOutput>) -> Self {
        let m = &*MATCHERS;
        let mut info = Self {
            creates_tokenizer: m.tokenizer.matches(lines),
            fits_tokenizer: m.fit_on_texts.matches(lines),
            converts_texts_to_sequences: m.texts_to_sequences.matches(lines),
            pads_sequences_post: m.pad_post.count(lines) >= REQUIRED_POST_PADDINGS,
            reshapes_output: m.reshape.matches(lines),
            ..Self::default()
        };

        if let Some(validation) = validation {
            let output = validation.lines();
            info.output_shape = m.shape.capture_last(&output).and_then(parse_shape);
            info.output_shape_ok = info.output_shape == Some(EXPECTED_OUTPUT_SHAPE);
            info.key_error_observed = m.key_error.matches(&output);
        }
        info
    }

    fn preprocessing_complete(&self) -> bool {
        self.creates_tokenizer
            && self.fits_tokenizer
            && self.converts_texts_to_sequences
            && self.pads_sequences_post
            && self.reshapes_output
    }
}

type NmtHint = Hint<NmtCodeInfo>;

fn catalog() -> HintCatalog<NmtCodeInfo> {
    HintCatalog::new(vec![
        NmtHint::new(
            "The model only understands numbers. Create a Tokenizer and call \
             fit_on_texts on the sentences so every word gets an id.",
            "no tokenizer fit on the texts",
            on_button_or_return(),
            |i| !(i.info.creates_tokenizer && i.info.fits_tokenizer),
        ),
        NmtHint::new(
            "The tokenizer knows the vocabulary now. Use texts_to_sequences to turn \
             each sentence into a list of word ids.",
            "texts not converted to sequences",
            on_button(),
            |i| !i.info.converts_texts_to_sequences,
        ),
        NmtHint::new(
            "Sentences have different lengths. Pad both the English and the French \
             sequences with pad_sequences(..., padding='post').",
            "fewer than two post paddings",
            on_button(),
            |i| !i.info.pads_sequences_post,
        ),
        NmtHint::new(
            "The last run raised a KeyError. Check the column names you use to pick \
             the English and French sentences.",
            "KeyError in the run output",
            while_active(),
            |i| i.info.key_error_observed,
        ),
        NmtHint::new(
            "The output does not have the shape the model expects. Reshape the \
             padded French sequences to (137861, 21, 1).",
            "a run produced the wrong output shape",
            on_button_or_return(),
            |i| i.run_count > 0 && !i.info.output_shape_ok,
        ),
        NmtHint::new(
            "Your data is ready for translation! Submit your results?",
            "always",
            on_button_or_return(),
            |_| true,
        ),
    ])
}

pub fn evaluate_nmt_experiment(experiment: &Experiment) -> f64 {
    let Some(info) = experiment.code_info.as_ref().and_then(CodeInfo::as_nmt) else {
        return 0.0;
    };
    let clean_run = info.output_shape_ok && !info.key_error_observed;
    let criteria = WeightedCriteria::new()
        .criterion("tokenizer created", 0.16, info.creates_tokenizer)
        .criterion("tokenizer fit", 0.16, info.fits_tokenizer)
        .criterion("texts to sequences", 0.16, info.converts_texts_to_sequences)
        .criterion("post padding", 0.16, info.pads_sequences_post)
        .criterion("output reshaped", 0.16, info.reshapes_output)
        .criterion("expected output shape", 0.2, clean_run);

    tracing::debug!(
        activity = "nmt",
        unmet = ?criteria.unmet().collect::<Vec<_>>(),
        "scored criteria"
    );
    round_score(criteria.points())
}

pub struct NmtActivity {
    catalog: HintCatalog<NmtCodeInfo>,
}

impl NmtActivity {
    pub fn new() -> Self {
        Self { catalog: catalog() }
    }
}

impl Default for NmtActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Activity for NmtActivity {
    fn id(&self) -> ActivityId {
        ActivityId::Nmt
    }

    fn title(&self) -> &str {
        "Neural machine translation: data preparation"
    }

    fn examine(
        &self,
        code: &SourceLines,
        validation: Option<&ValidationOutput>,
        _run_count: u32,
    ) -> Examination {
        let info = NmtCodeInfo::extract(code, validation);
        if validation.is_some() && !info.preprocessing_complete() {
            tracing::debug!(shape = ?info.output_shape, "run finished with incomplete preprocessing");
        }
        Examination::new(CodeInfo::Nmt(info), code)
    }

    fn select_hints(
        &self,
        code_info: &CodeInfo,
        run_count: u32,
        history: &[Experiment],
    ) -> HintSelection {
        self.catalog
            .select_for(code_info.as_nmt(), run_count, history)
    }

    fn hint_catalog(&self) -> Vec<HintView> {
        self.catalog.views()
    }

    fn summarize(&self, code_info: &CodeInfo, simulations: &[SimulationOutput]) -> Summary {
        let info = code_info.as_nmt();
        Summary {
            plays: simulations.len(),
            output_shape_ok: info
                .filter(|i| i.output_shape.is_some())
                .map(|i| i.output_shape_ok),
            error_observed: info.is_some_and(|i| i.key_error_observed),
            ..Summary::default()
        }
    }

    fn score(&self, experiment: &Experiment) -> f64 {
        evaluate_nmt_experiment(experiment)
    }
}
