//! Hint catalogs and the hint selector.
//!
//! A catalog is an ordered list of hints. Earlier entries describe earlier
//! deficiencies, later ones refinements, and the last entry is an
//! always-true "looks good, submit?" hint. The selector walks the catalog top
//! to bottom and picks the first hint whose predicate still holds.

pub mod dispatcher;

pub use dispatcher::{DisplayedHint, HintDispatcher, HintTrigger};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::experiment::Experiment;

/// When a hint may be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisibilityCondition {
    /// May be requested on demand through the hint button.
    HintButtonClicked,
    /// Shown automatically when the learner comes back to the notebook or a
    /// run completes.
    TriggeredOnNotebookReturn,
    /// Withdrawn from display as soon as its predicate stops holding.
    MustBeActive,
}

pub type Visibility = BTreeSet<VisibilityCondition>;

/// Builds a visibility set from a slice of conditions.
pub fn visibility(conditions: &[VisibilityCondition]) -> Visibility {
    conditions.iter().copied().collect()
}

/// What a hint predicate sees.
#[derive(Debug, Clone, Copy)]
pub struct HintInput<'a, I> {
    pub info: &'a I,
    pub run_count: u32,
    pub history: &'a [Experiment],
}

/// A message plus the predicate deciding whether it currently applies.
pub struct Hint<I> {
    pub message: String,
    pub condition_description: String,
    pub visibility: Visibility,
    pub active: fn(&HintInput<'_, I>) -> bool,
}

impl<I> Hint<I> {
    pub fn new(
        message: impl Into<String>,
        condition_description: impl Into<String>,
        visibility: Visibility,
        active: fn(&HintInput<'_, I>) -> bool,
    ) -> Self {
        Self {
            message: message.into(),
            condition_description: condition_description.into(),
            visibility,
            active,
        }
    }

    pub fn view(&self, index: usize) -> HintView {
        HintView {
            index,
            message: self.message.clone(),
            condition_description: self.condition_description.clone(),
            visibility: self.visibility.clone(),
        }
    }
}

impl<I> std::fmt::Debug for Hint<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hint")
            .field("message", &self.message)
            .field("condition_description", &self.condition_description)
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

/// Serializable projection of a hint. Predicates are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintView {
    pub index: usize,
    pub message: String,
    pub condition_description: String,
    pub visibility: Visibility,
}

impl HintView {
    pub fn allows(&self, condition: VisibilityCondition) -> bool {
        self.visibility.contains(&condition)
    }
}

/// Result of a catalog scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintSelection {
    /// The hint to show next, if any predicate holds.
    pub active: Option<HintView>,
    /// Hints before the active one; their predicates no longer hold.
    pub satisfied_prefix: Vec<HintView>,
    /// Catalog indices of every hint whose predicate holds.
    pub active_indices: Vec<usize>,
}

impl HintSelection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn has_hint(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active_indices.contains(&index)
    }
}

/// Ordered hints for one activity.
#[derive(Debug)]
pub struct HintCatalog<I> {
    hints: Vec<Hint<I>>,
}

impl<I> Default for HintCatalog<I> {
    fn default() -> Self {
        Self { hints: Vec::new() }
    }
}

impl<I> HintCatalog<I> {
    pub fn new(hints: Vec<Hint<I>>) -> Self {
        Self { hints }
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    pub fn views(&self) -> Vec<HintView> {
        self.hints
            .iter()
            .enumerate()
            .map(|(i, h)| h.view(i))
            .collect()
    }

    /// First hint, in catalog order, whose predicate holds.
    pub fn select(&self, input: &HintInput<'_, I>) -> HintSelection {
        let active_indices: Vec<usize> = self
            .hints
            .iter()
            .enumerate()
            .filter(|(_, h)| (h.active)(input))
            .map(|(i, _)| i)
            .collect();

        let Some(&first) = active_indices.first() else {
            tracing::debug!(hints = self.hints.len(), "no hint predicate holds");
            return HintSelection {
                active: None,
                satisfied_prefix: self.views(),
                active_indices,
            };
        };

        let satisfied_prefix = self.hints[..first]
            .iter()
            .enumerate()
            .map(|(i, h)| h.view(i))
            .collect();

        HintSelection {
            active: Some(self.hints[first].view(first)),
            satisfied_prefix,
            active_indices,
        }
    }

    /// Like [`select`](Self::select), but tolerates CodeInfo of another
    /// activity by reporting no hint.
    pub fn select_for(
        &self,
        info: Option<&I>,
        run_count: u32,
        history: &[Experiment],
    ) -> HintSelection {
        match info {
            Some(info) => self.select(&HintInput {
                info,
                run_count,
                history,
            }),
            None => HintSelection::none(),
        }
    }
}
