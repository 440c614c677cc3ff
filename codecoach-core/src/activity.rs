//! Activity interface and registry.
//!
//! Each activity bundles its extractor, hint catalog, simulator and scorer
//! behind the [`Activity`] trait. The registry maps an [`ActivityId`] to its
//! implementation and is built once at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::activities::{
    CafeActivity, CafeCodeInfo, FruitCodeInfo, FruitPickerActivity, NmtActivity, NmtCodeInfo,
    PlanesActivity, PlanesCodeInfo, WineActivity, WineCodeInfo,
};
use crate::error::CoachError;
use crate::experiment::Experiment;
use crate::hints::{HintSelection, HintView};
use crate::notebook::{NotebookCell, ValidationOutput};
use crate::pattern::SourceLines;
use crate::simulation::{SimulationOutput, Summary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityId {
    Cafe,
    FruitPicker,
    Planes,
    Nmt,
    Wine,
}

impl ActivityId {
    pub const ALL: [ActivityId; 5] = [
        ActivityId::Cafe,
        ActivityId::FruitPicker,
        ActivityId::Planes,
        ActivityId::Nmt,
        ActivityId::Wine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityId::Cafe => "cafe",
            ActivityId::FruitPicker => "fruit_picker",
            ActivityId::Planes => "planes",
            ActivityId::Nmt => "nmt",
            ActivityId::Wine => "wine",
        }
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityId {
    type Err = CoachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ActivityId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| CoachError::UnknownActivity { name: s.to_string() })
    }
}

/// What the learner's code currently does, per activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum CodeInfo {
    Cafe(CafeCodeInfo),
    FruitPicker(FruitCodeInfo),
    Planes(PlanesCodeInfo),
    Nmt(NmtCodeInfo),
    Wine(WineCodeInfo),
}

impl CodeInfo {
    pub fn activity_id(&self) -> ActivityId {
        match self {
            CodeInfo::Cafe(_) => ActivityId::Cafe,
            CodeInfo::FruitPicker(_) => ActivityId::FruitPicker,
            CodeInfo::Planes(_) => ActivityId::Planes,
            CodeInfo::Nmt(_) => ActivityId::Nmt,
            CodeInfo::Wine(_) => ActivityId::Wine,
        }
    }

    pub fn as_cafe(&self) -> Option<&CafeCodeInfo> {
        match self {
            CodeInfo::Cafe(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_fruit_picker(&self) -> Option<&FruitCodeInfo> {
        match self {
            CodeInfo::FruitPicker(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_planes(&self) -> Option<&PlanesCodeInfo> {
        match self {
            CodeInfo::Planes(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_nmt(&self) -> Option<&NmtCodeInfo> {
        match self {
            CodeInfo::Nmt(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_wine(&self) -> Option<&WineCodeInfo> {
        match self {
            CodeInfo::Wine(info) => Some(info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    /// No user code was found; the record holds defaults only.
    Empty,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Examination {
    pub code_info: CodeInfo,
    pub load_status: LoadStatus,
}

impl Examination {
    pub fn new(code_info: CodeInfo, lines: &SourceLines) -> Self {
        let load_status = if lines.is_empty() {
            LoadStatus::Empty
        } else {
            LoadStatus::Loaded
        };
        Self {
            code_info,
            load_status,
        }
    }
}

/// One learning activity: extraction, hints, simulation and scoring.
pub trait Activity: Send + Sync {
    fn id(&self) -> ActivityId;

    fn title(&self) -> &str;

    /// Build the CodeInfo for the current code. Post-run fields come from
    /// `validation` and stay at their defaults when it is `None`.
    fn examine(
        &self,
        code: &SourceLines,
        validation: Option<&ValidationOutput>,
        run_count: u32,
    ) -> Examination;

    /// Scan the hint catalog for the given state.
    fn select_hints(
        &self,
        code_info: &CodeInfo,
        run_count: u32,
        history: &[Experiment],
    ) -> HintSelection;

    fn hint_catalog(&self) -> Vec<HintView>;

    /// Simulated plays derived from the validation output.
    fn simulate(&self, validation: Option<&ValidationOutput>) -> Vec<SimulationOutput> {
        validation
            .map(|v| v.json.iter().flat_map(SimulationOutput::from_json).collect())
            .unwrap_or_default()
    }

    fn summarize(&self, code_info: &CodeInfo, simulations: &[SimulationOutput]) -> Summary;

    /// Evaluation score in [0, 1]. Pure in the experiment.
    fn score(&self, experiment: &Experiment) -> f64;

    fn extract_validation_output(&self, cell: &NotebookCell) -> ValidationOutput {
        ValidationOutput::from_cell(cell)
    }
}

/// Activity lookup by id.
pub struct ActivityRegistry {
    activities: BTreeMap<ActivityId, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self {
            activities: BTreeMap::new(),
        }
    }

    /// Registry with every built-in activity.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CafeActivity::new()));
        registry.register(Arc::new(FruitPickerActivity::new()));
        registry.register(Arc::new(PlanesActivity::new()));
        registry.register(Arc::new(NmtActivity::new()));
        registry.register(Arc::new(WineActivity::new()));
        registry
    }

    pub fn register(&mut self, activity: Arc<dyn Activity>) {
        self.activities.insert(activity.id(), activity);
    }

    pub fn get(&self, id: ActivityId) -> Option<Arc<dyn Activity>> {
        self.activities.get(&id).cloned()
    }

    pub fn require(&self, id: ActivityId) -> crate::Result<Arc<dyn Activity>> {
        self.get(id).ok_or_else(|| CoachError::UnknownActivity {
            name: id.to_string(),
        })
    }

    pub fn list(&self) -> Vec<Arc<dyn Activity>> {
        self.activities.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_id_parse() {
        assert_eq!("cafe".parse::<ActivityId>().unwrap(), ActivityId::Cafe);
        assert_eq!(
            "Fruit-Picker".parse::<ActivityId>().unwrap(),
            ActivityId::FruitPicker
        );
        assert!(matches!(
            "chess".parse::<ActivityId>(),
            Err(CoachError::UnknownActivity { .. })
        ));
    }

    #[test]
    fn test_activity_id_display_matches_serde() {
        for id in ActivityId::ALL {
            let json = serde_json::to_value(id).unwrap();
            assert_eq!(json, serde_json::Value::String(id.to_string()));
        }
    }

    #[test]
    fn test_registry_has_every_activity() {
        let registry = ActivityRegistry::with_defaults();
        assert_eq!(registry.len(), ActivityId::ALL.len());
        for id in ActivityId::ALL {
            let activity = registry.require(id).unwrap();
            assert_eq!(activity.id(), id);
            assert!(!activity.title().is_empty());
        }
    }

    #[test]
    fn test_every_catalog_ends_with_always_true_hint() {
        let registry = ActivityRegistry::with_defaults();
        for activity in registry.list() {
            let empty = activity.examine(&SourceLines::default(), None, 0);
            assert_eq!(empty.load_status, LoadStatus::Empty);
            let catalog = activity.hint_catalog();
            let selection = activity.select_hints(&empty.code_info, 0, &[]);
            let last = catalog.len() - 1;
            assert!(
                selection.is_active(last),
                "terminal hint of {} must always hold",
                activity.id()
            );
            assert!(selection.has_hint());
        }
    }

    #[test]
    fn test_mismatched_code_info_yields_no_hint() {
        let registry = ActivityRegistry::with_defaults();
        let cafe = registry.require(ActivityId::Cafe).unwrap();
        let wine = registry.require(ActivityId::Wine).unwrap();
        let wine_info = wine.examine(&SourceLines::default(), None, 0).code_info;
        assert!(!cafe.select_hints(&wine_info, 0, &[]).has_hint());
    }

    #[test]
    fn test_code_info_tagged_by_activity() {
        let registry = ActivityRegistry::with_defaults();
        let nmt = registry.require(ActivityId::Nmt).unwrap();
        let info = nmt.examine(&SourceLines::default(), None, 0).code_info;
        assert_eq!(info.activity_id(), ActivityId::Nmt);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["activity"], "nmt");
        let back: CodeInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }
}
