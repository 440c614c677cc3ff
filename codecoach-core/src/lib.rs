//! # Codecoach Core
//!
//! Code examination and coaching for notebook-based ML activities.
//! Provides the pattern matchers and per-activity CodeInfo extractors, hint
//! catalogs and the hint dispatcher, score evaluators, experiment records
//! and their stores, and the notebook session that ties them together.

pub mod activities;
pub mod activity;
pub mod config;
pub mod error;
pub mod experiment;
pub mod hints;
pub mod notebook;
pub mod pattern;
pub mod persistence;
pub mod scoring;
pub mod session;
pub mod simulation;
pub mod store;

// Re-export commonly used types at the crate root.
pub use activity::{Activity, ActivityId, ActivityRegistry, CodeInfo, Examination, LoadStatus};
pub use config::{CoachConfig, HintConfig, StoreBackend, StoreConfig, load_config};
pub use error::{CoachError, ConfigError, NotebookError, Result, SessionError, StoreError};
pub use experiment::{Experiment, ExperimentBuilder, ExperimentHistory, RunInputs};
pub use hints::{
    DisplayedHint, HintCatalog, HintDispatcher, HintSelection, HintTrigger, HintView,
    VisibilityCondition,
};
pub use notebook::{Notebook, NotebookCell, ValidationOutput};
pub use pattern::{LineMatcher, SourceLines};
pub use session::{NotebookSession, RunReport};
pub use simulation::{ClassificationMetrics, SimulationOutput, Summary};
pub use store::{ExperimentStore, open_store};
