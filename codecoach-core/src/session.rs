//! Per-notebook session state.
//!
//! A [`NotebookSession`] owns everything the notebook view needs while the
//! learner works on one activity: the latest CodeInfo, the run counter, the
//! experiment history, the hint dispatcher and the optional store. It is
//! driven from a single thread; only hint auto-dismiss timers run as
//! background tasks.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::activity::{Activity, ActivityId, CodeInfo, Examination};
use crate::config::HintConfig;
use crate::error::{SessionError, StoreError};
use crate::experiment::{Experiment, ExperimentBuilder, ExperimentHistory, RunInputs};
use crate::hints::{DisplayedHint, HintDispatcher, HintSelection, HintTrigger, HintView};
use crate::notebook::{Notebook, ValidationOutput};
use crate::pattern::SourceLines;
use crate::store::ExperimentStore;

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub experiment: Experiment,
    /// Hint surfaced by run completion, if any.
    pub hint: Option<HintView>,
    /// False when the experiment could not be written to the store.
    pub persisted: bool,
}

pub struct NotebookSession {
    activity: Arc<dyn Activity>,
    show_on_run_complete: bool,
    code: SourceLines,
    examination: Examination,
    run_count: u32,
    history: ExperimentHistory,
    dispatcher: HintDispatcher,
    store: Option<Box<dyn ExperimentStore>>,
    in_flight: bool,
    /// Validation output of the latest run. Post-run CodeInfo fields are
    /// rebuilt from it on every edit until the next run replaces it.
    last_validation: Option<ValidationOutput>,
}

impl NotebookSession {
    /// Open a session, loading earlier experiments from `store` when one is
    /// given. A store that cannot be read leaves the history empty.
    pub fn open(
        activity: Arc<dyn Activity>,
        hints: &HintConfig,
        store: Option<Box<dyn ExperimentStore>>,
    ) -> Self {
        let id = activity.id();
        let mut history = ExperimentHistory::new();
        if let Some(store) = &store {
            match store.list_by_activity(id) {
                Ok(experiments) => {
                    debug!(activity = %id, count = experiments.len(), "loaded experiment history");
                    history.replace(id, experiments);
                }
                Err(e) => warn!(activity = %id, error = %e, "could not load experiment history"),
            }
        }

        let code = SourceLines::default();
        let examination = activity.examine(&code, None, 0);
        let run_count = u32::try_from(history.run_count(id)).unwrap_or(u32::MAX);

        Self {
            activity,
            show_on_run_complete: hints.show_on_run_complete,
            code,
            examination,
            run_count,
            history,
            dispatcher: HintDispatcher::from_config(hints),
            store,
            in_flight: false,
            last_validation: None,
        }
    }

    pub fn activity(&self) -> &Arc<dyn Activity> {
        &self.activity
    }

    pub fn activity_id(&self) -> ActivityId {
        self.activity.id()
    }

    /// Code as of the last edit or run.
    pub fn code(&self) -> &SourceLines {
        &self.code
    }

    pub fn code_info(&self) -> &CodeInfo {
        &self.examination.code_info
    }

    pub fn examination(&self) -> &Examination {
        &self.examination
    }

    pub fn run_count(&self) -> u32 {
        self.run_count
    }

    pub fn history(&self) -> &[Experiment] {
        self.history.for_activity(self.activity.id())
    }

    pub fn is_run_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn last_validation(&self) -> Option<&ValidationOutput> {
        self.last_validation.as_ref()
    }

    /// Current hint selection for the latest code.
    pub fn selection(&self) -> HintSelection {
        self.activity
            .select_hints(self.code_info(), self.run_count, self.history())
    }

    pub fn can_request_hint(&self) -> bool {
        HintDispatcher::can_request_hint(&self.selection())
    }

    pub fn displayed_hints(&self) -> Vec<DisplayedHint> {
        self.dispatcher.displayed()
    }

    /// Re-examine after an edit. Returns the hints withdrawn because they
    /// stopped applying; never surfaces a new one.
    ///
    /// Post-run fields keep the values of the latest run.
    pub fn on_code_change(&mut self, code: SourceLines) -> Vec<HintView> {
        self.examination = self
            .activity
            .examine(&code, self.last_validation.as_ref(), self.run_count);
        self.code = code;
        let withdrawn = self.dispatcher.refresh(&self.selection());
        if !withdrawn.is_empty() {
            debug!(count = withdrawn.len(), "withdrew hints after code change");
        }
        withdrawn
    }

    /// Like [`on_code_change`](Self::on_code_change), for a session resumed
    /// on a notebook whose validation cell already holds output. An empty
    /// output keeps the one from the latest run.
    pub fn on_code_change_with(
        &mut self,
        code: SourceLines,
        validation: Option<ValidationOutput>,
    ) -> Vec<HintView> {
        if let Some(validation) = validation.filter(|v| !v.is_empty()) {
            self.last_validation = Some(validation);
        }
        self.on_code_change(code)
    }

    pub fn request_hint(&mut self) -> Option<HintView> {
        self.trigger(HintTrigger::ButtonClicked)
    }

    pub fn on_notebook_return(&mut self) -> Option<HintView> {
        self.trigger(HintTrigger::NotebookReturn)
    }

    pub fn dismiss_hint(&self, message: &str) -> bool {
        self.dispatcher.dismiss(message)
    }

    /// Leaving the notebook view cancels pending auto-dismiss timers.
    pub fn leave_notebook(&mut self) {
        self.dispatcher.leave_notebook();
    }

    fn trigger(&mut self, trigger: HintTrigger) -> Option<HintView> {
        let selection = self.selection();
        self.dispatcher.trigger(trigger, &selection)
    }

    pub fn begin_run(&mut self) -> Result<(), SessionError> {
        if self.in_flight {
            return Err(SessionError::RunInFlight {
                activity: self.activity.id(),
            });
        }
        self.in_flight = true;
        debug!(activity = %self.activity.id(), "run started");
        Ok(())
    }

    /// The run failed before producing output.
    pub fn abort_run(&mut self) {
        if self.in_flight {
            warn!(activity = %self.activity.id(), "run aborted");
        }
        self.in_flight = false;
    }

    /// Finish the in-flight run: examine the notebook with the validation
    /// output, simulate, summarize and score, then record the experiment.
    ///
    /// Store failures are logged and reported through
    /// [`RunReport::persisted`]; the experiment is still kept in memory.
    pub fn complete_run(
        &mut self,
        notebook: &Notebook,
        validation: Option<&ValidationOutput>,
        inputs: RunInputs,
    ) -> Result<RunReport, SessionError> {
        let id = self.activity.id();
        if !self.in_flight {
            return Err(SessionError::NoRunInFlight { activity: id });
        }
        self.in_flight = false;
        self.run_count = self.run_count.saturating_add(1);

        let code = notebook.user_code();
        self.examination = self.activity.examine(&code, validation, self.run_count);
        self.code = code;

        let simulations = self.activity.simulate(validation);
        let summary = self
            .activity
            .summarize(&self.examination.code_info, &simulations);
        let experiment = ExperimentBuilder::new(id)
            .inputs(inputs)
            .notebook(notebook.snapshot())
            .displayed_hints(self.dispatcher.take_shown_log())
            .build()
            .with_code_info(self.examination.code_info.clone())
            .with_simulations(simulations)
            .with_summary(summary);
        let score = self.activity.score(&experiment);
        let experiment = experiment.with_score(score);
        self.last_validation = validation.cloned();

        let persisted = self.persist(&experiment);
        self.history.push(experiment.clone());
        info!(
            activity = %id,
            run = self.run_count,
            score = experiment.evaluation_score.unwrap_or_default(),
            "run completed"
        );

        let withdrawn = self.dispatcher.refresh(&self.selection());
        if !withdrawn.is_empty() {
            debug!(count = withdrawn.len(), "withdrew hints after run");
        }
        let hint = if self.show_on_run_complete {
            self.trigger(HintTrigger::RunCompleted)
        } else {
            None
        };

        Ok(RunReport {
            experiment,
            hint,
            persisted,
        })
    }

    fn persist(&self, experiment: &Experiment) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.put(experiment) {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %experiment.id, error = %e, "could not save experiment");
                false
            }
        }
    }

    /// Forget every experiment of this activity, in memory and in the store.
    pub fn clear_history(&mut self) -> Result<usize, StoreError> {
        let id = self.activity.id();
        let in_memory = self.history.run_count(id);
        self.history.clear_activity(id);
        self.run_count = 0;
        self.last_validation = None;
        self.examination = self.activity.examine(&self.code, None, 0);
        let removed = match &self.store {
            Some(store) => store.clear_activity(id)?,
            None => in_memory,
        };
        info!(activity = %id, removed, "experiment history cleared");
        Ok(removed)
    }
}
