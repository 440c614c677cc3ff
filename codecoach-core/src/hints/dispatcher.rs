//! Hint display policy: which triggers may surface the selected hint, dedupe
//! by message, withdrawal of `MustBeActive` hints and auto-dismiss timers.
//!
//! Code changes never surface a hint; only the hint button, returning to the
//! notebook, and run completion do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{HintSelection, HintView, VisibilityCondition};
use crate::config::HintConfig;

/// Explicit events that may surface a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintTrigger {
    ButtonClicked,
    NotebookReturn,
    RunCompleted,
}

impl HintTrigger {
    /// The visibility condition a hint needs for this trigger.
    pub fn required_condition(self) -> VisibilityCondition {
        match self {
            HintTrigger::ButtonClicked => VisibilityCondition::HintButtonClicked,
            HintTrigger::NotebookReturn | HintTrigger::RunCompleted => {
                VisibilityCondition::TriggeredOnNotebookReturn
            }
        }
    }
}

/// A hint currently on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayedHint {
    pub id: u64,
    pub view: HintView,
    pub trigger: HintTrigger,
    pub shown_at: DateTime<Utc>,
}

pub struct HintDispatcher {
    displayed: Arc<Mutex<Vec<DisplayedHint>>>,
    shown_log: Vec<HintView>,
    auto_dismiss: Option<Duration>,
    cancel: CancellationToken,
    next_id: u64,
}

impl HintDispatcher {
    pub fn new(auto_dismiss: Option<Duration>) -> Self {
        Self {
            displayed: Arc::new(Mutex::new(Vec::new())),
            shown_log: Vec::new(),
            auto_dismiss,
            cancel: CancellationToken::new(),
            next_id: 0,
        }
    }

    pub fn from_config(config: &HintConfig) -> Self {
        Self::new(config.auto_dismiss_ms.map(Duration::from_millis))
    }

    /// Surface the selected hint if the trigger and its visibility allow it
    /// and it is not already on screen.
    pub fn trigger(&mut self, trigger: HintTrigger, selection: &HintSelection) -> Option<HintView> {
        let hint = selection.active.as_ref()?;
        if !hint.allows(trigger.required_condition()) {
            tracing::debug!(?trigger, hint = hint.index, "hint not visible for trigger");
            return None;
        }

        let id = self.next_id;
        {
            let mut displayed = lock(&self.displayed);
            if displayed.iter().any(|d| d.view.message == hint.message) {
                return None;
            }
            displayed.push(DisplayedHint {
                id,
                view: hint.clone(),
                trigger,
                shown_at: Utc::now(),
            });
        }
        self.next_id += 1;
        self.shown_log.push(hint.clone());
        tracing::debug!(?trigger, hint = hint.index, "hint displayed");

        if let Some(ttl) = self.auto_dismiss {
            self.schedule_dismiss(id, ttl);
        }
        Some(hint.clone())
    }

    fn schedule_dismiss(&self, id: u64, ttl: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(id, "no runtime; hint stays until dismissed");
            return;
        };
        let displayed = Arc::clone(&self.displayed);
        let token = self.cancel.child_token();
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(ttl) => {
                    lock(&displayed).retain(|d| d.id != id);
                }
            }
        });
    }

    /// Re-evaluate after a code change: withdraw `MustBeActive` hints whose
    /// predicate no longer holds. Never surfaces anything.
    pub fn refresh(&mut self, selection: &HintSelection) -> Vec<HintView> {
        let mut withdrawn = Vec::new();
        lock(&self.displayed).retain(|d| {
            let keep = !d.view.allows(VisibilityCondition::MustBeActive)
                || selection.is_active(d.view.index);
            if !keep {
                withdrawn.push(d.view.clone());
            }
            keep
        });
        withdrawn
    }

    pub fn dismiss(&self, message: &str) -> bool {
        let mut displayed = lock(&self.displayed);
        let before = displayed.len();
        displayed.retain(|d| d.view.message != message);
        displayed.len() < before
    }

    /// Leaving the notebook view: cancel pending timers and clear the screen.
    pub fn leave_notebook(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        lock(&self.displayed).clear();
    }

    pub fn displayed(&self) -> Vec<DisplayedHint> {
        lock(&self.displayed).clone()
    }

    pub fn is_displayed(&self, message: &str) -> bool {
        lock(&self.displayed)
            .iter()
            .any(|d| d.view.message == message)
    }

    /// Whether the hint button should be enabled.
    pub fn can_request_hint(selection: &HintSelection) -> bool {
        selection
            .active
            .as_ref()
            .is_some_and(|h| h.allows(VisibilityCondition::HintButtonClicked))
    }

    /// Every hint shown since the last call, in order.
    pub fn take_shown_log(&mut self) -> Vec<HintView> {
        std::mem::take(&mut self.shown_log)
    }

    pub fn shown_log(&self) -> &[HintView] {
        &self.shown_log
    }
}

impl Drop for HintDispatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock(displayed: &Mutex<Vec<DisplayedHint>>) -> MutexGuard<'_, Vec<DisplayedHint>> {
    displayed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
