//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::HistoryAction;
use crate::TriggerArg;
use codecoach_core::config::{WORKSPACE_DIR, save_workspace_config};
use codecoach_core::{
    Activity, ActivityId, ActivityRegistry, CoachConfig, Experiment, HintView, Notebook,
    NotebookSession, RunInputs, ValidationOutput,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Text,
    Json,
}

impl Output {
    fn print<T: Serialize>(self, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
        match self {
            Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
            Output::Text => println!("{}", text()),
        }
        Ok(())
    }
}

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    output: Output,
) -> anyhow::Result<()> {
    let registry = ActivityRegistry::with_defaults();
    match command {
        Commands::Activities => handle_activities(&registry, output),
        Commands::Examine { notebook, activity } => {
            handle_examine(&registry, &notebook, activity, output)
        }
        Commands::Hints { activity } => handle_hints(&registry, activity, output),
        Commands::Hint {
            notebook,
            activity,
            trigger,
        } => handle_hint(&registry, workspace, &notebook, activity, trigger, output),
        Commands::Submit {
            notebook,
            activity,
            train,
            test,
        } => {
            let inputs = RunInputs {
                train_instances: train,
                test_instances: test,
            };
            handle_submit(&registry, workspace, &notebook, activity, inputs, output)
        }
        Commands::History { action } => handle_history(action, workspace, output),
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load_config(workspace: &Path) -> anyhow::Result<CoachConfig> {
    codecoach_core::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

/// Open a session for `activity` backed by the configured store. A store
/// that fails to open is reported and the session runs without one.
fn open_session(
    activity: Arc<dyn Activity>,
    workspace: &Path,
    config: &CoachConfig,
) -> NotebookSession {
    let store = match codecoach_core::open_store(&config.store, workspace) {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!(error = %e, "experiment store unavailable; history will not be kept");
            None
        }
    };
    NotebookSession::open(activity, &config.hints, store)
}

fn validation_output(activity: &dyn Activity, notebook: &Notebook) -> Option<ValidationOutput> {
    notebook
        .validation_cell()
        .map(|cell| activity.extract_validation_output(cell))
        .filter(|v| !v.is_empty())
}

fn format_hint(hint: &HintView) -> String {
    format!("[{}] {}", hint.index, hint.message)
}

#[derive(Serialize)]
struct ActivitySummary<'a> {
    id: ActivityId,
    title: &'a str,
    hints: usize,
}

fn handle_activities(registry: &ActivityRegistry, output: Output) -> anyhow::Result<()> {
    let activities = registry.list();
    let summaries: Vec<ActivitySummary<'_>> = activities
        .iter()
        .map(|a| ActivitySummary {
            id: a.id(),
            title: a.title(),
            hints: a.hint_catalog().len(),
        })
        .collect();
    output.print(&summaries, || {
        summaries
            .iter()
            .map(|s| format!("  {:<14} {} ({} hints)", s.id.as_str(), s.title, s.hints))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn handle_examine(
    registry: &ActivityRegistry,
    path: &Path,
    id: ActivityId,
    output: Output,
) -> anyhow::Result<()> {
    let activity = registry.require(id)?;
    let notebook = Notebook::load(path)?;
    let validation = validation_output(activity.as_ref(), &notebook);
    let examination = activity.examine(&notebook.user_code(), validation.as_ref(), 0);

    output.print(&examination, || {
        let fields = serde_json::to_value(&examination.code_info)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        let mut lines = vec![format!(
            "{} ({:?})",
            activity.title(),
            examination.load_status
        )];
        lines.extend(
            fields
                .iter()
                .filter(|(k, _)| k.as_str() != "activity")
                .map(|(k, v)| format!("  {k}: {v}")),
        );
        lines.join("\n")
    })
}

fn handle_hints(registry: &ActivityRegistry, id: ActivityId, output: Output) -> anyhow::Result<()> {
    let catalog = registry.require(id)?.hint_catalog();
    output.print(&catalog, || {
        catalog
            .iter()
            .map(|h| format!("{}\n      when: {}", format_hint(h), h.condition_description))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn handle_hint(
    registry: &ActivityRegistry,
    workspace: &Path,
    path: &Path,
    id: ActivityId,
    trigger: TriggerArg,
    output: Output,
) -> anyhow::Result<()> {
    let hint = hint_for_notebook(registry, workspace, path, id, trigger)?;
    output.print(&hint, || match &hint {
        Some(h) => format_hint(h),
        None => "No hint for this trigger right now.".to_string(),
    })
}

/// Resume a session on the notebook, including the output its validation
/// cell holds from the last run, and fire `trigger`.
fn hint_for_notebook(
    registry: &ActivityRegistry,
    workspace: &Path,
    path: &Path,
    id: ActivityId,
    trigger: TriggerArg,
) -> anyhow::Result<Option<HintView>> {
    let config = load_config(workspace)?;
    let notebook = Notebook::load(path)?;
    let activity = registry.require(id)?;
    let validation = validation_output(activity.as_ref(), &notebook);
    let mut session = open_session(activity, workspace, &config);
    session.on_code_change_with(notebook.user_code(), validation);

    Ok(match trigger {
        TriggerArg::Button => session.request_hint(),
        TriggerArg::Return => session.on_notebook_return(),
    })
}

#[derive(Serialize)]
struct SubmitResult<'a> {
    experiment: &'a Experiment,
    hint: Option<&'a HintView>,
    persisted: bool,
}

fn handle_submit(
    registry: &ActivityRegistry,
    workspace: &Path,
    path: &Path,
    id: ActivityId,
    inputs: RunInputs,
    output: Output,
) -> anyhow::Result<()> {
    let config = load_config(workspace)?;
    let notebook = Notebook::load(path)?;
    let activity = registry.require(id)?;
    let validation = validation_output(activity.as_ref(), &notebook);
    if validation.is_none() {
        tracing::info!("notebook has no validation output; post-run fields stay empty");
    }

    let mut session = open_session(activity, workspace, &config);
    session.begin_run()?;
    let report = session.complete_run(&notebook, validation.as_ref(), inputs)?;

    let result = SubmitResult {
        experiment: &report.experiment,
        hint: report.hint.as_ref(),
        persisted: report.persisted,
    };
    output.print(&result, || {
        let mut lines = vec![
            format!("Experiment {}", report.experiment.id),
            format!(
                "  score: {:.2}",
                report.experiment.evaluation_score.unwrap_or_default()
            ),
            format!("  run:   {}", session.run_count()),
        ];
        if let Some(summary) = &report.experiment.summary {
            if let Some(f1) = summary.f1 {
                lines.push(format!("  f1:    {f1:.3}"));
            }
            if let Some(clusters) = summary.cluster_count {
                lines.push(format!("  clusters: {clusters}"));
            }
        }
        if !report.persisted {
            lines.push("  (not saved)".to_string());
        }
        if let Some(hint) = &report.hint {
            lines.push(format!("Hint: {}", hint.message));
        }
        lines.join("\n")
    })
}

fn handle_history(action: HistoryAction, workspace: &Path, output: Output) -> anyhow::Result<()> {
    let config = load_config(workspace)?;
    let store = codecoach_core::open_store(&config.store, workspace)?;

    match action {
        HistoryAction::List { activity } => {
            let experiments = store.list_by_activity(activity)?;
            output.print(&experiments, || {
                if experiments.is_empty() {
                    return format!("No experiments recorded for {activity}.");
                }
                experiments
                    .iter()
                    .map(|e| {
                        format!(
                            "  {}  {}  score {:.2}",
                            e.id,
                            e.time.format("%Y-%m-%d %H:%M:%S"),
                            e.evaluation_score.unwrap_or_default()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        HistoryAction::Show { id } => {
            let experiment = store
                .get(id)?
                .ok_or_else(|| anyhow::anyhow!("No experiment with id {id}"))?;
            // Full records are only meaningful as JSON.
            println!("{}", serde_json::to_string_pretty(&experiment)?);
            Ok(())
        }
        HistoryAction::Clear { activity } => {
            let removed = store.clear_activity(activity)?;
            tracing::info!(%activity, removed, "cleared experiment history");
            output.print(&removed, || {
                format!("Removed {removed} experiment(s) for {activity}.")
            })
        }
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace.join(WORKSPACE_DIR).join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let path = save_workspace_config(workspace, &CoachConfig::default())?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(workspace)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
