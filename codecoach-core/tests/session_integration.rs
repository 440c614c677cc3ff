//! Integration tests for notebook sessions.
//!
//! These drive [`NotebookSession`] the way the notebook view does: edits,
//! hint requests, runs and returns to the notebook, across all activities
//! and store backends.

use codecoach_core::store::{JsonExperimentStore, SqliteExperimentStore};
use codecoach_core::{
    ActivityId, ActivityRegistry, HintConfig, Notebook, NotebookCell, NotebookSession,
    RunInputs, SourceLines, ValidationOutput,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

fn hints(auto_dismiss_ms: Option<u64>) -> HintConfig {
    HintConfig {
        auto_dismiss_ms,
        show_on_run_complete: true,
    }
}

/// Helper to open a session with no store and no timers.
fn open(activity: ActivityId) -> NotebookSession {
    let registry = ActivityRegistry::with_defaults();
    NotebookSession::open(registry.require(activity).unwrap(), &hints(None), None)
}

fn notebook(code: &str) -> Notebook {
    Notebook::new(vec![
        NotebookCell::code("import numpy as np").locked(),
        NotebookCell::code(code),
        NotebookCell::code("validate()").with_tag("validation"),
    ])
}

fn run(session: &mut NotebookSession, code: &str) -> codecoach_core::RunReport {
    session.begin_run().unwrap();
    session
        .complete_run(&notebook(code), None, RunInputs::default())
        .unwrap()
}

#[test]
fn test_cafe_hint_sequence() {
    let mut session = open(ActivityId::Cafe);
    let mut code = String::from("model = DummyClassifier()\n");

    let mut seen = Vec::new();
    for addition in [
        "model = LogisticRegression()\n",
        "stemmer = PorterStemmer()\n",
        "stop = stopwords.words('english')\n",
    ] {
        session.on_code_change(SourceLines::from_code(&code));
        seen.push(session.selection().active.unwrap().index);
        code.push_str(addition);
    }
    session.on_code_change(SourceLines::from_code(&code));
    let selection = session.selection();
    seen.push(selection.active.as_ref().unwrap().index);

    assert_eq!(seen, vec![0, 1, 2, 3]);
    assert_eq!(
        selection
            .satisfied_prefix
            .iter()
            .map(|h| h.index)
            .collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        selection.active.unwrap().message,
        "Your model is working well! Ready to submit your results?"
    );
}

#[test]
fn test_planes_experiment_ends_with_best_fit() {
    let mut session = open(ActivityId::Planes);

    let report = run(&mut session, "m = build(model_size='LARGE')\nm.fit(x, y, epochs=60)");
    assert!(report.hint.unwrap().message.contains("SMALL"));

    // The MEDIUM hint is button-only, so run completion shows nothing.
    let report = run(&mut session, "m = build(model_size='SMALL')\nm.fit(x, y, epochs=60)");
    assert!(report.hint.is_none());
    assert!(session.request_hint().unwrap().message.contains("MEDIUM"));

    let report = run(&mut session, "m = build(model_size='MEDIUM')\nm.fit(x, y, epochs=60)");
    assert_eq!(
        report.hint.unwrap().message,
        "This model seems the best fit for the data. Great work! Submit your results."
    );
    assert_eq!(session.run_count(), 3);
}

#[test]
fn test_wine_full_solution_persists_across_sessions() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("experiments.db");
    let registry = ActivityRegistry::with_defaults();
    let wine = registry.require(ActivityId::Wine).unwrap();

    let code = "wine = wine.drop('Wine', axis=1)\n\
                quality = wine['quality']\n\
                wine = wine.drop(columns=['quality'])\n\
                scaler = StandardScaler()\n\
                scaled = pd.DataFrame(scaler.fit_transform(wine))\n\
                km = KMeans(n_clusters=5)";
    let validation = ValidationOutput::from_text("clusters: 5");

    let experiment_id = {
        let store = SqliteExperimentStore::open(&db).unwrap();
        let mut session = NotebookSession::open(wine.clone(), &hints(None), Some(Box::new(store)));
        session.begin_run().unwrap();
        let report = session
            .complete_run(&notebook(code), Some(&validation), RunInputs::default())
            .unwrap();
        assert!(report.persisted);
        assert_eq!(report.experiment.evaluation_score, Some(1.0));
        assert_eq!(
            report.experiment.summary.as_ref().and_then(|s| s.cluster_count),
            Some(5)
        );
        report.experiment.id
    };

    let store = SqliteExperimentStore::open(&db).unwrap();
    let session = NotebookSession::open(wine, &hints(None), Some(Box::new(store)));
    assert_eq!(session.run_count(), 1);
    assert_eq!(session.history()[0].id, experiment_id);
    assert_eq!(session.history()[0].evaluation_score, Some(1.0));
}

#[test]
fn test_fruit_runs_with_json_store_and_simulations() {
    let dir = TempDir::new().unwrap();
    let registry = ActivityRegistry::with_defaults();
    let store = JsonExperimentStore::open(dir.path()).unwrap();
    let mut session = NotebookSession::open(
        registry.require(ActivityId::FruitPicker).unwrap(),
        &hints(None),
        Some(Box::new(store)),
    );

    let code = "X = fruit.drop('label', axis=1)\n\
                X_train, X_test, y_train, y_test = train_test_split(X, y)\n\
                model = KNeighborsClassifier(n_neighbors=5)\n\
                scaler = StandardScaler()";
    let validation = ValidationOutput::default().with_json(json!([
        {"predictions": ["ripe", "ripe", "rotten"], "labels": ["ripe", "rotten", "rotten"]},
        {"predictions": ["rotten"], "labels": ["ripe"]},
    ]));

    session.begin_run().unwrap();
    let report = session
        .complete_run(
            &notebook(code),
            Some(&validation),
            RunInputs {
                train_instances: 120,
                test_instances: 30,
            },
        )
        .unwrap();

    let summary = report.experiment.summary.clone().unwrap();
    assert_eq!(summary.plays, 2);
    assert_eq!(summary.f1, Some(0.5));
    // 0.6 for the pipeline, nothing for an F1 of 0.5.
    assert_eq!(report.experiment.evaluation_score, Some(0.6));
    assert!(report.hint.unwrap().message.contains("n_neighbors"));
    assert!(dir.path().join("fruit_picker.json").exists());
}

const NMT_CODE: &str = "tok = Tokenizer()\n\
                        tok.fit_on_texts(df['en'])\n\
                        a = tok.texts_to_sequences(df['en'])\n\
                        b = tok.texts_to_sequences(df['fr'])\n\
                        a = pad_sequences(a, padding='post')\n\
                        b = pad_sequences(b, padding='post')\n\
                        b = b.reshape(*b.shape, 1)";

const NMT_KEY_ERROR: usize = 3;
const NMT_WRONG_SHAPE: usize = 4;
const NMT_DONE: usize = 5;

fn active(session: &NotebookSession) -> usize {
    session.selection().active.unwrap().index
}

#[test]
fn test_nmt_key_error_then_fixed() {
    let mut session = open(ActivityId::Nmt);

    session.begin_run().unwrap();
    let failing = ValidationOutput::from_text("KeyError: 'en'");
    let report = session
        .complete_run(&notebook(NMT_CODE), Some(&failing), RunInputs::default())
        .unwrap();
    assert!(report.hint.unwrap().message.contains("KeyError"));
    assert_eq!(report.experiment.evaluation_score, Some(0.8));

    // The KeyError belongs to the last run, so an edit does not clear it.
    let withdrawn = session.on_code_change(SourceLines::from_code(NMT_CODE));
    assert!(withdrawn.is_empty());
    assert_eq!(active(&session), NMT_KEY_ERROR);

    // A clean run withdraws it.
    session.begin_run().unwrap();
    let ok = ValidationOutput::from_text("(137861, 21, 1)");
    let report = session
        .complete_run(&notebook(NMT_CODE), Some(&ok), RunInputs::default())
        .unwrap();
    assert_eq!(report.experiment.evaluation_score, Some(1.0));
    assert_eq!(
        report.experiment.summary.as_ref().and_then(|s| s.output_shape_ok),
        Some(true)
    );
    assert!(
        session
            .displayed_hints()
            .iter()
            .all(|d| d.view.index != NMT_KEY_ERROR)
    );
    assert_eq!(active(&session), NMT_DONE);

    session.on_code_change(SourceLines::from_code(NMT_CODE));
    assert_eq!(active(&session), NMT_DONE);
}

#[test]
fn test_nmt_edit_after_clean_run_keeps_selection() {
    let mut session = open(ActivityId::Nmt);
    session.begin_run().unwrap();
    let ok = ValidationOutput::from_text("(137861, 21, 1)");
    let report = session
        .complete_run(&notebook(NMT_CODE), Some(&ok), RunInputs::default())
        .unwrap();
    assert_eq!(report.experiment.evaluation_score, Some(1.0));
    assert_eq!(active(&session), NMT_DONE);

    session.on_code_change(SourceLines::from_code(NMT_CODE));
    assert_eq!(active(&session), NMT_DONE);

    // Whitespace-only edits change nothing either.
    session.on_code_change(SourceLines::from_code(&format!("{NMT_CODE}\n\n   \n")));
    assert_eq!(active(&session), NMT_DONE);
    assert!(session.code_info().as_nmt().unwrap().output_shape_ok);
}

#[test]
fn test_nmt_wrong_shape_survives_edits_until_next_run() {
    let mut session = open(ActivityId::Nmt);
    session.begin_run().unwrap();
    let wrong = ValidationOutput::from_text("(137861, 21)");
    session
        .complete_run(&notebook(NMT_CODE), Some(&wrong), RunInputs::default())
        .unwrap();
    assert_eq!(active(&session), NMT_WRONG_SHAPE);

    session.on_code_change(SourceLines::from_code(NMT_CODE));
    assert_eq!(active(&session), NMT_WRONG_SHAPE);
}

#[test]
fn test_resumed_nmt_session_reads_validation_cell() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("experiments.db");
    let registry = ActivityRegistry::with_defaults();
    let nmt = registry.require(ActivityId::Nmt).unwrap();
    let ok = ValidationOutput::from_text("(137861, 21, 1)");

    {
        let store = SqliteExperimentStore::open(&db).unwrap();
        let mut session = NotebookSession::open(nmt.clone(), &hints(None), Some(Box::new(store)));
        session.begin_run().unwrap();
        session
            .complete_run(&notebook(NMT_CODE), Some(&ok), RunInputs::default())
            .unwrap();
    }

    let store = SqliteExperimentStore::open(&db).unwrap();
    let mut session = NotebookSession::open(nmt, &hints(None), Some(Box::new(store)));
    assert_eq!(session.run_count(), 1);
    session.on_code_change_with(SourceLines::from_code(NMT_CODE), Some(ok));
    assert_eq!(active(&session), NMT_DONE);
    assert_eq!(
        session.request_hint().unwrap().message,
        "Your data is ready for translation! Submit your results?"
    );
}

#[tokio::test(start_paused = true)]
async fn test_displayed_hint_auto_dismisses() {
    let registry = ActivityRegistry::with_defaults();
    let mut session = NotebookSession::open(
        registry.require(ActivityId::Cafe).unwrap(),
        &hints(Some(1_000)),
        None,
    );

    assert!(session.request_hint().is_some());
    assert_eq!(session.displayed_hints().len(), 1);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(session.displayed_hints().is_empty());

    // The same hint may be shown again once it is gone.
    assert!(session.request_hint().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_leaving_notebook_cancels_timers() {
    let registry = ActivityRegistry::with_defaults();
    let mut session = NotebookSession::open(
        registry.require(ActivityId::Cafe).unwrap(),
        &hints(Some(1_000)),
        None,
    );

    session.request_hint().unwrap();
    session.leave_notebook();
    assert!(session.displayed_hints().is_empty());

    // A hint shown after returning keeps its own timer.
    let shown = session.on_notebook_return().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(session.displayed_hints().iter().any(|d| d.view == shown));
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(session.displayed_hints().is_empty());
}

#[test]
fn test_notebook_file_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wine.ipynb");
    let document = json!({
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {},
        "cells": [
            {"cell_type": "code", "metadata": {}, "outputs": [],
             "source": ["wine = wine.drop('Wine', axis=1)\n", "# TODO scale\n"]},
            {"cell_type": "code", "metadata": {"tags": ["validation"]},
             "source": "show_clusters()",
             "outputs": [{"output_type": "stream", "name": "stdout", "text": "clusters = 6\n"}]}
        ]
    });
    std::fs::write(&path, document.to_string()).unwrap();

    let nb = Notebook::load(&path).unwrap();
    let registry = ActivityRegistry::with_defaults();
    let wine = registry.require(ActivityId::Wine).unwrap();
    let validation = wine.extract_validation_output(nb.validation_cell().unwrap());
    let examination = wine.examine(&nb.user_code(), Some(&validation), 1);
    let info = examination.code_info.as_wine().unwrap();
    assert!(info.drops_wine_column);
    assert!(info.drop_wine_uses_axis_1);
    assert_eq!(info.cluster_count, Some(6));
    assert_eq!(nb.user_code().len(), 1);
}
