mod common;

use chrono::Local;
use common::*;
use haplo_core::Stimulus;
use haplo_experiment::{ExperimentConfig, ParticipantInfo, SessionDriver, SessionOutcome};
use haplo_input::{InputDevices, KeyboardDevice, ResponseKeypad, SerialKeypad};
use haplo_render::StereoDisplays;
use haplo_timing::SimulatedTimer;
use serde_json::json;

fn stimuli(n: usize) -> Vec<Stimulus> {
    (1..=n)
        .map(|i| stimulus(&format!("cyl_{i:02}"), json!({ "curvature_mm": i })))
        .collect()
}

/// Runs a session on `timer`, the clock the scripted devices were built on.
fn run_session(
    config: &ExperimentConfig,
    stimuli: &[Stimulus],
    timer: &mut SimulatedTimer,
    keyboard: &mut ScriptedKeyboard,
    keypad: Option<&mut SerialKeypad<ScriptedLine>>,
) -> (SessionOutcome, DisplayLog) {
    let (left, right, log) = MockDisplay::pair(timer);
    let mut displays = StereoDisplays::new(left, right);
    let driver = SessionDriver::new(config).unwrap();
    let mut devices = InputDevices::new(
        Some(keyboard as &mut dyn KeyboardDevice),
        keypad.map(|k| k as &mut dyn ResponseKeypad),
        config.keyboard_responses,
    )
    .unwrap();
    let outcome = driver
        .run(stimuli, &mut displays, &mut devices, timer)
        .unwrap();
    (outcome, log)
}

#[test]
fn every_trial_is_recorded_in_order() {
    let mut config = config();
    config.session.show_instructions = true;
    let mut timer = SimulatedTimer::new();
    let mut keyboard = ScriptedKeyboard::new(&timer, &[]).always(&["2", "space"]);

    let (outcome, log) = run_session(&config, &stimuli(3), &mut timer, &mut keyboard, None);
    assert!(!outcome.is_aborted());
    let records = outcome.records();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records.iter().map(|r| r.trial_index).collect::<Vec<_>>(),
        [1, 2, 3]
    );
    assert!(records.iter().all(|r| r.response_label == "stretched"));
    assert_eq!(records[1].stimulus_metadata, r#"{"curvature_mm":2}"#);

    let texts = texts(&log);
    assert!(texts[0].contains("1 = squashed"));

    let closes: Vec<_> = log
        .borrow()
        .iter()
        .filter(|l| l.command == Command::Close)
        .map(|l| l.eye)
        .collect();
    assert_eq!(closes, ["L", "R"]);
}

#[test]
fn rest_break_appears_between_blocks_only() {
    let mut config = config();
    config.session.rest_break_every = 2;
    let mut timer = SimulatedTimer::new();
    let mut keyboard = ScriptedKeyboard::new(&timer, &[]).always(&["1", "space"]);

    let (outcome, log) = run_session(&config, &stimuli(4), &mut timer, &mut keyboard, None);
    assert_eq!(outcome.records().len(), 4);
    let breaks: Vec<_> = eye_texts(&log, "L")
        .into_iter()
        .filter(|t| t.starts_with("Take a short break"))
        .collect();
    assert_eq!(breaks.len(), 1);
    assert!(breaks[0].contains("2 of 4 trials done"));
}

#[test]
fn abort_keeps_completed_trials_and_tears_down() {
    let config = config();
    let mut timer = SimulatedTimer::new();
    // Trials answer instantly: trial 3's fixation runs from 1.5 s to 2.25 s.
    let mut keyboard = ScriptedKeyboard::new(&timer, &[(2.0, "escape")]).always(&["1"]);
    let mut keypad = scripted_keypad(&timer, &[]);

    let (outcome, log) = run_session(
        &config,
        &stimuli(5),
        &mut timer,
        &mut keyboard,
        Some(&mut keypad),
    );
    match &outcome {
        SessionOutcome::Aborted { completed, signal } => {
            assert_eq!(completed.len(), 2);
            assert_eq!(signal.key, "escape");
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert!(log.borrow().iter().any(|l| l.command == Command::Close));
    assert!(keypad.poll(&["1"]).is_none());
}

#[test]
fn quit_on_the_instructions_screen_runs_no_trials() {
    let mut config = config();
    config.session.show_instructions = true;
    let mut timer = SimulatedTimer::new();
    let mut keyboard = ScriptedKeyboard::new(&timer, &[(0.05, "escape")]).always(&["1"]);

    let (outcome, log) = run_session(&config, &stimuli(2), &mut timer, &mut keyboard, None);
    assert!(outcome.is_aborted());
    assert!(outcome.records().is_empty());
    assert!(log
        .borrow()
        .iter()
        .all(|l| !matches!(l.command, Command::Image(_))));
}

#[test]
fn aborted_session_is_not_saved_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.results_directory = dir.path().join("data");
    let mut timer = SimulatedTimer::new();
    let mut keyboard = ScriptedKeyboard::new(&timer, &[(2.0, "escape")]).always(&["1"]);

    let (outcome, _) = run_session(&config, &stimuli(3), &mut timer, &mut keyboard, None);
    let driver = SessionDriver::new(&config).unwrap();
    let saved = driver
        .finish(&outcome, &ParticipantInfo::default(), Local::now())
        .unwrap();
    assert!(saved.is_none());
    assert!(!config.results_directory.exists());
}

#[test]
fn save_on_abort_persists_completed_trials() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.results_directory = dir.path().to_path_buf();
    config.session.save_on_abort = true;
    let mut timer = SimulatedTimer::new();
    let mut keyboard = ScriptedKeyboard::new(&timer, &[(2.0, "escape")]).always(&["1"]);

    let (outcome, _) = run_session(&config, &stimuli(3), &mut timer, &mut keyboard, None);
    let driver = SessionDriver::new(&config).unwrap();
    let participant = ParticipantInfo {
        participant: "p01".into(),
        session: "1".into(),
    };
    let csv_path = driver
        .finish(&outcome, &participant, Local::now())
        .unwrap()
        .unwrap();

    assert!(csv_path.ends_with("johnston_stereopsis_p01_1.csv"));
    let rows = csv::Reader::from_path(&csv_path).unwrap().records().count();
    assert_eq!(rows, 2);

    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(csv_path.with_extension("json")).unwrap())
            .unwrap();
    assert_eq!(meta["aborted"], true);
    assert_eq!(meta["abort_key"], "escape");
    assert_eq!(meta["trial_count"], 2);
}

#[test]
fn completed_session_is_saved() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.results_directory = dir.path().to_path_buf();
    let mut timer = SimulatedTimer::new();
    let mut keyboard = ScriptedKeyboard::new(&timer, &[]).always(&["2"]);

    let (outcome, _) = run_session(&config, &stimuli(2), &mut timer, &mut keyboard, None);
    let driver = SessionDriver::new(&config).unwrap();
    let path = driver
        .finish(&outcome, &ParticipantInfo::default(), Local::now())
        .unwrap()
        .unwrap();
    let text = std::fs::read_to_string(path).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.lines().nth(1).unwrap().starts_with("unknown,1,cyl_01"));
}

#[test]
fn seeded_shuffle_is_reproducible() {
    let mut config = config();
    config.session.shuffle = true;
    config.session.seed = Some(42);
    let driver = SessionDriver::new(&config).unwrap();

    let ids = |v: Vec<Stimulus>| v.into_iter().map(|s| s.id).collect::<Vec<_>>();
    let a = ids(driver.order_stimuli(stimuli(10)));
    let b = ids(driver.order_stimuli(stimuli(10)));
    assert_eq!(a, b);

    let mut sorted = a.clone();
    sorted.sort();
    assert_eq!(sorted, ids(stimuli(10)));
}

#[test]
fn unshuffled_order_is_load_order() {
    let driver_config = config();
    let driver = SessionDriver::new(&driver_config).unwrap();
    let ids: Vec<_> = driver
        .order_stimuli(stimuli(3))
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, ["cyl_01", "cyl_02", "cyl_03"]);
}
