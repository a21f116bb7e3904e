use std::fs;
use std::path::Path;
use std::process::Command;

use torpor_core::datalog::CSV_HEADER;
use torpor_core::retained::RetainedState;
use torpor_core::time::TIME_NOT_SET;

fn simulate(dir: &Path, cycles: u32, env: &[(&str, &str)]) {
    let mut command = Command::new(env!("CARGO_BIN_EXE_torpor-simulator"));
    for name in [
        "TORPOR_NO_RTC",
        "TORPOR_OFFLINE",
        "TORPOR_SENSOR_FAIL",
        "TORPOR_SET_TIME",
        "TORPOR_COLD_BOOT",
    ] {
        command.env_remove(name);
    }
    let status = command
        .env("TORPOR_STATE_DIR", dir)
        .env("TORPOR_CYCLES", cycles.to_string())
        .env("TORPOR_IDLE_MS", "200")
        .env("TORPOR_LOG", "debug")
        .envs(env.iter().copied())
        .status()
        .unwrap();
    assert!(status.success(), "simulator exited with {status}");
}

fn datalog_rows(dir: &Path) -> Vec<String> {
    let text = fs::read_to_string(dir.join("datalog.csv")).unwrap();
    assert!(text.starts_with(CSV_HEADER));
    text.lines().skip(1).map(str::to_owned).collect()
}

fn retained(dir: &Path) -> RetainedState {
    RetainedState::from_snapshot(&fs::read(dir.join("retained.bin")).unwrap()).unwrap()
}

#[test]
fn every_cycle_logs_one_sample_and_counts_one_suspend() {
    let dir = tempfile::tempdir().unwrap();

    simulate(dir.path(), 5, &[]);

    let rows = datalog_rows(dir.path());
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|row| !row.starts_with(TIME_NOT_SET)));

    let state = retained(dir.path());
    assert_eq!(state.cycle.suspend_cycle_count(), 5);
    assert!(state.cycle.last_reading().is_valid());
    assert!(rows[4].starts_with(state.cycle.last_log_timestamp()));
}

#[test]
fn state_carries_across_invocations() {
    let dir = tempfile::tempdir().unwrap();

    simulate(dir.path(), 2, &[]);
    simulate(dir.path(), 3, &[]);

    assert_eq!(datalog_rows(dir.path()).len(), 5);
    assert_eq!(retained(dir.path()).cycle.suspend_cycle_count(), 5);
}

#[test]
fn pulling_the_battery_resets_retained_state() {
    let dir = tempfile::tempdir().unwrap();

    simulate(dir.path(), 3, &[]);
    simulate(dir.path(), 1, &[("TORPOR_COLD_BOOT", "1")]);

    assert_eq!(datalog_rows(dir.path()).len(), 4);
    assert_eq!(retained(dir.path()).cycle.suspend_cycle_count(), 1);
}

#[test]
fn without_any_time_source_rows_say_time_not_set() {
    let dir = tempfile::tempdir().unwrap();

    simulate(
        dir.path(),
        2,
        &[("TORPOR_OFFLINE", "1"), ("TORPOR_NO_RTC", "1")],
    );

    let rows = datalog_rows(dir.path());
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.starts_with(TIME_NOT_SET)));
}

#[test]
fn operator_time_stamps_later_samples() {
    let dir = tempfile::tempdir().unwrap();

    simulate(
        dir.path(),
        2,
        &[
            ("TORPOR_OFFLINE", "1"),
            ("TORPOR_NO_RTC", "1"),
            ("TORPOR_SET_TIME", "2030-01-02 03:04"),
        ],
    );

    let rows = datalog_rows(dir.path());
    assert_eq!(rows.len(), 2);
    // The first sample is taken before the window opens
    assert!(rows[0].starts_with(TIME_NOT_SET));
    assert!(rows[1].starts_with("2030-01-02 03:0"));
}

#[test]
fn failed_sensor_still_completes_cycles() {
    let dir = tempfile::tempdir().unwrap();

    simulate(dir.path(), 3, &[("TORPOR_SENSOR_FAIL", "1")]);

    assert!(datalog_rows(dir.path()).is_empty());
    let state = retained(dir.path());
    assert_eq!(state.cycle.suspend_cycle_count(), 3);
    assert!(!state.cycle.last_reading().is_valid());
}

#[test]
fn retained_log_keeps_the_latest_cycle() {
    let dir = tempfile::tempdir().unwrap();

    simulate(dir.path(), 3, &[]);

    let state = retained(dir.path());
    let mut lines = Vec::new();
    state
        .diagnostics
        .replay()
        .for_each_line(|line| lines.push(String::from_utf8_lossy(line).into_owned()));
    assert!(!lines.is_empty());
    assert!(lines.iter().any(|line| line.starts_with("[#2 ")));
}

#[test]
fn retained_log_spans_several_cycles_at_debug_level() {
    let dir = tempfile::tempdir().unwrap();

    simulate(dir.path(), 3, &[]);

    let state = retained(dir.path());
    assert!(!state.diagnostics.is_wrapped());
    let mut lines = Vec::new();
    state
        .diagnostics
        .replay()
        .for_each_line(|line| lines.push(String::from_utf8_lossy(line).into_owned()));
    for cycle in ["[#0 ", "[#1 ", "[#2 "] {
        assert!(lines.iter().any(|line| line.starts_with(cycle)));
    }
    assert!(lines.iter().all(|line| !line.contains("[DEBUG]")));
}

#[test]
fn operator_sees_last_sample_and_downloads_the_log() {
    let dir = tempfile::tempdir().unwrap();

    simulate(dir.path(), 1, &[]);

    let state = retained(dir.path());
    let home = fs::read_to_string(dir.path().join("operator.html")).unwrap();
    assert!(home.contains(&format!(
        "Measured at: {}",
        state.cycle.last_log_timestamp()
    )));
    assert_eq!(
        fs::read(dir.path().join("download.csv")).unwrap(),
        fs::read(dir.path().join("datalog.csv")).unwrap()
    );
}
