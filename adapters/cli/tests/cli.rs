use std::{fs, process::Command};

fn citadel_defence() -> Command {
    Command::new(env!("CARGO_BIN_EXE_citadel-defence"))
}

#[test]
fn short_run_prints_banner_events_and_summary() {
    let output = citadel_defence()
        .args([
            "run",
            "--seed",
            "7",
            "--duration-ms",
            "300",
            "--walls",
            "1,0;0,1",
            "--log-level",
            "warn",
        ])
        .output()
        .expect("failed to launch citadel-defence");

    assert!(output.status.success(), "run failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Welcome to Citadel Defence."));
    assert!(stdout.contains("wall queued at (1,0)"));
    assert!(stdout.contains("wall queued at (0,1)"));
    assert!(stdout.contains("--- summary ---"));
}

#[test]
fn malformed_wall_layout_is_reported() {
    let output = citadel_defence()
        .args(["run", "--duration-ms", "10", "--walls", "1;2"])
        .output()
        .expect("failed to launch citadel-defence");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid --walls layout"), "stderr: {stderr}");
}

#[test]
fn config_file_overrides_defaults() {
    let dir = std::env::temp_dir().join(format!("citadel-defence-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("temp dir");
    let path = dir.join("config.toml");
    fs::write(
        &path,
        "seed = 1\n[grid]\ncolumns = 5\nrows = 5\ncitadel = { column = 2, row = 2 }\n",
    )
    .expect("config written");

    let output = citadel_defence()
        .args(["run", "--duration-ms", "100", "--walls", "4,4;5,5"])
        .arg("--config")
        .arg(&path)
        .output()
        .expect("failed to launch citadel-defence");
    let _ = fs::remove_dir_all(&dir);

    assert!(output.status.success(), "run failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("wall queued at (4,4)"));
    assert!(!stdout.contains("wall queued at (5,5)"), "outside a 5x5 grid");
}

#[test]
fn unknown_config_keys_are_rejected() {
    let dir = std::env::temp_dir().join(format!("citadel-defence-bad-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("temp dir");
    let path = dir.join("config.toml");
    fs::write(&path, "[grid]\ncolums = 5\n").expect("config written");

    let output = citadel_defence()
        .args(["run", "--duration-ms", "10"])
        .arg("--config")
        .arg(&path)
        .output()
        .expect("failed to launch citadel-defence");
    let _ = fs::remove_dir_all(&dir);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to parse config"));
}
