use assert_cmd::cargo::cargo_bin_cmd;
use std::{error::Error, fs};
use tempfile::tempdir;

#[test]
fn missing_ppg_names_the_path() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let labels = dir.path().join("labels.csv");
    fs::write(&labels, "sleep_stage\n0\n")?;
    let missing = dir.path().join("absent_ppg.csv");
    let features = dir.path().join("features.csv");

    let mut cmd = cargo_bin_cmd!("somno");
    cmd.args([
        "extract",
        "--ppg",
        missing.to_str().expect("utf8"),
        "--labels",
        labels.to_str().expect("utf8"),
        "--features-out",
        features.to_str().expect("utf8"),
        "--labels-out",
        dir.path().join("out_labels.csv").to_str().expect("utf8"),
    ]);
    let output = cmd.assert().failure().get_output().stderr.clone();
    let stderr = String::from_utf8(output)?;
    assert!(stderr.contains("absent_ppg.csv"), "stderr: {}", stderr);
    assert!(!features.exists());
    Ok(())
}

#[test]
fn flat_signal_aborts_without_output() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let ppg = dir.path().join("ppg.csv");
    let labels = dir.path().join("labels.csv");
    fs::write(&ppg, format!("ppg\n{}", "0.5\n".repeat(6000)))?;
    fs::write(&labels, "sleep_stage\n0\n1\n")?;
    let features = dir.path().join("features.csv");
    let labels_out = dir.path().join("labels_processed.csv");

    let mut cmd = cargo_bin_cmd!("somno");
    cmd.args([
        "extract",
        "--ppg",
        ppg.to_str().expect("utf8"),
        "--labels",
        labels.to_str().expect("utf8"),
        "--features-out",
        features.to_str().expect("utf8"),
        "--labels-out",
        labels_out.to_str().expect("utf8"),
    ]);
    let output = cmd.assert().failure().get_output().stderr.clone();
    let stderr = String::from_utf8(output)?;
    assert!(stderr.contains("signal quality"), "stderr: {}", stderr);
    assert!(!features.exists());
    assert!(!labels_out.exists());
    Ok(())
}

#[test]
fn invalid_epoch_length_is_a_configuration_error() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let ppg = dir.path().join("ppg.csv");
    let labels = dir.path().join("labels.csv");
    fs::write(&ppg, "ppg\n0.1\n0.2\n")?;
    fs::write(&labels, "sleep_stage\n0\n")?;

    let mut cmd = cargo_bin_cmd!("somno");
    cmd.args([
        "extract",
        "--ppg",
        ppg.to_str().expect("utf8"),
        "--labels",
        labels.to_str().expect("utf8"),
        "--features-out",
        dir.path().join("f.csv").to_str().expect("utf8"),
        "--labels-out",
        dir.path().join("l.csv").to_str().expect("utf8"),
        "--epoch-s",
        "0",
    ]);
    let output = cmd.assert().failure().get_output().stderr.clone();
    let stderr = String::from_utf8(output)?;
    assert!(stderr.contains("epoch duration"), "stderr: {}", stderr);
    Ok(())
}

#[test]
fn run_without_data_suggests_generate() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let mut cmd = cargo_bin_cmd!("somno");
    cmd.args(["run", "--data-dir", dir.path().to_str().expect("utf8")]);
    let output = cmd.assert().failure().get_output().stderr.clone();
    let stderr = String::from_utf8(output)?;
    assert!(stderr.contains("ppg_signal.csv"));
    assert!(stderr.contains("somno generate"));
    Ok(())
}
