use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn convert_respects_limits_from_config() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.md");
    fs::write(&input, "One.\n\nTwo.\n\nThree.\n").unwrap();

    let config_path = dir.path().join("folio.toml");
    fs::write(
        &config_path,
        r#"[convert]
max_blocks = 2
default_section_title = "Preamble"
"#,
    )
    .unwrap();

    let output = cargo_bin_cmd!("folio")
        .arg("convert")
        .arg(&input)
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let tree: serde_json::Value = serde_json::from_slice(&output).unwrap();

    assert_eq!(tree["sections"][0]["title"], "Preamble");
    assert_eq!(tree["sections"][0]["blocks"].as_array().unwrap().len(), 2);
    assert_eq!(tree["statistics"]["truncated"], true);
}

#[test]
fn local_config_file_is_picked_up() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("notes.md"), "Alone.\n").unwrap();
    fs::write(
        dir.path().join("folio.toml"),
        "[convert]\ndefault_section_title = \"Front matter\"\n",
    )
    .unwrap();

    cargo_bin_cmd!("folio")
        .current_dir(dir.path())
        .arg("inspect")
        .arg("notes.md")
        .assert()
        .success()
        .stdout(predicate::str::contains("Front matter (1 block)"));
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.md");
    fs::write(&input, "Text.\n").unwrap();

    cargo_bin_cmd!("folio")
        .arg("convert")
        .arg(&input)
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to load configuration"));
}
