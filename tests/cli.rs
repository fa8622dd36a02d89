use assert_cmd::Command;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use tempfile::TempDir;

fn fastconvert(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fastconvert").unwrap();
    cmd.current_dir(dir.path()).env_remove("FASTCONVERT_CONFIG");
    cmd
}

fn write_image(dir: &std::path::Path, name: &str) {
    RgbImage::from_pixel(20, 10, Rgb([200, 40, 40]))
        .save(dir.join(name))
        .unwrap();
}

#[test]
fn test_config_init_writes_defaults() {
    let dir = TempDir::new().unwrap();

    fastconvert(&dir)
        .args(["config", "init", "--output", "settings.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default settings"));

    let written = std::fs::read_to_string(dir.path().join("settings.yaml")).unwrap();
    assert!(written.contains("quality: 80"));

    // Refuses to clobber without --force
    fastconvert(&dir)
        .args(["config", "init", "--output", "settings.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_show_reads_settings_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("custom.toml"), "workers = 6\nquality = 55\n").unwrap();

    fastconvert(&dir)
        .args(["--config", "custom.toml", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("quality = 55"))
        .stdout(predicate::str::contains("workers = 6"));
}

#[test]
fn test_convert_json_report() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    std::fs::create_dir(&input).unwrap();
    write_image(&input, "a.png");
    write_image(&input, "b.png");

    fastconvert(&dir)
        .args(["convert", "--from", "png", "--to", "jpg", "--json"])
        .args(["--source", "in", "--target", "out", "--workers", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"converted\": 2"));

    assert!(dir.path().join("out/a.jpg").exists());
    assert!(dir.path().join("out/b.jpg").exists());
}

#[test]
fn test_compress_skips_files_already_in_target() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    std::fs::create_dir(&input).unwrap();
    write_image(&input, "photo.png");

    fastconvert(&dir)
        .args(["compress", "--to", "png", "--json"])
        .args(["--source", "in", "--target", "out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"skipped\": 1"));
}

#[test]
fn test_zero_workers_fails() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    std::fs::create_dir(&input).unwrap();
    write_image(&input, "a.png");

    fastconvert(&dir)
        .args(["convert", "--to", "jpg", "--workers", "0"])
        .args(["--source", "in", "--target", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers"));
}

#[test]
fn test_empty_source_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("in")).unwrap();

    fastconvert(&dir)
        .args(["convert", "--to", "jpg", "--source", "in", "--target", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No matching files"));
}

#[test]
fn test_unknown_target_tag_rejected() {
    let dir = TempDir::new().unwrap();

    fastconvert(&dir)
        .args(["convert", "--to", "xcf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown format tag"));
}
