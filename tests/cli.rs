use assert_cmd::prelude::*;
use image::RgbImage;
use predicates::str::contains;
use std::process::Command;
use tempfile::TempDir;

fn asset_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("temp asset dir");
    RgbImage::from_pixel(4, 4, image::Rgb([200, 180, 150]))
        .save(dir.path().join("donut1.png"))
        .expect("write donut texture");
    dir
}

#[test]
fn summary_lists_scene_and_frame() {
    let assets = asset_dir();
    let mut cmd = Command::cargo_bin("still-life-viewer").expect("binary exists");
    cmd.arg("--summary-only").arg("--assets").arg(assets.path());
    cmd.assert()
        .success()
        .stdout(contains("Loaded still life with 10 objects (5 lights)"))
        .stdout(contains(" - ground [plane] 6 vertices, unit 1 (plane1.jpg)"))
        .stdout(contains(" - donut [donut] 384 vertices, unit 9 (donut1.png)"))
        .stdout(contains(
            " - light 5 pos=(1.00, 5.00, 25.00) color=(0.82, 0.79, 0.74) intensity=0.20 highlight=2",
        ))
        .stdout(contains(" - unit 9 (donut1.png): loaded 4x4 (3 channels)"))
        .stdout(contains(" - unit 1 (plane1.jpg): untextured"))
        .stdout(contains("Frame: 15 draw calls (10 objects, 5 lights, 792 vertices)"));
}

#[test]
fn unknown_argument_fails() {
    let mut cmd = Command::cargo_bin("still-life-viewer").expect("binary exists");
    cmd.arg("--fullscreen");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("Unknown argument: --fullscreen"));
}

#[test]
fn missing_assets_directory_still_renders() {
    let mut cmd = Command::cargo_bin("still-life-viewer").expect("binary exists");
    cmd.arg("--summary-only")
        .arg("--assets")
        .arg("definitely/not/a/real/dir");
    cmd.assert()
        .success()
        .stdout(contains("Frame: 15 draw calls"));
}
