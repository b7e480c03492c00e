use std::path::Path;
use std::process::{Command, Output};

use image::{Rgb, RgbImage};
use tempfile::tempdir;

fn run_cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stylecast"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap()
}

fn combined(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

fn write_png(path: &Path) {
    RgbImage::from_pixel(16, 8, Rgb([30, 60, 90]))
        .save(path)
        .unwrap();
}

#[test]
fn transfer_without_style_warns_and_writes_nothing() {
    let dir = tempdir().unwrap();
    let content = dir.path().join("content.png");
    write_png(&content);

    let output = run_cli(
        dir.path(),
        &["transfer", "--content", content.to_str().unwrap()],
    );

    assert!(output.status.success());
    assert!(combined(&output).contains("Please provide both a content image and a style image"));
    assert!(!dir.path().join("stylized_images").exists());
}

#[test]
fn transfer_without_model_url_fails_with_a_message() {
    let dir = tempdir().unwrap();
    let content = dir.path().join("content.png");
    let style = dir.path().join("style.png");
    write_png(&content);
    write_png(&style);

    let output = run_cli(
        dir.path(),
        &[
            "transfer",
            "--content",
            content.to_str().unwrap(),
            "--style",
            style.to_str().unwrap(),
        ],
    );

    assert!(!output.status.success());
    let text = combined(&output);
    assert!(text.contains("An error occurred"));
    assert!(text.contains("--model-url"));
    assert!(!dir.path().join("stylized_images").exists());
}

#[test]
fn gallery_lists_saved_images_in_order() {
    let dir = tempdir().unwrap();
    let gallery = dir.path().join("stylized_images");
    std::fs::create_dir(&gallery).unwrap();

    let output = run_cli(dir.path(), &["gallery"]);
    assert!(output.status.success());
    assert!(combined(&output).contains("No stylized images"));

    write_png(&gallery.join("stylized_image_10.png"));
    write_png(&gallery.join("stylized_image_2.png"));

    let output = run_cli(dir.path(), &["gallery"]);
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    let second = text.find("stylized_image_2.png").unwrap();
    let tenth = text.find("stylized_image_10.png").unwrap();
    assert!(second < tenth);
    assert!(text.contains("16x8"));
}
