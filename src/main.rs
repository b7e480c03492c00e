//! stylecast CLI - apply the style of one image to another.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stylecast::gallery::DEFAULT_GALLERY_DIR;
use stylecast::image::{MAX_DIM, PNG_MIME};
use stylecast::{Config, Gallery, Pipeline};

/// Artistic style transfer with a local gallery of results.
#[derive(Parser, Debug)]
#[command(name = "stylecast")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory stylized images are saved to.
    #[arg(long, global = true, default_value = DEFAULT_GALLERY_DIR, value_name = "DIR")]
    gallery_dir: PathBuf,

    /// URL of an ONNX export of Magenta's arbitrary-image-stylization-v1-256
    /// model (required by `transfer`; downloaded once, then cached).
    #[arg(long, global = true, value_name = "URL")]
    model_url: Option<String>,

    /// Longer side of the images fed to the model.
    #[arg(long, global = true, default_value_t = MAX_DIM, value_name = "INT")]
    max_dim: u32,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stylize a content image with a style image.
    Transfer {
        /// Content image (JPEG or PNG).
        #[arg(long, value_name = "PATH")]
        content: Option<PathBuf>,

        /// Style image (JPEG or PNG).
        #[arg(long, value_name = "PATH")]
        style: Option<PathBuf>,

        /// Also write the stylized PNG here.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Write square previews of both uploads into this directory.
        #[arg(long, value_name = "DIR")]
        preview_dir: Option<PathBuf>,
    },

    /// List the stylized images saved so far.
    Gallery,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("stylecast={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("An error occurred: {err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    let config = Config {
        max_dim: args.max_dim,
        gallery_dir: args.gallery_dir.clone(),
        model_url: args.model_url.clone(),
        ..Config::default()
    };

    match &args.command {
        Command::Transfer {
            content,
            style,
            output,
            preview_dir,
        } => {
            let (Some(content), Some(style)) = (content, style) else {
                tracing::warn!("Please provide both a content image and a style image.");
                return Ok(());
            };
            transfer(
                config,
                content,
                style,
                output.as_deref(),
                preview_dir.as_deref(),
            )
        }
        Command::Gallery => list_gallery(&config.gallery_dir),
    }
}

fn transfer(
    config: Config,
    content_path: &Path,
    style_path: &Path,
    output: Option<&Path>,
    preview_dir: Option<&Path>,
) -> Result<()> {
    let content = fs::read(content_path)
        .with_context(|| format!("Failed to read {}", content_path.display()))?;
    let style = fs::read(style_path)
        .with_context(|| format!("Failed to read {}", style_path.display()))?;

    let mut pipeline = Pipeline::new(config).context("Failed to initialize pipeline")?;

    if let Some(dir) = preview_dir {
        write_previews(&pipeline, dir, &content, &style)?;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Applying style...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = pipeline.transfer(&content, &style);
    spinner.finish_and_clear();
    let stylized = result.context("Failed to stylize image")?;

    if let Some(output) = output {
        let bytes = stylized.png_bytes()?;
        fs::write(output, bytes)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("Wrote {} ({PNG_MIME})", output.display());
    }

    println!(
        "Stylized {} with {} -> {}",
        content_path.display(),
        style_path.display(),
        stylized.path.display()
    );

    Ok(())
}

fn write_previews(pipeline: &Pipeline, dir: &Path, content: &[u8], style: &[u8]) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    for (name, bytes) in [("content_preview.png", content), ("style_preview.png", style)] {
        let path = dir.join(name);
        let preview = pipeline.preview(bytes)?;
        preview
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Preview written to {}", path.display());
    }

    Ok(())
}

fn list_gallery(dir: &Path) -> Result<()> {
    let gallery = Gallery::new(dir);
    let mut entries = gallery.list_entries()?.peekable();

    if entries.peek().is_none() {
        println!("No stylized images in {} yet", dir.display());
        return Ok(());
    }

    println!("Stylized images in {}:", dir.display());
    for entry in entries {
        let entry = entry?;
        match image::load_from_memory(&entry.bytes) {
            Ok(img) => println!(
                "  {}  {}x{}  {} bytes",
                entry.name,
                img.width(),
                img.height(),
                entry.bytes.len()
            ),
            Err(_) => println!("  {}  {} bytes", entry.name, entry.bytes.len()),
        }
    }

    Ok(())
}
