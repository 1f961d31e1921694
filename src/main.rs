use reel_assembler::cli::{Cli, Command};
use reel_assembler::compose::add_voice_to_video;
use reel_assembler::config::{Orientation, WorkspaceConfig};
use reel_assembler::layout::{fit_text_to_region, FitRequest};
use reel_assembler::pipeline::{
    build_all_variants, build_variant, process_tracker, render_tracker_portraits, VariantOptions,
};
use reel_assembler::probe::probe_media;
use reel_assembler::utils::{calculate_aspect_ratio, format_duration};

use anyhow::{bail, Result};
use clap::Parser;
use log::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    info!("Starting {} v{}", reel_assembler::PACKAGE_NAME, reel_assembler::VERSION);
    let config = cli.workspace_config()?;

    match cli.command {
        Command::Variant {
            language,
            orientation,
            cleanup,
            reuse_common,
        } => {
            let options = VariantOptions {
                cleanup_intermediate: cleanup,
                reuse_common,
            };
            ensure_workspace(&config)?;
            let output = build_variant(&config, language, orientation, &options).await?;
            println!("{}", output.display());
        }
        Command::All {
            cleanup,
            reuse_common,
        } => {
            let options = VariantOptions {
                cleanup_intermediate: cleanup,
                reuse_common,
            };
            ensure_workspace(&config)?;
            let outcomes = build_all_variants(&config, &options).await;

            println!("Variants:");
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(path) => println!(
                        "  {} {}: {}",
                        outcome.language.code(),
                        outcome.orientation.name(),
                        path.display()
                    ),
                    Err(e) => println!(
                        "  {} {}: FAILED ({:#})",
                        outcome.language.code(),
                        outcome.orientation.name(),
                        e
                    ),
                }
            }
            let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
            if failed > 0 {
                bail!("{} of {} variants failed", failed, outcomes.len());
            }
        }
        Command::Tracker {
            sheet,
            status,
            vertical,
        } => {
            let sheet = sheet.unwrap_or_else(|| config.tracker_sheet());
            let orientation = if vertical {
                Orientation::Vertical
            } else {
                Orientation::Horizontal
            };
            let created = process_tracker(
                &config,
                &sheet,
                status.as_deref(),
                orientation.frame_size(),
            )
            .await?;
            if created.is_empty() {
                warn!("No videos were created");
            }
            for video in &created {
                println!("{}", video.display());
            }
        }
        Command::Portraits { sheet, output_dir } => {
            let output_dir = output_dir.unwrap_or_else(|| config.portrait_output_directory());
            for image in render_tracker_portraits(&config, &sheet, &output_dir)? {
                println!("{}", image.display());
            }
        }
        Command::Fit {
            text,
            width,
            height,
            min_size,
            max_size,
            spacing,
            font,
        } => {
            let face = config.font_library().load(font.as_deref());
            let request = FitRequest::new(width, height)
                .with_font_range(min_size, max_size)
                .with_line_spacing(spacing);
            let fit = fit_text_to_region(&text, &face, &request)?;

            println!("Font: {}", face.name());
            println!("Font size: {}", fit.font_size);
            println!("Block: {}x{}", fit.width, fit.height);
            println!("Fits: {}", fit.fits);
            println!("{}", fit.wrapped_text());
        }
        Command::Probe { file } => {
            let info = probe_media(&file).await?;
            println!("Media Information:");
            println!("  File: {}", file.display());
            println!(
                "  Duration: {:.2} seconds ({})",
                info.duration,
                format_duration(info.duration)
            );
            if info.has_video {
                println!("  Dimensions: {}x{}", info.width, info.height);
                println!("  Frame Rate: {:.2} FPS", info.fps);
                println!(
                    "  Aspect Ratio: {:.2}",
                    calculate_aspect_ratio(info.width, info.height)
                );
            }
            println!("  Audio: {}", if info.has_audio { "yes" } else { "no" });
        }
        Command::Dirs { create } => {
            if create {
                config.create_directories()?;
            }
            let missing = config.validate_directories();
            for dir in config.required_directories() {
                let mark = if missing.contains(&dir) { "missing" } else { "ok" };
                println!("{:8} {}", mark, dir.display());
            }
            if !missing.is_empty() {
                bail!("{} workspace directories are missing", missing.len());
            }
        }
        Command::AddVoice {
            video,
            voice,
            output,
        } => {
            let output =
                add_voice_to_video(&video, &voice, output.as_deref(), &config.encoding).await?;
            println!("{}", output.display());
        }
    }

    Ok(())
}

/// Variant builds need the full directory layout
fn ensure_workspace(config: &WorkspaceConfig) -> Result<()> {
    let missing = config.validate_directories();
    if missing.is_empty() {
        return Ok(());
    }
    for dir in &missing {
        error!("Missing directory: {}", dir.display());
    }
    bail!(
        "{} workspace directories are missing, run `dirs --create` first",
        missing.len()
    );
}
