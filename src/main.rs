mod cli;
mod progress;
mod source;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;

use cli::{Cli, Commands};
use rf_av::tools::{resolve_tool, tool_version};
use rf_core::{ProgressSnapshot, RenderJobConfig};
use rf_pipeline::{render_media, FfmpegSpawner};
use source::ImageDirSource;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelforge=debug,rf_pipeline=debug,rf_av=debug,rf_core=debug".to_string()
        } else {
            "reelforge=info,rf_pipeline=info,rf_av=info".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Render {
            job,
            frames,
            ffmpeg,
            no_progress,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(render(&job, &frames, ffmpeg.as_deref(), no_progress))
        }
        Commands::CheckTools { ffmpeg } => check_tools(ffmpeg.as_deref()),
        Commands::Validate { job, frames } => validate_job(&job, frames.as_deref()),
        Commands::Version => {
            println!("reelforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn render(
    job_path: &Path,
    frames_dir: &Path,
    ffmpeg_override: Option<&Path>,
    no_progress: bool,
) -> Result<()> {
    let json = tokio::fs::read_to_string(job_path).await?;
    let mut config = RenderJobConfig::from_json(&json)?;

    let source = ImageDirSource::open(frames_dir, config.image_format)?;

    if config.parallelism == 0 {
        config.parallelism = (num_cpus::get() / 2).max(1);
    }
    if config.width == 0 || config.height == 0 {
        let (start, _) = config.resolved_frame_range();
        let (w, h) = source.dimensions(start)?;
        tracing::info!("probed frame dimensions {w}x{h}");
        config.width = w;
        config.height = h;
    }

    let spawner = FfmpegSpawner::discover(ffmpeg_override)?;
    tracing::debug!("using ffmpeg at {}", spawner.program().display());

    let (tx, rx) = watch::channel(ProgressSnapshot::default());
    let bars = if no_progress {
        None
    } else {
        Some(progress::spawn_progress(rx, config.frame_count()))
    };

    let result = render_media(Arc::new(source), &spawner, &config, tx).await;
    if let Some(bars) = bars {
        let _ = bars.await;
    }
    let output = result?;

    println!("Wrote {}", output.output_path.display());
    Ok(())
}

fn check_tools(ffmpeg_override: Option<&Path>) -> Result<()> {
    match resolve_tool("ffmpeg", ffmpeg_override) {
        Ok(path) => {
            let version = tool_version(&path).unwrap_or_else(|| "unknown version".to_string());
            println!("ffmpeg: {} ({version})", path.display());
            Ok(())
        }
        Err(e) => {
            println!("ffmpeg: NOT FOUND");
            Err(e.into())
        }
    }
}

fn validate_job(job_path: &Path, frames_dir: Option<&Path>) -> Result<()> {
    let json = std::fs::read_to_string(job_path)?;
    let mut config = RenderJobConfig::from_json(&json)?;
    // The render command fills these in from the host and the frame files;
    // validate the same way so a renderable job never fails validation.
    if config.parallelism == 0 {
        config.parallelism = (num_cpus::get() / 2).max(1);
    }
    if config.width == 0 || config.height == 0 {
        let Some(frames_dir) = frames_dir else {
            anyhow::bail!(
                "job leaves width/height at 0; pass --frames to probe them from the frame images"
            );
        };
        let source = ImageDirSource::open(frames_dir, config.image_format)?;
        let (start, _) = config.resolved_frame_range();
        let (w, h) = source.dimensions(start)?;
        config.width = w;
        config.height = h;
    }
    config.validate()?;
    println!("Job config is valid");
    Ok(())
}
