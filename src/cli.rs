use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelforge")]
#[command(author, version, about = "Frame-to-video render pipeline")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a job into a video or image sequence
    Render {
        /// Path to the job config JSON
        #[arg(required = true)]
        job: PathBuf,

        /// Directory containing the source frame images
        #[arg(long, default_value = ".")]
        frames: PathBuf,

        /// Path to the ffmpeg binary (searched on PATH if omitted)
        #[arg(long)]
        ffmpeg: Option<PathBuf>,

        /// Disable the terminal progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Check that required external tools are available
    CheckTools {
        /// Path to the ffmpeg binary to check
        #[arg(long)]
        ffmpeg: Option<PathBuf>,
    },

    /// Validate a job config file
    Validate {
        /// Job config to validate
        job: PathBuf,

        /// Frame directory used to probe dimensions when the job leaves
        /// width/height at 0, as `render` does
        #[arg(long)]
        frames: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
