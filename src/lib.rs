//! Reel Assembler - builds short-form videos from clips, narration, music and
//! spreadsheet-driven captions
//!
//! The two pieces with real logic are the text fit-to-region solver in
//! [`layout`] and the duration reconciliation in [`timing`]. The rest turns
//! folder conventions and spreadsheet rows into ffmpeg invocations.

pub mod cli;
pub mod compose;
pub mod config;
pub mod encoder;
pub mod font;
pub mod layout;
pub mod overlay;
pub mod pipeline;
pub mod prelude;
pub mod probe;
pub mod sheet;
pub mod timing;

use std::path::PathBuf;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const PACKAGE_NAME: &str = env!("CARGO_PKG_NAME");

/// Package description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Error types used throughout the library
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("Layout error: {0}")]
    Layout(#[from] layout::LayoutError),

    #[error("Timing error: {0}")]
    Timing(#[from] timing::TimingError),

    #[error("Invalid text overlay: {0}")]
    InvalidOverlay(String),

    #[error("Input file does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Spreadsheet error: {0}")]
    Sheet(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Required tool not found on PATH: {0}")]
    ToolNotFound(String),

    #[error("Font error: {0}")]
    Font(String),

    #[error("{program} exited with {status}: {stderr}")]
    Encoder {
        program: String,
        status: String,
        stderr: String,
    },

    #[cfg(feature = "native-probe")]
    #[error("Video decoding error: {0}")]
    VideoDecoding(#[from] ffmpeg_next::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, ReelError>;

/// Utility functions
pub mod utils {
    /// Format duration in a human-readable way
    pub fn format_duration(seconds: f64) -> String {
        let total_seconds = seconds.max(0.0) as u64;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{}:{:02}", minutes, secs)
        }
    }

    /// Calculate aspect ratio from dimensions
    pub fn calculate_aspect_ratio(width: u32, height: u32) -> f64 {
        if height == 0 {
            return 0.0;
        }
        width as f64 / height as f64
    }
}
