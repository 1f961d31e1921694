use crate::config::{Language, Orientation, WorkspaceConfig};
use crate::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON workspace configuration (defaults are used when omitted)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the base directory of the workspace
    #[arg(long, global = true, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build one language/orientation video: intro, main narration and tail
    Variant {
        #[arg(short, long)]
        language: Language,

        #[arg(short, long)]
        orientation: Orientation,

        /// Remove intermediate audio/video files after a successful build
        #[arg(long)]
        cleanup: bool,

        /// Reuse intro/tail files from an earlier run instead of rebuilding them
        #[arg(long)]
        reuse_common: bool,
    },

    /// Build every language/orientation video
    All {
        #[arg(long)]
        cleanup: bool,

        #[arg(long)]
        reuse_common: bool,
    },

    /// Turn tracker rows into still-image videos with narration
    Tracker {
        /// Tracker sheet (.xlsx or .csv); defaults to the configured tracker
        sheet: Option<PathBuf>,

        /// Only process rows with this status
        #[arg(long)]
        status: Option<String>,

        /// Render 1080x1920 instead of 1920x1080
        #[arg(long)]
        vertical: bool,
    },

    /// Draw tracker overlays onto their portraits and save the images
    Portraits {
        sheet: PathBuf,

        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Find the largest font size at which text fits a box
    Fit {
        #[arg(short, long)]
        text: String,

        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        #[arg(long, default_value_t = 20)]
        min_size: u32,

        #[arg(long, default_value_t = 100)]
        max_size: u32,

        /// Line spacing ratio, must be greater than 1.0
        #[arg(long, default_value_t = 1.2)]
        spacing: f64,

        /// Font file or name; the fallback chain applies when it cannot be loaded
        #[arg(long)]
        font: Option<String>,
    },

    /// Show duration, frame size and streams of a media file
    Probe { file: PathBuf },

    /// Check (or create) the workspace directory layout
    Dirs {
        #[arg(long)]
        create: bool,
    },

    /// Centre a narration track inside a video
    AddVoice {
        #[arg(long)]
        video: PathBuf,

        #[arg(long)]
        voice: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn require_file(path: &Path, what: &str) -> std::result::Result<(), String> {
    if !path.exists() {
        return Err(format!("{} does not exist: {}", what, path.display()));
    }
    Ok(())
}

impl Cli {
    /// Validate command line arguments
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(config) = &self.config {
            require_file(config, "Config file")?;
        }

        match &self.command {
            Command::Tracker {
                sheet: Some(sheet), ..
            } => require_file(sheet, "Tracker sheet")?,
            Command::Portraits { sheet, .. } => require_file(sheet, "Tracker sheet")?,
            Command::Probe { file } => require_file(file, "Media file")?,
            Command::AddVoice { video, voice, .. } => {
                require_file(video, "Video file")?;
                require_file(voice, "Voice file")?;
            }
            Command::Fit {
                text,
                width,
                height,
                min_size,
                max_size,
                spacing,
                ..
            } => {
                if text.trim().is_empty() {
                    return Err("Text must not be empty".to_string());
                }
                if *width == 0 || *height == 0 {
                    return Err("Box width and height must be greater than 0".to_string());
                }
                if *min_size == 0 || min_size > max_size {
                    return Err(format!(
                        "Font range {}..{} is invalid",
                        min_size, max_size
                    ));
                }
                if !(spacing.is_finite() && *spacing > 1.0) {
                    return Err("Line spacing must be greater than 1.0".to_string());
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// The workspace configuration this invocation runs against
    pub fn workspace_config(&self) -> Result<WorkspaceConfig> {
        let mut config = match &self.config {
            Some(path) => WorkspaceConfig::load(path)?,
            None => WorkspaceConfig::default(),
        };
        if let Some(base) = &self.base_dir {
            config.base_directory = base.clone();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("reel-assembler").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_variant() {
        let cli = parse(&["variant", "--language", "ru", "--orientation", "vertical", "--cleanup"]);
        match cli.command {
            Command::Variant {
                language,
                orientation,
                cleanup,
                reuse_common,
            } => {
                assert_eq!(language, Language::Ru);
                assert_eq!(orientation, Orientation::Vertical);
                assert!(cleanup);
                assert!(!reuse_common);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_validate_fit_arguments() {
        let ok = parse(&["fit", "--text", "Find Cheap Flights", "--width", "600", "--height", "200"]);
        assert!(ok.validate().is_ok());

        let zero = parse(&["fit", "--text", "x", "--width", "0", "--height", "200"]);
        assert!(zero.validate().is_err());

        let inverted = parse(&["fit", "--text", "x", "--width", "10", "--height", "10", "--min-size", "60", "--max-size", "40"]);
        assert!(inverted.validate().unwrap_err().contains("invalid"));

        let spacing = parse(&["fit", "--text", "x", "--width", "10", "--height", "10", "--spacing", "1.0"]);
        assert!(spacing.validate().is_err());
    }

    #[test]
    fn test_validate_missing_files() {
        let cli = parse(&["probe", "/no/such/clip.mp4"]);
        assert!(cli.validate().unwrap_err().contains("does not exist"));

        let cli = parse(&["--config", "/no/such/config.json", "dirs"]);
        assert!(cli.validate().unwrap_err().contains("does not exist"));
    }

    #[test]
    fn test_base_dir_override() {
        let cli = parse(&["dirs", "--base-dir", "/srv/reels"]);
        let config = cli.workspace_config().unwrap();
        assert_eq!(config.base_directory, PathBuf::from("/srv/reels"));
    }
}
