//! Workspace configuration: base paths, naming conventions and tunables.

use crate::encoder::EncodeSettings;
use crate::font::{default_font_dirs, FontLibrary};
use crate::overlay::{CaptionStyle, PortraitLayout};
use crate::{ReelError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Narration language of a variant
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ru,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Ru];

    /// File-name suffix
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "EN",
            Language::Ru => "RU",
        }
    }

    /// Caption column in the text sheets
    pub fn text_column(&self) -> &'static str {
        match self {
            Language::En => "english_text",
            Language::Ru => "russian_text",
        }
    }
}

/// Frame orientation of a variant
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    pub const ALL: [Orientation; 2] = [Orientation::Horizontal, Orientation::Vertical];

    pub fn name(&self) -> &'static str {
        match self {
            Orientation::Horizontal => "horizontal",
            Orientation::Vertical => "vertical",
        }
    }

    /// Output frame size
    pub fn frame_size(&self) -> (u32, u32) {
        match self {
            Orientation::Horizontal => (1920, 1080),
            Orientation::Vertical => (1080, 1920),
        }
    }

    /// `{orientation}_{W}x{H}`, as used in output names
    pub fn label(&self) -> String {
        let (w, h) = self.frame_size();
        format!("{}_{}x{}", self.name(), w, h)
    }
}

/// Font lookup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSettings {
    /// Font used when an overlay does not name one
    pub font_path: Option<PathBuf>,
    pub search_dirs: Vec<PathBuf>,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            font_path: None,
            search_dirs: default_font_dirs(),
        }
    }
}

/// Music and narration timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Gain applied to the music bed
    pub music_volume: f64,
    /// Silence between main narration and tail, in seconds
    pub silence_between: f64,
    pub intro_music_before: f64,
    pub intro_music_after: f64,
    pub tail_music_before: f64,
    pub tail_music_after: f64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            music_volume: 0.3,
            silence_between: 0.5,
            intro_music_before: 0.2,
            intro_music_after: 1.5,
            tail_music_before: 2.0,
            tail_music_after: 2.0,
        }
    }
}

/// Everything a run needs to know about the file layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub base_directory: PathBuf,
    /// Channel folder below the base directory
    pub channel_dir: String,
    /// Current project folder below the channel folder
    pub project_dir: String,
    /// Tracker workflow folder below the base directory
    pub tracker_dir: String,
    pub intro_clips: usize,
    pub tail_clips: usize,
    pub prompt_clips: usize,
    pub fonts: FontSettings,
    pub audio: AudioSettings,
    pub encoding: EncodeSettings,
    pub captions: CaptionStyle,
    pub portrait: PortraitLayout,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from("."),
            channel_dir: "Greece_Automation".to_string(),
            project_dir: "3_Hector".to_string(),
            tracker_dir: "TT".to_string(),
            intro_clips: 1,
            tail_clips: 2,
            prompt_clips: 10,
            fonts: FontSettings::default(),
            audio: AudioSettings::default(),
            encoding: EncodeSettings::default(),
            captions: CaptionStyle::default(),
            portrait: PortraitLayout::default(),
        }
    }
}

/// Resolved paths of one language/orientation variant
#[derive(Debug, Clone, PartialEq)]
pub struct VariantPaths {
    pub intro_music: PathBuf,
    pub intro_voice: PathBuf,
    pub intro_captions: PathBuf,
    pub intro_clips: Vec<PathBuf>,
    pub intro_audio: PathBuf,
    pub intro_video: PathBuf,
    pub tail_music: PathBuf,
    pub tail_voice: PathBuf,
    pub tail_captions: PathBuf,
    pub tail_clips: Vec<PathBuf>,
    pub tail_audio: PathBuf,
    pub prompt_clips: Vec<PathBuf>,
    pub main_voice: PathBuf,
    pub main_captions: PathBuf,
    pub voice_with_tail: PathBuf,
    pub main_tail_video: PathBuf,
    pub final_video: PathBuf,
    pub text_column: &'static str,
    pub frame_size: (u32, u32),
}

impl WorkspaceConfig {
    /// Read a JSON config; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReelError::MissingInput(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.check()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject values that would make every build fail later
    pub fn check(&self) -> Result<()> {
        let encoding = &self.encoding;
        if encoding.fps == 0 {
            return Err(ReelError::InvalidConfig("encoding.fps must be positive".to_string()));
        }
        if self.audio.music_volume.is_nan() || self.audio.music_volume < 0.0 {
            return Err(ReelError::InvalidConfig(
                "audio.music_volume must not be negative".to_string(),
            ));
        }
        if self.audio.silence_between.is_nan() || self.audio.silence_between < 0.0 {
            return Err(ReelError::InvalidConfig(
                "audio.silence_between must not be negative".to_string(),
            ));
        }
        if self.captions.font_min == 0 || self.captions.font_min > self.captions.font_max {
            return Err(ReelError::InvalidConfig(format!(
                "captions font range {}..={} is invalid",
                self.captions.font_min, self.captions.font_max
            )));
        }
        Ok(())
    }

    pub fn channel_directory(&self) -> PathBuf {
        self.base_directory.join(&self.channel_dir)
    }

    pub fn common_artifacts(&self) -> PathBuf {
        self.channel_directory().join("Common_Artifacts")
    }

    pub fn intro_directory(&self) -> PathBuf {
        self.common_artifacts().join("Intro")
    }

    pub fn tail_directory(&self) -> PathBuf {
        self.common_artifacts().join("Tail")
    }

    pub fn project_directory(&self) -> PathBuf {
        self.channel_directory().join(&self.project_dir)
    }

    pub fn artifacts_directory(&self) -> PathBuf {
        self.project_directory().join("Artifacts")
    }

    pub fn result_directory(&self) -> PathBuf {
        self.project_directory().join("Result_Automation")
    }

    pub fn final_directory(&self) -> PathBuf {
        self.project_directory().join("Final")
    }

    pub fn tracker_directory(&self) -> PathBuf {
        self.base_directory.join(&self.tracker_dir)
    }

    pub fn tracker_sheet(&self) -> PathBuf {
        self.tracker_directory().join("TimelessTales_Video_Tracker.xlsx")
    }

    pub fn portrait_output_directory(&self) -> PathBuf {
        self.tracker_directory().join("assets").join("portraits with overlays")
    }

    /// Shared intro/tail outputs for a language and orientation
    pub fn variant_paths(&self, language: Language, orientation: Orientation) -> VariantPaths {
        let lang = language.code();
        let label = orientation.label();
        let intro = self.intro_directory();
        let tail = self.tail_directory();
        let artifacts = self.artifacts_directory();
        let result = self.result_directory();

        VariantPaths {
            intro_music: intro.join("Intro_Music.mp3"),
            intro_voice: intro.join(format!("Welcome_{}_TG.mp3", lang)),
            intro_captions: intro.join("Intro_Text_Overlay_EN_RU.csv"),
            intro_clips: (1..=self.intro_clips)
                .map(|i| intro.join(format!("Intro_{}.mp4", i)))
                .collect(),
            intro_audio: intro.join(format!("Intro_Audio_Output_{}.mp3", lang)),
            intro_video: intro.join(format!("Intro_Output_{}_{}.mp4", label, lang)),
            tail_music: tail.join("Tail_Music.mp3"),
            tail_voice: tail.join(format!("Tail_{}_TG.mp3", lang)),
            tail_captions: tail.join("Tail_Text_Overlay_EN_RU.csv"),
            tail_clips: (1..=self.tail_clips)
                .map(|i| tail.join(format!("Tail_{}.mp4", i)))
                .collect(),
            tail_audio: tail.join(format!("Tail_Audio_Output_{}.mp3", lang)),
            prompt_clips: (1..=self.prompt_clips)
                .map(|i| artifacts.join(format!("Prompt {}.mp4", i)))
                .collect(),
            main_voice: artifacts.join(format!("Voice_Over_{}.mp3", lang)),
            main_captions: artifacts.join("Video_Texts.csv"),
            voice_with_tail: result.join(format!("Voice_Over_{}_With_Tail.mp3", lang)),
            main_tail_video: result.join(format!("main_plus_tail_{}_{}.mp4", label, lang)),
            final_video: self
                .final_directory()
                .join(format!("final_{}_{}.mp4", label, lang)),
            text_column: language.text_column(),
            frame_size: orientation.frame_size(),
        }
    }

    /// Directories a variant build reads from or writes to
    pub fn required_directories(&self) -> Vec<PathBuf> {
        vec![
            self.common_artifacts(),
            self.intro_directory(),
            self.tail_directory(),
            self.artifacts_directory(),
            self.result_directory(),
            self.final_directory(),
        ]
    }

    /// Required directories that do not exist
    pub fn validate_directories(&self) -> Vec<PathBuf> {
        self.required_directories()
            .into_iter()
            .filter(|dir| !dir.is_dir())
            .collect()
    }

    pub fn create_directories(&self) -> Result<()> {
        for dir in self.required_directories() {
            std::fs::create_dir_all(&dir)?;
            debug!("Ensured directory {}", dir.display());
        }
        Ok(())
    }

    /// Index the configured font directories
    pub fn font_library(&self) -> FontLibrary {
        FontLibrary::discover(self.fonts.font_path.clone(), &self.fonts.search_dirs)
    }
}
