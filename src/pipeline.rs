//! End-to-end builds: the six-step language/orientation variant, the batch
//! over every variant and the tracker-sheet batch of still-image videos.

use crate::compose::{
    concatenate_audio_files, concatenate_video_files, create_audio_file, create_still_video,
    create_video_file, AudioMixJob, ResizeBy, StillVideoJob, VideoJob,
};
use crate::config::{Language, Orientation, WorkspaceConfig};
use crate::overlay::create_image_with_overlays;
use crate::sheet::{load_overlay_entries, VideoOverlayEntry};
use crate::ReelError;
use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use std::future::Future;
use std::path::{Path, PathBuf};

const VARIANT_STEPS: usize = 6;

/// Switches for [`build_variant`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VariantOptions {
    /// Remove the files produced by steps 1-5 after a successful build
    pub cleanup_intermediate: bool,
    /// Skip steps 1-3 and use the intro/tail outputs of an earlier run
    pub reuse_common: bool,
}

/// Files produced during one build.
///
/// Everything recorded is removed when the guard is dropped, unless it was
/// disarmed first. Removal failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct IntermediateFiles {
    files: Vec<PathBuf>,
    armed: bool,
}

impl IntermediateFiles {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            armed: true,
        }
    }

    pub fn record(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.files.contains(&path) {
            self.files.push(path);
        }
    }

    /// Stop tracking `path`; it survives both cleanup and drop
    pub fn forget(&mut self, path: &Path) {
        self.files.retain(|p| p != path);
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Keep every recorded file when the guard goes out of scope
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Remove every recorded file now. Returns how many were deleted.
    pub fn remove_all(&mut self) -> usize {
        let mut removed = 0;
        for path in self.files.drain(..) {
            if !path.exists() {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    info!("Removed {}", path.display());
                }
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        removed
    }
}

impl Default for IntermediateFiles {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntermediateFiles {
    fn drop(&mut self) {
        if self.armed && !self.files.is_empty() {
            let removed = self.remove_all();
            if removed > 0 {
                info!("Cleaned up {} intermediate file(s)", removed);
            }
        }
    }
}

/// Run one numbered step, then insist that its output landed on disk
async fn run_step<F>(
    number: usize,
    label: &str,
    expected: &Path,
    produced: &mut IntermediateFiles,
    step: F,
) -> Result<()>
where
    F: Future<Output = Result<PathBuf>>,
{
    info!("Step {}/{}: {}", number, VARIANT_STEPS, label);
    // an output left by an earlier run only becomes ours once overwritten
    if !expected.exists() {
        produced.record(expected);
    }
    step.await
        .with_context(|| format!("Step {} ({}) failed", number, label))?;
    produced.record(expected);
    if !expected.exists() {
        bail!(
            "Step {} ({}) did not produce {}",
            number,
            label,
            expected.display()
        );
    }
    info!(
        "Step {} completed: {}",
        number,
        expected
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    Ok(())
}

/// Build `final_{orientation}_{W}x{H}_{LANG}.mp4`:
/// intro audio, intro video, tail audio, narration + tail audio,
/// main + tail video, then intro + main/tail.
///
/// Stops at the first failing step. Files written by this run are removed on
/// failure, and after success too when `cleanup_intermediate` is set.
pub async fn build_variant(
    config: &WorkspaceConfig,
    language: Language,
    orientation: Orientation,
    options: &VariantOptions,
) -> Result<PathBuf> {
    let paths = config.variant_paths(language, orientation);
    let settings = &config.encoding;
    let audio = &config.audio;
    let fonts = config.font_library();
    let resize = ResizeBy::from(orientation);
    let mut produced = IntermediateFiles::new();

    info!(
        "Creating {} {} video",
        language.code(),
        orientation.name()
    );

    if options.reuse_common {
        info!("Skipping steps 1-3, checking for existing intro/tail files");
        let required = [
            ("Intro audio", &paths.intro_audio),
            ("Intro video", &paths.intro_video),
            ("Tail audio", &paths.tail_audio),
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|(_, path)| !path.exists())
            .map(|(name, path)| format!("{}: {}", name, path.display()))
            .collect();
        if !missing.is_empty() {
            for line in &missing {
                error!("Missing {}", line);
            }
            bail!("Cannot reuse intro/tail files, {} missing", missing.len());
        }
    } else {
        let intro_audio = AudioMixJob {
            output: paths.intro_audio.clone(),
            music: paths.intro_music.clone(),
            voice: paths.intro_voice.clone(),
            music_before: audio.intro_music_before,
            music_after: audio.intro_music_after,
            music_volume: audio.music_volume,
        };
        run_step(
            1,
            "intro audio",
            &paths.intro_audio,
            &mut produced,
            create_audio_file(&intro_audio, settings),
        )
        .await?;

        let intro_video = VideoJob {
            output: paths.intro_video.clone(),
            frame_size: paths.frame_size,
            resize,
            audio: paths.intro_audio.clone(),
            caption_sheets: vec![paths.intro_captions.clone()],
            text_column: paths.text_column.to_string(),
            clips: paths.intro_clips.clone(),
        };
        run_step(
            2,
            "intro video",
            &paths.intro_video,
            &mut produced,
            create_video_file(&intro_video, &fonts, &config.captions, settings),
        )
        .await?;

        let tail_audio = AudioMixJob {
            output: paths.tail_audio.clone(),
            music: paths.tail_music.clone(),
            voice: paths.tail_voice.clone(),
            music_before: audio.tail_music_before,
            music_after: audio.tail_music_after,
            music_volume: audio.music_volume,
        };
        run_step(
            3,
            "tail audio",
            &paths.tail_audio,
            &mut produced,
            create_audio_file(&tail_audio, settings),
        )
        .await?;
    }

    let narration = [paths.main_voice.clone(), paths.tail_audio.clone()];
    run_step(
        4,
        "narration + tail audio",
        &paths.voice_with_tail,
        &mut produced,
        concatenate_audio_files(&narration, &paths.voice_with_tail, audio.silence_between, settings),
    )
    .await?;

    let main_video = VideoJob {
        output: paths.main_tail_video.clone(),
        frame_size: paths.frame_size,
        resize,
        audio: paths.voice_with_tail.clone(),
        caption_sheets: vec![paths.main_captions.clone(), paths.tail_captions.clone()],
        text_column: paths.text_column.to_string(),
        clips: paths
            .prompt_clips
            .iter()
            .chain(paths.tail_clips.iter())
            .cloned()
            .collect(),
    };
    run_step(
        5,
        "main + tail video",
        &paths.main_tail_video,
        &mut produced,
        create_video_file(&main_video, &fonts, &config.captions, settings),
    )
    .await?;

    let parts = [paths.intro_video.clone(), paths.main_tail_video.clone()];
    run_step(
        6,
        "final video",
        &paths.final_video,
        &mut produced,
        concatenate_video_files(&parts, &paths.final_video, true, settings),
    )
    .await?;

    produced.forget(&paths.final_video);
    if options.cleanup_intermediate {
        let removed = produced.remove_all();
        info!("Cleanup completed: {} file(s) removed", removed);
    } else {
        produced.disarm();
    }

    info!("Completed {}", paths.final_video.display());
    Ok(paths.final_video)
}

/// Result of one variant in a batch
#[derive(Debug)]
pub struct VariantOutcome {
    pub language: Language,
    pub orientation: Orientation,
    pub result: Result<PathBuf>,
}

impl VariantOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Build every language/orientation pair; one failure does not stop the rest
pub async fn build_all_variants(
    config: &WorkspaceConfig,
    options: &VariantOptions,
) -> Vec<VariantOutcome> {
    let mut outcomes = Vec::new();
    for language in Language::ALL {
        for orientation in Orientation::ALL {
            let result = build_variant(config, language, orientation, options).await;
            if let Err(e) = &result {
                error!(
                    "{} {} video failed: {:#}",
                    language.code(),
                    orientation.name(),
                    e
                );
            }
            outcomes.push(VariantOutcome {
                language,
                orientation,
                result,
            });
        }
    }

    let built = outcomes.iter().filter(|o| o.succeeded()).count();
    info!("Built {}/{} variants", built, outcomes.len());
    outcomes
}

/// Sheet paths are relative to the tracker directory unless absolute
pub fn resolve_tracker_path(tracker_dir: &Path, value: &str) -> PathBuf {
    let path = Path::new(value.trim());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        tracker_dir.join(path)
    }
}

/// Where a tracker entry's video goes.
///
/// An `Output Video Path` with an extension is used as the file. One without
/// an extension is a directory, and so is an empty cell (the tracker
/// directory); the file is then named after the audio.
pub fn resolve_output_path(tracker_dir: &Path, entry: &VideoOverlayEntry) -> PathBuf {
    let audio_stem = Path::new(&entry.audio_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let file_name = format!("{}.mp4", audio_stem);

    if entry.output_video_path.trim().is_empty() {
        return tracker_dir.join(file_name);
    }
    let output = resolve_tracker_path(tracker_dir, &entry.output_video_path);
    if output.extension().is_some() {
        output
    } else {
        output.join(file_name)
    }
}

/// Case-insensitive status match; no filter accepts everything
pub fn status_matches(status: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(wanted) => status.trim().eq_ignore_ascii_case(wanted.trim()),
        None => true,
    }
}

fn optional_path(tracker_dir: &Path, value: &str) -> Option<PathBuf> {
    (!value.trim().is_empty()).then(|| resolve_tracker_path(tracker_dir, value))
}

async fn process_entry(
    config: &WorkspaceConfig,
    entry: &VideoOverlayEntry,
    frame_size: (u32, u32),
    fonts: &crate::font::FontLibrary,
) -> Result<PathBuf> {
    let tracker_dir = config.tracker_directory();
    let image = resolve_tracker_path(&tracker_dir, &entry.image_path);
    let audio = resolve_tracker_path(&tracker_dir, &entry.audio_path);

    let scratch = tempfile::Builder::new()
        .prefix("reel-portrait")
        .tempdir()
        .context("Failed to create portrait directory")?;
    let portrait = create_image_with_overlays(&image, &entry.overlays, scratch.path(), fonts, &config.portrait)
        .with_context(|| format!("Failed to draw overlays on {}", image.display()))?;

    let job = StillVideoJob {
        image: portrait,
        audio,
        output: resolve_output_path(&tracker_dir, entry),
        head: optional_path(&tracker_dir, &entry.head_video_path),
        tail: optional_path(&tracker_dir, &entry.tail_video_path),
        frame_size,
    };
    create_still_video(&job, &config.encoding).await
}

/// Turn every tracker row into a still-image video.
///
/// Rows whose status does not match `status` are skipped. A failing row is
/// logged and the batch moves on; the created videos are returned.
pub async fn process_tracker(
    config: &WorkspaceConfig,
    sheet: &Path,
    status: Option<&str>,
    frame_size: (u32, u32),
) -> Result<Vec<PathBuf>> {
    let entries = load_overlay_entries(sheet)
        .with_context(|| format!("Error loading entries from {}", sheet.display()))?;
    let fonts = config.font_library();
    let mut created = Vec::new();

    for entry in entries.iter().filter(|e| status_matches(&e.status, status)) {
        match process_entry(config, entry, frame_size, &fonts).await {
            Ok(path) => {
                info!("Successfully created video: {}", path.display());
                created.push(path);
            }
            Err(e) => error!("Error processing entry {}: {:#}", entry.image_path, e),
        }
    }

    info!("Created {} video(s) from {}", created.len(), sheet.display());
    Ok(created)
}

/// Draw every tracker row's overlays and keep the PNGs in `output_dir`
pub fn render_tracker_portraits(
    config: &WorkspaceConfig,
    sheet: &Path,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let entries = load_overlay_entries(sheet)?;
    let tracker_dir = config.tracker_directory();
    let fonts = config.font_library();
    std::fs::create_dir_all(output_dir).map_err(ReelError::from)?;

    let mut written = Vec::new();
    for entry in &entries {
        let image = resolve_tracker_path(&tracker_dir, &entry.image_path);
        match create_image_with_overlays(&image, &entry.overlays, output_dir, &fonts, &config.portrait) {
            Ok(path) => written.push(path),
            Err(e) => error!("Error processing entry {}: {}", entry.image_path, e),
        }
    }
    Ok(written)
}
