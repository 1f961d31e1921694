//! Media operations built on ffmpeg: audio beds, captioned clip sequences,
//! concatenation, still-image videos and voice placement.
//!
//! Each operation has a pure `*_command` builder that turns probed durations
//! into an [`FfmpegCommand`], and an async wrapper that probes, runs and checks
//! the output file.

use crate::config::Orientation;
use crate::encoder::{format_time, EncodeSettings, FfmpegCommand};
use crate::font::FontLibrary;
use crate::overlay::{render_caption_plate, CaptionStyle};
use crate::probe::{probe_duration, probe_media, MediaInfo};
use crate::sheet::texts_from_column;
use crate::timing::{reconcile_bed, reconcile_segments, Adjustment, ReconcilePlan, Segment, DURATION_EPSILON};
use crate::ReelError;
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Videos shorter than this get a warning
pub const MIN_DURATION: f64 = 1.0;

/// Frame rate of still-image videos
pub const STILL_VIDEO_FPS: u32 = 24;

/// Which side of a clip is scaled to the frame before cropping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeBy {
    Width,
    Height,
}

impl From<Orientation> for ResizeBy {
    fn from(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Horizontal => ResizeBy::Width,
            Orientation::Vertical => ResizeBy::Height,
        }
    }
}

/// Scale one side to the frame, centre-crop the overflow, pad what is missing
pub fn cover_filter((width, height): (u32, u32), resize: ResizeBy) -> String {
    let scale = match resize {
        ResizeBy::Width => format!("scale={}:-2", width),
        ResizeBy::Height => format!("scale=-2:{}", height),
    };
    format!(
        "{scale},crop='min(iw,{w})':'min(ih,{h})',pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1",
        scale = scale,
        w = width,
        h = height
    )
}

/// Letterbox into the frame keeping the aspect ratio
fn contain_filter((width, height): (u32, u32)) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1",
        w = width,
        h = height
    )
}

fn normalize_audio(settings: &EncodeSettings) -> String {
    format!(
        "aresample={},aformat=sample_fmts=fltp:channel_layouts=stereo",
        settings.audio_rate
    )
}

fn silence_source(settings: &EncodeSettings) -> String {
    format!("anullsrc=r={}:cl=stereo", settings.audio_rate)
}

fn delay_ms(seconds: f64) -> u64 {
    (seconds * 1000.0).round().max(0.0) as u64
}

/// Codec arguments chosen by output extension
fn audio_output_args(output: &Path, settings: &EncodeSettings) -> Vec<String> {
    let is_mp3 = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false);
    if is_mp3 {
        settings.mp3_args()
    } else {
        vec![
            "-c:a".to_string(),
            settings.audio_codec.clone(),
            "-b:a".to_string(),
            settings.audio_bitrate.clone(),
            "-ar".to_string(),
            settings.audio_rate.to_string(),
        ]
    }
}

fn ensure_written(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("Expected output {} was not written", path.display());
    }
    Ok(())
}

/// Narration over a music bed
#[derive(Debug, Clone)]
pub struct AudioMixJob {
    pub output: PathBuf,
    pub music: PathBuf,
    pub voice: PathBuf,
    /// Music-only lead-in before the narration starts
    pub music_before: f64,
    /// Music-only tail after the narration ends
    pub music_after: f64,
    pub music_volume: f64,
}

/// Build the mix command from probed durations. Returns the command and the
/// length of the result.
pub fn audio_mix_command(
    job: &AudioMixJob,
    music: Option<f64>,
    voice: Option<f64>,
    settings: &EncodeSettings,
) -> Result<(FfmpegCommand, f64)> {
    let target = match (voice, music) {
        (Some(voice), _) => job.music_before + voice + job.music_after,
        (None, Some(music)) => music,
        (None, None) => bail!(ReelError::MissingInput(job.voice.clone())),
    };

    let mut cmd = FfmpegCommand::new(&job.output);
    let mut voice_label = None;
    let mut bed_label = None;

    if voice.is_some() {
        let input = cmd.input(&job.voice);
        cmd.filter(format!(
            "[{}:a]{},adelay=delays={}:all=1,apad=whole_dur={}[voice]",
            input,
            normalize_audio(settings),
            delay_ms(job.music_before),
            format_time(target)
        ));
        voice_label = Some("voice");
    }

    if let Some(music) = music {
        let plan = reconcile_bed(music, target)?;
        if plan.is_looped() {
            debug!("Looping {:.2}s music bed {} time(s)", music, plan.plays);
        }
        let loops = (plan.plays - 1).to_string();
        let input = cmd.input_with(&["-stream_loop", loops.as_str()], &job.music);
        cmd.filter(format!(
            "[{}:a]{},atrim=duration={},asetpts=PTS-STARTPTS,volume={:.3}[bed]",
            input,
            normalize_audio(settings),
            format_time(plan.trim_to),
            job.music_volume
        ));
        bed_label = Some("bed");
    }

    match (voice_label, bed_label) {
        (Some(v), Some(b)) => {
            cmd.filter(format!(
                "[{}][{}]amix=inputs=2:duration=longest:normalize=0[outa]",
                b, v
            ));
        }
        (Some(only), None) | (None, Some(only)) => {
            cmd.filter(format!("[{}]anull[outa]", only));
        }
        (None, None) => bail!(ReelError::MissingInput(job.music.clone())),
    }

    cmd.map("outa")
        .output_args(&audio_output_args(&job.output, settings))
        .output_args(&["-t".to_string(), format_time(target)]);
    Ok((cmd, target))
}

/// Layer narration over a looped or trimmed music bed.
///
/// The result lasts `music_before + narration + music_after`. If only one of
/// the two tracks exists it is used alone.
pub async fn create_audio_file(job: &AudioMixJob, settings: &EncodeSettings) -> Result<PathBuf> {
    info!("Creating audio {}", job.output.display());

    let voice = if job.voice.exists() {
        Some(probe_duration(&job.voice).await?)
    } else {
        warn!("Narration not found: {}", job.voice.display());
        None
    };
    let music = if job.music.exists() {
        Some(probe_duration(&job.music).await?)
    } else {
        warn!("Music not found: {}", job.music.display());
        None
    };

    let (cmd, target) = audio_mix_command(job, music, voice, settings)?;
    cmd.run()
        .await
        .with_context(|| format!("Failed to mix {}", job.output.display()))?;
    ensure_written(&job.output)?;
    info!("Created audio {} ({:.2}s)", job.output.display(), target);
    Ok(job.output.clone())
}

/// A captioned clip sequence timed to an audio track
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub output: PathBuf,
    pub frame_size: (u32, u32),
    pub resize: ResizeBy,
    pub audio: PathBuf,
    pub caption_sheets: Vec<PathBuf>,
    pub text_column: String,
    pub clips: Vec<PathBuf>,
}

/// A clip that made it into the sequence, with its caption plate if any
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceClip {
    pub path: PathBuf,
    pub caption: Option<PathBuf>,
}

/// Build the sequence command: every planned clip is fitted to the frame,
/// captioned, concatenated and laid over `audio`, cut at `target`.
#[allow(clippy::too_many_arguments)]
pub fn clip_sequence_command(
    output: &Path,
    segments: &[Segment<SequenceClip>],
    plan: &ReconcilePlan,
    frame_size: (u32, u32),
    resize: ResizeBy,
    audio: &Path,
    target: f64,
    settings: &EncodeSettings,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(output);
    let mut labels = Vec::with_capacity(plan.clips.len());

    for (k, (clip, take)) in plan.resolve(segments).into_iter().enumerate() {
        let take = format_time(take);
        let video = cmd.input_with(&["-t", take.as_str()], &clip.path);
        let fitted = format!(
            "[{}:v]{},fps={},format=yuv420p,trim=duration={},setpts=PTS-STARTPTS",
            video,
            cover_filter(frame_size, resize),
            settings.fps,
            take
        );
        match &clip.caption {
            Some(plate) => {
                let caption = cmd.input(plate);
                cmd.filter(format!("{}[base{}]", fitted, k));
                cmd.filter(format!(
                    "[base{k}][{c}:v]overlay=0:0:eof_action=repeat,format=yuv420p[v{k}]",
                    k = k,
                    c = caption
                ));
            }
            None => {
                cmd.filter(format!("{}[v{}]", fitted, k));
            }
        }
        labels.push(format!("[v{}]", k));
    }

    cmd.filter(format!(
        "{}concat=n={}:v=1:a=0[outv]",
        labels.concat(),
        labels.len()
    ));
    let audio_input = cmd.input(audio);
    cmd.map("outv")
        .map(&format!("{}:a", audio_input))
        .output_args(&settings.video_args())
        .output_args(&[
            "-r".to_string(),
            settings.fps.to_string(),
            "-t".to_string(),
            format_time(target),
        ]);
    cmd
}

/// Captioned clip sequence whose length matches the audio track.
///
/// Missing or unreadable clips are skipped. Clip `i` gets caption `i` of the
/// concatenated caption sheets when that text is not empty.
pub async fn create_video_file(
    job: &VideoJob,
    fonts: &FontLibrary,
    captions: &CaptionStyle,
    settings: &EncodeSettings,
) -> Result<PathBuf> {
    info!("Creating video {}", job.output.display());
    if !job.audio.exists() {
        return Err(ReelError::MissingInput(job.audio.clone()).into());
    }
    let target = probe_duration(&job.audio).await?;
    let texts = texts_from_column(&job.caption_sheets, &job.text_column);

    let plates = tempfile::Builder::new()
        .prefix("reel-captions")
        .tempdir()
        .context("Failed to create caption directory")?;

    let mut segments = Vec::new();
    for (idx, path) in job.clips.iter().enumerate() {
        if !path.exists() {
            warn!("Clip {} not found, skipping", path.display());
            continue;
        }
        let duration = match probe_duration(path).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let caption = match texts.get(idx).map(|t| t.trim()).filter(|t| !t.is_empty()) {
            Some(text) => {
                let plate_path = plates.path().join(format!("caption_{}.png", idx));
                match render_caption_plate(text, job.frame_size, fonts, captions)
                    .and_then(|plate| plate.save(&plate_path).map_err(ReelError::from))
                {
                    Ok(()) => Some(plate_path),
                    Err(e) => {
                        warn!("Caption for clip {} failed: {}", idx + 1, e);
                        None
                    }
                }
            }
            None => {
                warn!("No text for clip {}", idx + 1);
                None
            }
        };

        segments.push(Segment::new(
            SequenceClip {
                path: path.clone(),
                caption,
            },
            duration,
        ));
    }

    if segments.is_empty() {
        bail!("No video clips found for {}", job.output.display());
    }

    let plan = reconcile_segments(&segments, target)?;
    match plan.adjustment {
        Adjustment::Unchanged => debug!("Clips already match {:.2}s of audio", target),
        Adjustment::Truncated => info!("Truncating clips to {:.2}s", target),
        Adjustment::Extended { repeats } => {
            info!("Repeating last clip {} time(s) to reach {:.2}s", repeats, target)
        }
    }
    if plan.total < MIN_DURATION {
        warn!("Video {} is only {:.2}s long", job.output.display(), plan.total);
    }

    let cmd = clip_sequence_command(
        &job.output,
        &segments,
        &plan,
        job.frame_size,
        job.resize,
        &job.audio,
        target,
        settings,
    );
    cmd.run()
        .await
        .with_context(|| format!("Failed to render {}", job.output.display()))?;
    ensure_written(&job.output)?;
    info!("Created video {} ({:.2}s)", job.output.display(), plan.total);
    Ok(job.output.clone())
}

/// Concatenate audio tracks with `silence` seconds between consecutive ones
pub fn audio_concat_command(
    inputs: &[PathBuf],
    output: &Path,
    silence: f64,
    settings: &EncodeSettings,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(output);
    let mut labels = Vec::new();

    for (i, path) in inputs.iter().enumerate() {
        if i > 0 && silence > 0.0 {
            let gap = cmd.lavfi(&silence_source(settings));
            cmd.filter(format!(
                "[{}:a]atrim=duration={}[gap{}]",
                gap,
                format_time(silence),
                i
            ));
            labels.push(format!("[gap{}]", i));
        }
        let input = cmd.input(path);
        cmd.filter(format!("[{}:a]{}[a{}]", input, normalize_audio(settings), i));
        labels.push(format!("[a{}]", i));
    }

    cmd.filter(format!(
        "{}concat=n={}:v=0:a=1[outa]",
        labels.concat(),
        labels.len()
    ));
    cmd.map("outa")
        .output_args(&audio_output_args(output, settings));
    cmd
}

/// Join audio files in order. Missing inputs are skipped with a warning.
pub async fn concatenate_audio_files(
    paths: &[PathBuf],
    output: &Path,
    silence: f64,
    settings: &EncodeSettings,
) -> Result<PathBuf> {
    info!("Concatenating {} audio file(s) into {}", paths.len(), output.display());
    let present: Vec<PathBuf> = paths
        .iter()
        .filter(|p| {
            let exists = p.exists();
            if !exists {
                warn!("Audio {} not found, skipping", p.display());
            }
            exists
        })
        .cloned()
        .collect();
    if present.is_empty() {
        bail!("No audio files to concatenate into {}", output.display());
    }

    audio_concat_command(&present, output, silence, settings)
        .run()
        .await
        .with_context(|| format!("Failed to concatenate audio into {}", output.display()))?;
    ensure_written(output)?;
    Ok(output.to_path_buf())
}

/// Letterbox a probed clip into the frame; clips without audio get silence
/// of their own length. Returns the `[v][a]` label pair for concat.
fn push_fitted_clip(
    cmd: &mut FfmpegCommand,
    info: &MediaInfo,
    k: usize,
    frame_size: (u32, u32),
    fps: u32,
    settings: &EncodeSettings,
) -> String {
    let input = cmd.input(&info.path);
    cmd.filter(format!(
        "[{}:v]{},fps={},format=yuv420p[v{}]",
        input,
        contain_filter(frame_size),
        fps,
        k
    ));
    if info.has_audio {
        cmd.filter(format!("[{}:a]{}[a{}]", input, normalize_audio(settings), k));
    } else {
        let gap = cmd.lavfi(&silence_source(settings));
        cmd.filter(format!(
            "[{}:a]atrim=duration={}[a{}]",
            gap,
            format_time(info.duration),
            k
        ));
    }
    format!("[v{k}][a{k}]", k = k)
}

/// Join probed videos, letterboxed into `frame_size`; inputs without an audio
/// stream get silence of their own length
pub fn video_concat_command(
    inputs: &[MediaInfo],
    output: &Path,
    frame_size: (u32, u32),
    fps: u32,
    settings: &EncodeSettings,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(output);
    let labels: Vec<String> = inputs
        .iter()
        .enumerate()
        .map(|(i, info)| push_fitted_clip(&mut cmd, info, i, frame_size, fps, settings))
        .collect();

    cmd.filter(format!(
        "{}concat=n={}:v=1:a=1[outv][outa]",
        labels.concat(),
        inputs.len()
    ));
    cmd.map("outv")
        .map("outa")
        .output_args(&settings.video_args())
        .output_args(&["-r".to_string(), fps.to_string()]);
    cmd
}

/// Join videos in order. Every input must exist; with `check_compatibility`
/// all frame sizes must match.
pub async fn concatenate_video_files(
    paths: &[PathBuf],
    output: &Path,
    check_compatibility: bool,
    settings: &EncodeSettings,
) -> Result<PathBuf> {
    if paths.is_empty() {
        bail!("No video paths provided");
    }
    for path in paths {
        if !path.exists() {
            return Err(ReelError::MissingInput(path.clone()).into());
        }
    }

    let mut infos = Vec::with_capacity(paths.len());
    for path in paths {
        infos.push(probe_media(path).await?);
    }

    let reference = infos[0].dimensions();
    if check_compatibility {
        if let Some(odd) = infos.iter().find(|i| i.dimensions() != reference) {
            bail!(
                "Size mismatch: {} is {}x{}, expected {}x{}",
                odd.path.display(),
                odd.width,
                odd.height,
                reference.0,
                reference.1
            );
        }
    }

    info!("Concatenating {} video(s) into {}", infos.len(), output.display());
    video_concat_command(&infos, output, reference, settings.fps, settings)
        .run()
        .await
        .with_context(|| format!("Failed to concatenate into {}", output.display()))?;
    ensure_written(output)?;
    Ok(output.to_path_buf())
}

/// A still image shown for the length of an audio track, with optional
/// head and tail videos
#[derive(Debug, Clone)]
pub struct StillVideoJob {
    pub image: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    pub head: Option<PathBuf>,
    pub tail: Option<PathBuf>,
    pub frame_size: (u32, u32),
}

pub fn still_video_command(
    job: &StillVideoJob,
    audio_duration: f64,
    head: Option<&MediaInfo>,
    tail: Option<&MediaInfo>,
    settings: &EncodeSettings,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(&job.output);
    let mut labels = Vec::new();
    let fps = STILL_VIDEO_FPS;
    let duration = format_time(audio_duration);

    if let Some(head) = head {
        labels.push(push_fitted_clip(&mut cmd, head, 0, job.frame_size, fps, settings));
    }

    let image = cmd.input_with(&["-loop", "1", "-t", duration.as_str()], &job.image);
    let audio = cmd.input(&job.audio);
    let (w, h) = job.frame_size;
    cmd.filter(format!(
        "[{}:v]scale={}:{},setsar=1,fps={},format=yuv420p,trim=duration={}[v1]",
        image, w, h, fps, duration
    ));
    cmd.filter(format!(
        "[{}:a]{},atrim=duration={}[a1]",
        audio,
        normalize_audio(settings),
        duration
    ));
    labels.push("[v1][a1]".to_string());

    if let Some(tail) = tail {
        labels.push(push_fitted_clip(&mut cmd, tail, 2, job.frame_size, fps, settings));
    }

    let count = labels.len();
    cmd.filter(format!(
        "{}concat=n={}:v=1:a=1[outv][outa]",
        labels.concat(),
        count
    ));
    cmd.map("outv")
        .map("outa")
        .output_args(&settings.video_args())
        .output_args(&["-r".to_string(), fps.to_string()]);
    cmd
}

async fn optional_clip(path: Option<&Path>, role: &str) -> Option<MediaInfo> {
    let path = path?;
    if !path.exists() {
        warn!("{} video {} not found, leaving it out", role, path.display());
        return None;
    }
    match probe_media(path).await {
        Ok(info) if info.has_video => Some(info),
        Ok(_) => {
            warn!("{} {} has no video stream, leaving it out", role, path.display());
            None
        }
        Err(e) => {
            warn!("{} {} unreadable, leaving it out: {}", role, path.display(), e);
            None
        }
    }
}

/// Render a still-image video lasting as long as its audio
pub async fn create_still_video(job: &StillVideoJob, settings: &EncodeSettings) -> Result<PathBuf> {
    for input in [&job.image, &job.audio] {
        if !input.exists() {
            return Err(ReelError::MissingInput(input.clone()).into());
        }
    }
    let duration = probe_duration(&job.audio).await?;
    let head = optional_clip(job.head.as_deref(), "Head").await;
    let tail = optional_clip(job.tail.as_deref(), "Tail").await;

    info!(
        "Creating still video {} ({:.2}s, head: {}, tail: {})",
        job.output.display(),
        duration,
        head.is_some(),
        tail.is_some()
    );
    still_video_command(job, duration, head.as_ref(), tail.as_ref(), settings)
        .run()
        .await
        .with_context(|| format!("Failed to render {}", job.output.display()))?;
    ensure_written(&job.output)?;
    Ok(job.output.clone())
}

/// Place `voice` in the middle of the video timeline, mixed over its audio
pub fn voice_over_command(
    video: &MediaInfo,
    voice: &Path,
    voice_duration: f64,
    output: &Path,
    settings: &EncodeSettings,
) -> FfmpegCommand {
    let start = ((video.duration - voice_duration) / 2.0).max(0.0);
    let mut cmd = FfmpegCommand::new(output);
    let video_input = cmd.input(&video.path);
    let voice_input = cmd.input(voice);

    cmd.filter(format!(
        "[{}:a]{},adelay=delays={}:all=1[voice]",
        voice_input,
        normalize_audio(settings),
        delay_ms(start)
    ));
    if video.has_audio {
        cmd.filter(format!(
            "[{}:a]{}[base]",
            video_input,
            normalize_audio(settings)
        ));
        cmd.filter("[base][voice]amix=inputs=2:duration=first:normalize=0[outa]");
    } else {
        cmd.filter(format!(
            "[voice]apad=whole_dur={}[outa]",
            format_time(video.duration)
        ));
    }

    cmd.map(&format!("{}:v", video_input))
        .map("outa")
        .output_args(&["-c:v", "copy"])
        .output_args(&audio_output_args(output, settings))
        .output_args(&["-t".to_string(), format_time(video.duration)]);
    cmd
}

/// Default output name for [`add_voice_to_video`]: `{stem}_with_voice_{unix time}.mp4`
pub fn voice_output_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    video.with_file_name(format!("{}_with_voice_{}.mp4", stem, stamp))
}

/// Centre a narration track in a video. Fails when the voice is longer than the video.
pub async fn add_voice_to_video(
    video: &Path,
    voice: &Path,
    output: Option<&Path>,
    settings: &EncodeSettings,
) -> Result<PathBuf> {
    for input in [video, voice] {
        if !input.exists() {
            return Err(ReelError::MissingInput(input.to_path_buf()).into());
        }
    }
    let video_info = probe_media(video).await?;
    let video_duration = video_info.require_duration()?;
    let voice_duration = probe_duration(voice).await?;
    if voice_duration > video_duration + DURATION_EPSILON {
        bail!(
            "Voice ({:.2}s) is longer than the video ({:.2}s)",
            voice_duration,
            video_duration
        );
    }

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| voice_output_path(video));
    info!("Adding voice {} to {}", voice.display(), video.display());
    voice_over_command(&video_info, voice, voice_duration, &output, settings)
        .run()
        .await
        .with_context(|| format!("Failed to render {}", output.display()))?;
    ensure_written(&output)?;
    Ok(output)
}
