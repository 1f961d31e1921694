//! Media inspection: duration, frame size, frame rate and stream presence.

use crate::{ReelError, Result};
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// What the assembler needs to know about a media file
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    /// Container duration in seconds, 0.0 when unknown
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub has_video: bool,
    pub has_audio: bool,
}

impl MediaInfo {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Duration, or an error when the container does not report one
    pub fn require_duration(&self) -> Result<f64> {
        if self.duration.is_finite() && self.duration > 0.0 {
            Ok(self.duration)
        } else {
            Err(ReelError::Probe(format!(
                "{} has no usable duration",
                self.path.display()
            )))
        }
    }
}

/// Locate an external program on `PATH`
pub fn find_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| ReelError::ToolNotFound(name.to_string()))
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse an ffprobe rational such as `30000/1001`; `0/0` gives `None`
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

/// Build a [`MediaInfo`] from `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_ffprobe_json(path: &Path, json: &str) -> Result<MediaInfo> {
    let output: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| ReelError::Probe(format!("Unreadable ffprobe output for {}: {}", path.display(), e)))?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = output
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let format_duration = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());
    let stream_duration = output
        .streams
        .iter()
        .filter_map(|s| s.duration.as_deref().and_then(|d| d.parse::<f64>().ok()))
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));

    let fps = video
        .and_then(|v| {
            v.avg_frame_rate
                .as_deref()
                .and_then(parse_rate)
                .or_else(|| v.r_frame_rate.as_deref().and_then(parse_rate))
        })
        .unwrap_or(0.0);

    Ok(MediaInfo {
        path: path.to_path_buf(),
        duration: format_duration.or(stream_duration).unwrap_or(0.0),
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        fps,
        has_video: video.is_some(),
        has_audio,
    })
}

/// Inspect a media file
pub async fn probe_media(path: &Path) -> Result<MediaInfo> {
    if !path.exists() {
        return Err(ReelError::MissingInput(path.to_path_buf()));
    }

    #[cfg(feature = "native-probe")]
    return native::probe(path);

    #[cfg(not(feature = "native-probe"))]
    return probe_with_ffprobe(path).await;
}

#[cfg(not(feature = "native-probe"))]
async fn probe_with_ffprobe(path: &Path) -> Result<MediaInfo> {
    let ffprobe = find_tool("ffprobe")?;
    debug!("Probing {}", path.display());

    let output = tokio::process::Command::new(ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .await?;

    if !output.status.success() {
        return Err(ReelError::Probe(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let info = parse_ffprobe_json(path, &String::from_utf8_lossy(&output.stdout))?;
    debug!(
        "{}: {:.3}s {}x{} @ {:.2} fps, audio: {}",
        path.display(),
        info.duration,
        info.width,
        info.height,
        info.fps,
        info.has_audio
    );
    Ok(info)
}

/// Duration of a media file in seconds
pub async fn probe_duration(path: &Path) -> Result<f64> {
    probe_media(path).await?.require_duration()
}

#[cfg(feature = "native-probe")]
mod native {
    use super::MediaInfo;
    use crate::Result;
    use ffmpeg_next as ffmpeg;
    use log::debug;
    use std::path::Path;

    /// Read stream metadata through libav
    pub fn probe(path: &Path) -> Result<MediaInfo> {
        if let Err(e) = ffmpeg::init() {
            // Not fatal, opening the input reports the real problem
            debug!("FFmpeg init error: {:?}", e);
        }

        let input = ffmpeg::format::input(&path)?;
        let duration = if input.duration() > 0 {
            input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else {
            0.0
        };
        let has_audio = input.streams().best(ffmpeg::media::Type::Audio).is_some();

        let (width, height, fps, has_video) = match input.streams().best(ffmpeg::media::Type::Video) {
            Some(stream) => {
                let rate = stream.avg_frame_rate();
                let fps = if rate.denominator() != 0 {
                    rate.numerator() as f64 / rate.denominator() as f64
                } else {
                    0.0
                };
                let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
                let decoder = context.decoder().video()?;
                (decoder.width(), decoder.height(), fps, true)
            }
            None => (0, 0, 0.0, false),
        };

        debug!("{}: {:.3}s {}x{} via libav", path.display(), duration, width, height);
        Ok(MediaInfo {
            path: path.to_path_buf(),
            duration,
            width,
            height,
            fps,
            has_video,
            has_audio,
        })
    }
}
