//! ffmpeg invocation: argument building and process execution.

use crate::probe::find_tool;
use crate::{ReelError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lines of ffmpeg stderr kept in an encoder error
const STDERR_TAIL_LINES: usize = 20;

/// Output encoding parameters shared by every render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    /// Encoder thread hint
    pub threads: u32,
    pub audio_rate: u32,
    /// Move the moov atom to the front of MP4 outputs
    pub faststart: bool,
    pub mp3_codec: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "ultrafast".to_string(),
            video_bitrate: "20000k".to_string(),
            audio_bitrate: "192k".to_string(),
            threads: 4,
            audio_rate: 44100,
            faststart: true,
            mp3_codec: "libmp3lame".to_string(),
        }
    }
}

impl EncodeSettings {
    /// H.264/AAC output arguments for MP4 files
    pub fn video_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-b:v".to_string(),
            self.video_bitrate.clone(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-threads".to_string(),
            self.threads.to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-ar".to_string(),
            self.audio_rate.to_string(),
        ];
        if self.faststart {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }
        args
    }

    /// MP3 output arguments
    pub fn mp3_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.mp3_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-ar".to_string(),
            self.audio_rate.to_string(),
        ]
    }
}

/// Seconds with microsecond precision, as ffmpeg expects them
pub fn format_time(seconds: f64) -> String {
    format!("{:.6}", seconds)
}

/// One ffmpeg invocation: inputs, a filter graph, stream maps and an output
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<Vec<String>>,
    filters: Vec<String>,
    maps: Vec<String>,
    output_args: Vec<String>,
    output: PathBuf,
}

impl FfmpegCommand {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            inputs: Vec::new(),
            filters: Vec::new(),
            maps: Vec::new(),
            output_args: Vec::new(),
            output: output.into(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Add a file input; returns its input index
    pub fn input(&mut self, path: &Path) -> usize {
        self.input_with::<&str>(&[], path)
    }

    /// Add a file input preceded by input options (`-t`, `-stream_loop`, ...)
    pub fn input_with<S: AsRef<str>>(&mut self, options: &[S], path: &Path) -> usize {
        let mut args: Vec<String> = options.iter().map(|o| o.as_ref().to_string()).collect();
        args.push("-i".to_string());
        args.push(path.to_string_lossy().into_owned());
        self.inputs.push(args);
        self.inputs.len() - 1
    }

    /// Add a lavfi source such as `anullsrc=r=44100:cl=stereo`
    pub fn lavfi(&mut self, source: &str) -> usize {
        self.inputs.push(vec![
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            source.to_string(),
        ]);
        self.inputs.len() - 1
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Append one filter chain to the filter graph
    pub fn filter(&mut self, chain: impl Into<String>) -> &mut Self {
        self.filters.push(chain.into());
        self
    }

    /// Map a filter label (`outv`) or stream specifier (`0:a`) to the output
    pub fn map(&mut self, stream: &str) -> &mut Self {
        let specifier = if stream.contains(':') || stream.starts_with('[') {
            stream.to_string()
        } else {
            format!("[{}]", stream)
        };
        self.maps.push(specifier);
        self
    }

    pub fn output_arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<S: AsRef<str>>(&mut self, args: &[S]) -> &mut Self {
        self.output_args
            .extend(args.iter().map(|a| a.as_ref().to_string()));
        self
    }

    /// Full argument list, without the program name
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for input in &self.inputs {
            args.extend(input.iter().cloned());
        }
        if !self.filters.is_empty() {
            args.push("-filter_complex".to_string());
            args.push(self.filters.join(";"));
        }
        for map in &self.maps {
            args.push("-map".to_string());
            args.push(map.clone());
        }
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }

    /// Run ffmpeg and wait for it. A non-zero exit becomes [`ReelError::Encoder`].
    pub async fn run(&self) -> Result<()> {
        let ffmpeg = find_tool("ffmpeg")?;
        let args = self.to_args();
        debug!("ffmpeg {}", args.join(" "));
        info!("Encoding {}", self.output.display());

        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let output = tokio::process::Command::new(&ffmpeg)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(ReelError::Encoder {
                program: ffmpeg.display().to_string(),
                status: output.status.to_string(),
                stderr: tail,
            });
        }

        debug!("Finished {}", self.output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_argument_order() {
        let mut cmd = FfmpegCommand::new("/out/final.mp4");
        let clip = cmd.input_with(&["-t", "3.000000"], Path::new("/in/a.mp4"));
        let silence = cmd.lavfi("anullsrc=r=44100:cl=stereo");
        assert_eq!((clip, silence), (0, 1));

        cmd.filter("[0:v]scale=1920:-2[v0]")
            .filter("[v0]null[outv]")
            .map("outv")
            .map("1:a")
            .output_args(&["-t", "3.000000"]);

        let args = cmd.to_args();
        assert_eq!(&args[..4], &["-y", "-hide_banner", "-loglevel", "error"]);
        let joined = args.join(" ");
        assert!(joined.contains("-t 3.000000 -i /in/a.mp4 -f lavfi -i anullsrc=r=44100:cl=stereo"));
        assert!(joined.contains("-filter_complex [0:v]scale=1920:-2[v0];[v0]null[outv]"));
        assert!(joined.contains("-map [outv] -map 1:a"));
        assert_eq!(args.last().map(String::as_str), Some("/out/final.mp4"));
    }

    #[test]
    fn test_plain_input_has_no_options() {
        let mut cmd = FfmpegCommand::new("/out/voice.mp3");
        assert_eq!(cmd.input(Path::new("/in/voice.mp3")), 0);
        assert_eq!(cmd.input(Path::new("/in/music.mp3")), 1);
        let joined = cmd.to_args().join(" ");
        assert!(joined.contains("error -i /in/voice.mp3 -i /in/music.mp3"));
    }

    #[test]
    fn test_video_args_defaults() {
        let args = EncodeSettings::default().video_args().join(" ");
        assert!(args.contains("-c:v libx264"));
        assert!(args.contains("-preset ultrafast"));
        assert!(args.contains("-b:v 20000k"));
        assert!(args.contains("-threads 4"));
        assert!(args.contains("-ar 44100"));
        assert!(args.ends_with("-movflags +faststart"));

        let no_faststart = EncodeSettings {
            faststart: false,
            ..EncodeSettings::default()
        };
        assert!(!no_faststart.video_args().contains(&"-movflags".to_string()));
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(1.5), "1.500000");
        assert_eq!(format_time(0.0), "0.000000");
    }
}
