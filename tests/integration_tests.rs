use reel_assembler::prelude::*;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn ffmpeg_available() -> bool {
    which::which("ffmpeg").is_ok() && which::which("ffprobe").is_ok()
}

/// Generate a short test clip with ffmpeg's lavfi sources
fn create_test_clip(dir: &Path, name: &str, seconds: f64, size: &str) -> PathBuf {
    let path = dir.join(name);
    let status = std::process::Command::new("ffmpeg")
        .args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            &format!("testsrc=duration={}:size={}:rate=30", seconds, size),
            "-pix_fmt",
            "yuv420p",
        ])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());
    path
}

fn create_test_tone(dir: &Path, name: &str, seconds: f64) -> PathBuf {
    let path = dir.join(name);
    let status = std::process::Command::new("ffmpeg")
        .args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            &format!("sine=frequency=440:duration={}", seconds),
        ])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());
    path
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("reel-assembler").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("short-form social videos"))
        .stdout(predicate::str::contains("variant"))
        .stdout(predicate::str::contains("tracker"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("reel-assembler").unwrap();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_missing_file() {
    let mut cmd = Command::cargo_bin("reel-assembler").unwrap();
    cmd.args(["probe", "nonexistent.mp4"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_invalid_fit_box() {
    let mut cmd = Command::cargo_bin("reel-assembler").unwrap();
    cmd.args(["fit", "--text", "Hello", "--width", "0", "--height", "100"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("must be greater than 0"));
}

#[test]
fn test_cli_fit_reports_size() {
    let mut cmd = Command::cargo_bin("reel-assembler").unwrap();
    cmd.args([
        "fit",
        "--text",
        "Find Cheap Flights",
        "--width",
        "600",
        "--height",
        "200",
        "--font",
        "/no/such/font.ttf",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Font size:"))
        .stdout(predicate::str::contains("Fits: true"));
}

#[test]
fn test_cli_dirs_create() {
    let temp = tempdir().unwrap();

    let mut check = Command::cargo_bin("reel-assembler").unwrap();
    check.args(["dirs", "--base-dir"]).arg(temp.path());
    check
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing"));

    let mut create = Command::cargo_bin("reel-assembler").unwrap();
    create.args(["dirs", "--create", "--base-dir"]).arg(temp.path());
    create.assert().success();

    assert!(temp
        .path()
        .join("Greece_Automation/Common_Artifacts/Intro")
        .is_dir());
    assert!(temp.path().join("Greece_Automation/3_Hector/Final").is_dir());
}

#[test]
fn test_cli_config_file() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("reel.json");
    let base = temp.path().join("workspace");
    std::fs::write(
        &config_path,
        format!(
            r#"{{ "base_directory": {:?}, "project_dir": "7_Athena" }}"#,
            base.display().to_string()
        ),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("reel-assembler").unwrap();
    cmd.args(["dirs", "--create", "--config"]).arg(&config_path);
    cmd.assert().success();
    assert!(base.join("Greece_Automation/7_Athena/Artifacts").is_dir());
}

#[test]
fn test_cli_variant_requires_workspace() {
    let temp = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("reel-assembler").unwrap();
    cmd.args(["variant", "--language", "en", "--orientation", "horizontal", "--base-dir"])
        .arg(temp.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("dirs --create"));
}

mod library_tests {
    use super::*;

    #[test]
    fn test_fit_and_reconcile_together() {
        let fit = fit_text_to_region(
            "Find Cheap Flights",
            &Font::builtin(),
            &FitRequest::new(600, 200),
        )
        .unwrap();
        assert!(fit.fits);
        assert!(fit.width <= 600 && fit.height <= 200);

        let segments: Vec<Segment<&str>> = vec![
            Segment::new("a", 4.0),
            Segment::new("b", 4.0),
            Segment::new("c", 4.0),
        ];
        let plan = reconcile_segments(&segments, 20.0).unwrap();
        assert_eq!(plan.adjustment, Adjustment::Extended { repeats: 3 });
        assert!((plan.total - 20.0).abs() <= DURATION_EPSILON);
    }

    #[test]
    fn test_tracker_row_defaults() {
        let row = SheetRow::from_pairs([
            ("Image Path", "zeus.png"),
            ("Audio Path", "zeus.mp3"),
            ("Text 1", "Zeus"),
        ]);
        let entry = VideoOverlayEntry::from_row(&row).unwrap();
        assert_eq!(entry.overlays[0].style.font_size, 50);
        assert_eq!(entry.overlays[0].horizontal_offset, 50);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(90.0), "1:30");
        assert_eq!(format_duration(3661.0), "1:01:01");
    }
}

mod media_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_video_matches_audio() {
        if !ffmpeg_available() {
            eprintln!("ffmpeg not found, skipping");
            return;
        }
        let temp = tempdir().unwrap();
        let clips = vec![
            create_test_clip(temp.path(), "a.mp4", 1.0, "320x240"),
            create_test_clip(temp.path(), "b.mp4", 1.0, "240x320"),
        ];
        let audio = create_test_tone(temp.path(), "voice.mp3", 3.0);
        let captions = temp.path().join("texts.csv");
        std::fs::write(&captions, "english_text\nFirst caption\n").unwrap();

        let job = VideoJob {
            output: temp.path().join("out.mp4"),
            frame_size: (320, 180),
            resize: ResizeBy::Width,
            audio: audio.clone(),
            caption_sheets: vec![captions],
            text_column: "english_text".to_string(),
            clips,
        };
        let settings = EncodeSettings::default();
        let output = create_video_file(
            &job,
            &FontLibrary::builtin_only(),
            &CaptionStyle::default(),
            &settings,
        )
        .await
        .unwrap();

        let info = probe_media(&output).await.unwrap();
        assert_eq!(info.dimensions(), (320, 180));
        assert!((info.duration - 3.0).abs() < 0.2, "duration {}", info.duration);
    }

    #[tokio::test]
    async fn test_audio_mix_and_concat() {
        if !ffmpeg_available() {
            eprintln!("ffmpeg not found, skipping");
            return;
        }
        let temp = tempdir().unwrap();
        let job = AudioMixJob {
            output: temp.path().join("intro.mp3"),
            music: create_test_tone(temp.path(), "music.mp3", 1.0),
            voice: create_test_tone(temp.path(), "voice.mp3", 2.0),
            music_before: 0.5,
            music_after: 0.5,
            music_volume: 0.3,
        };
        let settings = EncodeSettings::default();
        let intro = create_audio_file(&job, &settings).await.unwrap();
        let duration = probe_duration(&intro).await.unwrap();
        assert!((duration - 3.0).abs() < 0.15, "duration {}", duration);

        let joined = concatenate_audio_files(
            &[intro, temp.path().join("missing.mp3"), job.voice.clone()],
            &temp.path().join("joined.mp3"),
            0.5,
            &settings,
        )
        .await
        .unwrap();
        let duration = probe_duration(&joined).await.unwrap();
        assert!((duration - 5.5).abs() < 0.2, "duration {}", duration);
    }
}
