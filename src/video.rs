//! ffmpeg plumbing: streaming still frames into an encoder, attaching audio,
//! and re-muxing narrated videos.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::error::{Error, Result, ResultExt};
use crate::utils::partial_path;

/// How the narration track is fed to ffmpeg and how long the output runs.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPlan {
    pub path: PathBuf,
    /// Repeat the audio input until `duration` is reached.
    pub loop_input: bool,
    /// Append silence until `duration` is reached.
    pub pad_silence: bool,
    /// Output length in seconds.
    pub duration: f64,
}

/// A still frame held on screen for `frames` frames.
pub struct StillSegment {
    pub frame: RgbImage,
    pub frames: u64,
}

pub struct EncodeJob<'a> {
    pub segments: &'a [StillSegment],
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio: Option<&'a AudioPlan>,
    pub output: &'a Path,
}

/// Long-form mux plan: the audio is authoritative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NarrationPlan {
    pub loop_video: bool,
    pub duration: f64,
}

pub fn plan_narration(video_duration: f64, audio_duration: f64) -> NarrationPlan {
    NarrationPlan {
        loop_video: video_duration < audio_duration,
        duration: audio_duration,
    }
}

pub trait VideoEncoder: Send + Sync {
    /// Encodes the segments in order, writing the finished file to `job.output`.
    fn encode(&self, job: &EncodeJob<'_>) -> Result<()>;

    /// Replaces the audio of `video` with `audio`, fitting the picture to the
    /// audio length.
    fn narrate(&self, video: &Path, audio: &Path, plan: &NarrationPlan, output: &Path)
    -> Result<()>;

    fn video_duration(&self, video: &Path) -> Result<f64>;
}

fn secs(value: f64) -> String {
    format!("{value:.3}")
}

pub fn ffmpeg_reel_args(
    width: u32,
    height: u32,
    fps: u32,
    codec: &str,
    audio: Option<&AudioPlan>,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{width}x{height}"));
    args.extend(["-r".to_string(), fps.to_string(), "-i".into(), "pipe:0".into()]);

    if let Some(plan) = audio {
        if plan.loop_input {
            args.extend(["-stream_loop".into(), "-1".into()]);
        }
        args.extend(["-i".into(), plan.path.display().to_string()]);
        args.extend(["-map".into(), "0:v:0".into(), "-map".into(), "1:a:0".into()]);
    }

    args.extend([
        "-c:v".into(),
        codec.to_string(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]);

    if let Some(plan) = audio {
        args.extend(["-c:a".into(), "aac".into()]);
        if plan.pad_silence {
            args.extend(["-af".into(), "apad".into()]);
        }
        args.extend(["-t".into(), secs(plan.duration)]);
    }

    args.push(output.display().to_string());
    args
}

pub fn ffmpeg_narration_args(
    video: &Path,
    audio: &Path,
    plan: &NarrationPlan,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into(), "-loglevel".into(), "error".into()];
    if plan.loop_video {
        args.extend(["-stream_loop".into(), "-1".into()]);
    }
    args.extend(["-i".into(), video.display().to_string()]);
    args.extend(["-i".into(), audio.display().to_string()]);
    args.extend([
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-t".into(),
        secs(plan.duration),
    ]);
    args.push(output.display().to_string());
    args
}

/// Drives the `ffmpeg` and `ffprobe` binaries.
pub struct FfmpegEncoder {
    codec: String,
}

impl FfmpegEncoder {
    pub fn new(codec: &str) -> Self {
        FfmpegEncoder {
            codec: codec.to_string(),
        }
    }

    fn check_ffmpeg_available(&self) -> Result<()> {
        match Command::new("ffmpeg").arg("-version").output() {
            Ok(_) => Ok(()),
            Err(_) => Err(Error::Composition(
                "FFmpeg not found! Please install FFmpeg:\n\
                Fedora: sudo dnf install ffmpeg\n\
                Ubuntu: sudo apt install ffmpeg\n\
                macOS: brew install ffmpeg"
                    .to_string(),
            )),
        }
    }

    fn best_available_encoder(&self) -> Result<String> {
        let output = Command::new("ffmpeg")
            .arg("-encoders")
            .output()
            .composition("ffmpeg -encoders")?;
        let encoders_output = String::from_utf8_lossy(&output.stdout);

        let mut preferred = vec![self.codec.as_str()];
        for fallback in ["libx264", "mpeg4", "mpeg2video"] {
            if !preferred.contains(&fallback) {
                preferred.push(fallback);
            }
        }

        preferred
            .into_iter()
            .find(|encoder| encoders_output.contains(encoder))
            .map(|encoder| {
                debug!("Using video encoder: {}", encoder);
                encoder.to_string()
            })
            .ok_or_else(|| Error::Composition("No suitable video encoder found".to_string()))
    }

    fn stream(&self, job: &EncodeJob<'_>, target: &Path) -> Result<()> {
        let codec = self.best_available_encoder()?;
        let args = ffmpeg_reel_args(job.width, job.height, job.fps, &codec, job.audio, target);

        let mut ffmpeg_cmd = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .composition("failed to start ffmpeg")?;

        let stdin = ffmpeg_cmd
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Composition("Failed to open FFmpeg stdin".to_string()))?;

        let total: u64 = job.segments.iter().map(|s| s.frames).sum();
        let mut written = 0u64;
        'segments: for segment in job.segments {
            let raw_bytes = segment.frame.as_raw();
            for _ in 0..segment.frames {
                if let Err(e) = stdin.write_all(raw_bytes) {
                    // ffmpeg stops reading once `-t` is satisfied.
                    if e.kind() == std::io::ErrorKind::BrokenPipe {
                        debug!("ffmpeg closed its input after {}/{} frames", written, total);
                        break 'segments;
                    }
                    let _ = ffmpeg_cmd.kill();
                    let output = ffmpeg_cmd.wait_with_output()?;
                    return Err(Error::Composition(format!(
                        "FFmpeg write failed: {}\nFFmpeg error: {}",
                        e,
                        String::from_utf8_lossy(&output.stderr)
                    )));
                }
                written += 1;
            }
            debug!("Streamed {}/{} frames", written, total);
        }

        drop(ffmpeg_cmd.stdin.take());
        let output = ffmpeg_cmd.wait_with_output()?;
        if !output.status.success() {
            return Err(Error::Composition(format!(
                "FFmpeg failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Runs `produce` against a scratch path and moves it into place on success.
pub(crate) fn write_atomically(output: &Path, produce: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let scratch = partial_path(output);
    let finished = produce(&scratch).and_then(|()| std::fs::rename(&scratch, output).map_err(Error::from));
    if let Err(e) = finished {
        warn!("Discarding unfinished {}", output.display());
        let _ = std::fs::remove_file(&scratch);
        return Err(e);
    }
    Ok(())
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, job: &EncodeJob<'_>) -> Result<()> {
        self.check_ffmpeg_available()?;
        info!("🎬 Streaming frames to FFmpeg...");
        write_atomically(job.output, |scratch| self.stream(job, scratch))
    }

    fn narrate(
        &self,
        video: &Path,
        audio: &Path,
        plan: &NarrationPlan,
        output: &Path,
    ) -> Result<()> {
        self.check_ffmpeg_available()?;
        write_atomically(output, |scratch| {
            let result = Command::new("ffmpeg")
                .args(ffmpeg_narration_args(video, audio, plan, scratch))
                .output()
                .composition("failed to run ffmpeg")?;
            if !result.status.success() {
                return Err(Error::Composition(format!(
                    "FFmpeg failed: {}",
                    String::from_utf8_lossy(&result.stderr).trim()
                )));
            }
            Ok(())
        })
    }

    fn video_duration(&self, video: &Path) -> Result<f64> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(video)
            .output()
            .composition("failed to run ffprobe")?;
        if !output.status.success() {
            return Err(Error::Composition(format!(
                "ffprobe failed on {}: {}",
                video.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .composition("unreadable ffprobe duration")
    }
}
