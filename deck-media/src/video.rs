//! Video recompression through an external `ffmpeg` binary.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::Context;

use crate::options::{CompressOptions, Preset};

pub const VIDEO_EXTENSIONS: [&str; 8] = ["mp4", "m4v", "mov", "mkv", "avi", "flv", "webm", "wmv"];

/// Lines of ffmpeg stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 8;

pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// Encoder family chosen from the container extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoTarget {
    /// libx264 + aac, mp4 family gets `+faststart`
    H264 { faststart: bool },
    /// libvpx-vp9 + libopus
    Vp9,
}

impl VideoTarget {
    pub fn for_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "m4v" | "mov" => Some(VideoTarget::H264 { faststart: true }),
            "mkv" | "avi" | "flv" => Some(VideoTarget::H264 { faststart: false }),
            "webm" => Some(VideoTarget::Vp9),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum VideoOutcome {
    Replaced(Vec<u8>),
    NotSmaller,
    /// No encoder mapping for this container.
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Transcoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// True when `<program> -version` runs and exits successfully.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    pub fn arguments(
        input: &Path,
        output: &Path,
        target: VideoTarget,
        crf: u8,
        preset: Preset,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
        match target {
            VideoTarget::H264 { faststart } => {
                args.extend(
                    [
                        "-c:v",
                        "libx264",
                        "-crf",
                        crf.to_string().as_str(),
                        "-preset",
                        preset.as_str(),
                        "-c:a",
                        "aac",
                        "-b:a",
                        "128k",
                    ]
                    .map(OsString::from),
                );
                if faststart {
                    args.extend(["-movflags", "+faststart"].map(OsString::from));
                }
            }
            VideoTarget::Vp9 => {
                args.extend(
                    [
                        "-c:v",
                        "libvpx-vp9",
                        "-crf",
                        crf.to_string().as_str(),
                        "-b:v",
                        "0",
                        "-c:a",
                        "libopus",
                    ]
                    .map(OsString::from),
                );
            }
        }
        args.push(output.into());
        args
    }

    pub fn transcode(
        &self,
        input: &Path,
        output: &Path,
        target: VideoTarget,
        crf: u8,
        preset: Preset,
    ) -> anyhow::Result<()> {
        log::debug!("ffmpeg: {} -> {} ({:?})", input.display(), output.display(), target);
        let result = Command::new(&self.program)
            .args(Self::arguments(input, output, target, crf, preset))
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to run {}", self.program.display()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            anyhow::bail!("ffmpeg exited with {}: {}", result.status, tail);
        }
        Ok(())
    }
}

/// Transcodes one video entry through files in `scratch`.
pub fn compress_video(
    transcoder: &Transcoder,
    data: &[u8],
    ext: &str,
    options: &CompressOptions,
    scratch: &Path,
) -> anyhow::Result<VideoOutcome> {
    let Some(target) = VideoTarget::for_extension(ext) else {
        return Ok(VideoOutcome::Unsupported);
    };

    let dir = tempfile::Builder::new()
        .prefix("video-")
        .tempdir_in(scratch)
        .context("create video scratch dir")?;
    let ext = ext.to_ascii_lowercase();
    let input = dir.path().join(format!("input.{}", ext));
    let output = dir.path().join(format!("output.{}", ext));
    std::fs::write(&input, data).with_context(|| format!("write {}", input.display()))?;

    transcoder.transcode(&input, &output, target, options.video_crf, options.video_preset)?;

    let encoded = std::fs::read(&output).with_context(|| format!("read {}", output.display()))?;
    if encoded.is_empty() || encoded.len() >= data.len() {
        return Ok(VideoOutcome::NotSmaller);
    }
    Ok(VideoOutcome::Replaced(encoded))
}
