use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use deck_media::{CompressOptions, Preset};

/// 1.5 GiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1536 * 1024 * 1024;
pub const DEFAULT_FILE_TTL_SECS: u64 = 3600;

#[derive(Parser, Debug)]
#[command(
    name = "pptx-squeeze",
    version,
    about = "Shrink PowerPoint files by recompressing their images and videos"
)]
pub struct Cli {
    #[command(flatten)]
    pub server: ServerArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress one presentation and exit instead of serving the web form
    Compress(CompressArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    #[arg(long, env = "SQUEEZE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory holding per-request job directories [default: <tmp>/pptx-squeeze]
    #[arg(long, env = "SQUEEZE_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Largest accepted upload in bytes
    #[arg(long, env = "SQUEEZE_MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    pub max_file_size: u64,

    /// Key required by GET /cleanup; the route is disabled without one
    #[arg(long, env = "CLEANUP_KEY")]
    pub cleanup_key: Option<String>,

    /// Job directories older than this are removed
    #[arg(long, env = "SQUEEZE_FILE_TTL_SECS", default_value_t = DEFAULT_FILE_TTL_SECS)]
    pub file_ttl_secs: u64,

    /// ffmpeg executable used for video transcoding
    #[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,
}

#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Path to the .pptx file
    pub input: PathBuf,

    /// Where to write the result [default: compressed_<name> next to the input]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Scale factor for image dimensions (0.5 = 50% of original)
    #[arg(long, default_value_t = 0.5)]
    pub image_scale: f32,

    /// JPEG quality (10-100)
    #[arg(long, default_value_t = 70)]
    pub image_quality: u8,

    /// Constant Rate Factor for video (18-35, higher = smaller)
    #[arg(long, default_value_t = 28)]
    pub video_crf: u8,

    /// Encoder preset (speed vs compression efficiency)
    #[arg(long, default_value = "medium")]
    pub video_preset: Preset,

    /// Leave embedded videos untouched
    #[arg(long)]
    pub skip_video: bool,
}

impl CompressArgs {
    pub fn options(&self) -> CompressOptions {
        CompressOptions {
            image_scale: self.image_scale,
            image_quality: self.image_quality,
            video_crf: self.video_crf,
            video_preset: self.video_preset,
            compress_video: !self.skip_video,
            ..CompressOptions::default()
        }
    }

    pub fn output_path(&self) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        let name = self
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "presentation.pptx".to_string());
        self.input.with_file_name(format!("compressed_{}", name))
    }
}

#[derive(Debug, Clone)]
pub struct SqueezeConfig {
    bind_addr: String,
    work_dir: PathBuf,
    max_file_size: u64,
    cleanup_key: Option<String>,
    file_ttl: Duration,
    ffmpeg: PathBuf,
}

impl SqueezeConfig {
    #[cfg(test)]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            work_dir: work_dir.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            cleanup_key: None,
            file_ttl: Duration::from_secs(DEFAULT_FILE_TTL_SECS),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }

    #[cfg(test)]
    pub fn with_bind_addr(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    #[cfg(test)]
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    #[cfg(test)]
    pub fn with_cleanup_key(mut self, key: &str) -> Self {
        self.cleanup_key = Some(key.to_string());
        self
    }

    #[cfg(test)]
    pub fn with_file_ttl(mut self, ttl: Duration) -> Self {
        self.file_ttl = ttl;
        self
    }

    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn cleanup_key(&self) -> Option<&str> {
        self.cleanup_key.as_deref()
    }

    pub fn file_ttl(&self) -> Duration {
        self.file_ttl
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }
}

impl From<&ServerArgs> for SqueezeConfig {
    fn from(args: &ServerArgs) -> Self {
        let work_dir = args
            .work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("pptx-squeeze"));
        Self {
            bind_addr: format!("{}:{}", args.host, args.port),
            work_dir,
            max_file_size: args.max_file_size,
            cleanup_key: args.cleanup_key.clone().filter(|k| !k.is_empty()),
            file_ttl: Duration::from_secs(args.file_ttl_secs),
            ffmpeg: args.ffmpeg.clone(),
        }
    }
}
