use std::{fmt, ops::RangeInclusive, str::FromStr};

use serde::Serialize;

pub const IMAGE_SCALE_RANGE: RangeInclusive<f32> = 0.1..=1.0;
pub const IMAGE_QUALITY_RANGE: RangeInclusive<u8> = 10..=100;
pub const VIDEO_CRF_RANGE: RangeInclusive<u8> = 18..=35;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OptionsError {
    #[error("image scale {0} is outside 0.1..=1.0")]
    ImageScale(f32),
    #[error("image quality {0} is outside 10..=100")]
    ImageQuality(u8),
    #[error("video CRF {0} is outside 18..=35")]
    VideoCrf(u8),
    #[error("unknown video preset '{0}'")]
    UnknownPreset(String),
}

/// x264 speed / compression trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    #[default]
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl Preset {
    pub const ALL: [Preset; 9] = [
        Preset::Ultrafast,
        Preset::Superfast,
        Preset::Veryfast,
        Preset::Faster,
        Preset::Fast,
        Preset::Medium,
        Preset::Slow,
        Preset::Slower,
        Preset::Veryslow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Ultrafast => "ultrafast",
            Preset::Superfast => "superfast",
            Preset::Veryfast => "veryfast",
            Preset::Faster => "faster",
            Preset::Fast => "fast",
            Preset::Medium => "medium",
            Preset::Slow => "slow",
            Preset::Slower => "slower",
            Preset::Veryslow => "veryslow",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| OptionsError::UnknownPreset(s.to_string()))
    }
}

/// 1.5 GiB
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 1536 * 1024 * 1024;

/// Parameters for one compression run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressOptions {
    /// Factor applied to both image dimensions.
    pub image_scale: f32,
    /// JPEG quality.
    pub image_quality: u8,
    pub video_crf: u8,
    pub video_preset: Preset,
    /// false = leave video entries untouched
    pub compress_video: bool,
    /// Media entries larger than this uncompressed are copied unchanged.
    #[serde(skip)]
    pub max_entry_size: u64,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            image_scale: 0.5,
            image_quality: 70,
            video_crf: 28,
            video_preset: Preset::Medium,
            compress_video: true,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
        }
    }
}

impl CompressOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        // NaN fails `contains`, so it is rejected here as well.
        if !IMAGE_SCALE_RANGE.contains(&self.image_scale) {
            return Err(OptionsError::ImageScale(self.image_scale));
        }
        if !IMAGE_QUALITY_RANGE.contains(&self.image_quality) {
            return Err(OptionsError::ImageQuality(self.image_quality));
        }
        if !VIDEO_CRF_RANGE.contains(&self.video_crf) {
            return Err(OptionsError::VideoCrf(self.video_crf));
        }
        Ok(())
    }
}
