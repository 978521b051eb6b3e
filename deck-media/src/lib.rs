//! Media recompression for presentation archives.
//!
//! Images are handled in-process through `image` / `jpeg-encoder`, videos are
//! handed to an external `ffmpeg` binary, and the zip container is rewritten
//! entry by entry.

pub mod options;
pub mod package;
pub mod raster;
pub mod report;
pub mod video;

#[cfg(test)]
mod package_test;

pub use options::{CompressOptions, OptionsError, Preset};
pub use package::{PackageError, compress_presentation};
pub use report::{CompressReport, MediaTally, format_size};
pub use video::Transcoder;
