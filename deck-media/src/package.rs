//! Presentation archive rewriting.
//!
//! A `.pptx` is a zip of XML parts plus binary media under `ppt/media/`. The
//! archive is walked in its stored order; media entries are recompressed and
//! everything else is raw-copied so its compressed bytes stay untouched.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, Write},
    path::Path,
};

use anyhow::Context;
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::{
    options::CompressOptions,
    raster::{self, ImageOutcome},
    report::CompressReport,
    video::{self, Transcoder, VideoOutcome},
};

pub const MEDIA_PREFIX: &str = "ppt/media/";
const REQUIRED_PARTS: [&str; 2] = ["[Content_Types].xml", "ppt/presentation.xml"];

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("not a presentation archive: {0}")]
    NotAPresentation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Image,
    Video,
}

fn media_kind(name: &str) -> Option<MediaKind> {
    if !name.starts_with(MEDIA_PREFIX) {
        return None;
    }
    let ext = Path::new(name).extension()?.to_str()?;
    if raster::is_image_extension(ext) {
        Some(MediaKind::Image)
    } else if video::is_video_extension(ext) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Writes a recompressed copy of `input` to `output`. `input` is never modified.
pub fn compress_presentation(
    input: &Path,
    output: &Path,
    options: &CompressOptions,
    transcoder: &Transcoder,
) -> anyhow::Result<CompressReport> {
    options.validate()?;
    if input == output {
        anyhow::bail!("output path must differ from input {}", input.display());
    }

    let file = File::open(input).with_context(|| format!("open {}", input.display()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| PackageError::NotAPresentation(e.to_string()))?;
    for part in REQUIRED_PARTS {
        if archive.index_for_name(part).is_none() {
            return Err(PackageError::NotAPresentation(format!("missing {}", part)).into());
        }
    }

    let scratch = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let out_file = File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut writer = ZipWriter::new(BufWriter::new(out_file));

    let mut report = CompressReport::default();
    let result = rewrite_entries(&mut archive, &mut writer, options, transcoder, scratch, &mut report)
        .and_then(|()| {
            let mut inner = writer.finish().context("finish archive")?;
            inner.flush().context("flush archive")?;
            Ok(())
        });
    if let Err(e) = result {
        let _ = std::fs::remove_file(output);
        return Err(e);
    }

    report.original_size = std::fs::metadata(input)?.len();
    report.compressed_size = std::fs::metadata(output)?.len();
    report.log_summary();
    Ok(report)
}

fn rewrite_entries<R: Read + Seek, W: Write + Seek>(
    archive: &mut ZipArchive<R>,
    writer: &mut ZipWriter<W>,
    options: &CompressOptions,
    transcoder: &Transcoder,
    scratch: &Path,
    report: &mut CompressReport,
) -> anyhow::Result<()> {
    // Probed on the first video only.
    let mut transcoder_ready: Option<bool> = None;

    for index in 0..archive.len() {
        let (name, is_dir, stored_size) = {
            let entry = archive.by_index_raw(index)?;
            (entry.name().to_string(), entry.is_dir(), entry.compressed_size())
        };

        let kind = if is_dir { None } else { media_kind(&name) };
        let Some(kind) = kind else {
            writer.raw_copy_file(archive.by_index_raw(index)?)?;
            continue;
        };

        if kind == MediaKind::Video {
            let ready = *transcoder_ready.get_or_insert_with(|| {
                if !options.compress_video {
                    return false;
                }
                let available = transcoder.is_available();
                if !available {
                    log::warn!(
                        "{} is not available, videos are copied unchanged",
                        transcoder.program().display()
                    );
                }
                available
            });
            if !ready {
                report.videos.record(stored_size, stored_size, false);
                writer.raw_copy_file(archive.by_index_raw(index)?)?;
                continue;
            }
        }

        // The declared size comes from the upload, so it only bounds the read.
        let data = match read_media(archive, index, options.max_entry_size) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("{} copied unchanged: {:#}", name, e);
                match kind {
                    MediaKind::Image => report.images.record_failure(stored_size),
                    MediaKind::Video => report.videos.record_failure(stored_size),
                }
                writer.raw_copy_file(archive.by_index_raw(index)?)?;
                continue;
            }
        };

        let replacement = match kind {
            MediaKind::Image => recompress_image(&name, &data, options, report),
            MediaKind::Video => recompress_video(&name, &data, options, transcoder, scratch, report),
        };

        match replacement {
            Some(bytes) => {
                let options = SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .large_file(bytes.len() as u64 >= u32::MAX as u64);
                writer.start_file(name.as_str(), options)?;
                writer.write_all(&bytes)?;
            }
            None => writer.raw_copy_file(archive.by_index_raw(index)?)?,
        }
    }
    Ok(())
}

/// Reads one entry, refusing anything over `limit` bytes declared or actual.
fn read_media<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    limit: u64,
) -> anyhow::Result<Vec<u8>> {
    let entry = archive.by_index(index)?;
    if entry.size() > limit {
        anyhow::bail!("declared size {} exceeds limit {}", entry.size(), limit);
    }
    let mut data = Vec::new();
    entry
        .take(limit.saturating_add(1))
        .read_to_end(&mut data)
        .context("read entry")?;
    if data.len() as u64 > limit {
        anyhow::bail!("entry exceeds limit {}", limit);
    }
    Ok(data)
}

fn recompress_image(
    name: &str,
    data: &[u8],
    options: &CompressOptions,
    report: &mut CompressReport,
) -> Option<Vec<u8>> {
    let before = data.len() as u64;
    match raster::compress_image(data, options.image_scale, options.image_quality) {
        Ok(ImageOutcome::Replaced { data, from, to }) => {
            log::info!(
                "compressed {}: {}x{} -> {}x{}, {} -> {} bytes",
                name,
                from.0,
                from.1,
                to.0,
                to.1,
                before,
                data.len()
            );
            report.images.record(before, data.len() as u64, true);
            Some(data)
        }
        Ok(ImageOutcome::Kept(reason)) => {
            log::debug!("kept {} unchanged: {:?}", name, reason);
            report.images.record(before, before, false);
            None
        }
        Err(e) => {
            log::warn!("error compressing {}: {:#}", name, e);
            report.images.record_failure(before);
            None
        }
    }
}

fn recompress_video(
    name: &str,
    data: &[u8],
    options: &CompressOptions,
    transcoder: &Transcoder,
    scratch: &Path,
    report: &mut CompressReport,
) -> Option<Vec<u8>> {
    let before = data.len() as u64;
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    log::info!("compressing video {}", name);
    match video::compress_video(transcoder, data, ext, options, scratch) {
        Ok(VideoOutcome::Replaced(encoded)) => {
            log::info!("compressed {}: {} -> {} bytes", name, before, encoded.len());
            report.videos.record(before, encoded.len() as u64, true);
            Some(encoded)
        }
        Ok(outcome) => {
            log::debug!("kept {} unchanged: {:?}", name, outcome);
            report.videos.record(before, before, false);
            None
        }
        Err(e) => {
            log::warn!("error compressing {}: {:#}", name, e);
            report.videos.record_failure(before);
            None
        }
    }
}
