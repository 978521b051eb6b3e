use std::{
    io::{Cursor, Read, Write},
    path::{Path, PathBuf},
    process::Command,
};

use image::ImageReader;
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::{
    options::CompressOptions,
    package::{PackageError, compress_presentation},
    raster::tests::{gif_bytes, jpeg_bytes, png_bytes},
    video::Transcoder,
};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="jpeg" ContentType="image/jpeg"/><Default Extension="png" ContentType="image/png"/><Default Extension="mp4" ContentType="video/mp4"/></Types>"#;
const PRESENTATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"/>"#;
const SLIDE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"/>"#;

fn missing_transcoder() -> Transcoder {
    Transcoder::new("/nonexistent/ffmpeg-binary")
}

fn write_archive(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ZipWriter::new(file);
    for (name, data) in entries {
        let method = if name.starts_with("ppt/media/") {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        writer
            .start_file(*name, SimpleFileOptions::default().compression_method(method))
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

fn presentation_entries(media: Vec<(&'static str, Vec<u8>)>) -> Vec<(&'static str, Vec<u8>)> {
    let mut entries = vec![
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes().to_vec()),
        ("ppt/presentation.xml", PRESENTATION.as_bytes().to_vec()),
        ("ppt/slides/slide1.xml", SLIDE.as_bytes().to_vec()),
    ];
    entries.extend(media);
    entries
}

fn read_archive(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (entry.name().to_string(), data)
        })
        .collect()
}

fn dimensions(data: &[u8]) -> (u32, u32) {
    let image = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .unwrap()
        .decode()
        .unwrap();
    (image.width(), image.height())
}

fn fixture(dir: &Path, media: Vec<(&'static str, Vec<u8>)>) -> (PathBuf, PathBuf) {
    let input = dir.join("deck.pptx");
    let output = dir.join("compressed_deck.pptx");
    write_archive(&input, &presentation_entries(media));
    (input, output)
}

#[test]
fn test_images_recompressed_and_parts_preserved() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let jpeg = jpeg_bytes(400, 300);
    let png = png_bytes(200, 100);
    let (input, output) = fixture(
        dir.path(),
        vec![
            ("ppt/media/image1.jpeg", jpeg.clone()),
            ("ppt/media/image2.png", png.clone()),
        ],
    );
    let input_before = std::fs::read(&input)?;

    let report = compress_presentation(
        &input,
        &output,
        &CompressOptions::default(),
        &missing_transcoder(),
    )?;

    assert_eq!(std::fs::read(&input)?, input_before);

    let original = read_archive(&input);
    let compressed = read_archive(&output);
    let original_names: Vec<&String> = original.iter().map(|(n, _)| n).collect();
    let compressed_names: Vec<&String> = compressed.iter().map(|(n, _)| n).collect();
    assert_eq!(original_names, compressed_names);

    for ((name, before), (_, after)) in original.iter().zip(compressed.iter()) {
        if name.ends_with(".xml") {
            assert_eq!(before, after, "{} changed", name);
        }
    }

    let image1 = &compressed[3].1;
    assert_eq!(dimensions(image1), (200, 150));
    assert!(image1.len() < jpeg.len());
    assert_eq!(dimensions(&compressed[4].1), (100, 50));

    assert_eq!(report.images.found, 2);
    assert_eq!(report.images.recompressed, 2);
    assert_eq!(report.images.failed, 0);
    assert_eq!(report.videos.found, 0);
    assert!(report.compressed_size < report.original_size);
    assert_eq!(report.original_size, input_before.len() as u64);
    Ok(())
}

#[test]
fn test_lower_quality_gives_smaller_archive() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (input, _) = fixture(dir.path(), vec![("ppt/media/image1.jpeg", jpeg_bytes(640, 480))]);

    let mut sizes = Vec::new();
    for quality in [90u8, 50, 20] {
        let output = dir.path().join(format!("q{}.pptx", quality));
        let options = CompressOptions {
            image_scale: 1.0,
            image_quality: quality,
            ..Default::default()
        };
        let report = compress_presentation(&input, &output, &options, &missing_transcoder())?;
        sizes.push(report.compressed_size);
    }
    assert!(sizes[0] >= sizes[1]);
    assert!(sizes[1] >= sizes[2]);
    Ok(())
}

#[test]
fn test_videos_copied_without_transcoder() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let video = b"\x00\x00\x00\x18ftypmp42 pretend video payload".to_vec();
    let (input, output) = fixture(dir.path(), vec![("ppt/media/media1.mp4", video.clone())]);

    let report = compress_presentation(
        &input,
        &output,
        &CompressOptions::default(),
        &missing_transcoder(),
    )?;

    let compressed = read_archive(&output);
    assert_eq!(compressed[3].0, "ppt/media/media1.mp4");
    assert_eq!(compressed[3].1, video);
    assert_eq!(report.videos.found, 1);
    assert_eq!(report.videos.kept, 1);
    assert_eq!(report.videos.failed, 0);
    Ok(())
}

#[test]
fn test_video_skipped_when_disabled() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let video = b"webm bytes".to_vec();
    let (input, output) = fixture(dir.path(), vec![("ppt/media/media1.webm", video.clone())]);
    let options = CompressOptions {
        compress_video: false,
        ..Default::default()
    };

    let report = compress_presentation(&input, &output, &options, &Transcoder::default())?;
    assert_eq!(read_archive(&output)[3].1, video);
    assert_eq!(report.videos.kept, 1);
    Ok(())
}

#[test]
fn test_broken_image_kept() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let broken = b"\x89PNG\r\n\x1a\ntruncated".to_vec();
    let (input, output) = fixture(
        dir.path(),
        vec![
            ("ppt/media/image1.png", broken.clone()),
            ("ppt/media/image2.jpeg", jpeg_bytes(300, 200)),
        ],
    );

    let report = compress_presentation(
        &input,
        &output,
        &CompressOptions::default(),
        &missing_transcoder(),
    )?;

    let compressed = read_archive(&output);
    assert_eq!(compressed[3].1, broken);
    assert_eq!(dimensions(&compressed[4].1), (150, 100));
    assert_eq!(report.images.failed, 1);
    assert_eq!(report.images.recompressed, 1);
    Ok(())
}

#[test]
fn test_animated_gif_untouched() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let animated = gif_bytes(120, 80, 2);
    let (input, output) = fixture(dir.path(), vec![("ppt/media/image1.gif", animated.clone())]);

    let report = compress_presentation(
        &input,
        &output,
        &CompressOptions::default(),
        &missing_transcoder(),
    )?;

    assert_eq!(read_archive(&output)[3].1, animated);
    assert_eq!(report.images.kept, 1);
    assert_eq!(report.images.recompressed, 0);
    Ok(())
}

/// Rewrites the uncompressed size the central directory declares for `name`.
fn forge_declared_size(archive: &mut [u8], name: &str, size: u64) {
    const CENTRAL_HEADER: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
    fn u16_at(buf: &[u8], at: usize) -> usize {
        u16::from_le_bytes([buf[at], buf[at + 1]]) as usize
    }

    let mut at = 0;
    while at + 46 <= archive.len() {
        if archive[at..at + 4] != CENTRAL_HEADER {
            at += 1;
            continue;
        }
        let name_len = u16_at(archive, at + 28);
        let extra_len = u16_at(archive, at + 30);
        let name_start = at + 46;
        if &archive[name_start..name_start + name_len] != name.as_bytes() {
            at = name_start;
            continue;
        }

        if archive[at + 24..at + 28] != [0xff; 4] {
            let capped = size.min(u32::MAX as u64 - 1) as u32;
            archive[at + 24..at + 28].copy_from_slice(&capped.to_le_bytes());
            return;
        }
        // Zip64 extra block: the uncompressed size comes first.
        let mut extra = name_start + name_len;
        let extra_end = extra + extra_len;
        while extra + 4 <= extra_end {
            let id = u16_at(archive, extra);
            let len = u16_at(archive, extra + 2);
            if id == 0x0001 {
                archive[extra + 4..extra + 12].copy_from_slice(&size.to_le_bytes());
                return;
            }
            extra += 4 + len;
        }
        panic!("no zip64 block for {}", name);
    }
    panic!("{} not found in central directory", name);
}

#[test]
fn test_forged_entry_size_is_not_trusted() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("forged.pptx");
    let output = dir.path().join("out.pptx");
    let png = png_bytes(64, 64);
    let jpeg = jpeg_bytes(300, 200);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in presentation_entries(vec![
        ("ppt/media/image1.png", png.clone()),
        ("ppt/media/image2.jpeg", jpeg.clone()),
    ]) {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(name.ends_with(".png"));
        writer.start_file(name, options)?;
        writer.write_all(&data)?;
    }
    let mut bytes = writer.finish()?.into_inner();
    forge_declared_size(&mut bytes, "ppt/media/image1.png", 1 << 62);
    std::fs::write(&input, &bytes)?;

    let report = compress_presentation(
        &input,
        &output,
        &CompressOptions::default(),
        &missing_transcoder(),
    )?;

    assert_eq!(report.images.found, 2);
    assert_eq!(report.images.failed, 1);
    assert_eq!(report.images.recompressed, 1);
    // The stored length is tallied, not the declared one.
    assert_eq!(report.images.bytes_before, (png.len() + jpeg.len()) as u64);

    let archive = ZipArchive::new(std::fs::File::open(&output)?)?;
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"ppt/media/image1.png"));
    Ok(())
}

#[test]
fn test_entry_over_limit_copied_unchanged() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let jpeg = jpeg_bytes(400, 300);
    let (input, output) = fixture(dir.path(), vec![("ppt/media/image1.jpeg", jpeg.clone())]);
    let options = CompressOptions {
        max_entry_size: jpeg.len() as u64 - 1,
        ..Default::default()
    };

    let report = compress_presentation(&input, &output, &options, &missing_transcoder())?;
    assert_eq!(read_archive(&output)[3].1, jpeg);
    assert_eq!(report.images.failed, 1);
    Ok(())
}

#[test]
fn test_rejects_non_presentation() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out.pptx");

    let not_zip = dir.path().join("notes.pptx");
    std::fs::write(&not_zip, b"plain text, not a zip")?;
    let err = compress_presentation(
        &not_zip,
        &output,
        &CompressOptions::default(),
        &missing_transcoder(),
    )
    .unwrap_err();
    assert!(err.downcast_ref::<PackageError>().is_some());

    let docx_like = dir.path().join("doc.pptx");
    write_archive(
        &docx_like,
        &[
            ("[Content_Types].xml", CONTENT_TYPES.as_bytes().to_vec()),
            ("word/document.xml", b"<w:document/>".to_vec()),
        ],
    );
    let err = compress_presentation(
        &docx_like,
        &output,
        &CompressOptions::default(),
        &missing_transcoder(),
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PackageError>(),
        Some(PackageError::NotAPresentation(msg)) if msg.contains("ppt/presentation.xml")
    ));
    assert!(!output.exists());
    Ok(())
}

#[test]
fn test_rejects_invalid_options() {
    let dir = tempfile::tempdir().unwrap();
    let (input, output) = fixture(dir.path(), vec![]);
    let options = CompressOptions {
        image_quality: 5,
        ..Default::default()
    };
    let err = compress_presentation(&input, &output, &options, &missing_transcoder()).unwrap_err();
    assert!(err.downcast_ref::<crate::OptionsError>().is_some());
}

/// Requires an ffmpeg build with libx264.
#[test]
fn test_video_transcoded_with_ffmpeg() -> anyhow::Result<()> {
    let transcoder = Transcoder::default();
    if !transcoder.is_available() {
        eprintln!("skip: ffmpeg not found");
        return Ok(());
    }

    let dir = tempfile::tempdir()?;
    let source = dir.path().join("source.mp4");
    let status = Command::new(transcoder.program())
        .args(["-y", "-f", "lavfi", "-i", "testsrc=duration=2:size=320x240:rate=25"])
        .args(["-c:v", "libx264", "-crf", "0", "-pix_fmt", "yuv420p"])
        .arg(&source)
        .output()?;
    if !status.status.success() {
        eprintln!("skip: ffmpeg cannot produce a libx264 fixture");
        return Ok(());
    }

    let video = std::fs::read(&source)?;
    let (input, output) = fixture(dir.path(), vec![("ppt/media/media1.mp4", video.clone())]);
    let options = CompressOptions {
        video_crf: 35,
        video_preset: crate::Preset::Ultrafast,
        ..Default::default()
    };

    let report = compress_presentation(&input, &output, &options, &transcoder)?;
    assert_eq!(report.videos.found, 1);
    assert_eq!(report.videos.failed, 0);
    assert_eq!(report.videos.recompressed, 1);
    assert!(read_archive(&output)[3].1.len() < video.len());
    Ok(())
}
