use std::io::{Cursor, Write};

use axum_test::TestServer;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::{
    api::{AppState, app_router},
    config::SqueezeConfig,
};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="jpeg" ContentType="image/jpeg"/></Types>"#;
const PRESENTATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"/>"#;

fn photo_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([((x * 7) ^ (y * 3)) as u8, x.wrapping_mul(y) as u8, ((x + y) * 5) as u8])
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    out
}

/// Minimal deck with one stored 400x300 JPEG.
pub fn pptx_bytes() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let entries = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes().to_vec()),
        ("ppt/presentation.xml", PRESENTATION.as_bytes().to_vec()),
        ("ppt/media/image1.jpeg", photo_jpeg(400, 300)),
    ];
    for (name, data) in entries {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file(name, options).unwrap();
        writer.write_all(&data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Server over the full router; ffmpeg points at a path that does not exist.
pub fn test_server(config: SqueezeConfig) -> TestServer {
    let mut state = AppState::new(config);
    state.transcoder = deck_media::Transcoder::new("/nonexistent/ffmpeg-binary");
    TestServer::new(app_router(state)).unwrap()
}
