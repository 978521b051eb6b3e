//! Still image recompression: resize by a scale factor, re-encode in the
//! source format.

use std::io::Cursor;

use anyhow::Context;
use image::{
    AnimationDecoder, DynamicImage, ImageFormat, ImageReader,
    codecs::{
        gif::GifDecoder,
        png::{CompressionType, FilterType as PngFilter, PngEncoder},
    },
    imageops::FilterType,
};

pub const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    /// Re-encoding did not shrink the entry.
    NotSmaller,
    /// Multi-frame GIF; a still re-encode would drop frames.
    Animated,
    Unsupported(ImageFormat),
}

#[derive(Debug)]
pub enum ImageOutcome {
    Replaced {
        data: Vec<u8>,
        from: (u32, u32),
        to: (u32, u32),
    },
    Kept(KeepReason),
}

/// Target dimensions for `scale`, never below 1x1.
pub fn scaled_dimensions(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let apply = |v: u32| ((v as f64 * scale as f64).floor() as u32).max(1);
    (apply(width), apply(height))
}

pub fn compress_image(data: &[u8], scale: f32, quality: u8) -> anyhow::Result<ImageOutcome> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("sniff image format")?;
    let format = reader
        .format()
        .ok_or_else(|| anyhow::anyhow!("unrecognised image format"))?;

    match format {
        ImageFormat::Jpeg
        | ImageFormat::Png
        | ImageFormat::Bmp
        | ImageFormat::WebP
        | ImageFormat::Tiff => {}
        ImageFormat::Gif => {
            if is_animated_gif(data)? {
                return Ok(ImageOutcome::Kept(KeepReason::Animated));
            }
        }
        other => return Ok(ImageOutcome::Kept(KeepReason::Unsupported(other))),
    }

    let image = reader.decode().context("decode image")?;
    let from = (image.width(), image.height());
    let to = scaled_dimensions(from.0, from.1, scale);
    let image = if to == from {
        image
    } else {
        image.resize_exact(to.0, to.1, FilterType::Lanczos3)
    };

    let encoded = encode(&image, format, quality)?;
    if encoded.len() >= data.len() {
        return Ok(ImageOutcome::Kept(KeepReason::NotSmaller));
    }
    Ok(ImageOutcome::Replaced {
        data: encoded,
        from,
        to,
    })
}

fn is_animated_gif(data: &[u8]) -> anyhow::Result<bool> {
    let decoder = GifDecoder::new(Cursor::new(data)).context("read gif")?;
    Ok(decoder.into_frames().take(2).count() > 1)
}

fn encode(image: &DynamicImage, format: ImageFormat, quality: u8) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    match format {
        ImageFormat::Jpeg => encode_jpeg(image, quality, &mut out)?,
        ImageFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilter::Adaptive);
            image.write_with_encoder(encoder).context("encode png")?;
        }
        other => image
            .write_to(&mut Cursor::new(&mut out), other)
            .with_context(|| format!("encode {:?}", other))?,
    }
    Ok(out)
}

fn encode_jpeg(image: &DynamicImage, quality: u8, out: &mut Vec<u8>) -> anyhow::Result<()> {
    let width = u16::try_from(image.width()).context("jpeg width exceeds 65535")?;
    let height = u16::try_from(image.height()).context("jpeg height exceeds 65535")?;

    let mut encoder = jpeg_encoder::Encoder::new(out, quality);
    encoder.set_optimized_huffman_tables(true);
    // JPEG has no alpha channel.
    let result = if image.color().has_color() {
        let rgb = image.to_rgb8();
        encoder.encode(rgb.as_raw(), width, height, jpeg_encoder::ColorType::Rgb)
    } else {
        let luma = image.to_luma8();
        encoder.encode(luma.as_raw(), width, height, jpeg_encoder::ColorType::Luma)
    };
    result.context("encode jpeg")
}
