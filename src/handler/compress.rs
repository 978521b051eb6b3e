use std::{path::Path, str::FromStr};

use axum::{
    Router,
    body::Body,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError},
    },
    http::{HeaderName, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use deck_media::{CompressOptions, compress_presentation, format_size};
use tokio::io::AsyncWriteExt as _;
use tokio_util::io::ReaderStream;

use crate::{
    api::AppState,
    handler::{ApiError, ApiResult},
    page,
    workspace::{self, ALLOWED_EXTENSION},
};

const PPTX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const X_ORIGINAL_SIZE: HeaderName = HeaderName::from_static("x-original-size");
const X_COMPRESSED_SIZE: HeaderName = HeaderName::from_static("x-compressed-size");

pub fn compress_router() -> Router<AppState> {
    Router::new().route("/", get(index).post(upload))
}

async fn index() -> ApiResult<Html<String>> {
    Ok(Html(page::index(None)?))
}

/// Raw form values; absent or blank fields fall back to the defaults.
#[derive(Debug, Default)]
struct FormFields {
    image_scale: Option<String>,
    image_quality: Option<String>,
    video_crf: Option<String>,
    video_preset: Option<String>,
    skip_video: bool,
}

impl FormFields {
    fn options(&self, max_entry_size: u64) -> ApiResult<CompressOptions> {
        let defaults = CompressOptions::default();
        let options = CompressOptions {
            image_scale: parse_field("image_scale", &self.image_scale, defaults.image_scale)?,
            image_quality: parse_field("image_quality", &self.image_quality, defaults.image_quality)?,
            video_crf: parse_field("video_crf", &self.video_crf, defaults.video_crf)?,
            video_preset: parse_field("video_preset", &self.video_preset, defaults.video_preset)?,
            compress_video: !self.skip_video,
            max_entry_size,
        };
        options
            .validate()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(options)
    }
}

fn parse_field<T: FromStr>(name: &str, value: &Option<String>, default: T) -> ApiResult<T> {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid value for {}: '{}'", name, v))),
    }
}

fn is_checked(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "1" | "yes"
    )
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge(e.body_text());
    }
    ApiError::BadRequest(format!("Failed to parse multipart data: {}", e.body_text()))
}

/// Streams the file field to `path`, aborting once `limit` is exceeded.
async fn save_field(mut field: Field<'_>, path: &Path, limit: u64) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut total = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        total += chunk.len() as u64;
        if total > limit {
            log::warn!("upload aborted after {} bytes, limit {}", total, limit);
            return Err(ApiError::PayloadTooLarge(format!(
                "File is too large: {}+. Maximum allowed size is {}.",
                format_size(total),
                format_size(limit)
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(total)
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    let job = workspace::create_job_dir(state.config.work_dir())?;
    let upload_path = job.path().join("upload.pptx");
    let output_path = job.path().join("compressed.pptx");

    let mut fields = FormFields::default();
    let mut upload: Option<(String, u64)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                if file_name.is_empty() {
                    return Err(ApiError::BadRequest("No selected file".to_string()));
                }
                if !workspace::has_pptx_extension(&file_name) {
                    return Err(ApiError::BadRequest(format!(
                        "Invalid file type. Allowed file types are: {}",
                        ALLOWED_EXTENSION
                    )));
                }
                let size = save_field(field, &upload_path, state.config.max_file_size()).await?;
                upload = Some((workspace::sanitize_file_name(&file_name), size));
            }
            "image_scale" => fields.image_scale = Some(field.text().await.map_err(multipart_error)?),
            "image_quality" => {
                fields.image_quality = Some(field.text().await.map_err(multipart_error)?)
            }
            "video_crf" => fields.video_crf = Some(field.text().await.map_err(multipart_error)?),
            "video_preset" => {
                fields.video_preset = Some(field.text().await.map_err(multipart_error)?)
            }
            "skip_video" => fields.skip_video = is_checked(&field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let Some((file_name, size)) = upload else {
        return Err(ApiError::BadRequest("No file part".to_string()));
    };
    let options = fields.options(state.config.max_file_size())?;
    log::info!(
        "compressing {} ({}) scale={} quality={} crf={} preset={} video={}",
        file_name,
        format_size(size),
        options.image_scale,
        options.image_quality,
        options.video_crf,
        options.video_preset,
        options.compress_video
    );

    let transcoder = state.transcoder.clone();
    let (input, output) = (upload_path.clone(), output_path.clone());
    let report = tokio::task::spawn_blocking(move || {
        compress_presentation(&input, &output, &options, &transcoder)
    })
    .await??;

    // The open handle keeps the output readable after the job dir is removed.
    let file = tokio::fs::File::open(&output_path).await?;
    drop(job);

    let headers = [
        (header::CONTENT_TYPE, PPTX_CONTENT_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"compressed_{}\"", file_name),
        ),
        (header::CONTENT_LENGTH, report.compressed_size.to_string()),
        (X_ORIGINAL_SIZE, report.original_size.to_string()),
        (X_COMPRESSED_SIZE, report.compressed_size.to_string()),
    ];
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((StatusCode::OK, headers, body).into_response())
}
