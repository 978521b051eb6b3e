//! Per-request job directories under the configured work dir.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) const JOB_PREFIX: &str = "job-";
pub(crate) const ALLOWED_EXTENSION: &str = ".pptx";
const FALLBACK_FILE_NAME: &str = "presentation.pptx";
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Removed when the returned guard is dropped.
pub(crate) fn create_job_dir(work_dir: &Path) -> anyhow::Result<TempDir> {
    std::fs::create_dir_all(work_dir)
        .with_context(|| format!("create work dir {}", work_dir.display()))?;
    tempfile::Builder::new()
        .prefix(JOB_PREFIX)
        .tempdir_in(work_dir)
        .context("create job dir")
}

/// Deletes job directories last modified more than `ttl` ago.
pub(crate) fn sweep_stale_jobs(work_dir: &Path, ttl: Duration) -> anyhow::Result<usize> {
    let entries = match std::fs::read_dir(work_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("read {}", work_dir.display())),
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !is_job_dir(&path) {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(|modified| modified.elapsed().unwrap_or_default());
        match age {
            Ok(age) if age >= ttl => match std::fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(e) => log::error!("Error deleting {}: {}", path.display(), e),
            },
            Ok(_) => {}
            Err(e) => log::error!("Error reading {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

fn is_job_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(JOB_PREFIX))
}

pub(crate) fn start_sweeper(
    cancel: CancellationToken,
    work_dir: PathBuf,
    ttl: Duration,
) -> JoinHandle<()> {
    let period = (ttl / 4).max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Sweeper cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let dir = work_dir.clone();
                    match tokio::task::spawn_blocking(move || sweep_stale_jobs(&dir, ttl)).await {
                        Ok(Ok(0)) => {}
                        Ok(Ok(n)) => log::info!("Sweeper removed {} stale jobs", n),
                        Ok(Err(e)) => log::error!("Sweeper failed: {:#}", e),
                        Err(e) => log::error!("Sweeper task panicked: {}", e),
                    }
                }
            }
        }
    })
}

pub(crate) fn has_pptx_extension(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(ALLOWED_EXTENSION)
        && file_name.len() > ALLOWED_EXTENSION.len()
}

/// Reduces an uploaded name to a safe file name: path components dropped,
/// whitespace replaced by `_`, only ASCII letters, digits, `.`, `_` and `-` kept.
pub(crate) fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => Some(c),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if has_pptx_extension(&cleaned) {
        cleaned
    } else {
        FALLBACK_FILE_NAME.to_string()
    }
}
