use std::fmt;

use serde::Serialize;

/// Counters for one kind of media.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaTally {
    pub found: usize,
    /// Entries replaced by a smaller re-encoding.
    pub recompressed: usize,
    /// Entries written back unchanged (not smaller, skipped or unsupported).
    pub kept: usize,
    pub failed: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl MediaTally {
    pub(crate) fn record(&mut self, before: u64, after: u64, replaced: bool) {
        self.found += 1;
        self.bytes_before += before;
        self.bytes_after += after;
        if replaced {
            self.recompressed += 1;
        } else {
            self.kept += 1;
        }
    }

    pub(crate) fn record_failure(&mut self, size: u64) {
        self.found += 1;
        self.failed += 1;
        self.bytes_before += size;
        self.bytes_after += size;
    }

    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.bytes_before, self.bytes_after)
    }
}

/// Result of compressing one presentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressReport {
    pub images: MediaTally,
    pub videos: MediaTally,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CompressReport {
    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.original_size, self.compressed_size)
    }

    pub fn log_summary(&self) {
        for (kind, tally) in [("images", &self.images), ("videos", &self.videos)] {
            if tally.found == 0 {
                continue;
            }
            log::info!(
                "{}: {} found, {} recompressed, {} kept, {} failed",
                kind,
                tally.found,
                tally.recompressed,
                tally.kept,
                tally.failed
            );
            log::info!(
                "{}: {} -> {} ({:.1}% reduction)",
                kind,
                format_size(tally.bytes_before),
                format_size(tally.bytes_after),
                tally.reduction_percent()
            );
        }
        log::info!("{}", self);
    }
}

impl fmt::Display for CompressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "presentation: {} -> {} ({:.1}% reduction)",
            format_size(self.original_size),
            format_size(self.compressed_size),
            self.reduction_percent()
        )
    }
}

fn reduction_percent(before: u64, after: u64) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (1.0 - after as f64 / before as f64) * 100.0
}

/// Human-readable byte count: bytes, one decimal for KB / MB, two for GB.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{} bytes", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}
