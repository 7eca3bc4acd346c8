// LogPulse - app/offsets.rs
//
// Start-offset decision for one file, given its prior state and current
// physical size. Pure function, no I/O.
//
// Rules:
//   - never seen                         -> 0
//   - current size < recorded size       -> 0 (rotated or truncated; gzip too)
//   - plain file                         -> recorded offset
//   - gzip, size unchanged               -> Unchanged (skip, no decompression)
//   - gzip, size changed                 -> recorded logical offset

use crate::core::model::FileState;
use crate::util::constants::GZIP_SUFFIX;
use std::path::Path;

/// Where a scan of one file should begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// Begin at this offset (physical for plain files, logical for gzip).
    From(u64),
    /// Gzip file whose size has not changed; skip it entirely.
    Unchanged,
}

pub fn compute_start_offset(prior: Option<&FileState>, current_size: u64, is_gzip: bool) -> StartOffset {
    let Some(prior) = prior else {
        return StartOffset::From(0);
    };
    if current_size < prior.last_size {
        return StartOffset::From(0);
    }
    if is_gzip && current_size == prior.last_size {
        return StartOffset::Unchanged;
    }
    StartOffset::From(prior.last_offset)
}

/// Whether `path` names a gzip-compressed log (case-insensitive suffix).
pub fn is_gzip_path(path: &Path) -> bool {
    path.to_string_lossy()
        .to_ascii_lowercase()
        .ends_with(GZIP_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(offset: u64, size: u64) -> FileState {
        FileState {
            last_offset: offset,
            last_size: size,
        }
    }

    #[test]
    fn test_new_file_starts_at_zero() {
        assert_eq!(compute_start_offset(None, 100, false), StartOffset::From(0));
        assert_eq!(compute_start_offset(None, 100, true), StartOffset::From(0));
    }

    #[test]
    fn test_shrunk_file_restarts() {
        let prior = state(500, 500);
        assert_eq!(compute_start_offset(Some(&prior), 10, false), StartOffset::From(0));
        assert_eq!(compute_start_offset(Some(&prior), 10, true), StartOffset::From(0));
    }

    #[test]
    fn test_plain_file_resumes() {
        let prior = state(500, 500);
        assert_eq!(compute_start_offset(Some(&prior), 500, false), StartOffset::From(500));
        assert_eq!(compute_start_offset(Some(&prior), 900, false), StartOffset::From(500));
    }

    #[test]
    fn test_gzip_uses_logical_offset() {
        // Logical offset exceeds physical size for compressed content.
        let prior = state(4_000, 300);
        assert_eq!(compute_start_offset(Some(&prior), 300, true), StartOffset::Unchanged);
        assert_eq!(compute_start_offset(Some(&prior), 450, true), StartOffset::From(4_000));
    }

    #[test]
    fn test_gzip_suffix_detection() {
        assert!(is_gzip_path(Path::new("/var/log/access.log.1.GZ")));
        assert!(!is_gzip_path(Path::new("/var/log/access.log")));
    }
}
