// LogPulse - app/file_scan.rs
//
// Incremental scan of one physical log file.
//
// - Plain files: seek to the recorded offset and read at most the bytes
//   present when the file was stat'ed; anything appended later is left for
//   the next pass.
// - Gzip files: always decompress from byte 0 (multi-member aware) and
//   discard the recorded logical offset. If the stream turns out shorter
//   than that, reopen and restart from logical 0. Lines seen before may be
//   ingested again in that case.
// - Each line costs exactly the bytes it consumed, terminator included.
// - Records are enriched and handed to the sink in batches of BATCH_SIZE.
// - Progress is published to the flight guard in PROGRESS_CHUNK_BYTES
//   chunks.
//
// The scanner never touches the shared scan state: it returns the new
// `FileState` and the coordinator records it.

use crate::app::flight::FlightGuard;
use crate::app::offsets::{compute_start_offset, is_gzip_path, StartOffset};
use crate::app::sink::RecordSink;
use crate::core::enrich::Enricher;
use crate::core::model::{FileState, LogRecord};
use crate::core::parser::LineParser;
use crate::core::record::RecordBuilder;
use crate::util::constants::{
    BATCH_SIZE, GLOB_METACHARACTERS, MAX_LINE_BYTES, PROGRESS_CHUNK_BYTES, UNKNOWN_LOCATION,
};
use crate::util::error::ScanError;
use crate::util::logging::preview;
use chrono::{DateTime, Utc};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Result of scanning one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileOutcome {
    /// Records handed to the sink.
    pub entries: usize,
    /// Lines that failed to parse or were filtered out.
    pub skipped_lines: usize,
    /// New state to record, `None` when the file had nothing new.
    pub state: Option<FileState>,
}

/// Expand a configured log path into concrete files.
///
/// Paths naming an existing file, or without glob metacharacters, are
/// returned as-is (existence is checked when the file is opened).
pub fn expand_log_path(log_path: &str) -> Result<Vec<PathBuf>, ScanError> {
    if !log_path.contains(GLOB_METACHARACTERS) || Path::new(log_path).is_file() {
        return Ok(vec![PathBuf::from(log_path)]);
    }

    let entries = glob::glob(log_path).map_err(|source| ScanError::GlobPattern {
        pattern: log_path.to_string(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(pattern = %log_path, error = %e, "Unreadable glob match skipped");
            }
        }
    }

    if paths.is_empty() {
        return Err(ScanError::NoGlobMatches {
            pattern: log_path.to_string(),
        });
    }
    Ok(paths)
}

/// Bytes a pass expects to read from `path`, for progress totals.
/// Gzip files count their physical size; unreadable files count zero.
pub fn scannable_bytes(path: &Path, prior: Option<&FileState>) -> u64 {
    let Ok(meta) = std::fs::metadata(path) else {
        return 0;
    };
    let size = meta.len();
    let gzip = is_gzip_path(path);
    match compute_start_offset(prior, size, gzip) {
        StartOffset::Unchanged => 0,
        StartOffset::From(_) if gzip => size,
        StartOffset::From(start) => size.saturating_sub(start),
    }
}

/// Everything needed to scan the files of one site during one pass.
pub struct FileScanner<'a> {
    pub site_id: &'a str,
    pub parser: &'a LineParser,
    pub builder: &'a RecordBuilder<'a>,
    pub enricher: &'a dyn Enricher,
    pub sink: &'a dyn RecordSink,
    pub progress: &'a FlightGuard,
    /// Reference time for the retention cutoff.
    pub now: DateTime<Utc>,
}

impl FileScanner<'_> {
    /// Scan new content of `path` given its state from the previous pass.
    ///
    /// An `Err` means the file was aborted for this pass and its state must
    /// not be advanced.
    pub fn scan_file(&self, path: &Path, prior: Option<FileState>) -> Result<FileOutcome, ScanError> {
        let file = File::open(path).map_err(|source| io_error(path, "open", source))?;
        let current_size = file
            .metadata()
            .map_err(|source| io_error(path, "stat", source))?
            .len();
        let gzip = is_gzip_path(path);

        let start = match compute_start_offset(prior.as_ref(), current_size, gzip) {
            StartOffset::Unchanged => {
                tracing::debug!(site = %self.site_id, file = %path.display(), "Gzip file unchanged, skipped");
                return Ok(FileOutcome::default());
            }
            StartOffset::From(offset) => offset,
        };

        if let Some(prior) = prior.filter(|p| current_size < p.last_size) {
            tracing::info!(
                site = %self.site_id,
                file = %path.display(),
                previous_size = prior.last_size,
                current_size,
                "Log rotation detected, rescanning from start"
            );
        }

        if !gzip && current_size <= start {
            return Ok(FileOutcome::default());
        }

        let outcome = if gzip {
            let (mut reader, start) = self.open_gzip_at(file, path, start)?;
            let (mut outcome, consumed) = self.stream_lines(&mut reader, path)?;
            outcome.state = Some(FileState {
                last_offset: start + consumed,
                last_size: current_size,
            });
            outcome
        } else {
            let mut file = file;
            file.seek(SeekFrom::Start(start))
                .map_err(|source| io_error(path, "seek", source))?;
            let mut reader = BufReader::new(file.take(current_size - start));
            let (mut outcome, _) = self.stream_lines(&mut reader, path)?;
            outcome.state = Some(FileState {
                last_offset: current_size,
                last_size: current_size,
            });
            outcome
        };

        if outcome.entries > 0 {
            tracing::info!(
                site = %self.site_id,
                file = %path.display(),
                entries = outcome.entries,
                skipped = outcome.skipped_lines,
                "Log file scanned"
            );
        }
        Ok(outcome)
    }

    /// Decompressed reader positioned at logical `start`, or at 0 after a
    /// failed discard. Returns the effective start.
    fn open_gzip_at(
        &self,
        file: File,
        path: &Path,
        start: u64,
    ) -> Result<(BufReader<MultiGzDecoder<File>>, u64), ScanError> {
        let mut decoder = MultiGzDecoder::new(file);
        if start == 0 {
            return Ok((BufReader::new(decoder), 0));
        }

        let skipped = io::copy(&mut decoder.by_ref().take(start), &mut io::sink());
        match skipped {
            Ok(discarded) if discarded == start => return Ok((BufReader::new(decoder), start)),
            Ok(discarded) => tracing::warn!(
                site = %self.site_id,
                file = %path.display(),
                expected = start,
                discarded,
                "Gzip stream shorter than recorded offset, reparsing from start"
            ),
            Err(e) => tracing::warn!(
                site = %self.site_id,
                file = %path.display(),
                error = %e,
                "Cannot skip previously scanned gzip content, reparsing from start"
            ),
        }

        let reopened = File::open(path).map_err(|source| io_error(path, "reopen", source))?;
        Ok((BufReader::new(MultiGzDecoder::new(reopened)), 0))
    }

    /// Parse every line of `reader`. Returns the outcome (without state)
    /// and the logical bytes consumed.
    fn stream_lines<R: BufRead>(&self, reader: &mut R, path: &Path) -> Result<(FileOutcome, u64), ScanError> {
        let mut outcome = FileOutcome::default();
        let mut batch: Vec<LogRecord> = Vec::with_capacity(BATCH_SIZE);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);
        let mut consumed: u64 = 0;
        let mut pending: u64 = 0;

        loop {
            buf.clear();
            let (n, oversized) = match next_line(reader, &mut buf) {
                Ok(read) => read,
                Err(source) => {
                    // Records already built are valid; keep them.
                    self.flush(&mut batch);
                    self.progress.add_scanned(pending);
                    return Err(io_error(path, "read", source));
                }
            };
            if n == 0 {
                break;
            }

            consumed += n;
            pending += n;
            if pending >= PROGRESS_CHUNK_BYTES {
                self.progress.add_scanned(pending);
                pending = 0;
            }

            if oversized {
                tracing::debug!(
                    site = %self.site_id,
                    file = %path.display(),
                    bytes = n,
                    "Over-long line skipped"
                );
                outcome.skipped_lines += 1;
                continue;
            }

            let text = String::from_utf8_lossy(&buf);
            let line = strip_line_ending(&text);
            if line.trim().is_empty() {
                continue;
            }

            match self
                .parser
                .parse_line(line)
                .and_then(|parsed| self.builder.build(parsed, self.now))
            {
                Ok(record) => {
                    batch.push(record);
                    outcome.entries += 1;
                    if batch.len() >= BATCH_SIZE {
                        self.flush(&mut batch);
                    }
                }
                Err(e) => {
                    outcome.skipped_lines += 1;
                    tracing::trace!(
                        site = %self.site_id,
                        error = %e,
                        line = preview(line),
                        "Line skipped"
                    );
                }
            }
        }

        self.flush(&mut batch);
        if pending > 0 {
            self.progress.add_scanned(pending);
        }
        Ok((outcome, consumed))
    }

    /// Fill locations and hand the batch to the sink. Sink failures are
    /// logged; the batch is dropped either way.
    fn flush(&self, batch: &mut Vec<LogRecord>) {
        if batch.is_empty() {
            return;
        }

        let mut ips: Vec<&str> = batch.iter().map(|r| r.ip.as_str()).collect();
        ips.sort_unstable();
        ips.dedup();
        let locations = self.enricher.locate_batch(&ips);

        for record in batch.iter_mut() {
            match locations.get(&record.ip) {
                Some(loc) => {
                    record.domestic_location = loc.domestic.clone();
                    record.global_location = loc.global.clone();
                }
                None => {
                    record.domestic_location = UNKNOWN_LOCATION.to_string();
                    record.global_location = UNKNOWN_LOCATION.to_string();
                }
            }
        }

        if let Err(e) = self.sink.insert_batch(self.site_id, batch) {
            tracing::error!(
                site = %self.site_id,
                records = batch.len(),
                error = %e,
                "Batch insert failed"
            );
        }
        batch.clear();
    }
}

fn io_error(path: &Path, operation: &'static str, source: io::Error) -> ScanError {
    ScanError::Io {
        path: path.to_path_buf(),
        operation,
        source,
    }
}

fn strip_line_ending(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}

/// Read one line, terminator included, into `buf`.
///
/// Returns the bytes consumed and whether the line exceeded
/// `MAX_LINE_BYTES`. An over-long line is consumed to its end but `buf`
/// only holds its prefix. `(0, false)` means end of stream.
fn next_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<(u64, bool)> {
    let limit = MAX_LINE_BYTES as u64 + 1;
    let n = reader.by_ref().take(limit).read_until(b'\n', buf)? as u64;
    if n < limit || buf.last() == Some(&b'\n') {
        return Ok((n, false));
    }

    let mut total = n;
    loop {
        let (found_end, used) = {
            let available = reader.fill_buf()?;
            if available.is_empty() {
                break;
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, available.len()),
            }
        };
        reader.consume(used);
        total += used as u64;
        if found_end {
            break;
        }
    }
    Ok((total, true))
}
