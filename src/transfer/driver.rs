//! Concurrent transfer driver
//!
//! Runs one producer per job, streams each file through a [`ByteCounter`]
//! and settles every bar with a completion line, whether the transfer
//! worked or not.

use crate::config::{ChecksumPolicy, TransferOptions};
use crate::error::{IoResultExt, Result, TransferError};
use crate::fs::{resolve_output_path, InputFile};
use crate::hash::{hash_file, HashResult, StreamingHasher};
use crate::progress::{truncate_name, ByteCounter, CounterHandle, ProgressView, TransferKind};
use console::style;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Upper bound on producer threads per core
const PRODUCERS_PER_CORE: usize = 4;

/// One file to move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferJob {
    /// Direction
    pub kind: TransferKind,
    /// File read from
    pub source: PathBuf,
    /// File written to
    pub destination: PathBuf,
    /// Name on the progress line
    pub name: String,
    /// Expected size in bytes
    pub size: u64,
}

impl TransferJob {
    /// Upload `input` into the `store` directory
    pub fn upload(input: &InputFile, store: &Path) -> Self {
        Self {
            kind: TransferKind::Upload,
            source: input.path.clone(),
            destination: store.join(&input.name),
            name: input.name.clone(),
            size: input.size,
        }
    }

    /// Download `input` from the store to `output`
    pub fn download(input: &InputFile, output: &str) -> Self {
        Self {
            kind: TransferKind::Download,
            source: input.path.clone(),
            destination: resolve_output_path(&input.name, output),
            name: input.name.clone(),
            size: input.size,
        }
    }
}

/// Result of comparing the written file against the streamed data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Verification {
    /// Checksums match
    Matched,
    /// Checksums differ; only reachable with [`ChecksumPolicy::Warn`]
    Mismatched {
        /// Checksum of the written file
        remote: String,
    },
    /// Verification was turned off
    Skipped,
}

/// A finished transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Direction
    pub kind: TransferKind,
    /// Name on the progress line
    pub name: String,
    /// File written to
    pub destination: PathBuf,
    /// Bytes moved
    pub bytes: u64,
    /// Checksum of the streamed data
    pub checksum: HashResult,
    /// Verification of the written file
    pub verification: Verification,
}

/// Run all `jobs` concurrently, rendering into `view`.
///
/// Producers start before their bars exist; bars are attached afterwards in
/// job order. Jobs beyond the pool size wait for a free producer, counting
/// into their buffer once they run. Results come back in job order.
///
/// Fails up front, before any file is touched, when two jobs share a
/// destination.
pub fn run_transfers(
    jobs: &[TransferJob],
    view: &ProgressView,
    options: &TransferOptions,
) -> Result<Vec<Result<TransferOutcome>>> {
    if jobs.is_empty() {
        return Ok(Vec::new());
    }
    check_destinations(jobs)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(producer_threads(jobs.len()))
        .thread_name(|i| format!("transfer-{}", i))
        .build()
        .map_err(|e| TransferError::ThreadPool(e.to_string()))?;

    let (result_tx, result_rx) = crossbeam::channel::unbounded();

    pool.in_place_scope(|scope| {
        let mut handles: Vec<CounterHandle> = Vec::with_capacity(jobs.len());

        for (index, job) in jobs.iter().enumerate() {
            let destination = Destination::new(&job.destination);
            let counter = ByteCounter::new(job.kind, job.size, job.name.clone(), destination);
            handles.push(counter.handle());

            let result_tx = result_tx.clone();
            scope.spawn(move |_| {
                let result = transfer_one(counter, job, options);
                let _ = result_tx.send((index, result));
            });
        }

        for handle in &handles {
            view.add_bar(handle);
        }
    });
    drop(result_tx);

    let mut results: Vec<Option<Result<TransferOutcome>>> = jobs.iter().map(|_| None).collect();
    for (index, result) in result_rx {
        results[index] = Some(result);
    }

    Ok(results
        .into_iter()
        .zip(jobs)
        .map(|(result, job)| {
            result.unwrap_or_else(|| {
                Err(TransferError::config(format!("no result for '{}'", job.name)))
            })
        })
        .collect())
}

fn producer_threads(jobs: usize) -> usize {
    jobs.min(rayon::current_num_threads() * PRODUCERS_PER_CORE).max(1)
}

/// Refuse a batch in which two jobs would write the same file
fn check_destinations(jobs: &[TransferJob]) -> Result<()> {
    let mut seen: HashMap<&Path, &Path> = HashMap::with_capacity(jobs.len());
    for job in jobs {
        if let Some(first) = seen.insert(&job.destination, &job.source) {
            return Err(TransferError::config(format!(
                "'{}' and '{}' would both be written to '{}'",
                first.display(),
                job.source.display(),
                job.destination.display()
            )));
        }
    }
    Ok(())
}

fn open_destination(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_path(parent)?;
    }
    File::create(path).with_path(path)
}

/// Destination file, created once its producer runs
struct Destination {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl Destination {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: None,
        }
    }

    fn open(&mut self) -> Result<()> {
        if self.writer.is_none() {
            self.writer = Some(BufWriter::new(open_destination(&self.path)?));
        }
        Ok(())
    }
}

impl Write for Destination {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.writer {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "destination not opened")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.writer {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// Stream one job through `counter` and finalize it
fn transfer_one(
    mut counter: ByteCounter<Destination>,
    job: &TransferJob,
    options: &TransferOptions,
) -> Result<TransferOutcome> {
    let result = stream_and_verify(&mut counter, job, options);

    let line = match &result {
        Ok(outcome) => success_line(outcome, options.quiet),
        Err(e) => failure_line(job, e),
    };
    counter.finalize(line);

    result.map_err(|e| e.with_context(format!("{} of '{}'", job.kind, job.name)))
}

fn stream_and_verify(
    counter: &mut ByteCounter<Destination>,
    job: &TransferJob,
    options: &TransferOptions,
) -> Result<TransferOutcome> {
    let source = File::open(&job.source).with_path(&job.source)?;
    counter.get_mut().open()?;
    let mut reader = BufReader::with_capacity(options.chunk_size, source);
    let mut hasher = StreamingHasher::new(options.algorithm);
    let mut buffer = vec![0u8; options.chunk_size.max(1)];

    loop {
        let n = reader.read(&mut buffer).with_path(&job.source)?;
        if n == 0 {
            break;
        }
        hasher.process(&buffer[..n]);
        counter.write_all(&buffer[..n]).with_path(&job.destination)?;
    }
    counter.flush().with_path(&job.destination)?;

    let checksum = hasher.finalize();
    let verification = verify_destination(&checksum, &job.destination, options.policy)?;

    tracing::debug!(name = %job.name, bytes = checksum.size, "transfer finished");

    Ok(TransferOutcome {
        kind: job.kind,
        name: job.name.clone(),
        destination: job.destination.clone(),
        bytes: checksum.size,
        checksum,
        verification,
    })
}

/// Re-hash the written file and apply `policy` to the comparison
pub fn verify_destination(
    local: &HashResult,
    destination: &Path,
    policy: ChecksumPolicy,
) -> Result<Verification> {
    if policy == ChecksumPolicy::Skip {
        return Ok(Verification::Skipped);
    }

    let remote = hash_file(destination, local.algorithm)?;
    if remote.verify(local) {
        return Ok(Verification::Matched);
    }

    match policy {
        ChecksumPolicy::Strict => Err(TransferError::checksum_mismatch(
            destination,
            local.hash.clone(),
            remote.hash,
        )),
        _ => {
            tracing::warn!(path = %destination.display(), "checksums don't match");
            Ok(Verification::Mismatched { remote: remote.hash })
        }
    }
}

/// Completion line of a transfer that went through
pub fn success_line(outcome: &TransferOutcome, quiet: bool) -> String {
    let name = truncate_name(&outcome.name);

    if let Verification::Mismatched { remote } = &outcome.verification {
        let mut line = format!(
            "{} checksums don't match for '{}'",
            style("Warning").yellow(),
            name
        );
        if !quiet {
            line.push_str(&format!(
                " (local {}, remote {})",
                outcome.checksum.short(),
                &remote[..remote.len().min(12)]
            ));
        }
        return line;
    }

    let mut line = format!(
        "{} {} '{}' ({})",
        style("✓").green(),
        outcome.kind.past_tense(),
        name,
        humansize::format_size(outcome.bytes, humansize::BINARY)
    );
    if !quiet {
        line.push_str(&format!(
            " {}:{}",
            outcome.checksum.algorithm.name(),
            outcome.checksum.short()
        ));
    }
    line
}

/// Completion line of a failed transfer
pub fn failure_line(job: &TransferJob, error: &TransferError) -> String {
    format!(
        "{} {} of '{}' failed: {}",
        style("✗").red(),
        job.kind,
        truncate_name(&job.name),
        error
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HashAlgorithm, ViewConfig};
    use crate::hash::hash_bytes;
    use tempfile::TempDir;

    fn write_input(dir: &Path, name: &str, size: usize) -> InputFile {
        let path = dir.join(name);
        let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, content).unwrap();
        InputFile::from_path(&path).unwrap()
    }

    fn small_chunks() -> TransferOptions {
        TransferOptions {
            chunk_size: 1024,
            ..Default::default()
        }
    }

    #[test]
    fn test_uploads_run_concurrently() {
        let src = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        let inputs = [
            write_input(src.path(), "alpha.bin", 10 * 1024),
            write_input(src.path(), "beta.bin", 33 * 1000),
            write_input(src.path(), "gamma.bin", 0),
        ];
        let jobs: Vec<_> = inputs.iter().map(|i| TransferJob::upload(i, store.path())).collect();

        let view = ProgressView::new(ViewConfig::hidden()).unwrap();
        let results = run_transfers(&jobs, &view, &small_chunks()).unwrap();
        let widgets = view.widgets();
        let summary = view.join();

        assert_eq!(summary.bars, 3);
        assert_eq!(summary.finalized, 3);
        assert_eq!(summary.bytes, 10 * 1024 + 33 * 1000);

        for (input, result) in inputs.iter().zip(&results) {
            let outcome = result.as_ref().unwrap();
            assert_eq!(outcome.bytes, input.size);
            assert_eq!(outcome.verification, Verification::Matched);
            assert_eq!(
                std::fs::read(store.path().join(&input.name)).unwrap(),
                std::fs::read(&input.path).unwrap()
            );
        }

        for (widget, input) in widgets.iter().zip(&inputs) {
            let text = widget.completion_text().unwrap();
            assert!(text.contains(&format!("Uploaded '{}'", input.name)));
        }
    }

    #[test]
    fn test_failed_transfer_settles_bar() {
        let store = TempDir::new().unwrap();
        let job = TransferJob {
            kind: TransferKind::Download,
            source: store.path().join("does-not-exist.bin"),
            destination: store.path().join("out/copy.bin"),
            name: "does-not-exist.bin".to_string(),
            size: 100,
        };

        let view = ProgressView::new(ViewConfig::hidden()).unwrap();
        let results = run_transfers(std::slice::from_ref(&job), &view, &small_chunks()).unwrap();
        let widgets = view.widgets();
        let summary = view.join();

        assert!(results[0].is_err());
        assert_eq!(summary.finalized, 1);
        let text = widgets[0].completion_text().unwrap();
        assert!(text.contains("Download of 'does-not-exist.bin' failed"));
    }

    #[test]
    fn test_missing_source_leaves_no_destination() {
        let store = TempDir::new().unwrap();
        let job = TransferJob {
            kind: TransferKind::Upload,
            source: store.path().join("gone.bin"),
            destination: store.path().join("nested/gone.bin"),
            name: "gone.bin".to_string(),
            size: 10,
        };

        let view = ProgressView::manual(ViewConfig::hidden());
        let results = run_transfers(std::slice::from_ref(&job), &view, &small_chunks()).unwrap();

        assert!(results[0].is_err());
        assert!(!store.path().join("nested").exists());
    }

    #[test]
    fn test_unwritable_destination_settles_bar() {
        let src = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        let input = write_input(src.path(), "photo.jpg", 512);
        let blocker = store.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let job = TransferJob {
            destination: blocker.join("photo.jpg"),
            ..TransferJob::upload(&input, store.path())
        };

        let view = ProgressView::manual(ViewConfig::hidden());
        let results = run_transfers(std::slice::from_ref(&job), &view, &small_chunks()).unwrap();
        let widgets = view.widgets();

        assert!(matches!(&results[0], Err(TransferError::WithContext { .. })));
        assert_eq!(widgets.len(), 1);
        assert!(!widgets[0].is_done());

        assert!(view.tick());
        let text = console::strip_ansi_codes(&widgets[0].completion_text().unwrap()).into_owned();
        assert!(text.starts_with("✗ Upload of 'photo.jpg' failed: I/O error at"));
        assert_eq!(widgets[0].position(), 0);
        assert_eq!(std::fs::read(&blocker).unwrap(), b"not a directory");
    }

    #[test]
    fn test_duplicate_destinations_rejected() {
        let src = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        for dir in ["a", "b"] {
            std::fs::create_dir(src.path().join(dir)).unwrap();
        }
        let inputs = [
            write_input(&src.path().join("a"), "x.bin", 3000),
            write_input(&src.path().join("b"), "x.bin", 1000),
        ];
        let jobs: Vec<_> = inputs.iter().map(|i| TransferJob::upload(i, store.path())).collect();

        let view = ProgressView::manual(ViewConfig::hidden());
        let err = run_transfers(&jobs, &view, &small_chunks()).unwrap_err();

        assert!(matches!(&err, TransferError::Config(_)));
        assert!(err.to_string().contains("x.bin"));
        assert!(view.widgets().is_empty());
        assert_eq!(std::fs::read_dir(store.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_producer_threads_bounded() {
        let limit = rayon::current_num_threads() * PRODUCERS_PER_CORE;
        assert_eq!(producer_threads(1), 1);
        assert_eq!(producer_threads(limit + 5000), limit);
    }

    #[test]
    fn test_more_jobs_than_producers() {
        let src = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        let count = producer_threads(usize::MAX) + 3;
        let inputs: Vec<_> = (0..count)
            .map(|i| write_input(src.path(), &format!("part-{:03}.bin", i), 700 + i))
            .collect();
        let jobs: Vec<_> = inputs.iter().map(|i| TransferJob::upload(i, store.path())).collect();

        let view = ProgressView::new(ViewConfig::hidden()).unwrap();
        let results = run_transfers(&jobs, &view, &small_chunks()).unwrap();
        let summary = view.join();

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(summary.bars, count);
        assert_eq!(summary.finalized, count);
        assert_eq!(summary.bytes, inputs.iter().map(|i| i.size).sum::<u64>());
    }

    #[test]
    fn test_download_to_directory() {
        let store = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let input = write_input(store.path(), "notes.txt", 2048);
        let output = format!("{}/", out.path().display());

        let job = TransferJob::download(&input, &output);
        assert_eq!(job.destination, out.path().join("notes.txt"));

        let view = ProgressView::new(ViewConfig::hidden()).unwrap();
        let results = run_transfers(&[job], &view, &small_chunks()).unwrap();
        view.join();

        assert_eq!(results[0].as_ref().unwrap().bytes, 2048);
        assert!(out.path().join("notes.txt").exists());
    }

    #[test]
    fn test_verify_destination_policies() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("written.bin");
        std::fs::write(&path, b"tampered").unwrap();
        let local = hash_bytes(b"original", HashAlgorithm::Sha256);

        assert_eq!(
            verify_destination(&local, &path, ChecksumPolicy::Skip).unwrap(),
            Verification::Skipped
        );
        assert!(matches!(
            verify_destination(&local, &path, ChecksumPolicy::Warn).unwrap(),
            Verification::Mismatched { .. }
        ));
        assert!(matches!(
            verify_destination(&local, &path, ChecksumPolicy::Strict),
            Err(TransferError::ChecksumMismatch { .. })
        ));

        std::fs::write(&path, b"original").unwrap();
        assert_eq!(
            verify_destination(&local, &path, ChecksumPolicy::Strict).unwrap(),
            Verification::Matched
        );
    }

    #[test]
    fn test_completion_lines() {
        let outcome = TransferOutcome {
            kind: TransferKind::Upload,
            name: "report.pdf".to_string(),
            destination: PathBuf::from("/store/report.pdf"),
            bytes: 2048,
            checksum: hash_bytes(b"abc", HashAlgorithm::Sha256),
            verification: Verification::Matched,
        };

        let line = console::strip_ansi_codes(&success_line(&outcome, false)).into_owned();
        assert_eq!(line, "✓ Uploaded 'report.pdf' (2 KiB) SHA-256:ba7816bf8f01");

        let quiet = console::strip_ansi_codes(&success_line(&outcome, true)).into_owned();
        assert_eq!(quiet, "✓ Uploaded 'report.pdf' (2 KiB)");

        let mismatched = TransferOutcome {
            verification: Verification::Mismatched {
                remote: "0123456789abcdef".to_string(),
            },
            ..outcome
        };
        let warning = console::strip_ansi_codes(&success_line(&mismatched, false)).into_owned();
        assert_eq!(
            warning,
            "Warning checksums don't match for 'report.pdf' (local ba7816bf8f01, remote 0123456789ab)"
        );
    }
}
