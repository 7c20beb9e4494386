//! Writing candidates to disk.
//!
//! Every candidate is written by its own task. A [`WriterContext`] bounds how
//! many run at once and how many kilobytes they may have in flight, and
//! tracks inputs that have been moved so a second reference to one reads it
//! from its new location.
//!
//! Each binding goes `Pending -> Skipped` or `Pending -> WriteAttempted ->
//! Verified | Failed`; a failed attempt is retried `write_retry` times
//! before the binding settles at `Failed`.

mod context;

pub use context::{PathGuard, WriterContext};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;

use romsort_core::{Checksums, File};
use romsort_dat::Dat;

use crate::archive_io::{self, ZipSource};
use crate::candidate::{Candidate, ParentCandidates, RomWithFiles};
use crate::error::WriteError;
use crate::hash;
use crate::options::{LinkMode, Options};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteState {
    Pending,
    Skipped,
    WriteAttempted,
    Verified,
    Failed,
}

/// Outcome for one ROM-with-files binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub candidate: String,
    pub input: String,
    pub output: String,
    pub state: WriteState,
    pub attempts: u32,
    pub error: Option<String>,
}

impl WriteResult {
    fn pending(candidate: &Candidate, binding: &RomWithFiles) -> Self {
        Self {
            candidate: candidate.name().to_string(),
            input: binding.input_file().to_string(),
            output: binding.output_file().to_string(),
            state: WriteState::Pending,
            attempts: 0,
            error: None,
        }
    }

    fn settle(mut self, state: WriteState, attempts: u32, error: Option<String>) -> Self {
        self.state = state;
        self.attempts = attempts;
        self.error = error;
        self
    }
}

/// Per-binding results of a writing run, in candidate order.
#[derive(Debug, Clone, Default)]
pub struct WriteSummary {
    pub results: Vec<WriteResult>,
}

impl WriteSummary {
    fn count(&self, state: WriteState) -> usize {
        self.results.iter().filter(|r| r.state == state).count()
    }

    pub fn written(&self) -> usize {
        self.count(WriteState::Verified)
    }

    pub fn skipped(&self) -> usize {
        self.count(WriteState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(WriteState::Failed)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Copies, moves, links, extracts or zips candidates into place.
#[derive(Clone)]
pub struct CandidateWriter {
    options: Arc<Options>,
    context: Arc<WriterContext>,
}

impl CandidateWriter {
    pub fn new(options: Arc<Options>, context: Arc<WriterContext>) -> Self {
        Self { options, context }
    }

    pub fn context(&self) -> &Arc<WriterContext> {
        &self.context
    }

    /// Write every candidate of `dat`.
    ///
    /// Failures of individual bindings end up in the summary. Only errors
    /// that make the whole run pointless (an output directory that cannot be
    /// created) are returned, after every other candidate has finished.
    pub async fn write(
        &self,
        dat: Arc<Dat>,
        candidates: Vec<ParentCandidates>,
    ) -> Result<WriteSummary, WriteError> {
        let (names, handles): (Vec<String>, Vec<JoinHandle<Result<Vec<WriteResult>, WriteError>>>) = candidates
            .into_iter()
            .flat_map(|p| p.candidates)
            .map(|candidate| {
                let writer = self.clone();
                let dat = dat.clone();
                let name = candidate.name().to_string();
                let handle =
                    tokio::spawn(async move { writer.write_candidate(&dat, candidate).await });
                (name, handle)
            })
            .unzip();

        let mut summary = WriteSummary::default();
        let mut fatal = None;
        let results = futures::future::join_all(handles).await;
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(Ok(results)) => summary.results.extend(results),
                Ok(Err(e)) => {
                    log::error!("{}: {}: {}", dat.name, name, e);
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => log::error!("{}: {}: write task failed: {}", dat.name, name, e),
            }
        }

        log::info!(
            "{}: {} written, {} skipped, {} failed",
            dat.name,
            summary.written(),
            summary.skipped(),
            summary.failed()
        );
        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    async fn write_candidate(
        &self,
        dat: &Dat,
        candidate: Candidate,
    ) -> Result<Vec<WriteResult>, WriteError> {
        let _slot = self.context.acquire_slot().await?;
        let _bytes = self.context.acquire_bytes(candidate.total_size()).await?;

        if !self.options.should_write() {
            if self.options.should_test() {
                return Ok(self.test_candidate(dat, &candidate).await);
            }
            return Ok(Vec::new());
        }

        let mut zips: BTreeMap<PathBuf, Vec<RomWithFiles>> = BTreeMap::new();
        let mut raws: BTreeMap<(PathBuf, PathBuf), Vec<RomWithFiles>> = BTreeMap::new();
        for binding in candidate.roms_with_files() {
            let output = binding.output_file();
            if output.is_archive_entry() {
                zips.entry(output.file_path().to_path_buf())
                    .or_default()
                    .push(binding.clone());
            } else {
                let key = (
                    binding.input_file().file_path().to_path_buf(),
                    output.file_path().to_path_buf(),
                );
                raws.entry(key).or_default()
                    .push(binding.clone());
            }
        }

        let mut results = Vec::with_capacity(candidate.roms_with_files().len());
        for (zip_path, bindings) in zips {
            results.extend(self.write_zip(dat, &candidate, &zip_path, bindings).await?);
        }
        for bindings in raws.into_values() {
            results.extend(self.write_raw(dat, &candidate, bindings).await?);
        }
        Ok(results)
    }

    /// Verify existing outputs without writing anything.
    async fn test_candidate(&self, dat: &Dat, candidate: &Candidate) -> Vec<WriteResult> {
        let mut results = Vec::with_capacity(candidate.roms_with_files().len());
        for binding in candidate.roms_with_files() {
            let result = WriteResult::pending(candidate, binding);
            let result = match self.verify(vec![binding.output_file().clone()], true).await {
                Ok(()) => result.settle(WriteState::Verified, 0, None),
                Err(e) => {
                    log::warn!("{}: {}: {}", dat.name, candidate.name(), e);
                    result.settle(WriteState::Failed, 0, Some(e.to_string()))
                }
            };
            results.push(result);
        }
        results
    }

    /// Write the bindings that share one input and one output file. Several
    /// ROMs passed through in one archive are written once and settle
    /// together.
    async fn write_raw(
        &self,
        dat: &Dat,
        candidate: &Candidate,
        bindings: Vec<RomWithFiles>,
    ) -> Result<Vec<WriteResult>, WriteError> {
        let Some(first) = bindings.first() else {
            return Ok(Vec::new());
        };
        let pending: Vec<WriteResult> = bindings
            .iter()
            .map(|b| WriteResult::pending(candidate, b))
            .collect();
        let input = first.input_file();
        let output = first.output_file();
        let outputs: Vec<File> = bindings.iter().map(|b| b.output_file().clone()).collect();
        let inputs: Vec<&File> = bindings.iter().map(|b| b.input_file()).collect();

        if bindings.iter().all(|b| is_in_place(b.input_file(), b.output_file())) {
            log::trace!("{}: {}: {} is already in place", dat.name, candidate.name(), output);
            return Ok(settle_all(pending, WriteState::Skipped, 0, None));
        }
        if self.keep_existing(output.file_path(), outputs.clone()).await {
            log::trace!("{}: {}: not overwriting {}", dat.name, candidate.name(), output);
            return Ok(settle_all(pending, WriteState::Skipped, 0, None));
        }
        create_parent(output.file_path()).await?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = match self.write_raw_once(input, output).await {
                Ok(()) => self.verify(outputs.clone(), self.options.should_test()).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    self.finish_inputs(inputs.iter().copied());
                    self.context.record_output(output.file_path());
                    return Ok(settle_all(pending, WriteState::Verified, attempts, None));
                }
                Err(e) if attempts <= self.options.write_retry => {
                    log::debug!(
                        "{}: {}: attempt {} writing {} failed: {}",
                        dat.name,
                        candidate.name(),
                        attempts,
                        output,
                        e
                    );
                }
                Err(e) => {
                    let failed = self.give_up(
                        dat,
                        candidate,
                        inputs.iter().copied(),
                        output.file_path(),
                        pending[0].clone(),
                        attempts,
                        e,
                    );
                    return Ok(settle_all(pending, failed.state, failed.attempts, failed.error));
                }
            }
        }
    }

    async fn write_raw_once(&self, input: &File, output: &File) -> Result<(), WriteError> {
        let _locks = self.lock_inputs([input]).await;
        let source = self.context.resolve(input);
        let dest = output.file_path().to_path_buf();
        let skip = header_skip(&source);

        if self.options.should_link() {
            let mode = self.options.link_mode;
            let relative = self.options.symlink_relative;
            let target = source.file_path().to_path_buf();
            return blocking(move || link(mode, relative, &target, &dest)).await;
        }

        let renamable = self.options.should_move()
            && !source.is_archive_entry()
            && skip == 0
            && self.context.moved_to(input.file_path()).is_none();
        if renamable {
            let from = source.file_path().to_path_buf();
            let to = dest.clone();
            blocking(move || move_file(&from, &to)).await?;
            self.context.record_move(input.file_path(), dest);
            return Ok(());
        }

        blocking(move || copy_file(&source, skip, &dest)).await
    }

    async fn write_zip(
        &self,
        dat: &Dat,
        candidate: &Candidate,
        zip_path: &Path,
        bindings: Vec<RomWithFiles>,
    ) -> Result<Vec<WriteResult>, WriteError> {
        let pending: Vec<WriteResult> = bindings
            .iter()
            .map(|b| WriteResult::pending(candidate, b))
            .collect();
        let outputs: Vec<File> = bindings.iter().map(|b| b.output_file().clone()).collect();
        let inputs: Vec<&File> = bindings.iter().map(|b| b.input_file()).collect();

        if bindings.iter().all(|b| is_in_place(b.input_file(), b.output_file())) {
            log::trace!("{}: {}: {} is already in place", dat.name, candidate.name(), zip_path.display());
            return Ok(settle_all(pending, WriteState::Skipped, 0, None));
        }
        if self.keep_existing(zip_path, outputs.clone()).await {
            log::trace!("{}: {}: not overwriting {}", dat.name, candidate.name(), zip_path.display());
            return Ok(settle_all(pending, WriteState::Skipped, 0, None));
        }
        create_parent(zip_path).await?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = match self.write_zip_once(zip_path, &bindings).await {
                Ok(()) => self.verify(outputs.clone(), self.options.should_test()).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    self.finish_inputs(inputs.iter().copied());
                    self.context.record_output(zip_path);
                    return Ok(settle_all(pending, WriteState::Verified, attempts, None));
                }
                Err(e) if attempts <= self.options.write_retry => {
                    log::debug!(
                        "{}: {}: attempt {} writing {} failed: {}",
                        dat.name,
                        candidate.name(),
                        attempts,
                        zip_path.display(),
                        e
                    );
                }
                Err(e) => {
                    let failed = self.give_up(
                        dat,
                        candidate,
                        inputs.iter().copied(),
                        zip_path,
                        pending[0].clone(),
                        attempts,
                        e,
                    );
                    return Ok(settle_all(pending, failed.state, failed.attempts, failed.error));
                }
            }
        }
    }

    async fn write_zip_once(&self, zip_path: &Path, bindings: &[RomWithFiles]) -> Result<(), WriteError> {
        let _locks = self.lock_inputs(bindings.iter().map(|b| b.input_file())).await;
        let sources: Vec<(File, String, u64)> = bindings
            .iter()
            .map(|b| {
                let source = self.context.resolve(b.input_file());
                let skip = header_skip(&source);
                let entry_path = b.output_file().entry_path().unwrap_or_default().to_string();
                (source, entry_path, skip)
            })
            .collect();
        let dest = zip_path.to_path_buf();
        blocking(move || {
            let sources: Vec<ZipSource<'_>> = sources
                .iter()
                .map(|(input, entry_path, skip)| ZipSource {
                    input,
                    entry_path,
                    skip: *skip,
                })
                .collect();
            archive_io::write_zip(&dest, &sources)
        })
        .await
    }

    /// Whether an existing output at `path` should be left alone.
    async fn keep_existing(&self, path: &Path, outputs: Vec<File>) -> bool {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) || self.options.overwrite {
            return false;
        }
        if !self.options.overwrite_invalid {
            return true;
        }
        self.verify(outputs, true).await.is_ok()
    }

    async fn verify(&self, outputs: Vec<File>, deep: bool) -> Result<(), WriteError> {
        blocking(move || outputs.iter().try_for_each(|o| verify_output(o, deep))).await
    }

    /// Hold the path locks of every input for the duration of a move.
    /// Locks are taken in path order so two writers never wait on each other.
    async fn lock_inputs<'a>(
        &self,
        inputs: impl IntoIterator<Item = &'a File>,
    ) -> Vec<PathGuard> {
        if !self.options.should_move() {
            return Vec::new();
        }
        let paths: BTreeSet<PathBuf> = inputs
            .into_iter()
            .map(|f| f.file_path().to_path_buf())
            .collect();
        let mut guards = Vec::with_capacity(paths.len());
        for path in paths {
            guards.push(self.context.lock_path(&path).await);
        }
        guards
    }

    fn finish_inputs<'a>(&self, inputs: impl IntoIterator<Item = &'a File>) {
        if !self.options.should_move() {
            return;
        }
        for input in inputs {
            self.context.mark_consumed(input);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn give_up<'a>(
        &self,
        dat: &Dat,
        candidate: &Candidate,
        inputs: impl IntoIterator<Item = &'a File>,
        path: &Path,
        result: WriteResult,
        attempts: u32,
        error: WriteError,
    ) -> WriteResult {
        for input in inputs {
            self.context.retain(input.file_path());
        }
        let exhausted = WriteError::RetriesExhausted {
            path: path.to_path_buf(),
            attempts,
        };
        log::warn!("{}: {}: {}: {}", dat.name, candidate.name(), exhausted, error);
        result.settle(WriteState::Failed, attempts, Some(format!("{exhausted}: {error}")))
    }
}

fn settle_all(
    results: Vec<WriteResult>,
    state: WriteState,
    attempts: u32,
    error: Option<String>,
) -> Vec<WriteResult> {
    results
        .into_iter()
        .map(|r| r.settle(state, attempts, error.clone()))
        .collect()
}

async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, WriteError> + Send + 'static,
) -> Result<T, WriteError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WriteError::Task(e.to_string()))?
}

async fn create_parent(path: &Path) -> Result<(), WriteError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            tokio::fs::create_dir_all(parent).await?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn is_in_place(input: &File, output: &File) -> bool {
    input.file_path() == output.file_path() && input.entry_path() == output.entry_path()
}

/// Bytes to drop from the front of `input` when writing it.
fn header_skip(input: &File) -> u64 {
    input.header().map(|h| h.data_offset()).unwrap_or(0)
}

fn copy_file(source: &File, skip: u64, dest: &Path) -> Result<(), WriteError> {
    let tmp = archive_io::temp_path(dest);
    match archive_io::extract_to(source, skip, &tmp) {
        Ok(_) => {
            fs::rename(&tmp, dest)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn move_file(from: &Path, to: &Path) -> Result<(), WriteError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Different filesystems
    fs::copy(from, to)?;
    fs::remove_file(from)?;
    Ok(())
}

fn link(mode: LinkMode, relative: bool, source: &Path, dest: &Path) -> Result<(), WriteError> {
    if fs::symlink_metadata(dest).is_ok() {
        fs::remove_file(dest)?;
    }
    match mode {
        LinkMode::Hardlink => fs::hard_link(source, dest)?,
        LinkMode::Reflink => {
            fs::copy(source, dest)?;
        }
        LinkMode::Symlink => {
            let source = std::path::absolute(source)?;
            let target = if relative {
                let dest = std::path::absolute(dest)?;
                dest.parent()
                    .and_then(|dir| pathdiff::diff_paths(&source, dir))
                    .unwrap_or(source)
            } else {
                source
            };
            symlink(&target, dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

fn verify_output(expected: &File, deep: bool) -> Result<(), WriteError> {
    match expected {
        File::Entry(_) => verify_entry(expected, deep),
        _ => verify_raw(expected, deep),
    }
}

fn verify_raw(expected: &File, deep: bool) -> Result<(), WriteError> {
    let path = expected.file_path();
    let size = fs::metadata(path)?.len();
    check_size(path, expected, size)?;
    if deep && !expected.checksums().is_empty() {
        let (_, actual) = hash::hash_file(path, expected.checksums().bitmask())?;
        check_checksums(path, expected, &actual)?;
    }
    Ok(())
}

fn verify_entry(expected: &File, deep: bool) -> Result<(), WriteError> {
    let archive = expected
        .archive()
        .ok_or_else(|| WriteError::Task(format!("{expected} has no archive")))?;
    let entry_path = expected.entry_path().unwrap_or_default();
    let entries = archive_io::list_entries(archive)?;
    let actual = entries
        .iter()
        .find(|e| e.entry_path() == Some(entry_path))
        .ok_or_else(|| WriteError::missing_entry(archive.path(), entry_path))?;
    check_size(archive.path(), expected, actual.size())?;
    let checksums = if deep && !expected.checksums().is_empty() {
        archive_io::hash_input(actual, expected.checksums().bitmask(), 0)?.1
    } else {
        actual.checksums().clone()
    };
    check_checksums(archive.path(), expected, &checksums)
}

fn check_size(path: &Path, expected: &File, actual: u64) -> Result<(), WriteError> {
    // Unhashed pass-through archives carry no expectations
    if expected.size() == 0 && expected.checksums().is_empty() {
        return Ok(());
    }
    if expected.size() != actual {
        return Err(WriteError::Verification {
            path: path.to_path_buf(),
            expected: format!("{} bytes", expected.size()),
            actual: format!("{actual} bytes"),
        });
    }
    Ok(())
}

fn check_checksums(path: &Path, expected: &File, actual: &Checksums) -> Result<(), WriteError> {
    if expected.checksums().agrees_with(actual) {
        return Ok(());
    }
    Err(WriteError::Verification {
        path: path.to_path_buf(),
        expected: describe(expected.checksums()),
        actual: describe(actual),
    })
}

fn describe(checksums: &Checksums) -> String {
    checksums
        .bitmask()
        .algorithms()
        .filter_map(|a| checksums.get(a).map(|v| format!("{}={}", a.name(), v)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[path = "tests/writer_tests.rs"]
mod tests;
