use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

use romsort_core::util::kilobytes_ceil;
use romsort_core::{Archive, File};

use crate::archive_io;
use crate::error::WriteError;
use crate::options::Options;

/// Bookkeeping for moved inputs.
#[derive(Debug, Default)]
struct Ledger {
    /// Original input path -> where it was renamed to
    moved: HashMap<PathBuf, PathBuf>,
    /// Inputs that were read whole and can be removed once the run ends
    consumed: BTreeSet<PathBuf>,
    /// Entries read out of each input archive
    consumed_entries: BTreeMap<PathBuf, (Archive, BTreeSet<String>)>,
    /// Inputs with at least one failed write; never removed
    retained: HashSet<PathBuf>,
    /// Paths written during the run
    outputs: HashSet<PathBuf>,
}

/// Shared state for one writing run.
///
/// Holds the two concurrency gates (candidates in flight, kilobytes in
/// flight), the path-keyed locks that serialize moves of the same input,
/// and the move ledger. Create one per run; nothing here is global.
#[derive(Debug)]
pub struct WriterContext {
    slots: Arc<Semaphore>,
    bytes: Arc<Semaphore>,
    byte_capacity: u32,
    path_locks: Arc<PathLocks>,
    ledger: Mutex<Ledger>,
}

impl WriterContext {
    pub fn new(max_threads: usize, max_in_flight_kb: u64) -> Self {
        let byte_capacity = max_in_flight_kb
            .clamp(1, u64::from(u32::MAX))
            .min(Semaphore::MAX_PERMITS as u64) as u32;
        Self {
            slots: Arc::new(Semaphore::new(max_threads.clamp(1, Semaphore::MAX_PERMITS))),
            bytes: Arc::new(Semaphore::new(byte_capacity as usize)),
            byte_capacity,
            path_locks: Arc::default(),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn from_options(options: &Options) -> Self {
        Self::new(options.max_threads, options.max_in_flight_kb)
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn available_kilobytes(&self) -> usize {
        self.bytes.available_permits()
    }

    /// Wait for a free candidate slot.
    pub async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, WriteError> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| WriteError::Task(e.to_string()))
    }

    /// Wait until `bytes` (rounded up to whole kilobytes) fit in the byte
    /// gate. A request larger than the whole gate takes all of it, so a huge
    /// file runs alone instead of never running.
    pub async fn acquire_bytes(&self, bytes: u64) -> Result<OwnedSemaphorePermit, WriteError> {
        let kilobytes = kilobytes_ceil(bytes).min(u64::from(self.byte_capacity)) as u32;
        self.bytes
            .clone()
            .acquire_many_owned(kilobytes)
            .await
            .map_err(|e| WriteError::Task(e.to_string()))
    }

    /// Exclusive access to operations on `path`. The lock is forgotten once
    /// its last holder or waiter is gone.
    pub async fn lock_path(&self, path: &Path) -> PathGuard {
        let lock = self.path_locks.get(path);
        let guard = lock.lock_owned().await;
        PathGuard {
            guard: Some(guard),
            path: path.to_path_buf(),
            locks: self.path_locks.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_paths(&self) -> usize {
        self.path_locks.map().len()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Where `path` was moved to earlier in the run, if anywhere.
    pub fn moved_to(&self, path: &Path) -> Option<PathBuf> {
        self.ledger().moved.get(path).cloned()
    }

    /// `file`, relocated if its physical file was moved.
    pub fn resolve(&self, file: &File) -> File {
        match self.moved_to(file.file_path()) {
            Some(path) => file.clone().with_file_path(path),
            None => file.clone(),
        }
    }

    pub fn record_move(&self, from: impl Into<PathBuf>, to: impl Into<PathBuf>) {
        let (from, to) = (from.into(), to.into());
        log::trace!("moved {} -> {}", from.display(), to.display());
        let mut ledger = self.ledger();
        ledger.outputs.insert(to.clone());
        ledger.moved.insert(from, to);
    }

    /// Mark an input as read by a move, to be deleted by
    /// [`delete_moved_inputs`](Self::delete_moved_inputs). An archive entry
    /// only counts toward its archive; the archive goes once every entry in
    /// it has been read.
    pub fn mark_consumed(&self, input: &File) {
        let mut ledger = self.ledger();
        match (input.archive(), input.entry_path()) {
            (Some(archive), Some(entry_path)) => {
                ledger
                    .consumed_entries
                    .entry(archive.path().to_path_buf())
                    .or_insert_with(|| (archive.clone(), BTreeSet::new()))
                    .1
                    .insert(entry_path.to_string());
            }
            _ => {
                ledger.consumed.insert(input.file_path().to_path_buf());
            }
        }
    }

    /// Keep an input around because something read from it failed.
    pub fn retain(&self, path: impl Into<PathBuf>) {
        self.ledger().retained.insert(path.into());
    }

    pub fn record_output(&self, path: impl Into<PathBuf>) {
        self.ledger().outputs.insert(path.into());
    }

    /// Consumed inputs that are safe to delete.
    ///
    /// Archives that were only read entry by entry are listed again, and
    /// kept if any entry was left unread or the listing fails.
    pub fn moved_inputs(&self) -> Vec<PathBuf> {
        let (mut paths, partial) = {
            let ledger = self.ledger();
            let keep = |p: &PathBuf| !ledger.retained.contains(p) && !ledger.outputs.contains(p);
            let paths: BTreeSet<PathBuf> = ledger.consumed.iter().filter(|p| keep(*p)).cloned().collect();
            let partial: Vec<(Archive, BTreeSet<String>)> = ledger
                .consumed_entries
                .iter()
                .filter(|(p, _)| keep(*p) && !paths.contains(*p))
                .map(|(_, read)| read.clone())
                .collect();
            (paths, partial)
        };

        for (archive, read) in partial {
            match archive_io::list_entries(&archive) {
                Ok(entries) => {
                    let unread = entries
                        .iter()
                        .filter(|e| !e.entry_path().is_some_and(|p| read.contains(p)))
                        .count();
                    if unread == 0 {
                        paths.insert(archive.path().to_path_buf());
                    } else {
                        log::debug!(
                            "keeping {}: {} entries were not moved",
                            archive.path().display(),
                            unread
                        );
                    }
                }
                Err(e) => log::debug!("keeping {}: {}", archive.path().display(), e),
            }
        }
        paths.into_iter().collect()
    }

    /// Delete every consumed input once all candidates have been written.
    /// Returns the paths actually removed.
    pub async fn delete_moved_inputs(&self) -> Result<Vec<PathBuf>, WriteError> {
        let mut deleted = Vec::new();
        for path in self.moved_inputs() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    log::debug!("deleted moved input {}", path.display());
                    deleted.push(path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(deleted)
    }
}

/// Path-keyed async locks, created on demand.
#[derive(Debug, Default)]
struct PathLocks(Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>);

impl PathLocks {
    fn map(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<AsyncMutex<()>>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        self.map().entry(path.to_path_buf()).or_default().clone()
    }

    /// Drop the lock for `path` if nobody else holds or awaits it.
    fn release(&self, path: &Path) {
        let mut map = self.map();
        if map.get(path).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(path);
        }
    }
}

/// Held lock on one path; see [`WriterContext::lock_path`].
#[derive(Debug)]
pub struct PathGuard {
    guard: Option<OwnedMutexGuard<()>>,
    path: PathBuf,
    locks: Arc<PathLocks>,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(&self.path);
    }
}
