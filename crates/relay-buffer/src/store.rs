//! On-disk buffer: the active store and the processing slot.
//!
//! Two well-known files live in the buffer directory:
//!
//! ```text
//! buffer.jsonl             - active store (appended to on failed delivery)
//! buffer_processing.jsonl  - processing log (frozen, drained by the flusher)
//! ```
//!
//! A single mutex covers exactly two operations, appending to the active
//! store and renaming it into the processing slot. The processing log is
//! owned by the flush coordinator alone and is never touched under the lock.

use crate::producer::AppendPolicy;
use crate::{Record, RelayError, RelayResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File name of the active store.
pub const ACTIVE_FILE_NAME: &str = "buffer.jsonl";

/// File name of the processing log.
pub const PROCESSING_FILE_NAME: &str = "buffer_processing.jsonl";

/// Scratch file used while shrinking the processing log after a partial drain.
const PROCESSING_TEMP_FILE_NAME: &str = "buffer_processing.jsonl.tmp";

/// Result of a rotation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rotation {
    /// Active store renamed into the processing slot.
    Rotated { bytes: u64 },
    /// Active store absent or empty.
    Nothing,
    /// A processing log already exists; rotating would interleave backlogs.
    Blocked,
}

/// Result of appending with bounded retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Record is on disk.
    Stored { attempts: u32 },
    /// Record is lost. This is the one acknowledged loss path.
    Dropped { attempts: u32, error: String },
}

/// What startup recovery found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// A processing log from a previous run is waiting to be drained.
    pub processing_log_present: bool,
    /// A half-written scratch file was removed.
    pub stale_temp_removed: bool,
    /// Bytes of an unterminated last line cut from the active store.
    pub torn_bytes_removed: u64,
}

/// Durable newline-delimited record buffer.
pub struct BufferStore {
    dir: PathBuf,
    active: PathBuf,
    processing: PathBuf,
    processing_temp: PathBuf,
    /// Serializes appends against rotation.
    lock: Mutex<()>,
}

impl BufferStore {
    /// Create a store rooted at `dir`. Nothing is created on disk until the
    /// first append.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            active: dir.join(ACTIVE_FILE_NAME),
            processing: dir.join(PROCESSING_FILE_NAME),
            processing_temp: dir.join(PROCESSING_TEMP_FILE_NAME),
            dir,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn active_path(&self) -> &Path {
        &self.active
    }

    pub fn processing_path(&self) -> &Path {
        &self.processing
    }

    /// Run a store operation on the blocking pool.
    ///
    /// Every method here does synchronous file I/O and fsyncs; async callers
    /// go through this instead of calling them on a runtime worker.
    pub async fn blocking<T, F>(self: &Arc<Self>, op: F) -> RelayResult<T>
    where
        F: FnOnce(&BufferStore) -> RelayResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| RelayError::Task(format!("buffer task failed: {}", e)))?
    }

    /// Clean up after a crash. Must run before either loop starts.
    ///
    /// A leftover processing log is kept as is; the first flush tick drains it.
    /// An active store ending in a partial line is cut back to its last
    /// complete record.
    pub fn recover(&self) -> RelayResult<RecoveryReport> {
        let mut report = RecoveryReport {
            processing_log_present: self.has_processing_log(),
            ..Default::default()
        };

        match std::fs::remove_file(&self.processing_temp) {
            Ok(()) => {
                warn!(
                    path = %self.processing_temp.display(),
                    "Removed stale processing scratch file"
                );
                report.stale_temp_removed = true;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        {
            let _guard = self.lock.lock();
            match OpenOptions::new().read(true).write(true).open(&self.active) {
                Ok(mut file) => {
                    let (_, removed) = self.trim_torn_tail(&mut file)?;
                    report.torn_bytes_removed = removed;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if report.processing_log_present {
            info!(
                path = %self.processing.display(),
                "Found processing log from previous run"
            );
        }

        Ok(report)
    }

    /// Append one record to the active store, creating it if needed.
    pub fn append(&self, record: &Record) -> RelayResult<()> {
        // Serialize outside the lock
        let line = record.to_line()?;
        self.append_line(&line)
    }

    /// Append one serialized record followed by a newline.
    ///
    /// A write that fails partway is cut back off, and a partial line left by
    /// an earlier crash is removed first, so every line on disk is whole.
    fn append_line(&self, line: &str) -> RelayResult<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        let _guard = self.lock.lock();
        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.active)?;
        let (len, _) = self.trim_torn_tail(&mut file)?;

        // One write call per line keeps each record contiguous on disk
        let written = file.write_all(&bytes).and_then(|()| file.sync_data());
        if let Err(e) = written {
            if let Err(cut) = file.set_len(len) {
                warn!(
                    error = %cut,
                    "Failed to cut back a partial append; it will be removed on the next append"
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Cut an unterminated last line off the active store.
    ///
    /// Returns the length after the cut and the number of bytes removed.
    /// The removed bytes belong to an append that never completed, so no
    /// caller was told that record was stored.
    fn trim_torn_tail(&self, file: &mut File) -> io::Result<(u64, u64)> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok((0, 0));
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        if last[0] == b'\n' {
            return Ok((len, 0));
        }

        let mut content = Vec::with_capacity(len as usize);
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut content)?;
        let keep = content
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |idx| idx as u64 + 1);

        file.set_len(keep)?;
        file.sync_data()?;

        let removed = len - keep;
        warn!(
            path = %self.active.display(),
            bytes = removed,
            "Cut partial line from active store"
        );
        Ok((keep, removed))
    }

    /// Append with a bounded number of attempts.
    ///
    /// Each attempt runs on the blocking pool. Only storage errors are
    /// retried. Serialization errors drop the record on the first attempt.
    pub async fn append_with_retry(
        self: &Arc<Self>,
        record: &Record,
        policy: &AppendPolicy,
    ) -> AppendOutcome {
        let line = match record.to_line() {
            Ok(line) => line,
            Err(e) => {
                return AppendOutcome::Dropped {
                    attempts: 1,
                    error: e.to_string(),
                }
            }
        };

        let max_attempts = policy.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let line = line.clone();
            match self.blocking(move |store| store.append_line(&line)).await {
                Ok(()) => return AppendOutcome::Stored { attempts: attempt },
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Buffer append failed, retrying"
                    );
                    tokio::time::sleep(policy.backoff).await;
                }
                Err(e) => {
                    return AppendOutcome::Dropped {
                        attempts: attempt,
                        error: e.to_string(),
                    }
                }
            }
        }
    }

    /// Hand the active store off to the processing slot.
    ///
    /// A single rename under the append lock, so a concurrent append either
    /// lands in the old file before the rename or recreates the active store
    /// after it. Once the rename succeeds the handoff has happened; a failed
    /// directory sync afterwards is logged, not returned.
    pub fn rotate(&self) -> RelayResult<Rotation> {
        let bytes = {
            let _guard = self.lock.lock();

            if self.processing.exists() {
                return Ok(Rotation::Blocked);
            }

            let bytes = match std::fs::metadata(&self.active) {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Rotation::Nothing),
                Err(e) => return Err(e.into()),
            };

            if bytes == 0 {
                return Ok(Rotation::Nothing);
            }

            std::fs::rename(&self.active, &self.processing)?;
            bytes
        };

        self.sync_dir_after("rotation");
        debug!(bytes = bytes, "Active store renamed into processing slot");
        Ok(Rotation::Rotated { bytes })
    }

    /// Sync the buffer directory after a rename or removal that already
    /// took effect. Returns whether the sync succeeded.
    fn sync_dir_after(&self, operation: &str) -> bool {
        match fsync_dir(&self.dir) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    operation = operation,
                    dir = %self.dir.display(),
                    error = %e,
                    "Buffer directory sync failed"
                );
                false
            }
        }
    }

    /// Whether a processing log is waiting to be drained.
    pub fn has_processing_log(&self) -> bool {
        self.processing.exists()
    }

    /// Read the processing log as raw lines, in file order.
    ///
    /// Returns `None` when there is no processing log. Lines are kept as
    /// bytes so that a rewrite preserves them exactly, valid UTF-8 or not.
    pub fn read_processing_log(&self) -> RelayResult<Option<Vec<Vec<u8>>>> {
        let content = match std::fs::read(&self.processing) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let lines = content
            .split(|b| *b == b'\n')
            .map(<[u8]>::to_vec)
            .collect();

        Ok(Some(lines))
    }

    /// Replace the processing log with the given lines.
    ///
    /// Written to a scratch file, synced, then renamed over the processing
    /// log, so a crash leaves either the old or the new log, never a mix.
    /// An empty `lines` removes the processing log.
    pub fn replace_processing_log(&self, lines: &[Vec<u8>]) -> RelayResult<()> {
        if lines.is_empty() {
            return self.remove_processing_log();
        }

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.processing_temp)?;
            for line in lines {
                file.write_all(line)?;
                file.write_all(b"\n")?;
            }
            fsync_file(&file)?;
        }

        std::fs::rename(&self.processing_temp, &self.processing)?;
        self.sync_dir_after("processing log rewrite");
        Ok(())
    }

    /// Delete the processing log. Missing is not an error.
    pub fn remove_processing_log(&self) -> RelayResult<()> {
        match std::fs::remove_file(&self.processing) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(RelayError::Io(e)),
        }
        self.sync_dir_after("processing log removal");
        Ok(())
    }

    /// Number of records waiting in the active store.
    pub fn pending_active_records(&self) -> RelayResult<usize> {
        let _guard = self.lock.lock();
        count_records(&self.active)
    }

    /// Number of records waiting in the processing log.
    pub fn pending_processing_records(&self) -> RelayResult<usize> {
        count_records(&self.processing)
    }
}

/// Whether a buffer line holds nothing but whitespace.
pub(crate) fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn count_records(path: &Path) -> RelayResult<usize> {
    match std::fs::read(path) {
        Ok(content) => Ok(content
            .split(|b| *b == b'\n')
            .filter(|line| !is_blank(line))
            .count()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Make renames and removals in `dir` durable.
#[cfg(unix)]
fn fsync_dir(dir: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir)?;
    dir.sync_all()
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
