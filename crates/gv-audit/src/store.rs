// store.rs — Append-only audit storage.
//
// Two traits split the surface: `AuditReader` is everything the replay side
// may touch, `AuditStore` adds `append`. Neither offers a way to change or
// remove a stored event: `update` and `delete` exist only to fail loudly
// with `ImmutabilityViolation`, and appending an id that is already stored
// fails the same way.
//
// Readers get snapshot semantics: `snapshot()` returns the events visible
// at the moment of the call, and later appends never show up in it.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use uuid::Uuid;

use crate::error::{AuditError, Mutation};
use crate::event::AuditEvent;

/// Read-only view over stored events.
pub trait AuditReader: Send + Sync {
    /// All events visible now, in append order.
    fn snapshot(&self) -> Result<Vec<AuditEvent>, AuditError>;

    /// Number of events visible now.
    fn len(&self) -> Result<usize, AuditError>;

    fn is_empty(&self) -> Result<bool, AuditError> {
        Ok(self.len()? == 0)
    }

    fn get(&self, event_id: Uuid) -> Result<Option<AuditEvent>, AuditError> {
        Ok(self
            .snapshot()?
            .into_iter()
            .find(|e| e.event_id == event_id))
    }
}

/// Append-only event storage.
pub trait AuditStore: AuditReader {
    /// Persist one event. Fails with `ImmutabilityViolation` if the id exists.
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError>;

    /// Always fails: stored events cannot change.
    fn update(&self, event: &AuditEvent) -> Result<(), AuditError> {
        tracing::warn!(event_id = %event.event_id, "refused audit event update");
        Err(AuditError::ImmutabilityViolation {
            event_id: event.event_id,
            mutation: Mutation::Update,
        })
    }

    /// Always fails: stored events cannot be removed.
    fn delete(&self, event_id: Uuid) -> Result<(), AuditError> {
        tracing::warn!(event_id = %event_id, "refused audit event delete");
        Err(AuditError::ImmutabilityViolation {
            event_id,
            mutation: Mutation::Delete,
        })
    }
}

fn poisoned<T>(err: std::sync::PoisonError<T>) -> AuditError {
    AuditError::LockPoisoned(err.to_string())
}

fn duplicate(event_id: Uuid) -> AuditError {
    tracing::warn!(event_id = %event_id, "refused duplicate audit event id");
    AuditError::ImmutabilityViolation {
        event_id,
        mutation: Mutation::Overwrite,
    }
}

// ── In-memory store ──

#[derive(Default)]
struct MemoryInner {
    events: Vec<AuditEvent>,
    ids: HashSet<Uuid>,
}

/// Process-local store, used by tests and ephemeral governors.
#[derive(Default)]
pub struct MemoryAuditStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditReader for MemoryAuditStore {
    fn snapshot(&self) -> Result<Vec<AuditEvent>, AuditError> {
        Ok(self.inner.read().map_err(poisoned)?.events.clone())
    }

    fn len(&self) -> Result<usize, AuditError> {
        Ok(self.inner.read().map_err(poisoned)?.events.len())
    }

    fn get(&self, event_id: Uuid) -> Result<Option<AuditEvent>, AuditError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .events
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned())
    }
}

impl AuditStore for MemoryAuditStore {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if !inner.ids.insert(event.event_id) {
            return Err(duplicate(event.event_id));
        }
        inner.events.push(event.clone());
        Ok(())
    }
}

// ── JSONL file store ──

struct JsonlInner {
    file: File,
    /// File length after the last complete line. A failed write is cut back
    /// to this so a retry never lands behind a partial line.
    good_len: u64,
    /// Set when a write failed and the tail has not been cut back yet.
    needs_repair: bool,
    ids: HashSet<Uuid>,
    /// Complete lines written so far. Readers only look at this prefix.
    committed: usize,
}

/// An append-only audit store backed by a JSONL file: one event per line.
///
/// The file is opened in append mode and each event is written with a
/// single unbuffered `write_all`.
pub struct JsonlAuditStore {
    path: PathBuf,
    inner: Mutex<JsonlInner>,
}

impl JsonlAuditStore {
    /// Open (or create) a store at `path`, indexing any existing events.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| AuditError::OpenFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let existing = if path.exists() {
            read_events(&path, usize::MAX)?
        } else {
            Vec::new()
        };
        let mut ids = HashSet::with_capacity(existing.len());
        for event in &existing {
            if !ids.insert(event.event_id) {
                return Err(AuditError::Corrupt {
                    path: path.clone(),
                    line: 0,
                    message: format!("event id {} appears more than once", event.event_id),
                });
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        let good_len = file.metadata()?.len();

        tracing::debug!(path = %path.display(), events = existing.len(), "opened audit store");
        Ok(Self {
            path,
            inner: Mutex::new(JsonlInner {
                file,
                good_len,
                needs_repair: false,
                ids,
                committed: existing.len(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop whatever a failed write left after the last complete line and
    /// start over on a fresh append handle.
    fn repair(&self, inner: &mut JsonlInner) -> Result<(), AuditError> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| AuditError::OpenFailed {
                path: self.path.clone(),
                source,
            })?;
        file.set_len(inner.good_len)?;
        inner.file = file;
        inner.needs_repair = false;
        Ok(())
    }
}

impl AuditReader for JsonlAuditStore {
    fn snapshot(&self) -> Result<Vec<AuditEvent>, AuditError> {
        // Fix the watermark first; lines past it may still be in flight.
        let committed = self.len()?;
        read_events(&self.path, committed)
    }

    fn len(&self) -> Result<usize, AuditError> {
        Ok(self.inner.lock().map_err(poisoned)?.committed)
    }
}

impl AuditStore for JsonlAuditStore {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut inner = self.inner.lock().map_err(poisoned)?;
        if inner.ids.contains(&event.event_id) {
            return Err(duplicate(event.event_id));
        }
        if inner.needs_repair {
            self.repair(&mut inner)?;
        }
        if let Err(err) = write_line(&mut inner.file, &line) {
            inner.needs_repair = true;
            if let Err(repair_err) = self.repair(&mut inner) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %repair_err,
                    "could not cut back a failed audit write; will retry before the next append"
                );
            }
            return Err(err.into());
        }
        inner.good_len += line.len() as u64;
        inner.ids.insert(event.event_id);
        inner.committed += 1;
        Ok(())
    }
}

fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line)?;
    file.flush()
}

/// Read up to `limit` events from a JSONL file. Blank lines are skipped.
pub fn read_events(path: &Path, limit: usize) -> Result<Vec<AuditEvent>, AuditError> {
    let file = File::open(path).map_err(|source| AuditError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let mut events = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        if events.len() >= limit {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: AuditEvent =
            serde_json::from_str(&line).map_err(|e| AuditError::Corrupt {
                path: path.to_path_buf(),
                line: index + 1,
                message: e.to_string(),
            })?;
        events.push(event);
    }
    Ok(events)
}
