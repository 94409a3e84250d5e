// dispatcher.rs — Non-blocking audit emission.
//
// Governed operations must never wait on audit I/O. `submit` validates the
// fields, stamps id and timestamp, and hands the event to a single worker
// thread over a bounded channel. When the channel is full the event goes
// straight to the spool, a durable JSONL retry queue, so the caller still
// returns immediately.
//
// The worker commits through AuditWriter with bounded exponential backoff.
// An event that exhausts its attempts is spooled, counted and reported to
// the AlertSink. Spooled events are redelivered when the dispatcher starts
// and whenever `drain_spool` is called; an id the store already holds counts
// as delivered, so redelivery is idempotent and a batch interrupted halfway
// can simply be redelivered again.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuditError;
use crate::event::{AuditEvent, AuditEventFields};
use crate::writer::AuditWriter;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 25,
            max_backoff_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): doubles each time, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            retry: RetryPolicy::default(),
        }
    }
}

/// Receives operational alerts when an audit write cannot be completed.
pub trait AlertSink: Send + Sync {
    fn delivery_exhausted(&self, event: &AuditEvent, attempts: u32, error: &AuditError);

    /// The event could not even be spooled. It exists only in this alert.
    fn spool_failed(&self, event: &AuditEvent, error: &AuditError) {
        tracing::error!(
            event_id = %event.event_id,
            intent = %event.intent,
            chain = %event.chain_key(),
            event = %serde_json::to_string(event).unwrap_or_default(),
            error = %error,
            "audit event could not be spooled"
        );
    }
}

/// Default sink: an `error!` line for whoever watches the logs.
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn delivery_exhausted(&self, event: &AuditEvent, attempts: u32, error: &AuditError) {
        tracing::error!(
            event_id = %event.event_id,
            intent = %event.intent,
            chain = %event.chain_key(),
            attempts,
            error = %error,
            "audit write exhausted retries; event spooled for redelivery"
        );
    }
}

// ── Spool ──

/// Pending events in a JSONL file, plus the batch being redelivered.
///
/// Redelivery renames the spool to `<path>.inflight` and only removes that
/// file once every event in it is committed or spooled again, so a crash
/// mid-redelivery loses nothing. Lines that do not parse are moved to
/// `<path>.rejected` instead of blocking the rest.
struct FileSpool {
    path: PathBuf,
    in_flight_path: PathBuf,
    rejected_path: PathBuf,
    queued: usize,
    in_flight: usize,
}

impl FileSpool {
    fn begin(&mut self) -> Result<Vec<AuditEvent>, AuditError> {
        if self.path.is_file() {
            if self.in_flight_path.is_file() {
                // Left over from an interrupted redelivery: fold the new spool in.
                let pending = std::fs::read(&self.path)?;
                let mut in_flight = open_append(&self.in_flight_path)?;
                if ends_mid_line(&mut in_flight)? {
                    in_flight.write_all(b"\n")?;
                }
                in_flight.write_all(&pending)?;
                in_flight.flush()?;
                std::fs::remove_file(&self.path)?;
            } else {
                std::fs::rename(&self.path, &self.in_flight_path)?;
            }
            self.queued = 0;
        }
        if !self.in_flight_path.is_file() {
            return Ok(Vec::new());
        }
        let events = self.read_in_flight()?;
        self.in_flight = events.len();
        Ok(events)
    }

    fn finish(&mut self) -> Result<(), AuditError> {
        if self.in_flight_path.is_file() {
            std::fs::remove_file(&self.in_flight_path)?;
        }
        self.in_flight = 0;
        Ok(())
    }

    fn read_in_flight(&self) -> Result<Vec<AuditEvent>, AuditError> {
        let raw = std::fs::read(&self.in_flight_path)?;
        let mut events = Vec::new();
        let mut rejected = Vec::new();
        for (index, line) in raw.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<AuditEvent>(line) {
                Ok(event) => events.push(event),
                Err(err) => {
                    tracing::warn!(
                        path = %self.in_flight_path.display(),
                        line = index + 1,
                        error = %err,
                        "unreadable spool entry moved to {}",
                        self.rejected_path.display()
                    );
                    rejected.extend_from_slice(line);
                    rejected.push(b'\n');
                }
            }
        }
        if !rejected.is_empty() {
            let mut file = open_append(&self.rejected_path)?;
            file.write_all(&rejected)?;
            file.flush()?;
        }
        Ok(events)
    }
}

enum SpoolBackend {
    File(FileSpool),
    Memory(Vec<AuditEvent>),
}

/// Durable retry queue for events that could not be committed yet.
pub struct Spool {
    backend: Mutex<SpoolBackend>,
}

impl Spool {
    /// A JSONL spool file. Parent directories are created as needed.
    pub fn file(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| AuditError::OpenFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let in_flight_path = sibling(&path, "inflight");
        let spool = FileSpool {
            queued: count_lines(&path)?,
            in_flight: count_lines(&in_flight_path)?,
            rejected_path: sibling(&path, "rejected"),
            in_flight_path,
            path,
        };
        Ok(Self {
            backend: Mutex::new(SpoolBackend::File(spool)),
        })
    }

    /// A process-local spool. Not durable; for tests and ephemeral use.
    pub fn memory() -> Self {
        Self {
            backend: Mutex::new(SpoolBackend::Memory(Vec::new())),
        }
    }

    pub fn push(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut backend = self.lock()?;
        match &mut *backend {
            SpoolBackend::File(spool) => {
                let mut line = serde_json::to_vec(event)?;
                line.push(b'\n');
                let mut file = open_append(&spool.path)?;
                if ends_mid_line(&mut file)? {
                    line.insert(0, b'\n');
                }
                file.write_all(&line)?;
                file.flush()?;
                spool.queued += 1;
            }
            SpoolBackend::Memory(events) => events.push(event.clone()),
        }
        Ok(())
    }

    /// Start redelivering: every spooled event, oldest first. They stay on
    /// disk until `finish_redelivery`.
    pub fn begin_redelivery(&self) -> Result<Vec<AuditEvent>, AuditError> {
        let mut backend = self.lock()?;
        match &mut *backend {
            SpoolBackend::File(spool) => spool.begin(),
            SpoolBackend::Memory(events) => Ok(std::mem::take(events)),
        }
    }

    /// Forget the batch from `begin_redelivery`. Call once each of its
    /// events is either committed or pushed back onto the spool.
    pub fn finish_redelivery(&self) -> Result<(), AuditError> {
        let mut backend = self.lock()?;
        match &mut *backend {
            SpoolBackend::File(spool) => spool.finish(),
            SpoolBackend::Memory(_) => Ok(()),
        }
    }

    /// Events waiting, counting a batch still being redelivered.
    pub fn len(&self) -> Result<usize, AuditError> {
        let backend = self.lock()?;
        Ok(match &*backend {
            SpoolBackend::File(spool) => spool.queued + spool.in_flight,
            SpoolBackend::Memory(events) => events.len(),
        })
    }

    pub fn is_empty(&self) -> Result<bool, AuditError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SpoolBackend>, AuditError> {
        self.backend
            .lock()
            .map_err(|e| AuditError::LockPoisoned(e.to_string()))
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn open_append(path: &Path) -> Result<File, AuditError> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })
}

/// Whether the file's last byte is something other than a newline, as after
/// an interrupted write.
fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn count_lines(path: &Path) -> Result<usize, AuditError> {
    if !path.is_file() {
        return Ok(0);
    }
    let file = File::open(path).map_err(|source| AuditError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let mut count = 0;
    for line in BufReader::new(file).split(b'\n') {
        if !line?.iter().all(u8::is_ascii_whitespace) {
            count += 1;
        }
    }
    Ok(count)
}

// ── Stats ──

#[derive(Default)]
struct DispatchCounters {
    submitted: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    spooled: AtomicU64,
    exhausted: AtomicU64,
    lost: AtomicU64,
}

/// Point-in-time dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub submitted: u64,
    pub delivered: u64,
    /// Failed attempts that were retried.
    pub retried: u64,
    /// Events written to the spool (queue overflow or exhausted retries).
    pub spooled: u64,
    /// Events whose retries ran out.
    pub exhausted: u64,
    /// Events that could be neither stored nor spooled.
    pub lost: u64,
}

// ── Dispatcher ──

enum Command {
    Deliver(AuditEvent),
    Flush(SyncSender<()>),
    DrainSpool(SyncSender<usize>),
}

struct Shared {
    writer: Arc<AuditWriter>,
    spool: Spool,
    retry: RetryPolicy,
    alerts: Arc<dyn AlertSink>,
    counters: DispatchCounters,
}

pub struct AuditDispatcher {
    sender: Option<SyncSender<Command>>,
    worker: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl AuditDispatcher {
    /// Start the worker thread. Anything left in the spool is redelivered
    /// before new submissions are processed.
    pub fn start(
        writer: Arc<AuditWriter>,
        spool: Spool,
        config: DispatcherConfig,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self, AuditError> {
        let (sender, receiver) = sync_channel(config.queue_capacity.max(1));
        let shared = Arc::new(Shared {
            writer,
            spool,
            retry: config.retry,
            alerts,
            counters: DispatchCounters::default(),
        });
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("gv-audit-dispatch".to_string())
            .spawn(move || worker_shared.run(receiver))?;

        tracing::debug!(
            capacity = config.queue_capacity,
            max_attempts = config.retry.max_attempts,
            "audit dispatcher started"
        );
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            shared,
        })
    }

    /// Queue an event and return its id without waiting for storage.
    ///
    /// Only validation problems are returned as errors; delivery problems,
    /// including a failing spool, are handled by retry, spool and alert.
    pub fn submit(&self, fields: AuditEventFields) -> Result<Uuid, AuditError> {
        if let Err(err) = fields.validate() {
            tracing::warn!(intent = %fields.intent, error = %err, "rejected audit submission");
            return Err(err);
        }
        let event = AuditEvent::from_fields(fields, Uuid::now_v7(), Utc::now());
        let event_id = event.event_id;
        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let Some(sender) = &self.sender else {
            self.shared.spill(&event);
            return Ok(event_id);
        };
        match sender.try_send(Command::Deliver(event)) {
            Ok(()) => Ok(event_id),
            Err(TrySendError::Full(cmd)) | Err(TrySendError::Disconnected(cmd)) => {
                if let Command::Deliver(event) = cmd {
                    tracing::warn!(event_id = %event_id, "audit queue unavailable; spooling event");
                    self.shared.spill(&event);
                }
                Ok(event_id)
            }
        }
    }

    /// Block until everything queued before this call has been processed.
    pub fn flush(&self) -> Result<(), AuditError> {
        let (ack, done) = sync_channel(1);
        self.send(Command::Flush(ack))?;
        done.recv().map_err(|_| AuditError::DispatcherClosed)
    }

    /// Redeliver spooled events now. Returns how many were committed.
    pub fn drain_spool(&self) -> Result<usize, AuditError> {
        let (ack, done) = sync_channel(1);
        self.send(Command::DrainSpool(ack))?;
        done.recv().map_err(|_| AuditError::DispatcherClosed)
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.shared.counters;
        DispatchStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
            spooled: c.spooled.load(Ordering::Relaxed),
            exhausted: c.exhausted.load(Ordering::Relaxed),
            lost: c.lost.load(Ordering::Relaxed),
        }
    }

    pub fn spool_len(&self) -> Result<usize, AuditError> {
        self.shared.spool.len()
    }

    fn send(&self, cmd: Command) -> Result<(), AuditError> {
        self.sender
            .as_ref()
            .ok_or(AuditError::DispatcherClosed)?
            .send(cmd)
            .map_err(|_| AuditError::DispatcherClosed)
    }
}

impl Drop for AuditDispatcher {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish the queue and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("audit dispatcher worker panicked");
            }
        }
    }
}

impl Shared {
    fn run(&self, receiver: Receiver<Command>) {
        let redelivered = self.redeliver();
        if redelivered > 0 {
            tracing::info!(redelivered, "redelivered spooled audit events");
        }
        for cmd in receiver {
            match cmd {
                Command::Deliver(event) => {
                    self.deliver(event);
                }
                Command::Flush(ack) => {
                    let _ = ack.send(());
                }
                Command::DrainSpool(ack) => {
                    let _ = ack.send(self.redeliver());
                }
            }
        }
        tracing::debug!("audit dispatcher stopped");
    }

    fn redeliver(&self) -> usize {
        let events = match self.spool.begin_redelivery() {
            Ok(events) => events,
            Err(err) => {
                tracing::error!(error = %err, "could not read audit spool");
                return 0;
            }
        };
        // Every event is now committed or spooled again.
        let delivered = events.into_iter().filter(|e| self.deliver(e.clone())).count();
        if let Err(err) = self.spool.finish_redelivery() {
            tracing::error!(error = %err, "could not clear redelivered audit spool");
        }
        delivered
    }

    /// Commit with retries. Returns whether the event is now stored.
    fn deliver(&self, event: AuditEvent) -> bool {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.writer.commit(event.clone()) {
                Ok(_) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(err) if err.is_duplicate() => {
                    tracing::debug!(event_id = %event.event_id, "audit event already stored");
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    self.counters.retried.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        event_id = %event.event_id,
                        attempt,
                        error = %err,
                        "audit write failed; retrying"
                    );
                    thread::sleep(self.retry.backoff(attempt));
                }
                Err(err) => {
                    self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
                    self.spill(&event);
                    self.alerts.delivery_exhausted(&event, attempt, &err);
                    return false;
                }
            }
        }
    }

    fn spill(&self, event: &AuditEvent) {
        match self.spool.push(event) {
            Ok(()) => {
                self.counters.spooled.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.counters.lost.fetch_add(1, Ordering::Relaxed);
                self.alerts.spool_failed(event, &err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ActorType, Intent};
    use crate::store::{AuditReader, AuditStore, MemoryAuditStore};
    use std::sync::atomic::AtomicU32;
    use std::sync::Condvar;
    use tempfile::tempdir;

    /// Fails the first `failures` appends with an I/O error.
    struct FlakyStore {
        inner: MemoryAuditStore,
        failures: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryAuditStore::new(),
                failures: AtomicU32::new(failures),
            }
        }
    }

    impl AuditReader for FlakyStore {
        fn snapshot(&self) -> Result<Vec<AuditEvent>, AuditError> {
            self.inner.snapshot()
        }
        fn len(&self) -> Result<usize, AuditError> {
            self.inner.len()
        }
    }

    impl AuditStore for FlakyStore {
        fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(AuditError::WriteFailed(std::io::Error::other("disk full")));
            }
            self.inner.append(event)
        }
    }

    /// Blocks every append until `open()` is called.
    struct GatedStore {
        inner: MemoryAuditStore,
        gate: (Mutex<bool>, Condvar),
    }

    impl GatedStore {
        fn open(&self) {
            *self.gate.0.lock().unwrap() = true;
            self.gate.1.notify_all();
        }
    }

    impl AuditReader for GatedStore {
        fn snapshot(&self) -> Result<Vec<AuditEvent>, AuditError> {
            self.inner.snapshot()
        }
        fn len(&self) -> Result<usize, AuditError> {
            self.inner.len()
        }
    }

    impl AuditStore for GatedStore {
        fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
            let mut open = self.gate.0.lock().unwrap();
            while !*open {
                open = self.gate.1.wait(open).unwrap();
            }
            drop(open);
            self.inner.append(event)
        }
    }

    #[derive(Default)]
    struct RecordingAlerts {
        events: Mutex<Vec<Uuid>>,
        unspooled: Mutex<Vec<Uuid>>,
    }

    impl AlertSink for RecordingAlerts {
        fn delivery_exhausted(&self, event: &AuditEvent, _attempts: u32, _error: &AuditError) {
            self.events.lock().unwrap().push(event.event_id);
        }

        fn spool_failed(&self, event: &AuditEvent, _error: &AuditError) {
            self.unspooled.lock().unwrap().push(event.event_id);
        }
    }

    fn fast_retry(max_attempts: u32) -> DispatcherConfig {
        DispatcherConfig {
            queue_capacity: 16,
            retry: RetryPolicy {
                max_attempts,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
        }
    }

    fn simulate(object: &str) -> AuditEventFields {
        AuditEventFields::new("t1", "gv", ActorType::System, "policy.evaluate", Intent::Simulate)
            .with_object("policy", object, 1)
            .with_new_state_hash("outcome")
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(25));
        assert_eq!(policy.backoff(2), Duration::from_millis(50));
        assert_eq!(policy.backoff(4), Duration::from_millis(200));
        assert_eq!(policy.backoff(7), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(200), Duration::from_millis(1_000));
    }

    #[test]
    fn transient_failures_are_retried() {
        let store = Arc::new(FlakyStore::new(2));
        let writer = Arc::new(AuditWriter::new(store.clone()).unwrap());
        let alerts = Arc::new(RecordingAlerts::default());
        let dispatcher =
            AuditDispatcher::start(writer, Spool::memory(), fast_retry(5), alerts.clone())
                .unwrap();

        let id = dispatcher.submit(simulate("p")).unwrap();
        dispatcher.flush().unwrap();

        assert_eq!(store.snapshot().unwrap()[0].event_id, id);
        let stats = dispatcher.stats();
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.exhausted, 0);
        assert!(alerts.events.lock().unwrap().is_empty());
    }

    #[test]
    fn exhausted_events_are_spooled_alerted_and_redelivered() {
        let store = Arc::new(FlakyStore::new(u32::MAX));
        let writer = Arc::new(AuditWriter::new(store.clone()).unwrap());
        let alerts = Arc::new(RecordingAlerts::default());
        let dispatcher =
            AuditDispatcher::start(writer, Spool::memory(), fast_retry(3), alerts.clone())
                .unwrap();

        let id = dispatcher.submit(simulate("p")).unwrap();
        dispatcher.flush().unwrap();

        assert_eq!(store.len().unwrap(), 0);
        assert_eq!(dispatcher.spool_len().unwrap(), 1);
        assert_eq!(*alerts.events.lock().unwrap(), vec![id]);
        assert_eq!(dispatcher.stats().exhausted, 1);

        store.failures.store(0, Ordering::SeqCst);
        assert_eq!(dispatcher.drain_spool().unwrap(), 1);
        assert_eq!(store.snapshot().unwrap()[0].event_id, id);
        assert_eq!(dispatcher.spool_len().unwrap(), 0);
    }

    #[test]
    fn invalid_submissions_are_rejected_synchronously() {
        let store = Arc::new(MemoryAuditStore::new());
        let writer = Arc::new(AuditWriter::new(store.clone()).unwrap());
        let dispatcher = AuditDispatcher::start(
            writer,
            Spool::memory(),
            fast_retry(1),
            Arc::new(TracingAlertSink),
        )
        .unwrap();

        let mut fields = simulate("p");
        fields.intent = Intent::Disable;
        assert!(matches!(
            dispatcher.submit(fields),
            Err(AuditError::ConfirmationRequired { .. })
        ));
        assert_eq!(dispatcher.stats().submitted, 0);
    }

    #[test]
    fn full_queue_spills_to_spool_without_blocking() {
        let store = Arc::new(GatedStore {
            inner: MemoryAuditStore::new(),
            gate: (Mutex::new(false), Condvar::new()),
        });
        let writer = Arc::new(AuditWriter::new(store.clone()).unwrap());
        let config = DispatcherConfig {
            queue_capacity: 1,
            ..fast_retry(1)
        };
        let dispatcher =
            AuditDispatcher::start(writer, Spool::memory(), config, Arc::new(TracingAlertSink))
                .unwrap();

        // At most one event is in the worker and one in the queue.
        for _ in 0..5 {
            dispatcher.submit(simulate("p")).unwrap();
        }
        assert!(dispatcher.stats().spooled >= 3);

        store.open();
        dispatcher.flush().unwrap();
        dispatcher.drain_spool().unwrap();
        assert_eq!(store.len().unwrap(), 5);
    }

    #[test]
    fn file_spool_is_redelivered_on_start() {
        let dir = tempdir().unwrap();
        let spool_path = dir.path().join("spool").join("audit-spool.jsonl");
        let pending = AuditEvent::from_fields(simulate("p"), Uuid::now_v7(), Utc::now());
        Spool::file(&spool_path).unwrap().push(&pending).unwrap();

        let store = Arc::new(MemoryAuditStore::new());
        let writer = Arc::new(AuditWriter::new(store.clone()).unwrap());
        let dispatcher = AuditDispatcher::start(
            writer,
            Spool::file(&spool_path).unwrap(),
            fast_retry(1),
            Arc::new(TracingAlertSink),
        )
        .unwrap();
        dispatcher.flush().unwrap();

        assert_eq!(store.snapshot().unwrap()[0].event_id, pending.event_id);
        assert_eq!(dispatcher.spool_len().unwrap(), 0);
    }

    #[test]
    fn redelivering_a_stored_event_counts_as_delivered() {
        let store = Arc::new(MemoryAuditStore::new());
        let writer = Arc::new(AuditWriter::new(store.clone()).unwrap());
        let event = AuditEvent::from_fields(simulate("p"), Uuid::now_v7(), Utc::now());
        writer.commit(event.clone()).unwrap();

        let spool = Spool::memory();
        spool.push(&event).unwrap();
        let dispatcher =
            AuditDispatcher::start(writer, spool, fast_retry(1), Arc::new(TracingAlertSink))
                .unwrap();
        dispatcher.flush().unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(dispatcher.stats().delivered, 1);
    }

    fn pending(object: &str) -> AuditEvent {
        AuditEvent::from_fields(simulate(object), Uuid::now_v7(), Utc::now())
    }

    #[test]
    fn unreadable_spool_lines_are_set_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit-spool.jsonl");
        std::fs::write(&path, "{\"event_id\":\"trunc").unwrap();

        let spool = Spool::file(&path).unwrap();
        let event = pending("p");
        spool.push(&event).unwrap();

        assert_eq!(spool.begin_redelivery().unwrap(), vec![event]);
        spool.finish_redelivery().unwrap();
        assert!(spool.is_empty().unwrap());
        let rejected = dir.path().join("audit-spool.jsonl.rejected");
        assert!(std::fs::read_to_string(rejected).unwrap().contains("trunc"));
    }

    #[test]
    fn interrupted_redelivery_keeps_its_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit-spool.jsonl");
        let (a, b, c) = (pending("a"), pending("b"), pending("c"));
        {
            let spool = Spool::file(&path).unwrap();
            spool.push(&a).unwrap();
            spool.push(&b).unwrap();
            assert_eq!(spool.begin_redelivery().unwrap().len(), 2);
            // The process dies before the batch is finished.
        }

        let spool = Spool::file(&path).unwrap();
        assert_eq!(spool.len().unwrap(), 2);
        spool.push(&c).unwrap();
        let ids: Vec<Uuid> = spool
            .begin_redelivery()
            .unwrap()
            .iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec![a.event_id, b.event_id, c.event_id]);

        spool.finish_redelivery().unwrap();
        assert_eq!(spool.len().unwrap(), 0);
        assert!(!dir.path().join("audit-spool.jsonl.inflight").exists());
    }

    #[test]
    fn failed_redelivery_leaves_events_in_the_spool_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit-spool.jsonl");
        let event = pending("p");
        Spool::file(&path).unwrap().push(&event).unwrap();

        let store = Arc::new(FlakyStore::new(u32::MAX));
        let writer = Arc::new(AuditWriter::new(store.clone()).unwrap());
        let dispatcher = AuditDispatcher::start(
            writer,
            Spool::file(&path).unwrap(),
            fast_retry(2),
            Arc::new(RecordingAlerts::default()),
        )
        .unwrap();
        dispatcher.flush().unwrap();
        assert_eq!(dispatcher.drain_spool().unwrap(), 0);

        assert_eq!(store.len().unwrap(), 0);
        assert_eq!(dispatcher.spool_len().unwrap(), 1);
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains(&event.event_id.to_string()));
        assert!(!dir.path().join("audit-spool.jsonl.inflight").exists());
    }

    #[test]
    fn spool_failure_is_alerted_not_returned() {
        let dir = tempdir().unwrap();
        // A directory where the spool file should be: every push fails.
        let path = dir.path().join("audit-spool.jsonl");
        std::fs::create_dir(&path).unwrap();

        let store = Arc::new(GatedStore {
            inner: MemoryAuditStore::new(),
            gate: (Mutex::new(false), Condvar::new()),
        });
        let writer = Arc::new(AuditWriter::new(store.clone()).unwrap());
        let alerts = Arc::new(RecordingAlerts::default());
        let config = DispatcherConfig {
            queue_capacity: 1,
            ..fast_retry(1)
        };
        let dispatcher =
            AuditDispatcher::start(writer, Spool::file(&path).unwrap(), config, alerts.clone())
                .unwrap();

        for _ in 0..5 {
            dispatcher.submit(simulate("p")).unwrap();
        }
        let stats = dispatcher.stats();
        assert!(stats.lost >= 3);
        assert_eq!(stats.spooled, 0);
        assert_eq!(alerts.unspooled.lock().unwrap().len() as u64, stats.lost);

        store.open();
        dispatcher.flush().unwrap();
        assert_eq!(store.len().unwrap() as u64, 5 - stats.lost);
    }
}
