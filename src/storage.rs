use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::analyzer::AnomalyDetector;
use crate::config::ThresholdConfig;
use crate::error::Fault;
use crate::types::{Sample, SessionId, SessionSummary};

pub const MEASUREMENTS_HEADER: &str = "T,Tpot,Tdew,Sh,Rh,Date";
pub const REJECTS_HEADER: &str = "T,Tpot,Tdew,Sh,Rh,Date,Reason";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found")]
    NotFound,

    #[error("Session {0} is already active")]
    AlreadyActive(SessionId),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<StoreError> for Fault {
    fn from(e: StoreError) -> Self {
        Fault::data_format(e.to_string())
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn measurements_path(data_dir: &Path, id: &SessionId) -> PathBuf {
    data_dir.join(format!("{}_measurements.csv", id))
}

pub fn rejects_path(data_dir: &Path, id: &SessionId) -> PathBuf {
    data_dir.join(format!("{}_rejects.csv", id))
}

/// Append-only CSV file owned by one session.
///
/// Lines go straight to the file with no userspace buffer, so a failed write
/// never leaves a record behind to surface with a later one.
pub struct RecordSink {
    path: PathBuf,
    file: Option<File>,
    created: bool,
}

impl RecordSink {
    /// Open for append. The header is written only when the file is empty,
    /// so a reused path never gets a second header mid-file.
    fn open(path: PathBuf, header: &str) -> io::Result<Self> {
        let created = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            file.write_all(format!("{}\n", header).as_bytes())?;
        }
        Ok(Self { path, file: Some(file), created })
    }

    /// Write one complete record line
    fn append(&mut self, line: &str) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "record sink is closed"))?;
        file.write_all(format!("{}\n", line).as_bytes())
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Remove the file again if this sink created it
    fn discard(mut self) {
        self.file = None;
        if self.created {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove record sink");
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Everything one open session owns: its two sinks and its analyzer state.
///
/// Only reachable through the session's own mutex, which is the critical
/// section that keeps analysis and sink writes in arrival order.
pub struct SessionState {
    id: SessionId,
    accepted: RecordSink,
    rejected: RecordSink,
    detector: AnomalyDetector,
    summary: SessionSummary,
    open: bool,
}

impl SessionState {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn detector_mut(&mut self) -> &mut AnomalyDetector {
        &mut self.detector
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    pub fn write_accepted(&mut self, sample: &Sample) -> io::Result<()> {
        self.accepted.append(&sample.csv_fields())?;
        self.summary.accepted += 1;
        Ok(())
    }

    /// Record a rejected sample with its reason as the trailing column.
    /// The sample counts as rejected even if the write fails.
    pub fn write_rejected(&mut self, sample: &Sample, reason: &str) -> io::Result<()> {
        self.summary.rejected += 1;
        self.rejected
            .append(&format!("{},{}", sample.csv_fields(), reason))
    }

    /// Close the chosen sinks in place so later writes to them fail
    #[cfg(test)]
    pub(crate) fn close_sinks(&mut self, accepted: bool, rejected: bool) {
        if accepted {
            self.accepted.file = None;
        }
        if rejected {
            self.rejected.file = None;
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = false;
        let accepted = self.accepted.close();
        let rejected = self.rejected.close();
        accepted.and(rejected)
    }
}

pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Thread-safe registry of open sessions.
///
/// Every registry operation runs under one store-wide mutex. Per-sample work
/// happens under the session's own mutex, taken after the store lock has
/// been released, so sessions only contend on the registry itself.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<StoreInner>>,
}

struct StoreInner {
    sessions: HashMap<SessionId, SessionHandle>,
    data_dir: PathBuf,
    thresholds: ThresholdConfig,
}

impl SessionStore {
    /// Create the store, making sure `data_dir` exists
    pub fn new(data_dir: impl Into<PathBuf>, thresholds: ThresholdConfig) -> io::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner {
                sessions: HashMap::new(),
                data_dir,
                thresholds,
            })),
        })
    }

    /// Create both sinks and fresh analyzer state for `id`.
    ///
    /// An id that is already open is refused rather than replaced, so the
    /// existing session's handles are never leaked.
    pub fn open(&self, id: &SessionId, expected: u64) -> Result<SessionHandle, StoreError> {
        let mut inner = lock(&self.inner);
        if inner.sessions.contains_key(id) {
            return Err(StoreError::AlreadyActive(id.clone()));
        }

        let accepted = RecordSink::open(measurements_path(&inner.data_dir, id), MEASUREMENTS_HEADER)?;
        let rejected = match RecordSink::open(rejects_path(&inner.data_dir, id), REJECTS_HEADER) {
            Ok(sink) => sink,
            Err(e) => {
                accepted.discard();
                return Err(e.into());
            }
        };

        let state = SessionState {
            id: id.clone(),
            accepted,
            rejected,
            detector: AnomalyDetector::new(&inner.thresholds),
            summary: SessionSummary { expected, ..Default::default() },
            open: true,
        };
        let handle = Arc::new(Mutex::new(state));
        inner.sessions.insert(id.clone(), handle.clone());

        tracing::debug!(session_id = %id, sessions = inner.sessions.len(), "Opened session sinks");
        Ok(handle)
    }

    pub fn get(&self, id: &SessionId) -> Result<SessionHandle, StoreError> {
        lock(&self.inner)
            .sessions
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// Flush and close both sinks and drop the entry.
    /// Closing an unknown or already closed id is an error, not a panic.
    pub fn close(&self, id: &SessionId) -> Result<SessionSummary, StoreError> {
        let mut inner = lock(&self.inner);
        let handle = inner.sessions.remove(id).ok_or(StoreError::NotFound)?;

        let mut state = lock(&handle);
        state.close()?;
        tracing::debug!(session_id = %id, sessions = inner.sessions.len(), "Closed session sinks");
        Ok(state.summary())
    }

    /// Close every open session, e.g. on shutdown. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let mut inner = lock(&self.inner);
        let mut closed = 0;
        for (id, handle) in inner.sessions.drain() {
            if let Err(e) = lock(&handle).close() {
                tracing::error!(session_id = %id, error = %e, "Failed to close session sinks");
            }
            closed += 1;
        }
        closed
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        lock(&self.inner).sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_dir(&self) -> PathBuf {
        lock(&self.inner).data_dir.clone()
    }
}
