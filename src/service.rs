use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::config::ThresholdConfig;
use crate::error::Fault;
use crate::notifier::Notifier;
use crate::storage::{lock, SessionStore, StoreError};
use crate::types::{Notification, Sample, SessionId, SessionMetadata};
use crate::validator::{validate_metadata, validate_sample};

pub const SESSION_NOT_INITIALIZED: &str = "Session not initialized";
pub const INVALID_SESSION_ID: &str = "Invalid session ID";

/// Server side of the start / push / end operations.
///
/// Cheap to clone; clones share one `SessionStore`, so a single instance can
/// multiplex any number of concurrent sessions. Per-sample processing for one
/// session runs inside that session's critical section.
#[derive(Clone)]
pub struct IngestionService {
    store: SessionStore,
    notifier: Arc<dyn Notifier>,
}

impl IngestionService {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        thresholds: ThresholdConfig,
        notifier: Arc<dyn Notifier>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            store: SessionStore::new(data_dir, thresholds)?,
            notifier,
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// A caller scope tracking one session's Unstarted/Active/Ended phase
    pub fn open_scope(&self) -> ClientSession {
        ClientSession {
            service: self.clone(),
            phase: Mutex::new(SessionPhase::Unstarted),
        }
    }

    pub fn start_session(&self, meta: &SessionMetadata) -> Result<SessionId, Fault> {
        validate_metadata(meta)?;

        let id = SessionId::derive(meta);
        let expected = meta.expected_samples as u64;
        self.store.open(&id, expected)?;

        info!(session_id = %id, station = %meta.station_id, expected, "Session started");
        self.notifier.notify(Notification::transfer_started(&id, expected));
        Ok(id)
    }

    /// Validate, analyze and persist one sample.
    ///
    /// Invalid samples go to the reject sink and come back as a validation
    /// fault; the session stays active either way.
    pub fn push_sample(&self, id: &SessionId, sample: &Sample) -> Result<bool, Fault> {
        let handle = self.store.get(id).map_err(|e| match e {
            StoreError::NotFound => Fault::data_format(SESSION_NOT_INITIALIZED),
            other => other.into(),
        })?;

        let mut state = lock(&handle);
        // Ended between the lookup and acquiring the session lock
        if !state.is_open() {
            return Err(Fault::data_format(SESSION_NOT_INITIALIZED));
        }

        if let Err(reason) = validate_sample(sample) {
            if let Err(e) = state.write_rejected(sample, reason) {
                error!(session_id = %id, error = %e, "Failed to record rejected sample");
                self.notifier.notify(Notification::sink_failure(
                    id,
                    format!("Failed to record rejected sample: {}", e),
                ));
            }
            debug!(session_id = %id, reason, "Sample rejected");
            return Err(Fault::validation(reason));
        }

        let warnings = state.detector_mut().inspect(sample);
        for warning in &warnings {
            self.notifier.notify(Notification::warning_raised(id, warning));
        }

        if let Err(e) = state.write_accepted(sample) {
            let reason = format!("Failed to persist sample: {}", e);
            error!(session_id = %id, error = %e, "Failed to write accepted sample");
            if let Err(e) = state.write_rejected(sample, &reason) {
                self.notifier.notify(Notification::sink_failure(
                    id,
                    format!("Failed to record rejected sample: {}", e),
                ));
            }
            return Err(Fault::data_format(reason));
        }

        debug!(session_id = %id, warnings = warnings.len(), "Sample accepted");
        self.notifier.notify(Notification::sample_received(id, sample));
        Ok(true)
    }

    pub fn end_session(&self, id: &SessionId) -> Result<bool, Fault> {
        let summary = self.store.close(id).map_err(|e| match e {
            StoreError::NotFound => Fault::data_format(INVALID_SESSION_ID),
            other => other.into(),
        })?;

        if summary.pushed() != summary.expected {
            warn!(
                session_id = %id,
                expected = summary.expected,
                pushed = summary.pushed(),
                "Session ended with unexpected sample count"
            );
        }
        info!(
            session_id = %id,
            accepted = summary.accepted,
            rejected = summary.rejected,
            "Session ended"
        );
        self.notifier.notify(Notification::transfer_completed(id, summary));
        Ok(true)
    }
}

/// Lifecycle of one caller scope. There is no way back from `Ended`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Unstarted,
    Active(SessionId),
    Ended(SessionId),
}

/// One caller's view of the service: it remembers which session the caller
/// started, so pushes carry no id, and enforces the phase order.
///
/// May be shared between threads; concurrent pushes are serialized by the
/// session's lock in the store.
pub struct ClientSession {
    service: IngestionService,
    phase: Mutex<SessionPhase>,
}

impl ClientSession {
    pub fn phase(&self) -> SessionPhase {
        lock(&self.phase).clone()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        match &*lock(&self.phase) {
            SessionPhase::Active(id) | SessionPhase::Ended(id) => Some(id.clone()),
            SessionPhase::Unstarted => None,
        }
    }

    pub fn start_session(&self, meta: &SessionMetadata) -> Result<SessionId, Fault> {
        let mut phase = lock(&self.phase);
        match &*phase {
            SessionPhase::Unstarted => {}
            SessionPhase::Active(id) => {
                return Err(Fault::data_format(format!("Session {} already started", id)));
            }
            SessionPhase::Ended(id) => {
                return Err(Fault::data_format(format!("Session {} already ended", id)));
            }
        }

        let id = self.service.start_session(meta)?;
        *phase = SessionPhase::Active(id.clone());
        Ok(id)
    }

    pub fn push_sample(&self, sample: &Sample) -> Result<bool, Fault> {
        let id = match &*lock(&self.phase) {
            SessionPhase::Active(id) => id.clone(),
            _ => return Err(Fault::data_format(SESSION_NOT_INITIALIZED)),
        };
        self.service.push_sample(&id, sample)
    }

    pub fn end_session(&self, id: &SessionId) -> Result<bool, Fault> {
        let mut phase = lock(&self.phase);
        if !matches!(&*phase, SessionPhase::Active(active) if active == id) {
            return Err(Fault::data_format(INVALID_SESSION_ID));
        }

        let ended = self.service.end_session(id)?;
        *phase = SessionPhase::Ended(id.clone());
        Ok(ended)
    }
}
