pub mod analyzer;
pub mod config;
pub mod error;
pub mod notifier;
pub mod service;
pub mod storage;
pub mod validator;
#[cfg(feature = "nats")]
pub mod rpc;

/// Common types used across modules
pub mod types {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use serde::{Deserialize, Serialize};
    use smallvec::SmallVec;

    /// Timestamp layout written to the record sinks.
    pub const RECORD_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    /// Timestamp layout embedded in session identifiers (second precision).
    pub const SESSION_DATE_FORMAT: &str = "%Y%m%d_%H%M%S";

    /// The "no date" sentinel, `0001-01-01T00:00:00`.
    pub fn unset_date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1, 1, 1)
            .unwrap_or_default()
            .and_time(NaiveTime::MIN)
    }

    /// A single weather measurement pushed by a station
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Sample {
        /// Temperature
        pub t: f64,
        /// Potential temperature
        pub tpot: f64,
        /// Dew-point temperature
        pub tdew: f64,
        /// Specific humidity
        pub sh: f64,
        /// Relative humidity, percent
        pub rh: f64,
        #[serde(default = "unset_date")]
        pub date: NaiveDateTime,
    }

    impl Sample {
        /// Comma-separated record fields in sink column order.
        pub fn csv_fields(&self) -> String {
            format!(
                "{},{},{},{},{},{}",
                self.t,
                self.tpot,
                self.tdew,
                self.sh,
                self.rh,
                self.date.format(RECORD_DATE_FORMAT)
            )
        }
    }

    /// Describes a transfer a station is about to make
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SessionMetadata {
        pub station_id: String,
        pub start_time: NaiveDateTime,
        pub expected_samples: i64,
    }

    /// Identifier of one ingestion session: `{station}_{yyyyMMdd_HHmmss}`
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SessionId(String);

    impl SessionId {
        pub fn derive(meta: &SessionMetadata) -> Self {
            Self(format!(
                "{}_{}",
                meta.station_id,
                meta.start_time.format(SESSION_DATE_FORMAT)
            ))
        }

        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl From<&str> for SessionId {
        fn from(s: &str) -> Self {
            Self(s.to_string())
        }
    }

    impl From<String> for SessionId {
        fn from(s: String) -> Self {
            Self(s)
        }
    }

    impl std::fmt::Display for SessionId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// Anomaly categories raised by the analyzers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum WarningKind {
        ShSpike,
        ShBelowRange,
        ShAboveRange,
        HeatIndexExceeded,
        HeatIndexSpike,
    }

    impl std::fmt::Display for WarningKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let s = match self {
                WarningKind::ShSpike => "sh.spike",
                WarningKind::ShBelowRange => "sh.below_range",
                WarningKind::ShAboveRange => "sh.above_range",
                WarningKind::HeatIndexExceeded => "heat_index.exceeded",
                WarningKind::HeatIndexSpike => "heat_index.spike",
            };
            write!(f, "{}", s)
        }
    }

    /// An advisory raised while analyzing an accepted sample
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Warning {
        pub kind: WarningKind,
        pub value: f64,
        pub threshold: f64,
        pub message: String,
    }

    /// Warnings produced for one sample; rarely more than two.
    pub type Warnings = SmallVec<[Warning; 4]>;

    /// Bookkeeping reported when a session ends
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct SessionSummary {
        pub expected: u64,
        pub accepted: u64,
        pub rejected: u64,
    }

    impl SessionSummary {
        pub fn pushed(&self) -> u64 {
            self.accepted + self.rejected
        }
    }

    /// Lifecycle and warning events delivered to observers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum NotificationKind {
        TransferStarted,
        SampleReceived,
        WarningRaised,
        TransferCompleted,
        SinkFailure,
    }

    impl std::fmt::Display for NotificationKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let s = match self {
                NotificationKind::TransferStarted => "transfer started",
                NotificationKind::SampleReceived => "sample received",
                NotificationKind::WarningRaised => "warning raised",
                NotificationKind::TransferCompleted => "transfer completed",
                NotificationKind::SinkFailure => "sink failure",
            };
            write!(f, "{}", s)
        }
    }

    /// A notification to be dispatched
    #[derive(Debug, Clone, Serialize)]
    pub struct Notification {
        pub timestamp: DateTime<Utc>,
        pub kind: NotificationKind,
        pub session_id: SessionId,
        pub message: String,
        pub warning: Option<WarningKind>,
        pub summary: Option<SessionSummary>,
    }

    impl Notification {
        pub fn new(kind: NotificationKind, session_id: &SessionId, message: impl Into<String>) -> Self {
            Self {
                timestamp: Utc::now(),
                kind,
                session_id: session_id.clone(),
                message: message.into(),
                warning: None,
                summary: None,
            }
        }

        pub fn transfer_started(session_id: &SessionId, expected: u64) -> Self {
            Self::new(
                NotificationKind::TransferStarted,
                session_id,
                format!("Transfer started, expecting {} samples", expected),
            )
        }

        pub fn sample_received(session_id: &SessionId, sample: &Sample) -> Self {
            Self::new(
                NotificationKind::SampleReceived,
                session_id,
                format!("Sample received: {}", sample.date.format(RECORD_DATE_FORMAT)),
            )
        }

        pub fn warning_raised(session_id: &SessionId, warning: &Warning) -> Self {
            let mut n = Self::new(NotificationKind::WarningRaised, session_id, warning.message.clone());
            n.warning = Some(warning.kind);
            n
        }

        pub fn transfer_completed(session_id: &SessionId, summary: SessionSummary) -> Self {
            let mut n = Self::new(
                NotificationKind::TransferCompleted,
                session_id,
                format!(
                    "Transfer completed: {} accepted, {} rejected, {} expected",
                    summary.accepted, summary.rejected, summary.expected
                ),
            );
            n.summary = Some(summary);
            n
        }

        pub fn sink_failure(session_id: &SessionId, message: impl Into<String>) -> Self {
            Self::new(NotificationKind::SinkFailure, session_id, message)
        }
    }

}
