//! End-to-end session tests against a temporary data directory.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use weather_ingest::config::ThresholdConfig;
use weather_ingest::error::Fault;
use weather_ingest::notifier::Notifier;
use weather_ingest::service::{IngestionService, SESSION_NOT_INITIALIZED};
use weather_ingest::storage::{measurements_path, rejects_path};
use weather_ingest::types::{
    unset_date, Notification, NotificationKind, Sample, SessionId, SessionMetadata, WarningKind,
};

#[derive(Default)]
struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn kinds(&self) -> Vec<NotificationKind> {
        self.seen.lock().unwrap().iter().map(|n| n.kind).collect()
    }

    fn warnings(&self) -> Vec<WarningKind> {
        self.seen.lock().unwrap().iter().filter_map(|n| n.warning).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2009, 1, 1)
        .unwrap()
        .and_hms_opt(0, 10, 0)
        .unwrap()
}

fn meta(station: &str, expected: i64) -> SessionMetadata {
    SessionMetadata {
        station_id: station.into(),
        start_time: t0(),
        expected_samples: expected,
    }
}

/// Mild conditions: heat index stays far below any threshold used here
fn sample(sh: f64, minute: i64) -> Sample {
    Sample {
        t: 10.0,
        tpot: 283.0,
        tdew: 5.0,
        sh,
        rh: 60.0,
        date: t0() + Duration::minutes(minute),
    }
}

fn setup(sh_spike: f64) -> (tempfile::TempDir, IngestionService, Arc<RecordingNotifier>) {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let thresholds = ThresholdConfig { sh_spike, heat_index: 1000.0 };
    let service = IngestionService::new(dir.path(), thresholds, notifier.clone()).unwrap();
    (dir, service, notifier)
}

fn data_rows(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(String::from)
        .collect()
}

#[test]
fn scenario_two_samples_with_spike() {
    let (dir, service, notifier) = setup(20.0);
    let scope = service.open_scope();

    let id = scope.start_session(&meta("Station_1", 3)).unwrap();
    assert_eq!(id.as_str(), "Station_1_20090101_001000");

    assert_eq!(scope.push_sample(&sample(50.0, 0)), Ok(true));
    assert!(notifier.warnings().is_empty());

    assert_eq!(scope.push_sample(&sample(95.0, 10)), Ok(true));
    assert_eq!(notifier.warnings(), vec![WarningKind::ShSpike, WarningKind::ShAboveRange]);

    assert_eq!(scope.end_session(&id), Ok(true));

    let accepted = data_rows(&measurements_path(dir.path(), &id));
    assert_eq!(
        accepted,
        vec![
            "10,283,5,50,60,2009-01-01T00:10:00.000000",
            "10,283,5,95,60,2009-01-01T00:20:00.000000",
        ]
    );
    assert!(data_rows(&rejects_path(dir.path(), &id)).is_empty());

    assert_eq!(
        notifier.kinds(),
        vec![
            NotificationKind::TransferStarted,
            NotificationKind::SampleReceived,
            NotificationKind::WarningRaised,
            NotificationKind::WarningRaised,
            NotificationKind::SampleReceived,
            NotificationKind::TransferCompleted,
        ]
    );
    let completed = notifier.seen.lock().unwrap().last().cloned().unwrap();
    let summary = completed.summary.unwrap();
    assert_eq!((summary.expected, summary.accepted, summary.rejected), (3, 2, 0));
}

#[test]
fn every_pushed_sample_lands_in_exactly_one_sink() {
    let (dir, service, _) = setup(2.0);
    let scope = service.open_scope();
    let id = scope.start_session(&meta("P", 6)).unwrap();

    let mut undated = sample(4.0, 3);
    undated.date = unset_date();
    let pushes = vec![
        sample(4.0, 0),
        sample(-1.0, 1),
        sample(4.5, 2),
        undated,
        sample(f64::NAN, 4),
        sample(5.0, 5),
    ];

    let mut faults = Vec::new();
    for s in &pushes {
        if let Err(f) = scope.push_sample(s) {
            faults.push(f);
        }
    }
    scope.end_session(&id).unwrap();

    assert_eq!(
        faults,
        vec![
            Fault::validation("Specific humidity must be between 0 and 100"),
            Fault::validation("Invalid date"),
            Fault::validation("Specific humidity must be between 0 and 100"),
        ]
    );

    let accepted = data_rows(&measurements_path(dir.path(), &id));
    let rejected = data_rows(&rejects_path(dir.path(), &id));
    assert_eq!(accepted.len(), 3);
    assert_eq!(rejected.len(), 3);
    assert_eq!(accepted.len() + rejected.len(), pushes.len());

    assert_eq!(
        rejected[0],
        "10,283,5,-1,60,2009-01-01T00:11:00.000000,Specific humidity must be between 0 and 100"
    );
    assert_eq!(rejected[1], "10,283,5,4,60,0001-01-01T00:00:00.000000,Invalid date");
    assert!(rejected[2].starts_with("10,283,5,NaN,60,"));
}

#[test]
fn rejected_samples_do_not_move_the_running_mean() {
    let (_dir, service, notifier) = setup(100.0);
    let scope = service.open_scope();
    let id = scope.start_session(&meta("M", 4)).unwrap();

    scope.push_sample(&sample(10.0, 0)).unwrap();
    assert!(scope.push_sample(&sample(150.0, 1)).is_err());
    scope.push_sample(&sample(10.0, 2)).unwrap();
    // mean of accepted values is still 10, so 12 sits inside the band
    scope.push_sample(&sample(12.0, 3)).unwrap();
    scope.end_session(&id).unwrap();

    assert!(notifier.warnings().is_empty());
}

#[test]
fn first_sample_is_exempt_even_with_zero_threshold() {
    let (_dir, service, notifier) = setup(0.0);
    let scope = service.open_scope();
    scope.start_session(&meta("F", 1)).unwrap();
    scope.push_sample(&sample(99.0, 0)).unwrap();
    assert!(notifier.warnings().is_empty());
}

#[test]
fn push_after_end_fails_and_writes_nothing() {
    let (dir, service, _) = setup(2.0);
    let scope = service.open_scope();
    let id = scope.start_session(&meta("E", 1)).unwrap();
    scope.push_sample(&sample(5.0, 0)).unwrap();
    scope.end_session(&id).unwrap();

    let before_accepted = std::fs::read_to_string(measurements_path(dir.path(), &id)).unwrap();
    let before_rejected = std::fs::read_to_string(rejects_path(dir.path(), &id)).unwrap();

    assert_eq!(
        scope.push_sample(&sample(5.0, 1)),
        Err(Fault::data_format(SESSION_NOT_INITIALIZED))
    );
    // also through a service handle that still knows the id
    assert_eq!(
        service.push_sample(&id, &sample(-5.0, 2)),
        Err(Fault::data_format(SESSION_NOT_INITIALIZED))
    );

    assert_eq!(std::fs::read_to_string(measurements_path(dir.path(), &id)).unwrap(), before_accepted);
    assert_eq!(std::fs::read_to_string(rejects_path(dir.path(), &id)).unwrap(), before_rejected);
}

#[test]
fn concurrent_sessions_are_isolated() {
    let (dir, service, notifier) = setup(1.0);

    let stations = ["North", "South"];
    let ids: Vec<SessionId> = thread::scope(|s| {
        let handles: Vec<_> = stations
            .iter()
            .enumerate()
            .map(|(n, station)| {
                let service = service.clone();
                s.spawn(move || {
                    let scope = service.open_scope();
                    let id = scope.start_session(&meta(station, 50)).unwrap();
                    // steady series per station, at very different levels
                    let level = 10.0 + 40.0 * n as f64;
                    for i in 0..50 {
                        scope.push_sample(&sample(level + (i % 2) as f64 * 0.5, i)).unwrap();
                    }
                    scope.end_session(&id).unwrap();
                    id
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Neither session ever saw the other's values as a previous sample
    assert!(notifier.warnings().is_empty());

    for (n, id) in ids.iter().enumerate() {
        let rows = data_rows(&measurements_path(dir.path(), id));
        assert_eq!(rows.len(), 50);
        let level = 10.0 + 40.0 * n as f64;
        for row in rows {
            let sh: f64 = row.split(',').nth(3).unwrap().parse().unwrap();
            assert!(sh == level || sh == level + 0.5, "{} in session {}", sh, id);
        }
    }
}

#[test]
fn concurrent_pushes_to_one_session_are_serialized() {
    let (dir, service, notifier) = setup(1000.0);
    let scope = service.open_scope();
    let id = scope.start_session(&meta("C", 200)).unwrap();

    thread::scope(|s| {
        for worker in 0..4 {
            let scope = &scope;
            s.spawn(move || {
                for i in 0..50 {
                    let sh = if i % 10 == 0 { 101.0 } else { 5.0 + worker as f64 };
                    let _ = scope.push_sample(&sample(sh, i));
                }
            });
        }
    });
    assert!(service.store().contains(&id));
    scope.end_session(&id).unwrap();

    let accepted = data_rows(&measurements_path(dir.path(), &id));
    let rejected = data_rows(&rejects_path(dir.path(), &id));
    assert_eq!(accepted.len(), 180);
    assert_eq!(rejected.len(), 20);
    // no torn lines
    assert!(accepted.iter().all(|l| l.split(',').count() == 6));
    assert!(rejected.iter().all(|l| l.split(',').count() == 7));

    let received = notifier
        .kinds()
        .into_iter()
        .filter(|k| *k == NotificationKind::SampleReceived)
        .count();
    assert_eq!(received, 180);
}

#[test]
fn one_instance_per_session_also_works() {
    let (dir_a, service_a, _) = setup(2.0);
    let (dir_b, service_b, _) = setup(2.0);

    let a = service_a.open_scope();
    let b = service_b.open_scope();
    // same station and start second, but separate instances and directories
    let id_a = a.start_session(&meta("Same", 1)).unwrap();
    let id_b = b.start_session(&meta("Same", 1)).unwrap();
    assert_eq!(id_a, id_b);

    a.push_sample(&sample(3.0, 0)).unwrap();
    a.end_session(&id_a).unwrap();
    b.end_session(&id_b).unwrap();

    assert_eq!(data_rows(&measurements_path(dir_a.path(), &id_a)).len(), 1);
    assert!(data_rows(&measurements_path(dir_b.path(), &id_b)).is_empty());
}
