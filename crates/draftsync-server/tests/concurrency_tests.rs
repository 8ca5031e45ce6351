use chrono::{Duration, TimeZone, Utc};
use draftsync_core::{ManualClock, Marker, MarkerPrecision, Precondition, ReportPayload};
use draftsync_server::{ConcurrencyController, InMemoryReportRepository, ServerError};
use proptest::prelude::*;
use std::sync::Arc;

fn controller() -> (ConcurrencyController, ManualClock) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap());
    let controller = ConcurrencyController::new(
        Arc::new(InMemoryReportRepository::new()),
        Arc::new(clock.clone()),
    );
    (controller, clock)
}

fn payload(note: &str) -> ReportPayload {
    let mut payload = ReportPayload::default();
    payload.fields.insert("notes".into(), note.into());
    payload
}

#[test]
fn test_racing_writers_on_same_marker_exactly_one_wins() {
    let (controller, _clock) = controller();
    let created = controller.create(payload("seed"), "seed").unwrap();
    let observed = Precondition::observed(Some(created.updated_at), Some(created.version));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let controller = controller.clone();
            std::thread::spawn(move || {
                let (note, editor) = (format!("writer {i}"), format!("editor-{i}"));
                controller.update(created.report_id, payload(&note), observed, &editor)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(ServerError::Conflict { .. })))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(controller.get(created.report_id).unwrap().version, 2);
}

#[test]
fn test_scenario_conflict_then_force_overwrite() {
    let (controller, clock) = controller();
    let t0 = controller.create(payload("draft"), "Inspector A").unwrap();

    clock.advance(Duration::minutes(3));
    let observed = Precondition::observed(Some(t0.updated_at), Some(t0.version));
    let t1 = controller
        .update(t0.report_id, payload("theirs"), observed, "Inspector B")
        .unwrap();

    let err = controller
        .update(t0.report_id, payload("mine"), observed, "Inspector A")
        .unwrap_err();
    let details = match err {
        ServerError::Conflict { details, .. } => details,
        other => panic!("expected conflict, got {other:?}"),
    };
    assert_eq!(details.updated_at, t1.updated_at);
    assert_eq!(details.updated_by, "Inspector B");

    let t2 = controller
        .update(t0.report_id, payload("mine"), Precondition::none(), "Inspector A")
        .unwrap();
    assert!(t2.updated_at > t1.updated_at);
    assert_eq!(controller.get(t0.report_id).unwrap().fields["notes"], "mine");
}

proptest! {
    #[test]
    fn prop_markers_and_versions_strictly_increase(
        steps in proptest::collection::vec((0..3u8, 0..5_000i64), 1..40),
    ) {
        let (controller, clock) = controller();
        let created = controller.create(payload("seed"), "seed").unwrap();
        let mut last: (Marker, u64) = (created.updated_at, created.version);

        for (kind, micros) in steps {
            clock.advance(Duration::microseconds(micros));
            let precondition = match kind {
                0 => Precondition::none(),
                1 => Precondition::observed(Some(last.0), Some(last.1)),
                _ => Precondition::observed(Some(created.updated_at), None),
            };

            match controller.update(created.report_id, payload("x"), precondition, "p") {
                Ok(receipt) => {
                    prop_assert!(receipt.updated_at > last.0);
                    prop_assert_eq!(receipt.version, last.1 + 1);
                    last = (receipt.updated_at, receipt.version);
                }
                Err(ServerError::Conflict { details, .. }) => {
                    prop_assert_eq!(kind, 2);
                    prop_assert_eq!(details.updated_at, last.0);
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }
    }
}

#[test]
fn test_http_date_precondition_rejects_write_within_same_second() {
    let (controller, clock) = controller();
    clock.advance(Duration::milliseconds(100));
    let created = controller.create(payload("draft"), "Inspector A").unwrap();

    clock.advance(Duration::milliseconds(300));
    controller
        .update(created.report_id, payload("theirs"), Precondition::none(), "Inspector B")
        .unwrap();

    // Inspector A only knows the second their copy was loaded in.
    let header = created.updated_at.timestamp().to_rfc2822();
    let (observed, precision) = Marker::parse_header(&header).unwrap();
    assert_eq!(precision, MarkerPrecision::Seconds);

    let precondition = Precondition {
        if_unmodified_since: Some((observed, precision)),
        version: None,
    };
    let err = controller
        .update(created.report_id, payload("mine"), precondition, "Inspector A")
        .unwrap_err();
    assert!(matches!(err, ServerError::Conflict { .. }));
    assert_eq!(controller.get(created.report_id).unwrap().updated_by, "Inspector B");
}
