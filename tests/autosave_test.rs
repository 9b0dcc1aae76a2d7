mod common;

use anyhow::anyhow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

use common::{row, RecordingGrading, COURSE};
use gradesync::autosave::{EditError, StatusEvent};
use gradesync::config::Autosave;
use gradesync::model::{FieldKey, FieldName, FieldValue, SaveStatus, SubmissionStatus};
use gradesync::session::GradingSession;
use gradesync::validate::ValidationError;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

async fn open(service: &RecordingGrading, settings: Autosave) -> GradingSession {
    GradingSession::open(Arc::new(service.clone()), COURSE, settings)
        .await
        .unwrap()
}

fn drain(rx: &mut broadcast::Receiver<StatusEvent>, key: FieldKey) -> Vec<SaveStatus> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if event.key == key {
            seen.push(event.status);
        }
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_coalesce_into_one_write() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None)]);
    let session = open(&service, Autosave::default()).await;
    let key = FieldKey::new(1, 10, FieldName::TeacherMark);

    for mark in [10.0, 20.0, 30.0, 40.0, 50.0] {
        session
            .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(mark)))
            .unwrap();
        assert_eq!(session.grid().record(1, 10).unwrap().teacher_mark(), Some(mark));
        assert_eq!(session.status(&key), SaveStatus::Saving);
        sleep(ms(100)).await;
    }
    assert_eq!(session.autosave().pending_count(), 1);

    // Last edit was at t=400; its timer fires at t=1200.
    sleep(ms(699)).await;
    assert!(service.patches().await.is_empty());

    sleep(ms(2)).await;
    let patches = service.patches().await;
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].course_id, COURSE);
    assert_eq!(patches[0].field, FieldName::TeacherMark);
    assert_eq!(patches[0].value, FieldValue::Mark(Some(50.0)));
    assert_eq!(session.status(&key), SaveStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn saved_status_clears_after_two_seconds() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None)]);
    let session = open(&service, Autosave::default()).await;
    let mut events = session.subscribe();
    let key = FieldKey::new(1, 10, FieldName::GradingNotes);

    session
        .edit(1, 10, FieldName::GradingNotes, FieldValue::Text("resubmit".into()))
        .unwrap();
    sleep(ms(801)).await;
    assert_eq!(session.status(&key), SaveStatus::Saved);
    assert_eq!(SaveStatus::Saved.label(), Some("Saved"));

    sleep(ms(1900)).await;
    assert_eq!(session.status(&key), SaveStatus::Saved);
    sleep(ms(200)).await;
    assert_eq!(session.status(&key), SaveStatus::Idle);

    assert_eq!(
        drain(&mut events, key),
        vec![SaveStatus::Saving, SaveStatus::Saved, SaveStatus::Idle]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_write_keeps_local_value_and_clears_after_three_seconds() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, Some(40.0))]);
    service.push_patch_result(Err(anyhow!("500 Internal Server Error"))).await;
    let session = open(&service, Autosave::default()).await;
    let key = FieldKey::new(1, 10, FieldName::TeacherMark);

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(70.0)))
        .unwrap();
    sleep(ms(801)).await;
    assert_eq!(session.status(&key), SaveStatus::Error);
    assert_eq!(session.grid().record(1, 10).unwrap().teacher_mark(), Some(70.0));
    assert_eq!(session.grid().record(1, 10).unwrap().final_mark(), Some(70.0));

    sleep(ms(2900)).await;
    assert_eq!(session.status(&key), SaveStatus::Error);
    sleep(ms(200)).await;
    assert_eq!(session.status(&key), SaveStatus::Idle);

    // No retry.
    sleep(ms(10_000)).await;
    assert_eq!(service.patches().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_pending_writes() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None), row(2, 10, None)]);
    let session = open(&service, Autosave::default()).await;

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(5.0)))
        .unwrap();
    session
        .edit(2, 10, FieldName::CopyPenaltyApplied, FieldValue::Flag(true))
        .unwrap();
    sleep(ms(300)).await;
    session.teardown();
    assert_eq!(session.autosave().pending_count(), 0);

    sleep(ms(5000)).await;
    assert!(service.patches().await.is_empty());
    assert_eq!(
        session.status(&FieldKey::new(1, 10, FieldName::TeacherMark)),
        SaveStatus::Idle
    );

    // Rejected once torn down, and the grid keeps the last accepted value.
    let key = FieldKey::new(1, 10, FieldName::TeacherMark);
    let err = session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(6.0)))
        .unwrap_err();
    assert_eq!(err, EditError::Closed(key));
    let err = session
        .edit_raw(1, 10, FieldName::TeacherMark, "7")
        .unwrap_err();
    assert_eq!(err, EditError::Closed(key));
    assert_eq!(session.grid().record(1, 10).unwrap().teacher_mark(), Some(5.0));
    assert_eq!(session.status(&key), SaveStatus::Idle);
    sleep(ms(5000)).await;
    assert!(service.patches().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn teardown_aborts_request_in_flight() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None)]);
    service.push_patch_delay(ms(5000)).await;
    let session = open(&service, Autosave::default()).await;
    let key = FieldKey::new(1, 10, FieldName::TeacherMark);

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(5.0)))
        .unwrap();
    sleep(ms(1000)).await;
    assert_eq!(session.autosave().in_flight_count(), 1);

    session.teardown();
    sleep(ms(10_000)).await;
    assert_eq!(session.autosave().in_flight_count(), 0);
    assert_eq!(session.status(&key), SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn keys_debounce_independently() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None), row(2, 10, None)]);
    let session = open(&service, Autosave::default()).await;

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(11.0)))
        .unwrap();
    session
        .edit(1, 10, FieldName::GradingNotes, FieldValue::Text("ok".into()))
        .unwrap();
    sleep(ms(500)).await;
    session
        .edit(2, 10, FieldName::TeacherMark, FieldValue::Mark(Some(22.0)))
        .unwrap();

    // The later edit on another key does not push the first two back.
    sleep(ms(301)).await;
    let patches = service.patches().await;
    assert_eq!(patches.len(), 2);
    assert!(patches.iter().all(|p| p.student_id == 1));
    assert_eq!(
        session.status(&FieldKey::new(2, 10, FieldName::TeacherMark)),
        SaveStatus::Saving
    );

    sleep(ms(500)).await;
    let patches = service.patches().await;
    assert_eq!(patches.len(), 3);
    assert_eq!(patches[2].student_id, 2);
    assert_eq!(patches[2].value, FieldValue::Mark(Some(22.0)));
}

#[tokio::test(start_paused = true)]
async fn slow_request_is_not_cancelled_by_newer_edit() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None)]);
    service.push_patch_delay(ms(5000)).await;
    let session = open(&service, Autosave::default()).await;

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(10.0)))
        .unwrap();
    sleep(ms(1000)).await;
    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(20.0)))
        .unwrap();
    sleep(ms(801)).await;

    let values: Vec<FieldValue> = service.patches().await.into_iter().map(|p| p.value).collect();
    assert_eq!(
        values,
        vec![FieldValue::Mark(Some(10.0)), FieldValue::Mark(Some(20.0))]
    );
    assert_eq!(session.autosave().in_flight_count(), 1);
}

/// First write is slow and fails, the second is fast and succeeds. Without
/// stale discarding the late failure still lands on the key.
#[tokio::test(start_paused = true)]
async fn stale_response_lands_when_not_discarded() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None)]);
    service.push_patch_result(Err(anyhow!("timeout"))).await;
    service.push_patch_delay(ms(5000)).await;
    let session = open(&service, Autosave::default()).await;
    let key = FieldKey::new(1, 10, FieldName::TeacherMark);

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(10.0)))
        .unwrap();
    sleep(ms(1000)).await;
    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(20.0)))
        .unwrap();
    sleep(ms(801)).await;
    assert_eq!(session.status(&key), SaveStatus::Saved);

    // First request returns at t=5800.
    sleep(ms(4000)).await;
    assert_eq!(session.status(&key), SaveStatus::Error);
    assert_eq!(session.grid().record(1, 10).unwrap().teacher_mark(), Some(20.0));
}

#[tokio::test(start_paused = true)]
async fn stale_response_discarded_when_enabled() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None)]);
    service.push_patch_result(Err(anyhow!("timeout"))).await;
    service.push_patch_delay(ms(5000)).await;
    let settings = Autosave {
        discard_stale_responses: true,
        ..Autosave::default()
    };
    let session = open(&service, settings).await;
    let key = FieldKey::new(1, 10, FieldName::TeacherMark);

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(10.0)))
        .unwrap();
    sleep(ms(1000)).await;
    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(20.0)))
        .unwrap();
    sleep(ms(801)).await;
    assert_eq!(session.status(&key), SaveStatus::Saved);

    sleep(ms(4000)).await;
    assert_eq!(session.status(&key), SaveStatus::Idle);
    assert_eq!(session.autosave().in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_input_is_rejected_before_scheduling() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, Some(30.0))]);
    let session = open(&service, Autosave::default()).await;
    let key = FieldKey::new(1, 10, FieldName::TeacherMark);

    let err = session
        .edit_raw(1, 10, FieldName::TeacherMark, "abc")
        .unwrap_err();
    assert!(matches!(err, EditError::Invalid(ValidationError::NotNumeric { .. })));

    let err = session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(150.0)))
        .unwrap_err();
    assert!(matches!(err, EditError::Invalid(ValidationError::OutOfRange { .. })));

    let err = session
        .edit(1, 99, FieldName::TeacherMark, FieldValue::Mark(Some(1.0)))
        .unwrap_err();
    assert!(matches!(err, EditError::Invalid(ValidationError::UnknownRecord { .. })));

    assert_eq!(session.status(&key), SaveStatus::Idle);
    assert_eq!(session.autosave().pending_count(), 0);
    assert_eq!(session.grid().record(1, 10).unwrap().teacher_mark(), Some(30.0));

    sleep(ms(2000)).await;
    assert!(service.patches().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn clearing_a_mark_sends_null() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, Some(30.0))]);
    let session = open(&service, Autosave::default()).await;

    session.edit_raw(1, 10, FieldName::TeacherMark, "  ").unwrap();
    assert_eq!(session.grid().record(1, 10).unwrap().final_mark(), None);

    sleep(ms(801)).await;
    let patches = service.patches().await;
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].value, FieldValue::Mark(None));
}

#[tokio::test(start_paused = true)]
async fn refetch_forgets_settled_statuses() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None)]);
    let session = open(&service, Autosave::default()).await;
    let key = FieldKey::new(1, 10, FieldName::TeacherMark);

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(60.0)))
        .unwrap();
    sleep(ms(801)).await;
    assert_eq!(session.status(&key), SaveStatus::Saved);

    service.set_rows(vec![row(1, 10, Some(60.0))]).await;
    session.refetch().await.unwrap();
    assert_eq!(session.status(&key), SaveStatus::Idle);
    assert_eq!(session.grid().record(1, 10).unwrap().teacher_mark(), Some(60.0));
    assert_eq!(service.fetches().await, 2);
}

#[tokio::test(start_paused = true)]
async fn reedit_during_saved_keeps_saving_visible() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None)]);
    let session = open(&service, Autosave::default()).await;
    let key = FieldKey::new(1, 10, FieldName::TeacherMark);

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(1.0)))
        .unwrap();
    sleep(ms(801)).await;
    assert_eq!(session.status(&key), SaveStatus::Saved);

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(2.0)))
        .unwrap();
    // The old auto-clear was due at t=2800, the new one at t=3601.
    sleep(ms(2100)).await;
    assert_eq!(session.status(&key), SaveStatus::Saved);
    assert_eq!(service.patches().await.len(), 2);
}

/// Three students on one 100-mark assignment, each marked 90.
#[tokio::test(start_paused = true)]
async fn penalties_follow_marks_into_totals() {
    let mut copied = row(1, 10, None);
    copied.copy_penalty_applied = Some(true);
    copied.is_late_submission = Some(true);
    let mut late = row(2, 10, None);
    late.submission_status = Some(SubmissionStatus::Late);
    let plain = row(3, 10, None);

    let service = RecordingGrading::with_rows(vec![copied, late, plain]);
    let session = open(&service, Autosave::default()).await;

    for student in [1, 2, 3] {
        session
            .edit_raw(student, 10, FieldName::TeacherMark, "90")
            .unwrap();
    }
    {
        let grid = session.grid();
        assert_eq!(grid.record(1, 10).unwrap().final_mark(), Some(-100.0));
        assert_eq!(grid.record(2, 10).unwrap().final_mark(), Some(85.5));
        assert_eq!(grid.record(3, 10).unwrap().final_mark(), Some(90.0));
    }

    let totals = session.totals(1);
    assert_eq!(totals.obtained, -100.0);
    assert_eq!(totals.possible, 100.0);
    assert_eq!(totals.percentage, Some(-100.0));
    assert_eq!(session.totals(2).obtained, 85.5);
    assert_eq!(session.totals(3).graded_count, 1);

    sleep(ms(801)).await;
    let mut students: Vec<i64> = service
        .patches()
        .await
        .into_iter()
        .map(|p| p.student_id)
        .collect();
    students.sort();
    assert_eq!(students, vec![1, 2, 3]);

    // Lifting the copy flag falls back to the late penalty.
    session
        .edit(1, 10, FieldName::CopyPenaltyApplied, FieldValue::Flag(false))
        .unwrap();
    assert_eq!(session.grid().record(1, 10).unwrap().final_mark(), Some(85.5));
}

#[tokio::test(start_paused = true)]
async fn settled_keys_are_not_tracked_forever() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None), row(2, 10, None)]);
    let session = open(&service, Autosave::default()).await;

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(1.0)))
        .unwrap();
    session
        .edit(2, 10, FieldName::TeacherMark, FieldValue::Mark(Some(2.0)))
        .unwrap();
    assert_eq!(session.autosave().tracked_count(), 2);

    // Both saved at t=800 and cleared at t=2800.
    sleep(ms(2801)).await;
    assert_eq!(session.autosave().tracked_count(), 0);

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(3.0)))
        .unwrap();
    sleep(ms(801)).await;
    assert_eq!(session.autosave().tracked_count(), 1);
    session.refetch().await.unwrap();
    assert_eq!(session.autosave().tracked_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn refetch_keeps_tracking_keys_still_saving() {
    let service = RecordingGrading::with_rows(vec![row(1, 10, None)]);
    service.push_patch_delay(ms(5000)).await;
    let settings = Autosave {
        discard_stale_responses: true,
        ..Autosave::default()
    };
    let session = open(&service, settings).await;
    let key = FieldKey::new(1, 10, FieldName::TeacherMark);

    session
        .edit(1, 10, FieldName::TeacherMark, FieldValue::Mark(Some(10.0)))
        .unwrap();
    sleep(ms(1000)).await;
    session.refetch().await.unwrap();
    assert_eq!(session.autosave().tracked_count(), 1);
    assert_eq!(session.status(&key), SaveStatus::Saving);

    // The request returns at t=5800 and is still the latest, so it lands.
    sleep(ms(4801)).await;
    assert_eq!(session.status(&key), SaveStatus::Saved);
}
