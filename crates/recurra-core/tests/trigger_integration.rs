//! Integration tests for the in-app trigger service driven by the coordinator.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use recurra_core::{
    InMemoryNotificationService, ManualClock, MemoryStore, NotificationDispatcher, Occurrence,
    OccurrenceFilter, OccurrenceStore, ReminderDraft, SeriesCoordinator, TriggerEngine,
    TriggerService,
};
use tokio::sync::mpsc;

fn at(h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 9, h, min, 0).unwrap()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Occurrence>) -> Vec<Occurrence> {
    let mut out = Vec::new();
    while let Ok(o) = rx.try_recv() {
        out.push(o);
    }
    out
}

#[tokio::test]
async fn test_coordinator_arms_and_cancels_in_app_timers() {
    let clock = ManualClock::new(at(8, 0));
    let (surface, mut shown) = mpsc::unbounded_channel();
    let (handle, _task) = TriggerService::spawn(TriggerEngine::default(), surface, Arc::new(clock.clone()));
    let mut c = SeriesCoordinator::new(MemoryStore::new(), Arc::new(clock.clone())).with_channel(handle.clone());

    let keep = c.create_series(&ReminderDraft::new("Keep", at(9, 0))).unwrap().created[0];
    let drop_me = c.create_series(&ReminderDraft::new("Drop", at(9, 30))).unwrap().created[0];
    c.delete_occurrence(drop_me).unwrap();

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.armed, vec![(keep, at(9, 0))]);

    clock.set(at(10, 0));
    handle.tick();
    handle.snapshot().await.unwrap();
    let presented = drain(&mut shown);
    assert_eq!(presented.len(), 1);
    assert_eq!(presented[0].id, keep);
}

#[tokio::test]
async fn test_complete_and_delete_clear_presentation_state() {
    let clock = ManualClock::new(at(8, 0));
    let (surface, mut shown) = mpsc::unbounded_channel();
    let (handle, _task) = TriggerService::spawn(TriggerEngine::default(), surface, Arc::new(clock.clone()));
    let mut c = SeriesCoordinator::new(MemoryStore::new(), Arc::new(clock.clone())).with_channel(handle.clone());

    let done = c.create_series(&ReminderDraft::new("Done", at(9, 0))).unwrap().created[0];
    let gone = c.create_series(&ReminderDraft::new("Gone", at(9, 0))).unwrap().created[0];
    let moved = c.create_series(&ReminderDraft::new("Later", at(9, 0))).unwrap().created[0];
    clock.set(at(9, 0) + Duration::seconds(5));
    handle.tick();
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.active.len(), 3);
    assert_eq!(drain(&mut shown).len(), 3);

    c.complete(done).unwrap();
    c.delete_occurrence(gone).unwrap();
    c.snooze(moved, 10).unwrap();
    let snap = handle.snapshot().await.unwrap();
    assert!(snap.active.is_empty());
    assert_eq!(snap.armed, vec![(moved, at(9, 10))]);
    let remembered: Vec<_> = snap.last_shown.iter().map(|e| e.occurrence_id).collect();
    assert!(remembered.contains(&done));
    assert!(!remembered.contains(&gone));
}

#[tokio::test]
async fn test_resume_catches_up_what_os_dispatch_skips() {
    let clock = ManualClock::new(at(8, 0));
    let store = MemoryStore::new();
    let mut c = SeriesCoordinator::new(store.clone(), Arc::new(clock.clone()));
    let due = at(9, 0);
    let id = c.create_series(&ReminderDraft::new("Standup", due)).unwrap().created[0];
    let stale = c.create_series(&ReminderDraft::new("Old", at(8, 30))).unwrap().created[0];

    // process restarts five minutes after the due time
    clock.set(due + Duration::minutes(5));
    let svc = Arc::new(InMemoryNotificationService::new());
    let mut resumed = SeriesCoordinator::new(store.clone(), Arc::new(clock.clone()))
        .with_channel(NotificationDispatcher::new(Arc::clone(&svc)));
    resumed.resync().unwrap();
    assert!(svc.pending_ids().is_empty());

    let (surface, mut shown) = mpsc::unbounded_channel();
    let (handle, _task) = TriggerService::spawn(TriggerEngine::default(), surface, Arc::new(clock.clone()));
    let live = store.fetch(&OccurrenceFilter::active().completed(false)).unwrap();
    handle.resume(live.clone());
    handle.resume(live);
    handle.snapshot().await.unwrap();

    let presented: Vec<_> = drain(&mut shown).into_iter().map(|o| o.id).collect();
    assert_eq!(presented, vec![id]);
    assert!(!presented.contains(&stale));
}

#[tokio::test]
async fn test_last_shown_persists_across_service_restarts() {
    let clock = ManualClock::new(at(9, 2));
    let occ = Occurrence::new("Standup", at(9, 0), at(9, 0));

    let (surface, mut shown) = mpsc::unbounded_channel();
    let (handle, task) = TriggerService::spawn(TriggerEngine::default(), surface, Arc::new(clock.clone()));
    handle.resume(vec![occ.clone()]);
    let engine = handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert_eq!(drain(&mut shown).len(), 1);

    let saved = serde_json::to_string(&engine.export_last_shown()).unwrap();
    let mut restored = TriggerEngine::default();
    restored.import_last_shown(serde_json::from_str::<Vec<recurra_core::trigger::ShownEntry>>(&saved).unwrap());

    let (surface, mut shown) = mpsc::unbounded_channel();
    let (handle, _task) = TriggerService::spawn(restored, surface, Arc::new(clock.clone()));
    clock.advance(Duration::minutes(1));
    handle.resume(vec![occ]);
    handle.snapshot().await.unwrap();
    assert!(drain(&mut shown).is_empty());
}
