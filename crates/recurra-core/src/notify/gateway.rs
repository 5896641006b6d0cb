//! OS notification service abstraction.
//!
//! The service is addressed by stable [`NotificationId`]s. Scheduling an id
//! that is already pending replaces it; cancelling an unknown id is a no-op.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::NotificationId;
use crate::error::DispatchError;
use crate::reminder::{Occurrence, OccurrenceId};

/// When the OS should show the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum Delivery {
    At(DateTime<Utc>),
    Immediate,
}

impl Delivery {
    /// Whether the OS would have shown this by `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self {
            Delivery::At(at) => *at <= now,
            Delivery::Immediate => true,
        }
    }
}

/// Buttons attached to every reminder notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationAction {
    Complete,
    Snooze { minutes: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub occurrence_id: OccurrenceId,
    pub title: String,
    /// 0 for the primary, n for the n-th follow-up.
    pub sequence: u32,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: NotificationId,
    pub delivery: Delivery,
    pub payload: NotificationPayload,
}

impl NotificationRequest {
    /// Request for `occurrence` with the standard COMPLETE / SNOOZE actions.
    pub fn for_occurrence(
        occurrence: &Occurrence,
        sequence: u32,
        delivery: Delivery,
        snooze_minutes: u32,
    ) -> Self {
        Self {
            id: NotificationId::follow_up(occurrence.id, sequence),
            delivery,
            payload: NotificationPayload {
                occurrence_id: occurrence.id,
                title: occurrence.title.clone(),
                sequence,
                actions: vec![
                    NotificationAction::Complete,
                    NotificationAction::Snooze {
                        minutes: snooze_minutes,
                    },
                ],
            },
        }
    }
}

/// OS-level notification service.
pub trait NotificationService {
    fn schedule(&self, request: NotificationRequest) -> Result<(), DispatchError>;

    fn cancel_pending(&self, ids: &[NotificationId]) -> Result<(), DispatchError>;

    fn cancel_delivered(&self, ids: &[NotificationId]) -> Result<(), DispatchError>;

    fn list_pending(&self) -> Result<Vec<NotificationRequest>, DispatchError>;

    fn list_delivered(&self) -> Result<Vec<NotificationRequest>, DispatchError>;
}

impl<T: NotificationService + ?Sized> NotificationService for Arc<T> {
    fn schedule(&self, request: NotificationRequest) -> Result<(), DispatchError> {
        (**self).schedule(request)
    }

    fn cancel_pending(&self, ids: &[NotificationId]) -> Result<(), DispatchError> {
        (**self).cancel_pending(ids)
    }

    fn cancel_delivered(&self, ids: &[NotificationId]) -> Result<(), DispatchError> {
        (**self).cancel_delivered(ids)
    }

    fn list_pending(&self) -> Result<Vec<NotificationRequest>, DispatchError> {
        (**self).list_pending()
    }

    fn list_delivered(&self) -> Result<Vec<NotificationRequest>, DispatchError> {
        (**self).list_delivered()
    }
}

/// Calls observed by [`InMemoryNotificationService`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Schedule(NotificationId),
    CancelPending(Vec<NotificationId>),
    CancelDelivered(Vec<NotificationId>),
}

#[derive(Debug, Default)]
struct InMemoryState {
    pending: BTreeMap<NotificationId, NotificationRequest>,
    delivered: BTreeMap<NotificationId, NotificationRequest>,
    unavailable: bool,
    calls: Vec<GatewayCall>,
}

/// Notification service kept in process memory.
///
/// Mirrors the OS semantics the dispatcher relies on and records every call.
#[derive(Debug, Default)]
pub struct InMemoryNotificationService {
    state: Mutex<InMemoryState>,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every call until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Move every pending request due by `now` to the delivered list.
    pub fn deliver_due(&self, now: DateTime<Utc>) -> Vec<NotificationRequest> {
        let mut state = self.lock();
        let due: Vec<NotificationId> = state
            .pending
            .values()
            .filter(|r| r.delivery.is_due(now))
            .map(|r| r.id)
            .collect();
        let mut shown = Vec::with_capacity(due.len());
        for id in due {
            if let Some(request) = state.pending.remove(&id) {
                state.delivered.insert(id, request.clone());
                shown.push(request);
            }
        }
        shown
    }

    pub fn pending_ids(&self) -> Vec<NotificationId> {
        self.lock().pending.keys().copied().collect()
    }

    pub fn delivered_ids(&self) -> Vec<NotificationId> {
        self.lock().delivered.keys().copied().collect()
    }

    pub fn pending_request(&self, id: &NotificationId) -> Option<NotificationRequest> {
        self.lock().pending.get(id).cloned()
    }

    /// Every id, pending or delivered, that belongs to `occurrence_id`.
    pub fn ids_for(&self, occurrence_id: OccurrenceId) -> Vec<NotificationId> {
        let state = self.lock();
        state
            .pending
            .keys()
            .chain(state.delivered.keys())
            .filter(|id| id.occurrence_id == occurrence_id)
            .copied()
            .collect()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(state: &InMemoryState) -> Result<(), DispatchError> {
        if state.unavailable {
            Err(DispatchError::Unavailable("notification permission revoked".into()))
        } else {
            Ok(())
        }
    }
}

impl NotificationService for InMemoryNotificationService {
    fn schedule(&self, request: NotificationRequest) -> Result<(), DispatchError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        state.calls.push(GatewayCall::Schedule(request.id));
        state.pending.insert(request.id, request);
        Ok(())
    }

    fn cancel_pending(&self, ids: &[NotificationId]) -> Result<(), DispatchError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        state.calls.push(GatewayCall::CancelPending(ids.to_vec()));
        for id in ids {
            state.pending.remove(id);
        }
        Ok(())
    }

    fn cancel_delivered(&self, ids: &[NotificationId]) -> Result<(), DispatchError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        state.calls.push(GatewayCall::CancelDelivered(ids.to_vec()));
        for id in ids {
            state.delivered.remove(id);
        }
        Ok(())
    }

    fn list_pending(&self) -> Result<Vec<NotificationRequest>, DispatchError> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state.pending.values().cloned().collect())
    }

    fn list_delivered(&self) -> Result<Vec<NotificationRequest>, DispatchError> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state.delivered.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn occurrence() -> Occurrence {
        let due = Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap();
        Occurrence::new("Take pills", due, due)
    }

    #[test]
    fn request_carries_actions_and_sequence() {
        let occ = occurrence();
        let req = NotificationRequest::for_occurrence(&occ, 2, Delivery::Immediate, 10);
        assert_eq!(req.id, NotificationId::follow_up(occ.id, 2));
        assert_eq!(req.payload.sequence, 2);
        assert_eq!(
            req.payload.actions,
            vec![NotificationAction::Complete, NotificationAction::Snooze { minutes: 10 }]
        );
    }

    #[test]
    fn schedule_replaces_same_id_and_cancel_is_idempotent() {
        let svc = InMemoryNotificationService::new();
        let occ = occurrence();
        let first = NotificationRequest::for_occurrence(&occ, 0, Delivery::At(occ.due), 10);
        let second = NotificationRequest::for_occurrence(&occ, 0, Delivery::Immediate, 10);
        svc.schedule(first).unwrap();
        svc.schedule(second.clone()).unwrap();
        assert_eq!(svc.pending_ids().len(), 1);
        assert_eq!(svc.pending_request(&second.id), Some(second.clone()));

        svc.cancel_pending(&[second.id]).unwrap();
        svc.cancel_pending(&[second.id]).unwrap();
        assert!(svc.pending_ids().is_empty());
    }

    #[test]
    fn deliver_due_moves_requests() {
        let svc = InMemoryNotificationService::new();
        let occ = occurrence();
        svc.schedule(NotificationRequest::for_occurrence(&occ, 0, Delivery::At(occ.due), 10))
            .unwrap();
        svc.schedule(NotificationRequest::for_occurrence(
            &occ,
            1,
            Delivery::At(occ.due + Duration::minutes(5)),
            10,
        ))
        .unwrap();

        let shown = svc.deliver_due(occ.due);
        assert_eq!(shown.len(), 1);
        assert_eq!(svc.delivered_ids(), vec![NotificationId::primary(occ.id)]);
        assert_eq!(svc.pending_ids(), vec![NotificationId::follow_up(occ.id, 1)]);
        assert_eq!(svc.ids_for(occ.id).len(), 2);
    }

    #[test]
    fn unavailable_service_refuses() {
        let svc = InMemoryNotificationService::new();
        svc.set_unavailable(true);
        let occ = occurrence();
        let result = svc.schedule(NotificationRequest::for_occurrence(&occ, 0, Delivery::Immediate, 10));
        assert!(matches!(result, Err(DispatchError::Unavailable(_))));
        assert!(svc.calls().is_empty());
    }

    #[test]
    fn payload_serializes_actions_in_wire_form() {
        let occ = occurrence();
        let req = NotificationRequest::for_occurrence(&occ, 0, Delivery::Immediate, 10);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["id"], format!("occurrence:{}", occ.id));
        assert_eq!(json["payload"]["actions"][0]["action"], "COMPLETE");
        assert_eq!(json["payload"]["actions"][1]["action"], "SNOOZE");
        assert_eq!(json["payload"]["actions"][1]["minutes"], 10);
        assert_eq!(json["delivery"]["kind"], "immediate");
    }
}
