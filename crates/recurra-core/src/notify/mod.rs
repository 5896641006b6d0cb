//! OS notification channel: stable ids, the service abstraction, the
//! primary/follow-up dispatch policy and a SQLite-backed outbox.

pub mod dispatch;
pub mod followup;
pub mod gateway;
pub mod ids;
pub mod outbox;

pub use dispatch::{plan_primary, DispatchReport, NotificationDispatcher, PrimaryPlan};
pub use gateway::{
    Delivery, GatewayCall, InMemoryNotificationService, NotificationAction, NotificationPayload,
    NotificationRequest, NotificationService,
};
pub use ids::NotificationId;
pub use outbox::SqliteNotificationOutbox;
