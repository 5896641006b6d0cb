//! In-app presentation triggers with catch-up and de-duplication.

pub mod engine;
pub mod service;

pub use engine::{ShownEntry, TimerState, TriggerEngine};
pub use service::{PresentationSurface, TriggerHandle, TriggerService, TriggerSnapshot};
