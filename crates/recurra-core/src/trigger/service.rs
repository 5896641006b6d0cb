//! Actor that owns a [`TriggerEngine`] and serializes every call into it.
//!
//! Timer fires, resume sweeps and user actions all arrive as messages on one
//! channel, so at most one of them touches the engine at a time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::engine::{ShownEntry, TriggerEngine};
use crate::channel::{DeliveryChannel, Settlement};
use crate::reminder::{Occurrence, OccurrenceId};
use crate::time::Clock;

/// Where presented reminders go.
pub trait PresentationSurface: Send + 'static {
    fn present(&self, occurrence: &Occurrence);
}

impl PresentationSurface for mpsc::UnboundedSender<Occurrence> {
    fn present(&self, occurrence: &Occurrence) {
        if self.send(occurrence.clone()).is_err() {
            tracing::debug!(occurrence = %occurrence.id, "presentation receiver dropped");
        }
    }
}

/// Point-in-time view of the actor's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSnapshot {
    pub armed: Vec<(OccurrenceId, DateTime<Utc>)>,
    pub active: Vec<OccurrenceId>,
    pub last_shown: Vec<ShownEntry>,
}

enum Command {
    Arm(Occurrence),
    Cancel(OccurrenceId),
    Forget(OccurrenceId),
    Resume(Vec<Occurrence>),
    Present(Occurrence),
    Completed(OccurrenceId),
    Snoozed(Occurrence),
    Dismissed(OccurrenceId),
    Settle(OccurrenceId, Settlement),
    Reconcile(Vec<Occurrence>),
    Tick,
    Snapshot(oneshot::Sender<TriggerSnapshot>),
    Shutdown(oneshot::Sender<TriggerEngine>),
}

/// Cloneable sender side of the trigger actor.
#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl TriggerHandle {
    pub fn arm(&self, occurrence: Occurrence) {
        self.send(Command::Arm(occurrence));
    }

    pub fn cancel(&self, id: OccurrenceId) {
        self.send(Command::Cancel(id));
    }

    /// The occurrence was purged; drop its dedup record too.
    pub fn forget(&self, id: OccurrenceId) {
        self.send(Command::Forget(id));
    }

    /// Cold start or foreground resume with the current store contents.
    pub fn resume(&self, occurrences: Vec<Occurrence>) {
        self.send(Command::Resume(occurrences));
    }

    /// Present now unless it was already presented for this due time.
    pub fn present(&self, occurrence: Occurrence) {
        self.send(Command::Present(occurrence));
    }

    pub fn completed(&self, id: OccurrenceId) {
        self.send(Command::Completed(id));
    }

    pub fn snoozed(&self, occurrence: Occurrence) {
        self.send(Command::Snoozed(occurrence));
    }

    pub fn dismissed(&self, id: OccurrenceId) {
        self.send(Command::Dismissed(id));
    }

    /// Drop state for occurrences that left `known` or stopped being live.
    pub fn reconcile(&self, known: Vec<Occurrence>) {
        self.send(Command::Reconcile(known));
    }

    /// Re-evaluate due timers against the clock immediately.
    pub fn tick(&self) {
        self.send(Command::Tick);
    }

    /// Returns `None` once the actor has stopped.
    pub async fn snapshot(&self) -> Option<TriggerSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply));
        rx.await.ok()
    }

    /// Stop the actor and hand back its engine for persistence.
    pub async fn shutdown(&self) -> Option<TriggerEngine> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown(reply));
        rx.await.ok()
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            tracing::debug!("trigger service stopped, command dropped");
        }
    }
}

impl DeliveryChannel for TriggerHandle {
    fn name(&self) -> &'static str {
        "in-app"
    }

    fn cancel(&self, occurrence: &Occurrence) {
        TriggerHandle::cancel(self, occurrence.id);
    }

    fn settle(&self, before: &Occurrence, settlement: Settlement) {
        self.send(Command::Settle(before.id, settlement));
    }

    fn schedule(&self, occurrence: &Occurrence, _now: DateTime<Utc>) {
        self.arm(occurrence.clone());
    }
}

pub struct TriggerService<P> {
    engine: TriggerEngine,
    surface: P,
    clock: Arc<dyn Clock>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl<P: PresentationSurface> TriggerService<P> {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(engine: TriggerEngine, surface: P, clock: Arc<dyn Clock>) -> (TriggerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            engine,
            surface,
            clock,
            rx,
        };
        let task = tokio::spawn(service.run());
        (TriggerHandle { tx }, task)
    }

    async fn run(mut self) {
        tracing::debug!("trigger service started");
        loop {
            let sleep_for = self.engine.next_deadline().map(|at| {
                (at - self.clock.now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO)
            });

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        let _ = reply.send(self.engine);
                        tracing::debug!("trigger service stopped");
                        return;
                    }
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = sleep_until(sleep_for) => self.fire_due(),
            }
        }
        tracing::debug!("trigger service stopped, all handles dropped");
    }

    fn handle(&mut self, command: Command) {
        let now = self.clock.now();
        match command {
            Command::Arm(occurrence) => {
                self.engine.arm(&occurrence, now);
            }
            Command::Cancel(id) => {
                self.engine.cancel(id);
            }
            Command::Forget(id) => self.engine.forget(id),
            Command::Resume(occurrences) => {
                for occurrence in self.engine.resume(&occurrences, now) {
                    self.surface.present(&occurrence);
                }
            }
            Command::Present(occurrence) => {
                if self.engine.present_if_needed(&occurrence, now) {
                    self.surface.present(&occurrence);
                }
            }
            Command::Completed(id) => self.engine.completed(id),
            Command::Snoozed(occurrence) => {
                self.engine.snoozed(&occurrence, now);
            }
            Command::Dismissed(id) => self.engine.dismissed(id),
            Command::Settle(id, settlement) => self.engine.settle(id, settlement),
            Command::Reconcile(known) => {
                self.engine.reconcile(&known);
            }
            Command::Tick => self.fire_due(),
            Command::Snapshot(reply) => {
                let _ = reply.send(TriggerSnapshot {
                    armed: self.engine.armed(),
                    active: self.engine.active(),
                    last_shown: self.engine.export_last_shown(),
                });
            }
            // handled in `run`
            Command::Shutdown(_) => {}
        }
    }

    fn fire_due(&mut self) {
        for occurrence in self.engine.fire_due(self.clock.now()) {
            tracing::info!(occurrence = %occurrence.id, title = %occurrence.title, "presenting reminder");
            self.surface.present(&occurrence);
        }
    }
}

async fn sleep_until(duration: Option<std::time::Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}
