//! Owner of every running door.
//!
//! Doors are started onto one [`JoinSet`]. Shutdown cancels the shared
//! token, waits up to a grace period for every task to wind down (door loops
//! relock their doors on the way out), then aborts whatever is left.
//!
//! Dropping a supervisor without [`shutdown`](DoorSupervisor::shutdown)
//! cancels the doors and detaches their tasks instead of aborting them, so
//! they still relock while the runtime is alive.

use crate::dispatch::DecisionObserver;
use crate::door::{Door, DoorHandle};
use crate::error::{DoorError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How a door task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    Completed,
    Aborted,
    Panicked,
}

/// Outcome of [`DoorSupervisor::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that returned on their own.
    pub completed: usize,

    /// Tasks aborted after the grace period.
    pub aborted: usize,

    pub panicked: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.aborted == 0 && self.panicked == 0
    }

    fn record(&mut self, result: std::result::Result<(), JoinError>) {
        match classify_task_result(result) {
            TaskTermination::Completed => self.completed += 1,
            TaskTermination::Aborted => self.aborted += 1,
            TaskTermination::Panicked => self.panicked += 1,
        }
    }
}

fn classify_task_result(result: std::result::Result<(), JoinError>) -> TaskTermination {
    match result {
        Ok(()) => TaskTermination::Completed,
        Err(e) if e.is_cancelled() => TaskTermination::Aborted,
        Err(e) => {
            error!(error = %e, "door task panicked");
            TaskTermination::Panicked
        }
    }
}

/// Runs doors and routes requests to them by name.
#[derive(Debug, Default)]
pub struct DoorSupervisor {
    doors: HashMap<String, DoorHandle>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
}

impl DoorSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parent token to build doors with; cancelled by [`shutdown`](Self::shutdown).
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Start `door` and register it under its name.
    ///
    /// # Errors
    /// Returns [`DoorError::DuplicateDoor`] if the name is taken; the door is
    /// not started.
    pub async fn add_door(&mut self, door: Door) -> Result<DoorHandle> {
        if self.doors.contains_key(door.name()) {
            return Err(DoorError::DuplicateDoor(door.name().to_string()));
        }

        let handle = door.start(&mut self.tasks).await;
        self.doors.insert(handle.name().to_string(), handle.clone());
        Ok(handle)
    }

    pub fn door(&self, name: &str) -> Option<&DoorHandle> {
        self.doors.get(name)
    }

    pub fn door_names(&self) -> impl Iterator<Item = &str> {
        self.doors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.doors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doors.is_empty()
    }

    /// Request a remote opening of the named door.
    ///
    /// # Errors
    /// Returns [`DoorError::UnknownDoor`] if no door has that name.
    pub fn trigger_open(&self, name: &str) -> Result<()> {
        let door = self
            .doors
            .get(name)
            .ok_or_else(|| DoorError::UnknownDoor(name.to_string()))?;
        door.trigger_open();
        Ok(())
    }

    /// Subscribe `observer` to every registered door.
    pub fn subscribe_all(&self, observer: Arc<dyn DecisionObserver>) {
        for door in self.doors.values() {
            door.subscribe(Arc::clone(&observer));
        }
    }

    /// Stop every door, waiting at most `grace` before aborting stragglers.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        info!(doors = self.doors.len(), "stopping doors");
        self.cancel.cancel();

        let mut report = ShutdownReport::default();
        let deadline = tokio::time::sleep(grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = self.tasks.join_next() => match joined {
                    Some(result) => report.record(result),
                    None => break,
                },
                () = &mut deadline => {
                    warn!(remaining = self.tasks.len(), "grace period elapsed, aborting door tasks");
                    self.tasks.abort_all();
                    while let Some(result) = self.tasks.join_next().await {
                        report.record(result);
                    }
                    break;
                }
            }
        }

        info!(
            completed = report.completed,
            aborted = report.aborted,
            panicked = report.panicked,
            "doors stopped"
        );
        report
    }
}

impl Drop for DoorSupervisor {
    fn drop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        warn!(tasks = self.tasks.len(), "door supervisor dropped without shutdown");
        self.cancel.cancel();
        self.tasks.detach_all();
    }
}
