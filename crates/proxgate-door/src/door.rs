//! A door: its controller loop, its cache refresher and the handle used to
//! reach them once they run.

use crate::cache::AuthorizationCache;
use crate::controller::{DoorController, DoorTimings};
use crate::dispatch::{DecisionObserver, EventDispatcher, SubscriptionId};
use crate::policy::AfterHoursPolicy;
use proxgate_core::constants::DEFAULT_CACHE_RELOAD_SECS;
use proxgate_hardware::AnyDeviceLink;
use proxgate_storage::AnyDirectory;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, error, info, info_span};

/// Settings shared by every door of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorOptions {
    pub timings: DoorTimings,
    pub refresh_interval: Duration,
    pub after_hours: Option<AfterHoursPolicy>,
}

impl Default for DoorOptions {
    fn default() -> Self {
        Self {
            timings: DoorTimings::default(),
            refresh_interval: Duration::from_secs(DEFAULT_CACHE_RELOAD_SECS),
            after_hours: None,
        }
    }
}

/// A configured door that has not started yet.
#[derive(Debug)]
pub struct Door {
    controller: DoorController,
    refresh_interval: Duration,
    cancel: CancellationToken,
    span: Span,
}

impl Door {
    /// Assemble a door. Its tasks stop when `parent` is cancelled.
    pub fn new(
        name: impl Into<String>,
        link: impl Into<AnyDeviceLink>,
        directory: impl Into<AnyDirectory>,
        options: &DoorOptions,
        parent: &CancellationToken,
    ) -> Self {
        let name = name.into();
        let span = info_span!("door", door = %name);
        let cancel = parent.child_token();
        let cache = AuthorizationCache::new(&name, directory, options.after_hours, span.clone());
        let controller = DoorController::new(name, link, cache, options.timings, cancel.clone());

        Self {
            controller,
            refresh_interval: options.refresh_interval,
            cancel,
            span,
        }
    }

    pub fn name(&self) -> &str {
        self.controller.name()
    }

    pub fn handle(&self) -> DoorHandle {
        DoorHandle {
            name: Arc::from(self.controller.name()),
            trigger: self.controller.trigger_flag(),
            dispatcher: self.controller.dispatcher().clone(),
            cache: self.controller.cache().clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Load the authorization table, then spawn the door loop and the
    /// periodic refresher onto `tasks`.
    ///
    /// If the initial load fails the door still starts, locked and denying
    /// every card, and retries on the refresh interval.
    pub async fn start(self, tasks: &mut JoinSet<()>) -> DoorHandle {
        let handle = self.handle();

        match handle.cache.refresh().await {
            Ok(count) => self.span.in_scope(|| info!(cards = count, "authorization table loaded")),
            Err(error) => self.span.in_scope(|| {
                error!(%error, "initial authorization load failed, door starts locked");
            }),
        }

        tasks.spawn(
            handle
                .cache
                .clone()
                .run_refresh(self.refresh_interval, self.cancel.clone())
                .instrument(self.span.clone()),
        );
        tasks.spawn(self.controller.run().instrument(self.span));

        handle
    }
}

/// Cloneable access to a running door.
#[derive(Debug, Clone)]
pub struct DoorHandle {
    name: Arc<str>,
    trigger: Arc<AtomicBool>,
    dispatcher: EventDispatcher,
    cache: AuthorizationCache,
    cancel: CancellationToken,
}

impl DoorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the door loop to open the door on its next idle pass.
    ///
    /// Requests made before the loop gets there collapse into one opening.
    pub fn trigger_open(&self) {
        self.trigger.store(true, Ordering::Release);
    }

    pub fn subscribe(&self, observer: Arc<dyn DecisionObserver>) -> SubscriptionId {
        self.dispatcher.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    pub fn cache(&self) -> &AuthorizationCache {
        &self.cache
    }

    /// Stop this door only.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
