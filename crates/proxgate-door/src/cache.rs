//! Per-door authorization cache.
//!
//! Lookups read an immutable [`DoorState`] snapshot behind an [`ArcSwap`], so
//! the door loop never waits on a refresh. A refresh stages the directory's
//! answer off to the side and publishes it with a single pointer swap; a
//! failed refresh leaves the previous snapshot in place.

use arc_swap::ArcSwap;
use chrono::{Datelike, Local, Timelike};
use proxgate_core::{AuthorizedCard, CardKey};
use proxgate_storage::{AnyDirectory, DirectorySource, DoorSnapshot, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, warn};

use crate::policy::AfterHoursPolicy;

/// Authorization data for one door at one point in time.
#[derive(Debug, Clone, Default)]
pub struct DoorState {
    cards: Arc<HashMap<CardKey, AuthorizedCard>>,
    force_unlocked: bool,
}

impl DoorState {
    pub fn cards(&self) -> &HashMap<CardKey, AuthorizedCard> {
        &self.cards
    }

    pub fn force_unlocked(&self) -> bool {
        self.force_unlocked
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[derive(Debug)]
struct CacheInner {
    door: String,
    directory: AnyDirectory,
    active: ArcSwap<DoorState>,
    policy: Option<AfterHoursPolicy>,
    // Bumped on every persisted toggle; a refresh that raced one keeps the
    // in-memory flag instead of the one it read.
    toggles: AtomicU64,
    span: Span,
}

/// Shared handle to one door's authorization table.
///
/// Starts empty and locked: every card is denied until the first successful
/// [`refresh`](Self::refresh).
#[derive(Debug, Clone)]
pub struct AuthorizationCache {
    inner: Arc<CacheInner>,
}

impl AuthorizationCache {
    pub fn new(
        door: impl Into<String>,
        directory: impl Into<AnyDirectory>,
        policy: Option<AfterHoursPolicy>,
        span: Span,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                door: door.into(),
                directory: directory.into(),
                active: ArcSwap::from_pointee(DoorState::default()),
                policy,
                toggles: AtomicU64::new(0),
                span,
            }),
        }
    }

    pub fn door(&self) -> &str {
        &self.inner.door
    }

    /// Reload the table and forced-unlocked flag from the directory.
    ///
    /// Returns the number of authorized cards now cached.
    ///
    /// # Errors
    /// Returns the directory's error; the cached state is left untouched.
    pub async fn refresh(&self) -> Result<usize, StorageError> {
        let inner = &self.inner;
        let toggles_before = inner.toggles.load(Ordering::Acquire);

        let snapshot = inner
            .directory
            .load_door(&inner.door)
            .instrument(inner.span.clone())
            .await?;

        let count = self.publish(snapshot, toggles_before);
        inner.span.in_scope(|| {
            debug!(
                cards = count,
                force_unlocked = self.force_unlocked(),
                "authorization table refreshed"
            );
        });
        Ok(count)
    }

    /// Swap in a loaded snapshot. The flag is taken from `snapshot` only if
    /// no toggle was applied since `toggles_before`; the counter is read
    /// inside the `rcu` closure, so a toggle that lands during the swap
    /// forces a retry that keeps it.
    fn publish(&self, snapshot: DoorSnapshot, toggles_before: u64) -> usize {
        let inner = &self.inner;
        let cards = Arc::new(snapshot.cards);

        inner.active.rcu(|current| {
            let raced_toggle = inner.toggles.load(Ordering::Acquire) != toggles_before;
            DoorState {
                cards: Arc::clone(&cards),
                force_unlocked: if raced_toggle {
                    current.force_unlocked
                } else {
                    snapshot.default_unlocked
                },
            }
        });
        cards.len()
    }

    /// Persist a new forced-unlocked flag, then apply it to the cache.
    ///
    /// # Errors
    /// Returns the directory's error; nothing changes in memory.
    pub async fn set_forced_unlocked(&self, unlocked: bool) -> Result<(), StorageError> {
        let inner = &self.inner;
        inner
            .directory
            .set_default_unlocked(&inner.door, unlocked)
            .instrument(inner.span.clone())
            .await?;

        inner.toggles.fetch_add(1, Ordering::AcqRel);
        inner.active.rcu(|current| DoorState {
            cards: Arc::clone(&current.cards),
            force_unlocked: unlocked,
        });
        Ok(())
    }

    pub fn force_unlocked(&self) -> bool {
        self.inner.active.load().force_unlocked
    }

    /// Current snapshot of the table.
    pub fn snapshot(&self) -> Arc<DoorState> {
        self.inner.active.load_full()
    }

    /// Look `key` up against the current table and the after-hours policy.
    pub fn check_access(&self, key: &CardKey) -> Option<AuthorizedCard> {
        self.check_access_at(key, &Local::now())
    }

    /// [`check_access`](Self::check_access) evaluated at `at`.
    pub fn check_access_at<T: Datelike + Timelike>(
        &self,
        key: &CardKey,
        at: &T,
    ) -> Option<AuthorizedCard> {
        let state = self.inner.active.load();
        let card = state.cards.get(key)?;

        if let Some(policy) = &self.inner.policy
            && !policy.permits(card, at)
        {
            self.inner.span.in_scope(|| {
                debug!(card = %key, holder = %card.real_name, "outside permitted hours");
            });
            return None;
        }
        Some(card.clone())
    }

    /// Refresh every `interval` until `cancel` fires.
    ///
    /// The first refresh happens one full interval after the call. A refresh
    /// already in flight completes before cancellation is observed.
    pub async fn run_refresh(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(error) = self.refresh().await {
                        self.inner.span.in_scope(|| {
                            warn!(%error, "refresh failed, keeping previous authorization table");
                        });
                    }
                }
            }
        }

        self.inner.span.in_scope(|| info!("authorization refresh stopped"));
    }
}
