//! The per-door control loop.
//!
//! Each pass waits up to the receive timeout for a card. A card is checked
//! against the [`AuthorizationCache`] and acted on:
//!
//! | Lookup            | Action                                              |
//! |-------------------|-----------------------------------------------------|
//! | magic card        | flip forced-unlocked, persist it, notify beep       |
//! | authorized card   | open the door unless it is forced unlocked          |
//! | no match          | error beep, then a denial delay                     |
//!
//! When no card arrived the pass runs the idle work instead: a pending
//! remote trigger opens the door once, and every latch-sync interval the
//! board's LED and strike are driven to match the forced-unlocked flag.
//!
//! A failed link is retried on the next pass after a backoff that grows by
//! one receive timeout per consecutive failure, up to
//! [`MAX_LINK_RETRY_BACKOFF_MS`]. A serial link reopens its port on that
//! retry.
//!
//! Every decision is published to the door's [`EventDispatcher`] after the
//! door has been actuated.

use crate::cache::AuthorizationCache;
use crate::dispatch::EventDispatcher;
use crate::state::LoopState;
use proxgate_core::constants::{
    DEFAULT_BEEP_PACING_MS, DEFAULT_DENIAL_DELAY_MS, DEFAULT_LATCH_SYNC_INTERVAL_MS,
    DEFAULT_OPEN_HOLD_MS, DEFAULT_RECEIVE_TIMEOUT_MS, MAX_LINK_RETRY_BACKOFF_MS,
    RECEIVE_POLL_INTERVAL_MS,
};
use proxgate_core::{AuthorizedCard, CardIdentity, CardKey, DecisionEvent};
use proxgate_hardware::reader::pause;
use proxgate_hardware::{AnyDeviceLink, CardReader, DeviceLink, ProtocolError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Durations that shape the door loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorTimings {
    /// How long the strike stays released for a granted card.
    pub open_hold: Duration,

    /// Pause after a denial before the next read.
    pub denial_delay: Duration,

    /// Gap between the steps of the notify beep.
    pub beep_pacing: Duration,

    /// Minimum gap between idle latch syncs.
    pub latch_sync_interval: Duration,

    /// How long one read waits for a line.
    pub receive_timeout: Duration,
}

impl Default for DoorTimings {
    fn default() -> Self {
        Self {
            open_hold: Duration::from_millis(DEFAULT_OPEN_HOLD_MS),
            denial_delay: Duration::from_millis(DEFAULT_DENIAL_DELAY_MS),
            beep_pacing: Duration::from_millis(DEFAULT_BEEP_PACING_MS),
            latch_sync_interval: Duration::from_millis(DEFAULT_LATCH_SYNC_INTERVAL_MS),
            receive_timeout: Duration::from_millis(DEFAULT_RECEIVE_TIMEOUT_MS),
        }
    }
}

/// Whether the loop should run another pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

/// Drives one door's reader.
#[derive(Debug)]
pub struct DoorController {
    name: String,
    reader: CardReader<AnyDeviceLink>,
    cache: AuthorizationCache,
    dispatcher: EventDispatcher,
    trigger: Arc<AtomicBool>,
    timings: DoorTimings,
    cancel: CancellationToken,
    state: LoopState,
    last_latch_sync: Option<Instant>,
    link_failures: u32,
}

impl DoorController {
    /// Build a controller over `link`. The link's receive timeout is set
    /// from `timings`.
    pub fn new(
        name: impl Into<String>,
        link: impl Into<AnyDeviceLink>,
        cache: AuthorizationCache,
        timings: DoorTimings,
        cancel: CancellationToken,
    ) -> Self {
        let mut link = link.into();
        link.set_receive_timeout(timings.receive_timeout);

        Self {
            name: name.into(),
            reader: CardReader::new(link, timings.beep_pacing, cancel.clone()),
            cache,
            dispatcher: EventDispatcher::new(),
            trigger: Arc::new(AtomicBool::new(false)),
            timings,
            cancel,
            state: LoopState::Idle,
            last_latch_sync: None,
            link_failures: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn cache(&self) -> &AuthorizationCache {
        &self.cache
    }

    /// Flag that requests one remote opening on the next idle pass.
    pub fn trigger_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.trigger)
    }

    /// Run passes until cancelled, then drive the latches locked.
    pub async fn run(mut self) {
        info!(door = %self.name, "door loop started");
        while self.step().await == Step::Continue {}
        self.stop().await;
    }

    /// Run one pass of the loop.
    pub async fn step(&mut self) -> Step {
        if self.cancel.is_cancelled() {
            return Step::Stop;
        }

        self.enter(LoopState::ReadPending);
        let read = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Step::Stop,
            read = self.reader.read() => read,
        };

        if !matches!(read, Err(ProtocolError::Link(_))) && self.link_failures > 0 {
            info!(door = %self.name, failures = self.link_failures, "reader link restored");
            self.link_failures = 0;
        }

        match read {
            Ok(Some(identity)) => self.handle_card(identity).await,
            Ok(None) => {
                self.enter(LoopState::Idle);
                self.idle().await;
                Step::Continue
            }
            Err(ProtocolError::Decode(error)) => {
                warn!(door = %self.name, %error, "malformed card frame");
                if let Err(error) = self.reader.flush() {
                    warn!(door = %self.name, %error, "failed to flush reader");
                }
                self.enter(LoopState::Idle);
                Step::Continue
            }
            Err(ProtocolError::Link(error)) => {
                self.link_failures = self.link_failures.saturating_add(1);
                let backoff = self.link_backoff();
                if self.link_failures == 1 {
                    warn!(door = %self.name, %error, ?backoff, "reader link failed, retrying");
                } else {
                    debug!(
                        door = %self.name,
                        %error,
                        failures = self.link_failures,
                        ?backoff,
                        "reader link still down"
                    );
                }
                self.enter(LoopState::Idle);
                if pause(&self.cancel, backoff).await {
                    Step::Continue
                } else {
                    Step::Stop
                }
            }
        }
    }

    async fn handle_card(&mut self, identity: CardIdentity) -> Step {
        let key = identity.key();
        let mut step = Step::Continue;

        let event = match self.cache.check_access(&key) {
            Some(card) if card.magic => {
                self.enter(LoopState::MagicToggle);
                self.toggle_forced_unlocked(key, card).await
            }
            Some(card) => {
                self.enter(LoopState::Granted);
                info!(door = %self.name, card = %key, holder = %card.real_name, "access granted");
                if self.cache.force_unlocked() {
                    debug!(door = %self.name, "door forced unlocked, not cycling strike");
                } else if let Err(error) = self.reader.open_door(self.timings.open_hold).await {
                    warn!(door = %self.name, %error, "failed to cycle strike");
                }
                DecisionEvent::granted(&self.name, key, card)
            }
            None => {
                self.enter(LoopState::Denied);
                info!(door = %self.name, card = %key, "access denied");
                if let Err(error) = self.reader.error_beep().await {
                    warn!(door = %self.name, %error, "failed to sound error beep");
                }
                if !pause(&self.cancel, self.timings.denial_delay).await {
                    step = Step::Stop;
                }
                DecisionEvent::denied(&self.name, key)
            }
        };

        self.dispatcher.dispatch(&event);
        self.enter(LoopState::Idle);
        step
    }

    async fn toggle_forced_unlocked(&mut self, key: CardKey, card: AuthorizedCard) -> DecisionEvent {
        let target = !self.cache.force_unlocked();

        match self.cache.set_forced_unlocked(target).await {
            Ok(()) => {
                info!(
                    door = %self.name,
                    card = %key,
                    holder = %card.real_name,
                    forced_unlocked = target,
                    "magic card toggled door"
                );
                if let Err(error) = self.reader.notify_beep().await {
                    warn!(door = %self.name, %error, "failed to sound notify beep");
                }
                DecisionEvent::granted(&self.name, key, card)
            }
            Err(error) => {
                warn!(door = %self.name, %error, "failed to persist forced-unlocked flag");
                if let Err(error) = self.reader.error_beep().await {
                    warn!(door = %self.name, %error, "failed to sound error beep");
                }
                DecisionEvent::refused(&self.name, key, card)
            }
        }
    }

    async fn idle(&mut self) {
        if self.trigger.swap(false, Ordering::AcqRel) {
            self.enter(LoopState::TriggerOpen);
            if self.cache.force_unlocked() {
                debug!(door = %self.name, "remote trigger while forced unlocked");
            } else {
                info!(door = %self.name, "remote trigger, opening door");
                if let Err(error) = self.reader.open_door(self.timings.open_hold).await {
                    warn!(door = %self.name, %error, "failed to cycle strike");
                }
            }
            self.dispatcher.dispatch(&DecisionEvent::remote_trigger(&self.name));
            self.enter(LoopState::Idle);
        }

        let due = self
            .last_latch_sync
            .is_none_or(|last| last.elapsed() >= self.timings.latch_sync_interval);
        if due {
            let unlocked = self.cache.force_unlocked();
            trace!(door = %self.name, unlocked, "syncing latches");
            if let Err(error) = self.reader.set_door_latches(unlocked).await {
                warn!(door = %self.name, %error, "failed to sync latches");
            }
            self.last_latch_sync = Some(Instant::now());
        }
    }

    async fn stop(&mut self) {
        self.enter(LoopState::Stopped);
        if let Err(error) = self.reader.set_door_latches(false).await {
            warn!(door = %self.name, %error, "failed to lock door on shutdown");
        }
        info!(door = %self.name, "door loop stopped");
    }

    fn enter(&mut self, next: LoopState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "invalid loop transition {} -> {}",
            self.state,
            next
        );
        trace!(door = %self.name, from = %self.state, to = %next, "loop state");
        self.state = next;
    }

    fn link_backoff(&self) -> Duration {
        self.timings
            .receive_timeout
            .saturating_mul(self.link_failures)
            .min(Duration::from_millis(MAX_LINK_RETRY_BACKOFF_MS))
            .max(Duration::from_millis(RECEIVE_POLL_INTERVAL_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxgate_hardware::{MockLink, MockLinkHandle};
    use proxgate_storage::{DoorSnapshot, MemoryDirectory};
    use tracing::Span;

    fn assert_send<T: Send>(_: &T) {}

    // Compile-time check: the loop over a serial link must stay spawnable.
    #[allow(dead_code)]
    fn run_is_send(controller: DoorController) {
        assert_send(&controller.run());
    }

    fn controller() -> (DoorController, MockLinkHandle, CancellationToken) {
        let (link, board) = MockLink::new();
        let directory = MemoryDirectory::new();
        directory.insert_door("front", DoorSnapshot::default());
        let cache = AuthorizationCache::new("front", directory, None, Span::none());
        let cancel = CancellationToken::new();
        let controller =
            DoorController::new("front", link, cache, DoorTimings::default(), cancel.clone());
        (controller, board, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_relocks_on_cancel() {
        let (controller, board, cancel) = controller();
        let task = tokio::spawn(controller.run());

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
        task.await.unwrap();

        let sent = board.sent();
        assert_eq!(
            sent.last().map(|frame| frame.as_ref()),
            Some(&b"G0\nB0\nS0\n??\n"[..])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_denial_pause_stops_on_cancel() {
        let (mut controller, board, cancel) = controller();
        board.present_card(CardIdentity::new(99, 1)).await.unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        assert_eq!(controller.step().await, Step::Stop);
        assert!(started.elapsed() < controller.timings.denial_delay);
        assert_eq!(controller.state(), LoopState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_failures_back_off_then_recover() {
        let (mut controller, board, _cancel) = controller();
        board.fail_reads(true);

        let started = Instant::now();
        assert_eq!(controller.step().await, Step::Continue);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(controller.step().await, Step::Continue);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(controller.link_failures, 2);

        board.fail_reads(false);
        board.present_card(CardIdentity::new(99, 1)).await.unwrap();
        assert_eq!(controller.step().await, Step::Continue);
        assert_eq!(controller.link_failures, 0);
        assert_eq!(board.sent_text(), "B2\n");
    }

    #[test]
    fn test_link_backoff_is_capped() {
        let (mut controller, _board, _cancel) = controller();
        controller.link_failures = 1;
        assert_eq!(controller.link_backoff(), Duration::from_secs(1));
        controller.link_failures = 1_000;
        assert_eq!(
            controller.link_backoff(),
            Duration::from_millis(MAX_LINK_RETRY_BACKOFF_MS)
        );
    }
}
