//! End-to-end door scenarios against a mock board.
//!
//! Each test starts a real door (controller loop and refresher) on paused
//! time, talks to it through the board side of a [`MockLink`] and watches
//! the decisions it publishes.
//!
//! Run with: cargo test --package proxgate-door --test door_scenarios

use proxgate_core::{AuthorizedCard, CardIdentity, CardKey, DecisionEvent, DecisionSource};
use proxgate_door::{
    DecisionObserver, Door, DoorHandle, DoorOptions, DoorSupervisor, ObserverError,
};
use proxgate_hardware::{MockLink, MockLinkHandle};
use proxgate_storage::{DoorSnapshot, MemoryDirectory};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const UNLOCK: &[u8] = b"SL\nGL\n";
const LOCK: &[u8] = b"S0\nG0\n";
const ERROR_BEEP: &[u8] = b"B2\n";
const WAIT: Duration = Duration::from_secs(30);

struct Recorder {
    tx: mpsc::UnboundedSender<DecisionEvent>,
}

impl DecisionObserver for Recorder {
    fn on_decision(&self, event: &DecisionEvent) -> Result<(), ObserverError> {
        self.tx
            .send(event.clone())
            .map_err(|_| ObserverError::Permanent("test finished".into()))
    }
}

struct Harness {
    supervisor: DoorSupervisor,
    door: DoorHandle,
    board: MockLinkHandle,
    directory: MemoryDirectory,
    events: mpsc::UnboundedReceiver<DecisionEvent>,
}

impl Harness {
    async fn start(directory: MemoryDirectory) -> Self {
        Self::start_with(directory, DoorOptions::default()).await
    }

    async fn start_with(directory: MemoryDirectory, options: DoorOptions) -> Self {
        let (link, board) = MockLink::with_name("/dev/ttyUSB0");
        let mut supervisor = DoorSupervisor::new();
        let door = Door::new(
            "front",
            link,
            directory.clone(),
            &options,
            supervisor.cancellation_token(),
        );

        let (tx, events) = mpsc::unbounded_channel();
        door.handle().subscribe(Arc::new(Recorder { tx }));
        let door = supervisor.add_door(door).await.unwrap();

        Self {
            supervisor,
            door,
            board,
            directory,
            events,
        }
    }

    async fn next_event(&mut self) -> DecisionEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("no decision published")
            .expect("dispatcher dropped")
    }

    fn count_frames(&self, frame: &[u8]) -> usize {
        self.board
            .sent()
            .iter()
            .filter(|sent| sent.as_ref() == frame)
            .count()
    }
}

fn ada() -> (CardIdentity, AuthorizedCard) {
    (
        CardIdentity::new(40, 12345),
        AuthorizedCard::new("Ada Lovelace", "ada"),
    )
}

fn directory_with(cards: &[(CardIdentity, AuthorizedCard)]) -> MemoryDirectory {
    let directory = MemoryDirectory::new();
    directory.insert_door("front", DoorSnapshot::default());
    for (identity, card) in cards {
        directory.insert_card("front", identity.key(), card.clone());
    }
    directory
}

#[tokio::test(start_paused = true)]
async fn test_authorized_card_cycles_strike_once() {
    let (identity, card) = ada();
    let mut harness = Harness::start(directory_with(&[(identity, card)])).await;

    harness.board.present_card(identity).await.unwrap();
    let event = harness.next_event().await;

    assert!(event.allowed);
    assert!(!event.unknown);
    assert_eq!(event.card_id.as_str(), "40-12345");
    assert_eq!(event.real_name(), "Ada Lovelace");
    assert_eq!(event.door_name, "front");
    assert_eq!(harness.count_frames(UNLOCK), 1);
    assert_eq!(harness.count_frames(LOCK), 1);
    assert_eq!(harness.count_frames(ERROR_BEEP), 0);

    assert!(harness.supervisor.shutdown(WAIT).await.is_clean());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_card_beeps_without_opening() {
    let mut harness = Harness::start(directory_with(&[ada()])).await;

    harness.board.present_card(CardIdentity::new(99, 1)).await.unwrap();
    let event = harness.next_event().await;

    assert!(!event.allowed);
    assert!(event.unknown);
    assert_eq!(event.real_name(), "Unknown");
    assert_eq!(harness.count_frames(ERROR_BEEP), 1);
    assert_eq!(harness.count_frames(UNLOCK), 0);

    harness.supervisor.shutdown(WAIT).await;
}

#[tokio::test(start_paused = true)]
async fn test_remote_trigger_opens_once() {
    let mut harness = Harness::start(directory_with(&[])).await;

    harness.door.trigger_open();
    harness.door.trigger_open();
    let event = harness.next_event().await;
    assert_eq!(event.source, DecisionSource::RemoteTrigger);
    assert_eq!(event.card_id, CardKey::remote());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.count_frames(UNLOCK), 1);
    assert!(harness.events.try_recv().is_err());

    harness.supervisor.shutdown(WAIT).await;
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_routes_trigger_by_name() {
    let mut harness = Harness::start(directory_with(&[])).await;

    assert!(harness.supervisor.trigger_open("back").is_err());
    harness.supervisor.trigger_open("front").unwrap();
    let event = harness.next_event().await;
    assert_eq!(event.source, DecisionSource::RemoteTrigger);

    harness.supervisor.shutdown(WAIT).await;
}

#[tokio::test(start_paused = true)]
async fn test_magic_card_toggles_forced_unlock() {
    let magic = CardIdentity::new(1, 1);
    let card = AuthorizedCard::new("Root", "root").with_magic(true);
    let mut harness = Harness::start(directory_with(&[(magic, card)])).await;

    harness.board.present_card(magic).await.unwrap();
    let event = harness.next_event().await;

    assert!(event.allowed);
    assert!(event.is_magic());
    assert!(harness.door.cache().force_unlocked());
    assert_eq!(harness.directory.default_unlocked("front"), Some(true));
    assert_eq!(harness.count_frames(UNLOCK), 0);
    assert_eq!(harness.count_frames(b"BL\n"), 2);

    // The next latch sync holds the door open.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(harness.count_frames(b"GL\nB0\nSL\n??\n") >= 1);

    harness.board.present_card(magic).await.unwrap();
    harness.next_event().await;
    assert!(!harness.door.cache().force_unlocked());
    assert_eq!(harness.directory.default_unlocked("front"), Some(false));

    harness.supervisor.shutdown(WAIT).await;
}

#[tokio::test(start_paused = true)]
async fn test_forced_unlocked_door_skips_strike_cycle() {
    let (identity, card) = ada();
    let mut snapshot = DoorSnapshot {
        default_unlocked: true,
        ..DoorSnapshot::default()
    };
    snapshot.cards.insert(identity.key(), card);
    let directory = MemoryDirectory::new();
    directory.insert_door("front", snapshot);
    let mut harness = Harness::start(directory).await;
    assert!(harness.door.cache().force_unlocked());

    harness.board.present_card(identity).await.unwrap();
    let event = harness.next_event().await;

    assert!(event.allowed);
    assert_eq!(harness.count_frames(UNLOCK), 0);

    harness.supervisor.shutdown(WAIT).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_toggle_is_refused() {
    let magic = CardIdentity::new(1, 1);
    let card = AuthorizedCard::new("Root", "root").with_magic(true);
    let mut harness = Harness::start(directory_with(&[(magic, card)])).await;
    harness.directory.set_unavailable(true);

    harness.board.present_card(magic).await.unwrap();
    let event = harness.next_event().await;

    assert!(!event.allowed);
    assert!(!event.unknown);
    assert!(!harness.door.cache().force_unlocked());
    assert_eq!(harness.count_frames(ERROR_BEEP), 1);

    harness.supervisor.shutdown(WAIT).await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_is_skipped() {
    let (identity, card) = ada();
    let mut harness = Harness::start(directory_with(&[(identity, card)])).await;

    harness.board.inject(&b"H\x0B1234\x0F\n"[..]).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(harness.events.try_recv().is_err());

    harness.board.present_card(identity).await.unwrap();
    assert!(harness.next_event().await.allowed);

    harness.supervisor.shutdown(WAIT).await;
}

#[tokio::test(start_paused = true)]
async fn test_refresh_picks_up_new_cards() {
    let options = DoorOptions {
        refresh_interval: Duration::from_secs(10),
        ..DoorOptions::default()
    };
    let mut harness = Harness::start_with(directory_with(&[]), options).await;

    let (identity, card) = ada();
    harness.board.present_card(identity).await.unwrap();
    assert!(!harness.next_event().await.allowed);

    harness.directory.insert_card("front", identity.key(), card);
    tokio::time::sleep(Duration::from_secs(11)).await;

    harness.board.present_card(identity).await.unwrap();
    assert!(harness.next_event().await.allowed);

    harness.supervisor.shutdown(WAIT).await;
}

#[tokio::test(start_paused = true)]
async fn test_initial_load_failure_starts_locked() {
    let (identity, card) = ada();
    let directory = directory_with(&[(identity, card)]);
    directory.set_unavailable(true);
    let mut harness = Harness::start(directory).await;

    harness.board.present_card(identity).await.unwrap();
    assert!(harness.next_event().await.unknown);

    harness.supervisor.shutdown(WAIT).await;
}

#[tokio::test(start_paused = true)]
async fn test_permanently_failing_observer_is_removed() {
    struct Broken(AtomicUsize);

    impl DecisionObserver for Broken {
        fn on_decision(&self, _event: &DecisionEvent) -> Result<(), ObserverError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(ObserverError::Permanent("sink closed".into()))
        }
    }

    let mut harness = Harness::start(directory_with(&[ada()])).await;
    let broken = Arc::new(Broken(AtomicUsize::new(0)));
    harness.door.subscribe(broken.clone());

    harness.door.trigger_open();
    harness.next_event().await;
    harness.door.trigger_open();
    harness.next_event().await;

    assert_eq!(broken.0.load(Ordering::SeqCst), 1);

    harness.supervisor.shutdown(WAIT).await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_hold_and_relocks() {
    let (identity, card) = ada();
    let harness = Harness::start(directory_with(&[(identity, card)])).await;

    harness.board.present_card(identity).await.unwrap();
    timeout(WAIT, async {
        while harness.count_frames(UNLOCK) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let started = tokio::time::Instant::now();
    let board = harness.board.clone();
    let report = harness.supervisor.shutdown(WAIT).await;

    assert!(report.is_clean());
    assert_eq!(report.completed, 2);
    assert!(started.elapsed() < Duration::from_secs(1));

    let sent = board.sent();
    let last_two: Vec<&[u8]> = sent.iter().rev().take(2).map(|frame| frame.as_ref()).collect();
    assert_eq!(last_two, vec![&b"G0\nB0\nS0\n??\n"[..], LOCK]);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_supervisor_still_relocks() {
    let directory = MemoryDirectory::new();
    directory.insert_door(
        "front",
        DoorSnapshot {
            default_unlocked: true,
            ..DoorSnapshot::default()
        },
    );
    let harness = Harness::start(directory).await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(harness.count_frames(b"GL\nB0\nSL\n??\n"), 1);

    let board = harness.board.clone();
    drop(harness);
    tokio::time::sleep(Duration::from_secs(10)).await;

    let sent = board.sent();
    assert_eq!(
        sent.last().map(|frame| frame.as_ref()),
        Some(&b"G0\nB0\nS0\n??\n"[..])
    );
}
