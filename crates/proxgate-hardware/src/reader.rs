//! Card reader protocol on top of a [`DeviceLink`].
//!
//! The read side turns inbound lines into card identities. The write side
//! exposes the actuation primitives of the board (strike, LED, beeper) as
//! fixed command sequences.
//!
//! Every method takes `&mut self`, so reads and commands on one reader are
//! serialized by construction. Timed holds and beep pacing stop early when
//! the reader's cancellation token fires; an interrupted hold still relocks
//! the door.

use crate::error::{ProtocolError, Result};
use crate::traits::DeviceLink;
use proxgate_core::CardIdentity;
use proxgate_core::constants::{LINE_FEED, MAX_FRAME_LEN};
use proxgate_protocol::{Command, InboundFrame, encode_commands, wiegand};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const UNLOCK: [Command; 2] = [Command::Strike(true), Command::Led(true)];
const LOCK: [Command; 2] = [Command::Strike(false), Command::Led(false)];
const NOTIFY_PATTERN: [bool; 4] = [true, false, true, false];

/// Reader protocol for one door-controller board.
#[derive(Debug)]
pub struct CardReader<L> {
    link: L,
    beep_pacing: Duration,
    cancel: CancellationToken,
    buf: Vec<u8>,
}

impl<L: DeviceLink> CardReader<L> {
    /// Wrap `link`. `beep_pacing` separates the steps of
    /// [`notify_beep`](Self::notify_beep); `cancel` interrupts holds.
    pub fn new(link: L, beep_pacing: Duration, cancel: CancellationToken) -> Self {
        Self {
            link,
            beep_pacing,
            cancel,
            buf: vec![0; MAX_FRAME_LEN],
        }
    }

    /// Wait up to the link's receive timeout for one line.
    ///
    /// Returns `Ok(None)` on silence, status frames and unrecognized lines.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Link`] on a transport failure,
    /// [`ProtocolError::Decode`] on a malformed card frame.
    pub async fn read(&mut self) -> std::result::Result<Option<CardIdentity>, ProtocolError> {
        let read = self.link.receive_until(&mut self.buf, LINE_FEED).await?;
        if read == 0 {
            return Ok(None);
        }

        match InboundFrame::classify(&self.buf[..read]) {
            InboundFrame::CardRead(line) => Ok(Some(wiegand::decode(line)?)),
            InboundFrame::Status(line) => {
                trace!(status = %String::from_utf8_lossy(line).trim_end(), "status frame");
                Ok(None)
            }
            InboundFrame::Unrecognized(line) => {
                debug!(len = line.len(), first = line[0], "ignoring unrecognized frame");
                Ok(None)
            }
        }
    }

    /// Sound the error beep (`B2`).
    pub async fn error_beep(&mut self) -> Result<()> {
        self.send(&[Command::ErrorBeep]).await
    }

    /// Two short beeps: `BL`, `B0`, `BL`, `B0`, paced by the beep pacing.
    ///
    /// Cancellation truncates the pattern without error.
    pub async fn notify_beep(&mut self) -> Result<()> {
        for (step, on) in NOTIFY_PATTERN.into_iter().enumerate() {
            if step > 0 && !pause(&self.cancel, self.beep_pacing).await {
                debug!("notify beep interrupted");
                return Ok(());
            }
            self.send(&[Command::Beep(on)]).await?;
        }
        Ok(())
    }

    /// Unlock the strike with the LED on, hold for `hold`, then lock again.
    ///
    /// The lock command is sent even if the hold is interrupted or the unlock
    /// command failed.
    pub async fn open_door(&mut self, hold: Duration) -> Result<()> {
        let unlocked = self.send(&UNLOCK).await;
        if unlocked.is_ok() && !pause(&self.cancel, hold).await {
            debug!("door hold interrupted, relocking");
        }
        let locked = self.send(&LOCK).await;
        unlocked.and(locked)
    }

    /// Drive LED and strike to the same state, silence the beeper and poll
    /// the board status, all in one frame.
    pub async fn set_door_latches(&mut self, unlocked: bool) -> Result<()> {
        self.send(&[
            Command::Led(unlocked),
            Command::Beep(false),
            Command::Strike(unlocked),
            Command::StatusPoll,
        ])
        .await
    }

    /// Drop any buffered input. Returns the number of bytes discarded.
    pub fn flush(&mut self) -> Result<usize> {
        self.link.flush()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    async fn send(&mut self, commands: &[Command]) -> Result<()> {
        self.link.send(&encode_commands(commands)).await.map(|_| ())
    }
}

/// Sleep for `duration`; `false` if `cancel` fired first.
///
/// Borrows only the token: readers over a [`SerialLink`](crate::SerialLink)
/// are `Send` but not `Sync`, and the door loop future must stay `Send`.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
