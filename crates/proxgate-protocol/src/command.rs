//! Outbound commands understood by the door-controller board.
//!
//! Every command is two ASCII characters followed by a line feed. The second
//! character is `L` for "on/unlocked" and `0` for "off/locked", except for
//! the error beep (`B2`) and the status poll (`??`).

use bytes::{BufMut, Bytes, BytesMut};
use proxgate_core::constants::LINE_FEED;

/// A single board command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Sound the error beep pattern (`B2`).
    ErrorBeep,
    /// Beeper on (`BL`) or off (`B0`).
    Beep(bool),
    /// Strike unlocked (`SL`) or locked (`S0`).
    Strike(bool),
    /// Green LED on (`GL`) or off (`G0`).
    Led(bool),
    /// Ask the board for its status (`??`).
    StatusPoll,
}

impl Command {
    /// The two command characters, without the terminator.
    #[must_use]
    pub const fn mnemonic(self) -> [u8; 2] {
        match self {
            Command::ErrorBeep => *b"B2",
            Command::Beep(on) => [b'B', level(on)],
            Command::Strike(unlocked) => [b'S', level(unlocked)],
            Command::Led(on) => [b'G', level(on)],
            Command::StatusPoll => *b"??",
        }
    }
}

const fn level(on: bool) -> u8 {
    if on { b'L' } else { b'0' }
}

/// Concatenate commands into one buffer, each terminated by a line feed.
///
/// # Examples
///
/// ```
/// use proxgate_protocol::{Command, encode_commands};
///
/// let frame = encode_commands(&[Command::Strike(true), Command::Led(true)]);
/// assert_eq!(&frame[..], b"SL\nGL\n");
/// ```
#[must_use]
pub fn encode_commands(commands: &[Command]) -> Bytes {
    let mut buf = BytesMut::with_capacity(commands.len() * 3);
    for command in commands {
        buf.put_slice(&command.mnemonic());
        buf.put_u8(LINE_FEED);
    }
    buf.freeze()
}
