//! Wire protocol of the door-controller board.
//!
//! The board sits between a proximity-card reader and a door strike. It
//! reports card reads as framed Wiegand-26 payloads and accepts two-letter
//! ASCII commands that drive the strike, the LED and the beeper.
//!
//! - [`wiegand`] decodes (and, for simulators, encodes) card-read frames.
//! - [`command`] is the outbound command vocabulary.
//! - [`frame`] classifies inbound lines by their type byte.
//!
//! Nothing in this crate performs I/O; the transport lives in
//! `proxgate-hardware`.

pub mod command;
pub mod frame;
pub mod wiegand;

pub use command::{Command, encode_commands};
pub use frame::InboundFrame;
pub use wiegand::{DecodeError, Sentinel, decode, encode};
