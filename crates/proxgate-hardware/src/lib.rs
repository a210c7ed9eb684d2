//! Serial transport and reader protocol for door-controller boards.
//!
//! This crate owns everything that touches the wire:
//!
//! - [`DeviceLink`] - a framed byte transport with a timed
//!   receive-until-terminator, implemented by [`SerialLink`] (a real serial
//!   line) and [`MockLink`] (an in-process stand-in driven by a
//!   [`MockLinkHandle`]).
//! - [`AnyDeviceLink`] - enum dispatch over the link implementations.
//! - [`CardReader`] - the board protocol: card reads in, strike/LED/beeper
//!   commands out.
//!
//! # Example
//!
//! ```no_run
//! use proxgate_hardware::{CardReader, SerialConfig, SerialLink};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let link = SerialLink::open(&SerialConfig::new("/dev/ttyUSB0"))?;
//! let mut reader = CardReader::new(link, Duration::from_millis(500), CancellationToken::new());
//!
//! if let Some(card) = reader.read().await? {
//!     println!("card {card}");
//!     reader.open_door(Duration::from_secs(4)).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Link operations return [`LinkError`]; open failures are split into
//! not-found, busy, permission and unsupported-parameter kinds.
//! [`CardReader::read`] wraps link and decode failures in [`ProtocolError`].

pub mod devices;
pub mod error;
pub mod mock;
pub mod reader;
pub mod serial;
pub mod traits;

pub use devices::AnyDeviceLink;
pub use error::{LinkError, ProtocolError, Result};
pub use mock::{MockLink, MockLinkHandle};
pub use reader::CardReader;
pub use serial::{SerialConfig, SerialLink};
pub use traits::DeviceLink;
