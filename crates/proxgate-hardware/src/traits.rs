//! Device link trait definition.
//!
//! A [`DeviceLink`] is a framed duplex byte transport to one door-controller
//! board. Implementations only have to move bytes; the timed
//! receive-until-terminator loop and the desync flush are provided on top of
//! [`DeviceLink::read_available`].
//!
//! All async methods are native `async fn` (Edition 2024 RPITIT), so the
//! trait is used through generics or the [`AnyDeviceLink`] enum rather than
//! `dyn`.
//!
//! [`AnyDeviceLink`]: crate::devices::AnyDeviceLink

#![allow(async_fn_in_trait)]

use crate::error::Result;
use proxgate_core::constants::RECEIVE_POLL_INTERVAL_MS;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Interval between two polls of the input while waiting for a terminator.
pub const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(RECEIVE_POLL_INTERVAL_MS);

/// Byte transport to a door-controller board.
pub trait DeviceLink: Send {
    /// Name of the underlying port, for logging.
    fn name(&self) -> &str;

    /// Write all of `data` to the device.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::EmptyWrite`](crate::LinkError::EmptyWrite) for an
    /// empty buffer, or a transport error if the write fails.
    async fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Copy bytes that have already arrived into `buf` without waiting.
    ///
    /// Returns `0` when nothing is pending.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// How long [`receive_until`](DeviceLink::receive_until) waits.
    fn receive_timeout(&self) -> Duration;

    /// Change the receive window. An unchanged value is ignored.
    fn set_receive_timeout(&mut self, timeout: Duration);

    /// Change the line speed. An unchanged value is ignored.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Accumulate input into `buf` until the last byte received is
    /// `terminator`, `buf` is full, or the receive timeout elapses.
    ///
    /// Returns the number of bytes read; `0` means the window passed in
    /// silence, which is not an error.
    async fn receive_until(&mut self, buf: &mut [u8], terminator: u8) -> Result<usize> {
        let deadline = Instant::now() + self.receive_timeout();
        let mut count = 0;

        while count < buf.len() {
            let read = self.read_available(&mut buf[count..])?;
            if read > 0 {
                count += read;
                if buf[count - 1] == terminator {
                    return Ok(count);
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            if read == 0 {
                tokio::time::sleep(RECEIVE_POLL_INTERVAL).await;
            }
        }

        Ok(count)
    }

    /// Discard everything already received. Returns the number of bytes
    /// dropped.
    fn flush(&mut self) -> Result<usize> {
        let mut scratch = [0u8; 64];
        let mut discarded = 0;

        loop {
            let read = self.read_available(&mut scratch)?;
            if read == 0 {
                break;
            }
            for byte in &scratch[..read] {
                trace!(port = self.name(), byte = *byte, "discarding byte");
            }
            discarded += read;
        }

        Ok(discarded)
    }
}
