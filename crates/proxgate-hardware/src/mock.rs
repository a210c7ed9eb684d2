//! Mock device link for testing and development.
//!
//! [`MockLink`] stands in for a serial line to a door-controller board. The
//! paired [`MockLinkHandle`] plays the board: it injects inbound lines (card
//! reads, status frames, noise) and records every command the link sent.

use crate::error::{LinkError, Result};
use crate::traits::DeviceLink;
use bytes::{Buf, Bytes, BytesMut};
use proxgate_core::CardIdentity;
use proxgate_core::constants::{DEFAULT_BAUD_RATE, DEFAULT_RECEIVE_TIMEOUT_MS};
use proxgate_protocol::wiegand;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Mock serial link.
///
/// # Examples
///
/// ```
/// use proxgate_core::CardIdentity;
/// use proxgate_hardware::mock::MockLink;
/// use proxgate_hardware::traits::DeviceLink;
///
/// #[tokio::main]
/// async fn main() -> proxgate_hardware::Result<()> {
///     let (mut link, handle) = MockLink::new();
///
///     handle.present_card(CardIdentity::new(40, 12345)).await?;
///
///     let mut buf = [0u8; 64];
///     let read = link.receive_until(&mut buf, b'\n').await?;
///     assert_eq!(buf[0], b'H');
///     assert_eq!(buf[read - 1], b'\n');
///
///     link.send(b"B2\n").await?;
///     assert_eq!(handle.sent_text(), "B2\n");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockLink {
    name: String,
    inbound_rx: mpsc::Receiver<Bytes>,
    pending: BytesMut,
    shared: Arc<Shared>,
    baud_rate: u32,
    receive_timeout: Duration,
}

#[derive(Debug, Default)]
struct Shared {
    sent: Mutex<Vec<Bytes>>,
    fail_sends: AtomicBool,
    fail_reads: AtomicBool,
}

impl MockLink {
    /// Create a mock link named `"mock"`.
    pub fn new() -> (Self, MockLinkHandle) {
        Self::with_name("mock")
    }

    /// Create a mock link with a custom port name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockLinkHandle) {
        let name = name.into();
        let (inbound_tx, inbound_rx) = mpsc::channel(32);
        let shared = Arc::new(Shared::default());

        let link = Self {
            name: name.clone(),
            inbound_rx,
            pending: BytesMut::new(),
            shared: Arc::clone(&shared),
            baud_rate: DEFAULT_BAUD_RATE,
            receive_timeout: Duration::from_millis(DEFAULT_RECEIVE_TIMEOUT_MS),
        };

        let handle = MockLinkHandle {
            name,
            inbound_tx,
            shared,
        };

        (link, handle)
    }

    /// Current line speed.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl DeviceLink for MockLink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Err(LinkError::EmptyWrite);
        }
        if self.shared.fail_sends.load(Ordering::Acquire) {
            return Err(LinkError::disconnected(&self.name));
        }
        self.shared
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Bytes::copy_from_slice(data));
        Ok(data.len())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.shared.fail_reads.load(Ordering::Acquire) {
            return Err(LinkError::disconnected(&self.name));
        }
        loop {
            match self.inbound_rx.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                // A dropped handle is a silent board, not a failure.
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        let len = self.pending.len().min(buf.len());
        buf[..len].copy_from_slice(&self.pending[..len]);
        self.pending.advance(len);
        Ok(len)
    }

    fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.receive_timeout = timeout;
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.baud_rate = baud_rate;
        Ok(())
    }
}

/// Handle for driving a [`MockLink`] from a test or simulator.
#[derive(Debug, Clone)]
pub struct MockLinkHandle {
    name: String,
    inbound_tx: mpsc::Sender<Bytes>,
    shared: Arc<Shared>,
}

impl MockLinkHandle {
    /// Queue raw bytes as if the board had sent them.
    ///
    /// # Errors
    ///
    /// Returns an error if the link has been dropped.
    pub async fn inject(&self, bytes: impl Into<Bytes>) -> Result<()> {
        self.inbound_tx
            .send(bytes.into())
            .await
            .map_err(|_| LinkError::disconnected(&self.name))
    }

    /// Queue the frame the board emits when `identity` is presented.
    ///
    /// # Errors
    ///
    /// Returns an error if the link has been dropped.
    pub async fn present_card(&self, identity: CardIdentity) -> Result<()> {
        self.inject(wiegand::encode(identity)).await
    }

    /// Every buffer passed to `send`, in order.
    pub fn sent(&self) -> Vec<Bytes> {
        self.shared
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Everything sent so far, concatenated as text.
    pub fn sent_text(&self) -> String {
        self.sent()
            .iter()
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect()
    }

    /// Forget everything sent so far.
    pub fn clear_sent(&self) {
        self.shared
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Make subsequent sends fail as if the device had been unplugged.
    pub fn fail_sends(&self, fail: bool) {
        self.shared.fail_sends.store(fail, Ordering::Release);
    }

    /// Make subsequent reads fail as if the device had been unplugged.
    pub fn fail_reads(&self, fail: bool) {
        self.shared.fail_reads.store(fail, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_receive_until_times_out_with_zero() {
        let (mut link, _handle) = MockLink::new();
        let mut buf = [0u8; 16];

        let started = tokio::time::Instant::now();
        let read = link.receive_until(&mut buf, b'\n').await.unwrap();

        assert_eq!(read, 0);
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_until_stops_at_terminator() {
        let (mut link, handle) = MockLink::new();
        handle.inject(&b"?ABC\n"[..]).await.unwrap();

        let mut buf = [0u8; 16];
        let read = link.receive_until(&mut buf, b'\n').await.unwrap();
        assert_eq!(&buf[..read], b"?ABC\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_until_accumulates_split_chunks() {
        let (mut link, handle) = MockLink::new();
        handle.inject(&b"?AB"[..]).await.unwrap();

        let injector = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            injector.inject(&b"C\n"[..]).await.unwrap();
        });

        let mut buf = [0u8; 16];
        let read = link.receive_until(&mut buf, b'\n').await.unwrap();
        assert_eq!(&buf[..read], b"?ABC\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_until_returns_partial_on_timeout() {
        let (mut link, handle) = MockLink::new();
        link.set_receive_timeout(Duration::from_millis(50));
        handle.inject(&b"?AB"[..]).await.unwrap();

        let mut buf = [0u8; 16];
        let read = link.receive_until(&mut buf, b'\n').await.unwrap();
        assert_eq!(&buf[..read], b"?AB");
    }

    #[tokio::test]
    async fn test_receive_until_stops_when_buffer_full() {
        let (mut link, handle) = MockLink::new();
        handle.inject(&b"0123456789\n"[..]).await.unwrap();

        let mut buf = [0u8; 4];
        let read = link.receive_until(&mut buf, b'\n').await.unwrap();
        assert_eq!(read, 4);
        assert_eq!(&buf, b"0123");
    }

    #[tokio::test]
    async fn test_flush_discards_pending() {
        let (mut link, handle) = MockLink::new();
        handle.inject(&b"garbage"[..]).await.unwrap();

        assert_eq!(link.flush().unwrap(), 7);
        assert_eq!(link.flush().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_send_rejects_empty_buffer() {
        let (mut link, _handle) = MockLink::new();
        assert!(matches!(link.send(b"").await, Err(LinkError::EmptyWrite)));
    }

    #[tokio::test]
    async fn test_send_failure_is_recorded_nowhere() {
        let (mut link, handle) = MockLink::new();
        handle.fail_sends(true);
        assert!(link.send(b"B2\n").await.is_err());
        handle.fail_sends(false);
        link.send(b"B0\n").await.unwrap();
        assert_eq!(handle.sent_text(), "B0\n");
    }

    #[tokio::test]
    async fn test_failed_reads_keep_pending_input() {
        let (mut link, handle) = MockLink::new();
        handle.inject(&b"?ABC\n"[..]).await.unwrap();
        handle.fail_reads(true);

        let mut buf = [0u8; 16];
        let error = link.receive_until(&mut buf, b'\n').await.unwrap_err();
        assert!(error.is_retryable());

        handle.fail_reads(false);
        let read = link.receive_until(&mut buf, b'\n').await.unwrap();
        assert_eq!(&buf[..read], b"?ABC\n");
    }
}
