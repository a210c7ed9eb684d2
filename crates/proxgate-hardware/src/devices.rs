//! Enum wrapper for device link dispatch.
//!
//! Native `async fn` in traits is not object-safe, so doors hold an
//! [`AnyDeviceLink`] instead of a `Box<dyn DeviceLink>`. Dispatch is resolved
//! at compile time and the wrapped futures stay `Send`, which lets a door's
//! control loop be spawned onto the runtime.
//!
//! # Examples
//!
//! ```
//! use proxgate_hardware::devices::AnyDeviceLink;
//! use proxgate_hardware::mock::MockLink;
//! use proxgate_hardware::traits::DeviceLink;
//!
//! let (link, _handle) = MockLink::with_name("front");
//! let link = AnyDeviceLink::Mock(link);
//! assert_eq!(link.name(), "front");
//! ```

use crate::Result;
use crate::mock::MockLink;
use crate::serial::SerialLink;
use crate::traits::DeviceLink;
use std::time::Duration;

/// Any supported device link.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyDeviceLink {
    /// Physical serial line.
    Serial(SerialLink),
    /// Mock link for development and testing.
    Mock(MockLink),
}

impl From<SerialLink> for AnyDeviceLink {
    fn from(link: SerialLink) -> Self {
        Self::Serial(link)
    }
}

impl From<MockLink> for AnyDeviceLink {
    fn from(link: MockLink) -> Self {
        Self::Mock(link)
    }
}

impl DeviceLink for AnyDeviceLink {
    fn name(&self) -> &str {
        match self {
            Self::Serial(link) => link.name(),
            Self::Mock(link) => link.name(),
        }
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        match self {
            Self::Serial(link) => link.send(data).await,
            Self::Mock(link) => link.send(data).await,
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::Serial(link) => link.read_available(buf),
            Self::Mock(link) => link.read_available(buf),
        }
    }

    fn receive_timeout(&self) -> Duration {
        match self {
            Self::Serial(link) => link.receive_timeout(),
            Self::Mock(link) => link.receive_timeout(),
        }
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        match self {
            Self::Serial(link) => link.set_receive_timeout(timeout),
            Self::Mock(link) => link.set_receive_timeout(timeout),
        }
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        match self {
            Self::Serial(link) => link.set_baud_rate(baud_rate),
            Self::Mock(link) => link.set_baud_rate(baud_rate),
        }
    }
}
