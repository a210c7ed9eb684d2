//! Serial-port backed [`DeviceLink`].
//!
//! The board talks 8N1 without flow control. A port that fails is closed
//! and reopened on the next use, so an unplugged adapter comes back without
//! restarting the door.

use crate::error::{LinkError, Result};
use crate::traits::{DeviceLink, RECEIVE_POLL_INTERVAL};
use proxgate_core::constants::{DEFAULT_BAUD_RATE, DEFAULT_RECEIVE_TIMEOUT_MS};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Settings used to open a [`SerialLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub port: String,

    /// Line speed.
    pub baud_rate: u32,

    /// Receive window for one [`DeviceLink::receive_until`] call.
    pub receive_timeout: Duration,
}

impl SerialConfig {
    /// Create a configuration for `port` with the board defaults.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            receive_timeout: Duration::from_millis(DEFAULT_RECEIVE_TIMEOUT_MS),
        }
    }

    /// Set the line speed.
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the receive window.
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }
}

/// A serial line to a door-controller board.
///
/// The port may be closed: a link made with [`SerialLink::detached`], or one
/// whose port failed, reopens it on the next send or read. Until then every
/// operation returns the open error.
pub struct SerialLink {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    /// Open the port described by `config`.
    ///
    /// # Errors
    ///
    /// - [`LinkError::PortNotFound`] if the device does not exist (the
    ///   available ports are logged).
    /// - [`LinkError::PortBusy`] if another process holds it.
    /// - [`LinkError::UnsupportedParameter`] if the line settings are refused.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = open_port(config).inspect_err(|e| {
            if matches!(e, LinkError::PortNotFound { .. }) {
                log_available_ports();
            }
        })?;

        info!(port = %config.port, baud_rate = config.baud_rate, "serial port opened");
        Ok(Self {
            config: config.clone(),
            port: Some(port),
        })
    }

    /// A link for `config` whose port is opened on first use.
    pub fn detached(config: &SerialConfig) -> Self {
        Self {
            config: config.clone(),
            port: None,
        }
    }

    /// Open `config`, falling back to a [`detached`](Self::detached) link
    /// when the failure is [retryable](LinkError::is_retryable).
    ///
    /// # Errors
    ///
    /// Returns the open error when retrying cannot help (missing port,
    /// refused line settings, permissions).
    pub fn open_or_detach(config: &SerialConfig) -> Result<Self> {
        match Self::open(config) {
            Ok(link) => Ok(link),
            Err(e) if e.is_retryable() => {
                warn!(port = %config.port, error = %e, "serial port unavailable, will retry");
                Ok(Self::detached(config))
            }
            Err(e) => Err(e),
        }
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn take_port(&mut self) -> Result<Box<dyn SerialPort>> {
        match self.port.take() {
            Some(port) => Ok(port),
            None => {
                let port = open_port(&self.config)?;
                info!(port = %self.config.port, "serial port reopened");
                Ok(port)
            }
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        let port = self.take_port()?;
        Ok(self.port.insert(port))
    }

    fn close(&mut self, error: &dyn fmt::Display) {
        if self.port.take().is_some() {
            warn!(port = %self.config.port, %error, "serial port closed after error");
        }
    }
}

fn open_port(config: &SerialConfig) -> Result<Box<dyn SerialPort>> {
    serialport::new(&config.port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .flow_control(FlowControl::None)
        .timeout(RECEIVE_POLL_INTERVAL)
        .open()
        .map_err(|e| LinkError::from_serial(&config.port, e))
}

fn log_available_ports() {
    match serialport::available_ports() {
        Ok(ports) if ports.is_empty() => warn!("no serial ports available"),
        Ok(ports) => {
            for port in ports {
                warn!(port = %port.port_name, "available serial port");
            }
        }
        Err(e) => warn!(error = %e, "unable to enumerate serial ports"),
    }
}

impl fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLink")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl DeviceLink for SerialLink {
    fn name(&self) -> &str {
        &self.config.port
    }

    /// Writes and drains on the blocking pool; a frame takes about a
    /// millisecond per byte at 9600 baud.
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Err(LinkError::EmptyWrite);
        }

        let mut port = self.take_port()?;
        let frame = data.to_vec();
        let written = tokio::task::spawn_blocking(move || {
            let result = port.write_all(&frame).and_then(|()| port.flush());
            (port, result)
        })
        .await;

        match written {
            Ok((port, Ok(()))) => {
                self.port = Some(port);
                Ok(data.len())
            }
            Ok((_, Err(e))) => {
                warn!(port = %self.config.port, error = %e, "serial port closed after error");
                Err(e.into())
            }
            Err(e) => {
                warn!(port = %self.config.port, error = %e, "serial write task failed");
                Err(LinkError::disconnected(&self.config.port))
            }
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let name = self.config.port.clone();
        let port = self.port_mut()?;
        let pending = match port.bytes_to_read() {
            Ok(pending) => pending as usize,
            Err(e) => {
                let error = LinkError::from_serial(&name, e);
                self.close(&error);
                return Err(error);
            }
        };
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }

        let len = pending.min(buf.len());
        match port.read(&mut buf[..len]) {
            Ok(read) => Ok(read),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                self.close(&e);
                Err(e.into())
            }
        }
    }

    fn receive_timeout(&self) -> Duration {
        self.config.receive_timeout
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        if timeout != self.config.receive_timeout {
            debug!(port = %self.config.port, ?timeout, "receive timeout changed");
            self.config.receive_timeout = timeout;
        }
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        if baud_rate == self.config.baud_rate {
            return Ok(());
        }
        if let Some(port) = self.port.as_mut() {
            port.set_baud_rate(baud_rate)
                .map_err(|e| LinkError::from_serial(&self.config.port, e))?;
        }
        debug!(port = %self.config.port, baud_rate, "baud rate changed");
        self.config.baud_rate = baud_rate;
        Ok(())
    }
}
