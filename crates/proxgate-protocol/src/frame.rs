//! Classification of inbound lines.

use proxgate_core::constants::{FRAME_CARD, FRAME_STATUS};

/// An inbound line, classified by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundFrame<'a> {
    /// `H...`: a card read, to be handed to [`crate::wiegand::decode`].
    CardRead(&'a [u8]),
    /// `?...`: status or heartbeat.
    Status(&'a [u8]),
    /// Anything else, including input-status lines and noise.
    Unrecognized(&'a [u8]),
}

impl<'a> InboundFrame<'a> {
    /// Classify a received line.
    ///
    /// # Examples
    ///
    /// ```
    /// use proxgate_protocol::InboundFrame;
    ///
    /// assert!(matches!(InboundFrame::classify(b"?ABC\n"), InboundFrame::Status(_)));
    /// assert!(matches!(InboundFrame::classify(b"i01\n"), InboundFrame::Unrecognized(_)));
    /// ```
    #[must_use]
    pub fn classify(line: &'a [u8]) -> Self {
        match line.first() {
            Some(&FRAME_CARD) => InboundFrame::CardRead(line),
            Some(&FRAME_STATUS) => InboundFrame::Status(line),
            _ => InboundFrame::Unrecognized(line),
        }
    }
}
