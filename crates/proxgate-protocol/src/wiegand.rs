//! Wiegand-26 card-read codec.
//!
//! A card read arrives as one line:
//!
//! ```text
//! 'H' <0x?B> d d d d d d d d d d d d d d d d <0x?F> '\n'
//!       │    └────────── 16 octal cells ──────────┘ │
//!       start sentinel (low nibble 0xB)             end sentinel (low nibble 0xF)
//! ```
//!
//! Each cell carries one octal digit in its low nibble. The first seven
//! cells are always zero; the remaining nine hold the 26-bit Wiegand word
//! (even parity, 8-bit facility, 16-bit card number, odd parity).
//!
//! Decoding is bit-exact with the board firmware: the decoder keeps the
//! *last* occurrence of each sentinel, packs the low nibble of every cell
//! after the skipped prefix, then masks out the facility and card number.
//! Parity bits are ignored.
//!
//! # Examples
//!
//! ```
//! use proxgate_core::CardIdentity;
//! use proxgate_protocol::wiegand;
//!
//! let frame = wiegand::encode(CardIdentity::new(40, 12345));
//! let decoded = wiegand::decode(&frame).unwrap();
//! assert_eq!(decoded.key().as_str(), "40-12345");
//! ```

use proxgate_core::CardIdentity;
use proxgate_core::constants::{
    CARD_NUMBER_MASK, END_SENTINEL_NIBBLE, FACILITY_MASK, FACILITY_SHIFT, FRAME_CARD, LINE_FEED,
    PAYLOAD_CELLS, SKIPPED_CELLS, START_SENTINEL_NIBBLE,
};
use std::fmt;
use thiserror::Error;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Which of the two framing sentinels a [`DecodeError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    Start,
    End,
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentinel::Start => write!(f, "start"),
            Sentinel::End => write!(f, "end"),
        }
    }
}

/// A card-read frame that does not carry a well-formed Wiegand payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing {sentinel} sentinel")]
    MissingSentinel { sentinel: Sentinel },

    #[error("end sentinel at {end} precedes start sentinel at {start}")]
    SentinelsOutOfOrder { start: usize, end: usize },

    #[error("expected {expected} payload cells, found {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Decode a card-read frame into a [`CardIdentity`].
///
/// The whole buffer is scanned, so a trailing line feed or leading type byte
/// is harmless.
///
/// # Errors
///
/// Returns a [`DecodeError`] if either sentinel is missing, the end sentinel
/// comes first, or the sentinels are not exactly 16 cells apart.
pub fn decode(frame: &[u8]) -> Result<CardIdentity> {
    let mut start = None;
    let mut end = None;

    for (index, byte) in frame.iter().enumerate() {
        match byte & 0x0F {
            START_SENTINEL_NIBBLE => start = Some(index),
            END_SENTINEL_NIBBLE => end = Some(index),
            _ => {}
        }
    }

    let start = start.ok_or(DecodeError::MissingSentinel {
        sentinel: Sentinel::Start,
    })?;
    let end = end.ok_or(DecodeError::MissingSentinel {
        sentinel: Sentinel::End,
    })?;

    if end < start {
        return Err(DecodeError::SentinelsOutOfOrder { start, end });
    }

    let cells = end - start - 1;
    if cells != PAYLOAD_CELLS {
        return Err(DecodeError::InvalidLength {
            expected: PAYLOAD_CELLS,
            actual: cells,
        });
    }

    // Nine cells of at most four bits each: the packed word stays below 2^28.
    let packed = frame[start + SKIPPED_CELLS..end]
        .iter()
        .fold(0u32, |acc, byte| (acc << 3) | u32::from(byte & 0x0F));

    let card_number = ((packed & CARD_NUMBER_MASK) >> 1) as u16;
    let facility = ((packed & FACILITY_MASK) >> FACILITY_SHIFT) as u8;

    Ok(CardIdentity::new(facility, card_number))
}

/// Build the frame the board emits when `identity` is presented, including
/// both parity bits and the trailing line feed.
#[must_use]
pub fn encode(identity: CardIdentity) -> Vec<u8> {
    let data = (u32::from(identity.facility) << 16) | u32::from(identity.card_number);
    let even = (data >> 12).count_ones() & 1;
    let odd = 1 - ((data & 0xFFF).count_ones() & 1);
    let word = (even << 25) | (data << 1) | odd;

    let mut frame = Vec::with_capacity(PAYLOAD_CELLS + 4);
    frame.push(FRAME_CARD);
    frame.push(START_SENTINEL_NIBBLE);
    for cell in (0..PAYLOAD_CELLS).rev() {
        let digit = word.checked_shr(3 * cell as u32).unwrap_or(0) & 0x7;
        frame.push(b'0' + digit as u8);
    }
    frame.push(END_SENTINEL_NIBBLE);
    frame.push(LINE_FEED);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn frame_with_cells(cells: &[u8]) -> Vec<u8> {
        let mut frame = vec![b'H', 0x0B];
        frame.extend_from_slice(cells);
        frame.extend_from_slice(&[0x0F, b'\n']);
        frame
    }

    #[test]
    fn test_decode_board_frame() {
        // 40-12345 as emitted by the board (parity bits set)
        let frame = frame_with_cells(b"0000000024060163");
        let identity = decode(&frame).unwrap();
        assert_eq!(identity, CardIdentity::new(40, 12345));
    }

    #[test]
    fn test_encode_matches_board_frame() {
        assert_eq!(
            encode(CardIdentity::new(40, 12345)),
            frame_with_cells(b"0000000024060163")
        );
    }

    #[test]
    fn test_decode_ignores_parity_bits() {
        let mut frame = encode(CardIdentity::new(1, 1));
        // flip the trailing odd-parity bit in the last data cell
        frame[17] ^= 0x01;
        assert_eq!(decode(&frame).unwrap(), CardIdentity::new(1, 1));
    }

    #[test]
    fn test_decode_extremes() {
        for identity in [
            CardIdentity::new(0, 0),
            CardIdentity::new(255, 65535),
            CardIdentity::new(255, 0),
            CardIdentity::new(0, 65535),
        ] {
            assert_eq!(decode(&encode(identity)).unwrap(), identity);
        }
    }

    #[test]
    fn test_decode_uses_last_sentinels() {
        // A stray start sentinel before the real one must be ignored.
        let mut frame = vec![0x0B, b'x'];
        frame.extend(encode(CardIdentity::new(7, 42)));
        assert_eq!(decode(&frame).unwrap(), CardIdentity::new(7, 42));
    }

    #[rstest]
    #[case(b"H0000000000000000\n".to_vec(), DecodeError::MissingSentinel { sentinel: Sentinel::Start })]
    #[case(vec![b'H', 0x0B, b'0', b'\n'], DecodeError::MissingSentinel { sentinel: Sentinel::End })]
    #[case(vec![], DecodeError::MissingSentinel { sentinel: Sentinel::Start })]
    #[case(vec![b'H', 0x0F, b'0', 0x0B, b'\n'], DecodeError::SentinelsOutOfOrder { start: 3, end: 1 })]
    #[case(frame_with_cells(b"000000002406016"), DecodeError::InvalidLength { expected: 16, actual: 15 })]
    #[case(frame_with_cells(b"00000000240601630"), DecodeError::InvalidLength { expected: 16, actual: 17 })]
    fn test_decode_rejects_malformed(#[case] frame: Vec<u8>, #[case] expected: DecodeError) {
        assert_eq!(decode(&frame), Err(expected));
    }

    #[test]
    fn test_decode_error_display() {
        let error = DecodeError::InvalidLength {
            expected: 16,
            actual: 3,
        };
        assert_eq!(error.to_string(), "expected 16 payload cells, found 3");
        let error = DecodeError::MissingSentinel {
            sentinel: Sentinel::End,
        };
        assert_eq!(error.to_string(), "missing end sentinel");
    }
}
