//! Wire-level constants and default policy values.
//!
//! The door-controller board speaks a line-oriented ASCII protocol over a
//! point-to-point serial link. Outbound commands are two characters followed
//! by a line feed; inbound frames start with a type byte:
//!
//! | First byte | Meaning |
//! |------------|---------|
//! | `H` | Card read (Wiegand-26 payload between two sentinel nibbles) |
//! | `?` | Status / heartbeat |
//! | `i` | Input status (ignored) |
//!
//! The durations below are operational policy rather than protocol
//! requirements. They are the defaults the door configuration falls back to.
//!
//! ```
//! use proxgate_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(LINE_FEED, b'\n');
//! let hold = Duration::from_millis(DEFAULT_OPEN_HOLD_MS);
//! assert_eq!(hold.as_secs(), 4);
//! ```

// ============================================================================
// Framing
// ============================================================================

/// Terminator for every inbound and outbound frame.
pub const LINE_FEED: u8 = b'\n';

/// First byte of a card-read frame.
pub const FRAME_CARD: u8 = b'H';

/// First byte of a status/heartbeat frame.
pub const FRAME_STATUS: u8 = b'?';

/// Low nibble marking the start of the Wiegand payload.
pub const START_SENTINEL_NIBBLE: u8 = 0x0B;

/// Low nibble marking the end of the Wiegand payload.
pub const END_SENTINEL_NIBBLE: u8 = 0x0F;

/// Number of cells between the two sentinels.
pub const PAYLOAD_CELLS: usize = 16;

/// Leading cells (start sentinel plus seven zero cells) skipped before packing.
pub const SKIPPED_CELLS: usize = 8;

/// Largest frame the reader will accept in one receive.
pub const MAX_FRAME_LEN: usize = 1024;

// ============================================================================
// Wiegand-26 field masks
// ============================================================================

/// Mask selecting the 16-bit card number (above the trailing parity bit).
pub const CARD_NUMBER_MASK: u32 = 0x1FFFE;

/// Mask selecting the 8-bit facility code.
pub const FACILITY_MASK: u32 = 0x1FE_0000;

/// Shift applied after masking the facility code.
pub const FACILITY_SHIFT: u32 = 17;

// ============================================================================
// Serial line defaults
// ============================================================================

/// Default line speed of the door-controller board.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default receive window for one poll of the link.
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 1000;

/// Interval between input polls while waiting for a terminator.
pub const RECEIVE_POLL_INTERVAL_MS: u64 = 10;

// ============================================================================
// Door policy defaults
// ============================================================================

/// How long the strike stays unlocked for a granted read or trigger.
pub const DEFAULT_OPEN_HOLD_MS: u64 = 4000;

/// Pause after a denied read before the next read is attempted.
pub const DEFAULT_DENIAL_DELAY_MS: u64 = 2000;

/// Pacing between the on/off steps of the notification beep.
pub const DEFAULT_BEEP_PACING_MS: u64 = 500;

/// Minimum interval between two latch resynchronizations.
pub const DEFAULT_LATCH_SYNC_INTERVAL_MS: u64 = 5000;

/// Default authorization cache refresh interval.
pub const DEFAULT_CACHE_RELOAD_SECS: u64 = 120;

/// Default grace period for workers to stop on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5000;

/// Ceiling for the pause between attempts on a failed reader link.
pub const MAX_LINK_RETRY_BACKOFF_MS: u64 = 30_000;
