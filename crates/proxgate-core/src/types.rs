use crate::{Result, error::Error};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Identity decoded from a Wiegand-26 card read.
///
/// Derived from the wire frame, never stored. Two reads of the same physical
/// card always produce equal identities.
///
/// # Examples
///
/// ```
/// use proxgate_core::CardIdentity;
///
/// let id = CardIdentity::new(40, 12345);
/// assert_eq!(id.key().as_str(), "40-12345");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardIdentity {
    pub facility: u8,
    pub card_number: u16,
}

impl CardIdentity {
    #[must_use]
    pub fn new(facility: u8, card_number: u16) -> Self {
        Self {
            facility,
            card_number,
        }
    }

    /// Stable lookup key, `"{facility}-{card_number}"`.
    #[must_use]
    pub fn key(&self) -> CardKey {
        CardKey(self.to_string())
    }
}

impl fmt::Display for CardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.facility, self.card_number)
    }
}

/// Card identifier as stored in the directory and used for cache lookups.
///
/// # Security
/// Comparison is constant-time so lookups do not leak how much of a
/// presented key matched a stored one.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct CardKey(String);

impl CardKey {
    /// Create a card key from a directory value.
    ///
    /// The value is trimmed before use.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardKey` if the value is empty or not ASCII.
    pub fn new(key: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() || !key.is_ascii() {
            return Err(Error::InvalidCardKey(key.to_string()));
        }
        Ok(Self(key.to_string()))
    }

    /// Key used for events that did not originate from a card read.
    #[must_use]
    pub fn remote() -> Self {
        Self("remote".to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<CardIdentity> for CardKey {
    fn from(identity: CardIdentity) -> Self {
        identity.key()
    }
}

impl fmt::Display for CardKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for CardKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardKey::new(s)
    }
}

impl PartialEq for CardKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for CardKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// A card authorized for one door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedCard {
    /// Holder's full name.
    pub real_name: String,

    /// Holder's nickname, used by the friendly access log.
    pub nick_name: String,

    /// Whether the card opens the door inside the after-hours window.
    pub after_hours_allowed: bool,

    /// Magic cards toggle the door's forced-unlocked state instead of opening it.
    pub magic: bool,
}

impl AuthorizedCard {
    pub fn new(real_name: impl Into<String>, nick_name: impl Into<String>) -> Self {
        Self {
            real_name: real_name.into(),
            nick_name: nick_name.into(),
            after_hours_allowed: false,
            magic: false,
        }
    }

    #[must_use]
    pub fn with_after_hours(mut self, allowed: bool) -> Self {
        self.after_hours_allowed = allowed;
        self
    }

    #[must_use]
    pub fn with_magic(mut self, magic: bool) -> Self {
        self.magic = magic;
        self
    }
}

/// What produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// A card was presented at the reader.
    CardRead,
    /// An operator asked for the door to open.
    RemoteTrigger,
}

/// Immutable record of one access decision.
///
/// Built once by the door loop and handed to every observer. Nothing in it
/// refers back to the loop, so an observer cannot change door state through
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub time_read: DateTime<Local>,
    pub card_id: CardKey,
    pub door_name: String,
    pub allowed: bool,
    pub unknown: bool,
    pub matched_card: Option<AuthorizedCard>,
    pub source: DecisionSource,
}

impl DecisionEvent {
    /// Decision for a card found in the authorization table.
    pub fn granted(door_name: impl Into<String>, card_id: CardKey, card: AuthorizedCard) -> Self {
        Self {
            time_read: Local::now(),
            card_id,
            door_name: door_name.into(),
            allowed: true,
            unknown: false,
            matched_card: Some(card),
            source: DecisionSource::CardRead,
        }
    }

    /// Decision for a card absent from the table (or outside its hours).
    pub fn denied(door_name: impl Into<String>, card_id: CardKey) -> Self {
        Self {
            time_read: Local::now(),
            card_id,
            door_name: door_name.into(),
            allowed: false,
            unknown: true,
            matched_card: None,
            source: DecisionSource::CardRead,
        }
    }

    /// Decision for a known card whose action could not be carried out.
    pub fn refused(door_name: impl Into<String>, card_id: CardKey, card: AuthorizedCard) -> Self {
        Self {
            allowed: false,
            ..Self::granted(door_name, card_id, card)
        }
    }

    /// Decision for an operator-triggered open.
    pub fn remote_trigger(door_name: impl Into<String>) -> Self {
        Self {
            time_read: Local::now(),
            card_id: CardKey::remote(),
            door_name: door_name.into(),
            allowed: true,
            unknown: false,
            matched_card: None,
            source: DecisionSource::RemoteTrigger,
        }
    }

    /// Real name of the matched card holder, `"Unknown"` otherwise.
    #[must_use]
    pub fn real_name(&self) -> &str {
        self.matched_card
            .as_ref()
            .map_or("Unknown", |card| card.real_name.as_str())
    }

    /// Nickname of the matched card holder, `"Unknown"` otherwise.
    #[must_use]
    pub fn nick_name(&self) -> &str {
        self.matched_card
            .as_ref()
            .map_or("Unknown", |card| card.nick_name.as_str())
    }

    #[must_use]
    pub fn is_magic(&self) -> bool {
        self.matched_card.as_ref().is_some_and(|card| card.magic)
    }
}
