//! Built-in decision observers.
//!
//! [`AccessLogObserver`] writes a human-readable line per decision through
//! `tracing`. [`AuditLogObserver`] hands decisions to a background task that
//! appends them to the `access_log` table, so a slow database never stalls a
//! door loop.

use crate::dispatch::{DecisionObserver, ObserverError};
use chrono::Utc;
use proxgate_core::{DecisionEvent, DecisionSource};
use proxgate_storage::{AccessAction, AccessLogEntry, AccessLogRepository, SqliteAccessLogRepository};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Which holder name the access log shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendlyName {
    #[default]
    Real,
    Nick,
}

impl FriendlyName {
    pub fn pick<'a>(&self, event: &'a DecisionEvent) -> &'a str {
        match self {
            FriendlyName::Real => event.real_name(),
            FriendlyName::Nick => event.nick_name(),
        }
    }
}

/// Logs each decision as one friendly line.
#[derive(Debug, Clone, Default)]
pub struct AccessLogObserver {
    friendly: FriendlyName,
}

impl AccessLogObserver {
    pub fn new(friendly: FriendlyName) -> Self {
        Self { friendly }
    }

    /// The line logged for `event`.
    pub fn describe(&self, event: &DecisionEvent) -> String {
        match event.source {
            DecisionSource::RemoteTrigger => format!("{} opened remotely.", event.door_name),
            DecisionSource::CardRead if event.allowed => {
                format!("{} has entered.", self.friendly.pick(event))
            }
            DecisionSource::CardRead if event.unknown => {
                format!("Unauthorized card: {}", event.card_id)
            }
            DecisionSource::CardRead => format!("{} was refused.", self.friendly.pick(event)),
        }
    }
}

impl DecisionObserver for AccessLogObserver {
    fn on_decision(&self, event: &DecisionEvent) -> Result<(), ObserverError> {
        info!(
            target: "proxgate::access",
            door = %event.door_name,
            card = %event.card_id,
            allowed = event.allowed,
            "{}",
            self.describe(event)
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "access-log"
    }
}

/// Queues decisions for the `access_log` table.
#[derive(Debug, Clone)]
pub struct AuditLogObserver {
    tx: mpsc::Sender<AccessLogEntry>,
}

impl AuditLogObserver {
    /// Start the writer task. It drains the queue and exits once every clone
    /// of the returned observer has been dropped.
    pub fn spawn(repository: SqliteAccessLogRepository, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AccessLogEntry>(capacity);

        let writer = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                match repository.create(&entry).await {
                    Ok(id) => debug!(id, card = %entry.card_id, "access recorded"),
                    Err(e) => error!(error = %e, card = %entry.card_id, "failed to record access"),
                }
            }
            debug!("audit writer stopped");
        });

        (Self { tx }, writer)
    }

    /// The row recorded for `event`.
    pub fn entry_for(event: &DecisionEvent) -> AccessLogEntry {
        let action = if event.allowed {
            AccessAction::Allow
        } else {
            AccessAction::Deny
        };
        let entry = AccessLogEntry::new(
            event.time_read.with_timezone(&Utc),
            event.card_id.as_str(),
            action,
            event.door_name.as_str(),
        );

        match (event.source, &event.matched_card) {
            (DecisionSource::RemoteTrigger, _) => entry.with_detail("remote trigger"),
            (DecisionSource::CardRead, Some(card)) if event.allowed => {
                entry.with_detail(card.real_name.as_str())
            }
            (DecisionSource::CardRead, Some(card)) => {
                entry.with_detail(format!("refused: {}", card.real_name))
            }
            (DecisionSource::CardRead, None) => entry.with_detail("unknown card"),
        }
    }
}

impl DecisionObserver for AuditLogObserver {
    fn on_decision(&self, event: &DecisionEvent) -> Result<(), ObserverError> {
        match self.tx.try_send(Self::entry_for(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(entry)) => Err(ObserverError::Transient(format!(
                "audit queue full, dropped {}",
                entry.card_id
            ))),
            Err(TrySendError::Closed(_)) => {
                Err(ObserverError::Permanent("audit writer has stopped".into()))
            }
        }
    }

    fn name(&self) -> &str {
        "audit-log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxgate_core::{AuthorizedCard, CardKey};
    use proxgate_storage::Database;
    use rstest::rstest;

    fn granted() -> DecisionEvent {
        DecisionEvent::granted(
            "front",
            CardKey::new("40-12345").unwrap(),
            AuthorizedCard::new("Ada Lovelace", "ada"),
        )
    }

    fn denied() -> DecisionEvent {
        DecisionEvent::denied("front", CardKey::new("99-1").unwrap())
    }

    fn refused() -> DecisionEvent {
        DecisionEvent::refused(
            "front",
            CardKey::new("1-1").unwrap(),
            AuthorizedCard::new("Root", "root").with_magic(true),
        )
    }

    #[rstest]
    #[case(FriendlyName::Real, granted(), "Ada Lovelace has entered.")]
    #[case(FriendlyName::Nick, granted(), "ada has entered.")]
    #[case(FriendlyName::Real, denied(), "Unauthorized card: 99-1")]
    #[case(FriendlyName::Nick, refused(), "root was refused.")]
    #[case(FriendlyName::Real, DecisionEvent::remote_trigger("front"), "front opened remotely.")]
    fn test_access_log_lines(
        #[case] friendly: FriendlyName,
        #[case] event: DecisionEvent,
        #[case] expected: &str,
    ) {
        assert_eq!(AccessLogObserver::new(friendly).describe(&event), expected);
    }

    #[test]
    fn test_friendly_name_deserializes() {
        let nick: FriendlyName = serde_json::from_str(r#""nick""#).unwrap();
        assert_eq!(nick, FriendlyName::Nick);
        assert!(serde_json::from_str::<FriendlyName>(r#""full""#).is_err());
    }

    #[rstest]
    #[case(granted(), AccessAction::Allow, "Ada Lovelace")]
    #[case(denied(), AccessAction::Deny, "unknown card")]
    #[case(refused(), AccessAction::Deny, "refused: Root")]
    #[case(DecisionEvent::remote_trigger("front"), AccessAction::Allow, "remote trigger")]
    fn test_audit_entries(
        #[case] event: DecisionEvent,
        #[case] action: AccessAction,
        #[case] detail: &str,
    ) {
        let entry = AuditLogObserver::entry_for(&event);
        assert_eq!(entry.action, action);
        assert_eq!(entry.door, "front");
        assert_eq!(entry.detail.as_deref(), Some(detail));
    }

    #[tokio::test]
    async fn test_audit_writer_persists_decisions() {
        let db = Database::in_memory().await.unwrap();
        let repository = SqliteAccessLogRepository::new(db.pool().clone());
        let (observer, writer) = AuditLogObserver::spawn(repository.clone(), 16);

        observer.on_decision(&granted()).unwrap();
        observer.on_decision(&denied()).unwrap();
        drop(observer);
        writer.await.unwrap();

        let entries = repository.find_by_door("front", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_stopped_writer_is_permanent_failure() {
        let db = Database::in_memory().await.unwrap();
        let repository = SqliteAccessLogRepository::new(db.pool().clone());
        let (observer, writer) = AuditLogObserver::spawn(repository, 1);

        writer.abort();
        let _ = writer.await;

        assert!(matches!(
            observer.on_decision(&granted()),
            Err(ObserverError::Permanent(_))
        ));
    }
}
