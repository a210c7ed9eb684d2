//! Wiring of configured doors to the directory, readers and observers.

use anyhow::Context;
use proxgate_door::{AccessLogObserver, AuditLogObserver, Door, DoorSupervisor};
use proxgate_hardware::{SerialConfig, SerialLink};
use proxgate_storage::{Database, DatabaseConfig, SqliteAccessLogRepository, SqliteDirectory};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::settings::Settings;

const AUDIT_QUEUE_CAPACITY: usize = 256;

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let db = Database::new(
        DatabaseConfig::new(&settings.database.path)
            .max_connections(settings.database.max_connections),
    )
    .await
    .with_context(|| format!("failed to open database {}", settings.database.path))?;

    let directory = SqliteDirectory::new(db.pool().clone());
    let options = settings.door_options()?;
    let grace = settings.timings.shutdown_grace();

    // Everything that can fail for a door happens before any door runs.
    let mut links = Vec::with_capacity(settings.doors.len());
    for door in &settings.doors {
        if directory
            .ensure_door(&door.name)
            .await
            .with_context(|| format!("failed to register door {}", door.name))?
        {
            info!(door = %door.name, "added door to directory");
        }

        let config = SerialConfig::new(&door.port).baud_rate(door.baud_rate);
        let link = SerialLink::open_or_detach(&config)
            .with_context(|| format!("failed to open reader for door {}", door.name))?;
        links.push((door.name.as_str(), link));
    }

    let supervisor = DoorSupervisor::new();
    let doors = links
        .into_iter()
        .map(|(name, link)| {
            Door::new(
                name,
                link,
                directory.clone(),
                &options,
                supervisor.cancellation_token(),
            )
        })
        .collect();
    let supervisor = start_doors(supervisor, doors, grace).await?;

    supervisor.subscribe_all(Arc::new(AccessLogObserver::new(settings.friendly_name)));

    let audit_writer = settings.audit_log.then(|| {
        let repository = SqliteAccessLogRepository::new(db.pool().clone());
        let (observer, writer) = AuditLogObserver::spawn(repository, AUDIT_QUEUE_CAPACITY);
        supervisor.subscribe_all(Arc::new(observer));
        writer
    });

    info!(doors = supervisor.len(), "proxgate running");
    shutdown_signal().await;

    let report = supervisor.shutdown(grace).await;
    if !report.is_clean() {
        warn!(aborted = report.aborted, panicked = report.panicked, "unclean shutdown");
    }

    if let Some(writer) = audit_writer {
        match tokio::time::timeout(grace, writer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "audit writer failed"),
            Err(_) => warn!("audit writer did not drain in time"),
        }
    }

    db.close().await;
    info!("proxgate stopped");
    Ok(())
}

/// Start `doors` in order. If one fails, the doors already running are shut
/// down (and relocked) before the error is returned.
async fn start_doors(
    mut supervisor: DoorSupervisor,
    doors: Vec<Door>,
    grace: Duration,
) -> anyhow::Result<DoorSupervisor> {
    for door in doors {
        let name = door.name().to_string();
        if let Err(e) = supervisor.add_door(door).await {
            error!(door = %name, error = %e, "failed to start door, stopping the others");
            supervisor.shutdown(grace).await;
            return Err(e).with_context(|| format!("failed to start door {name}"));
        }
    }
    Ok(supervisor)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => warn!(error = %e, "unable to listen for Ctrl+C, shutting down"),
        },
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
