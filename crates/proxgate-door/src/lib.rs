//! Door control for proxgate.
//!
//! A [`Door`] pairs a card reader with an [`AuthorizationCache`]. Once
//! started by the [`DoorSupervisor`] it runs two tasks: the
//! [`DoorController`] loop that reads cards and drives the strike, and a
//! periodic refresh of the cache from the directory. Decisions are published
//! to [`DecisionObserver`]s through the door's [`EventDispatcher`].
//!
//! # Examples
//!
//! ```no_run
//! use proxgate_door::{AccessLogObserver, Door, DoorOptions, DoorSupervisor};
//! use proxgate_hardware::MockLink;
//! use proxgate_storage::MemoryDirectory;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), proxgate_door::DoorError> {
//! let mut supervisor = DoorSupervisor::new();
//! let (link, _board) = MockLink::new();
//! let door = Door::new(
//!     "front",
//!     link,
//!     MemoryDirectory::new(),
//!     &DoorOptions::default(),
//!     supervisor.cancellation_token(),
//! );
//! supervisor.add_door(door).await?;
//! supervisor.subscribe_all(Arc::new(AccessLogObserver::default()));
//!
//! supervisor.trigger_open("front")?;
//! supervisor.shutdown(Duration::from_secs(5)).await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod controller;
pub mod dispatch;
pub mod door;
pub mod error;
pub mod observers;
pub mod policy;
pub mod state;
pub mod supervisor;

pub use cache::{AuthorizationCache, DoorState};
pub use controller::{DoorController, DoorTimings, Step};
pub use dispatch::{DecisionObserver, EventDispatcher, ObserverError, SubscriptionId};
pub use door::{Door, DoorHandle, DoorOptions};
pub use error::{DoorError, Result};
pub use observers::{AccessLogObserver, AuditLogObserver, FriendlyName};
pub use policy::{AfterHoursPolicy, TimeOfDay};
pub use state::LoopState;
pub use supervisor::{DoorSupervisor, ShutdownReport};
