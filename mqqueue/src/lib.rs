//! # mqqueue - Files de demandes de médias par catégorie
//!
//! Cette crate fournit :
//! - Un store SQLite des demandes et des statistiques de contribution
//! - L'ordre d'affichage et la résolution des positions (base 1)
//! - La machine à états `pending` ↔ `downloading` → `completed`
//! - Un coordinateur de mutations par lot avec contrôle des droits
//! - La synchronisation au mieux d'un résumé affiché par catégorie
//!
//! # Architecture
//!
//! - **QueueStore** : persistance, seule propriétaire des ids et horodatages
//! - **ActiveQueue** : instantané ordonné, positions recalculées à chaque requête
//! - **QueueManager** : point d'entrée des mutations
//! - **DisplaySynchronizer** : rendu et push vers une [`DisplaySurface`]
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use mqqueue::{
//!     DisplayBindings, DisplaySynchronizer, FileSurface, Principal, QueueManager, QueueStore,
//!     SyncOptions,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> mqqueue::Result<()> {
//! let store = Arc::new(QueueStore::open(std::path::Path::new("queue.db"))?);
//! let surface = Arc::new(FileSurface::new("displays"));
//! let display = DisplaySynchronizer::new(
//!     store.clone(),
//!     surface,
//!     DisplayBindings::new(),
//!     SyncOptions::default(),
//! );
//! let manager = QueueManager::new(store, display);
//!
//! let alice = Principal::new("42", "alice");
//! manager.submit("Breaking Bad", "show", &alice).await?;
//!
//! for (position, entry) in manager.list_active(Some("show")).await?.iter() {
//!     println!("{}. {}", position, entry.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod display;
pub mod entry;
mod error;
mod manager;
pub mod ordering;
mod persistence;
mod settings;

#[cfg(feature = "mqconfig")]
mod config_ext;

// Réexports publics
pub use classify::{announcement, classify, Classified};
pub use display::{
    DisplayBinding, DisplayBindings, DisplayError, DisplaySurface, DisplaySynchronizer,
    FileSurface, RenderedDisplay, SyncMode, SyncOptions, SyncStatus,
};
pub use entry::{Category, ContributionStats, EntryId, EntryStatus, Principal, QueueEntry};
pub use error::{Error, ErrorKind, Result};
pub use manager::{Outcome, QueueEvent, QueueEventKind, QueueManager, RemovalReport, StatsReport};
pub use ordering::ActiveQueue;
pub use persistence::{CategoryCounts, QueueStats, QueueStore, DEFAULT_STORE_TIMEOUT};
pub use settings::{ChannelPolicy, Settings};

#[cfg(feature = "mqconfig")]
pub use config_ext::QueueConfigExt;
