//! Persistance SQLite de la file et des statistiques de contribution
//!
//! Une seule connexion protégée par un `Mutex` : toutes les écritures sont
//! sérialisées et chaque opération composée (création + compteur, annulation
//! + compteur) passe par une transaction.

use crate::entry::lifecycle::{self, Action};
use crate::entry::{Category, ContributionStats, EntryId, EntryStatus, Principal, QueueEntry};
use crate::ordering::sort_active;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Délai par défaut des opérations de stockage
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

const ENTRY_COLUMNS: &str =
    "id, title, category, added_by, added_by_name, added_at, status, status_note";

/// Compteurs d'une catégorie
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub pending: usize,
    pub downloading: usize,
}

impl CategoryCounts {
    pub fn active(&self) -> usize {
        self.pending + self.downloading
    }
}

/// Statistiques globales de la file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub downloading: usize,
    pub completed: usize,
    pub by_category: BTreeMap<Category, CategoryCounts>,
}

/// Store SQLite (une base pour toutes les catégories)
pub struct QueueStore {
    conn: Mutex<Connection>,
    last_added_at: AtomicI64,
    timeout: Duration,
}

impl QueueStore {
    /// Ouvre (ou crée) la base avec le délai par défaut
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::open_with_timeout(db_path, DEFAULT_STORE_TIMEOUT)
    }

    /// Ouvre (ou crée) la base ; `timeout` borne l'attente des verrous SQLite
    /// et la durée des appels faits depuis le coordinateur.
    pub fn open_with_timeout(db_path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path).map_err(Error::storage("Failed to open database"))?;
        Self::from_connection(conn, timeout)
    }

    /// Base en mémoire, perdue à la fermeture
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(Error::storage("Failed to open database"))?;
        Self::from_connection(conn, DEFAULT_STORE_TIMEOUT)
    }

    fn from_connection(conn: Connection, timeout: Duration) -> Result<Self> {
        conn.busy_timeout(timeout)
            .map_err(Error::storage("Failed to set busy timeout"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                added_by TEXT NOT NULL,
                added_by_name TEXT NOT NULL,
                added_at INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                status_note TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_queue_category ON queue(category, status, added_at);
            CREATE INDEX IF NOT EXISTS idx_queue_added_by ON queue(added_by, status, added_at);
            CREATE TABLE IF NOT EXISTS contributors (
                user_id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                items_added INTEGER NOT NULL DEFAULT 0,
                last_added INTEGER
            );",
        )
        .map_err(Error::storage("Failed to create tables"))?;

        let newest: i64 = conn
            .query_row("SELECT COALESCE(MAX(added_at), 0) FROM queue", [], |row| {
                row.get(0)
            })
            .map_err(Error::storage("Failed to read newest entry"))?;

        Ok(Self {
            conn: Mutex::new(conn),
            last_added_at: AtomicI64::new(newest),
            timeout,
        })
    }

    /// Délai appliqué aux opérations de stockage
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("Connection lock poisoned".into()))
    }

    /// Horodatage strictement croissant (nanosecondes depuis epoch)
    fn next_timestamp(&self) -> i64 {
        let now_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as i64;

        let mut last = self.last_added_at.load(Ordering::Relaxed);
        loop {
            let candidate = if now_nanos > last {
                now_nanos
            } else {
                last.saturating_add(1)
            };

            match self.last_added_at.compare_exchange(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(updated) => last = updated,
            }
        }
    }

    /// Ajoute une demande `pending` et met à jour les statistiques du
    /// contributeur dans la même transaction.
    pub fn create_entry(
        &self,
        title: &str,
        category: Category,
        principal: &Principal,
    ) -> Result<EntryId> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(Error::storage("Failed to begin transaction"))?;
        let now = self.next_timestamp();

        tx.execute(
            "INSERT INTO queue (title, category, added_by, added_by_name, added_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending')",
            params![title, category.as_str(), principal.id, principal.name, now],
        )
        .map_err(Error::storage("Failed to insert entry"))?;
        let id = tx.last_insert_rowid();

        // Dernier nom connu sur les demandes existantes
        tx.execute(
            "UPDATE queue SET added_by_name = ?1 WHERE added_by = ?2 AND added_by_name != ?1",
            params![principal.name, principal.id],
        )
        .map_err(Error::storage("Failed to refresh display name"))?;

        tx.execute(
            "INSERT INTO contributors (user_id, username, items_added, last_added)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 username = excluded.username,
                 items_added = items_added + 1,
                 last_added = excluded.last_added",
            params![principal.id, principal.name, now],
        )
        .map_err(Error::storage("Failed to update contributor"))?;

        tx.commit()
            .map_err(Error::storage("Failed to commit entry"))?;

        Ok(id)
    }

    /// Demandes actives dans l'ordre d'affichage, filtrées par catégorie
    pub fn list_active(&self, category: Option<Category>) -> Result<Vec<QueueEntry>> {
        let conn = self.lock()?;
        let mut entries = match category {
            Some(category) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM queue WHERE status != 'completed' AND category = ?1",
                        ENTRY_COLUMNS
                    ))
                    .map_err(Error::storage("Failed to prepare statement"))?;
                let rows = stmt
                    .query_map(params![category.as_str()], row_to_entry)
                    .map_err(Error::storage("Failed to query queue"))?;
                let entries = rows
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(Error::storage("Failed to read entry"))?;
                entries
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM queue WHERE status != 'completed'",
                        ENTRY_COLUMNS
                    ))
                    .map_err(Error::storage("Failed to prepare statement"))?;
                let rows = stmt
                    .query_map([], row_to_entry)
                    .map_err(Error::storage("Failed to query queue"))?;
                let entries = rows
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(Error::storage("Failed to read entry"))?;
                entries
            }
        };

        sort_active(&mut entries);
        Ok(entries)
    }

    /// Récupère une demande, quel que soit son statut
    pub fn get_entry(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        let conn = self.lock()?;
        fetch_entry(&conn, id)
    }

    /// Passe une demande en `completed`.
    ///
    /// Retourne `false` si la demande est absente ou déjà terminée.
    pub fn mark_completed(&self, id: EntryId) -> Result<bool> {
        self.transition(id, Action::Complete, |tx, next| {
            tx.execute(
                "UPDATE queue SET status = ?1 WHERE id = ?2",
                params![next.as_str(), id],
            )
        })
    }

    /// Bascule `pending` ↔ `downloading` ; `false` si terminée ou absente.
    pub fn toggle_downloading(&self, id: EntryId) -> Result<bool> {
        self.transition(id, Action::ToggleDownload, |tx, next| {
            tx.execute(
                "UPDATE queue SET status = ?1 WHERE id = ?2",
                params![next.as_str(), id],
            )
        })
    }

    /// Pose la note de statut ; `false` si terminée ou absente.
    pub fn set_status_note(&self, id: EntryId, note: &str) -> Result<bool> {
        self.transition(id, Action::SetNote, |tx, _| {
            tx.execute(
                "UPDATE queue SET status_note = ?1 WHERE id = ?2",
                params![note, id],
            )
        })
    }

    /// Efface la note de statut ; `false` si terminée ou absente.
    pub fn clear_status_note(&self, id: EntryId) -> Result<bool> {
        self.transition(id, Action::ClearNote, |tx, _| {
            tx.execute(
                "UPDATE queue SET status_note = NULL WHERE id = ?1",
                params![id],
            )
        })
    }

    /// Lit le statut courant, consulte la machine à états puis applique
    /// `apply` dans la même transaction.
    fn transition<F>(&self, id: EntryId, action: Action, apply: F) -> Result<bool>
    where
        F: FnOnce(&rusqlite::Transaction<'_>, EntryStatus) -> rusqlite::Result<usize>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(Error::storage("Failed to begin transaction"))?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM queue WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::storage("Failed to read status"))?;

        let Some(current) = current else {
            return Ok(false);
        };
        let current = EntryStatus::from_str(&current)?;

        let Some(next) = lifecycle::next_status(current, action) else {
            tracing::debug!(id, status = %current, ?action, "Transition refused");
            return Ok(false);
        };

        let changed = apply(&tx, next).map_err(Error::storage("Failed to update entry"))?;
        tx.commit()
            .map_err(Error::storage("Failed to commit update"))?;

        Ok(changed > 0)
    }

    /// Supprime définitivement la dernière demande `pending` d'un principal
    /// et décrémente son compteur (sans plancher).
    ///
    /// Les demandes `downloading` ne sont jamais annulables par ce biais,
    /// même plus récentes.
    pub fn delete_last_by_principal(&self, principal_id: &str) -> Result<Option<QueueEntry>> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(Error::storage("Failed to begin transaction"))?;

        let entry = tx
            .query_row(
                &format!(
                    "SELECT {} FROM queue
                     WHERE added_by = ?1 AND status = 'pending'
                     ORDER BY added_at DESC, id DESC
                     LIMIT 1",
                    ENTRY_COLUMNS
                ),
                params![principal_id],
                row_to_entry,
            )
            .optional()
            .map_err(Error::storage("Failed to find last entry"))?;

        let Some(entry) = entry else {
            return Ok(None);
        };

        tx.execute("DELETE FROM queue WHERE id = ?1", params![entry.id])
            .map_err(Error::storage("Failed to delete entry"))?;

        tx.execute(
            "UPDATE contributors SET items_added = items_added - 1 WHERE user_id = ?1",
            params![principal_id],
        )
        .map_err(Error::storage("Failed to update contributor"))?;

        tx.commit()
            .map_err(Error::storage("Failed to commit undo"))?;

        Ok(Some(entry))
    }

    /// Termine toutes les demandes actives d'une catégorie
    pub fn clear_category(&self, category: Category) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE queue SET status = 'completed'
             WHERE category = ?1 AND status IN ('pending', 'downloading')",
            params![category.as_str()],
        )
        .map_err(Error::storage("Failed to clear category"))
    }

    /// Compteurs par statut et par catégorie
    pub fn aggregate_stats(&self) -> Result<QueueStats> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT category, status, COUNT(*) FROM queue GROUP BY category, status")
            .map_err(Error::storage("Failed to prepare statement"))?;

        let rows = stmt
            .query_map([], |row| {
                let category: String = row.get(0)?;
                let status: String = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok((
                    parse_column::<Category>(0, category)?,
                    parse_column::<EntryStatus>(1, status)?,
                    count as usize,
                ))
            })
            .map_err(Error::storage("Failed to query stats"))?;

        let mut stats = QueueStats {
            by_category: Category::ALL
                .iter()
                .map(|c| (*c, CategoryCounts::default()))
                .collect(),
            ..QueueStats::default()
        };

        for row in rows {
            let (category, status, count) =
                row.map_err(Error::storage("Failed to read stats"))?;
            let counts = stats.by_category.entry(category).or_default();
            match status {
                EntryStatus::Pending => {
                    stats.pending += count;
                    counts.pending += count;
                }
                EntryStatus::Downloading => {
                    stats.downloading += count;
                    counts.downloading += count;
                }
                EntryStatus::Completed => stats.completed += count,
            }
        }

        Ok(stats)
    }

    /// Statistiques de contribution d'un principal
    pub fn contribution_stats(&self, principal_id: &str) -> Result<Option<ContributionStats>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT user_id, username, items_added, last_added FROM contributors WHERE user_id = ?1",
            params![principal_id],
            |row| {
                let last_added: Option<i64> = row.get(3)?;
                Ok(ContributionStats {
                    principal_id: row.get(0)?,
                    display_name: row.get(1)?,
                    items_added: row.get(2)?,
                    last_added_at: last_added.map(DateTime::<Utc>::from_timestamp_nanos),
                })
            },
        )
        .optional()
        .map_err(Error::storage("Failed to read contributor"))
    }
}

/// Exécute `op` sur le pool bloquant de tokio, borné par le délai du store.
///
/// À l'expiration, l'appelant reçoit `Error::Storage` ; l'opération peut
/// néanmoins aboutir en arrière-plan.
pub(crate) async fn with_store<T, F>(store: &Arc<QueueStore>, op: &'static str, f: F) -> Result<T>
where
    F: FnOnce(&QueueStore) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let timeout = store.timeout();
    let store = store.clone();
    let task = tokio::task::spawn_blocking(move || f(&store));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(Error::Storage(format!("{} task failed: {}", op, e))),
        Err(_) => Err(Error::Storage(format!("{} timed out after {:?}", op, timeout))),
    }
}

fn fetch_entry(conn: &Connection, id: EntryId) -> Result<Option<QueueEntry>> {
    conn.query_row(
        &format!("SELECT {} FROM queue WHERE id = ?1", ENTRY_COLUMNS),
        params![id],
        row_to_entry,
    )
    .optional()
    .map_err(Error::storage("Failed to read entry"))
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    let category: String = row.get(2)?;
    let added_at: i64 = row.get(5)?;
    let status: String = row.get(6)?;

    Ok(QueueEntry {
        id: row.get(0)?,
        title: row.get(1)?,
        category: parse_column(2, category)?,
        added_by: row.get(3)?,
        added_by_name: row.get(4)?,
        added_at: DateTime::<Utc>::from_timestamp_nanos(added_at),
        status: parse_column(6, status)?,
        status_note: row.get(7)?,
    })
}

fn parse_column<T>(index: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    value
        .parse()
        .map_err(|e: Error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}
