//! QueueManager : coordinateur des mutations de la file
//!
//! Valide les entrées, résout les positions sur un instantané, vérifie les
//! droits pour le lot entier, puis applique les mutations entrée par entrée.
//! Chaque mutation visible émet un évènement et demande exactement un
//! rafraîchissement de l'affichage.

use crate::display::{DisplaySynchronizer, RenderedDisplay};
use crate::entry::{Category, ContributionStats, EntryId, Principal, QueueEntry};
use crate::ordering::ActiveQueue;
use crate::persistence::{with_store, QueueStats, QueueStore};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;

struct ManagerInner {
    store: Arc<QueueStore>,
    display: DisplaySynchronizer,
    event_tx: broadcast::Sender<QueueEvent>,
}

/// Évènement émis après une mutation visible
#[derive(Debug, Clone)]
pub struct QueueEvent {
    /// Catégorie touchée, `None` pour toutes
    pub category: Option<Category>,
    pub kind: QueueEventKind,
    pub timestamp: DateTime<Utc>,
}

/// Variantes d'évènements de la file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEventKind {
    Submitted { id: EntryId },
    Undone { id: EntryId },
    Removed { titles: Vec<String> },
    NoteSet { id: EntryId },
    NoteCleared { id: EntryId },
    DownloadToggled { id: EntryId },
    Cleared { count: usize },
}

/// Résultat d'une mutation appliquée.
///
/// La mutation est durable dans les deux cas ; `AppliedDisplayStale` signale
/// seulement que l'affichage de la catégorie n'a pas pu être mis à jour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Applied(T),
    AppliedDisplayStale(T),
}

impl<T> Outcome<T> {
    fn new(value: T, display_stale: bool) -> Self {
        if display_stale {
            Outcome::AppliedDisplayStale(value)
        } else {
            Outcome::Applied(value)
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Outcome::Applied(value) | Outcome::AppliedDisplayStale(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Outcome::Applied(value) | Outcome::AppliedDisplayStale(value) => value,
        }
    }

    pub fn is_display_stale(&self) -> bool {
        matches!(self, Outcome::AppliedDisplayStale(_))
    }
}

/// Bilan d'une suppression multiple
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub removed_titles: Vec<String>,
    pub failed_positions: Vec<i64>,
}

/// Statistiques globales et, si demandé, celles d'un contributeur
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub queue: QueueStats,
    pub contributor: Option<ContributionStats>,
}

/// Coordinateur des mutations, partagé par clonage
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<ManagerInner>,
}

impl QueueManager {
    pub fn new(store: Arc<QueueStore>, display: DisplaySynchronizer) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store,
                display,
                event_tx: broadcast::channel(256).0,
            }),
        }
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.inner.store
    }

    pub fn display(&self) -> &DisplaySynchronizer {
        &self.inner.display
    }

    /// S'abonne aux évènements de la file
    pub fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Ajoute une demande en fin de file `pending`
    pub async fn submit(
        &self,
        title: &str,
        category: &str,
        principal: &Principal,
    ) -> Result<Outcome<EntryId>> {
        let category = parse_category(category)?;
        let title = non_empty(title, "title")?;
        let principal = validate_principal(principal)?;

        let id = {
            let principal = principal.clone();
            with_store(&self.inner.store, "create_entry", move |store| {
                store.create_entry(&title, category, &principal)
            })
            .await?
        };

        tracing::info!(category = %category, id, principal = %principal.id, "Entry submitted");
        Ok(self
            .publish(Some(category), QueueEventKind::Submitted { id }, id)
            .await)
    }

    /// Supprime la dernière demande `pending` du principal
    pub async fn undo(&self, principal: &Principal) -> Result<Outcome<QueueEntry>> {
        let principal = validate_principal(principal)?;
        let principal_id = principal.id.clone();

        let removed = with_store(&self.inner.store, "delete_last_by_principal", move |store| {
            store.delete_last_by_principal(&principal_id)
        })
        .await?;

        let Some(entry) = removed else {
            return Err(Error::NotFound(format!(
                "No pending entry to undo for {}",
                principal.id
            )));
        };

        tracing::info!(category = %entry.category, id = entry.id, principal = %principal.id, "Entry undone");
        let kind = QueueEventKind::Undone { id: entry.id };
        Ok(self.publish(Some(entry.category), kind, entry).await)
    }

    /// Termine plusieurs demandes désignées par leurs positions.
    ///
    /// Toutes les positions sont résolues puis autorisées avant la première
    /// mutation : une position invalide ou une seule demande d'autrui (sans
    /// privilège) rejette le lot entier.
    pub async fn remove_many(
        &self,
        positions: &[i64],
        category: &str,
        principal: &Principal,
        privileged: bool,
    ) -> Result<Outcome<RemovalReport>> {
        let category = parse_category(category)?;
        let principal = validate_principal(principal)?;
        if positions.is_empty() {
            return Err(Error::InvalidInput("No position given".into()));
        }
        let positions = positions
            .iter()
            .map(|p| to_position(*p).map(|_| *p))
            .collect::<Result<BTreeSet<i64>>>()?;

        let queue = self.snapshot(Some(category)).await?;

        let missing: Vec<i64> = positions
            .iter()
            .copied()
            .filter(|p| queue.resolve(*p as usize).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Error::NotFound(format!(
                "Positions {:?} not in {} queue of {}",
                missing,
                category,
                queue.len()
            )));
        }

        let targets: Vec<(i64, QueueEntry)> = positions
            .iter()
            .filter_map(|p| queue.resolve(*p as usize).map(|e| (*p, e.clone())))
            .collect();

        if !privileged {
            let forbidden: Vec<i64> = targets
                .iter()
                .filter(|(_, entry)| !entry.is_owned_by(&principal.id))
                .map(|(position, _)| *position)
                .collect();
            if !forbidden.is_empty() {
                tracing::warn!(category = %category, principal = %principal.id, ?forbidden, "Removal refused");
                return Err(Error::Unauthorized {
                    principal: principal.id,
                    category,
                    positions: forbidden,
                });
            }
        }

        Ok(self.remove_targets(category, targets).await)
    }

    /// Termine des demandes déjà résolues et autorisées.
    ///
    /// Chaque demande est traitée indépendamment : un échec n'empêche pas
    /// les suivantes et sa position est rapportée dans `failed_positions`.
    async fn remove_targets(
        &self,
        category: Category,
        targets: Vec<(i64, QueueEntry)>,
    ) -> Outcome<RemovalReport> {
        let mut report = RemovalReport::default();
        for (position, entry) in targets {
            let id = entry.id;
            let result =
                with_store(&self.inner.store, "mark_completed", move |store| store.mark_completed(id))
                    .await;
            match result {
                Ok(true) => report.removed_titles.push(entry.title),
                Ok(false) => {
                    tracing::warn!(category = %category, position, id, "Entry vanished before removal");
                    report.failed_positions.push(position);
                }
                Err(e) => {
                    tracing::warn!(category = %category, position, id, "Failed to remove entry: {}", e);
                    report.failed_positions.push(position);
                }
            }
        }

        if report.removed_titles.is_empty() {
            return Outcome::Applied(report);
        }

        tracing::info!(
            category = %category,
            removed = report.removed_titles.len(),
            failed = report.failed_positions.len(),
            "Entries removed"
        );
        let kind = QueueEventKind::Removed {
            titles: report.removed_titles.clone(),
        };
        self.publish(Some(category), kind, report).await
    }

    /// Pose la note de statut de la demande à `position`
    pub async fn set_note(&self, position: i64, category: &str, note: &str) -> Result<Outcome<bool>> {
        let category = parse_category(category)?;
        let note = non_empty(note, "note")?;
        let entry = self.resolve(position, category).await?;
        let id = entry.id;

        let changed = with_store(&self.inner.store, "set_status_note", move |store| {
            store.set_status_note(id, &note)
        })
        .await?;

        self.finish(category, changed, QueueEventKind::NoteSet { id }).await
    }

    /// Efface la note de statut de la demande à `position`
    pub async fn clear_note(&self, position: i64, category: &str) -> Result<Outcome<bool>> {
        let category = parse_category(category)?;
        let entry = self.resolve(position, category).await?;
        let id = entry.id;

        let changed = with_store(&self.inner.store, "clear_status_note", move |store| {
            store.clear_status_note(id)
        })
        .await?;

        self.finish(category, changed, QueueEventKind::NoteCleared { id }).await
    }

    /// Bascule la demande à `position` entre `pending` et `downloading`
    pub async fn toggle_download(&self, position: i64, category: &str) -> Result<Outcome<bool>> {
        let category = parse_category(category)?;
        let entry = self.resolve(position, category).await?;
        let id = entry.id;

        let changed = with_store(&self.inner.store, "toggle_downloading", move |store| {
            store.toggle_downloading(id)
        })
        .await?;

        self.finish(category, changed, QueueEventKind::DownloadToggled { id })
            .await
    }

    /// Termine toutes les demandes actives d'une catégorie
    pub async fn clear_category(&self, category: &str) -> Result<Outcome<usize>> {
        let category = parse_category(category)?;

        let count = with_store(&self.inner.store, "clear_category", move |store| {
            store.clear_category(category)
        })
        .await?;

        if count == 0 {
            return Ok(Outcome::Applied(0));
        }

        tracing::info!(category = %category, count, "Category cleared");
        Ok(self
            .publish(Some(category), QueueEventKind::Cleared { count }, count)
            .await)
    }

    /// Instantané ordonné des demandes actives
    pub async fn list_active(&self, category: Option<&str>) -> Result<ActiveQueue> {
        let category = category.map(parse_category).transpose()?;
        self.snapshot(category).await
    }

    /// Résumés rendus, une entrée par catégorie du périmètre
    pub async fn list_for_display(&self, category: Option<&str>) -> Result<Vec<RenderedDisplay>> {
        let category = category.map(parse_category).transpose()?;
        self.inner.display.render(category).await
    }

    /// Statistiques de la file et éventuellement d'un contributeur
    pub async fn stats(&self, principal_id: Option<&str>) -> Result<StatsReport> {
        let queue = with_store(&self.inner.store, "aggregate_stats", |store| {
            store.aggregate_stats()
        })
        .await?;

        let contributor = match principal_id {
            Some(id) => {
                let id = self::principal_id(id)?;
                with_store(&self.inner.store, "contribution_stats", move |store| {
                    store.contribution_stats(&id)
                })
                .await?
            }
            None => None,
        };

        Ok(StatsReport { queue, contributor })
    }

    async fn snapshot(&self, category: Option<Category>) -> Result<ActiveQueue> {
        let entries = with_store(&self.inner.store, "list_active", move |store| {
            store.list_active(category)
        })
        .await?;
        Ok(ActiveQueue::new(category, entries))
    }

    async fn resolve(&self, position: i64, category: Category) -> Result<QueueEntry> {
        let index = to_position(position)?;
        let queue = self.snapshot(Some(category)).await?;
        queue.resolve(index).cloned().ok_or_else(|| {
            Error::NotFound(format!(
                "Position {} not in {} queue of {}",
                position,
                category,
                queue.len()
            ))
        })
    }

    async fn finish(
        &self,
        category: Category,
        changed: bool,
        kind: QueueEventKind,
    ) -> Result<Outcome<bool>> {
        if !changed {
            tracing::debug!(category = %category, ?kind, "Mutation had no effect");
            return Ok(Outcome::Applied(false));
        }
        tracing::info!(category = %category, ?kind, "Entry updated");
        Ok(self.publish(Some(category), kind, true).await)
    }

    async fn publish<T>(&self, category: Option<Category>, kind: QueueEventKind, value: T) -> Outcome<T> {
        let event = QueueEvent {
            category,
            kind,
            timestamp: Utc::now(),
        };
        // Ignoré si aucun abonné
        let _ = self.inner.event_tx.send(event);

        let stale = self.inner.display.after_mutation(category).await;
        Outcome::new(value, stale)
    }
}

fn parse_category(value: &str) -> Result<Category> {
    Category::from_str(value)
}

fn to_position(position: i64) -> Result<usize> {
    if position <= 0 {
        return Err(Error::InvalidInput(format!(
            "Position must be positive, got {}",
            position
        )));
    }
    usize::try_from(position)
        .map_err(|_| Error::InvalidInput(format!("Position out of range: {}", position)))
}

fn non_empty(value: &str, what: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("Empty {}", what)));
    }
    Ok(trimmed.to_string())
}

/// Identifiant opaque : rejeté s'il est vide, jamais normalisé
fn principal_id(value: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput("Empty principal id".into()));
    }
    Ok(value.to_string())
}

fn validate_principal(principal: &Principal) -> Result<Principal> {
    let id = principal_id(&principal.id)?;
    let name = match principal.name.trim() {
        "" => id.clone(),
        name => name.to_string(),
    };
    Ok(Principal { id, name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{
        DisplayBinding, DisplayBindings, DisplayError, DisplaySurface, SyncMode, SyncOptions,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_position_validation() {
        assert!(to_position(0).is_err());
        assert!(to_position(-3).is_err());
        assert_eq!(to_position(2).unwrap(), 2);
    }

    #[test]
    fn test_principal_id_is_kept_verbatim() {
        let principal = validate_principal(&Principal::new(" 42 ", "  ")).unwrap();
        assert_eq!(principal.id, " 42 ");
        assert_eq!(principal.name, " 42 ");

        let principal = validate_principal(&Principal::new("42", " alice ")).unwrap();
        assert_eq!(principal.name, "alice");

        assert!(validate_principal(&Principal::new("", "x")).is_err());
        assert!(validate_principal(&Principal::new("   ", "x")).is_err());
    }

    /// Surface qui compte les push
    #[derive(Default)]
    struct CountingSurface {
        pushes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DisplaySurface for CountingSurface {
        async fn push(
            &self,
            _binding: &DisplayBinding,
            _payload: &RenderedDisplay,
        ) -> std::result::Result<(), DisplayError> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting_manager() -> (Arc<CountingSurface>, QueueManager) {
        let store = Arc::new(QueueStore::open_in_memory().unwrap());
        let surface = Arc::new(CountingSurface::default());
        let bindings: DisplayBindings = [(Category::Show, DisplayBinding::new("console", "shows"))]
            .into_iter()
            .collect();
        let options = SyncOptions {
            mode: SyncMode::Inline,
            ..SyncOptions::default()
        };
        let display = DisplaySynchronizer::new(store.clone(), surface.clone(), bindings, options);
        (surface, QueueManager::new(store, display))
    }

    #[tokio::test]
    async fn test_removal_continues_after_entry_failure() {
        let (surface, manager) = counting_manager();
        let alice = Principal::new("A", "alice");

        for title in ["Breaking Bad", "The Wire", "Succession"] {
            manager.submit(title, "show", &alice).await.unwrap();
        }
        let queue = manager.list_active(Some("show")).await.unwrap();
        let targets: Vec<(i64, QueueEntry)> = queue
            .iter()
            .map(|(position, entry)| (position as i64, entry.clone()))
            .collect();

        // Terminée entre la résolution et la suppression
        assert!(manager.store().mark_completed(targets[1].1.id).unwrap());
        let pushes_before = surface.pushes.load(Ordering::SeqCst);
        let mut rx = manager.subscribe_events();

        let report = manager
            .remove_targets(Category::Show, targets)
            .await
            .into_inner();

        assert_eq!(report.removed_titles, vec!["Breaking Bad", "Succession"]);
        assert_eq!(report.failed_positions, vec![2]);
        assert_eq!(surface.pushes.load(Ordering::SeqCst), pushes_before + 1);
        assert!(matches!(rx.try_recv().unwrap().kind, QueueEventKind::Removed { .. }));
        assert!(rx.try_recv().is_err());
        assert!(manager.list_active(Some("show")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_removal_with_no_success_triggers_no_refresh() {
        let (surface, manager) = counting_manager();
        let alice = Principal::new("A", "alice");

        manager.submit("Breaking Bad", "show", &alice).await.unwrap();
        let queue = manager.list_active(Some("show")).await.unwrap();
        let entry = queue.resolve(1).unwrap().clone();
        manager.store().mark_completed(entry.id).unwrap();
        let pushes_before = surface.pushes.load(Ordering::SeqCst);

        let outcome = manager.remove_targets(Category::Show, vec![(1, entry)]).await;

        assert_eq!(outcome.value().failed_positions, vec![1]);
        assert!(outcome.value().removed_titles.is_empty());
        assert_eq!(surface.pushes.load(Ordering::SeqCst), pushes_before);
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = Outcome::new(3, true);
        assert!(outcome.is_display_stale());
        assert_eq!(*outcome.value(), 3);
        assert_eq!(Outcome::new(3, false), Outcome::Applied(3));
    }
}
