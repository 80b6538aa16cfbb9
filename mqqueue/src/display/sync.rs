//! DisplaySynchronizer : réconciliation entre la file et les objets affichés

use super::{render, DisplayBinding, DisplayBindings, DisplayError, DisplaySurface, RenderedDisplay, SyncMode, SyncStatus};
use crate::entry::Category;
use crate::ordering::ActiveQueue;
use crate::persistence::{with_store, QueueStore};
use crate::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

/// Délai par défaut d'un push
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Réglages du synchroniseur
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub push_timeout: Duration,
    pub mode: SyncMode,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            mode: SyncMode::default(),
        }
    }
}

struct SyncInner {
    store: Arc<QueueStore>,
    surface: Arc<dyn DisplaySurface>,
    bindings: RwLock<DisplayBindings>,
    stale: Mutex<HashSet<Category>>,
    // Rendu et push sous le même verrou : un rendu ancien n'écrase jamais
    // un rendu plus récent.
    push_lock: tokio::sync::Mutex<()>,
    options: SyncOptions,
}

/// Synchroniseur d'affichage, partagé par clonage
#[derive(Clone)]
pub struct DisplaySynchronizer {
    inner: Arc<SyncInner>,
}

impl DisplaySynchronizer {
    pub fn new(
        store: Arc<QueueStore>,
        surface: Arc<dyn DisplaySurface>,
        bindings: DisplayBindings,
        options: SyncOptions,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                store,
                surface,
                bindings: RwLock::new(bindings),
                stale: Mutex::new(HashSet::new()),
                push_lock: tokio::sync::Mutex::new(()),
                options,
            }),
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.inner.options.mode
    }

    /// Associe un objet d'affichage à une catégorie.
    ///
    /// Retourne l'association remplacée. Le nouvel objet n'est pas encore
    /// poussé : l'appelant déclenche [`refresh`](Self::refresh).
    pub fn bind(&self, category: Category, binding: DisplayBinding) -> Option<DisplayBinding> {
        tracing::info!(category = %category, binding = %binding, "Display bound");
        let previous = self
            .inner
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(category, binding);
        self.set_stale(category, false);
        previous
    }

    pub fn unbind(&self, category: Category) -> Option<DisplayBinding> {
        let previous = self
            .inner
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(category);
        self.set_stale(category, false);
        if let Some(binding) = &previous {
            tracing::info!(category = %category, binding = %binding, "Display unbound");
        }
        previous
    }

    pub fn binding(&self, category: Category) -> Option<DisplayBinding> {
        self.inner
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(category)
            .cloned()
    }

    /// Copie des associations courantes, à persister par l'appelant
    pub fn bindings(&self) -> DisplayBindings {
        self.inner
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Vrai si le dernier push de la catégorie a échoué
    pub fn is_stale(&self, category: Category) -> bool {
        self.inner
            .stale
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&category)
    }

    fn set_stale(&self, category: Category, stale: bool) {
        let mut set = self.inner.stale.lock().unwrap_or_else(PoisonError::into_inner);
        if stale {
            set.insert(category);
        } else {
            set.remove(&category);
        }
    }

    /// Rend les résumés sans rien pousser
    pub async fn render(&self, scope: Option<Category>) -> Result<Vec<RenderedDisplay>> {
        let entries = with_store(&self.inner.store, "list_active", move |store| {
            store.list_active(scope)
        })
        .await?;

        Ok(categories(scope)
            .into_iter()
            .map(|category| render(category, &ActiveQueue::new(Some(category), entries.clone())))
            .collect())
    }

    /// Rend puis pousse chaque catégorie du périmètre.
    ///
    /// Les échecs sont journalisés et marquent la catégorie périmée ; aucune
    /// nouvelle tentative n'est faite.
    pub async fn refresh(&self, scope: Option<Category>) -> Vec<(Category, SyncStatus)> {
        let _guard = self.inner.push_lock.lock().await;

        let mut statuses = Vec::new();
        for category in categories(scope) {
            let status = match self.binding(category) {
                None => {
                    tracing::debug!(category = %category, "No display bound, render skipped");
                    SyncStatus::Unbound
                }
                Some(binding) => match self.push_category(category, &binding).await {
                    Ok(()) => {
                        self.set_stale(category, false);
                        SyncStatus::Synced
                    }
                    Err(e) => {
                        tracing::warn!(category = %category, binding = %binding, "Display push failed: {}", e);
                        self.set_stale(category, true);
                        SyncStatus::Stale
                    }
                },
            };
            statuses.push((category, status));
        }
        statuses
    }

    async fn push_category(
        &self,
        category: Category,
        binding: &DisplayBinding,
    ) -> std::result::Result<(), DisplayError> {
        let entries = with_store(&self.inner.store, "list_active", move |store| {
            store.list_active(Some(category))
        })
        .await
        .map_err(|e| DisplayError::Render(e.to_string()))?;

        let payload = render(category, &ActiveQueue::new(Some(category), entries));
        let timeout = self.inner.options.push_timeout;

        match tokio::time::timeout(timeout, self.inner.surface.push(binding, &payload)).await {
            Ok(result) => result,
            Err(_) => Err(DisplayError::Timeout(timeout)),
        }
    }

    /// Rafraîchissement demandé par une mutation appliquée.
    ///
    /// Retourne vrai si l'affichage du périmètre est périmé : résultat du push
    /// en mode `Inline`, dernier état connu en mode `Background`.
    pub(crate) async fn after_mutation(&self, scope: Option<Category>) -> bool {
        match self.mode() {
            SyncMode::Inline => self
                .refresh(scope)
                .await
                .iter()
                .any(|(_, status)| *status == SyncStatus::Stale),
            SyncMode::Background => {
                let stale = categories(scope).into_iter().any(|c| self.is_stale(c));
                let sync = self.clone();
                tokio::spawn(async move {
                    sync.refresh(scope).await;
                });
                stale
            }
        }
    }
}

fn categories(scope: Option<Category>) -> Vec<Category> {
    match scope {
        Some(category) => vec![category],
        None => Category::ALL.to_vec(),
    }
}
