//! Affichage des files : rendu, surfaces externes et synchronisation
//!
//! L'affichage est au mieux : un échec de push ne remonte jamais jusqu'à
//! l'appelant d'une mutation, il marque seulement la catégorie comme
//! périmée jusqu'au prochain push réussi.

pub mod render;
pub mod surface;
pub mod sync;

use crate::entry::Category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use render::{render, RenderedDisplay};
pub use surface::{DisplaySurface, FileSurface};
pub use sync::{DisplaySynchronizer, SyncOptions};

/// Référence souple vers l'objet qui affiche le résumé d'une catégorie
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayBinding {
    pub surface_id: String,
    pub object_id: String,
}

impl DisplayBinding {
    pub fn new(surface_id: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            surface_id: surface_id.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for DisplayBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.surface_id, self.object_id)
    }
}

/// Associations catégorie → objet d'affichage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayBindings(BTreeMap<Category, DisplayBinding>);

impl DisplayBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: Category) -> Option<&DisplayBinding> {
        self.0.get(&category)
    }

    /// Associe une catégorie ; retourne l'association précédente
    pub fn insert(&mut self, category: Category, binding: DisplayBinding) -> Option<DisplayBinding> {
        self.0.insert(category, binding)
    }

    pub fn remove(&mut self, category: Category) -> Option<DisplayBinding> {
        self.0.remove(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &DisplayBinding)> {
        self.0.iter().map(|(c, b)| (*c, b))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Category, DisplayBinding)> for DisplayBindings {
    fn from_iter<I: IntoIterator<Item = (Category, DisplayBinding)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Erreurs de push, journalisées et jamais propagées aux mutations
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("Display object {0} no longer exists")]
    ObjectMissing(DisplayBinding),

    #[error("Display transport error: {0}")]
    Transport(String),

    #[error("Display push timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to render display: {0}")]
    Render(String),
}

/// Manière dont une mutation déclenche le rafraîchissement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Push dans une tâche détachée ; la mutation rend la main aussitôt
    #[default]
    Background,
    /// La mutation attend le push (borné) et rapporte son résultat
    Inline,
}

impl FromStr for SyncMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "background" => Ok(SyncMode::Background),
            "inline" => Ok(SyncMode::Inline),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown display mode: {}",
                other
            ))),
        }
    }
}

/// Résultat du rafraîchissement d'une catégorie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Affichage à jour
    Synced,
    /// Aucun objet associé : rendu ignoré
    Unbound,
    /// Le push a échoué, l'affichage montre un état antérieur
    Stale,
}
