//! Modèle de données : demandes, catégories, statuts et contributeurs

pub mod lifecycle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifiant d'une demande, attribué par le store et jamais réutilisé
pub type EntryId = i64;

/// Catégorie d'une demande (fixée à la création)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Show,
    Movie,
    Anime,
}

impl Category {
    /// Toutes les catégories, dans l'ordre d'affichage
    pub const ALL: [Category; 3] = [Category::Show, Category::Movie, Category::Anime];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Category::Show => "show",
            Category::Movie => "movie",
            Category::Anime => "anime",
        }
    }

    /// Titre de section utilisé pour l'affichage
    pub const fn heading(&self) -> &'static str {
        match self {
            Category::Show => "Shows",
            Category::Movie => "Movies",
            Category::Anime => "Anime",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "show" => Ok(Category::Show),
            "movie" => Ok(Category::Movie),
            "anime" => Ok(Category::Anime),
            _ => Err(crate::Error::InvalidCategory(s.to_string())),
        }
    }
}

/// Statut d'une demande
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Downloading,
    /// Terminal : la demande reste en base comme historique
    Completed,
}

impl EntryStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Downloading => "downloading",
            EntryStatus::Completed => "completed",
        }
    }

    pub const fn is_active(&self) -> bool {
        !matches!(self, EntryStatus::Completed)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "downloading" => Ok(EntryStatus::Downloading),
            "completed" => Ok(EntryStatus::Completed),
            other => Err(crate::Error::Storage(format!("Unknown status: {}", other))),
        }
    }
}

/// Acteur externe à l'origine d'une opération (identité opaque)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Une demande de la file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub title: String,
    pub category: Category,
    pub added_by: String,
    /// Dernier nom connu du contributeur
    pub added_by_name: String,
    pub added_at: DateTime<Utc>,
    pub status: EntryStatus,
    pub status_note: Option<String>,
}

impl QueueEntry {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_owned_by(&self, principal_id: &str) -> bool {
        self.added_by == principal_id
    }
}

/// Statistiques de contribution d'un principal
///
/// `items_added` n'est pas borné : une annulation peut le rendre négatif.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributionStats {
    pub principal_id: String,
    pub display_name: String,
    pub items_added: i64,
    pub last_added_at: Option<DateTime<Utc>>,
}
