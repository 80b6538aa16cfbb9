//! Types d'erreurs pour mqqueue

use crate::entry::Category;

/// Familles d'erreurs exposées aux appelants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Entrée rejetée avant tout accès au stockage
    InvalidInput,
    /// Position hors limites ou rien à annuler
    NotFound,
    /// Lot refusé en entier, aucune mutation
    Unauthorized,
    /// Échec du stockage ; la mutation peut ne pas être appliquée
    Storage,
}

/// Erreurs de gestion de la file
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown category: {0}")]
    InvalidCategory(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Principal {principal} may not remove positions {positions:?} in {category}")]
    Unauthorized {
        principal: String,
        category: Category,
        positions: Vec<i64>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Rattache l'erreur à sa famille.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) | Error::InvalidCategory(_) => ErrorKind::InvalidInput,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Unauthorized { .. } => ErrorKind::Unauthorized,
            Error::Storage(_) | Error::Other(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn storage(context: &'static str) -> impl FnOnce(rusqlite::Error) -> Error {
        move |e| Error::Storage(format!("{}: {}", context, e))
    }
}

/// Type Result spécialisé pour mqqueue
pub type Result<T> = std::result::Result<T, Error>;
