//! Surfaces d'affichage externes

use super::{DisplayBinding, DisplayError, RenderedDisplay};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Surface capable d'écraser le contenu d'un objet d'affichage existant
///
/// Le push est idempotent : pousser deux fois le même rendu laisse l'objet
/// dans le même état.
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    async fn push(
        &self,
        binding: &DisplayBinding,
        payload: &RenderedDisplay,
    ) -> Result<(), DisplayError>;
}

/// Surface fichier : chaque objet est un fichier texte
/// `<racine>/<surface_id>/<object_id>.txt`.
///
/// Un fichier supprimé joue le rôle d'un message effacé : le push échoue
/// avec [`DisplayError::ObjectMissing`] au lieu de recréer l'objet.
#[derive(Debug, Clone)]
pub struct FileSurface {
    root: PathBuf,
}

impl FileSurface {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Chemin du fichier d'un objet
    pub fn object_path(&self, binding: &DisplayBinding) -> Result<PathBuf, DisplayError> {
        check_component(&binding.surface_id)?;
        check_component(&binding.object_id)?;
        Ok(self
            .root
            .join(&binding.surface_id)
            .join(format!("{}.txt", binding.object_id)))
    }

    /// Crée un nouvel objet vide sur une surface et retourne son association
    pub async fn provision(&self, surface_id: &str) -> Result<DisplayBinding, DisplayError> {
        let binding = DisplayBinding::new(surface_id, uuid::Uuid::new_v4().to_string());
        let path = self.object_path(&binding)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DisplayError::Transport(format!("Failed to create surface: {}", e)))?;
        }
        tokio::fs::write(&path, b"")
            .await
            .map_err(|e| DisplayError::Transport(format!("Failed to create object: {}", e)))?;

        tracing::info!(binding = %binding, "Provisioned display object");
        Ok(binding)
    }

    /// Supprime un objet (l'association devient orpheline)
    pub async fn delete(&self, binding: &DisplayBinding) -> Result<(), DisplayError> {
        let path = self.object_path(binding)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| DisplayError::Transport(format!("Failed to delete object: {}", e)))
    }

    /// Vrai si l'objet existe encore
    pub async fn exists(&self, binding: &DisplayBinding) -> bool {
        match self.object_path(binding) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl DisplaySurface for FileSurface {
    async fn push(
        &self,
        binding: &DisplayBinding,
        payload: &RenderedDisplay,
    ) -> Result<(), DisplayError> {
        if !self.exists(binding).await {
            return Err(DisplayError::ObjectMissing(binding.clone()));
        }

        let path = self.object_path(binding)?;
        tokio::fs::write(&path, payload.body.as_bytes())
            .await
            .map_err(|e| DisplayError::Transport(format!("Failed to write {}: {}", path.display(), e)))
    }
}

fn check_component(value: &str) -> Result<(), DisplayError> {
    let valid = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(DisplayError::Transport(format!(
            "Invalid display reference: {:?}",
            value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Category;

    fn payload(body: &str) -> RenderedDisplay {
        RenderedDisplay {
            category: Category::Movie,
            downloading: 0,
            pending: 1,
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_push_overwrites_provisioned_object() {
        let dir = tempfile::tempdir().unwrap();
        let surface = FileSurface::new(dir.path());

        let binding = surface.provision("console").await.unwrap();
        surface.push(&binding, &payload("first")).await.unwrap();
        surface.push(&binding, &payload("second")).await.unwrap();

        let path = surface.object_path(&binding).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_push_to_deleted_object_fails() {
        let dir = tempfile::tempdir().unwrap();
        let surface = FileSurface::new(dir.path());

        let binding = surface.provision("console").await.unwrap();
        surface.delete(&binding).await.unwrap();

        let err = surface.push(&binding, &payload("x")).await.unwrap_err();
        assert!(matches!(err, DisplayError::ObjectMissing(_)));
    }

    #[test]
    fn test_references_cannot_escape_root() {
        let surface = FileSurface::new("/tmp/displays");
        assert!(surface
            .object_path(&DisplayBinding::new("..", "x"))
            .is_err());
        assert!(surface
            .object_path(&DisplayBinding::new("console", "a/b"))
            .is_err());
        assert!(surface
            .object_path(&DisplayBinding::new("console", "abc"))
            .is_ok());
    }
}
