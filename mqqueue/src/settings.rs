//! État de configuration de la file : associations d'affichage et canaux
//!
//! Chargé une fois au démarrage et réécrit par l'appelant après un
//! changement ; rien ne relit la configuration pendant une mutation.

use crate::display::DisplayBindings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Surfaces depuis lesquelles les demandes sont acceptées
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelPolicy {
    queue_channels: BTreeSet<String>,
}

impl ChannelPolicy {
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue_channels: channels.into_iter().map(Into::into).collect(),
        }
    }

    /// Vrai si la surface peut soumettre ; une politique vide accepte tout.
    pub fn accepts(&self, surface_id: &str) -> bool {
        self.queue_channels.is_empty() || self.queue_channels.contains(surface_id)
    }

    /// Ajoute une surface ; `false` si elle y était déjà
    pub fn allow(&mut self, surface_id: impl Into<String>) -> bool {
        self.queue_channels.insert(surface_id.into())
    }

    pub fn revoke(&mut self, surface_id: &str) -> bool {
        self.queue_channels.remove(surface_id)
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.queue_channels.iter().map(String::as_str)
    }
}

/// Réglages persistés de la file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub bindings: DisplayBindings,
    pub channels: ChannelPolicy,
}
