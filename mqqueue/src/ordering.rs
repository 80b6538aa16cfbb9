//! Ordre d'affichage et résolution des positions
//!
//! Les positions ne sont jamais stockées : elles sont recalculées à partir
//! d'un instantané de la file à chaque requête.

use crate::entry::{Category, EntryStatus, QueueEntry};
use std::cmp::Ordering;

/// Trie des demandes actives : `downloading` d'abord, puis `pending`,
/// chaque groupe par date d'ajout croissante (l'id départage).
pub fn sort_active(entries: &mut [QueueEntry]) {
    entries.sort_by(compare_active);
}

fn rank(status: EntryStatus) -> u8 {
    match status {
        EntryStatus::Downloading => 0,
        EntryStatus::Pending => 1,
        EntryStatus::Completed => 2,
    }
}

fn compare_active(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    rank(a.status)
        .cmp(&rank(b.status))
        .then(a.added_at.cmp(&b.added_at))
        .then(a.id.cmp(&b.id))
}

/// Instantané ordonné des demandes actives d'une catégorie
#[derive(Debug, Clone, Default)]
pub struct ActiveQueue {
    entries: Vec<QueueEntry>,
}

impl ActiveQueue {
    /// Construit la vue ; les demandes terminées sont écartées.
    pub fn new(category: Option<Category>, entries: Vec<QueueEntry>) -> Self {
        let mut entries: Vec<QueueEntry> = entries
            .into_iter()
            .filter(|e| e.is_active() && category.map_or(true, |c| e.category == c))
            .collect();
        sort_active(&mut entries);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Demande à la position `position` (base 1), `None` hors de `[1, len]`.
    pub fn resolve(&self, position: usize) -> Option<&QueueEntry> {
        position
            .checked_sub(1)
            .and_then(|index| self.entries.get(index))
    }

    /// Itère sur `(position, demande)`
    pub fn iter(&self) -> impl Iterator<Item = (usize, &QueueEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (i + 1, e))
    }

    pub fn downloading(&self) -> &[QueueEntry] {
        &self.entries[..self.split()]
    }

    pub fn pending(&self) -> &[QueueEntry] {
        &self.entries[self.split()..]
    }

    fn split(&self) -> usize {
        self.entries
            .iter()
            .position(|e| e.status != EntryStatus::Downloading)
            .unwrap_or(self.entries.len())
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }
}
