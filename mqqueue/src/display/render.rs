//! Rendu textuel du résumé d'une catégorie

use crate::entry::{Category, QueueEntry};
use crate::ordering::ActiveQueue;
use serde::Serialize;
use std::fmt::Write;

/// Résumé prêt à être poussé vers une surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDisplay {
    pub category: Category,
    pub downloading: usize,
    pub pending: usize,
    pub body: String,
}

impl RenderedDisplay {
    pub fn active(&self) -> usize {
        self.downloading + self.pending
    }
}

/// Rend la file active d'une catégorie : section « Downloading » puis
/// « Pending », chaque ligne préfixée de sa position courante, puis un pied
/// avec les compteurs.
pub fn render(category: Category, queue: &ActiveQueue) -> RenderedDisplay {
    let downloading = queue.downloading();
    let pending = queue.pending();

    let mut body = String::new();
    let _ = writeln!(body, "{} queue", category.heading());

    write_section(&mut body, "Downloading", 1, downloading);
    write_section(&mut body, "Pending", downloading.len() + 1, pending);

    let _ = writeln!(body);
    let _ = write!(
        body,
        "{} in queue | {} downloading | {} pending",
        queue.len(),
        downloading.len(),
        pending.len()
    );

    RenderedDisplay {
        category,
        downloading: downloading.len(),
        pending: pending.len(),
        body,
    }
}

fn write_section(body: &mut String, title: &str, first_position: usize, entries: &[QueueEntry]) {
    let _ = writeln!(body);
    let _ = writeln!(body, "{}", title);

    if entries.is_empty() {
        let _ = writeln!(body, "  (none)");
        return;
    }

    for (offset, entry) in entries.iter().enumerate() {
        let _ = write!(body, "  {}. {}", first_position + offset, entry.title);
        if let Some(note) = &entry.status_note {
            let _ = write!(body, " [{}]", note);
        }
        let _ = writeln!(body);
    }
}
