//! Machine à états du cycle de vie d'une demande
//!
//! ```text
//! pending <──toggle──> downloading
//!    │                     │
//!    └──────complete───────┴──> completed (terminal)
//! ```
//!
//! La note de statut est orthogonale à l'état : elle peut être posée ou
//! effacée tant que la demande n'est pas terminée.

use super::EntryStatus;

/// Opération demandée sur une demande
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ToggleDownload,
    Complete,
    SetNote,
    ClearNote,
}

/// Calcule le statut résultant de `action` appliquée à `current`.
///
/// Retourne `None` si la transition est refusée. Une demande terminée
/// refuse toute action : l'appelant répond alors `false` sans erreur.
pub fn next_status(current: EntryStatus, action: Action) -> Option<EntryStatus> {
    match (current, action) {
        (EntryStatus::Completed, _) => None,
        (EntryStatus::Pending, Action::ToggleDownload) => Some(EntryStatus::Downloading),
        (EntryStatus::Downloading, Action::ToggleDownload) => Some(EntryStatus::Pending),
        (_, Action::Complete) => Some(EntryStatus::Completed),
        (status, Action::SetNote | Action::ClearNote) => Some(status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_is_its_own_inverse() {
        let once = next_status(EntryStatus::Pending, Action::ToggleDownload).unwrap();
        assert_eq!(once, EntryStatus::Downloading);
        let twice = next_status(once, Action::ToggleDownload).unwrap();
        assert_eq!(twice, EntryStatus::Pending);
    }

    #[test]
    fn test_complete_from_any_active_state() {
        assert_eq!(
            next_status(EntryStatus::Pending, Action::Complete),
            Some(EntryStatus::Completed)
        );
        assert_eq!(
            next_status(EntryStatus::Downloading, Action::Complete),
            Some(EntryStatus::Completed)
        );
    }

    #[test]
    fn test_completed_is_frozen() {
        for action in [
            Action::ToggleDownload,
            Action::Complete,
            Action::SetNote,
            Action::ClearNote,
        ] {
            assert_eq!(next_status(EntryStatus::Completed, action), None);
        }
    }

    #[test]
    fn test_notes_keep_status() {
        assert_eq!(
            next_status(EntryStatus::Downloading, Action::SetNote),
            Some(EntryStatus::Downloading)
        );
        assert_eq!(
            next_status(EntryStatus::Pending, Action::ClearNote),
            Some(EntryStatus::Pending)
        );
    }
}
