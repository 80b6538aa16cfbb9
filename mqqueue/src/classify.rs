//! Détection des demandes dans un texte libre
//!
//! Un message contenant `(show)`, `(movie)` ou `(anime)` demande l'ajout du
//! texte qui précède le marqueur.

use crate::entry::Category;

/// Catégorie et titre extraits d'un message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub category: Category,
    pub title: String,
}

/// Classe un message : la première catégorie (dans l'ordre show, movie,
/// anime) dont le marqueur apparaît l'emporte. Le titre est le texte avant
/// la première occurrence du marqueur, sans espaces autour.
///
/// Retourne `None` sans marqueur ou si le titre est vide.
pub fn classify(text: &str) -> Option<Classified> {
    // Minuscules ASCII : les offsets restent valides dans `text`
    let lowered = text.to_ascii_lowercase();

    Category::ALL.iter().find_map(|category| {
        let marker = format!("({})", category.as_str());
        let index = lowered.find(&marker)?;
        let title = text[..index].trim();
        if title.is_empty() {
            return None;
        }
        Some(Classified {
            category: *category,
            title: title.to_string(),
        })
    })
}

/// Message d'annonce d'un ajout
pub fn announcement(principal_name: &str, classified: &Classified) -> String {
    format!(
        "{} has added the {} {} to the queue!",
        principal_name, classified.category, classified.title
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_markers() {
        let show = classify("Breaking Bad (show)").unwrap();
        assert_eq!(show.category, Category::Show);
        assert_eq!(show.title, "Breaking Bad");

        let movie = classify("  Dune Part Two   (Movie) please").unwrap();
        assert_eq!(movie.category, Category::Movie);
        assert_eq!(movie.title, "Dune Part Two");

        let anime = classify("Frieren (ANIME)").unwrap();
        assert_eq!(anime.category, Category::Anime);
    }

    #[test]
    fn test_no_marker_or_empty_title() {
        assert!(classify("just chatting").is_none());
        assert!(classify("(show)").is_none());
        assert!(classify("show").is_none());
    }

    #[test]
    fn test_show_marker_wins_over_later_categories() {
        let classified = classify("Cowboy Bebop (anime) (show)").unwrap();
        assert_eq!(classified.category, Category::Show);
        assert_eq!(classified.title, "Cowboy Bebop (anime)");
    }

    #[test]
    fn test_non_ascii_titles_keep_their_bytes() {
        let classified = classify("Amélie (MOVIE)").unwrap();
        assert_eq!(classified.title, "Amélie");
    }

    #[test]
    fn test_announcement() {
        let classified = classify("The Wire (show)").unwrap();
        assert_eq!(
            announcement("alice", &classified),
            "alice has added the show The Wire to the queue!"
        );
    }
}
