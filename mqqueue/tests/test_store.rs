use mqqueue::{Category, EntryStatus, Principal, QueueStore};
use tempfile::TempDir;

/// Crée un store temporaire pour les tests
fn create_test_store() -> (TempDir, QueueStore) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("queue.db");
    let store = QueueStore::open(&db_path).unwrap();
    (temp_dir, store)
}

fn alice() -> Principal {
    Principal::new("A", "alice")
}

fn bob() -> Principal {
    Principal::new("B", "bob")
}

#[test]
fn test_store_open_creates_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("nested").join("queue.db");
    let store = QueueStore::open(&db_path);
    assert!(store.is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_create_and_get_entry() {
    let (_temp_dir, store) = create_test_store();

    let id = store.create_entry("Breaking Bad", Category::Show, &alice()).unwrap();
    let entry = store.get_entry(id).unwrap().unwrap();

    assert_eq!(entry.title, "Breaking Bad");
    assert_eq!(entry.category, Category::Show);
    assert_eq!(entry.added_by, "A");
    assert_eq!(entry.added_by_name, "alice");
    assert_eq!(entry.status, EntryStatus::Pending);
    assert!(entry.status_note.is_none());

    assert!(store.get_entry(id + 100).unwrap().is_none());
}

#[test]
fn test_ids_are_never_reused() {
    let (_temp_dir, store) = create_test_store();

    let first = store.create_entry("One", Category::Movie, &alice()).unwrap();
    let removed = store.delete_last_by_principal("A").unwrap().unwrap();
    assert_eq!(removed.id, first);

    let second = store.create_entry("Two", Category::Movie, &alice()).unwrap();
    assert!(second > first);
}

#[test]
fn test_added_at_is_strictly_increasing() {
    let (_temp_dir, store) = create_test_store();

    let ids: Vec<_> = (0..20)
        .map(|i| store.create_entry(&format!("t{}", i), Category::Anime, &alice()).unwrap())
        .collect();

    let stamps: Vec<_> = ids
        .iter()
        .map(|id| store.get_entry(*id).unwrap().unwrap().added_at)
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_added_at_stays_monotonic_after_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("queue.db");

    let first = {
        let store = QueueStore::open(&db_path).unwrap();
        let id = store.create_entry("Old", Category::Show, &alice()).unwrap();
        store.get_entry(id).unwrap().unwrap().added_at
    };

    let store = QueueStore::open(&db_path).unwrap();
    let id = store.create_entry("New", Category::Show, &alice()).unwrap();
    assert!(store.get_entry(id).unwrap().unwrap().added_at > first);
}

#[test]
fn test_list_active_orders_downloading_first() {
    let (_temp_dir, store) = create_test_store();

    let a = store.create_entry("A", Category::Show, &alice()).unwrap();
    let b = store.create_entry("B", Category::Show, &bob()).unwrap();
    let c = store.create_entry("C", Category::Show, &alice()).unwrap();
    store.create_entry("Dune", Category::Movie, &alice()).unwrap();

    assert!(store.toggle_downloading(c).unwrap());

    let ids: Vec<_> = store
        .list_active(Some(Category::Show))
        .unwrap()
        .iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec![c, a, b]);

    assert_eq!(store.list_active(None).unwrap().len(), 4);
}

#[test]
fn test_completed_is_terminal() {
    let (_temp_dir, store) = create_test_store();

    let id = store.create_entry("Frieren", Category::Anime, &alice()).unwrap();
    assert!(store.mark_completed(id).unwrap());

    assert!(!store.mark_completed(id).unwrap());
    assert!(!store.toggle_downloading(id).unwrap());
    assert!(!store.set_status_note(id, "late").unwrap());
    assert!(!store.clear_status_note(id).unwrap());

    let entry = store.get_entry(id).unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Completed);
    assert!(store.list_active(Some(Category::Anime)).unwrap().is_empty());
}

#[test]
fn test_missing_entry_mutations_return_false() {
    let (_temp_dir, store) = create_test_store();

    assert!(!store.mark_completed(99).unwrap());
    assert!(!store.toggle_downloading(99).unwrap());
    assert!(!store.set_status_note(99, "x").unwrap());
}

#[test]
fn test_note_is_independent_of_status() {
    let (_temp_dir, store) = create_test_store();

    let id = store.create_entry("Frieren", Category::Anime, &alice()).unwrap();
    assert!(store.set_status_note(id, "ep 5 stuck").unwrap());
    assert!(store.toggle_downloading(id).unwrap());
    assert!(store.toggle_downloading(id).unwrap());

    let entry = store.get_entry(id).unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Pending);
    assert_eq!(entry.status_note.as_deref(), Some("ep 5 stuck"));

    assert!(store.clear_status_note(id).unwrap());
    assert!(store.get_entry(id).unwrap().unwrap().status_note.is_none());
}

#[test]
fn test_delete_last_skips_downloading_entries() {
    let (_temp_dir, store) = create_test_store();

    let older = store.create_entry("Older", Category::Show, &alice()).unwrap();
    let newer = store.create_entry("Newer", Category::Show, &alice()).unwrap();
    store.toggle_downloading(newer).unwrap();

    let removed = store.delete_last_by_principal("A").unwrap().unwrap();
    assert_eq!(removed.id, older);

    assert!(store.delete_last_by_principal("A").unwrap().is_none());
    assert!(store.get_entry(newer).unwrap().is_some());
}

#[test]
fn test_contribution_counter_follows_undo() {
    let (_temp_dir, store) = create_test_store();

    let id = store.create_entry("Dune", Category::Movie, &alice()).unwrap();
    store.create_entry("Arrival", Category::Movie, &alice()).unwrap();
    store.mark_completed(id).unwrap();

    let stats = store.contribution_stats("A").unwrap().unwrap();
    assert_eq!(stats.items_added, 2);
    assert!(stats.last_added_at.is_some());

    store.delete_last_by_principal("A").unwrap().unwrap();
    let stats = store.contribution_stats("A").unwrap().unwrap();
    assert_eq!(stats.items_added, 1);

    assert!(store.contribution_stats("nobody").unwrap().is_none());
}

#[test]
fn test_display_name_is_refreshed_on_submit() {
    let (_temp_dir, store) = create_test_store();

    let first = store.create_entry("Dune", Category::Movie, &alice()).unwrap();
    store
        .create_entry("Arrival", Category::Movie, &Principal::new("A", "alice2"))
        .unwrap();

    assert_eq!(store.get_entry(first).unwrap().unwrap().added_by_name, "alice2");
    assert_eq!(
        store.contribution_stats("A").unwrap().unwrap().display_name,
        "alice2"
    );
}

#[test]
fn test_clear_category_and_stats() {
    let (_temp_dir, store) = create_test_store();

    for title in ["Dune", "Arrival", "Heat"] {
        store.create_entry(title, Category::Movie, &alice()).unwrap();
    }
    let show = store.create_entry("The Wire", Category::Show, &bob()).unwrap();
    store.toggle_downloading(show).unwrap();

    assert_eq!(store.clear_category(Category::Movie).unwrap(), 3);
    assert_eq!(store.clear_category(Category::Movie).unwrap(), 0);

    let stats = store.aggregate_stats().unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.downloading, 1);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.by_category[&Category::Show].downloading, 1);
    assert_eq!(stats.by_category[&Category::Movie].active(), 0);
    assert_eq!(stats.by_category[&Category::Anime].active(), 0);
}
