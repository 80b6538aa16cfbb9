#![cfg(feature = "mqconfig")]

use mqconfig::Config;
use mqqueue::{Category, ChannelPolicy, DisplayBinding, QueueConfigExt, Settings, SyncMode};
use std::time::Duration;
use tempfile::TempDir;

fn create_test_config() -> (TempDir, Config) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();
    (temp_dir, config)
}

#[test]
fn test_defaults() {
    let (temp_dir, config) = create_test_config();

    let db_path = config.queue_db_path().unwrap();
    assert_eq!(db_path, temp_dir.path().join("data").join("queue.db"));
    assert!(temp_dir.path().join("data").is_dir());
    assert!(config.display_dir().unwrap().is_dir());

    assert_eq!(config.store_timeout(), Duration::from_millis(2000));
    assert_eq!(config.display_push_timeout(), Duration::from_millis(3000));
    assert_eq!(config.display_sync_mode(), SyncMode::Background);

    let principal = config.console_principal();
    assert_eq!(principal.id, "console");
    assert_eq!(principal.name, "Console");
    assert!(config.console_privileged());

    let settings = Settings::load(&config).unwrap();
    assert!(settings.bindings.is_empty());
    assert!(settings.channels.accepts("anything"));
}

#[test]
fn test_unknown_mode_falls_back_to_background() {
    let (_temp_dir, config) = create_test_config();

    config
        .set_value(&["queue", "display", "mode"], "eventually".into())
        .unwrap();
    assert_eq!(config.display_sync_mode(), SyncMode::Background);

    config
        .set_value(&["queue", "display", "mode"], "inline".into())
        .unwrap();
    assert_eq!(config.sync_options().mode, SyncMode::Inline);
}

#[test]
fn test_settings_persist_across_reload() {
    let (temp_dir, config) = create_test_config();

    let mut settings = Settings::load(&config).unwrap();
    settings
        .bindings
        .insert(Category::Anime, DisplayBinding::new("console", "a1"));
    settings.channels = ChannelPolicy::new(["requests"]);
    settings.persist(&config).unwrap();
    drop(config);

    let config = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();
    let reloaded = Settings::load(&config).unwrap();
    assert_eq!(reloaded, settings);
    assert!(!reloaded.channels.accepts("general"));
}
