//! Extension de mqconfig pour la file

use crate::display::{DisplayBindings, SyncMode, SyncOptions};
use crate::entry::Principal;
use crate::settings::{ChannelPolicy, Settings};
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DB_DIR: &[&str] = &["queue", "database", "directory"];
const STORE_TIMEOUT: &[&str] = &["queue", "store", "timeout_ms"];
const DISPLAY_DIR: &[&str] = &["queue", "display", "directory"];
const PUSH_TIMEOUT: &[&str] = &["queue", "display", "push_timeout_ms"];
const DISPLAY_MODE: &[&str] = &["queue", "display", "mode"];
const BINDINGS: &[&str] = &["queue", "display", "bindings"];
const CHANNELS: &[&str] = &["queue", "channels"];

/// Trait d'extension pour mqconfig::Config
pub trait QueueConfigExt {
    /// Chemin de la base de la file (répertoire créé si besoin)
    fn queue_db_path(&self) -> Result<PathBuf>;

    /// Racine des objets d'affichage fichier
    fn display_dir(&self) -> Result<PathBuf>;

    fn store_timeout(&self) -> Duration;

    fn display_push_timeout(&self) -> Duration;

    fn display_sync_mode(&self) -> SyncMode;

    /// Options du synchroniseur lues depuis la configuration
    fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            push_timeout: self.display_push_timeout(),
            mode: self.display_sync_mode(),
        }
    }

    fn display_bindings(&self) -> Result<DisplayBindings>;

    fn queue_channels(&self) -> Result<ChannelPolicy>;

    /// Principal utilisé par l'entrée console
    fn console_principal(&self) -> Principal;

    /// Vrai si la console peut retirer les demandes des autres
    fn console_privileged(&self) -> bool;
}

impl QueueConfigExt for mqconfig::Config {
    fn queue_db_path(&self) -> Result<PathBuf> {
        let dir = self.get_managed_dir(DB_DIR, "data")?;
        Ok(dir.join("queue.db"))
    }

    fn display_dir(&self) -> Result<PathBuf> {
        Ok(self.get_managed_dir(DISPLAY_DIR, "displays")?)
    }

    fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.get_u64_or(STORE_TIMEOUT, 2000))
    }

    fn display_push_timeout(&self) -> Duration {
        Duration::from_millis(self.get_u64_or(PUSH_TIMEOUT, 3000))
    }

    fn display_sync_mode(&self) -> SyncMode {
        let raw = self.get_string_or(DISPLAY_MODE, "background");
        SyncMode::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(value = %raw, "{}, using background", e);
            SyncMode::Background
        })
    }

    fn display_bindings(&self) -> Result<DisplayBindings> {
        Ok(self.get_as(BINDINGS)?.unwrap_or_default())
    }

    fn queue_channels(&self) -> Result<ChannelPolicy> {
        Ok(self.get_as(CHANNELS)?.unwrap_or_default())
    }

    fn console_principal(&self) -> Principal {
        Principal::new(
            self.get_string_or(&["queue", "console", "principal_id"], "console"),
            self.get_string_or(&["queue", "console", "principal_name"], "Console"),
        )
    }

    fn console_privileged(&self) -> bool {
        self.get_bool_or(&["queue", "console", "privileged"], true)
    }
}

impl Settings {
    /// Charge les associations et la politique de canaux
    pub fn load(config: &mqconfig::Config) -> Result<Self> {
        Ok(Self {
            bindings: config.display_bindings()?,
            channels: config.queue_channels()?,
        })
    }

    /// Réécrit les réglages dans la configuration
    pub fn persist(&self, config: &mqconfig::Config) -> Result<()> {
        config.set_as(BINDINGS, &self.bindings)?;
        config.set_as(CHANNELS, &self.channels)?;
        tracing::debug!(bindings = self.bindings.len(), "Queue settings persisted");
        Ok(())
    }
}
