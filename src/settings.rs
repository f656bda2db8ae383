// src/settings.rs
use crate::codec::TileFormat;
use crate::command::{CommandStack, DEFAULT_CAPACITY};
use crate::error::MapError;
use crate::format::{ReadOptions, SaveFormatId, WriteOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Editor preferences persisted as JSON. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Undo history length, never below one.
    pub command_capacity: usize,
    /// Tile layer format given to new maps.
    pub tile_format: TileFormat,
    pub use_external_tilesets: bool,
    pub use_indentation: bool,
    pub fold_tile_layer_data: bool,
    pub strict_mode: bool,
    pub preferred_format: SaveFormatId,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_CAPACITY,
            tile_format: TileFormat::plain(),
            use_external_tilesets: false,
            use_indentation: true,
            fold_tile_layer_data: false,
            strict_mode: false,
            preferred_format: SaveFormatId::default(),
        }
    }
}

/// Settings read from disk, plus why they were reset to defaults if the
/// file could not be used.
#[derive(Debug, Clone)]
pub struct LoadSettingsResult {
    pub settings: EditorSettings,
    pub reset_reason: Option<String>,
}

impl EditorSettings {
    /// Loads settings from `path`. A missing file yields defaults silently;
    /// an unreadable or corrupt one yields defaults and a reset reason.
    pub fn load(path: &Path) -> LoadSettingsResult {
        let (settings, reset_reason) = if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(json) => match serde_json::from_str::<EditorSettings>(&json) {
                    Ok(settings) => {
                        info!("loaded settings from {}", path.display());
                        (settings, None)
                    }
                    Err(e) => {
                        warn!("failed to parse settings file: {e}");
                        (
                            EditorSettings::default(),
                            Some(format!("settings file was corrupted: {e}")),
                        )
                    }
                },
                Err(e) => {
                    warn!("failed to read settings file: {e}");
                    (
                        EditorSettings::default(),
                        Some(format!("could not read settings file: {e}")),
                    )
                }
            }
        } else {
            info!("no settings file at {}, using defaults", path.display());
            (EditorSettings::default(), None)
        };

        LoadSettingsResult {
            settings: settings.sanitized(),
            reset_reason,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), MapError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| MapError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| MapError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| MapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("settings saved to {}", path.display());
        Ok(())
    }

    fn sanitized(mut self) -> Self {
        self.command_capacity = self.command_capacity.max(1);
        if let Err(e) = self.tile_format.validate() {
            warn!("invalid tile format in settings ({e}), using plain text");
            self.tile_format = TileFormat::plain();
        }
        self
    }

    pub fn command_stack(&self) -> CommandStack {
        CommandStack::new(self.command_capacity)
    }

    pub fn read_options(&self, base_dir: impl Into<PathBuf>) -> ReadOptions {
        ReadOptions {
            base_dir: base_dir.into(),
            strict_mode: self.strict_mode,
        }
    }

    pub fn write_options(&self, base_dir: impl Into<PathBuf>) -> WriteOptions {
        WriteOptions {
            base_dir: base_dir.into(),
            use_external_tilesets: self.use_external_tilesets,
            use_indentation: self.use_indentation,
            fold_tile_layer_data: self.fold_tile_layer_data,
        }
    }
}
