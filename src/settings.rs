use crate::input::queue::{sanitize_capacity, DEFAULT_KEY_QUEUE_CAPACITY};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE_NAME: &str = "trayframe.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenterSettings {
    /// Tiles per grid row; the grid is always square.
    pub blocks_per_row: usize,
    /// Key ring size. Clamped to the supported range and rounded up to a
    /// power of two on load.
    pub key_queue_capacity: usize,
    pub window_class_name: String,
    pub window_title: String,
    /// Also read keys through the global low-level hook, not just window
    /// messages.
    pub install_keyboard_hook: bool,
    /// Add and immediately delete one throwaway icon before the real slots.
    /// The shell tends to misplace the first icon a process adds.
    pub prime_first_icon: bool,
    pub debug_logging: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for PresenterSettings {
    fn default() -> Self {
        Self {
            blocks_per_row: 8,
            key_queue_capacity: DEFAULT_KEY_QUEUE_CAPACITY,
            window_class_name: "DoomWindowClass".into(),
            window_title: "Doom".into(),
            install_keyboard_hook: true,
            prime_first_icon: true,
            debug_logging: false,
            log_file: None,
        }
    }
}

impl PresenterSettings {
    pub fn sanitize(&mut self) {
        self.blocks_per_row = self.blocks_per_row.max(1);
        self.key_queue_capacity = sanitize_capacity(self.key_queue_capacity);
        if self.window_class_name.trim().is_empty() {
            self.window_class_name = Self::default().window_class_name;
        }
    }

    /// Loads settings from `path`. A missing or empty file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read settings file {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut loaded: Self = serde_json::from_str(&content)
            .with_context(|| format!("deserialize settings file {}", path.display()))?;
        loaded.sanitize();
        Ok(loaded)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create settings folder {}", parent.display()))?;
        }

        let mut sanitized = self.clone();
        sanitized.sanitize();
        let json = serde_json::to_string_pretty(&sanitized).context("serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("write settings file {}", path.display()))
    }
}

pub fn settings_path_from_exe_path(exe_path: &Path) -> Result<PathBuf> {
    let parent = exe_path
        .parent()
        .ok_or_else(|| anyhow!("executable path has no parent: {}", exe_path.display()))?;
    Ok(parent.join(SETTINGS_FILE_NAME))
}

pub fn resolve_settings_path() -> Result<PathBuf> {
    let exe_path = std::env::current_exe().context("resolve current executable")?;
    settings_path_from_exe_path(&exe_path)
}
