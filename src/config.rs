use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{MacroError, Result};

/// Where imported quest-pack macro files live.
///
/// ```toml
/// streaming_assets = "Game/StreamingAssets"
/// quest_packs_dir = "QuestPacks"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MacroConfig {
    pub streaming_assets: PathBuf,
    pub quest_packs_dir: String,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            streaming_assets: PathBuf::from("StreamingAssets"),
            quest_packs_dir: "QuestPacks".to_string(),
        }
    }
}

impl MacroConfig {
    pub fn from_toml_str(source: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| MacroError::Config {
            file: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Root directory that import paths are relative to
    pub fn quest_pack_root(&self) -> PathBuf {
        self.streaming_assets.join(&self.quest_packs_dir)
    }
}
