//! Proxy node configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::util::{Error, Result};

/// When the bounding-box cache is dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundsInvalidation {
    /// Clear on structural changes and on every contents change.
    #[default]
    Conservative,
    /// Clear on structural changes and on edits to attributes that feed
    /// bounds (`extent`, `visibility`, `purpose`, `xformOp:*`). Other value
    /// edits keep cached bounds.
    StructuralOnly,
}

impl BoundsInvalidation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "conservative" => Some(Self::Conservative),
            "structural_only" | "structural" => Some(Self::StructuralOnly),
            _ => None,
        }
    }
}

/// Settings shared by proxy nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Anchor for relative file paths (the scene file's directory).
    pub scene_directory: Option<PathBuf>,
    pub bounds_invalidation: BoundsInvalidation,
    /// Initial value of the share-stage input on new nodes.
    pub default_share_stage: bool,
    /// Tag used for the anonymous root layer of nodes without a file.
    pub anonymous_root_tag: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            scene_directory: None,
            bounds_invalidation: BoundsInvalidation::Conservative,
            default_share_stage: true,
            anonymous_root_tag: "anonymousLayer1".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Default config file location
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("stage-proxy");
            p.push("config.json");
            p
        })
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| Error::other(format!("{}: {e}", path.display())))
    }

    /// Config file at [`Self::path`] if present, then environment overrides.
    pub fn load_default() -> Self {
        let config = Self::path()
            .filter(|p| p.exists())
            .and_then(|p| match Self::load(&p) {
                Ok(c) => Some(c),
                Err(err) => {
                    tracing::warn!(path = %p.display(), error = %err, "ignoring unreadable config");
                    None
                }
            })
            .unwrap_or_default();
        config.with_env()
    }

    /// Apply `STAGE_PROXY_SCENE_DIR` and `STAGE_PROXY_BOUNDS`.
    pub fn with_env(mut self) -> Self {
        if let Ok(dir) = std::env::var("STAGE_PROXY_SCENE_DIR") {
            if !dir.is_empty() {
                self.scene_directory = Some(PathBuf::from(dir));
            }
        }
        if let Ok(policy) = std::env::var("STAGE_PROXY_BOUNDS") {
            match BoundsInvalidation::from_name(&policy) {
                Some(p) => self.bounds_invalidation = p,
                None => tracing::warn!(%policy, "unknown STAGE_PROXY_BOUNDS value"),
            }
        }
        self
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::other(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Resolve a node file path. Relative paths are anchored at the scene
    /// directory when `relative` is set.
    pub fn resolve_file_path(&self, file_path: &str, relative: bool) -> PathBuf {
        let path = Path::new(file_path);
        match (&self.scene_directory, relative && path.is_relative()) {
            (Some(dir), true) => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}
