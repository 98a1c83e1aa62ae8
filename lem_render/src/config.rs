use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// What to do with a placement whose sprite id is past the ground set's
/// tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSpritePolicy {
    /// Draw nothing for the placement and log a warning.
    #[default]
    Skip,
    /// Abort the render with [`crate::RenderError`].
    Error,
}

/// Colour written by masked objects: `(src & keep) | force`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecolorRule {
    pub keep: u8,
    pub force: u8,
}

impl Default for RecolorRule {
    fn default() -> Self {
        RecolorRule {
            keep: 0x81,
            force: 0x04,
        }
    }
}

impl RecolorRule {
    #[inline]
    pub fn apply(self, src: u8) -> u8 {
        (src & self.keep) | self.force
    }
}

/// Render options, loadable from a JSON preset. Missing fields take their
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub effect_boundaries: bool,
    #[serde(default)]
    pub missing_sprites: MissingSpritePolicy,
    #[serde(default)]
    pub recolor: RecolorRule,
}

pub fn load_render_config(path: &Path) -> Result<RenderConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading render config {}", path.display()))?;
    let config: RenderConfig = serde_json::from_str(&data)
        .with_context(|| format!("parsing render config {}", path.display()))?;
    Ok(config)
}
