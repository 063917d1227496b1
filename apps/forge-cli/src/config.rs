use std::path::Path;

use anyhow::Context;
use forge_physics::PhysicsConfig;
use forge_render::RendererConfig;
use serde::{Deserialize, Serialize};

/// Engine settings; every field falls back to its default when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub renderer: RendererConfig,
    pub physics: PhysicsConfig,
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(?config, "loaded config");
        Ok(config)
    }
}
