use std::path::Path;

use anyhow::{Context, Result};
use dealmap_core::RegionMeta;
use serde::Deserialize;

const BUILTIN_REGIONS_YAML: &str = include_str!("../../../regions.yaml");

/// District catalog: display metadata and map centers keyed by region code.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionRegistry {
    /// Regions ingested when no explicit list is configured.
    #[serde(default)]
    pub default_regions: Vec<String>,
    pub regions: Vec<RegionMeta>,
}

impl RegionRegistry {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_REGIONS_YAML).context("parsing built-in regions.yaml")
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn get(&self, code: &str) -> Option<&RegionMeta> {
        self.regions.iter().find(|r| r.code == code)
    }

    pub fn meta_or_fallback(&self, code: &str) -> RegionMeta {
        self.get(code)
            .cloned()
            .unwrap_or_else(|| RegionMeta::fallback(code))
    }
}
