//! In-memory definition registry.
//!
//! Definitions can be registered in code or loaded from a directory laid out
//! as `layouts/`, `regions/` and `blocks/`, one YAML or JSON file per
//! definition.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{
    BlockDefinition, DefinitionError, DefinitionId, DefinitionKind, DefinitionProvider,
    LayoutDefinition, RegionDefinition,
};

/// Maximum definition file size (1 MB).
const MAX_DEFINITION_FILE_SIZE: u64 = 1024 * 1024;

/// Definitions held in memory, keyed by `(name, version)`.
#[derive(Debug, Clone, Default)]
pub struct DefinitionRegistry {
    layouts: HashMap<DefinitionId, LayoutDefinition>,
    regions: HashMap<DefinitionId, RegionDefinition>,
    blocks: HashMap<DefinitionId, BlockDefinition>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_layout(&mut self, layout: LayoutDefinition) {
        let id = DefinitionId::new(layout.name.clone(), layout.version);
        self.layouts.insert(id, layout);
    }

    pub fn insert_region(&mut self, region: RegionDefinition) {
        let id = DefinitionId::new(region.name.clone(), region.version);
        self.regions.insert(id, region);
    }

    pub fn insert_block(&mut self, block: BlockDefinition) {
        self.blocks.insert(block.id(), block);
    }

    /// Register a definition given as a JSON value.
    pub fn insert_value(
        &mut self,
        kind: DefinitionKind,
        value: serde_json::Value,
    ) -> Result<(), DefinitionError> {
        match kind {
            DefinitionKind::Layout => self.insert_layout(from_value(value)?),
            DefinitionKind::Region => self.insert_region(from_value(value)?),
            DefinitionKind::Block => self.insert_block(from_value(value)?),
        }
        Ok(())
    }

    /// Number of registered definitions of a kind.
    pub fn count(&self, kind: DefinitionKind) -> usize {
        match kind {
            DefinitionKind::Layout => self.layouts.len(),
            DefinitionKind::Region => self.regions.len(),
            DefinitionKind::Block => self.blocks.len(),
        }
    }

    /// Load every definition under `dir`.
    ///
    /// Missing kind directories are skipped. Files other than `.yml`,
    /// `.yaml` and `.json` are ignored.
    pub async fn load_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();

        for kind in [
            DefinitionKind::Layout,
            DefinitionKind::Region,
            DefinitionKind::Block,
        ] {
            let kind_dir = dir.join(kind.dir_name());
            let exists = tokio::fs::try_exists(&kind_dir)
                .await
                .with_context(|| format!("failed to check {}", kind_dir.display()))?;
            if !exists {
                debug!(dir = %kind_dir.display(), "definition directory missing, skipping");
                continue;
            }

            let mut entries = tokio::fs::read_dir(&kind_dir)
                .await
                .with_context(|| format!("failed to read {}", kind_dir.display()))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .context("failed to read definition directory entry")?
            {
                let path = entry.path();
                let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                    continue;
                };
                if !matches!(ext, "yml" | "yaml" | "json") {
                    continue;
                }

                let meta = entry.metadata().await.context("failed to stat definition")?;
                if meta.len() > MAX_DEFINITION_FILE_SIZE {
                    anyhow::bail!("definition file too large: {}", path.display());
                }

                let content = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let value: serde_json::Value = if ext == "json" {
                    serde_json::from_str(&content)
                        .with_context(|| format!("invalid JSON in {}", path.display()))?
                } else {
                    serde_yml::from_str(&content)
                        .with_context(|| format!("invalid YAML in {}", path.display()))?
                };

                registry
                    .insert_value(kind, value)
                    .with_context(|| format!("invalid {kind} definition in {}", path.display()))?;
                debug!(kind = %kind, file = %path.display(), "definition loaded");
            }
        }

        info!(
            layouts = registry.layouts.len(),
            regions = registry.regions.len(),
            blocks = registry.blocks.len(),
            "definitions loaded"
        );
        Ok(registry)
    }
}

fn from_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, DefinitionError> {
    serde_json::from_value(value).map_err(|e| DefinitionError::Invalid(e.to_string()))
}

impl DefinitionProvider for DefinitionRegistry {
    fn resolve_layout(
        &self,
        name: &str,
        version: i32,
    ) -> Result<Vec<RegionDefinition>, DefinitionError> {
        let id = DefinitionId::new(name, version);
        let layout = self.layouts.get(&id).ok_or(DefinitionError::NotFound {
            kind: DefinitionKind::Layout,
            id: id.to_string(),
        })?;

        layout
            .regions
            .iter()
            .map(|region_id| {
                let region_id = DefinitionId::parse(region_id)?;
                self.resolve_region(&region_id.name, region_id.version)
            })
            .collect()
    }

    fn resolve_region(
        &self,
        name: &str,
        version: i32,
    ) -> Result<RegionDefinition, DefinitionError> {
        let id = DefinitionId::new(name, version);
        self.regions
            .get(&id)
            .cloned()
            .ok_or(DefinitionError::NotFound {
                kind: DefinitionKind::Region,
                id: id.to_string(),
            })
    }

    fn resolve_block(&self, name: &str, version: i32) -> Result<BlockDefinition, DefinitionError> {
        let id = DefinitionId::new(name, version);
        self.blocks
            .get(&id)
            .cloned()
            .ok_or(DefinitionError::NotFound {
                kind: DefinitionKind::Block,
                id: id.to_string(),
            })
    }
}
