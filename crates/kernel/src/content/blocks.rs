//! Structured block content stored on a revision.
//!
//! Content is ordered region -> section -> block. Block field values are
//! free-form JSON shaped by the block's field definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every region of a page, in layout order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageBlocks {
    pub regions: Vec<RegionBlocks>,
}

/// Content of one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionBlocks {
    pub name: String,
    #[serde(default)]
    pub sections: Vec<SectionBlocks>,
}

/// Content of one section within a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionBlocks {
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<BlockInstance>,
}

/// One placed block with its field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInstance {
    pub definition_name: String,
    pub definition_version: i32,
    pub region_name: String,
    pub section_name: String,

    /// Validation errors attached by the content validator, if any.
    #[serde(default)]
    pub errors: Option<Value>,

    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl PageBlocks {
    pub fn is_empty(&self) -> bool {
        self.regions.iter().all(|r| r.block_count() == 0)
    }

    /// Find a region by name.
    pub fn region(&self, name: &str) -> Option<&RegionBlocks> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Every block on the page in document order.
    pub fn blocks(&self) -> impl Iterator<Item = &BlockInstance> {
        self.regions
            .iter()
            .flat_map(|r| r.sections.iter())
            .flat_map(|s| s.blocks.iter())
    }
}

impl RegionBlocks {
    pub fn block_count(&self) -> usize {
        self.sections.iter().map(|s| s.blocks.len()).sum()
    }

    pub fn section(&self, name: &str) -> Option<&SectionBlocks> {
        self.sections.iter().find(|s| s.name == name)
    }
}
