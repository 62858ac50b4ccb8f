//! Layout, region and block definitions.
//!
//! Definitions describe the shape of page content. The page engine only
//! consumes them through [`DefinitionProvider`]; where they come from (files,
//! a registry built in code, a remote service) is the provider's concern.

mod registry;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use registry::DefinitionRegistry;

/// Errors raised while resolving definitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("{kind} definition {id} not found")]
    NotFound { kind: DefinitionKind, id: String },

    #[error("invalid definition: {0}")]
    Invalid(String),
}

/// The three definition families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Layout,
    Region,
    Block,
}

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Layout => "layout",
            Self::Region => "region",
            Self::Block => "block",
        }
    }

    /// Sub-directory holding this kind's files in a definitions tree.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Layout => "layouts",
            Self::Region => "regions",
            Self::Block => "blocks",
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name + version key, written `name-vN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId {
    pub name: String,
    pub version: i32,
}

impl DefinitionId {
    pub fn new(name: impl Into<String>, version: i32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Parse `name-vN`.
    pub fn parse(id: &str) -> Result<Self, DefinitionError> {
        let (name, version) = id.rsplit_once("-v").ok_or_else(|| {
            DefinitionError::Invalid(format!("definition id {id:?} has no version"))
        })?;
        let version = version.parse::<i32>().map_err(|_| {
            DefinitionError::Invalid(format!("definition id {id:?} has a bad version"))
        })?;
        if name.is_empty() {
            return Err(DefinitionError::Invalid(format!(
                "definition id {id:?} has no name"
            )));
        }
        Ok(Self::new(name, version))
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-v{}", self.name, self.version)
    }
}

/// A page layout: an ordered list of regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDefinition {
    pub name: String,
    pub version: i32,

    /// Region ids (`name-vN`) in display order.
    #[serde(default)]
    pub regions: Vec<String>,
}

/// A region: named sections, each with its default blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDefinition {
    pub name: String,
    pub version: i32,

    /// Block ids allowed anywhere in the region.
    #[serde(default)]
    pub blocks: Vec<String>,

    #[serde(default)]
    pub sections: Vec<SectionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDefinition {
    pub name: String,

    /// Block ids instantiated when a page is created.
    #[serde(default, alias = "defaultBlocks")]
    pub default_blocks: Vec<String>,

    #[serde(default, alias = "allowedBlocks")]
    pub allowed_blocks: Vec<String>,
}

/// A block type and its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub name: String,
    pub version: i32,

    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

impl BlockDefinition {
    pub fn id(&self) -> DefinitionId {
        DefinitionId::new(self.name.clone(), self.version)
    }
}

/// Field types whose values are built from sub-fields.
pub const COLLECTION_TYPE: &str = "collection";
pub const GROUP_TYPE: &str = "group";

/// One field of a block, possibly nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: String,

    /// Explicit default. `Some(Value::Null)` means an explicit `null`.
    #[serde(
        default,
        deserialize_with = "explicit_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,

    /// Validation rule strings such as `required` or `min:2`.
    #[serde(default, deserialize_with = "rule_list")]
    pub validation: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldDefinition>>,
}

impl FieldDefinition {
    pub fn is_collection(&self) -> bool {
        self.field_type == COLLECTION_TYPE
    }

    pub fn is_group(&self) -> bool {
        self.field_type == GROUP_TYPE
    }

    /// True when the definition itself yields the default value, explicitly
    /// or implicitly as `null`.
    pub fn has_default_value(&self) -> bool {
        self.default.is_some() || !(self.is_collection() || self.is_group())
    }
}

fn explicit_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn rule_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Rules {
        List(Vec<String>),
        Piped(String),
    }

    Ok(match Option::<Rules>::deserialize(deserializer)? {
        Some(Rules::List(rules)) => rules,
        Some(Rules::Piped(rules)) => rules
            .split('|')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect(),
        None => Vec::new(),
    })
}

/// Source of definitions, keyed by name and version.
pub trait DefinitionProvider: Send + Sync {
    /// Resolve a layout to its regions, in layout order.
    fn resolve_layout(
        &self,
        name: &str,
        version: i32,
    ) -> Result<Vec<RegionDefinition>, DefinitionError>;

    fn resolve_region(&self, name: &str, version: i32)
    -> Result<RegionDefinition, DefinitionError>;

    fn resolve_block(&self, name: &str, version: i32) -> Result<BlockDefinition, DefinitionError>;

    fn layout_exists(&self, name: &str, version: i32) -> bool {
        self.resolve_layout(name, version).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn definition_id_parse_and_display() {
        let id = DefinitionId::parse("two-column-v3").unwrap();
        assert_eq!(id.name, "two-column");
        assert_eq!(id.version, 3);
        assert_eq!(id.to_string(), "two-column-v3");

        assert!(DefinitionId::parse("no-version").is_err());
        assert!(DefinitionId::parse("-v1").is_err());
        assert!(DefinitionId::parse("bad-vx").is_err());
    }

    #[test]
    fn field_default_distinguishes_explicit_null() {
        let explicit: FieldDefinition = serde_json::from_value(serde_json::json!({
            "name": "items", "type": "collection", "default": null
        }))
        .unwrap();
        assert_eq!(explicit.default, Some(Value::Null));
        assert!(explicit.has_default_value());

        let absent: FieldDefinition = serde_json::from_value(serde_json::json!({
            "name": "items", "type": "collection", "fields": []
        }))
        .unwrap();
        assert_eq!(absent.default, None);
        assert!(!absent.has_default_value());

        let scalar: FieldDefinition =
            serde_json::from_value(serde_json::json!({ "name": "title", "type": "text" })).unwrap();
        assert!(scalar.has_default_value());
    }

    #[test]
    fn validation_accepts_list_or_piped_string() {
        let listed: FieldDefinition = serde_json::from_value(serde_json::json!({
            "name": "a", "type": "text", "validation": ["required", "max:10"]
        }))
        .unwrap();
        assert_eq!(listed.validation, ["required", "max:10"]);

        let piped: FieldDefinition = serde_json::from_value(serde_json::json!({
            "name": "a", "type": "text", "validation": "required| min:2"
        }))
        .unwrap();
        assert_eq!(piped.validation, ["required", "min:2"]);

        let null: FieldDefinition = serde_json::from_value(serde_json::json!({
            "name": "a", "type": "text", "validation": null
        }))
        .unwrap();
        assert!(null.validation.is_empty());
    }

    #[test]
    fn section_accepts_camel_case_keys() {
        let section: SectionDefinition = serde_json::from_value(serde_json::json!({
            "name": "content",
            "defaultBlocks": ["wysiwyg-v1"],
            "allowedBlocks": ["wysiwyg-v1", "image-v1"]
        }))
        .unwrap();
        assert_eq!(section.default_blocks, ["wysiwyg-v1"]);
        assert_eq!(section.allowed_blocks.len(), 2);
    }
}
