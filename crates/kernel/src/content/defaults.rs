//! Default content for new pages.
//!
//! Builds the initial region -> section -> block tree for a layout from its
//! definitions. Output depends only on the definitions, so building twice
//! from the same provider yields equal content.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use super::{BlockInstance, PageBlocks, RegionBlocks, SectionBlocks};
use crate::definitions::{
    BlockDefinition, DefinitionError, DefinitionId, DefinitionProvider, FieldDefinition,
};

/// `min:N` validation rule, case-insensitive.
#[allow(clippy::expect_used)]
static MIN_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^min:([0-9]+)$").expect("valid regex literal"));

/// Content produced for a layout, with problems found on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultContent {
    pub blocks: PageBlocks,

    /// One message per default block that could not be instantiated.
    pub errors: Vec<String>,
}

impl DefaultContent {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Builds default page content from a [`DefinitionProvider`].
pub struct DefaultContentBuilder<'a> {
    provider: &'a dyn DefinitionProvider,
}

impl<'a> DefaultContentBuilder<'a> {
    pub fn new(provider: &'a dyn DefinitionProvider) -> Self {
        Self { provider }
    }

    /// Build the default content for a layout.
    ///
    /// A missing layout or region is an error. A default block whose
    /// definition cannot be resolved is skipped and reported in
    /// [`DefaultContent::errors`].
    pub fn build(
        &self,
        layout_name: &str,
        layout_version: i32,
    ) -> Result<DefaultContent, DefinitionError> {
        let regions = self.provider.resolve_layout(layout_name, layout_version)?;
        let mut content = DefaultContent::default();

        for region in regions {
            let mut sections = Vec::with_capacity(region.sections.len());
            for section in &region.sections {
                let mut blocks = Vec::with_capacity(section.default_blocks.len());
                for block_id in &section.default_blocks {
                    match self.resolve_block(block_id) {
                        Ok(definition) => {
                            blocks.push(default_block(&definition, &region.name, &section.name));
                        }
                        Err(e) => {
                            warn!(
                                region = %region.name,
                                section = %section.name,
                                block = %block_id,
                                error = %e,
                                "skipping default block"
                            );
                            content.errors.push(format!(
                                "{}/{}: {e}",
                                region.name, section.name
                            ));
                        }
                    }
                }
                sections.push(SectionBlocks {
                    name: section.name.clone(),
                    blocks,
                });
            }
            content.blocks.regions.push(RegionBlocks {
                name: region.name.clone(),
                sections,
            });
        }

        Ok(content)
    }

    fn resolve_block(&self, block_id: &str) -> Result<BlockDefinition, DefinitionError> {
        let id = DefinitionId::parse(block_id)?;
        self.provider.resolve_block(&id.name, id.version)
    }
}

/// A fresh instance of `definition` placed in `region`/`section`.
pub fn default_block(definition: &BlockDefinition, region: &str, section: &str) -> BlockInstance {
    BlockInstance {
        definition_name: definition.name.clone(),
        definition_version: definition.version,
        region_name: region.to_string(),
        section_name: section.to_string(),
        errors: None,
        fields: default_field_values(&definition.fields),
    }
}

/// Default values for a list of field definitions.
///
/// Fields with an explicit default, or of a plain type, take that default
/// (`null` when absent). Collections expand to their `min:N` count of
/// entries. Groups recurse into their sub-fields; a group without
/// sub-fields contributes nothing.
pub fn default_field_values(fields: &[FieldDefinition]) -> Map<String, Value> {
    let mut values = Map::new();
    for field in fields {
        if field.has_default_value() {
            values.insert(
                field.name.clone(),
                field.default.clone().unwrap_or(Value::Null),
            );
        } else if field.is_collection() {
            let sub_fields = field.fields.as_deref().unwrap_or_default();
            let entries = (0..min_repeat(&field.validation))
                .map(|_| Value::Object(default_field_values(sub_fields)))
                .collect();
            values.insert(field.name.clone(), Value::Array(entries));
        } else if let Some(sub_fields) = &field.fields {
            values.insert(
                field.name.clone(),
                Value::Object(default_field_values(sub_fields)),
            );
        }
    }
    values
}

/// Minimum entry count from `min:N` rules; the last matching rule wins.
pub fn min_repeat(rules: &[String]) -> usize {
    rules
        .iter()
        .filter_map(|rule| MIN_RULE.captures(rule.trim()))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<usize>().ok())
        .last()
        .unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::definitions::{DefinitionKind, DefinitionRegistry};
    use serde_json::json;

    fn fields(value: Value) -> Vec<FieldDefinition> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn min_repeat_parses_rules() {
        let rules = |r: &[&str]| r.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(min_repeat(&rules(&[])), 0);
        assert_eq!(min_repeat(&rules(&["required", "MIN:3"])), 3);
        assert_eq!(min_repeat(&rules(&["min:1", "max:5", "min:2"])), 2);
        assert_eq!(min_repeat(&rules(&["min:two", "minimum:4"])), 0);
    }

    #[test]
    fn plain_fields_use_explicit_or_null_default() {
        let values = default_field_values(&fields(json!([
            { "name": "title", "type": "text" },
            { "name": "level", "type": "select", "default": "h2" },
            { "name": "items", "type": "collection", "default": [] }
        ])));
        assert_eq!(
            Value::Object(values),
            json!({ "title": null, "level": "h2", "items": [] })
        );
    }

    #[test]
    fn nested_groups_and_collections_recurse() {
        let values = default_field_values(&fields(json!([
            {
                "name": "cta",
                "type": "group",
                "fields": [
                    { "name": "label", "type": "text", "default": "Go" },
                    {
                        "name": "links",
                        "type": "collection",
                        "validation": "min:1",
                        "fields": [{ "name": "url", "type": "link" }]
                    }
                ]
            },
            { "name": "empty_group", "type": "group" },
            { "name": "none", "type": "collection", "fields": [{ "name": "x", "type": "text" }] }
        ])));
        assert_eq!(
            Value::Object(values),
            json!({
                "cta": { "label": "Go", "links": [{ "url": null }] },
                "none": []
            })
        );
    }

    #[test]
    fn layout_with_min_two_collection_builds_two_entries() {
        let mut registry = DefinitionRegistry::new();
        registry
            .insert_value(
                DefinitionKind::Layout,
                json!({ "name": "basic", "version": 1, "regions": ["main-v1"] }),
            )
            .unwrap();
        registry
            .insert_value(
                DefinitionKind::Region,
                json!({
                    "name": "main", "version": 1,
                    "sections": [{ "name": "content", "defaultBlocks": ["faq-v1"] }]
                }),
            )
            .unwrap();
        registry
            .insert_value(
                DefinitionKind::Block,
                json!({
                    "name": "faq", "version": 1,
                    "fields": [{
                        "name": "questions",
                        "type": "collection",
                        "validation": ["min:2"],
                        "fields": [
                            { "name": "question", "type": "text" },
                            { "name": "open", "type": "switch", "default": false }
                        ]
                    }]
                }),
            )
            .unwrap();

        let builder = DefaultContentBuilder::new(&registry);
        let content = builder.build("basic", 1).unwrap();
        assert!(content.is_complete());

        let block = content.blocks.blocks().next().unwrap();
        assert_eq!(block.region_name, "main");
        assert_eq!(block.section_name, "content");
        assert_eq!(
            block.fields["questions"],
            json!([
                { "question": null, "open": false },
                { "question": null, "open": false }
            ])
        );

        assert_eq!(builder.build("basic", 1).unwrap(), content);
    }

    #[test]
    fn unknown_default_block_is_reported_and_skipped() {
        let mut registry = DefinitionRegistry::new();
        registry
            .insert_value(
                DefinitionKind::Layout,
                json!({ "name": "basic", "version": 1, "regions": ["main-v1"] }),
            )
            .unwrap();
        registry
            .insert_value(
                DefinitionKind::Region,
                json!({
                    "name": "main", "version": 1,
                    "sections": [{ "name": "content", "defaultBlocks": ["ghost-v1"] }]
                }),
            )
            .unwrap();

        let content = DefaultContentBuilder::new(&registry).build("basic", 1).unwrap();
        assert_eq!(content.errors.len(), 1);
        assert!(content.blocks.is_empty());
        assert_eq!(content.blocks.regions[0].sections[0].name, "content");
    }

    #[test]
    fn unknown_layout_is_an_error() {
        let registry = DefinitionRegistry::new();
        assert!(matches!(
            DefaultContentBuilder::new(&registry).build("nope", 1),
            Err(DefinitionError::NotFound { .. })
        ));
    }
}
