//! Canopy test utilities.
//!
//! Helpers for integration testing: definition fixtures, user builders,
//! and assertion utilities for page content.

use uuid::Uuid;

/// Create a test user context.
pub fn test_user(name: &str) -> TestUser {
    TestUser {
        id: Uuid::now_v7(),
        name: name.to_string(),
    }
}

/// The anonymous system user.
pub fn system_user() -> TestUser {
    TestUser {
        id: Uuid::nil(),
        name: "system".to_string(),
    }
}

/// A test user builder.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub name: String,
}

impl TestUser {
    /// Set a custom ID.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}

/// Layout, region and block definitions as they appear on disk.
///
/// Layouts:
/// - `basic-v1`: one `main` region.
/// - `landing-v1`: a `hero` region followed by `main`.
/// - `broken-v1`: a `main` region whose section names a missing block.
pub mod definitions {
    use serde_json::{Value, json};

    pub fn layouts() -> Vec<Value> {
        vec![
            json!({ "name": "basic", "version": 1, "regions": ["main-v1"] }),
            json!({ "name": "landing", "version": 1, "regions": ["hero-v1", "main-v1"] }),
            json!({ "name": "broken", "version": 1, "regions": ["orphan-v1"] }),
        ]
    }

    pub fn regions() -> Vec<Value> {
        vec![
            json!({
                "name": "main",
                "version": 1,
                "blocks": ["text-v1", "faq-v1"],
                "sections": [
                    { "name": "content", "defaultBlocks": ["text-v1"] }
                ]
            }),
            json!({
                "name": "hero",
                "version": 1,
                "blocks": ["banner-v1", "faq-v1"],
                "sections": [
                    { "name": "banner", "defaultBlocks": ["banner-v1", "faq-v1"] },
                    { "name": "aside" }
                ]
            }),
            json!({
                "name": "orphan",
                "version": 1,
                "sections": [
                    { "name": "content", "defaultBlocks": ["missing-v1"] }
                ]
            }),
        ]
    }

    pub fn blocks() -> Vec<Value> {
        vec![
            json!({
                "name": "text",
                "version": 1,
                "fields": [
                    { "name": "body", "type": "richtext" }
                ]
            }),
            json!({
                "name": "banner",
                "version": 1,
                "fields": [
                    { "name": "heading", "type": "text", "default": "Welcome" },
                    {
                        "name": "cta",
                        "type": "group",
                        "fields": [
                            { "name": "label", "type": "text" },
                            { "name": "url", "type": "link" }
                        ]
                    }
                ]
            }),
            faq_block(),
        ]
    }

    /// A block whose `questions` collection requires two entries.
    pub fn faq_block() -> Value {
        json!({
            "name": "faq",
            "version": 1,
            "fields": [{
                "name": "questions",
                "type": "collection",
                "validation": "required|min:2",
                "fields": [
                    { "name": "question", "type": "text" },
                    { "name": "answer", "type": "richtext" }
                ]
            }]
        })
    }
}

/// Assertion helpers for JSON content.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value is an array of `len` entries.
    pub fn array_len(value: &Value, len: usize) {
        let actual = value.as_array().map(Vec::len);
        assert_eq!(
            actual,
            Some(len),
            "Expected JSON array of {len} entries, got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_builder() {
        let id = Uuid::now_v7();
        let user = test_user("editor").with_id(id);
        assert_eq!(user.id, id);
        assert_eq!(user.name, "editor");
        assert_eq!(system_user().id, Uuid::nil());
    }

    #[test]
    fn test_definition_fixtures() {
        assert_eq!(definitions::layouts().len(), 3);
        assert_eq!(definitions::regions().len(), 3);
        assert_eq!(definitions::blocks().len(), 3);

        let faq = definitions::faq_block();
        assert_eq!(faq["fields"][0]["type"], "collection");
    }

    #[test]
    fn test_assertions() {
        let json = serde_json::json!({"name": "test", "items": [1, 2]});
        assert::has_key(&json, "name");
        assert::array_len(&json["items"], 2);
        assert::contains("hello world", "world");
    }
}
