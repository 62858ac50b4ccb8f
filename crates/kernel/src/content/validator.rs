//! Content validity checks.

use super::PageBlocks;

/// Decides whether a revision's content may be published.
pub trait ContentValidator: Send + Sync {
    fn is_valid(&self, blocks: &PageBlocks) -> bool;
}

/// Accepts content when no block carries errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockErrorValidator;

impl ContentValidator for BlockErrorValidator {
    fn is_valid(&self, blocks: &PageBlocks) -> bool {
        blocks
            .blocks()
            .all(|block| block.errors.as_ref().is_none_or(serde_json::Value::is_null))
    }
}
