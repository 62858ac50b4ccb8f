//! Page content: the block tree stored on revisions, its defaults and
//! validity.

mod blocks;
mod defaults;
mod validator;

pub use blocks::{BlockInstance, PageBlocks, RegionBlocks, SectionBlocks};
pub use defaults::{
    DefaultContent, DefaultContentBuilder, default_block, default_field_values, min_repeat,
};
pub use validator::{BlockErrorValidator, ContentValidator};
