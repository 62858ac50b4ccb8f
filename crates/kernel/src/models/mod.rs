//! Database models.

pub mod page;
pub mod revision;
pub mod site;

pub use page::{DeletedPage, NewPage, Page, Scope, Version};
pub use revision::{NewRevision, Revision, RevisionSet};
pub use site::Site;
