//! Page storage abstraction.
//!
//! Every write goes through a [`SiteSession`]: a store opens the session on
//! one site, which locks that site against other writers and loads its
//! pages into a [`SiteState`]. Commands mutate the state; committing writes
//! the recorded changes atomically. Dropping a session without committing
//! discards everything it did.
//!
//! Two backends are provided:
//!
//! - [`PgPageStore`] - PostgreSQL, one database transaction per session
//! - [`MemoryPageStore`] - in-process, for tests and tools

mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub use memory::MemoryPageStore;
pub use postgres::PgPageStore;

use crate::models::{DeletedPage, Revision, Site};
use crate::site::SiteState;

/// Storage backend for sites, pages and revisions.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Open a write session on an existing site.
    ///
    /// Returns `None` if the site does not exist. The session holds the
    /// site's write lock until it is committed or dropped.
    async fn open(&self, site_id: Uuid) -> Result<Option<Box<dyn SiteSession>>>;

    /// Open a write session for a site built in memory and not stored yet.
    async fn create(&self, state: SiteState) -> Result<Box<dyn SiteSession>>;

    /// Load a consistent, read-only copy of a site.
    async fn snapshot(&self, site_id: Uuid) -> Result<Option<SiteState>>;

    /// Site a page (of either version) belongs to.
    async fn site_of_page(&self, page_id: Uuid) -> Result<Option<Uuid>>;

    /// Whether a site already answers on `host` + `path`.
    async fn host_path_taken(&self, host: &str, path: &str) -> Result<bool>;

    async fn list_sites(&self) -> Result<Vec<Site>>;

    async fn find_revision(&self, id: Uuid) -> Result<Option<Revision>>;

    /// Every revision of a lineage, newest first.
    async fn revision_history(&self, set_id: Uuid) -> Result<Vec<Revision>>;

    /// Deletion records for pages that pointed at a revision.
    async fn deleted_pages(&self, revision_id: Uuid) -> Result<Vec<DeletedPage>>;
}

/// An open write session on one site.
#[async_trait]
pub trait SiteSession: Send {
    fn state(&self) -> &SiteState;

    fn state_mut(&mut self) -> &mut SiteState;

    /// Write the session's changes and release the site.
    async fn commit(self: Box<Self>) -> Result<()>;
}
