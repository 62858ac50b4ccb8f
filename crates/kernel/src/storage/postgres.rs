//! PostgreSQL page store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{PageStore, SiteSession};
use crate::models::{DeletedPage, Page, Revision, RevisionSet, Site};
use crate::site::{Changes, SiteState};

/// Page store backed by PostgreSQL.
///
/// Each session is one transaction. Opening a session locks the site row
/// `FOR UPDATE`, which serializes writers to both of the site's trees.
#[derive(Clone)]
pub struct PgPageStore {
    pool: PgPool,
}

impl PgPageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PageStore for PgPageStore {
    async fn open(&self, site_id: Uuid) -> Result<Option<Box<dyn SiteSession>>> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let Some(site) = Site::lock(&mut tx, site_id).await? else {
            return Ok(None);
        };
        let state = load_state(&mut tx, site).await?;
        debug!(site_id = %site_id, "site session opened");
        Ok(Some(Box::new(PgSiteSession { tx, state })))
    }

    async fn create(&self, state: SiteState) -> Result<Box<dyn SiteSession>> {
        let tx = self.pool.begin().await.context("failed to begin transaction")?;
        Ok(Box::new(PgSiteSession { tx, state }))
    }

    async fn snapshot(&self, site_id: Uuid) -> Result<Option<SiteState>> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .context("failed to set snapshot isolation")?;
        let Some(site) = Site::find_by_id(&mut tx, site_id).await? else {
            return Ok(None);
        };
        let state = load_state(&mut tx, site).await?;
        tx.rollback().await.context("failed to end snapshot")?;
        Ok(Some(state))
    }

    async fn site_of_page(&self, page_id: Uuid) -> Result<Option<Uuid>> {
        let mut conn = self.pool.acquire().await.context("failed to acquire connection")?;
        Page::site_of(&mut conn, page_id).await
    }

    async fn host_path_taken(&self, host: &str, path: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await.context("failed to acquire connection")?;
        Site::host_path_taken(&mut conn, host, path).await
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        Site::list(&self.pool).await
    }

    async fn find_revision(&self, id: Uuid) -> Result<Option<Revision>> {
        let mut conn = self.pool.acquire().await.context("failed to acquire connection")?;
        Revision::find_by_id(&mut conn, id).await
    }

    async fn revision_history(&self, set_id: Uuid) -> Result<Vec<Revision>> {
        let mut conn = self.pool.acquire().await.context("failed to acquire connection")?;
        Revision::list_for_set(&mut conn, set_id).await
    }

    async fn deleted_pages(&self, revision_id: Uuid) -> Result<Vec<DeletedPage>> {
        let mut conn = self.pool.acquire().await.context("failed to acquire connection")?;
        DeletedPage::list_for_revision(&mut conn, revision_id).await
    }
}

/// Load a site's pages, revision sets and current revisions.
async fn load_state(conn: &mut PgConnection, site: Site) -> Result<SiteState> {
    let pages = Page::list_for_site(conn, site.id).await?;
    let sets = RevisionSet::list_for_site(conn, site.id).await?;
    let revisions = Revision::list_referenced_by_site(conn, site.id).await?;
    let site_id = site.id;
    SiteState::load(site, pages, sets, revisions)
        .with_context(|| format!("stored page tree of site {site_id} is malformed"))
}

/// Write a change set in dependency order.
async fn flush(conn: &mut PgConnection, changes: &Changes) -> Result<()> {
    if let Some(site) = &changes.site {
        Site::insert(conn, site).await?;
    }
    for set in &changes.revision_sets {
        RevisionSet::insert(conn, set).await?;
    }
    for revision in &changes.revisions {
        Revision::insert(conn, revision).await?;
    }
    for (id, when) in &changes.published {
        Revision::mark_published(conn, *id, *when).await?;
    }
    Page::delete_many(conn, &changes.removed).await?;
    for page in &changes.pages {
        Page::upsert(conn, page).await?;
    }
    for record in &changes.deleted_pages {
        DeletedPage::insert(conn, record).await?;
    }
    Ok(())
}

struct PgSiteSession {
    tx: Transaction<'static, Postgres>,
    state: SiteState,
}

#[async_trait]
impl SiteSession for PgSiteSession {
    fn state(&self) -> &SiteState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SiteState {
        &mut self.state
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgSiteSession { mut tx, mut state } = *self;
        let changes = state.take_changes();
        flush(&mut tx, &changes).await?;
        tx.commit().await.context("failed to commit site session")?;
        debug!(
            site_id = %state.site_id(),
            pages = changes.pages.len(),
            removed = changes.removed.len(),
            revisions = changes.revisions.len(),
            "site session committed"
        );
        Ok(())
    }
}
