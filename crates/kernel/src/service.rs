//! Page service.
//!
//! Entry point for callers: runs each command inside one store session,
//! commits it, and notifies observers. A command that fails leaves storage
//! exactly as it was.

use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::commands::{
    self, AddPage, CommandContext, CopyPage, CreateSite, DeletePage, MovePage, PublishPage,
    UnpublishPage,
};
use crate::content::{BlockErrorValidator, ContentValidator};
use crate::definitions::DefinitionProvider;
use crate::error::{PageError, PageResult};
use crate::models::{DeletedPage, Page, Revision, Site, Version};
use crate::observer::{ObserverRegistry, PageEvent};
use crate::publish::PublishOutcome;
use crate::site::SiteState;
use crate::storage::PageStore;

/// One row of a tree listing.
#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    pub page: Page,
    pub path: String,

    /// Title of the page's current revision.
    pub title: Option<String>,
}

/// Page commands and queries over a [`PageStore`].
#[derive(Clone)]
pub struct PageService {
    inner: Arc<PageServiceInner>,
}

struct PageServiceInner {
    store: Arc<dyn PageStore>,
    definitions: Arc<dyn DefinitionProvider>,
    validator: Arc<dyn ContentValidator>,
    observers: ObserverRegistry,
}

impl PageService {
    pub fn new(
        store: Arc<dyn PageStore>,
        definitions: Arc<dyn DefinitionProvider>,
        validator: Arc<dyn ContentValidator>,
        observers: ObserverRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(PageServiceInner {
                store,
                definitions,
                validator,
                observers,
            }),
        }
    }

    /// Service using [`BlockErrorValidator`] and no observers.
    pub fn with_defaults(
        store: Arc<dyn PageStore>,
        definitions: Arc<dyn DefinitionProvider>,
    ) -> Self {
        Self::new(
            store,
            definitions,
            Arc::new(BlockErrorValidator),
            ObserverRegistry::new(),
        )
    }

    pub fn store(&self) -> &Arc<dyn PageStore> {
        &self.inner.store
    }

    fn context(&self, user: Uuid) -> CommandContext<'_> {
        CommandContext {
            definitions: self.inner.definitions.as_ref(),
            validator: self.inner.validator.as_ref(),
            user,
            now: chrono::Utc::now().timestamp(),
        }
    }

    fn notify(&self, event: PageEvent) {
        self.inner.observers.notify(&event);
    }

    /// Site of a page, or a validation error on `field`.
    async fn site_for(&self, page_id: Uuid, field: &str) -> PageResult<Uuid> {
        self.inner
            .store
            .site_of_page(page_id)
            .await?
            .ok_or_else(|| PageError::field(field, "The page does not exist."))
    }

    /// Run `f` against a site in one session and commit if it succeeds.
    async fn run<T>(
        &self,
        site_id: Uuid,
        user: Uuid,
        f: impl FnOnce(&mut SiteState, &CommandContext<'_>) -> PageResult<T> + Send,
    ) -> PageResult<T> {
        let mut session = self
            .inner
            .store
            .open(site_id)
            .await?
            .ok_or_else(|| PageError::field("site_id", "The site does not exist."))?;

        let out = {
            let ctx = self.context(user);
            f(session.state_mut(), &ctx)?
        };
        if let Err(e) = session.state().verify() {
            warn!(site_id = %site_id, error = %e, "command left a malformed tree; rolling back");
            return Err(PageError::Storage(anyhow!(e)));
        }
        session.commit().await?;
        Ok(out)
    }

    // ---- Commands ----

    /// Create a site with its draft homepage.
    pub async fn create_site(&self, input: CreateSite, user: Uuid) -> PageResult<(Site, Page)> {
        let taken = self
            .inner
            .store
            .host_path_taken(&input.host.to_lowercase(), &input.path)
            .await?;
        let (state, homepage) = {
            let ctx = self.context(user);
            commands::create_site(&ctx, &input, taken)?
        };
        let site = state.site().clone();

        let session = self.inner.store.create(state).await?;
        session.commit().await?;

        info!(site_id = %site.id, host = %site.host, path = %site.path, "site created");
        self.notify(PageEvent::Created {
            page: homepage.clone(),
        });
        Ok((site, homepage))
    }

    /// Add a draft page with default content.
    pub async fn add_page(&self, input: AddPage, user: Uuid) -> PageResult<Page> {
        let site_id = self.site_for(input.parent_id, "parent_id").await?;
        self.notify(PageEvent::Creating {
            site_id,
            parent_id: Some(input.parent_id),
            slug: input.slug.clone(),
        });

        let page = self
            .run(site_id, user, |state, ctx| commands::add_page(state, ctx, &input))
            .await?;

        info!(page_id = %page.id, slug = %page.slug, "page added");
        self.notify(PageEvent::Created { page: page.clone() });
        Ok(page)
    }

    /// Copy a page's content into a new sibling page.
    pub async fn copy_page(&self, input: CopyPage, user: Uuid) -> PageResult<Page> {
        let site_id = self.site_for(input.page_id, "page_id").await?;
        self.notify(PageEvent::Copying {
            source_id: input.page_id,
            slug: input.new_slug.clone(),
        });

        let page = self
            .run(site_id, user, |state, ctx| commands::copy_page(state, ctx, &input))
            .await?;

        info!(source = %input.page_id, page_id = %page.id, "page copied");
        self.notify(PageEvent::Copied {
            source_id: input.page_id,
            page: page.clone(),
        });
        Ok(page)
    }

    /// Publish one draft page.
    pub async fn publish_page(&self, input: PublishPage, user: Uuid) -> PageResult<PublishOutcome> {
        let site_id = self.site_for(input.page_id, "page_id").await?;
        let outcome = self
            .run(site_id, user, |state, ctx| commands::publish_page(state, ctx, &input))
            .await?;

        info!(
            page_id = %input.page_id,
            published_id = %outcome.page.id,
            created = outcome.created,
            "page published"
        );
        self.notify(PageEvent::Published {
            draft_id: outcome.draft_id,
            page: outcome.page.clone(),
            created: outcome.created,
        });
        Ok(outcome)
    }

    /// Publish a draft page and its descendants in one transaction.
    pub async fn publish_page_tree(
        &self,
        input: PublishPage,
        user: Uuid,
    ) -> PageResult<Vec<PublishOutcome>> {
        let site_id = self.site_for(input.page_id, "page_id").await?;
        let outcomes = self
            .run(site_id, user, |state, ctx| {
                commands::publish_page_tree(state, ctx, &input)
            })
            .await?;

        info!(page_id = %input.page_id, pages = outcomes.len(), "page tree published");
        for outcome in &outcomes {
            self.notify(PageEvent::Published {
                draft_id: outcome.draft_id,
                page: outcome.page.clone(),
                created: outcome.created,
            });
        }
        Ok(outcomes)
    }

    /// Take a page and its published descendants offline.
    pub async fn unpublish_page(&self, input: UnpublishPage, user: Uuid) -> PageResult<Vec<Page>> {
        let site_id = self.site_for(input.page_id, "page_id").await?;
        let removed = self
            .run(site_id, user, |state, ctx| {
                commands::unpublish_page(state, ctx, &input)
            })
            .await?;

        info!(page_id = %input.page_id, removed = removed.len(), "page unpublished");
        self.notify(PageEvent::Unpublished {
            draft_id: input.page_id,
            removed: removed.iter().map(|p| p.id).collect(),
        });
        Ok(removed)
    }

    /// Move a draft page under a new parent.
    pub async fn move_page(&self, input: MovePage, user: Uuid) -> PageResult<Page> {
        let site_id = self.site_for(input.page_id, "page_id").await?;
        let page = self
            .run(site_id, user, |state, ctx| commands::move_page(state, ctx, &input))
            .await?;

        info!(page_id = %page.id, parent_id = %input.parent_id, "page moved");
        self.notify(PageEvent::Moved { page: page.clone() });
        Ok(page)
    }

    /// Delete a draft page and its descendants.
    pub async fn delete_page(&self, input: DeletePage, user: Uuid) -> PageResult<Vec<Page>> {
        let site_id = self.site_for(input.page_id, "page_id").await?;
        let removed = self
            .run(site_id, user, |state, ctx| commands::delete_page(state, ctx, &input))
            .await?;

        info!(page_id = %input.page_id, removed = removed.len(), "page deleted");
        self.notify(PageEvent::Deleted {
            page_id: input.page_id,
            removed: removed.iter().map(|p| p.id).collect(),
        });
        Ok(removed)
    }

    // ---- Queries ----

    pub async fn list_sites(&self) -> PageResult<Vec<Site>> {
        Ok(self.inner.store.list_sites().await?)
    }

    /// Find a page by site, version and path.
    pub async fn find_page(
        &self,
        site_id: Uuid,
        version: Version,
        path: &str,
    ) -> PageResult<Option<Page>> {
        let Some(state) = self.inner.store.snapshot(site_id).await? else {
            return Ok(None);
        };
        Ok(state.find_by_path(version, path).cloned())
    }

    /// Load a page by id.
    pub async fn page(&self, id: Uuid) -> PageResult<Option<Page>> {
        let Some(site_id) = self.inner.store.site_of_page(id).await? else {
            return Ok(None);
        };
        let Some(state) = self.inner.store.snapshot(site_id).await? else {
            return Ok(None);
        };
        Ok(state.page(id).cloned())
    }

    /// Every page of one tree in order, with resolved paths.
    pub async fn tree(&self, site_id: Uuid, version: Version) -> PageResult<Vec<TreeEntry>> {
        let Some(state) = self.inner.store.snapshot(site_id).await? else {
            return Err(PageError::field("site_id", "The site does not exist."));
        };
        Ok(state
            .tree(version)
            .ordered()
            .into_iter()
            .map(|page| TreeEntry {
                page: page.clone(),
                path: state.path_of(page.id).unwrap_or_default(),
                title: state.revision_of(page).map(|r| r.title.clone()),
            })
            .collect())
    }

    pub async fn revision(&self, id: Uuid) -> PageResult<Option<Revision>> {
        Ok(self.inner.store.find_revision(id).await?)
    }

    /// All revisions of a lineage, newest first.
    pub async fn revision_history(&self, set_id: Uuid) -> PageResult<Vec<Revision>> {
        Ok(self.inner.store.revision_history(set_id).await?)
    }

    pub async fn deleted_pages(&self, revision_id: Uuid) -> PageResult<Vec<DeletedPage>> {
        Ok(self.inner.store.deleted_pages(revision_id).await?)
    }
}
