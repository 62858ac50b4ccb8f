//! Working copy of one site's pages and revisions.
//!
//! A [`SiteState`] is loaded at the start of a store session, mutated by the
//! commands and publish engine, and flushed back on commit. It holds both of
//! the site's trees and every revision the session has seen, and records
//! what changed so the store can write only that.

use std::collections::HashMap;

use anyhow::anyhow;
use uuid::Uuid;

use crate::error::{PageError, PageResult};
use crate::models::{DeletedPage, NewPage, NewRevision, Page, Revision, RevisionSet, Site, Version};
use crate::tree::{NestedSet, TreeError};

/// Where a page goes when it is repositioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    NextSiblingOf(Uuid),
    PreviousSiblingOf(Uuid),
    LastChildOf(Uuid),
}

impl Position {
    pub fn target(&self) -> Uuid {
        match self {
            Self::NextSiblingOf(id) | Self::PreviousSiblingOf(id) | Self::LastChildOf(id) => *id,
        }
    }
}

/// Writes recorded since the state was loaded.
#[derive(Debug, Clone, Default)]
pub struct Changes {
    /// Site row to insert, for a site created in this session.
    pub site: Option<Site>,

    /// Pages to insert or update, parents before children.
    pub pages: Vec<Page>,

    /// Page ids to delete.
    pub removed: Vec<Uuid>,

    pub revision_sets: Vec<RevisionSet>,
    pub revisions: Vec<Revision>,

    /// `(revision_id, published_at)` stamps on revisions loaded from storage.
    pub published: Vec<(Uuid, i64)>,

    pub deleted_pages: Vec<DeletedPage>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.site.is_none()
            && self.pages.is_empty()
            && self.removed.is_empty()
            && self.revision_sets.is_empty()
            && self.revisions.is_empty()
            && self.published.is_empty()
            && self.deleted_pages.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct Pending {
    site: bool,
    removed: Vec<Uuid>,
    revision_sets: Vec<Uuid>,
    revisions: Vec<Uuid>,
    published: Vec<(Uuid, i64)>,
    deleted_pages: Vec<DeletedPage>,
}

/// Pages, trees and revisions of one site.
#[derive(Debug, Clone)]
pub struct SiteState {
    site: Site,
    draft: NestedSet<Page>,
    published: NestedSet<Page>,
    revision_sets: HashMap<Uuid, RevisionSet>,
    revisions: HashMap<Uuid, Revision>,
    pending: Pending,
}

impl SiteState {
    /// State for a site that does not exist in storage yet.
    pub fn create(site: Site) -> Self {
        Self {
            site,
            draft: NestedSet::new(),
            published: NestedSet::new(),
            revision_sets: HashMap::new(),
            revisions: HashMap::new(),
            pending: Pending {
                site: true,
                ..Pending::default()
            },
        }
    }

    /// State built from stored rows. Fails if either tree is malformed.
    pub fn load(
        site: Site,
        pages: Vec<Page>,
        revision_sets: Vec<RevisionSet>,
        revisions: Vec<Revision>,
    ) -> Result<Self, TreeError> {
        let (draft, published): (Vec<Page>, Vec<Page>) =
            pages.into_iter().partition(Page::is_draft);
        Ok(Self {
            site,
            draft: NestedSet::from_nodes(draft)?,
            published: NestedSet::from_nodes(published)?,
            revision_sets: revision_sets.into_iter().map(|s| (s.id, s)).collect(),
            revisions: revisions.into_iter().map(|r| (r.id, r)).collect(),
            pending: Pending::default(),
        })
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn site_id(&self) -> Uuid {
        self.site.id
    }

    pub fn tree(&self, version: Version) -> &NestedSet<Page> {
        match version {
            Version::Draft => &self.draft,
            Version::Published => &self.published,
        }
    }

    fn tree_mut(&mut self, version: Version) -> &mut NestedSet<Page> {
        match version {
            Version::Draft => &mut self.draft,
            Version::Published => &mut self.published,
        }
    }

    /// Check both trees are well-formed.
    pub fn verify(&self) -> Result<(), TreeError> {
        self.draft.verify()?;
        self.published.verify()
    }

    // Lookups

    pub fn page(&self, id: Uuid) -> Option<&Page> {
        self.draft.get(id).or_else(|| self.published.get(id))
    }

    fn require(&self, id: Uuid) -> PageResult<&Page> {
        self.page(id).ok_or_else(|| {
            PageError::InvalidMove(format!("page {id} is not in site {}", self.site.id))
        })
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.draft.contains(id) || self.published.contains(id)
    }

    /// The first root of a tree: the site's homepage.
    pub fn root(&self, version: Version) -> Option<&Page> {
        self.tree(version).roots().into_iter().next()
    }

    pub fn parent(&self, id: Uuid) -> Option<&Page> {
        let page = self.page(id)?;
        self.tree(page.version).get(page.parent_id?)
    }

    pub fn children(&self, id: Uuid) -> Vec<&Page> {
        self.page(id)
            .map(|p| self.tree(p.version).children(id))
            .unwrap_or_default()
    }

    pub fn siblings(&self, id: Uuid) -> Vec<&Page> {
        self.page(id)
            .map(|p| self.tree(p.version).siblings(id))
            .unwrap_or_default()
    }

    pub fn ancestors(&self, id: Uuid) -> Vec<&Page> {
        self.page(id)
            .map(|p| self.tree(p.version).ancestors(id))
            .unwrap_or_default()
    }

    pub fn descendants(&self, id: Uuid) -> Vec<&Page> {
        self.page(id)
            .map(|p| self.tree(p.version).descendants(id))
            .unwrap_or_default()
    }

    pub fn sibling_before(&self, id: Uuid) -> Option<&Page> {
        let page = self.page(id)?;
        self.tree(page.version).sibling_before(id)
    }

    pub fn sibling_after(&self, id: Uuid) -> Option<&Page> {
        let page = self.page(id)?;
        self.tree(page.version).sibling_after(id)
    }

    /// Resolved path of a page: `/` for a root, `/a/b` below it.
    pub fn path_of(&self, id: Uuid) -> Option<String> {
        let page = self.page(id)?;
        if page.is_root() {
            return Some("/".to_string());
        }
        let mut path = String::new();
        for ancestor in self.tree(page.version).ancestors(id) {
            if ancestor.is_root() {
                continue;
            }
            path.push('/');
            path.push_str(&ancestor.slug);
        }
        path.push('/');
        path.push_str(&page.slug);
        Some(path)
    }

    /// Find a page by its resolved path within one tree.
    pub fn find_by_path(&self, version: Version, path: &str) -> Option<&Page> {
        let tree = self.tree(version);
        let mut current = tree.roots().into_iter().next()?;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = tree
                .children(current.id)
                .into_iter()
                .find(|child| child.slug == segment)?;
        }
        Some(current)
    }

    /// The page at the same path as `id` in the other tree.
    pub fn at_same_path(&self, id: Uuid, version: Version) -> Option<&Page> {
        let path = self.path_of(id)?;
        self.find_by_path(version, &path)
    }

    /// The published page sharing `id`'s revision set lineage.
    pub fn published_counterpart(&self, id: Uuid) -> Option<&Page> {
        let lineage = self.lineage_of(self.page(id)?)?;
        self.published
            .ordered()
            .into_iter()
            .find(|p| self.lineage_of(p) == Some(lineage))
    }

    /// Revision set of the page's current revision.
    pub fn lineage_of(&self, page: &Page) -> Option<Uuid> {
        self.revision_of(page).map(|r| r.revision_set_id)
    }

    pub fn revision(&self, id: Uuid) -> Option<&Revision> {
        self.revisions.get(&id)
    }

    pub fn revision_of(&self, page: &Page) -> Option<&Revision> {
        self.revisions.get(&page.revision_id?)
    }

    pub fn revision_set(&self, id: Uuid) -> Option<&RevisionSet> {
        self.revision_sets.get(&id)
    }

    /// Revisions of a lineage known to this state, newest first.
    pub fn revisions_in_set(&self, set_id: Uuid) -> Vec<&Revision> {
        let mut revisions: Vec<&Revision> = self
            .revisions
            .values()
            .filter(|r| r.revision_set_id == set_id)
            .collect();
        revisions.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        revisions
    }

    /// True when a draft sibling under `parent_id` already uses `slug`.
    pub fn slug_taken(&self, parent_id: Uuid, slug: &str, except: Option<Uuid>) -> bool {
        self.draft
            .children(parent_id)
            .into_iter()
            .any(|p| p.slug == slug && Some(p.id) != except)
    }

    // Revision store

    pub fn create_revision_set(&mut self, now: i64) -> RevisionSet {
        let set = RevisionSet {
            id: Uuid::now_v7(),
            site_id: self.site.id,
            created: now,
        };
        self.revision_sets.insert(set.id, set.clone());
        self.pending.revision_sets.push(set.id);
        set
    }

    /// Append a revision to a set. Content is stored as given.
    pub fn create_revision(
        &mut self,
        set_id: Uuid,
        content: NewRevision,
        now: i64,
    ) -> PageResult<Revision> {
        if !self.revision_sets.contains_key(&set_id) {
            return Err(PageError::Storage(anyhow!(
                "revision set {set_id} does not belong to site {}",
                self.site.id
            )));
        }
        let revision = Revision {
            id: Uuid::now_v7(),
            revision_set_id: set_id,
            title: content.title,
            layout_name: content.layout_name,
            layout_version: content.layout_version,
            blocks: content.blocks,
            options: content.options,
            valid: content.valid,
            published_at: None,
            created_by: content.created_by,
            updated_by: content.created_by,
            created: now,
            changed: now,
        };
        self.revisions.insert(revision.id, revision.clone());
        self.pending.revisions.push(revision.id);
        Ok(revision)
    }

    /// Stamp a revision's first publish time. Returns false if it already
    /// had one.
    pub fn mark_published(&mut self, revision_id: Uuid, when: i64) -> PageResult<bool> {
        let revision = self
            .revisions
            .get_mut(&revision_id)
            .ok_or_else(|| PageError::Storage(anyhow!("revision {revision_id} is not loaded")))?;
        if revision.published_at.is_some() {
            return Ok(false);
        }
        revision.published_at = Some(when);
        revision.changed = when;
        if !self.pending.revisions.contains(&revision_id) {
            self.pending.published.push((revision_id, when));
        }
        Ok(true)
    }

    /// Point a page at a revision. Position is untouched.
    pub fn set_revision(
        &mut self,
        page_id: Uuid,
        revision_id: Uuid,
        user: Uuid,
        now: i64,
    ) -> PageResult<()> {
        if !self.revisions.contains_key(&revision_id) {
            return Err(PageError::Storage(anyhow!("revision {revision_id} is not loaded")));
        }
        let version = self.require(page_id)?.version;
        if self.tree(version).get(page_id).and_then(|p| p.revision_id) == Some(revision_id) {
            return Ok(());
        }
        self.tree_mut(version).modify(page_id, |page| {
            page.revision_id = Some(revision_id);
            page.updated_by = user;
            page.changed = now;
        });
        Ok(())
    }

    // Structure

    /// Create a page as the last child of `parent_id`, or as a root.
    pub fn insert_page(
        &mut self,
        version: Version,
        parent_id: Option<Uuid>,
        new: NewPage,
        now: i64,
    ) -> PageResult<Page> {
        let page = Page {
            id: Uuid::now_v7(),
            site_id: self.site.id,
            version,
            slug: new.slug,
            parent_id,
            lft: 0,
            rgt: 0,
            depth: 0,
            revision_id: new.revision_id,
            created_by: new.created_by,
            updated_by: new.updated_by,
            created: now,
            changed: now,
        };
        let id = page.id;
        let tree = self.tree_mut(version);
        match parent_id {
            Some(parent) => tree.insert_child(parent, page)?,
            None => tree.insert_root(page)?,
        }
        self.tree(version)
            .get(id)
            .cloned()
            .ok_or_else(|| PageError::Storage(anyhow!("page {id} missing after insert")))
    }

    /// Move a page and its subtree within its own tree.
    pub fn reposition(&mut self, id: Uuid, position: Position) -> PageResult<()> {
        let version = self.require(id)?.version;
        let target = position.target();
        if !self.tree(version).contains(target) {
            return Err(PageError::InvalidMove(format!(
                "page {target} is not in the {version} tree of the page being moved"
            )));
        }
        let tree = self.tree_mut(version);
        match position {
            Position::NextSiblingOf(target) => tree.move_as_next_sibling_of(id, target)?,
            Position::PreviousSiblingOf(target) => tree.move_as_previous_sibling_of(id, target)?,
            Position::LastChildOf(target) => tree.move_as_last_child_of(id, target)?,
        }
        Ok(())
    }

    /// Record that `user` changed a page at `now`.
    pub fn touch(&mut self, id: Uuid, user: Uuid, now: i64) -> PageResult<()> {
        let version = self.require(id)?.version;
        self.tree_mut(version).modify(id, |page| {
            page.updated_by = user;
            page.changed = now;
        });
        Ok(())
    }

    /// Remove a page and its descendants, writing one audit record per
    /// removed page. Removed pages are returned in tree order.
    pub fn delete_page(&mut self, id: Uuid, user: Uuid, now: i64) -> PageResult<Vec<Page>> {
        let version = self.require(id)?.version;

        let mut subtree = vec![id];
        subtree.extend(self.tree(version).descendants(id).into_iter().map(|p| p.id));
        let paths: HashMap<Uuid, String> = subtree
            .iter()
            .filter_map(|pid| Some((*pid, self.path_of(*pid)?)))
            .collect();

        let removed = self.tree_mut(version).remove_subtree(id)?;
        for page in &removed {
            self.pending.removed.push(page.id);
            self.pending.deleted_pages.push(DeletedPage {
                id: Uuid::now_v7(),
                revision_id: page.revision_id,
                path: paths.get(&page.id).cloned().unwrap_or_default(),
                created_by: page.created_by,
                updated_by: user,
                created: now,
                changed: now,
            });
        }
        Ok(removed)
    }

    /// Drain recorded writes.
    pub fn take_changes(&mut self) -> Changes {
        let pending = std::mem::take(&mut self.pending);

        let mut pages: Vec<Page> = Vec::new();
        for version in [Version::Draft, Version::Published] {
            let touched = self.tree_mut(version).take_touched();
            let tree = self.tree(version);
            pages.extend(touched.into_iter().filter_map(|id| tree.get(id).cloned()));
        }
        pages.sort_by_key(|p| (p.depth, p.version == Version::Published, p.lft));

        Changes {
            site: pending.site.then(|| self.site.clone()),
            pages,
            removed: pending.removed,
            revision_sets: pending
                .revision_sets
                .iter()
                .filter_map(|id| self.revision_sets.get(id).cloned())
                .collect(),
            revisions: pending
                .revisions
                .iter()
                .filter_map(|id| self.revisions.get(id).cloned())
                .collect(),
            published: pending.published,
            deleted_pages: pending.deleted_pages,
        }
    }
}
