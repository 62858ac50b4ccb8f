//! Publish reconciliation.
//!
//! Projects one draft page onto the published tree: the published page at
//! the draft's path is reused when it belongs to the same revision set
//! lineage, otherwise it is replaced. A freshly created published page is
//! placed next to the published counterparts of its draft neighbours.
//!
//! Everything here mutates a [`SiteState`] only; the caller owns the
//! transaction and discards the state on error.

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{PageError, PageResult};
use crate::models::{NewPage, Page, Version};
use crate::site::{Position, SiteState};

/// How a published page ended up where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// An existing published page was reused in place.
    Kept,
    /// Created as a new published root.
    Root,
    /// Created after the published counterpart of the previous draft sibling.
    AfterPrevious,
    /// Created before the published counterpart of the next draft sibling.
    BeforeNext,
    /// Created as the last child of the published parent.
    LastChild,
}

/// Result of publishing one page.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// Draft page that was published.
    pub draft_id: Uuid,
    pub page: Page,
    pub created: bool,
    pub placement: Placement,

    /// Published pages deleted to make room, in deletion order.
    pub removed: Vec<Page>,
}

/// Publish the draft page `draft_id`.
///
/// Fails with [`PageError::UnpublishedParent`] when a new published page is
/// needed but the draft's parent has none.
pub fn publish(
    state: &mut SiteState,
    draft_id: Uuid,
    user: Uuid,
    now: i64,
) -> PageResult<PublishOutcome> {
    let draft = state
        .tree(Version::Draft)
        .get(draft_id)
        .cloned()
        .ok_or_else(|| PageError::field("id", "You can only publish draft pages."))?;
    let revision = state
        .revision_of(&draft)
        .cloned()
        .ok_or_else(|| PageError::field("id", "The page has no revision to publish."))?;
    let lineage = revision.revision_set_id;
    let mut removed = Vec::new();

    // The published page at the same path, if it is from this lineage.
    let mut existing = state
        .at_same_path(draft_id, Version::Published)
        .map(|p| (p.id, state.lineage_of(p)));
    if let Some((slot_id, slot_lineage)) = existing {
        if slot_lineage != Some(lineage) {
            debug!(
                page_id = %draft_id,
                stale = %slot_id,
                "replacing published page from another lineage"
            );
            removed.extend(state.delete_page(slot_id, user, now)?);
            existing = None;
        }
    }

    // A lineage holds at most one published slot; drop it if it moved.
    if existing.is_none() {
        if let Some(moved) = state.published_counterpart(draft_id).map(|p| p.id) {
            debug!(
                page_id = %draft_id,
                moved = %moved,
                "removing published page left at an old position"
            );
            removed.extend(state.delete_page(moved, user, now)?);
        }
    }

    let (page_id, created) = match existing {
        Some((id, _)) => (id, false),
        None => {
            let published_parent = match draft.parent_id {
                Some(parent_id) => Some(
                    state
                        .at_same_path(parent_id, Version::Published)
                        .map(|p| p.id)
                        .ok_or(PageError::UnpublishedParent { page_id: draft_id })?,
                ),
                None => None,
            };
            let page = state.insert_page(
                Version::Published,
                published_parent,
                NewPage {
                    slug: draft.slug.clone(),
                    created_by: draft.created_by,
                    updated_by: draft.updated_by,
                    revision_id: Some(revision.id),
                },
                now,
            )?;
            (page.id, true)
        }
    };

    // A fresh page is inserted already bound and keeps the draft's audit fields.
    state.set_revision(page_id, revision.id, user, now)?;
    state.mark_published(revision.id, now)?;

    let placement = if created {
        place_new_page(state, &draft, page_id)?
    } else {
        Placement::Kept
    };
    debug!(page_id = %draft_id, published_id = %page_id, ?placement, "page published");

    let page = state
        .page(page_id)
        .cloned()
        .ok_or_else(|| PageError::Storage(anyhow::anyhow!("published page {page_id} vanished")))?;
    Ok(PublishOutcome {
        draft_id,
        page,
        created,
        placement,
        removed,
    })
}

/// Order a new published page among its siblings by the draft's neighbours.
fn place_new_page(
    state: &mut SiteState,
    draft: &Page,
    page_id: Uuid,
) -> PageResult<Placement> {
    if draft.is_root() {
        return Ok(Placement::Root);
    }

    let previous = state
        .sibling_before(draft.id)
        .and_then(|prev| state.at_same_path(prev.id, Version::Published))
        .map(|p| p.id);
    if let Some(anchor) = previous {
        state.reposition(page_id, Position::NextSiblingOf(anchor))?;
        return Ok(Placement::AfterPrevious);
    }

    let next = state
        .sibling_after(draft.id)
        .and_then(|next| state.at_same_path(next.id, Version::Published))
        .map(|p| p.id);
    if let Some(anchor) = next {
        state.reposition(page_id, Position::PreviousSiblingOf(anchor))?;
        return Ok(Placement::BeforeNext);
    }

    Ok(Placement::LastChild)
}

/// Draft pages that must be published before `draft_id` can be.
///
/// Returns the ancestors, root first, that have no published page at
/// their path.
pub fn unpublished_ancestors(state: &SiteState, draft_id: Uuid) -> Vec<Uuid> {
    state
        .ancestors(draft_id)
        .into_iter()
        .filter(|a| state.at_same_path(a.id, Version::Published).is_none())
        .map(|a| a.id)
        .collect()
}

/// Remove the published page at a draft page's path, with its subtree.
pub fn unpublish(
    state: &mut SiteState,
    draft_id: Uuid,
    user: Uuid,
    now: i64,
) -> PageResult<Vec<Page>> {
    let published = state
        .at_same_path(draft_id, Version::Published)
        .map(|p| p.id)
        .ok_or_else(|| PageError::field("id", "The page is not published."))?;
    let removed = state.delete_page(published, user, now)?;
    debug!(page_id = %draft_id, removed = removed.len(), "page unpublished");
    Ok(removed)
}
