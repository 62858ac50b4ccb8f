//! Page commands.
//!
//! Each command validates its input against a [`SiteState`], collecting every
//! field error before anything is changed, then applies itself to the state.
//! Running a command inside a store session and committing it is the page
//! service's job.

pub mod rules;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::content::{ContentValidator, DefaultContentBuilder, PageBlocks};
use crate::definitions::DefinitionProvider;
use crate::error::{PageError, PageResult, ValidationErrors};
use crate::models::{NewPage, NewRevision, Page, Site, Version};
use crate::publish::{self, PublishOutcome};
use crate::site::{Position, SiteState};

/// Collaborators and audit data shared by every command.
#[derive(Clone, Copy)]
pub struct CommandContext<'a> {
    pub definitions: &'a dyn DefinitionProvider,
    pub validator: &'a dyn ContentValidator,

    /// Acting user.
    pub user: Uuid,

    /// Unix timestamp applied to every row written.
    pub now: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSite {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub path: String,
    pub homepage_title: String,
    pub layout_name: String,
    pub layout_version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddPage {
    pub parent_id: Uuid,
    pub slug: String,
    pub title: String,
    pub layout_name: String,
    pub layout_version: i32,

    /// Place the new page before this sibling instead of last.
    #[serde(default)]
    pub next_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyPage {
    pub page_id: Uuid,
    pub new_slug: String,
    pub new_title: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PublishPage {
    pub page_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnpublishPage {
    pub page_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MovePage {
    pub page_id: Uuid,
    pub parent_id: Uuid,
    #[serde(default)]
    pub next_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeletePage {
    pub page_id: Uuid,
}

/// Validate a new site and build its state with a draft homepage.
///
/// `host_path_taken` reports whether another site already answers on the
/// same host and path; the caller looks that up in storage.
pub fn create_site(
    ctx: &CommandContext<'_>,
    input: &CreateSite,
    host_path_taken: bool,
) -> PageResult<(SiteState, Page)> {
    let mut errors = ValidationErrors::new();
    rules::check_site_name(&mut errors, &input.name);
    rules::check_host(&mut errors, &input.host);
    rules::check_site_path(&mut errors, &input.path);
    if host_path_taken {
        errors.add("path", "A site already exists at this host and path.");
    }
    rules::check_title(&mut errors, "homepage_title", &input.homepage_title);
    rules::check_layout(
        &mut errors,
        ctx.definitions,
        &input.layout_name,
        input.layout_version,
    );
    errors.into_result()?;

    let mut state = SiteState::create(Site {
        id: Uuid::now_v7(),
        name: input.name.trim().to_string(),
        host: input.host.to_lowercase(),
        path: input.path.clone(),
        created_by: ctx.user,
        updated_by: ctx.user,
        created: ctx.now,
        changed: ctx.now,
    });
    let homepage = create_page(
        &mut state,
        ctx,
        None,
        "",
        &input.homepage_title,
        &input.layout_name,
        input.layout_version,
    )?;
    Ok((state, homepage))
}

/// Add a draft page under `parent_id` with default content for its layout.
pub fn add_page(
    state: &mut SiteState,
    ctx: &CommandContext<'_>,
    input: &AddPage,
) -> PageResult<Page> {
    let mut errors = ValidationErrors::new();
    let parent_ok = check_draft(state, &mut errors, "parent_id", input.parent_id);
    if let Some(next_id) = input.next_id {
        let next_parent = state.tree(Version::Draft).get(next_id).and_then(|p| p.parent_id);
        if next_parent != Some(input.parent_id) {
            errors.add("next_id", "The next page must be a child of the parent page.");
        }
    }
    rules::check_slug(&mut errors, "slug", &input.slug);
    if parent_ok && state.slug_taken(input.parent_id, &input.slug, None) {
        errors.add("slug", "The slug has already been taken.");
    }
    rules::check_title(&mut errors, "title", &input.title);
    rules::check_layout(
        &mut errors,
        ctx.definitions,
        &input.layout_name,
        input.layout_version,
    );
    errors.into_result()?;

    let page = create_page(
        state,
        ctx,
        Some(input.parent_id),
        &input.slug,
        &input.title,
        &input.layout_name,
        input.layout_version,
    )?;
    if let Some(next_id) = input.next_id {
        state.reposition(page.id, Position::PreviousSiblingOf(next_id))?;
    }
    current(state, page.id)
}

/// Add a sibling of a page carrying a copy of its content.
///
/// The copy lands under the source's parent, or under the source itself
/// when the source is the homepage. Descendants are not copied.
pub fn copy_page(
    state: &mut SiteState,
    ctx: &CommandContext<'_>,
    input: &CopyPage,
) -> PageResult<Page> {
    let mut errors = ValidationErrors::new();
    let source_ok = check_draft(state, &mut errors, "page_id", input.page_id);
    rules::check_slug(&mut errors, "new_slug", &input.new_slug);
    rules::check_title(&mut errors, "new_title", &input.new_title);
    if !source_ok {
        return Err(PageError::Validation(errors));
    }

    let (parent_id, source_revision) = {
        let source = current(state, input.page_id)?;
        let revision = state
            .revision_of(&source)
            .cloned()
            .ok_or_else(|| PageError::field("page_id", "The page has no content to copy."))?;
        (source.parent_id.unwrap_or(source.id), revision)
    };
    if state.slug_taken(parent_id, &input.new_slug, None) {
        errors.add("new_slug", "The slug has already been taken.");
    }
    errors.into_result()?;

    let page = create_page(
        state,
        ctx,
        Some(parent_id),
        &input.new_slug,
        &input.new_title,
        &source_revision.layout_name,
        source_revision.layout_version,
    )?;
    let set_id = state.lineage_of(&page).ok_or_else(|| {
        PageError::Storage(anyhow::anyhow!("copied page {} has no lineage", page.id))
    })?;
    let copied = state.create_revision(
        set_id,
        NewRevision {
            title: input.new_title.clone(),
            layout_name: source_revision.layout_name.clone(),
            layout_version: source_revision.layout_version,
            valid: ctx.validator.is_valid(&source_revision.blocks),
            blocks: source_revision.blocks,
            options: source_revision.options,
            created_by: ctx.user,
        },
        ctx.now,
    )?;
    state.set_revision(page.id, copied.id, ctx.user, ctx.now)?;
    debug!(source = %input.page_id, page_id = %page.id, "page content copied");
    current(state, page.id)
}

/// Publish one draft page.
pub fn publish_page(
    state: &mut SiteState,
    ctx: &CommandContext<'_>,
    input: &PublishPage,
) -> PageResult<PublishOutcome> {
    check_publishable(state, input.page_id)?;
    publish::publish(state, input.page_id, ctx.user, ctx.now)
}

/// Publish a draft page and then each of its descendants, parents first.
///
/// Every page in the subtree must be publishable; nothing is published
/// otherwise.
pub fn publish_page_tree(
    state: &mut SiteState,
    ctx: &CommandContext<'_>,
    input: &PublishPage,
) -> PageResult<Vec<PublishOutcome>> {
    check_publishable(state, input.page_id)?;

    let mut ids = vec![input.page_id];
    ids.extend(state.descendants(input.page_id).into_iter().map(|p| p.id));

    let mut errors = ValidationErrors::new();
    for id in &ids[1..] {
        let valid = state
            .page(*id)
            .and_then(|p| state.revision_of(p))
            .is_some_and(|r| r.valid);
        if !valid {
            let path = state.path_of(*id).unwrap_or_default();
            errors.add("page_id", format!("The page {path} has validation errors."));
        }
    }
    errors.into_result()?;

    ids.into_iter()
        .map(|id| publish::publish(state, id, ctx.user, ctx.now))
        .collect()
}

/// Remove the published version of a draft page and its subtree.
pub fn unpublish_page(
    state: &mut SiteState,
    ctx: &CommandContext<'_>,
    input: &UnpublishPage,
) -> PageResult<Vec<Page>> {
    let mut errors = ValidationErrors::new();
    check_draft(state, &mut errors, "page_id", input.page_id);
    errors.into_result()?;
    publish::unpublish(state, input.page_id, ctx.user, ctx.now)
}

/// Move a draft page, with its subtree, under a new parent.
pub fn move_page(
    state: &mut SiteState,
    ctx: &CommandContext<'_>,
    input: &MovePage,
) -> PageResult<Page> {
    let mut errors = ValidationErrors::new();
    let page_ok = check_draft(state, &mut errors, "page_id", input.page_id);
    let parent_ok = check_draft(state, &mut errors, "parent_id", input.parent_id);
    if page_ok && state.tree(Version::Draft).get(input.page_id).is_some_and(Page::is_root) {
        errors.add("page_id", "The homepage cannot be moved.");
    }
    if page_ok
        && parent_ok
        && (input.parent_id == input.page_id
            || state
                .tree(Version::Draft)
                .is_descendant_of(input.parent_id, input.page_id))
    {
        errors.add("parent_id", "A page cannot be moved below itself.");
    }
    if let Some(next_id) = input.next_id {
        let next_parent = state.tree(Version::Draft).get(next_id).and_then(|p| p.parent_id);
        if next_id == input.page_id || next_parent != Some(input.parent_id) {
            errors.add("next_id", "The next page must be a child of the parent page.");
        }
    }
    if page_ok && parent_ok {
        let slug = state
            .page(input.page_id)
            .map(|p| p.slug.clone())
            .unwrap_or_default();
        if state.slug_taken(input.parent_id, &slug, Some(input.page_id)) {
            errors.add("parent_id", "The parent already has a page with this slug.");
        }
    }
    errors.into_result()?;

    let position = match input.next_id {
        Some(next_id) => Position::PreviousSiblingOf(next_id),
        None => Position::LastChildOf(input.parent_id),
    };
    state.reposition(input.page_id, position)?;
    state.touch(input.page_id, ctx.user, ctx.now)?;
    current(state, input.page_id)
}

/// Delete a draft page and its descendants.
pub fn delete_page(
    state: &mut SiteState,
    ctx: &CommandContext<'_>,
    input: &DeletePage,
) -> PageResult<Vec<Page>> {
    let mut errors = ValidationErrors::new();
    if check_draft(state, &mut errors, "page_id", input.page_id)
        && state.tree(Version::Draft).get(input.page_id).is_some_and(Page::is_root)
    {
        errors.add("page_id", "The homepage cannot be deleted.");
    }
    errors.into_result()?;
    state.delete_page(input.page_id, ctx.user, ctx.now)
}

/// Create a draft page with a new lineage and default content.
fn create_page(
    state: &mut SiteState,
    ctx: &CommandContext<'_>,
    parent_id: Option<Uuid>,
    slug: &str,
    title: &str,
    layout_name: &str,
    layout_version: i32,
) -> PageResult<Page> {
    let defaults = DefaultContentBuilder::new(ctx.definitions)
        .build(layout_name, layout_version)
        .map_err(|e| PageError::field("layout_name", e.to_string()))?;
    let valid = defaults.is_complete() && ctx.validator.is_valid(&defaults.blocks);

    let page = state.insert_page(
        Version::Draft,
        parent_id,
        NewPage {
            slug: slug.to_string(),
            created_by: ctx.user,
            updated_by: ctx.user,
            revision_id: None,
        },
        ctx.now,
    )?;
    let set = state.create_revision_set(ctx.now);
    let revision = state.create_revision(
        set.id,
        new_revision(ctx, title, layout_name, layout_version, defaults.blocks, valid),
        ctx.now,
    )?;
    state.set_revision(page.id, revision.id, ctx.user, ctx.now)?;
    current(state, page.id)
}

fn new_revision(
    ctx: &CommandContext<'_>,
    title: &str,
    layout_name: &str,
    layout_version: i32,
    blocks: PageBlocks,
    valid: bool,
) -> NewRevision {
    NewRevision {
        title: title.to_string(),
        layout_name: layout_name.to_string(),
        layout_version,
        blocks,
        options: None,
        valid,
        created_by: ctx.user,
    }
}

/// Record an error unless `id` is a draft page of this site.
fn check_draft(state: &SiteState, errors: &mut ValidationErrors, field: &str, id: Uuid) -> bool {
    match state.page(id) {
        Some(page) if page.is_draft() => true,
        Some(_) => {
            errors.add(field, "The page must be a draft page.");
            false
        }
        None => {
            errors.add(field, "The page does not exist.");
            false
        }
    }
}

/// Publish preconditions: a valid draft whose ancestors are all published.
fn check_publishable(state: &SiteState, page_id: Uuid) -> PageResult<()> {
    let mut errors = ValidationErrors::new();
    match state.page(page_id) {
        None => errors.add("page_id", "The page does not exist."),
        Some(page) if !page.is_draft() => {
            errors.add("page_id", "You can only publish draft pages.");
        }
        Some(page) => {
            if !state.revision_of(page).is_some_and(|r| r.valid) {
                errors.add("page_id", "You cannot publish a page with validation errors.");
            }
        }
    }
    errors.into_result()?;

    if !publish::unpublished_ancestors(state, page_id).is_empty() {
        return Err(PageError::UnpublishedParent { page_id });
    }
    Ok(())
}

fn current(state: &SiteState, id: Uuid) -> PageResult<Page> {
    state
        .page(id)
        .cloned()
        .ok_or_else(|| PageError::Storage(anyhow::anyhow!("page {id} is missing from its site")))
}
