//! Revision and revision set models.
//!
//! Revisions are write-once snapshots of a page's content. The only column
//! that changes after insert is `published_at`. A revision set groups every
//! revision of one conceptual page (its lineage) across the draft and
//! published trees.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::types::Json;
use uuid::Uuid;

use crate::content::PageBlocks;

/// Lineage grouping for the revisions of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RevisionSet {
    pub id: Uuid,
    pub site_id: Uuid,
    pub created: i64,
}

/// Immutable content snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: Uuid,

    /// Lineage this revision belongs to.
    pub revision_set_id: Uuid,

    pub title: String,
    pub layout_name: String,
    pub layout_version: i32,

    /// Region -> section -> block content.
    pub blocks: PageBlocks,

    pub options: Option<serde_json::Value>,

    /// Whether content validation passed when the revision was created.
    pub valid: bool,

    /// Unix timestamp of the first publish of this revision.
    pub published_at: Option<i64>,

    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created: i64,
    pub changed: i64,
}

/// Content for a revision about to be created.
#[derive(Debug, Clone)]
pub struct NewRevision {
    pub title: String,
    pub layout_name: String,
    pub layout_version: i32,
    pub blocks: PageBlocks,
    pub options: Option<serde_json::Value>,
    pub valid: bool,
    pub created_by: Uuid,
}

#[derive(sqlx::FromRow)]
struct RevisionRow {
    id: Uuid,
    revision_set_id: Uuid,
    title: String,
    layout_name: String,
    layout_version: i32,
    blocks: Json<PageBlocks>,
    options: Option<serde_json::Value>,
    valid: bool,
    published_at: Option<i64>,
    created_by: Uuid,
    updated_by: Uuid,
    created: i64,
    changed: i64,
}

impl From<RevisionRow> for Revision {
    fn from(row: RevisionRow) -> Self {
        Self {
            id: row.id,
            revision_set_id: row.revision_set_id,
            title: row.title,
            layout_name: row.layout_name,
            layout_version: row.layout_version,
            blocks: row.blocks.0,
            options: row.options,
            valid: row.valid,
            published_at: row.published_at,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created: row.created,
            changed: row.changed,
        }
    }
}

impl Revision {
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    /// Load the revisions currently referenced by any page of a site.
    pub async fn list_referenced_by_site(
        conn: &mut PgConnection,
        site_id: Uuid,
    ) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, RevisionRow>(
            r#"
            SELECT r.id, r.revision_set_id, r.title, r.layout_name, r.layout_version,
                   r.blocks, r.options, r.valid, r.published_at, r.created_by, r.updated_by,
                   r.created, r.changed
            FROM revision r
            WHERE r.id IN (
                SELECT revision_id FROM page WHERE site_id = $1 AND revision_id IS NOT NULL
            )
            "#,
        )
        .bind(site_id)
        .fetch_all(conn)
        .await
        .context("failed to load site revisions")?;

        Ok(rows.into_iter().map(Revision::from).collect())
    }

    /// Fetch a single revision.
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, RevisionRow>(
            r#"
            SELECT id, revision_set_id, title, layout_name, layout_version, blocks,
                   options, valid, published_at, created_by, updated_by, created, changed
            FROM revision
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("failed to fetch revision")?;

        Ok(row.map(Revision::from))
    }

    /// List a lineage's history, newest first.
    pub async fn list_for_set(conn: &mut PgConnection, set_id: Uuid) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, RevisionRow>(
            r#"
            SELECT id, revision_set_id, title, layout_name, layout_version, blocks,
                   options, valid, published_at, created_by, updated_by, created, changed
            FROM revision
            WHERE revision_set_id = $1
            ORDER BY created DESC, id DESC
            "#,
        )
        .bind(set_id)
        .fetch_all(conn)
        .await
        .context("failed to list revisions for set")?;

        Ok(rows.into_iter().map(Revision::from).collect())
    }

    /// Insert a new revision row.
    pub async fn insert(conn: &mut PgConnection, revision: &Revision) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO revision (id, revision_set_id, title, layout_name, layout_version,
                                  blocks, options, valid, published_at, created_by,
                                  updated_by, created, changed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(revision.id)
        .bind(revision.revision_set_id)
        .bind(&revision.title)
        .bind(&revision.layout_name)
        .bind(revision.layout_version)
        .bind(Json(&revision.blocks))
        .bind(&revision.options)
        .bind(revision.valid)
        .bind(revision.published_at)
        .bind(revision.created_by)
        .bind(revision.updated_by)
        .bind(revision.created)
        .bind(revision.changed)
        .execute(conn)
        .await
        .context("failed to insert revision")?;

        Ok(())
    }

    /// Stamp the publish time, keeping the first stamp if one exists.
    pub async fn mark_published(conn: &mut PgConnection, id: Uuid, when: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE revision
            SET published_at = COALESCE(published_at, $1), changed = $1
            WHERE id = $2
            "#,
        )
        .bind(when)
        .bind(id)
        .execute(conn)
        .await
        .context("failed to mark revision published")?;

        Ok(())
    }
}

impl RevisionSet {
    /// Load every revision set of a site.
    pub async fn list_for_site(conn: &mut PgConnection, site_id: Uuid) -> Result<Vec<Self>> {
        let sets = sqlx::query_as::<_, RevisionSet>(
            "SELECT id, site_id, created FROM revision_set WHERE site_id = $1",
        )
        .bind(site_id)
        .fetch_all(conn)
        .await
        .context("failed to list revision sets")?;

        Ok(sets)
    }

    pub async fn insert(conn: &mut PgConnection, set: &RevisionSet) -> Result<()> {
        sqlx::query("INSERT INTO revision_set (id, site_id, created) VALUES ($1, $2, $3)")
            .bind(set.id)
            .bind(set.site_id)
            .bind(set.created)
            .execute(conn)
            .await
            .context("failed to insert revision set")?;

        Ok(())
    }
}
