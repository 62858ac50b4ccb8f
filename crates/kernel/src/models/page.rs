//! Page model and persistence.
//!
//! A page is a node in one of a site's two trees (draft or published). Its
//! position is held as nested-set boundaries; the content lives in the
//! revision it points to.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::tree::{Bounds, NestedNode};

/// Which of a site's two trees a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    Draft,
    Published,
}

impl Version {
    /// Return the string representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl std::str::FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            _ => Err(anyhow::anyhow!(
                "invalid page version: {s:?} (expected draft or published)"
            )),
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One independent nested-set tree: a site in a given version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub site_id: Uuid,
    pub version: Version,
}

/// Page record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Unique identifier (UUIDv7).
    pub id: Uuid,

    /// Owning site.
    pub site_id: Uuid,

    /// Draft or published tree.
    pub version: Version,

    /// URL segment, unique among siblings. Empty for a site's homepage.
    pub slug: String,

    /// Parent page; `None` only for the tree root.
    pub parent_id: Option<Uuid>,

    /// Nested-set left boundary.
    pub lft: i32,

    /// Nested-set right boundary.
    pub rgt: i32,

    /// Distance from the root (root = 0).
    pub depth: i32,

    /// Current revision.
    pub revision_id: Option<Uuid>,

    pub created_by: Uuid,
    pub updated_by: Uuid,

    /// Unix timestamp when created.
    pub created: i64,

    /// Unix timestamp when last changed.
    pub changed: i64,
}

impl Page {
    /// The scope this page lives in.
    pub fn scope(&self) -> Scope {
        Scope {
            site_id: self.site_id,
            version: self.version,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.version == Version::Draft
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl NestedNode for Page {
    fn node_id(&self) -> Uuid {
        self.id
    }

    fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    fn set_parent_id(&mut self, parent: Option<Uuid>) {
        self.parent_id = parent;
    }

    fn bounds(&self) -> Bounds {
        Bounds {
            lft: self.lft,
            rgt: self.rgt,
            depth: self.depth,
        }
    }

    fn set_bounds(&mut self, bounds: Bounds) {
        self.lft = bounds.lft;
        self.rgt = bounds.rgt;
        self.depth = bounds.depth;
    }
}

/// Attributes for a page that has not been placed in a tree yet.
#[derive(Debug, Clone)]
pub struct NewPage {
    pub slug: String,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub revision_id: Option<Uuid>,
}

/// Audit record written when a page is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeletedPage {
    pub id: Uuid,

    /// Revision the page pointed to when it was deleted.
    pub revision_id: Option<Uuid>,

    /// Resolved path of the page at deletion time.
    pub path: String,

    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created: i64,
    pub changed: i64,
}

/// Row type for reading Page from DB (version stored as VARCHAR).
#[derive(sqlx::FromRow)]
struct PageRow {
    id: Uuid,
    site_id: Uuid,
    version: String,
    slug: String,
    parent_id: Option<Uuid>,
    lft: i32,
    rgt: i32,
    depth: i32,
    revision_id: Option<Uuid>,
    created_by: Uuid,
    updated_by: Uuid,
    created: i64,
    changed: i64,
}

impl TryFrom<PageRow> for Page {
    type Error = anyhow::Error;

    fn try_from(row: PageRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            site_id: row.site_id,
            version: row.version.parse()?,
            slug: row.slug,
            parent_id: row.parent_id,
            lft: row.lft,
            rgt: row.rgt,
            depth: row.depth,
            revision_id: row.revision_id,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created: row.created,
            changed: row.changed,
        })
    }
}

impl Page {
    /// Load every page of a site, both versions.
    pub async fn list_for_site(conn: &mut PgConnection, site_id: Uuid) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, PageRow>(
            r#"
            SELECT id, site_id, version, slug, parent_id, lft, rgt, depth, revision_id,
                   created_by, updated_by, created, changed
            FROM page
            WHERE site_id = $1
            ORDER BY version, lft
            "#,
        )
        .bind(site_id)
        .fetch_all(conn)
        .await
        .context("failed to list pages for site")?;

        rows.into_iter().map(Page::try_from).collect()
    }

    /// Find which site a page belongs to.
    pub async fn site_of(conn: &mut PgConnection, id: Uuid) -> Result<Option<Uuid>> {
        let site_id = sqlx::query_scalar::<_, Uuid>("SELECT site_id FROM page WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context("failed to look up page site")?;

        Ok(site_id)
    }

    /// Insert or update a page row.
    pub async fn upsert(conn: &mut PgConnection, page: &Page) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO page (id, site_id, version, slug, parent_id, lft, rgt, depth, revision_id,
                              created_by, updated_by, created, changed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                slug = EXCLUDED.slug,
                parent_id = EXCLUDED.parent_id,
                lft = EXCLUDED.lft,
                rgt = EXCLUDED.rgt,
                depth = EXCLUDED.depth,
                revision_id = EXCLUDED.revision_id,
                updated_by = EXCLUDED.updated_by,
                changed = EXCLUDED.changed
            "#,
        )
        .bind(page.id)
        .bind(page.site_id)
        .bind(page.version.as_str())
        .bind(&page.slug)
        .bind(page.parent_id)
        .bind(page.lft)
        .bind(page.rgt)
        .bind(page.depth)
        .bind(page.revision_id)
        .bind(page.created_by)
        .bind(page.updated_by)
        .bind(page.created)
        .bind(page.changed)
        .execute(conn)
        .await
        .context("failed to upsert page")?;

        Ok(())
    }

    /// Delete page rows by id.
    pub async fn delete_many(conn: &mut PgConnection, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM page WHERE id = ANY($1)")
            .bind(ids)
            .execute(conn)
            .await
            .context("failed to delete pages")?;

        Ok(result.rows_affected())
    }
}

impl DeletedPage {
    /// Record a deleted page.
    pub async fn insert(conn: &mut PgConnection, record: &DeletedPage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO deleted_page (id, revision_id, path, created_by, updated_by,
                                      created, changed)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.revision_id)
        .bind(&record.path)
        .bind(record.created_by)
        .bind(record.updated_by)
        .bind(record.created)
        .bind(record.changed)
        .execute(conn)
        .await
        .context("failed to insert deleted page record")?;

        Ok(())
    }

    /// List deletion records for a revision.
    pub async fn list_for_revision(
        conn: &mut PgConnection,
        revision_id: Uuid,
    ) -> Result<Vec<Self>> {
        let records = sqlx::query_as::<_, DeletedPage>(
            r#"
            SELECT id, revision_id, path, created_by, updated_by, created, changed
            FROM deleted_page
            WHERE revision_id = $1
            ORDER BY created DESC
            "#,
        )
        .bind(revision_id)
        .fetch_all(conn)
        .await
        .context("failed to list deleted pages")?;

        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn version_round_trips_through_str() {
        for v in [Version::Draft, Version::Published] {
            assert_eq!(v.as_str().parse::<Version>().unwrap(), v);
        }
        assert!("live".parse::<Version>().is_err());
    }

    #[test]
    fn version_serializes_lowercase() {
        let json = serde_json::to_string(&Version::Published).unwrap();
        assert_eq!(json, "\"published\"");
    }
}
