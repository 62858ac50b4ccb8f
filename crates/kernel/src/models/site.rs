//! Site model.
//!
//! A site owns one draft tree and one published tree of pages.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Site record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Site {
    pub id: Uuid,
    pub name: String,

    /// Host name the site is served from.
    pub host: String,

    /// Path prefix under the host; empty for the host root.
    pub path: String,

    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created: i64,
    pub changed: i64,
}

impl Site {
    /// Find a site by ID.
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>> {
        let site = sqlx::query_as::<_, Site>(
            r#"
            SELECT id, name, host, path, created_by, updated_by, created, changed
            FROM site
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("failed to fetch site by id")?;

        Ok(site)
    }

    /// List all sites ordered by name.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let sites = sqlx::query_as::<_, Site>(
            r#"
            SELECT id, name, host, path, created_by, updated_by, created, changed
            FROM site
            ORDER BY name
            "#,
        )
        .fetch_all(pool)
        .await
        .context("failed to list sites")?;

        Ok(sites)
    }

    /// Lock a site row for the rest of the transaction.
    ///
    /// Every structural write to either of the site's trees takes this lock
    /// first, so boundary renumbering within a site is serialized.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>> {
        let site = sqlx::query_as::<_, Site>(
            r#"
            SELECT id, name, host, path, created_by, updated_by, created, changed
            FROM site
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("failed to lock site")?;

        Ok(site)
    }

    /// Check whether another site already answers on `host` + `path`.
    pub async fn host_path_taken(conn: &mut PgConnection, host: &str, path: &str) -> Result<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM site WHERE host = $1 AND path = $2)",
        )
        .bind(host)
        .bind(path)
        .fetch_one(conn)
        .await
        .context("failed to check site host and path")?;

        Ok(taken)
    }

    pub async fn insert(conn: &mut PgConnection, site: &Site) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO site (id, name, host, path, created_by, updated_by, created, changed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(site.id)
        .bind(&site.name)
        .bind(&site.host)
        .bind(&site.path)
        .bind(site.created_by)
        .bind(site.updated_by)
        .bind(site.created)
        .bind(site.changed)
        .execute(conn)
        .await
        .context("failed to insert site")?;

        Ok(())
    }
}
