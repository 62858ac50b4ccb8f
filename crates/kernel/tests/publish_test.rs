#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Publishing integration tests.
//!
//! Runs publish, publish-tree and unpublish through the page service and
//! checks the shape of the published tree afterwards.

mod common;

use canopy_kernel::PageError;
use canopy_kernel::commands::{DeletePage, MovePage, PublishPage, UnpublishPage};
use canopy_kernel::models::Version;
use canopy_kernel::publish::Placement;

use common::TestApp;

// -------------------------------------------------------------------------
// Sibling ordering
// -------------------------------------------------------------------------

#[tokio::test]
async fn publish_follows_previous_sibling() {
    let app = TestApp::new();
    let (site, home) = app.create_site("after.example.com").await;
    let a = app.add(home.id, "a").await;
    let b = app.add(home.id, "b").await;
    let c = app.add(home.id, "c").await;

    app.publish(home.id).await;
    app.publish(a.id).await;
    app.publish(c.id).await;
    let outcome = app
        .service
        .publish_page(PublishPage { page_id: b.id }, app.user)
        .await
        .unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.placement, Placement::AfterPrevious);
    assert_eq!(
        app.paths(site.id, Version::Published).await,
        vec!["/", "/a", "/b", "/c"]
    );
    app.assert_well_formed(site.id).await;
}

#[tokio::test]
async fn publish_precedes_next_sibling() {
    let app = TestApp::new();
    let (site, home) = app.create_site("before.example.com").await;
    let a = app.add(home.id, "a").await;
    let b = app.add(home.id, "b").await;
    let c = app.add(home.id, "c").await;

    app.publish(home.id).await;
    app.publish(c.id).await;

    let outcome = app
        .service
        .publish_page(PublishPage { page_id: b.id }, app.user)
        .await
        .unwrap();
    assert_eq!(outcome.placement, Placement::BeforeNext);

    let outcome = app
        .service
        .publish_page(PublishPage { page_id: a.id }, app.user)
        .await
        .unwrap();
    assert_eq!(outcome.placement, Placement::BeforeNext);

    assert_eq!(
        app.paths(site.id, Version::Published).await,
        vec!["/", "/a", "/b", "/c"]
    );
}

#[tokio::test]
async fn publish_without_published_neighbours_appends() {
    let app = TestApp::new();
    let (site, home) = app.create_site("append.example.com").await;
    let _a = app.add(home.id, "a").await;
    let b = app.add(home.id, "b").await;
    let _c = app.add(home.id, "c").await;

    let root = app
        .service
        .publish_page(PublishPage { page_id: home.id }, app.user)
        .await
        .unwrap();
    assert_eq!(root.placement, Placement::Root);

    let outcome = app
        .service
        .publish_page(PublishPage { page_id: b.id }, app.user)
        .await
        .unwrap();
    assert_eq!(outcome.placement, Placement::LastChild);
    assert_eq!(app.paths(site.id, Version::Published).await, vec!["/", "/b"]);
}

// -------------------------------------------------------------------------
// Idempotence and content
// -------------------------------------------------------------------------

#[tokio::test]
async fn republishing_reuses_the_published_page() {
    let app = TestApp::new();
    let (site, home) = app.create_site("again.example.com").await;
    let a = app.add(home.id, "a").await;
    app.publish(home.id).await;

    let first = app
        .service
        .publish_page(PublishPage { page_id: a.id }, app.user)
        .await
        .unwrap();
    let before = app.service.tree(site.id, Version::Published).await.unwrap();

    let second = app
        .service
        .publish_page(PublishPage { page_id: a.id }, app.user)
        .await
        .unwrap();
    let after = app.service.tree(site.id, Version::Published).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(second.placement, Placement::Kept);
    assert_eq!(first.page.id, second.page.id);
    assert!(second.removed.is_empty());

    let ids = |tree: &[canopy_kernel::TreeEntry]| {
        tree.iter()
            .map(|e| (e.page.id, e.page.lft, e.page.rgt))
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&before), ids(&after));
}

#[tokio::test]
async fn published_page_shares_the_draft_revision() {
    let app = TestApp::new();
    let (_site, home) = app.create_site("shared.example.com").await;
    let published = app.publish(home.id).await;

    assert_eq!(published.version, Version::Published);
    assert_eq!(published.revision_id, home.revision_id);

    let revision = app
        .service
        .revision(home.revision_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(revision.is_published());
}

// -------------------------------------------------------------------------
// Parent gate
// -------------------------------------------------------------------------

#[tokio::test]
async fn unpublished_parent_blocks_publish() {
    let app = TestApp::new();
    let (site, home) = app.create_site("gate.example.com").await;
    let a = app.add(home.id, "a").await;
    let x = app.add(a.id, "x").await;
    app.publish(home.id).await;

    let err = app
        .service
        .publish_page(PublishPage { page_id: x.id }, app.user)
        .await
        .unwrap_err();
    assert!(matches!(err, PageError::UnpublishedParent { page_id } if page_id == x.id));
    assert_eq!(app.paths(site.id, Version::Published).await, vec!["/"]);

    app.publish(a.id).await;
    app.publish(x.id).await;
    assert_eq!(
        app.paths(site.id, Version::Published).await,
        vec!["/", "/a", "/a/x"]
    );
    app.assert_well_formed(site.id).await;
}

#[tokio::test]
async fn invalid_draft_cannot_be_published() {
    let app = TestApp::new();
    let (site, home) = app.create_site("invalid.example.com").await;
    let broken = app.add_with_layout(home.id, "broken", "broken").await;
    app.publish(home.id).await;

    let err = app
        .service
        .publish_page(PublishPage { page_id: broken.id }, app.user)
        .await
        .unwrap_err();
    let errors = err.validation_errors().expect("validation error");
    assert!(errors.has("page_id"));
    assert_eq!(app.paths(site.id, Version::Published).await, vec!["/"]);
}

// -------------------------------------------------------------------------
// Lineage reconciliation
// -------------------------------------------------------------------------

#[tokio::test]
async fn new_lineage_replaces_stale_published_page() {
    let app = TestApp::new();
    let (site, home) = app.create_site("stale.example.com").await;
    let old = app.add(home.id, "news").await;
    let old_child = app.add(old.id, "today").await;
    app.publish(home.id).await;
    let old_published = app.publish(old.id).await;
    app.publish(old_child.id).await;

    app.service
        .delete_page(DeletePage { page_id: old.id }, app.user)
        .await
        .unwrap();
    let replacement = app.add(home.id, "news").await;

    let outcome = app
        .service
        .publish_page(PublishPage { page_id: replacement.id }, app.user)
        .await
        .unwrap();

    assert!(outcome.created);
    assert_ne!(outcome.page.id, old_published.id);
    assert_eq!(outcome.removed.len(), 2);
    assert_eq!(outcome.removed[0].id, old_published.id);
    assert_eq!(
        app.paths(site.id, Version::Published).await,
        vec!["/", "/news"]
    );
    app.assert_well_formed(site.id).await;
}

#[tokio::test]
async fn moved_page_leaves_no_published_copy_behind() {
    let app = TestApp::new();
    let (site, home) = app.create_site("moved.example.com").await;
    let a = app.add(home.id, "a").await;
    let b = app.add(home.id, "b").await;
    app.publish(home.id).await;
    app.publish(a.id).await;
    let old = app.publish(b.id).await;

    app.service
        .move_page(
            MovePage {
                page_id: b.id,
                parent_id: a.id,
                next_id: None,
            },
            app.user,
        )
        .await
        .unwrap();
    // Moving a draft does not touch the published tree.
    assert_eq!(
        app.paths(site.id, Version::Published).await,
        vec!["/", "/a", "/b"]
    );

    let outcome = app
        .service
        .publish_page(PublishPage { page_id: b.id }, app.user)
        .await
        .unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.removed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![old.id]);
    assert_eq!(
        app.paths(site.id, Version::Published).await,
        vec!["/", "/a", "/a/b"]
    );
    app.assert_well_formed(site.id).await;
}

// -------------------------------------------------------------------------
// Publish tree and unpublish
// -------------------------------------------------------------------------

#[tokio::test]
async fn publish_tree_publishes_every_descendant_in_order() {
    let app = TestApp::new();
    let (site, home) = app.create_site("tree.example.com").await;
    let a = app.add(home.id, "a").await;
    app.add(a.id, "x").await;
    app.add(a.id, "y").await;
    app.add(home.id, "b").await;

    let outcomes = app
        .service
        .publish_page_tree(PublishPage { page_id: home.id }, app.user)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.created));
    assert_eq!(
        app.paths(site.id, Version::Published).await,
        app.paths(site.id, Version::Draft).await
    );
    app.assert_well_formed(site.id).await;
}

#[tokio::test]
async fn publish_tree_is_all_or_nothing() {
    let app = TestApp::new();
    let (site, home) = app.create_site("atomic.example.com").await;
    let a = app.add(home.id, "a").await;
    app.add_with_layout(a.id, "broken", "broken").await;

    let err = app
        .service
        .publish_page_tree(PublishPage { page_id: home.id }, app.user)
        .await
        .unwrap_err();
    assert!(err.validation_errors().is_some());
    assert!(app.paths(site.id, Version::Published).await.is_empty());
    app.assert_well_formed(site.id).await;
}

#[tokio::test]
async fn unpublish_removes_the_published_subtree() {
    let app = TestApp::new();
    let (site, home) = app.create_site("offline.example.com").await;
    let a = app.add(home.id, "a").await;
    app.add(a.id, "x").await;
    app.add(home.id, "b").await;
    app.service
        .publish_page_tree(PublishPage { page_id: home.id }, app.user)
        .await
        .unwrap();

    let removed = app
        .service
        .unpublish_page(UnpublishPage { page_id: a.id }, app.user)
        .await
        .unwrap();

    assert_eq!(removed.len(), 2);
    assert_eq!(app.paths(site.id, Version::Published).await, vec!["/", "/b"]);
    assert_eq!(
        app.paths(site.id, Version::Draft).await,
        vec!["/", "/a", "/a/x", "/b"]
    );
    app.assert_well_formed(site.id).await;
}
