#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Tests run the real page service against the in-memory store, with the
//! definition fixtures from `canopy-test-utils`.

#![allow(dead_code)]

use std::sync::Arc;

use canopy_kernel::commands::{AddPage, CreateSite, PublishPage};
use canopy_kernel::definitions::{DefinitionKind, DefinitionRegistry};
use canopy_kernel::models::{Page, Site, Version};
use canopy_kernel::{MemoryPageStore, PageService, PageStore};
use canopy_test_utils::definitions;
use uuid::Uuid;

/// A registry holding every definition fixture.
pub fn registry() -> DefinitionRegistry {
    let mut registry = DefinitionRegistry::new();
    for layout in definitions::layouts() {
        registry.insert_value(DefinitionKind::Layout, layout).unwrap();
    }
    for region in definitions::regions() {
        registry.insert_value(DefinitionKind::Region, region).unwrap();
    }
    for block in definitions::blocks() {
        registry.insert_value(DefinitionKind::Block, block).unwrap();
    }
    registry
}

/// Page service over a fresh in-memory store.
pub struct TestApp {
    pub service: PageService,
    pub store: MemoryPageStore,
    pub user: Uuid,
}

impl TestApp {
    pub fn new() -> Self {
        let store = MemoryPageStore::new();
        let service = PageService::with_defaults(Arc::new(store.clone()), Arc::new(registry()));
        Self {
            service,
            store,
            user: canopy_test_utils::test_user("editor").id,
        }
    }

    /// Create a site at `host` with a `basic` homepage.
    pub async fn create_site(&self, host: &str) -> (Site, Page) {
        self.service
            .create_site(
                CreateSite {
                    name: "Test site".to_string(),
                    host: host.to_string(),
                    path: String::new(),
                    homepage_title: "Home".to_string(),
                    layout_name: "basic".to_string(),
                    layout_version: 1,
                },
                self.user,
            )
            .await
            .unwrap()
    }

    /// Add a `basic` draft page as the last child of `parent`.
    pub async fn add(&self, parent: Uuid, slug: &str) -> Page {
        self.add_with_layout(parent, slug, "basic").await
    }

    pub async fn add_with_layout(&self, parent: Uuid, slug: &str, layout: &str) -> Page {
        self.service
            .add_page(
                AddPage {
                    parent_id: parent,
                    slug: slug.to_string(),
                    title: slug.to_uppercase(),
                    layout_name: layout.to_string(),
                    layout_version: 1,
                    next_id: None,
                },
                self.user,
            )
            .await
            .unwrap()
    }

    pub async fn publish(&self, page: Uuid) -> Page {
        self.service
            .publish_page(PublishPage { page_id: page }, self.user)
            .await
            .unwrap()
            .page
    }

    /// Paths of one tree, in tree order.
    pub async fn paths(&self, site: Uuid, version: Version) -> Vec<String> {
        self.service
            .tree(site, version)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect()
    }

    /// Assert both trees of a site are well-formed.
    pub async fn assert_well_formed(&self, site: Uuid) {
        let state = self.store.snapshot(site).await.unwrap().unwrap();
        state.verify().unwrap();
    }
}
