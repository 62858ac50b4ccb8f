//! In-process page store.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{PageStore, SiteSession};
use crate::models::{DeletedPage, Revision, Site};
use crate::site::{Changes, SiteState};

/// Page store holding committed site states in memory.
///
/// Each site sits behind its own async mutex; a session holds that lock
/// and works on a copy which replaces the committed state on commit.
#[derive(Clone, Default)]
pub struct MemoryPageStore {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    states: DashMap<Uuid, Arc<AsyncMutex<SiteState>>>,
    sites: DashMap<Uuid, Site>,
    page_sites: DashMap<Uuid, Uuid>,
    deleted: Mutex<Vec<DeletedPage>>,
}

impl MemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_lock(&self, site_id: Uuid) -> Option<Arc<AsyncMutex<SiteState>>> {
        self.shared.states.get(&site_id).map(|s| s.value().clone())
    }

    /// Committed states of every site.
    async fn all_states(&self) -> Vec<SiteState> {
        let locks: Vec<_> = self
            .shared
            .states
            .iter()
            .map(|s| s.value().clone())
            .collect();
        let mut states = Vec::with_capacity(locks.len());
        for lock in locks {
            states.push(lock.lock().await.clone());
        }
        states
    }
}

impl Shared {
    fn record(&self, changes: &Changes) {
        for id in &changes.removed {
            self.page_sites.remove(id);
        }
        for page in &changes.pages {
            self.page_sites.insert(page.id, page.site_id);
        }
        self.deleted
            .lock()
            .extend(changes.deleted_pages.iter().cloned());
    }
}

#[async_trait]
impl PageStore for MemoryPageStore {
    async fn open(&self, site_id: Uuid) -> Result<Option<Box<dyn SiteSession>>> {
        let Some(lock) = self.state_lock(site_id) else {
            return Ok(None);
        };
        let guard = lock.lock_owned().await;
        let working = guard.clone();
        Ok(Some(Box::new(MemorySiteSession {
            shared: self.shared.clone(),
            committed: Some(guard),
            working,
        })))
    }

    async fn create(&self, state: SiteState) -> Result<Box<dyn SiteSession>> {
        Ok(Box::new(MemorySiteSession {
            shared: self.shared.clone(),
            committed: None,
            working: state,
        }))
    }

    async fn snapshot(&self, site_id: Uuid) -> Result<Option<SiteState>> {
        let Some(lock) = self.state_lock(site_id) else {
            return Ok(None);
        };
        let state = lock.lock().await.clone();
        Ok(Some(state))
    }

    async fn site_of_page(&self, page_id: Uuid) -> Result<Option<Uuid>> {
        Ok(self.shared.page_sites.get(&page_id).map(|s| *s.value()))
    }

    async fn host_path_taken(&self, host: &str, path: &str) -> Result<bool> {
        Ok(self
            .shared
            .sites
            .iter()
            .any(|s| s.host == host && s.path == path))
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let mut sites: Vec<Site> = self.shared.sites.iter().map(|s| s.value().clone()).collect();
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    async fn find_revision(&self, id: Uuid) -> Result<Option<Revision>> {
        Ok(self
            .all_states()
            .await
            .iter()
            .find_map(|state| state.revision(id).cloned()))
    }

    async fn revision_history(&self, set_id: Uuid) -> Result<Vec<Revision>> {
        for state in self.all_states().await {
            if state.revision_set(set_id).is_some() {
                return Ok(state.revisions_in_set(set_id).into_iter().cloned().collect());
            }
        }
        Ok(Vec::new())
    }

    async fn deleted_pages(&self, revision_id: Uuid) -> Result<Vec<DeletedPage>> {
        let mut records: Vec<DeletedPage> = self
            .shared
            .deleted
            .lock()
            .iter()
            .filter(|d| d.revision_id == Some(revision_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(records)
    }
}

struct MemorySiteSession {
    shared: Arc<Shared>,

    /// Lock on the committed state; `None` for a site being created.
    committed: Option<OwnedMutexGuard<SiteState>>,
    working: SiteState,
}

#[async_trait]
impl SiteSession for MemorySiteSession {
    fn state(&self) -> &SiteState {
        &self.working
    }

    fn state_mut(&mut self) -> &mut SiteState {
        &mut self.working
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemorySiteSession {
            shared,
            committed,
            mut working,
        } = *self;
        let changes = working.take_changes();

        match committed {
            Some(mut guard) => {
                shared.record(&changes);
                *guard = working;
            }
            None => {
                let site = working.site().clone();
                if shared.states.contains_key(&site.id) {
                    bail!("site {} already exists", site.id);
                }
                if shared
                    .sites
                    .iter()
                    .any(|s| s.host == site.host && s.path == site.path)
                {
                    bail!("a site already exists at {}{}", site.host, site.path);
                }
                shared.record(&changes);
                shared.sites.insert(site.id, site.clone());
                shared
                    .states
                    .insert(site.id, Arc::new(AsyncMutex::new(working)));
            }
        }
        Ok(())
    }
}
