//! Page lifecycle observers.
//!
//! Observers are registered on the page service and called in weight order
//! (lower = earlier). Pre-events (`Creating`, `Copying`) fire before the
//! command opens its transaction; every other event fires after commit, so
//! an observer never sees changes that were rolled back.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::models::Page;

/// Something that happened to a page.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    Creating {
        site_id: Uuid,
        parent_id: Option<Uuid>,
        slug: String,
    },
    Created {
        page: Page,
    },
    Copying {
        source_id: Uuid,
        slug: String,
    },
    Copied {
        source_id: Uuid,
        page: Page,
    },
    Published {
        draft_id: Uuid,
        page: Page,
        created: bool,
    },
    Unpublished {
        draft_id: Uuid,
        removed: Vec<Uuid>,
    },
    Moved {
        page: Page,
    },
    Deleted {
        page_id: Uuid,
        removed: Vec<Uuid>,
    },
}

impl PageEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Creating { .. } => "creating",
            Self::Created { .. } => "created",
            Self::Copying { .. } => "copying",
            Self::Copied { .. } => "copied",
            Self::Published { .. } => "published",
            Self::Unpublished { .. } => "unpublished",
            Self::Moved { .. } => "moved",
            Self::Deleted { .. } => "deleted",
        }
    }

    /// The page the event is about.
    pub fn page_id(&self) -> Option<Uuid> {
        match self {
            Self::Creating { .. } => None,
            Self::Created { page } | Self::Moved { page } => Some(page.id),
            Self::Copying { source_id, .. } => Some(*source_id),
            Self::Copied { page, .. } | Self::Published { page, .. } => Some(page.id),
            Self::Unpublished { draft_id, .. } => Some(*draft_id),
            Self::Deleted { page_id, .. } => Some(*page_id),
        }
    }
}

/// Receives page events.
pub trait PageObserver: Send + Sync {
    fn on_event(&self, event: &PageEvent);
}

/// Observers in call order.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Vec<(i32, Arc<dyn PageObserver>)>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; equal weights keep registration order.
    pub fn register(&mut self, weight: i32, observer: Arc<dyn PageObserver>) {
        let pos = self.observers.partition_point(|(w, _)| *w <= weight);
        self.observers.insert(pos, (weight, observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify(&self, event: &PageEvent) {
        for (_, observer) in &self.observers {
            observer.on_event(event);
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Logs every event at info level.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PageObserver for TracingObserver {
    fn on_event(&self, event: &PageEvent) {
        match event.page_id() {
            Some(page_id) => info!(event = event.name(), page_id = %page_id, "page event"),
            None => info!(event = event.name(), "page event"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl PageObserver for Recorder {
        fn on_event(&self, event: &PageEvent) {
            self.seen.lock().push(format!("{}:{}", self.tag, event.name()));
        }
    }

    #[test]
    fn notifies_in_weight_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ObserverRegistry::new();
        for (weight, tag) in [(10, "late"), (-5, "early"), (10, "later")] {
            registry.register(
                weight,
                Arc::new(Recorder {
                    tag,
                    seen: seen.clone(),
                }),
            );
        }

        registry.notify(&PageEvent::Copying {
            source_id: Uuid::now_v7(),
            slug: "about".to_string(),
        });

        assert_eq!(
            *seen.lock(),
            ["early:copying", "late:copying", "later:copying"]
        );
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = PageEvent::Deleted {
            page_id: Uuid::nil(),
            removed: vec![Uuid::nil()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "deleted");
        assert_eq!(event.page_id(), Some(Uuid::nil()));
    }
}
