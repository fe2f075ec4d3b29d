//! Instance identifier -> controller mapping, explicitly owned and shared.

use std::{collections::HashMap, sync::Arc};

use shared::domain::InstanceId;
use tokio::sync::RwLock;
use tracing::warn;

use crate::ViewController;

/// Keyed lookup only; entries are inserted on instance creation and removed
/// on teardown. Registering an identifier already present replaces the
/// controller, which is equivalent to a full reset for that instance.
#[derive(Default)]
pub struct InstanceRegistry {
    entries: RwLock<HashMap<InstanceId, Arc<ViewController>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: InstanceId, controller: Arc<ViewController>) {
        let mut entries = self.entries.write().await;
        if entries.insert(id.clone(), controller).is_some() {
            warn!(instance = %id, "replaced an already-registered instance");
        }
    }

    /// `None` on a missing identifier is expected in normal operation:
    /// a command may race a teardown.
    pub async fn lookup(&self, id: &InstanceId) -> Option<Arc<ViewController>> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &InstanceId) -> Option<Arc<ViewController>> {
        self.entries.write().await.remove(id)
    }
}
