//! Host-facing facade tying render requests to controller lifecycle.

use std::sync::Arc;

use serde_json::Value;
use shared::{domain::InstanceId, error::ViewError};
use tracing::info;

use crate::{ControllerConfig, InstanceRegistry, RenderEngine, ViewController};

/// Owns the engine binding, the registry, and the controller configuration.
///
/// A render request for a new identifier registers a fresh controller; a
/// repeat request for a known identifier is a full reset of that instance,
/// not an update.
pub struct ViewHost {
    engine: Arc<dyn RenderEngine>,
    registry: Arc<InstanceRegistry>,
    config: ControllerConfig,
}

impl ViewHost {
    pub fn new(engine: Arc<dyn RenderEngine>, registry: Arc<InstanceRegistry>) -> Self {
        Self::new_with_config(engine, registry, ControllerConfig::default())
    }

    pub fn new_with_config(
        engine: Arc<dyn RenderEngine>,
        registry: Arc<InstanceRegistry>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    pub async fn render(
        &self,
        id: InstanceId,
        spec: Value,
        options: Value,
    ) -> Result<Arc<ViewController>, ViewError> {
        if let Some(controller) = self.registry.lookup(&id).await {
            info!(instance = %id, "resetting existing instance");
            controller.create(spec, options).await?;
            return Ok(controller);
        }

        let controller = Arc::new(ViewController::new_with_config(
            Arc::clone(&self.engine),
            self.config.clone(),
        ));
        controller.create(spec, options).await?;
        self.registry.register(id, Arc::clone(&controller)).await;
        Ok(controller)
    }

    /// Teardown signal from the host environment: unregisters the instance
    /// and closes its controller so no listener or queued command leaks.
    pub async fn teardown(&self, id: &InstanceId) -> bool {
        match self.registry.remove(id).await {
            Some(controller) => {
                controller.close().await;
                true
            }
            None => false,
        }
    }
}
