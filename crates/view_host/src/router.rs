//! Dispatch of addressed cross-process command messages onto controllers.

use std::sync::Arc;

use serde_json::Value;
use shared::{
    error::MessageError,
    protocol::{ChangeParams, CommandMessage, CHANGE_COMMAND},
};
use tracing::{debug, warn};

use crate::InstanceRegistry;

/// Translates inbound `{ id, fn, params }` messages into controller calls.
///
/// Dispatch is best effort: a message for an unknown instance is dropped
/// without error because the external caller has no synchronous way to learn
/// the outcome, and such races with teardown are normal. Malformed messages
/// are the one thing rejected loudly, before any registry lookup.
pub struct CommandRouter {
    registry: Arc<InstanceRegistry>,
}

impl CommandRouter {
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self { registry }
    }

    pub async fn dispatch(&self, raw: Value) -> Result<(), MessageError> {
        let message = match CommandMessage::parse(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "dropping malformed command message");
                return Err(err);
            }
        };

        let Some(controller) = self.registry.lookup(&message.id).await else {
            debug!(
                instance = %message.id,
                command = %message.name,
                "dropping command for unknown instance"
            );
            return Ok(());
        };

        // "change" arrives in its own wire shape and must be reshaped before
        // forwarding; every other command is forwarded generically.
        let outcome = if message.name == CHANGE_COMMAND {
            let change = match ChangeParams::from_params(&message.params) {
                Ok(change) => change,
                Err(err) => {
                    warn!(
                        instance = %message.id,
                        error = %err,
                        "dropping change command with malformed params"
                    );
                    return Err(err);
                }
            };
            controller.change_data(&change.dataset, change.rows).await
        } else {
            controller
                .invoke(message.name.clone(), message.positional_args())
                .await
        };

        if let Err(err) = outcome {
            // Likely a teardown race; the instance-local failure stays local.
            debug!(
                instance = %message.id,
                command = %message.name,
                error = %err,
                "command could not be queued"
            );
        }
        Ok(())
    }
}
