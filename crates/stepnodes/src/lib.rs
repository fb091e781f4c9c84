//! Standard step library
//!
//! Built-in steps for the purchase-order workflow plus the incident
//! notifier and its publishers.

mod confirmation;
mod inventory;
mod notify;
pub mod order;
mod pass;
mod payment;

pub use confirmation::SendConfirmationStep;
pub use inventory::{ValidateInventoryStep, INVENTORY_ERROR, UNIT_PRICE};
pub use notify::{
    ChannelPublisher, IncidentNotifier, IncidentNotifierFactory, Notification, NotificationConfig,
    PublishError, Publisher, TracingPublisher, WebhookPublisher, NOTIFICATION_ERROR,
};
pub use pass::PassStep;
pub use payment::{ProcessPaymentStep, COMMISSION_RATE, PAYMENT_ERROR};
use stepcore::{Value, WorkflowError};
use stepruntime::StepRegistry;

use std::collections::HashMap;
use std::sync::Arc;

/// Register all standard steps with a registry
pub fn register_all(
    registry: &mut StepRegistry,
    publisher: Arc<dyn Publisher>,
    notification: NotificationConfig,
) {
    registry.register(Arc::new(pass::PassStepFactory));
    registry.register(Arc::new(inventory::ValidateInventoryStepFactory));
    registry.register(Arc::new(payment::ProcessPaymentStepFactory));
    registry.register(Arc::new(confirmation::SendConfirmationStepFactory));
    registry.register(Arc::new(IncidentNotifierFactory::new(publisher, notification)));
}

/// Registry with every standard step; the publisher comes from `notification`
pub fn default_registry(notification: NotificationConfig) -> StepRegistry {
    let mut registry = StepRegistry::new();
    let publisher = notification.publisher();
    register_all(&mut registry, publisher, notification);
    registry
}

/// Read a numeric config entry, falling back to `default` when absent
pub(crate) fn number_config(
    config: &HashMap<String, Value>,
    key: &str,
    default: f64,
    step_type: &str,
) -> Result<f64, WorkflowError> {
    match config.get(key) {
        None => Ok(default),
        Some(Value::Number(n)) => Ok(*n),
        Some(_) => Err(WorkflowError::StepCreation(format!(
            "{}: '{}' must be a number",
            step_type, key
        ))),
    }
}
