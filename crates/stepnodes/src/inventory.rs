use crate::number_config;
use async_trait::async_trait;
use stepcore::{Failure, Payload, StepContext, StepExecutor, Value, WorkflowError};
use stepruntime::{StepFactory, StepMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// Kind raised when stock cannot cover the order
pub const INVENTORY_ERROR: &str = "ErrorA";

pub const UNIT_PRICE: f64 = 25.99;

const DEFAULT_STOCK: f64 = 100.0;

/// Checks the requested quantity against the configured stock level.
///
/// Test knobs read from the payload: `forceErrorA` fails every attempt,
/// `forceErrorAAttempts: n` fails attempts 1..=n on each entry.
pub struct ValidateInventoryStep {
    stock: f64,
}

impl ValidateInventoryStep {
    pub fn new(stock: f64) -> Self {
        Self { stock }
    }
}

#[async_trait]
impl StepExecutor for ValidateInventoryStep {
    fn step_type(&self) -> &str {
        "inventory.validate"
    }

    async fn execute(&self, ctx: StepContext) -> Result<Payload, Failure> {
        let producto_id = ctx.require("productoId", "InvalidOrder")?.clone();
        let cantidad = ctx.get_f64("cantidad").ok_or_else(|| {
            Failure::new("InvalidOrder").with_message("'cantidad' must be a number")
        })?;

        ctx.events.info(format!(
            "Validando inventario: {} x {:?} (disponible {})",
            cantidad, producto_id, self.stock
        ));

        let forced_attempts = ctx.get_f64("forceErrorAAttempts").unwrap_or(0.0) as u32;
        if ctx.flag("forceErrorA") || ctx.attempt <= forced_attempts || cantidad > self.stock {
            let mut detail = Payload::new();
            detail.insert("productoId".to_string(), producto_id);
            detail.insert("cantidad".to_string(), cantidad.into());
            detail.insert("inventarioDisponible".to_string(), self.stock.into());

            return Err(Failure::new(INVENTORY_ERROR)
                .with_message("Inventario insuficiente")
                .with_detail(detail));
        }

        let mut output = Payload::new();
        output.insert("productoId".to_string(), producto_id);
        output.insert("cantidad".to_string(), cantidad.into());
        output.insert("inventarioDisponible".to_string(), self.stock.into());
        output.insert("precioUnitario".to_string(), UNIT_PRICE.into());
        output.insert("total".to_string(), (cantidad * UNIT_PRICE).into());
        output.insert("status".to_string(), "InventarioValidado".into());

        // the payment step reads it
        if ctx.flag("forceErrorB") {
            output.insert("forceErrorB".to_string(), true.into());
        }

        Ok(output)
    }
}

pub struct ValidateInventoryStepFactory;

impl StepFactory for ValidateInventoryStepFactory {
    fn create(
        &self,
        config: &HashMap<String, Value>,
    ) -> Result<Arc<dyn StepExecutor>, WorkflowError> {
        let stock = number_config(config, "stock", DEFAULT_STOCK, self.step_type())?;
        Ok(Arc::new(ValidateInventoryStep::new(stock)))
    }

    fn step_type(&self) -> &str {
        "inventory.validate"
    }

    fn metadata(&self) -> StepMetadata {
        StepMetadata {
            description: "Validate product stock for an order".to_string(),
            category: "order".to_string(),
        }
    }
}
