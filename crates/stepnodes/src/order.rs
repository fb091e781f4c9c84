//! The purchase-order workflow: validate stock, charge, confirm.
//!
//! Inventory shortfalls are retried with backoff and end in a failed
//! terminal; any payment failure is routed to the incident notifier.

use crate::INVENTORY_ERROR;
use stepcore::{CatchRule, RetryRule, StepSpec, WorkflowSpec};
use std::time::Duration;

pub const WORKFLOW_NAME: &str = "CompraProductoStateMachine";

pub const VALIDATE_INVENTORY: &str = "ValidarInventario";
pub const INVENTORY_FAILED: &str = "InventarioFallo";
pub const PROCESS_PAYMENT: &str = "ProcesarPago";
pub const SEND_CONFIRMATION: &str = "EnviarConfirmacion";
pub const HANDLE_PAYMENT_ERROR: &str = "ManejoErrorPago";

pub const TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub fn purchase_workflow() -> WorkflowSpec {
    WorkflowSpec::new(WORKFLOW_NAME, VALIDATE_INVENTORY)
        .with_description("Compra de producto: inventario, pago y confirmación")
        .with_timeout_ms(TIMEOUT.as_millis() as u64)
        .step(
            StepSpec::new(VALIDATE_INVENTORY, "inventory.validate")
                .with_retry(RetryRule::new([INVENTORY_ERROR], Duration::from_secs(2), 3, 2.0))
                .with_catch(CatchRule::new([INVENTORY_ERROR], INVENTORY_FAILED))
                .next(PROCESS_PAYMENT),
        )
        .step(StepSpec::new(INVENTORY_FAILED, "flow.pass").fail(
            INVENTORY_FAILED,
            Some("Inventario insuficiente después de múltiples intentos"),
        ))
        .step(
            StepSpec::new(PROCESS_PAYMENT, "payment.process")
                .with_catch(CatchRule::any(HANDLE_PAYMENT_ERROR))
                .next(SEND_CONFIRMATION),
        )
        .step(StepSpec::new(SEND_CONFIRMATION, "order.confirm").succeed())
        .step(StepSpec::new(HANDLE_PAYMENT_ERROR, "notify.incident").succeed())
}
