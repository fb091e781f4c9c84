use crate::number_config;
use async_trait::async_trait;
use chrono::Utc;
use stepcore::{Failure, Payload, StepContext, StepExecutor, Value, WorkflowError};
use stepruntime::{StepFactory, StepMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// Kind raised when a charge is rejected; never worth retrying
pub const PAYMENT_ERROR: &str = "ErrorB";

pub const COMMISSION_RATE: f64 = 0.03;

const DEFAULT_LIMIT: f64 = 1000.0;

/// Simulated card charge
pub struct ProcessPaymentStep {
    limit: f64,
}

impl ProcessPaymentStep {
    pub fn new(limit: f64) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl StepExecutor for ProcessPaymentStep {
    fn step_type(&self) -> &str {
        "payment.process"
    }

    async fn execute(&self, ctx: StepContext) -> Result<Payload, Failure> {
        let total = ctx.get_f64("total").ok_or_else(|| {
            Failure::new("InvalidOrder").with_message("'total' must be a number")
        })?;

        if ctx.flag("forceErrorB") {
            ctx.events.warn("ErrorB forced for testing");
            return Err(Failure::new(PAYMENT_ERROR)
                .with_message("Pago rechazado - error forzado para pruebas"));
        }

        if total > self.limit {
            return Err(Failure::new(PAYMENT_ERROR)
                .with_message("Pago rechazado - límite excedido")
                .with_detail(total));
        }

        let comision = total * COMMISSION_RATE;
        let numero_transaccion = format!("TXN-{}", Utc::now().timestamp_millis());
        ctx.events.info(format!("Cobro {} aprobado", numero_transaccion));

        let mut output = Payload::new();
        for field in ["productoId", "cantidad", "precioUnitario"] {
            output.insert(
                field.to_string(),
                ctx.payload.get(field).cloned().unwrap_or_default(),
            );
        }
        output.insert("subtotal".to_string(), total.into());
        output.insert("comision".to_string(), comision.into());
        output.insert("totalFinal".to_string(), (total + comision).into());
        output.insert("numeroTransaccion".to_string(), numero_transaccion.into());
        output.insert("metodoPago".to_string(), "Tarjeta de Crédito".into());
        output.insert("status".to_string(), "PagoProcesado".into());

        Ok(output)
    }
}

pub struct ProcessPaymentStepFactory;

impl StepFactory for ProcessPaymentStepFactory {
    fn create(
        &self,
        config: &HashMap<String, Value>,
    ) -> Result<Arc<dyn StepExecutor>, WorkflowError> {
        let limit = number_config(config, "limit", DEFAULT_LIMIT, self.step_type())?;
        Ok(Arc::new(ProcessPaymentStep::new(limit)))
    }

    fn step_type(&self) -> &str {
        "payment.process"
    }

    fn metadata(&self) -> StepMetadata {
        StepMetadata {
            description: "Charge the order total".to_string(),
            category: "order".to_string(),
        }
    }
}
