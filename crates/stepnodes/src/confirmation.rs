use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use stepcore::{Failure, Payload, StepContext, StepExecutor, Value, WorkflowError};
use stepruntime::{StepFactory, StepMetadata};
use std::collections::HashMap;
use std::sync::Arc;

const DELIVERY_DAYS: i64 = 3;

/// Issues the order number and delivery date
pub struct SendConfirmationStep;

#[async_trait]
impl StepExecutor for SendConfirmationStep {
    fn step_type(&self) -> &str {
        "order.confirm"
    }

    async fn execute(&self, ctx: StepContext) -> Result<Payload, Failure> {
        let now = Utc::now();
        let numero_orden = format!("ORD-{}", now.timestamp_millis());
        let fecha_entrega =
            (now + Duration::days(DELIVERY_DAYS)).to_rfc3339_opts(SecondsFormat::Millis, true);

        ctx.events.info(format!("Enviando confirmación {}", numero_orden));

        let mut output = Payload::new();
        output.insert("numeroOrden".to_string(), numero_orden.into());
        for field in ["numeroTransaccion", "productoId", "cantidad", "totalFinal"] {
            output.insert(
                field.to_string(),
                ctx.payload.get(field).cloned().unwrap_or_default(),
            );
        }
        output.insert("fechaEntrega".to_string(), fecha_entrega.into());
        output.insert("estadoOrden".to_string(), "Confirmada".into());
        output.insert("status".to_string(), "ConfirmacionEnviada".into());
        output.insert(
            "mensaje".to_string(),
            "Su compra ha sido procesada exitosamente".into(),
        );

        Ok(output)
    }
}

pub struct SendConfirmationStepFactory;

impl StepFactory for SendConfirmationStepFactory {
    fn create(
        &self,
        _config: &HashMap<String, Value>,
    ) -> Result<Arc<dyn StepExecutor>, WorkflowError> {
        Ok(Arc::new(SendConfirmationStep))
    }

    fn step_type(&self) -> &str {
        "order.confirm"
    }

    fn metadata(&self) -> StepMetadata {
        StepMetadata {
            description: "Confirm the order to the customer".to_string(),
            category: "order".to_string(),
        }
    }
}
