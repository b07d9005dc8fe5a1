use ecrypto_protocol::{
    parse_operation_list, EngineError, EngineOperation, EngineResult, Envelope, OperationRecord,
};
use serde_json::Value;

use crate::gateway::EngineGateway;
use crate::requests::UndoRequest;

/// History listing and undo against the engine's ledger.
///
/// Holds no cache: the engine is the only source of truth, so callers list
/// again after an undo.
#[derive(Debug, Clone)]
pub struct HistoryProxy {
    gateway: EngineGateway,
}

impl HistoryProxy {
    pub fn new(gateway: EngineGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &EngineGateway {
        &self.gateway
    }

    /// Operations in engine order, with reversibility resolved for each record.
    pub async fn list(&self) -> Envelope {
        let result = self.operations().await.and_then(|records| {
            let records = records
                .into_iter()
                .map(OperationRecord::with_resolved_reversibility)
                .collect::<Vec<_>>();
            serde_json::to_value(records).map_err(|error| {
                EngineError::Protocol(format!("failed to encode history records: {error}"))
            })
        });
        Envelope::from_result(result)
    }

    pub async fn operations(&self) -> EngineResult<Vec<OperationRecord>> {
        let body = self
            .gateway
            .exchange(EngineOperation::History, Value::Null)
            .await?;
        let records = parse_operation_list(&body).map_err(EngineError::Protocol)?;
        tracing::debug!(count = records.len(), "engine history loaded");
        Ok(records)
    }

    /// Asks the engine to reverse `operation_id`. The engine's answer is passed through.
    pub async fn undo(&self, operation_id: &str) -> Envelope {
        let request = UndoRequest {
            operation_id: operation_id.to_owned(),
        };
        let envelope = self
            .gateway
            .call_typed(EngineOperation::Undo, &request)
            .await;
        if let Some(error) = envelope.error() {
            tracing::info!(operation_id, error, "engine refused undo");
        }
        envelope
    }
}
