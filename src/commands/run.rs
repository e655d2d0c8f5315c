// Synchronous prediction and bundle example helpers

use crate::error::EngineError;
use crate::file_manager::read_csv_table;
use crate::models::input::{Orient, PipelineOptions, PredictRequest, TaskType};
use crate::models::model_info::OutputType;
use crate::models::plan::Row;
use crate::process_manager::ModelRunner;
use crate::serializer::{heavy_payload, orient_to_json, HeavyPayload};
use crate::AppState;
use log::debug;
use serde_json::Value;

/// Serialized prediction, or a binary buffer for heavy requests
#[derive(Debug, Clone, PartialEq)]
pub enum PredictResponse {
    Json(Value),
    Heavy(HeavyPayload),
}

/// Sync prediction. The breaker wraps the model path; request validation stays outside it.
pub async fn run_prediction<R: ModelRunner>(
    state: &AppState<R>,
    request: &PredictRequest,
) -> Result<PredictResponse, EngineError> {
    if request.inputs.is_empty() {
        return Err(EngineError::EmptyRequest);
    }

    let output_type = state.engine.descriptor().effective_output_type();
    if request.output_type == TaskType::Heavy && output_type == OutputType::String {
        return Err(EngineError::InvalidRequest(
            "heavy output requires a numeric output type".to_string(),
        ));
    }

    let tag = uuid::Uuid::new_v4().to_string();
    let opts = PipelineOptions::from(request);
    debug!("Request {}: {} inputs, orient {:?}", tag, request.inputs.len(), request.orient);

    match request.output_type {
        TaskType::Heavy => {
            let block = state
                .breaker
                .call(|| state.engine.predict_heavy(&request.inputs, &tag, &opts))
                .await?;
            heavy_payload(&block).map(PredictResponse::Heavy)
        }
        TaskType::Simple => {
            let prediction = state
                .breaker
                .call(|| state.engine.predict(&request.inputs, &tag, &opts))
                .await?;
            let index: Vec<String> = request.inputs.iter().map(|item| item.value().to_string()).collect();
            Ok(PredictResponse::Json(orient_to_json(
                &prediction.rows,
                &prediction.header,
                &index,
                request.orient,
                output_type,
            )))
        }
    }
}

/// Inputs of the bundled example, first column of the example input file
pub fn example_input<R: ModelRunner>(state: &AppState<R>) -> Result<Vec<String>, EngineError> {
    let (_, rows) = read_csv_table(&state.layout.example_input_path())?;
    Ok(rows.into_iter().filter_map(|row| row.into_iter().next()).collect())
}

/// The bundled example output, coerced and shaped like a live prediction
pub fn example_output<R: ModelRunner>(state: &AppState<R>, orient: Orient) -> Result<Value, EngineError> {
    let (header, rows) = read_csv_table(&state.layout.example_output_path())?;
    let index: Vec<String> = rows
        .iter()
        .map(|row| row.first().cloned().unwrap_or_default())
        .collect();
    let rows: Vec<Option<Row>> = rows.into_iter().map(Some).collect();
    let output_type = state.engine.descriptor().effective_output_type();
    Ok(orient_to_json(&rows, &header, &index, orient, output_type))
}

pub fn columns_input<R: ModelRunner>(state: &AppState<R>) -> Result<Vec<String>, EngineError> {
    let (header, _) = read_csv_table(&state.layout.example_input_path())?;
    Ok(header)
}

pub fn columns_output<R: ModelRunner>(state: &AppState<R>) -> Result<Vec<String>, EngineError> {
    let (header, _) = read_csv_table(&state.layout.example_output_path())?;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::health::BreakerState;
    use crate::models::input::InputItem;
    use crate::process_manager::{decode_heavy_bytes, DType};
    use crate::testing::test_bundle;
    use serde_json::json;

    fn request(values: &[&str]) -> PredictRequest {
        PredictRequest::new(values.iter().map(|v| InputItem::plain(*v)).collect())
    }

    #[tokio::test]
    async fn test_prediction_is_indexed_by_input() {
        let bundle = test_bundle("String");
        let mut req = request(&["CCO", "CCN"]);
        req.orient = Orient::Index;

        let response = run_prediction(&bundle.state, &req).await.unwrap();

        assert_eq!(
            response,
            PredictResponse::Json(json!({"CCO": {"value": "out-CCO"}, "CCN": {"value": "out-CCN"}}))
        );
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected_without_tripping() {
        let bundle = test_bundle("String");
        for _ in 0..3 {
            let err = run_prediction(&bundle.state, &request(&[])).await.unwrap_err();
            assert!(matches!(err, EngineError::EmptyRequest));
            assert_eq!(err.status_code(), 400);
        }
        assert_eq!(bundle.state.breaker.state(), BreakerState::Closed);
        assert_eq!(bundle.runner.invocations(), 0);
    }

    #[tokio::test]
    async fn test_cache_only_returns_nulls_under_example_header() {
        let bundle = test_bundle("Float");
        let mut req = request(&["a", "b"]);
        req.cache_only = true;

        let response = run_prediction(&bundle.state, &req).await.unwrap();

        assert_eq!(
            response,
            PredictResponse::Json(json!([
                {"input": null, "value": null},
                {"input": null, "value": null}
            ]))
        );
        assert_eq!(bundle.runner.invocations(), 0);
    }

    #[tokio::test]
    async fn test_heavy_string_output_is_invalid() {
        let bundle = test_bundle("String");
        let mut req = request(&["a"]);
        req.output_type = TaskType::Heavy;
        assert!(matches!(
            run_prediction(&bundle.state, &req).await,
            Err(EngineError::InvalidRequest(_))
        ));
        assert_eq!(bundle.runner.invocations(), 0);
    }

    #[tokio::test]
    async fn test_heavy_response_carries_model_buffer() {
        let bundle = test_bundle("Integer");
        let mut req = request(&["CCO", "CCCN"]);
        req.output_type = TaskType::Heavy;

        let payload = match run_prediction(&bundle.state, &req).await.unwrap() {
            PredictResponse::Heavy(payload) => payload,
            other => panic!("expected a heavy payload, got {:?}", other),
        };

        assert_eq!(payload.descriptor.dims, vec!["length"]);
        assert_eq!(payload.descriptor.shape, [2, 1]);
        assert_eq!(payload.descriptor.dtype, DType::Int64);
        assert_eq!(payload.media_type(), "application/octet-stream");
        assert_eq!(payload.content_length(), payload.bytes.len());

        let newline = payload.bytes.iter().position(|&b| b == b'\n').unwrap();
        let meta: Value = serde_json::from_slice(&payload.bytes[..newline]).unwrap();
        assert_eq!(meta, json!({"dims": ["length"], "shape": [2, 1], "dtype": "int64"}));

        let mut expected = Vec::new();
        expected.extend_from_slice(&3i64.to_le_bytes());
        expected.extend_from_slice(&4i64.to_le_bytes());
        assert_eq!(&payload.bytes[newline + 1..], expected.as_slice());

        let decoded = decode_heavy_bytes(&payload.bytes).unwrap();
        assert_eq!(decoded.values::<i64>().unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_example_helpers_read_bundle_files() {
        let bundle = test_bundle("Float");

        assert_eq!(example_input(&bundle.state).unwrap(), vec!["CCO", "CCN"]);
        assert_eq!(columns_input(&bundle.state).unwrap(), vec!["input"]);
        assert_eq!(columns_output(&bundle.state).unwrap(), vec!["input", "value"]);
        assert_eq!(
            example_output(&bundle.state, Orient::Values).unwrap(),
            json!([[null, 1.5], [null, null]])
        );
    }
}
