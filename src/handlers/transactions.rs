//! Transaction scoring and CRUD handlers

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AppState, AppError, AppResult};
use crate::classifier::{FraudClassifier, OnnxClassifier};
use crate::features::{self, TransacType, REQUIRED_FIELDS};
use crate::middleware::auth::UserContext;
use crate::models::{
    CreateTransaction, PatchTransaction, ReplaceTransaction, Transaction, TransactionFilter,
};

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub raw_features: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub prediction: bool,
    pub transaction_id: i64,
    pub stored_transaction: Transaction,
}

/// Score a single transaction and persist the result
pub async fn create(
    State(state): State<AppState>,
    _user: UserContext,
    Json(req): Json<PredictRequest>,
) -> AppResult<(StatusCode, Json<PredictResponse>)> {
    let normalized = features::derive(&req.raw_features)?;

    let mut classifier = OnnxClassifier::load(&state.config.model_path)?;
    let prediction = classifier.predict(&normalized.feature_row())?;

    let record = CreateTransaction::from_scored(&normalized, prediction)?;
    let stored = Transaction::create(&state.pool, record).await?;

    Ok((
        StatusCode::CREATED,
        Json(PredictResponse {
            prediction,
            transaction_id: stored.id,
            stored_transaction: stored,
        }),
    ))
}

/// Score every row of an uploaded CSV file, in file order.
///
/// The first row that fails validation or classification aborts the batch;
/// rows persisted before it stay persisted.
pub async fn upload(
    State(state): State<AppState>,
    _user: UserContext,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let mut file: Option<axum::body::Bytes> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Invalid multipart payload: {e}")))?
    {
        if field.name() == Some("csv_file") {
            file = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::ValidationError(format!("Failed to read CSV file: {e}")))?,
            );
            break;
        }
    }
    let file = file.ok_or_else(|| AppError::ValidationError("File is required".to_string()))?;

    let mut reader = csv::Reader::from_reader(file.as_ref());
    let headers = reader
        .headers()
        .map_err(|e| AppError::ValidationError(format!("Failed to read CSV file: {e}")))?
        .clone();

    let missing = missing_columns(&headers);
    if !missing.is_empty() {
        return Err(AppError::ValidationError(format!(
            "Missing required columns in CSV file: {}",
            missing.join(", ")
        )));
    }

    let mut classifier = OnnxClassifier::load(&state.config.model_path)?;

    for (index, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| AppError::ValidationError(format!("Failed to read CSV file: {e}")))?;
        let raw = row_to_raw(&headers, &record);

        let normalized = features::derive(&raw)?;
        let prediction = classifier.predict(&normalized.feature_row())?;

        let data = CreateTransaction::from_scored(&normalized, prediction)?;
        let stored = Transaction::create(&state.pool, data).await?;

        tracing::info!(
            row = index + 1,
            transaction_id = stored.id,
            prediction,
            "transaction scored and stored"
        );
    }

    Ok(Json(serde_json::json!({ "message": "File processed successfully" })))
}

/// List transactions, optionally narrowed by equality filters
pub async fn list(
    State(state): State<AppState>,
    _user: UserContext,
    Query(filter): Query<TransactionFilter>,
) -> AppResult<Json<Vec<Transaction>>> {
    let transactions = Transaction::list(&state.pool, filter).await?;
    Ok(Json(transactions))
}

/// Get single transaction
pub async fn retrieve(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<i64>,
) -> AppResult<Json<Transaction>> {
    let transaction = Transaction::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

    Ok(Json(transaction))
}

/// List transactions the classifier marked fraudulent
pub async fn frauds(
    State(state): State<AppState>,
    _user: UserContext,
) -> AppResult<Json<Vec<Transaction>>> {
    let transactions = Transaction::frauds(&state.pool).await?;
    Ok(Json(transactions))
}

/// Full update (PUT)
pub async fn update(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<i64>,
    Json(req): Json<ReplaceTransaction>,
) -> AppResult<Json<Transaction>> {
    validate_transac_type(&req.transac_type)?;

    let transaction = Transaction::replace(&state.pool, id, req)
        .await?
        .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

    Ok(Json(transaction))
}

/// Partial update (PATCH)
pub async fn partial_update(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<i64>,
    Json(req): Json<PatchTransaction>,
) -> AppResult<Json<Transaction>> {
    if let Some(transac_type) = &req.transac_type {
        validate_transac_type(transac_type)?;
    }

    let transaction = Transaction::patch(&state.pool, id, req)
        .await?
        .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

    Ok(Json(transaction))
}

/// Delete transaction
pub async fn destroy(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let deleted = Transaction::delete(&state.pool, id).await?;

    if !deleted {
        return Err(AppError::NotFound("Transaction not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

fn validate_transac_type(value: &str) -> AppResult<()> {
    TransacType::parse(value)
        .map(|_| ())
        .ok_or_else(|| AppError::ValidationError(format!("Invalid transac_type: {value}")))
}

/// Required columns absent from the CSV header
fn missing_columns(headers: &csv::StringRecord) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect()
}

/// One CSV row as a raw field mapping; every cell stays a string and the
/// coercion layer sorts out the types
fn row_to_raw(headers: &csv::StringRecord, record: &csv::StringRecord) -> Map<String, Value> {
    headers
        .iter()
        .zip(record.iter())
        .map(|(header, cell)| (header.to_string(), Value::String(cell.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(data: &str) -> (csv::StringRecord, Vec<csv::StringRecord>) {
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let headers = reader.headers().unwrap().clone();
        let records = reader.records().map(|r| r.unwrap()).collect();
        (headers, records)
    }

    #[test]
    fn test_missing_columns_detected_before_rows() {
        let (headers, _) = read_all(
            "time_ind,transac_type,src_acc,src_bal,src_new_bal,dst_acc,dst_bal,dst_new_bal,is_flagged_fraud\n",
        );
        assert_eq!(missing_columns(&headers), vec!["amount"]);
    }

    #[test]
    fn test_all_columns_present() {
        let (headers, _) = read_all(
            "time_ind,transac_type,amount,src_acc,src_bal,src_new_bal,dst_acc,dst_bal,dst_new_bal,is_flagged_fraud,is_fraud\n",
        );
        assert!(missing_columns(&headers).is_empty());
    }

    #[test]
    fn test_rows_derive_in_file_order() {
        let (headers, records) = read_all(
            "time_ind,transac_type,amount,src_acc,src_bal,src_new_bal,dst_acc,dst_bal,dst_new_bal,is_flagged_fraud\n\
             0,PAYMENT,10,A,100,90,B,0,10,0\n\
             24,CASH_OUT,20,A,90,70,B,10,30,0\n\
             48,INVALID,30,A,70,40,B,30,60,0\n",
        );
        assert!(missing_columns(&headers).is_empty());

        let results: Vec<_> = records
            .iter()
            .map(|record| features::derive(&row_to_raw(&headers, record)))
            .collect();

        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        // the third row carries the invalid type, and its error names the value
        let err = results[2].as_ref().unwrap_err();
        assert_eq!(err.to_string(), "Invalid transac_type: INVALID");
    }

    #[test]
    fn test_row_to_raw_keeps_cells_as_strings() {
        let (headers, records) = read_all("time_ind,amount\n24,99.5\n");
        let raw = row_to_raw(&headers, &records[0]);
        assert_eq!(raw.get("time_ind"), Some(&Value::String("24".to_string())));
        assert_eq!(raw.get("amount"), Some(&Value::String("99.5".to_string())));
    }

    #[test]
    fn test_validate_transac_type() {
        assert!(validate_transac_type("TRANSFER").is_ok());
        assert!(validate_transac_type("transfer").is_err());
        assert!(validate_transac_type("INVALID").is_err());
    }
}
