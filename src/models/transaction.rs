//! Transaction model

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::AppError;
use crate::features::{self, NormalizedTransaction};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: i64,
    pub time_ind: i64,
    pub time_ref: Option<DateTime<Utc>>,
    pub transac_type: String,
    pub amount: f64,
    pub src_acc: String,
    pub src_bal: f64,
    pub src_new_bal: f64,
    pub dst_acc: Option<String>,
    pub dst_bal: Option<f64>,
    pub dst_new_bal: Option<f64>,
    pub is_fraud: Option<bool>,
    pub is_flagged_fraud: Option<bool>,
    pub prediction: bool,
    pub raw_features: Value,
    pub status: Option<bool>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload assembled from a scored transaction
#[derive(Debug, Clone)]
pub struct CreateTransaction {
    pub time_ind: i64,
    pub time_ref: DateTime<Utc>,
    pub transac_type: String,
    pub amount: f64,
    pub src_acc: String,
    pub src_bal: f64,
    pub src_new_bal: f64,
    pub dst_acc: Option<String>,
    pub dst_bal: f64,
    pub dst_new_bal: f64,
    pub is_fraud: Option<bool>,
    pub is_flagged_fraud: Option<bool>,
    pub prediction: bool,
    pub raw_features: Value,
}

impl CreateTransaction {
    /// Build the storable record from a normalized transaction and the
    /// classifier verdict. Rejects echoed fields the store cannot hold.
    pub fn from_scored(tx: &NormalizedTransaction, prediction: bool) -> Result<Self, AppError> {
        let src_acc = coerce_account("src_acc", &tx.src_acc)?
            .ok_or_else(|| AppError::ValidationError("Field 'src_acc' may not be null".to_string()))?;
        let dst_acc = coerce_account("dst_acc", &tx.dst_acc)?;

        let is_flagged_fraud = features::coerce_flag(&tx.is_flagged_fraud)
            .map_err(|msg| AppError::ValidationError(format!("Field 'is_flagged_fraud': {msg}")))?;
        let is_fraud = features::coerce_flag(&tx.is_fraud)
            .map_err(|msg| AppError::ValidationError(format!("Field 'is_fraud': {msg}")))?;

        Ok(Self {
            time_ind: tx.time_ind,
            time_ref: tx.time_ref,
            transac_type: tx.transac_type.as_str().to_string(),
            amount: tx.amount,
            src_acc,
            src_bal: tx.src_bal,
            src_new_bal: tx.src_new_bal,
            dst_acc,
            dst_bal: tx.dst_bal,
            dst_new_bal: tx.dst_new_bal,
            is_fraud,
            is_flagged_fraud,
            prediction,
            raw_features: tx.raw.clone(),
        })
    }
}

/// Full-replace payload (PUT)
#[derive(Debug, Deserialize)]
pub struct ReplaceTransaction {
    pub time_ind: i64,
    pub time_ref: Option<DateTime<Utc>>,
    pub transac_type: String,
    pub amount: f64,
    pub src_acc: String,
    pub src_bal: f64,
    pub src_new_bal: f64,
    pub dst_acc: Option<String>,
    pub dst_bal: Option<f64>,
    pub dst_new_bal: Option<f64>,
    pub is_fraud: Option<bool>,
    pub is_flagged_fraud: Option<bool>,
    pub prediction: bool,
    pub status: Option<bool>,
    pub notes: Option<String>,
}

/// Partial-update payload (PATCH); absent fields keep their stored value
#[derive(Debug, Default, Deserialize)]
pub struct PatchTransaction {
    pub time_ind: Option<i64>,
    pub time_ref: Option<DateTime<Utc>>,
    pub transac_type: Option<String>,
    pub amount: Option<f64>,
    pub src_acc: Option<String>,
    pub src_bal: Option<f64>,
    pub src_new_bal: Option<f64>,
    pub dst_acc: Option<String>,
    pub dst_bal: Option<f64>,
    pub dst_new_bal: Option<f64>,
    pub is_fraud: Option<bool>,
    pub is_flagged_fraud: Option<bool>,
    pub prediction: Option<bool>,
    pub status: Option<bool>,
    pub notes: Option<String>,
}

/// Equality filters accepted by the list endpoint. Explicit allow-list;
/// unknown query parameters are ignored.
#[derive(Debug, Deserialize, Default)]
pub struct TransactionFilter {
    pub time_ind: Option<i64>,
    pub transac_type: Option<String>,
    pub src_acc: Option<String>,
    pub dst_acc: Option<String>,
    pub is_fraud: Option<bool>,
    pub is_flagged_fraud: Option<bool>,
    pub prediction: Option<bool>,
    pub status: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Transaction {
    pub async fn create(pool: &PgPool, data: CreateTransaction) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                time_ind, time_ref, transac_type, amount,
                src_acc, src_bal, src_new_bal,
                dst_acc, dst_bal, dst_new_bal,
                is_fraud, is_flagged_fraud, prediction, raw_features
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#
        )
        .bind(data.time_ind)
        .bind(data.time_ref)
        .bind(&data.transac_type)
        .bind(data.amount)
        .bind(&data.src_acc)
        .bind(data.src_bal)
        .bind(data.src_new_bal)
        .bind(&data.dst_acc)
        .bind(data.dst_bal)
        .bind(data.dst_new_bal)
        .bind(data.is_fraud)
        .bind(data.is_flagged_fraud)
        .bind(data.prediction)
        .bind(&data.raw_features)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, filter: TransactionFilter) -> Result<Vec<Self>, sqlx::Error> {
        let limit = filter.limit.unwrap_or(50);
        let offset = filter.offset.unwrap_or(0);

        sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE ($1::BIGINT IS NULL OR time_ind = $1)
              AND ($2::VARCHAR IS NULL OR transac_type = $2)
              AND ($3::VARCHAR IS NULL OR src_acc = $3)
              AND ($4::VARCHAR IS NULL OR dst_acc = $4)
              AND ($5::BOOLEAN IS NULL OR is_fraud = $5)
              AND ($6::BOOLEAN IS NULL OR is_flagged_fraud = $6)
              AND ($7::BOOLEAN IS NULL OR prediction = $7)
              AND ($8::BOOLEAN IS NULL OR status = $8)
            ORDER BY created_at DESC
            LIMIT $9 OFFSET $10
            "#
        )
        .bind(filter.time_ind)
        .bind(&filter.transac_type)
        .bind(&filter.src_acc)
        .bind(&filter.dst_acc)
        .bind(filter.is_fraud)
        .bind(filter.is_flagged_fraud)
        .bind(filter.prediction)
        .bind(filter.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn frauds(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE prediction = true ORDER BY created_at DESC"
        )
        .fetch_all(pool)
        .await
    }

    pub async fn replace(pool: &PgPool, id: i64, data: ReplaceTransaction) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET time_ind = $2,
                time_ref = $3,
                transac_type = $4,
                amount = $5,
                src_acc = $6,
                src_bal = $7,
                src_new_bal = $8,
                dst_acc = $9,
                dst_bal = $10,
                dst_new_bal = $11,
                is_fraud = $12,
                is_flagged_fraud = $13,
                prediction = $14,
                status = $15,
                notes = $16
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(data.time_ind)
        .bind(data.time_ref)
        .bind(&data.transac_type)
        .bind(data.amount)
        .bind(&data.src_acc)
        .bind(data.src_bal)
        .bind(data.src_new_bal)
        .bind(&data.dst_acc)
        .bind(data.dst_bal)
        .bind(data.dst_new_bal)
        .bind(data.is_fraud)
        .bind(data.is_flagged_fraud)
        .bind(data.prediction)
        .bind(data.status)
        .bind(&data.notes)
        .fetch_optional(pool)
        .await
    }

    pub async fn patch(pool: &PgPool, id: i64, data: PatchTransaction) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET time_ind = COALESCE($2, time_ind),
                time_ref = COALESCE($3, time_ref),
                transac_type = COALESCE($4, transac_type),
                amount = COALESCE($5, amount),
                src_acc = COALESCE($6, src_acc),
                src_bal = COALESCE($7, src_bal),
                src_new_bal = COALESCE($8, src_new_bal),
                dst_acc = COALESCE($9, dst_acc),
                dst_bal = COALESCE($10, dst_bal),
                dst_new_bal = COALESCE($11, dst_new_bal),
                is_fraud = COALESCE($12, is_fraud),
                is_flagged_fraud = COALESCE($13, is_flagged_fraud),
                prediction = COALESCE($14, prediction),
                status = COALESCE($15, status),
                notes = COALESCE($16, notes)
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(data.time_ind)
        .bind(data.time_ref)
        .bind(&data.transac_type)
        .bind(data.amount)
        .bind(&data.src_acc)
        .bind(data.src_bal)
        .bind(data.src_new_bal)
        .bind(&data.dst_acc)
        .bind(data.dst_bal)
        .bind(data.dst_new_bal)
        .bind(data.is_fraud)
        .bind(data.is_flagged_fraud)
        .bind(data.prediction)
        .bind(data.status)
        .bind(&data.notes)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn coerce_account(field: &str, value: &Value) -> Result<Option<String>, AppError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(AppError::ValidationError(format!(
            "Field '{field}' must be a string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scored() -> NormalizedTransaction {
        let serde_json::Value::Object(raw) = json!({
            "time_ind": 24,
            "transac_type": "TRANSFER",
            "amount": 100,
            "src_acc": "A",
            "src_bal": 500,
            "src_new_bal": 600,
            "dst_acc": "B",
            "dst_bal": 0,
            "dst_new_bal": 100,
            "is_flagged_fraud": "1",
            "is_fraud": ""
        }) else {
            unreachable!()
        };
        features::derive(&raw).unwrap()
    }

    #[test]
    fn test_from_scored_coerces_flags() {
        let record = CreateTransaction::from_scored(&scored(), true).unwrap();
        assert_eq!(record.transac_type, "TRANSFER");
        assert_eq!(record.is_flagged_fraud, Some(true));
        assert_eq!(record.is_fraud, None);
        assert!(record.prediction);
        assert_eq!(record.src_acc, "A");
        assert_eq!(record.dst_acc.as_deref(), Some("B"));
    }

    #[test]
    fn test_from_scored_rejects_non_boolean_flag() {
        let mut tx = scored();
        tx.is_flagged_fraud = json!("banana");

        let err = CreateTransaction::from_scored(&tx, false).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_from_scored_keeps_raw_features_verbatim() {
        let tx = scored();
        let record = CreateTransaction::from_scored(&tx, false).unwrap();
        assert_eq!(record.raw_features, tx.raw);
    }
}
