//! Feature derivation and validation
//!
//! Converts a raw transaction field mapping into the fixed-order numeric
//! vector the classifier consumes, plus a normalized record for persistence.
//! Pure and deterministic: no I/O, no side effects.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde_json::{Map, Value};

/// Number of features in the model input row
pub const FEATURE_COUNT: usize = 7;

/// Feature order expected by the classifier
pub const FEATURE_LAYOUT: [&str; FEATURE_COUNT] = [
    "week_of_month",
    "dayofweek",
    "time_ind",
    "amount",
    "src_delta",
    "dst_delta",
    "transac_type_target",
];

/// Fields that must be present in every raw transaction
pub const REQUIRED_FIELDS: [&str; 10] = [
    "time_ind",
    "transac_type",
    "amount",
    "src_acc",
    "src_bal",
    "src_new_bal",
    "dst_acc",
    "dst_bal",
    "dst_new_bal",
    "is_flagged_fraud",
];

/// Reference timestamp that `time_ind` hour offsets are counted from
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureError {
    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Feature processing failed: field '{field}' is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },

    #[error("Invalid transac_type: {0}")]
    InvalidTransacType(String),
}

/// Transaction type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransacType {
    CashIn,
    CashOut,
    Debit,
    Payment,
    Transfer,
}

impl TransacType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CASH_IN" => Some(Self::CashIn),
            "CASH_OUT" => Some(Self::CashOut),
            "DEBIT" => Some(Self::Debit),
            "PAYMENT" => Some(Self::Payment),
            "TRANSFER" => Some(Self::Transfer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CashIn => "CASH_IN",
            Self::CashOut => "CASH_OUT",
            Self::Debit => "DEBIT",
            Self::Payment => "PAYMENT",
            Self::Transfer => "TRANSFER",
        }
    }

    /// Target-encoded fraud rate learned during training
    pub fn target_rate(&self) -> f64 {
        match self {
            Self::CashOut => 0.025833,
            _ => 0.0,
        }
    }
}

/// The fixed-order feature tuple consumed by the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFeatures {
    pub week_of_month: u32,
    pub dayofweek: u32,
    pub time_ind: i64,
    pub amount: f64,
    pub src_delta: f64,
    pub dst_delta: f64,
    pub transac_type_target: f64,
}

impl DerivedFeatures {
    /// Single model input row in `FEATURE_LAYOUT` order
    pub fn as_row(&self) -> [f32; FEATURE_COUNT] {
        [
            self.week_of_month as f32,
            self.dayofweek as f32,
            self.time_ind as f32,
            self.amount as f32,
            self.src_delta as f32,
            self.dst_delta as f32,
            self.transac_type_target as f32,
        ]
    }
}

/// Validated transaction: derived features plus echoed raw fields.
///
/// Account identifiers and fraud flags are echoed as raw JSON values;
/// coercing them is the storage layer's concern, not the deriver's.
#[derive(Debug, Clone)]
pub struct NormalizedTransaction {
    pub derived: DerivedFeatures,
    pub time_ind: i64,
    pub time_ref: DateTime<Utc>,
    pub transac_type: TransacType,
    pub amount: f64,
    pub src_acc: Value,
    pub src_bal: f64,
    pub src_new_bal: f64,
    pub dst_acc: Value,
    pub dst_bal: f64,
    pub dst_new_bal: f64,
    pub is_flagged_fraud: Value,
    pub is_fraud: Value,
    pub raw: Value,
}

impl NormalizedTransaction {
    pub fn feature_row(&self) -> [f32; FEATURE_COUNT] {
        self.derived.as_row()
    }
}

/// Validate a raw field mapping and derive the feature vector.
pub fn derive(raw: &Map<String, Value>) -> Result<NormalizedTransaction, FeatureError> {
    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|field| !raw.contains_key(**field))
        .map(|field| field.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(FeatureError::MissingFields(missing));
    }

    let time_ind = coerce_int(raw, "time_ind")?;
    let amount = coerce_float(raw, "amount")?;
    let src_bal = coerce_float(raw, "src_bal")?;
    let src_new_bal = coerce_float(raw, "src_new_bal")?;
    let dst_bal = coerce_float_or_zero(raw, "dst_bal")?;
    let dst_new_bal = coerce_float_or_zero(raw, "dst_new_bal")?;

    let type_value = display(raw.get("transac_type").unwrap_or(&Value::Null));
    let transac_type = TransacType::parse(&type_value)
        .ok_or_else(|| FeatureError::InvalidTransacType(type_value))?;

    let time_ref = epoch() + Duration::hours(time_ind);
    let dayofweek = time_ref.weekday().num_days_from_monday();
    let week_of_month = (time_ref.day() - 1) / 7 + 1;

    let derived = DerivedFeatures {
        week_of_month,
        dayofweek,
        time_ind,
        amount,
        src_delta: src_new_bal - src_bal,
        dst_delta: dst_new_bal - dst_bal,
        transac_type_target: transac_type.target_rate(),
    };

    Ok(NormalizedTransaction {
        derived,
        time_ind,
        time_ref,
        transac_type,
        amount,
        src_acc: raw.get("src_acc").cloned().unwrap_or(Value::Null),
        src_bal,
        src_new_bal,
        dst_acc: raw.get("dst_acc").cloned().unwrap_or(Value::Null),
        dst_bal,
        dst_new_bal,
        is_flagged_fraud: raw.get("is_flagged_fraud").cloned().unwrap_or(Value::Null),
        is_fraud: raw.get("is_fraud").cloned().unwrap_or(Value::Null),
        raw: Value::Object(raw.clone()),
    })
}

/// Lenient boolean reading for the fraud flags. `None` for null/empty,
/// error message for values that cannot be read as a boolean.
pub fn coerce_flag(value: &Value) -> Result<Option<bool>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::Number(n) => Ok(Some(n.as_f64().map(|f| f != 0.0).unwrap_or(false))),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            match trimmed.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "yes" => Ok(Some(true)),
                "false" | "f" | "0" | "no" => Ok(Some(false)),
                _ => match trimmed.parse::<f64>() {
                    Ok(f) => Ok(Some(f != 0.0)),
                    Err(_) => Err(format!("'{trimmed}' is not a boolean")),
                },
            }
        }
        other => Err(format!("{other} is not a boolean")),
    }
}

fn coerce_int(raw: &Map<String, Value>, field: &'static str) -> Result<i64, FeatureError> {
    let value = raw.get(field).unwrap_or(&Value::Null);
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                Ok(f.trunc() as i64)
            } else {
                Err(not_numeric(field, value))
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| not_numeric(field, value)),
        _ => Err(not_numeric(field, value)),
    }
}

fn coerce_float(raw: &Map<String, Value>, field: &'static str) -> Result<f64, FeatureError> {
    let value = raw.get(field).unwrap_or(&Value::Null);
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| not_numeric(field, value)),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| not_numeric(field, value)),
        _ => Err(not_numeric(field, value)),
    }
}

/// Like `coerce_float`, but absent-or-falsy values read as zero
fn coerce_float_or_zero(raw: &Map<String, Value>, field: &'static str) -> Result<f64, FeatureError> {
    match raw.get(field) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(0.0),
        Some(Value::String(s)) if s.is_empty() => Ok(0.0),
        Some(_) => coerce_float(raw, field),
    }
}

fn not_numeric(field: &'static str, value: &Value) -> FeatureError {
    FeatureError::NotNumeric {
        field,
        value: display(value),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_raw() -> Map<String, Value> {
        let Value::Object(map) = json!({
            "time_ind": 24,
            "transac_type": "CASH_IN",
            "amount": 100,
            "src_acc": "A",
            "src_bal": 500,
            "src_new_bal": 600,
            "dst_acc": "B",
            "dst_bal": 0,
            "dst_new_bal": 100,
            "is_flagged_fraud": false
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn test_derive_example_transaction() {
        let tx = derive(&sample_raw()).unwrap();

        assert_eq!(tx.time_ref, Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(tx.derived.dayofweek, 3); // Thursday
        assert_eq!(tx.derived.week_of_month, 1);
        assert_eq!(tx.derived.src_delta, 100.0);
        assert_eq!(tx.derived.dst_delta, 100.0);
        assert_eq!(tx.derived.transac_type_target, 0.0);
        assert_eq!(
            tx.feature_row(),
            [1.0, 3.0, 24.0, 100.0, 100.0, 100.0, 0.0]
        );
    }

    #[test]
    fn test_cash_out_target_rate() {
        let mut raw = sample_raw();
        raw.insert("transac_type".into(), json!("CASH_OUT"));
        let tx = derive(&raw).unwrap();
        assert_eq!(tx.derived.transac_type_target, 0.025833);

        for kind in ["CASH_IN", "DEBIT", "PAYMENT", "TRANSFER"] {
            raw.insert("transac_type".into(), json!(kind));
            let tx = derive(&raw).unwrap();
            assert_eq!(tx.derived.transac_type_target, 0.0, "{kind}");
        }
    }

    #[test]
    fn test_missing_fields_reported_by_name() {
        let mut raw = sample_raw();
        raw.remove("amount");
        raw.remove("dst_acc");

        let err = derive(&raw).unwrap_err();
        assert_eq!(
            err,
            FeatureError::MissingFields(vec!["amount".into(), "dst_acc".into()])
        );
        assert_eq!(err.to_string(), "Missing fields: amount, dst_acc");
    }

    #[test]
    fn test_invalid_transac_type() {
        let mut raw = sample_raw();
        raw.insert("transac_type".into(), json!("INVALID"));

        let err = derive(&raw).unwrap_err();
        assert_eq!(err, FeatureError::InvalidTransacType("INVALID".into()));
        assert_eq!(err.to_string(), "Invalid transac_type: INVALID");
    }

    #[test]
    fn test_non_numeric_field_rejected() {
        let mut raw = sample_raw();
        raw.insert("src_bal".into(), json!("abc"));

        let err = derive(&raw).unwrap_err();
        assert!(matches!(err, FeatureError::NotNumeric { field: "src_bal", .. }));
    }

    #[test]
    fn test_string_numerics_accepted() {
        // CSV rows arrive with every value as a string
        let mut raw = sample_raw();
        raw.insert("time_ind".into(), json!("24"));
        raw.insert("amount".into(), json!("100.5"));
        raw.insert("src_bal".into(), json!(" 500 "));

        let tx = derive(&raw).unwrap();
        assert_eq!(tx.time_ind, 24);
        assert_eq!(tx.amount, 100.5);
        assert_eq!(tx.src_bal, 500.0);
    }

    #[test]
    fn test_falsy_dst_balances_default_to_zero() {
        let mut raw = sample_raw();
        raw.insert("dst_bal".into(), Value::Null);
        raw.insert("dst_new_bal".into(), json!(""));

        let tx = derive(&raw).unwrap();
        assert_eq!(tx.dst_bal, 0.0);
        assert_eq!(tx.dst_new_bal, 0.0);
        assert_eq!(tx.derived.dst_delta, 0.0);
    }

    #[test]
    fn test_null_src_balance_rejected() {
        // Key present but null: presence check passes, coercion fails
        let mut raw = sample_raw();
        raw.insert("src_bal".into(), Value::Null);

        let err = derive(&raw).unwrap_err();
        assert!(matches!(err, FeatureError::NotNumeric { field: "src_bal", .. }));
    }

    #[test]
    fn test_calendar_ranges_hold() {
        let mut raw = sample_raw();
        for time_ind in [0, 1, 23, 24, 167, 168, 700, 743, 8760] {
            raw.insert("time_ind".into(), json!(time_ind));
            let tx = derive(&raw).unwrap();
            assert!((1..=5).contains(&tx.derived.week_of_month), "time_ind={time_ind}");
            assert!(tx.derived.dayofweek <= 6, "time_ind={time_ind}");
        }
    }

    #[test]
    fn test_epoch_is_wednesday() {
        let mut raw = sample_raw();
        raw.insert("time_ind".into(), json!(0));
        let tx = derive(&raw).unwrap();
        assert_eq!(tx.time_ref, epoch());
        assert_eq!(tx.derived.dayofweek, 2);
    }

    #[test]
    fn test_negative_balances_accepted() {
        let mut raw = sample_raw();
        raw.insert("src_bal".into(), json!(-250.0));
        raw.insert("amount".into(), json!(0));

        let tx = derive(&raw).unwrap();
        assert_eq!(tx.derived.src_delta, 850.0);
        assert_eq!(tx.amount, 0.0);
    }

    #[test]
    fn test_raw_features_echoed_verbatim() {
        let raw = sample_raw();
        let tx = derive(&raw).unwrap();
        assert_eq!(tx.raw, Value::Object(raw));
    }

    #[test]
    fn test_feature_row_matches_layout() {
        let tx = derive(&sample_raw()).unwrap();
        let row = tx.feature_row();
        assert_eq!(row.len(), FEATURE_LAYOUT.len());
        assert_eq!(FEATURE_LAYOUT[0], "week_of_month");
        assert_eq!(row[0], tx.derived.week_of_month as f32);
        assert_eq!(FEATURE_LAYOUT[6], "transac_type_target");
        assert_eq!(row[6], tx.derived.transac_type_target as f32);
    }

    #[test]
    fn test_coerce_flag() {
        assert_eq!(coerce_flag(&json!(true)), Ok(Some(true)));
        assert_eq!(coerce_flag(&json!(0)), Ok(Some(false)));
        assert_eq!(coerce_flag(&json!(1)), Ok(Some(true)));
        assert_eq!(coerce_flag(&json!("True")), Ok(Some(true)));
        assert_eq!(coerce_flag(&json!("0")), Ok(Some(false)));
        assert_eq!(coerce_flag(&json!("1.0")), Ok(Some(true)));
        assert_eq!(coerce_flag(&Value::Null), Ok(None));
        assert_eq!(coerce_flag(&json!("")), Ok(None));
        assert!(coerce_flag(&json!("banana")).is_err());
    }
}
