//! Typed cell values with a total order
//!
//! Values are what rows are made of and what row keys compare on. Every
//! variant has a canonical byte encoding used for signatures and hashing,
//! so two values that compare equal always encode identically.

use crate::error::ModelError;
use crate::schema::LogicalType;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single typed cell value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact decimal kept as text
    Decimal(String),
    String(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl Value {
    /// Check for SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Position of the variant in the cross-type order (NULL first)
    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Decimal(_) => 4,
            Self::String(_) => 5,
            Self::Date(_) => 6,
            Self::Timestamp(_) => 7,
            Self::Json(_) => 8,
            Self::Bytes(_) => 9,
        }
    }

    /// Compare across compatible domains
    ///
    /// Integers compare numerically with floats, and dates compare with
    /// timestamps as midnight of that day. Everything else falls back to
    /// the total order.
    pub fn compare_loose(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) => (*a as f64).total_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.total_cmp(&(*b as f64)),
            (Self::Date(a), Self::Timestamp(b)) => a.and_time(NaiveTime::MIN).cmp(b),
            (Self::Timestamp(a), Self::Date(b)) => a.cmp(&b.and_time(NaiveTime::MIN)),
            _ => self.cmp(other),
        }
    }

    /// Append the canonical encoding of this value to `buf`
    ///
    /// Each variant starts with its own tag byte, so NULL (a lone tag) can
    /// never collide with a legal value. Variable-length payloads are
    /// length-prefixed.
    pub fn write_canonical(&self, buf: &mut Vec<u8>) {
        buf.push(self.rank());
        match self {
            Self::Null => {}
            Self::Bool(b) => buf.push(u8::from(*b)),
            Self::Int(i) => buf.extend_from_slice(&i.to_be_bytes()),
            Self::Float(f) => buf.extend_from_slice(&f.to_bits().to_be_bytes()),
            Self::Decimal(d) => write_len_prefixed(buf, normalize_decimal(d).as_bytes()),
            Self::String(s) => write_len_prefixed(buf, s.as_bytes()),
            Self::Date(d) => buf.extend_from_slice(&d.num_days_from_ce().to_be_bytes()),
            Self::Timestamp(ts) => {
                let utc = ts.and_utc();
                buf.extend_from_slice(&utc.timestamp().to_be_bytes());
                buf.extend_from_slice(&utc.timestamp_subsec_nanos().to_be_bytes());
            }
            Self::Json(j) => write_len_prefixed(buf, j.to_string().as_bytes()),
            Self::Bytes(b) => write_len_prefixed(buf, b),
        }
    }

    /// Read a JSON value as the given logical type
    pub fn from_json(
        json: &serde_json::Value,
        logical_type: &LogicalType,
        column: &str,
    ) -> Result<Self, ModelError> {
        use serde_json::Value as J;

        if json.is_null() {
            return Ok(Self::Null);
        }

        let invalid = || ModelError::InvalidValue {
            column: column.to_string(),
            expected: logical_type.to_string(),
            value: json.to_string(),
        };

        match logical_type {
            LogicalType::Bool => match json {
                J::Bool(b) => Ok(Self::Bool(*b)),
                J::String(s) => s.parse().map(Self::Bool).map_err(|_| invalid()),
                _ => Err(invalid()),
            },
            LogicalType::Int => match json {
                J::Number(n) => n.as_i64().map(Self::Int).ok_or_else(invalid),
                J::String(s) => s.trim().parse().map(Self::Int).map_err(|_| invalid()),
                _ => Err(invalid()),
            },
            LogicalType::Float => match json {
                J::Number(n) => n.as_f64().map(Self::Float).ok_or_else(invalid),
                J::String(s) => s.trim().parse().map(Self::Float).map_err(|_| invalid()),
                _ => Err(invalid()),
            },
            LogicalType::Decimal { .. } => {
                let text = match json {
                    J::Number(n) => n.to_string(),
                    J::String(s) => s.trim().to_string(),
                    _ => return Err(invalid()),
                };
                if is_decimal(&text) {
                    Ok(Self::Decimal(text))
                } else {
                    Err(invalid())
                }
            }
            LogicalType::String => match json {
                J::String(s) => Ok(Self::String(s.clone())),
                other => Ok(Self::String(other.to_string())),
            },
            LogicalType::Date => json
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok())
                .map(Self::Date)
                .ok_or_else(invalid),
            LogicalType::Timestamp => json
                .as_str()
                .and_then(parse_timestamp)
                .map(Self::Timestamp)
                .ok_or_else(invalid),
            LogicalType::Json => Ok(Self::Json(json.clone())),
            LogicalType::Bytes => json
                .as_str()
                .and_then(|s| {
                    let s = s.trim();
                    let s = s
                        .strip_prefix("\\x")
                        .or_else(|| s.strip_prefix("0x"))
                        .unwrap_or(s);
                    hex::decode(s).ok()
                })
                .map(Self::Bytes)
                .ok_or_else(invalid),
            LogicalType::Unknown => Ok(Self::infer_from_json(json)),
        }
    }

    /// Best-effort reading of a JSON value without type information
    pub fn infer_from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as J;

        match json {
            J::Null => Self::Null,
            J::Bool(b) => Self::Bool(*b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            J::String(s) => Self::String(s.clone()),
            other => Self::Json(other.clone()),
        }
    }
}

/// Parse a timestamp in ISO-8601 form, with or without an offset
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

/// Render a timestamp the way it is persisted
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn write_len_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn is_decimal(text: &str) -> bool {
    let digits = text.strip_prefix(|c| c == '-' || c == '+').unwrap_or(text);
    let mut parts = digits.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    !(int_part.is_empty() && frac_part.is_empty())
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.bytes().all(|b| b.is_ascii_digit())
}

/// Split a decimal into (negative, integer digits, fraction digits)
///
/// Leading integer zeros and trailing fraction zeros are dropped; zero is
/// never negative.
fn decimal_parts(text: &str) -> (bool, &str, &str) {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let int_part = int_part.trim_start_matches('0');
    let frac_part = frac_part.trim_end_matches('0');
    let negative = negative && !(int_part.is_empty() && frac_part.is_empty());
    (negative, int_part, frac_part)
}

fn normalize_decimal(text: &str) -> String {
    let (negative, int_part, frac_part) = decimal_parts(text);
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(if int_part.is_empty() { "0" } else { int_part });
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

fn cmp_decimal(a: &str, b: &str) -> Ordering {
    let (a_neg, a_int, a_frac) = decimal_parts(a);
    let (b_neg, b_int, b_frac) = decimal_parts(b);

    let magnitude = a_int
        .len()
        .cmp(&b_int.len())
        .then_with(|| a_int.cmp(b_int))
        .then_with(|| a_frac.cmp(b_frac));

    match (a_neg, b_neg) {
        (false, false) => magnitude,
        (true, true) => magnitude.reverse(),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Decimal(a), Self::Decimal(b)) => cmp_decimal(a, b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Json(a), Self::Json(b)) => a.to_string().cmp(&b.to_string()),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut buf = Vec::new();
        self.write_canonical(&mut buf);
        buf.hash(state);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Decimal(d) => write!(f, "{}", normalize_decimal(d)),
            Self::String(s) => write!(f, "'{}'", s),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Self::Timestamp(ts) => write!(f, "{}", format_timestamp(ts)),
            Self::Json(j) => write!(f, "{}", j),
            Self::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Self::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canonical(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        value.write_canonical(&mut buf);
        buf
    }

    #[test]
    fn null_sorts_first() {
        assert!(Value::Null < Value::Int(i64::MIN));
        assert!(Value::Null < Value::String(String::new()));
        assert_eq!(Value::Null, Value::Null);
    }

    #[test]
    fn null_encoding_is_distinct() {
        assert_ne!(canonical(&Value::Null), canonical(&Value::String(String::new())));
        assert_ne!(canonical(&Value::Null), canonical(&Value::Bytes(Vec::new())));
        assert_ne!(canonical(&Value::Null), canonical(&Value::Int(0)));
    }

    #[test]
    fn decimal_equality_ignores_formatting() {
        let a = Value::Decimal("10.50".to_string());
        let b = Value::Decimal("010.5".to_string());
        assert_eq!(a, b);
        assert_eq!(canonical(&a), canonical(&b));
        assert_eq!(a.to_string(), "10.5");
    }

    #[test]
    fn decimal_ordering() {
        let d = |s: &str| Value::Decimal(s.to_string());
        assert!(d("9.99") < d("10"));
        assert!(d("-10") < d("-9.99"));
        assert!(d("0.05") < d("0.5"));
        assert!(d("-0.1") < d("0"));
        assert_eq!(d("-0.00"), d("0"));
    }

    #[test]
    fn loose_comparison_across_domains() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let ts = date.and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(Value::Date(date).compare_loose(&Value::Timestamp(ts)), Ordering::Less);
        assert_eq!(Value::Int(3).compare_loose(&Value::Float(2.5)), Ordering::Greater);
    }

    #[test]
    fn from_json_by_logical_type() {
        assert_eq!(Value::from_json(&json!(5), &LogicalType::Int, "id").unwrap(), Value::Int(5));
        assert_eq!(Value::from_json(&json!("5"), &LogicalType::Int, "id").unwrap(), Value::Int(5));
        assert_eq!(
            Value::from_json(&json!("2024-01-02"), &LogicalType::Date, "d").unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
        assert_eq!(
            Value::from_json(&json!("2024-01-02 03:04:05"), &LogicalType::Timestamp, "ts").unwrap(),
            Value::Timestamp(
                NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_opt(3, 4, 5)
                    .unwrap()
            )
        );
        assert_eq!(
            Value::from_json(&json!("\\xdead"), &LogicalType::Bytes, "b").unwrap(),
            Value::Bytes(vec![0xde, 0xad])
        );
        assert!(Value::from_json(&json!(null), &LogicalType::Int, "id").unwrap().is_null());
    }

    #[test]
    fn from_json_rejects_bad_values() {
        let err = Value::from_json(&json!("abc"), &LogicalType::Int, "id").unwrap_err();
        assert_eq!(err.code(), "INVALID_VALUE");

        let decimal = LogicalType::Decimal { precision: Some(10), scale: Some(2) };
        assert!(Value::from_json(&json!("1.2.3"), &decimal, "amount").is_err());
        assert!(Value::from_json(&json!("12.30"), &decimal, "amount").is_ok());
    }

    #[test]
    fn value_serialization_is_tagged() {
        let json = serde_json::to_string(&Value::Int(7)).unwrap();
        assert_eq!(json, r#"{"type":"int","value":7}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Int(7));
    }
}
