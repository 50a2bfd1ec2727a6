//! Typed tabular query results.
//!
//! The backends return `{ "tables": [{ "name", "columns": [{ "name", "type" }], "rows": [[...]] }] }`.
//! Each column type maps to one [`CellValue`] variant; an unrecognized column
//! type is a hard decode error rather than a silent string fallback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::TelemetryError;

/// Column types the backends emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    DateTime,
    Dynamic,
    Guid,
    Int,
    Long,
    Double,
    String,
    TimeSpan,
}

impl ColumnType {
    pub fn parse(column: &str, raw: &str) -> Result<Self, TelemetryError> {
        let t = match raw.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => ColumnType::Bool,
            "datetime" | "date" => ColumnType::DateTime,
            "dynamic" => ColumnType::Dynamic,
            "guid" | "uuid" | "uniqueid" => ColumnType::Guid,
            "int" => ColumnType::Int,
            "long" => ColumnType::Long,
            "real" | "double" => ColumnType::Double,
            "string" => ColumnType::String,
            "timespan" | "time" => ColumnType::TimeSpan,
            _ => {
                return Err(TelemetryError::UnknownColumnType {
                    column: column.to_string(),
                    column_type: raw.to_string(),
                })
            }
        };
        Ok(t)
    }
}

/// A single decoded cell. `Null` represents an absent value in any column type.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    DateTime(DateTime<Utc>),
    Dynamic(Value),
    Guid(Uuid),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    /// Signed duration in milliseconds precision or finer.
    TimeSpan(chrono::Duration),
}

impl CellValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Double(v) => Some(*v),
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// JSON rendering for presentation layers.
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::DateTime(d) => Value::String(d.to_rfc3339()),
            CellValue::Dynamic(v) => v.clone(),
            CellValue::Guid(g) => Value::String(g.to_string()),
            CellValue::Int(i) => Value::from(*i),
            CellValue::Long(l) => Value::from(*l),
            CellValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(d.to_string())),
            CellValue::String(s) => Value::String(s.clone()),
            CellValue::TimeSpan(t) => Value::String(format_timespan(*t)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataColumn {
    pub name: String,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    pub name: String,
    pub columns: Vec<DataColumn>,
    /// Each row has exactly `columns.len()` cells.
    pub rows: Vec<Vec<CellValue>>,
}

impl DataTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct RawResponse {
    #[serde(default)]
    pub tables: Vec<RawTable>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTable {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<RawColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

/// Decode a successful response body into typed tables.
pub fn decode_tables(body: &[u8]) -> Result<Vec<DataTable>, TelemetryError> {
    let raw: RawResponse = serde_json::from_slice(body).map_err(|e| TelemetryError::Decode {
        column: "(response)".into(),
        reason: e.to_string(),
    })?;
    raw.tables.into_iter().map(decode_table).collect()
}

fn decode_table(raw: RawTable) -> Result<DataTable, TelemetryError> {
    let columns = raw
        .columns
        .into_iter()
        .map(|c| {
            Ok(DataColumn {
                column_type: ColumnType::parse(&c.name, &c.column_type)?,
                name: c.name,
            })
        })
        .collect::<Result<Vec<_>, TelemetryError>>()?;

    let mut rows = Vec::with_capacity(raw.rows.len());
    for raw_row in raw.rows {
        if raw_row.len() != columns.len() {
            return Err(TelemetryError::Decode {
                column: "(row)".into(),
                reason: format!("row has {} cells, table has {} columns", raw_row.len(), columns.len()),
            });
        }
        let row = raw_row
            .into_iter()
            .zip(&columns)
            .map(|(v, c)| decode_cell(c, v))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    Ok(DataTable {
        name: raw.name,
        columns,
        rows,
    })
}

fn decode_cell(column: &DataColumn, value: Value) -> Result<CellValue, TelemetryError> {
    if value.is_null() {
        return Ok(CellValue::Null);
    }
    let bad = |reason: String| TelemetryError::Decode {
        column: column.name.clone(),
        reason,
    };

    let cell = match column.column_type {
        ColumnType::Bool => match &value {
            Value::Bool(b) => CellValue::Bool(*b),
            Value::Number(n) => CellValue::Bool(n.as_i64().unwrap_or(0) != 0),
            Value::String(s) => CellValue::Bool(
                s.parse::<bool>()
                    .map_err(|_| bad(format!("'{}' is not a bool", s)))?,
            ),
            other => return Err(bad(format!("expected bool, got {}", other))),
        },
        ColumnType::DateTime => {
            let s = value
                .as_str()
                .ok_or_else(|| bad(format!("expected datetime string, got {}", value)))?;
            let dt = DateTime::parse_from_rfc3339(s).map_err(|e| bad(e.to_string()))?;
            CellValue::DateTime(dt.with_timezone(&Utc))
        }
        ColumnType::Dynamic => match value {
            // Dynamic values usually arrive as serialized JSON.
            Value::String(s) => CellValue::Dynamic(serde_json::from_str(&s).unwrap_or(Value::String(s))),
            other => CellValue::Dynamic(other),
        },
        ColumnType::Guid => {
            let s = value
                .as_str()
                .ok_or_else(|| bad(format!("expected guid string, got {}", value)))?;
            CellValue::Guid(Uuid::parse_str(s).map_err(|e| bad(e.to_string()))?)
        }
        ColumnType::Int => {
            let n = integer(&value).ok_or_else(|| bad(format!("expected int, got {}", value)))?;
            CellValue::Int(i32::try_from(n).map_err(|e| bad(e.to_string()))?)
        }
        ColumnType::Long => {
            CellValue::Long(integer(&value).ok_or_else(|| bad(format!("expected long, got {}", value)))?)
        }
        ColumnType::Double => match &value {
            Value::Number(n) => CellValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => CellValue::Double(match s.as_str() {
                "NaN" => f64::NAN,
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                other => other.parse().map_err(|_| bad(format!("'{}' is not a number", other)))?,
            }),
            other => return Err(bad(format!("expected number, got {}", other))),
        },
        ColumnType::String => match value {
            Value::String(s) => CellValue::String(s),
            other => CellValue::String(other.to_string()),
        },
        ColumnType::TimeSpan => {
            let s = value
                .as_str()
                .ok_or_else(|| bad(format!("expected timespan string, got {}", value)))?;
            CellValue::TimeSpan(parse_timespan(s).ok_or_else(|| bad(format!("'{}' is not a timespan", s)))?)
        }
    };
    Ok(cell)
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Parse `[-][d.]hh:mm:ss[.fffffff]`.
pub fn parse_timespan(s: &str) -> Option<chrono::Duration> {
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let mut parts = body.split(':');
    let (h_part, m_part, s_part) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let (days, hours) = match h_part.split_once('.') {
        Some((d, h)) => (d.parse::<i64>().ok()?, h.parse::<i64>().ok()?),
        None => (0, h_part.parse::<i64>().ok()?),
    };
    let minutes: i64 = m_part.parse().ok()?;
    let (secs, frac) = match s_part.split_once('.') {
        Some((s, f)) => (s.parse::<i64>().ok()?, f),
        None => (s_part.parse::<i64>().ok()?, ""),
    };
    if hours > 23 || minutes > 59 || secs > 59 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    // Up to 9 fractional digits (ticks are 7).
    let mut nanos_str: String = frac.chars().take(9).collect();
    while nanos_str.len() < 9 {
        nanos_str.push('0');
    }
    let nanos: i64 = nanos_str.parse().ok()?;

    let total = chrono::Duration::days(days)
        + chrono::Duration::hours(hours)
        + chrono::Duration::minutes(minutes)
        + chrono::Duration::seconds(secs)
        + chrono::Duration::nanoseconds(nanos);
    Some(if negative { -total } else { total })
}

fn format_timespan(d: chrono::Duration) -> String {
    let negative = d < chrono::Duration::zero();
    let d = if negative { -d } else { d };
    let days = d.num_days();
    let hours = d.num_hours() % 24;
    let minutes = d.num_minutes() % 60;
    let secs = d.num_seconds() % 60;
    let sign = if negative { "-" } else { "" };
    if days > 0 {
        format!("{}{}.{:02}:{:02}:{:02}", sign, days, hours, minutes, secs)
    } else {
        format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(columns: Value, rows: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "tables": [{ "name": "PrimaryResult", "columns": columns, "rows": rows }]
        }))
        .unwrap()
    }

    #[test]
    fn decodes_every_column_type() {
        let b = body(
            json!([
                {"name": "ok", "type": "bool"},
                {"name": "at", "type": "datetime"},
                {"name": "bag", "type": "dynamic"},
                {"name": "id", "type": "guid"},
                {"name": "n", "type": "int"},
                {"name": "big", "type": "long"},
                {"name": "ratio", "type": "real"},
                {"name": "label", "type": "string"},
                {"name": "span", "type": "timespan"},
            ]),
            json!([[
                true,
                "2024-05-01T10:00:00Z",
                "{\"k\":1}",
                "9c4b1e4e-2f0a-4a4b-9b2e-7d5c1f0e6a11",
                7,
                "9000000000",
                0.5,
                "cpu",
                "1.02:03:04.5"
            ]]),
        );

        let tables = decode_tables(&b).unwrap();
        assert_eq!(tables.len(), 1);
        let t = &tables[0];
        assert_eq!(t.columns.len(), 9);
        assert_eq!(t.get(0, "ok"), Some(&CellValue::Bool(true)));
        assert_eq!(t.get(0, "bag"), Some(&CellValue::Dynamic(json!({"k": 1}))));
        assert_eq!(t.get(0, "n"), Some(&CellValue::Int(7)));
        assert_eq!(t.get(0, "big"), Some(&CellValue::Long(9_000_000_000)));
        assert_eq!(t.get(0, "ratio").and_then(CellValue::as_f64), Some(0.5));
        assert_eq!(t.get(0, "label").and_then(CellValue::as_str), Some("cpu"));
        assert_eq!(
            t.get(0, "span"),
            Some(&CellValue::TimeSpan(
                chrono::Duration::days(1)
                    + chrono::Duration::hours(2)
                    + chrono::Duration::minutes(3)
                    + chrono::Duration::seconds(4)
                    + chrono::Duration::milliseconds(500)
            ))
        );
        assert!(matches!(t.get(0, "at"), Some(CellValue::DateTime(_))));
        assert!(matches!(t.get(0, "id"), Some(CellValue::Guid(_))));
    }

    #[test]
    fn nulls_decode_in_any_column() {
        let b = body(
            json!([{"name": "n", "type": "long"}, {"name": "s", "type": "string"}]),
            json!([[null, null]]),
        );
        let t = &decode_tables(&b).unwrap()[0];
        assert_eq!(t.rows[0], vec![CellValue::Null, CellValue::Null]);
    }

    #[test]
    fn unknown_column_type_is_an_error() {
        let b = body(json!([{"name": "x", "type": "decimal128"}]), json!([]));
        let err = decode_tables(&b).unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownColumnType { ref column_type, .. } if column_type == "decimal128"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let b = body(json!([{"name": "x", "type": "int"}]), json!([[1, 2]]));
        assert!(decode_tables(&b).is_err());
    }

    #[test]
    fn int_overflow_is_rejected() {
        let b = body(json!([{"name": "x", "type": "int"}]), json!([[9000000000i64]]));
        assert!(matches!(decode_tables(&b), Err(TelemetryError::Decode { .. })));
    }

    #[test]
    fn timespan_parsing() {
        assert_eq!(parse_timespan("00:00:30"), Some(chrono::Duration::seconds(30)));
        assert_eq!(parse_timespan("-01:00:00"), Some(-chrono::Duration::hours(1)));
        assert_eq!(parse_timespan("25:00:00"), None);
        assert_eq!(parse_timespan("abc"), None);
        assert_eq!(format_timespan(chrono::Duration::seconds(3_661)), "01:01:01");
    }

    #[test]
    fn double_accepts_special_strings() {
        let b = body(json!([{"name": "x", "type": "real"}]), json!([["NaN"], ["Infinity"]]));
        let t = &decode_tables(&b).unwrap()[0];
        assert!(t.rows[0][0].as_f64().unwrap().is_nan());
        assert_eq!(t.rows[1][0].as_f64(), Some(f64::INFINITY));
    }
}
