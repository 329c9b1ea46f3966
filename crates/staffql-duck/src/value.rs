//! Typed result rows
//!
//! A [`Record`] keeps the column order of the query that produced it and
//! serializes as a JSON object in that order. Cells render as:
//!
//! - dates `YYYY-MM-DD`, times `HH:MM:SS[.fff]`, timestamps
//!   `YYYY-MM-DDTHH:MM:SS[.fff]`
//! - intervals as ISO-8601 durations (`P1Y2M3DT4H5M6.5S`)
//! - lists and arrays as JSON arrays, structs and maps as JSON objects
//!   (map keys in their text form)

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use duckdb::types::{TimeUnit, Value, ValueRef};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use tracing::debug;

/// Days between 0001-01-01 and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A single cell of a query result
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Interval(Interval),
    List(Vec<Scalar>),
    Struct(Record),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view of the cell; integers widen to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Read column `idx` of a DuckDB row
    pub fn from_row(row: &duckdb::Row<'_>, idx: usize) -> duckdb::Result<Self> {
        Ok(match row.get_ref(idx)? {
            // Lossy, so a badly encoded dataset string cannot fail the whole query
            ValueRef::Text(bytes) => Scalar::Text(String::from_utf8_lossy(bytes).into_owned()),
            other => Scalar::from(Value::from(other)),
        })
    }
}

impl From<Value> for Scalar {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Boolean(b) => Scalar::Bool(b),
            Value::TinyInt(i) => Scalar::Integer(i.into()),
            Value::SmallInt(i) => Scalar::Integer(i.into()),
            Value::Int(i) => Scalar::Integer(i.into()),
            Value::BigInt(i) => Scalar::Integer(i),
            Value::HugeInt(i) => i64::try_from(i)
                .map(Scalar::Integer)
                .unwrap_or(Scalar::Float(i as f64)),
            Value::UTinyInt(i) => Scalar::Integer(i.into()),
            Value::USmallInt(i) => Scalar::Integer(i.into()),
            Value::UInt(i) => Scalar::Integer(i.into()),
            Value::UBigInt(i) => i64::try_from(i)
                .map(Scalar::Integer)
                .unwrap_or(Scalar::Float(i as f64)),
            Value::Float(f) => Scalar::Float(f.into()),
            Value::Double(f) => Scalar::Float(f),
            Value::Decimal(d) => {
                let text = d.to_string();
                text.parse::<f64>()
                    .map(Scalar::Float)
                    .unwrap_or(Scalar::Text(text))
            }
            Value::Text(s) | Value::Enum(s) => Scalar::Text(s),
            Value::Blob(b) => Scalar::Text(format!("<blob {} bytes>", b.len())),
            Value::Date32(days) => days
                .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .map(Scalar::Date)
                .unwrap_or(Scalar::Null),
            Value::Time64(unit, value) => time_of_day(unit, value),
            Value::Timestamp(unit, value) => timestamp(unit, value),
            Value::Interval { months, days, nanos } => Scalar::Interval(Interval { months, days, nanos }),
            Value::List(items) | Value::Array(items) => {
                Scalar::List(items.into_iter().map(Scalar::from).collect())
            }
            Value::Struct(fields) => {
                let mut record = Record::new();
                for (name, value) in fields.iter() {
                    record.push(name.clone(), Scalar::from(value.clone()));
                }
                Scalar::Struct(record)
            }
            Value::Map(entries) => {
                let mut record = Record::new();
                for (key, value) in entries.iter() {
                    record.push(Scalar::from(key.clone()).to_string(), Scalar::from(value.clone()));
                }
                Scalar::Struct(record)
            }
            Value::Union(inner) => Scalar::from(*inner),
            other => {
                debug!(value = ?other, "No scalar mapping for DuckDB value, rendering null");
                Scalar::Null
            }
        }
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

/// Whole seconds and sub-second nanos of a microsecond count
fn split_micros(micros: i64) -> (i64, u32) {
    (micros.div_euclid(1_000_000), (micros.rem_euclid(1_000_000) * 1_000) as u32)
}

fn timestamp(unit: TimeUnit, value: i64) -> Scalar {
    let (secs, nanos) = split_micros(to_micros(unit, value));
    DateTime::from_timestamp(secs, nanos)
        .map(|dt| Scalar::Timestamp(dt.naive_utc()))
        .unwrap_or(Scalar::Null)
}

fn time_of_day(unit: TimeUnit, value: i64) -> Scalar {
    let (secs, nanos) = split_micros(to_micros(unit, value));
    u32::try_from(secs)
        .ok()
        .and_then(|secs| NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos))
        .map(Scalar::Time)
        .unwrap_or(Scalar::Null)
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Scalar::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Scalar::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Scalar::Interval(interval) => write!(f, "{}", interval),
            Scalar::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Scalar::Struct(record) => {
                f.write_str("{")?;
                for (i, (name, value)) in record.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_none(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Integer(i) => serializer.serialize_i64(*i),
            Scalar::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Scalar::Float(_) => serializer.serialize_none(),
            Scalar::Text(s) => serializer.serialize_str(s),
            Scalar::Date(d) => serializer.collect_str(&d.format(DATE_FORMAT)),
            Scalar::Time(t) => serializer.collect_str(&t.format(TIME_FORMAT)),
            Scalar::Timestamp(ts) => serializer.collect_str(&ts.format(TIMESTAMP_FORMAT)),
            Scalar::Interval(interval) => serializer.collect_str(interval),
            Scalar::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Scalar::Struct(record) => record.serialize(serializer),
        }
    }
}

/// DuckDB's month/day/nanosecond interval
///
/// Displays as an ISO-8601 duration. Months fold into years, nanoseconds
/// split into hours, minutes and seconds; a negative part carries its own
/// sign (`PT-30S`). The empty interval is `PT0S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub nanos: i64,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months == 0 && self.days == 0 && self.nanos == 0 {
            return f.write_str("PT0S");
        }

        f.write_str("P")?;
        let (years, months) = (self.months / 12, self.months % 12);
        if years != 0 {
            write!(f, "{}Y", years)?;
        }
        if months != 0 {
            write!(f, "{}M", months)?;
        }
        if self.days != 0 {
            write!(f, "{}D", self.days)?;
        }
        if self.nanos == 0 {
            return Ok(());
        }

        let sign = if self.nanos < 0 { "-" } else { "" };
        let total = self.nanos.unsigned_abs();
        let hours = total / (3_600 * NANOS_PER_SECOND);
        let minutes = total / (60 * NANOS_PER_SECOND) % 60;
        let seconds = total / NANOS_PER_SECOND % 60;
        let fraction = total % NANOS_PER_SECOND;

        f.write_str("T")?;
        if hours != 0 {
            write!(f, "{}{}H", sign, hours)?;
        }
        if minutes != 0 {
            write!(f, "{}{}M", sign, minutes)?;
        }
        if seconds != 0 || fraction != 0 {
            write!(f, "{}{}", sign, seconds)?;
            if fraction != 0 {
                let digits = format!("{:09}", fraction);
                write!(f, ".{}", digits.trim_end_matches('0'))?;
            }
            f.write_str("S")?;
        }
        Ok(())
    }
}

/// One result row: column name to value, in select-list order
///
/// Column names are unique. Pushing a name that is already present keeps
/// its original position and replaces the value, so `SELECT 1 AS a, 2 AS a`
/// yields `{"a": 2}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Scalar)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: Scalar) {
        let column = column.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Convert every column of the single row `sql` returns
    fn select_row(sql: &str) -> Vec<Scalar> {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare(sql).unwrap();
        let mut rows = stmt.query([]).unwrap();
        let width = rows.as_ref().map(|stmt| stmt.column_count()).unwrap_or(0);
        let row = rows.next().unwrap().unwrap();
        (0..width).map(|idx| Scalar::from_row(row, idx).unwrap()).collect()
    }

    fn to_json(scalar: &Scalar) -> serde_json::Value {
        serde_json::to_value(scalar).unwrap()
    }

    #[test]
    fn test_record_keeps_column_order() {
        let mut record = Record::new();
        record.push("salact", Scalar::Float(57000.0));
        record.push("id", Scalar::Integer(1));
        record.push("sexe", Scalar::Text("m".to_string()));

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"salact":57000.0,"id":1,"sexe":"m"}"#);
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["salact", "id", "sexe"]);
    }

    #[test]
    fn test_repeated_column_keeps_position_and_last_value() {
        let mut record = Record::new();
        record.push("a", Scalar::Integer(1));
        record.push("b", Scalar::Integer(2));
        record.push("a", Scalar::Integer(3));

        assert_eq!(record.len(), 2);
        assert_eq!(record.get("a"), Some(&Scalar::Integer(3)));
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"a":3,"b":2}"#);
    }

    #[test]
    fn test_scalar_json_rendering() {
        let date = NaiveDate::from_ymd_opt(1952, 2, 3).unwrap();
        let ts = date.and_hms_opt(8, 30, 0).unwrap();

        assert_eq!(to_json(&Scalar::Null), serde_json::Value::Null);
        assert_eq!(to_json(&Scalar::Date(date)), "1952-02-03");
        assert_eq!(to_json(&Scalar::Timestamp(ts)), "1952-02-03T08:30:00");
        assert_eq!(to_json(&Scalar::Float(f64::NAN)), serde_json::Value::Null);
        assert_eq!(to_json(&Scalar::Bool(true)), true);
    }

    #[test]
    fn test_time_values() {
        let row = select_row("SELECT TIME '09:30:00' AS t, TIME '23:59:59.25' AS frac");
        assert_eq!(row[0], Scalar::Time(NaiveTime::from_hms_opt(9, 30, 0).unwrap()));
        assert_eq!(to_json(&row[0]), "09:30:00");
        assert_eq!(to_json(&row[1]), "23:59:59.250");
    }

    #[test]
    fn test_interval_values() {
        let row = select_row(
            "SELECT INTERVAL 2 DAY, \
                    INTERVAL 14 MONTH + INTERVAL 3 DAY + INTERVAL 14706500 MILLISECOND, \
                    INTERVAL 90 MINUTE, \
                    INTERVAL (-30) SECOND",
        );
        assert_eq!(row[0], Scalar::Interval(Interval { months: 0, days: 2, nanos: 0 }));
        assert_eq!(to_json(&row[0]), "P2D");
        assert_eq!(to_json(&row[1]), "P1Y2M3DT4H5M6.5S");
        assert_eq!(to_json(&row[2]), "PT1H30M");
        assert_eq!(to_json(&row[3]), "PT-30S");
    }

    #[test]
    fn test_empty_interval() {
        let zero = Interval { months: 0, days: 0, nanos: 0 };
        assert_eq!(zero.to_string(), "PT0S");
    }

    #[test]
    fn test_list_and_array_values() {
        let row = select_row("SELECT [1, 2] AS l, [1.5, NULL] AS n, array_value('m', 'f') AS a");
        assert_eq!(row[0], Scalar::List(vec![Scalar::Integer(1), Scalar::Integer(2)]));
        assert_eq!(to_json(&row[0]), json!([1, 2]));
        assert_eq!(to_json(&row[1]), json!([1.5, null]));
        assert_eq!(to_json(&row[2]), json!(["m", "f"]));
    }

    #[test]
    fn test_struct_values() {
        let row = select_row("SELECT {'sexe': 'f', 'salact': 21450.0, 'educ': [8, 12]} AS s");
        assert_eq!(to_json(&row[0]), json!({"sexe": "f", "salact": 21450.0, "educ": [8, 12]}));
        match &row[0] {
            Scalar::Struct(record) => {
                assert_eq!(record.columns().collect::<Vec<_>>(), vec!["sexe", "salact", "educ"]);
            }
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn test_map_values() {
        let row = select_row("SELECT MAP {'f': 23430, 'm': 42060} AS m, MAP {1: 'un'} AS k");
        assert_eq!(to_json(&row[0]), json!({"f": 23430, "m": 42060}));
        assert_eq!(to_json(&row[1]), json!({"1": "un"}));
    }

    #[test]
    fn test_scalar_accessors() {
        assert_eq!(Scalar::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Scalar::Float(2.5).as_i64(), None);
        assert_eq!(Scalar::Text("f".into()).as_str(), Some("f"));
        assert!(Scalar::Null.is_null());
    }

    #[test]
    fn test_unix_epoch_offset() {
        let epoch = NaiveDate::from_num_days_from_ce_opt(UNIX_EPOCH_DAYS_FROM_CE).unwrap();
        assert_eq!(epoch, NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    }
}
