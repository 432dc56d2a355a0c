use std::{error::Error as StdError, fmt::Write, net::IpAddr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;

pub type JsonValue = serde_json::Value;

/// One result tuple keyed by column name, in SELECT order.
pub type Row = serde_json::Map<String, JsonValue>;

pub struct JsonConverter;

#[derive(Debug, Error)]
pub enum RowConversionError {
    #[error("type is not supported {0}")]
    UnsupportedType(String),

    #[error("invalid value in column {column}: {source}")]
    InvalidValue {
        column: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("undecodable value in column {column}: {reason}")]
    Undecodable { column: String, reason: String },
}

impl JsonConverter {
    pub fn from_row(row: &tokio_postgres::Row) -> Result<Row, RowConversionError> {
        let mut values = Row::with_capacity(row.columns().len());

        for (i, column) in row.columns().iter().enumerate() {
            values.insert(
                column.name().to_string(),
                Self::from_cell(row, i, column.type_())?,
            );
        }

        Ok(values)
    }

    fn from_cell(
        row: &tokio_postgres::Row,
        idx: usize,
        typ: &Type,
    ) -> Result<JsonValue, RowConversionError> {
        let value = match *typ {
            Type::BOOL => get::<bool>(row, idx)?.map(JsonValue::Bool),
            Type::CHAR => {
                get::<i8>(row, idx)?.map(|c| JsonValue::String((c as u8 as char).to_string()))
            }
            Type::BPCHAR | Type::VARCHAR | Type::NAME | Type::TEXT => {
                get::<String>(row, idx)?.map(JsonValue::String)
            }
            Type::INT2 => get::<i16>(row, idx)?.map(JsonValue::from),
            Type::INT4 => get::<i32>(row, idx)?.map(JsonValue::from),
            Type::INT8 => get::<i64>(row, idx)?.map(JsonValue::from),
            Type::OID => get::<u32>(row, idx)?.map(JsonValue::from),
            Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| float_to_json(v.into())),
            Type::FLOAT8 => get::<f64>(row, idx)?.map(float_to_json),
            Type::DATE => get::<NaiveDate>(row, idx)?.map(|v| JsonValue::String(format_date(v))),
            Type::TIME => get::<NaiveTime>(row, idx)?.map(|v| JsonValue::String(v.to_string())),
            Type::TIMESTAMP => {
                get::<NaiveDateTime>(row, idx)?.map(|v| JsonValue::String(format_timestamp(v)))
            }
            Type::TIMESTAMPTZ => {
                get::<DateTime<Utc>>(row, idx)?.map(|v| JsonValue::String(v.to_rfc3339()))
            }
            Type::JSON | Type::JSONB => get::<JsonValue>(row, idx)?,
            Type::UUID => get::<Uuid>(row, idx)?.map(|v| JsonValue::String(v.to_string())),
            Type::NUMERIC => get::<RawValue>(row, idx)?
                .map(|raw| numeric_to_json(raw.0).map_err(|e| undecodable(row, idx, e)))
                .transpose()?,
            Type::INTERVAL => get::<RawValue>(row, idx)?
                .map(|raw| {
                    format_interval(raw.0)
                        .map(JsonValue::String)
                        .ok_or_else(|| undecodable(row, idx, "interval is not 16 bytes".into()))
                })
                .transpose()?,
            Type::INET => get::<IpAddr>(row, idx)?.map(|v| JsonValue::String(v.to_string())),
            Type::BYTEA => get::<&[u8]>(row, idx)?.map(|v| JsonValue::String(format_bytea(v))),
            Type::BOOL_ARRAY => array::<bool>(row, idx, JsonValue::Bool)?,
            Type::INT2_ARRAY => array::<i16>(row, idx, JsonValue::from)?,
            Type::INT4_ARRAY => array::<i32>(row, idx, JsonValue::from)?,
            Type::INT8_ARRAY => array::<i64>(row, idx, JsonValue::from)?,
            Type::FLOAT4_ARRAY => array::<f32>(row, idx, |v| float_to_json(v.into()))?,
            Type::FLOAT8_ARRAY => array::<f64>(row, idx, float_to_json)?,
            Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY | Type::NAME_ARRAY => {
                array::<String>(row, idx, JsonValue::String)?
            }
            Type::UUID_ARRAY => array::<Uuid>(row, idx, |v| JsonValue::String(v.to_string()))?,
            // enum values travel as their label
            ref typ if matches!(typ.kind(), Kind::Enum(_)) => get::<RawValue>(row, idx)?
                .map(|raw| JsonValue::String(String::from_utf8_lossy(raw.0).into_owned())),
            ref typ => return Err(RowConversionError::UnsupportedType(typ.to_string())),
        };

        Ok(value.unwrap_or(JsonValue::Null))
    }
}

fn get<'a, T: FromSql<'a>>(
    row: &'a tokio_postgres::Row,
    idx: usize,
) -> Result<Option<T>, RowConversionError> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|source| RowConversionError::InvalidValue {
            column: row.columns()[idx].name().to_string(),
            source,
        })
}

fn array<'a, T: FromSql<'a>>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    to_json: impl Fn(T) -> JsonValue,
) -> Result<Option<JsonValue>, RowConversionError> {
    Ok(get::<Vec<Option<T>>>(row, idx)?.map(|values| {
        JsonValue::Array(
            values
                .into_iter()
                .map(|v| v.map(&to_json).unwrap_or(JsonValue::Null))
                .collect(),
        )
    }))
}

fn undecodable(row: &tokio_postgres::Row, idx: usize, reason: String) -> RowConversionError {
    RowConversionError::Undecodable {
        column: row.columns()[idx].name().to_string(),
        reason,
    }
}

/// Undecoded binary value of any type.
struct RawValue<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawValue<'a> {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(RawValue(raw))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

// Exact decimal text. NaN and the infinities become null.
fn numeric_to_json(raw: &[u8]) -> Result<JsonValue, String> {
    if let Some(sign) = raw.get(4..6) {
        let sign = u16::from_be_bytes([sign[0], sign[1]]);
        if matches!(sign, NUMERIC_NAN | NUMERIC_PINF | NUMERIC_NINF) {
            return Ok(JsonValue::Null);
        }
    }
    Decimal::from_sql(&Type::NUMERIC, raw)
        .map(|v| JsonValue::String(v.to_string()))
        .map_err(|e| e.to_string())
}

// ISO 8601 duration, e.g. `P1Y2M3DT4H5M6.5S`.
fn format_interval(raw: &[u8]) -> Option<String> {
    let raw: &[u8; 16] = raw.try_into().ok()?;
    let micros = i64::from_be_bytes(raw[0..8].try_into().ok()?);
    let days = i32::from_be_bytes(raw[8..12].try_into().ok()?);
    let months = i32::from_be_bytes(raw[12..16].try_into().ok()?);

    let mut out = String::from("P");
    let (years, months) = (months / 12, months % 12);
    if years != 0 {
        let _ = write!(out, "{years}Y");
    }
    if months != 0 {
        let _ = write!(out, "{months}M");
    }
    if days != 0 {
        let _ = write!(out, "{days}D");
    }

    if micros != 0 {
        let sign = if micros < 0 { "-" } else { "" };
        let abs = micros.unsigned_abs();
        let (hours, rest) = (abs / 3_600_000_000, abs % 3_600_000_000);
        let (minutes, rest) = (rest / 60_000_000, rest % 60_000_000);
        let (seconds, fraction) = (rest / 1_000_000, rest % 1_000_000);

        out.push('T');
        if hours != 0 {
            let _ = write!(out, "{sign}{hours}H");
        }
        if minutes != 0 {
            let _ = write!(out, "{sign}{minutes}M");
        }
        if fraction != 0 {
            let fraction = format!("{fraction:06}");
            let _ = write!(out, "{sign}{seconds}.{}S", fraction.trim_end_matches('0'));
        } else if seconds != 0 {
            let _ = write!(out, "{sign}{seconds}S");
        }
    }

    if out.len() == 1 {
        out.push_str("T0S");
    }
    Some(out)
}

// Postgres' hex output format.
fn format_bytea(v: &[u8]) -> String {
    let mut out = String::with_capacity(2 + v.len() * 2);
    out.push_str("\\x");
    for b in v {
        let _ = write!(out, "{b:02x}");
    }
    out
}

// JSON has no representation for NaN or the infinities.
fn float_to_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

fn format_date(v: NaiveDate) -> String {
    v.format("%Y-%m-%d").to_string()
}

fn format_timestamp(v: NaiveDateTime) -> String {
    v.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}
