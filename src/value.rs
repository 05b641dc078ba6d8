//! Bound values and their declared database types.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared database type of an operation parameter.
///
/// `Object` is the catch-all for host types outside the recognised set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    Byte,
    #[serde(rename = "sbyte", alias = "s_byte")]
    SByte,
    Int16,
    #[serde(rename = "uint16", alias = "u_int16")]
    UInt16,
    Int32,
    #[serde(rename = "uint32", alias = "u_int32")]
    UInt32,
    Int64,
    #[serde(rename = "uint64", alias = "u_int64")]
    UInt64,
    Boolean,
    String,
    StringFixedLength,
    Decimal,
    Single,
    Double,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    Binary,
    Guid,
    #[default]
    Object,
}

impl DbType {
    /// Map a host type to its declared database type.
    ///
    /// ```
    /// use sqlweave::value::DbType;
    ///
    /// assert_eq!(DbType::of::<i32>(), DbType::Int32);
    /// assert_eq!(DbType::of::<Vec<String>>(), DbType::Object);
    /// ```
    pub fn of<T: ?Sized + 'static>() -> DbType {
        let id = TypeId::of::<T>();

        macro_rules! lookup {
            ($($host:ty => $db:ident),* $(,)?) => {
                $(
                    if id == TypeId::of::<$host>() {
                        return DbType::$db;
                    }
                )*
            };
        }

        lookup! {
            u8 => Byte,
            i8 => SByte,
            i16 => Int16,
            u16 => UInt16,
            i32 => Int32,
            u32 => UInt32,
            i64 => Int64,
            u64 => UInt64,
            bool => Boolean,
            String => String,
            str => String,
            &'static str => String,
            char => StringFixedLength,
            Vec<char> => StringFixedLength,
            [char] => StringFixedLength,
            Decimal => Decimal,
            f32 => Single,
            f64 => Double,
            NaiveDate => Date,
            NaiveTime => Time,
            NaiveDateTime => DateTime,
            DateTime<Utc> => DateTimeOffset,
            DateTime<FixedOffset> => DateTimeOffset,
            Vec<u8> => Binary,
            [u8] => Binary,
            Uuid => Guid,
        }

        DbType::Object
    }

    /// Lowercase name, as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            DbType::Byte => "byte",
            DbType::SByte => "sbyte",
            DbType::Int16 => "int16",
            DbType::UInt16 => "uint16",
            DbType::Int32 => "int32",
            DbType::UInt32 => "uint32",
            DbType::Int64 => "int64",
            DbType::UInt64 => "uint64",
            DbType::Boolean => "boolean",
            DbType::String => "string",
            DbType::StringFixedLength => "string_fixed_length",
            DbType::Decimal => "decimal",
            DbType::Single => "single",
            DbType::Double => "double",
            DbType::Date => "date",
            DbType::Time => "time",
            DbType::DateTime => "date_time",
            DbType::DateTimeOffset => "date_time_offset",
            DbType::Binary => "binary",
            DbType::Guid => "guid",
            DbType::Object => "object",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dynamic value bound to a SQL variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Decimal(Decimal),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the value as a string slice, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The declared type this value would get if it had no metadata.
    pub fn db_type(&self) -> DbType {
        match self {
            Value::Null => DbType::Object,
            Value::Bool(_) => DbType::Boolean,
            Value::Int(_) => DbType::Int64,
            Value::UInt(_) => DbType::UInt64,
            Value::Float(_) => DbType::Double,
            Value::Text(_) => DbType::String,
            Value::Decimal(_) => DbType::Decimal,
            Value::Uuid(_) => DbType::Guid,
            Value::Date(_) => DbType::Date,
            Value::Time(_) => DbType::Time,
            Value::DateTime(_) => DbType::DateTime,
            Value::DateTimeOffset(_) => DbType::DateTimeOffset,
            Value::Bytes(_) => DbType::Binary,
        }
    }

    /// Textual form of values that databases without a native type store as text.
    ///
    /// The formats round-trip through the serde impls of the chrono, uuid
    /// and rust_decimal types.
    pub(crate) fn to_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Text(s) => Some(Cow::Borrowed(s)),
            Value::Decimal(d) => Some(Cow::Owned(d.to_string())),
            Value::Uuid(u) => Some(Cow::Owned(u.hyphenated().to_string())),
            Value::Date(d) => Some(Cow::Owned(d.format("%Y-%m-%d").to_string())),
            Value::Time(t) => Some(Cow::Owned(t.format("%H:%M:%S%.f").to_string())),
            Value::DateTime(dt) => Some(Cow::Owned(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            Value::DateTimeOffset(dt) => Some(Cow::Owned(dt.to_rfc3339())),
            _ => None,
        }
    }

    /// Parse a loosely typed literal, as typed on a command line.
    ///
    /// Integers, floats, `true`/`false` and `null` are recognised; anything
    /// else is text.
    pub fn parse_literal(input: &str) -> Value {
        if let Ok(n) = input.parse::<i64>() {
            Value::Int(n)
        } else if let Ok(f) = input.parse::<f64>() {
            if f.is_finite() {
                Value::Float(f)
            } else {
                Value::Text(input.to_string())
            }
        } else if input.eq_ignore_ascii_case("true") {
            Value::Bool(true)
        } else if input.eq_ignore_ascii_case("false") {
            Value::Bool(false)
        } else if input.eq_ignore_ascii_case("null") {
            Value::Null
        } else {
            Value::Text(input.to_string())
        }
    }

    /// Convert to a JSON value for row output and typed decoding.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::UInt(n) => serde_json::Value::Number((*n).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bytes(bytes) => serde_json::Value::Array(
                bytes
                    .iter()
                    .map(|b| serde_json::Value::Number((*b).into()))
                    .collect(),
            ),
            other => other
                .to_text()
                .map(|s| serde_json::Value::String(s.into_owned()))
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::UInt(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Bytes(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{:02X}", b)?;
                }
                Ok(())
            }
            other => {
                let text = other.to_text().unwrap_or_default();
                write!(f, "'{}'", text.replace('\'', "''"))
            }
        }
    }
}

macro_rules! value_from {
    ($($host:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl From<$host> for Value {
                fn from($v: $host) -> Self {
                    $body
                }
            }
        )*
    };
}

value_from! {
    bool => |v| Value::Bool(v),
    i8 => |v| Value::Int(v as i64),
    i16 => |v| Value::Int(v as i64),
    i32 => |v| Value::Int(v as i64),
    i64 => |v| Value::Int(v),
    u8 => |v| Value::UInt(v as u64),
    u16 => |v| Value::UInt(v as u64),
    u32 => |v| Value::UInt(v as u64),
    u64 => |v| Value::UInt(v),
    f32 => |v| Value::Float(v as f64),
    f64 => |v| Value::Float(v),
    char => |v| Value::Text(v.to_string()),
    &str => |v| Value::Text(v.to_string()),
    String => |v| Value::Text(v),
    Decimal => |v| Value::Decimal(v),
    Uuid => |v| Value::Uuid(v),
    NaiveDate => |v| Value::Date(v),
    NaiveTime => |v| Value::Time(v),
    NaiveDateTime => |v| Value::DateTime(v),
    DateTime<FixedOffset> => |v| Value::DateTimeOffset(v),
    DateTime<Utc> => |v| Value::DateTimeOffset(v.into()),
    Vec<u8> => |v| Value::Bytes(v),
    &[u8] => |v| Value::Bytes(v.to_vec()),
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
