//! Raw record values.
//!
//! Records arrive sparse and heterogeneously typed. Every field value is one
//! variant of [`Value`]; column type inference downstream is a match over this
//! variant, so the fallback paths (dictionary encoding, stringification) are
//! exhaustive.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

/// One caller-supplied set of named values. Field order is discovery order.
pub type Record = IndexMap<String, Value>;

/// Column-oriented raw values, one sequence per field.
pub type Columns = IndexMap<String, Vec<Value>>;

/// A single raw field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    String(String),
    Bytes(Vec<u8>),
    Enum(EnumTag),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Table(NestedTable),
}

/// Discriminant of a [`Value`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    UInt,
    Float,
    Timestamp,
    String,
    Bytes,
    Enum,
    List,
    Map,
    Table,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::UInt => "uint",
            ValueKind::Float => "float",
            ValueKind::Timestamp => "timestamp",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Enum => "enum",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Table => "table",
        };
        f.write_str(name)
    }
}

/// A member of a named enumeration, e.g. `Mode.safe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumTag {
    pub type_name: String,
    pub variant: String,
}

impl EnumTag {
    pub fn new(type_name: impl Into<String>, variant: impl Into<String>) -> Self {
        EnumTag {
            type_name: type_name.into(),
            variant: variant.into(),
        }
    }
}

impl fmt::Display for EnumTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.type_name.is_empty() {
            f.write_str(&self.variant)
        } else {
            write!(f, "{}.{}", self.type_name, self.variant)
        }
    }
}

/// A tabular value nested inside a single record field.
///
/// Never flattened into the outer table; it is rendered to text instead.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NestedTable {
    pub columns: Columns,
}

impl NestedTable {
    pub fn new(columns: Columns) -> Self {
        NestedTable { columns }
    }

    /// Number of rows (length of the first column).
    pub fn num_rows(&self) -> usize {
        self.columns.values().next().map_or(0, Vec::len)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::UInt(_) => ValueKind::UInt,
            Value::Float(_) => ValueKind::Float,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Enum(_) => ValueKind::Enum,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::Table(_) => ValueKind::Table,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value as text for string-typed columns. Null stays null.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Compact JSON rendering, used for nested values.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// Float rendering that keeps a trailing `.0` on integral values.
fn format_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        write!(f, "{:.1}", x)
    } else {
        write!(f, "{}", x)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::UInt(u) => write!(f, "{}", u),
            Value::Float(x) => format_float(f, *x),
            Value::Timestamp(ts) => f.write_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::String(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&hex::encode(b)),
            Value::Enum(tag) => write!(f, "{}", tag),
            Value::List(_) | Value::Map(_) | Value::Table(_) => f.write_str(&self.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Timestamp(ts) => ts.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&hex::encode(b)),
            Value::Enum(tag) => serializer.collect_str(tag),
            Value::List(items) => items.serialize(serializer),
            Value::Map(map) => map.serialize(serializer),
            Value::Table(table) => table.columns.serialize(serializer),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident as $target:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(<$target>::from(v))
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool as bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
    String => String as String,
    &str => String as String,
    DateTime<Utc> => Timestamp as DateTime<Utc>,
    EnumTag => Enum as EnumTag,
    NestedTable => Table as NestedTable,
    Vec<Value> => List as Vec<Value>,
    IndexMap<String, Value> => Map as IndexMap<String, Value>,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
