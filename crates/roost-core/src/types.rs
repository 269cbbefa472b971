//! Column types and their Arrow mapping.
//!
//! A [`ColumnType`] is the concrete scalar or list type a column may hold.
//! Every variant maps one-to-one onto an Arrow [`DataType`]: timestamps
//! always carry the `UTC` timezone, dictionaries are `Int32`-keyed strings.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, TimeUnit};

use crate::error::{Result, StoreError};

/// Timezone attached to every timestamp column.
pub const TIMESTAMP_TZ: &str = "UTC";

/// Name of the item field inside list columns.
pub const LIST_ITEM_FIELD: &str = "item";

/// Timestamp resolution, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimestampUnit {
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl TimestampUnit {
    pub const ALL: [TimestampUnit; 4] = [
        TimestampUnit::Second,
        TimestampUnit::Millisecond,
        TimestampUnit::Microsecond,
        TimestampUnit::Nanosecond,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampUnit::Second => "s",
            TimestampUnit::Millisecond => "ms",
            TimestampUnit::Microsecond => "us",
            TimestampUnit::Nanosecond => "ns",
        }
    }

    fn to_arrow(self) -> TimeUnit {
        match self {
            TimestampUnit::Second => TimeUnit::Second,
            TimestampUnit::Millisecond => TimeUnit::Millisecond,
            TimestampUnit::Microsecond => TimeUnit::Microsecond,
            TimestampUnit::Nanosecond => TimeUnit::Nanosecond,
        }
    }

    fn from_arrow(unit: &TimeUnit) -> Self {
        match unit {
            TimeUnit::Second => TimestampUnit::Second,
            TimeUnit::Millisecond => TimestampUnit::Millisecond,
            TimeUnit::Microsecond => TimestampUnit::Microsecond,
            TimeUnit::Nanosecond => TimestampUnit::Nanosecond,
        }
    }
}

/// A concrete column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Timestamp(TimestampUnit),
    Utf8,
    Dictionary,
    List(Box<ColumnType>),
}

impl ColumnType {
    pub fn list(item: ColumnType) -> Self {
        ColumnType::List(Box::new(item))
    }

    /// Arrow data type for this column type.
    pub fn to_arrow(&self) -> DataType {
        match self {
            ColumnType::Bool => DataType::Boolean,
            ColumnType::Int8 => DataType::Int8,
            ColumnType::Int16 => DataType::Int16,
            ColumnType::Int32 => DataType::Int32,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::UInt8 => DataType::UInt8,
            ColumnType::UInt16 => DataType::UInt16,
            ColumnType::UInt32 => DataType::UInt32,
            ColumnType::UInt64 => DataType::UInt64,
            ColumnType::Float16 => DataType::Float16,
            ColumnType::Float32 => DataType::Float32,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Timestamp(unit) => {
                DataType::Timestamp(unit.to_arrow(), Some(TIMESTAMP_TZ.into()))
            }
            ColumnType::Utf8 => DataType::Utf8,
            ColumnType::Dictionary => {
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
            }
            ColumnType::List(item) => DataType::List(Arc::new(Field::new(
                LIST_ITEM_FIELD,
                item.to_arrow(),
                true,
            ))),
        }
    }

    /// Map an Arrow data type back onto a column type.
    ///
    /// Fails with `UnsupportedType` for Arrow types roost never produces.
    pub fn from_arrow(data_type: &DataType) -> Result<Self> {
        let ty = match data_type {
            DataType::Boolean => ColumnType::Bool,
            DataType::Int8 => ColumnType::Int8,
            DataType::Int16 => ColumnType::Int16,
            DataType::Int32 => ColumnType::Int32,
            DataType::Int64 => ColumnType::Int64,
            DataType::UInt8 => ColumnType::UInt8,
            DataType::UInt16 => ColumnType::UInt16,
            DataType::UInt32 => ColumnType::UInt32,
            DataType::UInt64 => ColumnType::UInt64,
            DataType::Float16 => ColumnType::Float16,
            DataType::Float32 => ColumnType::Float32,
            DataType::Float64 => ColumnType::Float64,
            DataType::Timestamp(unit, _) => ColumnType::Timestamp(TimestampUnit::from_arrow(unit)),
            DataType::Utf8 | DataType::LargeUtf8 => ColumnType::Utf8,
            DataType::Dictionary(_, value) if matches!(value.as_ref(), DataType::Utf8) => {
                ColumnType::Dictionary
            }
            DataType::List(item) | DataType::LargeList(item) => {
                ColumnType::list(ColumnType::from_arrow(item.data_type())?)
            }
            other => return Err(StoreError::UnsupportedType(other.to_string())),
        };
        Ok(ty)
    }

    /// A nullable Arrow field of this type.
    pub fn field(&self, name: &str) -> Field {
        Field::new(name, self.to_arrow(), true)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Bool => f.write_str("bool"),
            ColumnType::Int8 => f.write_str("int8"),
            ColumnType::Int16 => f.write_str("int16"),
            ColumnType::Int32 => f.write_str("int32"),
            ColumnType::Int64 => f.write_str("int64"),
            ColumnType::UInt8 => f.write_str("uint8"),
            ColumnType::UInt16 => f.write_str("uint16"),
            ColumnType::UInt32 => f.write_str("uint32"),
            ColumnType::UInt64 => f.write_str("uint64"),
            ColumnType::Float16 => f.write_str("float16"),
            ColumnType::Float32 => f.write_str("float32"),
            ColumnType::Float64 => f.write_str("float64"),
            ColumnType::Timestamp(unit) => write!(f, "timestamp[{}]", unit.as_str()),
            ColumnType::Utf8 => f.write_str("string"),
            ColumnType::Dictionary => f.write_str("dictionary"),
            ColumnType::List(item) => write!(f, "list<{}>", item),
        }
    }
}

impl FromStr for ColumnType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if let Some(inner) = s.strip_prefix("list<").and_then(|r| r.strip_suffix('>')) {
            return Ok(ColumnType::list(inner.parse()?));
        }
        if let Some(unit) = s.strip_prefix("timestamp[").and_then(|r| r.strip_suffix(']')) {
            let unit = TimestampUnit::ALL
                .into_iter()
                .find(|u| u.as_str() == unit)
                .ok_or_else(|| StoreError::UnsupportedType(s.clone()))?;
            return Ok(ColumnType::Timestamp(unit));
        }
        let ty = match s.as_str() {
            "bool" | "boolean" => ColumnType::Bool,
            "int8" => ColumnType::Int8,
            "int16" => ColumnType::Int16,
            "int32" => ColumnType::Int32,
            "int64" | "int" => ColumnType::Int64,
            "uint8" => ColumnType::UInt8,
            "uint16" => ColumnType::UInt16,
            "uint32" => ColumnType::UInt32,
            "uint64" => ColumnType::UInt64,
            "float16" => ColumnType::Float16,
            "float32" => ColumnType::Float32,
            "float64" | "float" | "double" => ColumnType::Float64,
            "timestamp" => ColumnType::Timestamp(TimestampUnit::Microsecond),
            "string" | "utf8" | "str" => ColumnType::Utf8,
            "dictionary" | "dict" | "category" => ColumnType::Dictionary,
            _ => return Err(StoreError::UnsupportedType(s)),
        };
        Ok(ty)
    }
}
