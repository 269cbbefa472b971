//! Roost common types.
//!
//! This crate provides the raw value model shared by every roost crate:
//! - `Value`, the tagged variant a record field may hold
//! - `Record` and `Columns`, insertion-ordered field mappings
//! - Textual rendering rules used when a column falls back to strings
//! - Reserved column names and schema versioning

pub mod schema;
pub mod value;

pub use schema::{is_compatible, INDEX_COLUMN, SCHEMA_VERSION};
pub use value::{Columns, EnumTag, NestedTable, Record, Value, ValueKind};

/// Build a [`Record`] from `name => value` pairs, keeping the written order.
///
/// ```
/// use roost_common::{record, Value};
///
/// let r = record! { "a" => 1, "b" => "x", "c" => Value::Null };
/// assert_eq!(r.len(), 3);
/// assert_eq!(r["a"], Value::Int(1));
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $(
            record.insert(::std::string::String::from($name), $crate::Value::from($value));
        )+
        record
    }};
}
