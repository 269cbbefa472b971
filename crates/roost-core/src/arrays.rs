//! Conversions from Arrow arrays back into raw values and text.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, StringArray};
use arrow::compute::cast;
use arrow::datatypes::*;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::{DateTime, Utc};
use roost_common::Value;

use crate::error::Result;

fn primitive<T>(array: &dyn Array) -> Vec<Value>
where
    T: ArrowPrimitiveType,
    T::Native: Into<Value>,
{
    array.as_primitive::<T>().iter().map(Value::from).collect()
}

fn timestamps<T, F>(array: &dyn Array, convert: F) -> Vec<Value>
where
    T: ArrowPrimitiveType<Native = i64>,
    F: Fn(i64) -> Option<DateTime<Utc>>,
{
    array
        .as_primitive::<T>()
        .iter()
        .map(|v| Value::from(v.and_then(&convert)))
        .collect()
}

/// Convert an Arrow array into one raw value per row.
///
/// Types with no direct [`Value`] counterpart are rendered to text.
pub fn array_to_values(array: &dyn Array) -> Result<Vec<Value>> {
    let values = match array.data_type() {
        DataType::Null => vec![Value::Null; array.len()],
        DataType::Boolean => array.as_boolean().iter().map(Value::from).collect(),
        DataType::Int8 => primitive::<Int8Type>(array),
        DataType::Int16 => primitive::<Int16Type>(array),
        DataType::Int32 => primitive::<Int32Type>(array),
        DataType::Int64 => primitive::<Int64Type>(array),
        DataType::UInt8 => primitive::<UInt8Type>(array),
        DataType::UInt16 => primitive::<UInt16Type>(array),
        DataType::UInt32 => primitive::<UInt32Type>(array),
        DataType::UInt64 => primitive::<UInt64Type>(array),
        DataType::Float16 => array
            .as_primitive::<Float16Type>()
            .iter()
            .map(|v| Value::from(v.map(|h| h.to_f64())))
            .collect(),
        DataType::Float32 => primitive::<Float32Type>(array),
        DataType::Float64 => primitive::<Float64Type>(array),
        DataType::Timestamp(TimeUnit::Second, _) => {
            timestamps::<TimestampSecondType, _>(array, |v| DateTime::<Utc>::from_timestamp(v, 0))
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            timestamps::<TimestampMillisecondType, _>(array, DateTime::<Utc>::from_timestamp_millis)
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            timestamps::<TimestampMicrosecondType, _>(array, DateTime::<Utc>::from_timestamp_micros)
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            timestamps::<TimestampNanosecondType, _>(array, |v| {
                Some(DateTime::<Utc>::from_timestamp_nanos(v))
            })
        }
        DataType::Utf8 => array.as_string::<i32>().iter().map(Value::from).collect(),
        DataType::LargeUtf8 => array.as_string::<i64>().iter().map(Value::from).collect(),
        DataType::Dictionary(_, _) => {
            let decoded = cast(array, &DataType::Utf8)?;
            decoded.as_string::<i32>().iter().map(Value::from).collect()
        }
        DataType::List(_) => list_values(array.as_list::<i32>().iter())?,
        DataType::LargeList(_) => list_values(array.as_list::<i64>().iter())?,
        _ => {
            let text = stringify_array(array)?;
            text.as_string::<i32>().iter().map(Value::from).collect()
        }
    };
    Ok(values)
}

fn list_values(items: impl Iterator<Item = Option<ArrayRef>>) -> Result<Vec<Value>> {
    items
        .map(|item| match item {
            Some(child) => array_to_values(child.as_ref()).map(Value::List),
            None => Ok(Value::Null),
        })
        .collect()
}

/// Render every row of `array` with Arrow's display formatter. Nulls stay null.
pub fn stringify_array(array: &dyn Array) -> Result<ArrayRef> {
    let options = FormatOptions::default();
    let formatter = ArrayFormatter::try_new(array, &options)?;
    let text: StringArray = (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                None
            } else {
                Some(formatter.value(i).to_string())
            }
        })
        .collect();
    Ok(Arc::new(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::materialize_column;
    use chrono::TimeZone;
    use roost_common::EnumTag;

    #[test]
    fn test_roundtrip_through_materializer() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let columns = [
            vec![Value::from(true), Value::Null],
            vec![Value::from(-3), Value::from(4)],
            vec![Value::from(2.5), Value::Null],
            vec![Value::from(ts)],
            vec![Value::from("a"), Value::from("b")],
        ];
        for values in columns {
            let array = materialize_column(&values);
            assert_eq!(array_to_values(array.as_ref()).unwrap(), values);
        }
    }

    #[test]
    fn test_dictionary_decodes_to_strings() {
        let array = materialize_column(&[Value::from(EnumTag::new("M", "x")), Value::Null]);
        assert_eq!(
            array_to_values(array.as_ref()).unwrap(),
            vec![Value::from("M.x"), Value::Null]
        );
    }

    #[test]
    fn test_lists_decode_recursively() {
        let values = vec![
            Value::from(vec![Value::from(1), Value::from(2)]),
            Value::Null,
        ];
        let array = materialize_column(&values);
        assert_eq!(array_to_values(array.as_ref()).unwrap(), values);
    }

    #[test]
    fn test_stringify_keeps_nulls() {
        let array = materialize_column(&[Value::from(1), Value::Null]);
        let text = stringify_array(array.as_ref()).unwrap();
        let text = text.as_string::<i32>();
        assert_eq!(text.value(0), "1");
        assert!(text.is_null(1));
    }
}
