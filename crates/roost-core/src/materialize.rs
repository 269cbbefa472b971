//! Table materializer.
//!
//! Converts accumulated heterogeneous columns into a typed Arrow table.
//! Each column first tries native inference; when its values are mixed or of
//! a kind with no columnar representation it falls back to dictionary-encoded
//! strings (enum tags, nested tables) or plain rendered strings.

use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, Float64Array, Int64Array, ListArray,
    RecordBatch, RecordBatchOptions, StringArray, StringDictionaryBuilder,
    TimestampMicrosecondArray, UInt64Array,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::datatypes::{DataType, Field, Int32Type, Schema};
use roost_common::{Columns, Value, ValueKind, INDEX_COLUMN};
use tracing::trace;

use crate::error::Result;
use crate::types::{LIST_ITEM_FIELD, TIMESTAMP_TZ};

/// Column kinds that have a native Arrow representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeKind {
    Bool,
    Int,
    UInt,
    Float,
    Timestamp,
    Str,
    List,
}

impl NativeKind {
    fn of(value: &Value) -> Option<Self> {
        match value.kind() {
            ValueKind::Bool => Some(NativeKind::Bool),
            ValueKind::Int => Some(NativeKind::Int),
            ValueKind::UInt => Some(NativeKind::UInt),
            ValueKind::Float => Some(NativeKind::Float),
            ValueKind::Timestamp => Some(NativeKind::Timestamp),
            ValueKind::String => Some(NativeKind::Str),
            ValueKind::List => Some(NativeKind::List),
            _ => None,
        }
    }

    /// Combine two observed kinds; only numeric kinds mix.
    fn unify(self, other: Self) -> Option<Self> {
        use NativeKind::*;

        match (self, other) {
            (a, b) if a == b => Some(a),
            (Int, UInt) | (UInt, Int) => Some(Int),
            (Float, Int | UInt) | (Int | UInt, Float) => Some(Float),
            _ => None,
        }
    }
}

/// Materialize `columns` into a table; column order follows the mapping.
pub fn materialize(columns: &Columns) -> Result<RecordBatch> {
    materialize_rows(columns, columns.values().next().map_or(0, Vec::len))
}

/// [`materialize`] with an explicit row count, so a mapping with no columns
/// still yields `num_rows` rows.
pub(crate) fn materialize_rows(columns: &Columns, num_rows: usize) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());
    for (name, values) in columns {
        let array = materialize_column(values);
        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;
    Ok(batch)
}

/// Prepend the reserved `index` column, labelling rows `start..start + n`.
pub(crate) fn with_index(table: &RecordBatch, start: usize) -> Result<RecordBatch> {
    let num_rows = table.num_rows();
    let index: ArrayRef = Arc::new(Int64Array::from_iter_values(
        (start..start + num_rows).map(|i| i as i64),
    ));

    let mut fields = vec![Field::new(INDEX_COLUMN, DataType::Int64, true)];
    fields.extend(table.schema().fields().iter().map(|f| f.as_ref().clone()));
    let mut arrays = vec![index];
    arrays.extend(table.columns().iter().cloned());

    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;
    Ok(batch)
}

/// Materialize a single column of raw values.
pub fn materialize_column(values: &[Value]) -> ArrayRef {
    if let Some(array) = infer_native(values) {
        return array;
    }

    match values.iter().map(Value::kind).find(|k| *k != ValueKind::Null) {
        None => new_null_array(&DataType::Utf8, values.len()),
        Some(ValueKind::Enum | ValueKind::Table) => dictionary_encode(values),
        Some(first) => {
            trace!(first_kind = %first, rows = values.len(), "rendering column as text");
            stringify(values)
        }
    }
}

/// Build a native array when all non-null values share one representable kind.
fn infer_native(values: &[Value]) -> Option<ArrayRef> {
    let mut kinds = values.iter().filter(|v| !v.is_null()).map(NativeKind::of);
    let mut kind = kinds.next()??;
    for next in kinds {
        kind = kind.unify(next?)?;
    }

    let array: ArrayRef = match kind {
        NativeKind::Bool => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        NativeKind::Int => {
            let mut ints = Vec::with_capacity(values.len());
            for v in values {
                ints.push(match v {
                    Value::Int(i) => Some(*i),
                    Value::UInt(u) => Some(i64::try_from(*u).ok()?),
                    _ => None,
                });
            }
            Arc::new(Int64Array::from(ints))
        }
        NativeKind::UInt => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::UInt(u) => Some(*u),
                    _ => None,
                })
                .collect::<UInt64Array>(),
        ),
        NativeKind::Float => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::Float(f) => Some(*f),
                    Value::Int(i) => Some(*i as f64),
                    Value::UInt(u) => Some(*u as f64),
                    _ => None,
                })
                .collect::<Float64Array>(),
        ),
        NativeKind::Timestamp => Arc::new(
            TimestampMicrosecondArray::from(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Timestamp(ts) => Some(ts.timestamp_micros()),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )
            .with_timezone(TIMESTAMP_TZ),
        ),
        NativeKind::Str => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::String(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<StringArray>(),
        ),
        NativeKind::List => infer_list(values)?,
    };
    Some(array)
}

/// Build a list array whose item type is the native inference of all items.
fn infer_list(values: &[Value]) -> Option<ArrayRef> {
    let mut lengths = Vec::with_capacity(values.len());
    let mut validity = Vec::with_capacity(values.len());
    let mut items = Vec::new();
    for v in values {
        match v {
            Value::List(list) => {
                lengths.push(list.len());
                validity.push(true);
                items.extend(list.iter().cloned());
            }
            _ => {
                lengths.push(0);
                validity.push(false);
            }
        }
    }

    let child = if items.iter().all(Value::is_null) {
        new_null_array(&DataType::Utf8, items.len())
    } else {
        infer_native(&items)?
    };

    let nulls = if validity.iter().all(|v| *v) {
        None
    } else {
        Some(NullBuffer::from(validity))
    };
    let field = Arc::new(Field::new(LIST_ITEM_FIELD, child.data_type().clone(), true));
    let list = ListArray::try_new(field, OffsetBuffer::from_lengths(lengths), child, nulls).ok()?;
    Some(Arc::new(list))
}

/// Dictionary-encode the rendered values; codes follow first-seen order.
fn dictionary_encode(values: &[Value]) -> ArrayRef {
    let mut builder = StringDictionaryBuilder::<Int32Type>::new();
    for v in values {
        match v.to_text() {
            Some(text) => builder.append_value(text),
            None => builder.append_null(),
        }
    }
    Arc::new(builder.finish())
}

/// Render every value to text.
fn stringify(values: &[Value]) -> ArrayRef {
    Arc::new(values.iter().map(Value::to_text).collect::<StringArray>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{AsArray, DictionaryArray};
    use arrow::datatypes::{Float64Type, Int64Type, TimeUnit};
    use chrono::{TimeZone, Utc};
    use roost_common::{EnumTag, NestedTable};

    fn column(name: &str, values: Vec<Value>) -> Columns {
        let mut cols = Columns::new();
        cols.insert(name.to_string(), values);
        cols
    }

    #[test]
    fn test_homogeneous_columns() {
        assert_eq!(
            materialize_column(&[Value::from(true), Value::Null]).data_type(),
            &DataType::Boolean
        );
        assert_eq!(
            materialize_column(&[Value::from(1), Value::from(2)]).data_type(),
            &DataType::Int64
        );
        assert_eq!(
            materialize_column(&[Value::from(1u32)]).data_type(),
            &DataType::UInt64
        );
        assert_eq!(
            materialize_column(&[Value::from("a"), Value::Null]).data_type(),
            &DataType::Utf8
        );
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            materialize_column(&[Value::from(ts)]).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        );
    }

    #[test]
    fn test_int_float_mix_becomes_float() {
        let array = materialize_column(&[Value::from(1), Value::from(1.5), Value::from(2)]);
        let floats = array.as_primitive::<Float64Type>();
        assert_eq!(floats.values().to_vec(), vec![1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_signed_unsigned_mix() {
        let array = materialize_column(&[Value::from(-1), Value::from(5u64)]);
        assert_eq!(array.as_primitive::<Int64Type>().value(1), 5);

        // u64::MAX does not fit int64: falls back to text.
        let array = materialize_column(&[Value::from(-1), Value::from(u64::MAX)]);
        assert_eq!(array.data_type(), &DataType::Utf8);
        assert_eq!(array.as_string::<i32>().value(1), u64::MAX.to_string());
    }

    #[test]
    fn test_all_null_column_is_string() {
        let array = materialize_column(&[Value::Null, Value::Null]);
        assert_eq!(array.data_type(), &DataType::Utf8);
        assert_eq!(array.null_count(), 2);
    }

    #[test]
    fn test_enum_column_is_dictionary_encoded() {
        let a = Value::from(EnumTag::new("Mode", "a"));
        let b = Value::from(EnumTag::new("Mode", "b"));
        let array = materialize_column(&[b.clone(), a.clone(), Value::Null, b]);
        let dict: &DictionaryArray<Int32Type> = array.as_dictionary();
        let keys: Vec<Option<i32>> = dict.keys().iter().collect();
        assert_eq!(keys, vec![Some(0), Some(1), None, Some(0)]);
        let dict_values = dict.values().as_string::<i32>();
        assert_eq!(dict_values.value(0), "Mode.b");
        assert_eq!(dict_values.value(1), "Mode.a");
    }

    #[test]
    fn test_nested_table_is_dictionary_encoded() {
        let mut cols = Columns::new();
        cols.insert("x".into(), vec![Value::from(1)]);
        let array = materialize_column(&[Value::from(NestedTable::new(cols)), Value::from(3)]);
        assert!(matches!(array.data_type(), DataType::Dictionary(_, _)));
    }

    #[test]
    fn test_mixed_kinds_fall_back_to_text() {
        let array = materialize_column(&[Value::from(5), Value::from("hi"), Value::from(true)]);
        let strings = array.as_string::<i32>();
        assert_eq!(strings.value(0), "5");
        assert_eq!(strings.value(1), "hi");
        assert_eq!(strings.value(2), "true");
    }

    #[test]
    fn test_list_column() {
        let array = materialize_column(&[
            Value::from(vec![Value::from(1), Value::from(2)]),
            Value::Null,
            Value::from(vec![Value::from(2.5)]),
        ]);
        let list = array.as_list::<i32>();
        assert_eq!(list.len(), 3);
        assert!(list.is_null(1));
        assert_eq!(list.value(0).data_type(), &DataType::Float64);
        assert_eq!(list.value(2).as_primitive::<Float64Type>().value(0), 2.5);
    }

    #[test]
    fn test_list_of_mixed_items_falls_back_to_text() {
        let array = materialize_column(&[Value::from(vec![Value::from(1), Value::from("a")])]);
        assert_eq!(array.as_string::<i32>().value(0), r#"[1,"a"]"#);
    }

    #[test]
    fn test_empty_lists_have_string_items() {
        let array = materialize_column(&[Value::from(Vec::<Value>::new())]);
        assert_eq!(
            array.data_type(),
            &DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)))
        );
    }

    #[test]
    fn test_materialize_keeps_column_order() {
        let mut cols = column("z", vec![Value::from(1), Value::Null]);
        cols.insert("a".into(), vec![Value::Null, Value::from("s")]);
        let batch = materialize(&cols).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).name(), "z");
        assert_eq!(batch.schema().field(1).name(), "a");
    }

    #[test]
    fn test_explicit_row_count_without_columns() {
        let batch = materialize_rows(&Columns::new(), 3).unwrap();
        assert_eq!(batch.num_rows(), 3);
        let indexed = with_index(&batch, 10).unwrap();
        assert_eq!(indexed.schema().field(0).name(), "index");
        let index = indexed.column(0).as_primitive::<Int64Type>();
        assert_eq!(index.values().to_vec(), vec![10, 11, 12]);
    }

    #[test]
    fn test_materialize_empty() {
        let batch = materialize(&Columns::new()).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 0);
    }
}
