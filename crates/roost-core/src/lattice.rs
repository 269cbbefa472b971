//! Type promotion lattice.
//!
//! Every column type has a fixed set of types it may be widened to (itself
//! included, string always included). The common type of a set of observed
//! types is the narrowest member, by a global precedence order, of the
//! intersection of all their target sets.

use std::collections::HashSet;

use arrow::datatypes::{Schema, SchemaRef};
use indexmap::IndexMap;

use crate::error::{Result, StoreError};
use crate::types::{ColumnType, TimestampUnit};

const SIGNED: [ColumnType; 4] = [
    ColumnType::Int8,
    ColumnType::Int16,
    ColumnType::Int32,
    ColumnType::Int64,
];

const UNSIGNED: [ColumnType; 4] = [
    ColumnType::UInt8,
    ColumnType::UInt16,
    ColumnType::UInt32,
    ColumnType::UInt64,
];

const FLOATS: [ColumnType; 3] = [
    ColumnType::Float16,
    ColumnType::Float32,
    ColumnType::Float64,
];

/// The set of types `ty` may be promoted to, including itself.
pub fn promotion_targets(ty: &ColumnType) -> HashSet<ColumnType> {
    use ColumnType::*;

    let mut targets: HashSet<ColumnType> = match ty {
        Bool => std::iter::once(Bool)
            .chain(SIGNED)
            .chain(UNSIGNED)
            .chain(FLOATS)
            .collect(),
        Int8 => [Int8, Int16, Int32, Int64, Float16, Float32, Float64].into(),
        Int16 => [Int16, Int32, Int64, Float32, Float64].into(),
        Int32 => [Int32, Int64, Float64].into(),
        Int64 => [Int64, Float64].into(),
        UInt8 => [
            UInt8, UInt16, UInt32, UInt64, Int16, Int32, Int64, Float16, Float32, Float64,
        ]
        .into(),
        UInt16 => [UInt16, UInt32, UInt64, Int32, Int64, Float32, Float64].into(),
        UInt32 => [UInt32, UInt64, Int64, Float64].into(),
        UInt64 => [UInt64, Float64].into(),
        Float16 => FLOATS.into(),
        Float32 => [Float32, Float64].into(),
        Float64 => [Float64].into(),
        Timestamp(unit) => TimestampUnit::ALL
            .into_iter()
            .filter(|u| u >= unit)
            .map(Timestamp)
            .collect(),
        Utf8 => HashSet::new(),
        Dictionary => [Dictionary].into(),
        List(item) => promotion_targets(item)
            .into_iter()
            .map(ColumnType::list)
            .collect(),
    };
    targets.insert(Utf8);
    targets
}

/// Global precedence key: lower sorts first, string always last.
fn precedence(ty: &ColumnType) -> Vec<u8> {
    use ColumnType::*;

    let rank = match ty {
        Bool => 0,
        Int8 => 1,
        UInt8 => 2,
        Int16 => 3,
        UInt16 => 4,
        Int32 => 5,
        UInt32 => 6,
        Int64 => 7,
        UInt64 => 8,
        Float16 => 9,
        Float32 => 10,
        Float64 => 11,
        Timestamp(TimestampUnit::Second) => 12,
        Timestamp(TimestampUnit::Millisecond) => 13,
        Timestamp(TimestampUnit::Microsecond) => 14,
        Timestamp(TimestampUnit::Nanosecond) => 15,
        Dictionary => 16,
        List(item) => {
            let mut key = vec![17];
            key.extend(precedence(item));
            return key;
        }
        Utf8 => u8::MAX,
    };
    vec![rank]
}

fn describe(types: &[ColumnType]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compute the narrowest type every observed type can be promoted to.
///
/// Duplicates are ignored; an empty input is a `TypeMismatch`.
pub fn promote(types: &[ColumnType]) -> Result<ColumnType> {
    let mut observed = types.iter();
    let first = observed.next().ok_or_else(|| StoreError::TypeMismatch {
        field: None,
        types: String::new(),
    })?;

    let mut candidates = promotion_targets(first);
    for ty in observed {
        let targets = promotion_targets(ty);
        candidates.retain(|c| targets.contains(c));
    }

    candidates
        .into_iter()
        .min_by_key(precedence)
        .ok_or_else(|| StoreError::TypeMismatch {
            field: None,
            types: describe(types),
        })
}

/// Union of all fields across `schemas`, in first-seen order, each promoted
/// over the types of the schemas that declare it.
pub fn promote_schema(schemas: &[SchemaRef]) -> Result<Schema> {
    promote_schema_with(schemas, promote)
}

/// [`promote_schema`] with a caller-supplied promotion function.
pub fn promote_schema_with<F>(schemas: &[SchemaRef], mut promote_fn: F) -> Result<Schema>
where
    F: FnMut(&[ColumnType]) -> Result<ColumnType>,
{
    let mut observed: IndexMap<&str, Vec<ColumnType>> = IndexMap::new();
    for schema in schemas {
        for field in schema.fields() {
            let ty = ColumnType::from_arrow(field.data_type())?;
            let types = observed.entry(field.name().as_str()).or_default();
            if !types.contains(&ty) {
                types.push(ty);
            }
        }
    }

    let fields = observed
        .into_iter()
        .map(|(name, types)| {
            promote_fn(&types)
                .map(|ty| ty.field(name))
                .map_err(|e| e.for_field(name))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Schema::new(fields))
}
