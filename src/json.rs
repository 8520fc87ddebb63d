//! JSON element-tree import/export: the format's only documented way in
//! and out of a record. Consumes/produces `serde_json::Value` the way a
//! tokenizer/serializer would hand off to a document engine (§1 treats the
//! tokenizer itself as an external collaborator).

use serde_json::{Map, Number, Value};

use crate::error::CarbonError;
use crate::insert::InsertSession;
use crate::iter::{ArrayIter, ObjectIter};
use crate::key::KeyHeader;
use crate::memory::MemFile;
use crate::options::CarbonOptions;
use crate::types::ColumnScalar;

/// The homogeneity class `classify_array` assigns to a JSON array, driving
/// whether the importer writes a packed column or a variable array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayClass {
    Empty,
    VariableOrNested,
    FixedU8,
    FixedU16,
    FixedU32,
    FixedU64,
    FixedI8,
    FixedI16,
    FixedI32,
    FixedI64,
    FixedFloat,
    FixedBoolean,
    FixedNull,
}

impl ArrayClass {
    fn column_scalar(self) -> Option<ColumnScalar> {
        match self {
            ArrayClass::FixedU8 => Some(ColumnScalar::U8),
            ArrayClass::FixedU16 => Some(ColumnScalar::U16),
            ArrayClass::FixedU32 => Some(ColumnScalar::U32),
            ArrayClass::FixedU64 => Some(ColumnScalar::U64),
            ArrayClass::FixedI8 => Some(ColumnScalar::I8),
            ArrayClass::FixedI16 => Some(ColumnScalar::I16),
            ArrayClass::FixedI32 => Some(ColumnScalar::I32),
            ArrayClass::FixedI64 => Some(ColumnScalar::I64),
            ArrayClass::FixedFloat => Some(ColumnScalar::Float),
            ArrayClass::FixedBoolean => Some(ColumnScalar::Bool),
            _ => None,
        }
    }
}

/// Classify a JSON array's elements into the narrowest homogeneous column
/// type they all fit, or `VariableOrNested` if they don't agree.
#[must_use]
pub fn classify_array(values: &[Value]) -> ArrayClass {
    if values.is_empty() {
        return ArrayClass::Empty;
    }
    if values.iter().all(Value::is_null) {
        return ArrayClass::FixedNull;
    }
    if values.iter().all(Value::is_boolean) {
        return ArrayClass::FixedBoolean;
    }
    if values.iter().any(|v| v.is_object() || v.is_array() || v.is_string()) {
        return ArrayClass::VariableOrNested;
    }
    if !values.iter().all(Value::is_number) {
        return ArrayClass::VariableOrNested;
    }

    // A fixed numeric column only forms when every element is the *same*
    // JSON numeric shape: all float literals, or all integer literals.
    // Mixing an integer and a float literal (spec.md §4.5 example 3:
    // `[1,-2,3.5]`) stays a variable array rather than silently widening
    // the integers to float.
    let all_float = values.iter().all(|v| v.as_number().unwrap().is_f64());
    if all_float {
        return ArrayClass::FixedFloat;
    }
    let all_int = values.iter().all(|v| !v.as_number().unwrap().is_f64());
    if !all_int {
        return ArrayClass::VariableOrNested;
    }

    let mut widest_unsigned: Option<ArrayClass> = Some(ArrayClass::FixedU8);
    let mut widest_signed: Option<ArrayClass> = Some(ArrayClass::FixedI8);

    for v in values {
        let n = v.as_number().unwrap();
        if let Some(u) = n.as_u64() {
            widest_unsigned = widen_unsigned(widest_unsigned, u);
        } else if let Some(s) = n.as_i64() {
            widest_signed = widen_signed(widest_signed, s);
            widest_unsigned = None;
        }
    }

    if widest_unsigned.is_some() {
        widest_unsigned.unwrap()
    } else {
        widest_signed.unwrap_or(ArrayClass::FixedI64)
    }
}

fn widen_unsigned(current: Option<ArrayClass>, value: u64) -> Option<ArrayClass> {
    let needed = if u8::try_from(value).is_ok() {
        ArrayClass::FixedU8
    } else if u16::try_from(value).is_ok() {
        ArrayClass::FixedU16
    } else if u32::try_from(value).is_ok() {
        ArrayClass::FixedU32
    } else {
        ArrayClass::FixedU64
    };
    Some(wider_of(current?, needed))
}

fn widen_signed(current: Option<ArrayClass>, value: i64) -> Option<ArrayClass> {
    let needed = if i8::try_from(value).is_ok() {
        ArrayClass::FixedI8
    } else if i16::try_from(value).is_ok() {
        ArrayClass::FixedI16
    } else if i32::try_from(value).is_ok() {
        ArrayClass::FixedI32
    } else {
        ArrayClass::FixedI64
    };
    Some(wider_of(current.unwrap_or(ArrayClass::FixedI8), needed))
}

fn rank(c: ArrayClass) -> u8 {
    match c {
        ArrayClass::FixedU8 | ArrayClass::FixedI8 => 0,
        ArrayClass::FixedU16 | ArrayClass::FixedI16 => 1,
        ArrayClass::FixedU32 | ArrayClass::FixedI32 => 2,
        ArrayClass::FixedU64 | ArrayClass::FixedI64 => 3,
        _ => 4,
    }
}

fn wider_of(a: ArrayClass, b: ArrayClass) -> ArrayClass {
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

/// Build a fresh record from a parsed JSON value.
///
/// The root element becomes the root array's contents: a top-level object
/// is inserted as a single object element inside the root array, matching
/// `spec.md` §4.5 rule 1.
pub fn from_json(
    value: &Value,
    key_header: &KeyHeader,
    options: CarbonOptions,
) -> Result<MemFile, CarbonError> {
    let mut session = InsertSession::new(
        key_header,
        crate::types::Derivation::UnsortedMulti,
        options,
    )?;
    insert_value(&mut session, value, &options)?;
    session.finish()
}

fn insert_value(
    session: &mut InsertSession,
    value: &Value,
    options: &CarbonOptions,
) -> Result<(), CarbonError> {
    match value {
        Value::Null => session.insert_null(),
        Value::Bool(b) => session.insert_bool(*b),
        Value::Number(n) => insert_number(session, n),
        Value::String(s) => session.insert_string(s),
        Value::Array(items) => insert_array(session, items, options),
        Value::Object(map) => insert_object(session, map, options),
    }
}

fn insert_number(session: &mut InsertSession, n: &Number) -> Result<(), CarbonError> {
    if let Some(u) = n.as_u64() {
        session.insert_unsigned(u)
    } else if let Some(s) = n.as_i64() {
        session.insert_signed(s)
    } else if let Some(f) = n.as_f64() {
        session.insert_float(f as f32)
    } else {
        Err(CarbonError::UnsupportedType(format!("json number {n}")))
    }
}

fn insert_array(
    session: &mut InsertSession,
    items: &[Value],
    options: &CarbonOptions,
) -> Result<(), CarbonError> {
    let hint = options.hint_for(items.len());
    match classify_array(items) {
        ArrayClass::Empty => {
            session.begin_array(Some(0))?;
            session.end()
        }
        ArrayClass::VariableOrNested => {
            session.begin_array(Some(hint))?;
            for item in items {
                insert_value(session, item, options)?;
            }
            session.end()
        }
        class => {
            let scalar = class.column_scalar().expect("fixed class has a scalar");
            session.begin_column(scalar, items.len())?;
            for item in items {
                insert_column_value(session, item)?;
            }
            session.end()
        }
    }
}

fn insert_column_value(session: &mut InsertSession, item: &Value) -> Result<(), CarbonError> {
    match item {
        Value::Null => session.insert_null(),
        Value::Bool(b) => session.insert_bool(*b),
        Value::Number(n) => insert_number(session, n),
        other => Err(CarbonError::UnsupportedType(format!(
            "non-scalar value {other:?} inside a homogeneous column"
        ))),
    }
}

fn insert_object(
    session: &mut InsertSession,
    map: &Map<String, Value>,
    options: &CarbonOptions,
) -> Result<(), CarbonError> {
    let hint = options.hint_for(map.len());
    session.begin_object(Some(hint))?;
    for (key, value) in map {
        insert_object_member(session, key, value, options)?;
    }
    session.end()
}

fn insert_object_member(
    session: &mut InsertSession,
    key: &str,
    value: &Value,
    options: &CarbonOptions,
) -> Result<(), CarbonError> {
    match value {
        Value::Null => session.insert_prop_null(key),
        Value::Bool(b) => session.insert_prop_bool(key, *b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                session.insert_prop_unsigned(key, u)
            } else if let Some(s) = n.as_i64() {
                session.insert_prop_signed(key, s)
            } else if let Some(f) = n.as_f64() {
                session.insert_prop_float(key, f as f32)
            } else {
                Err(CarbonError::UnsupportedType(format!("json number {n}")))
            }
        }
        Value::String(s) => session.insert_prop_string(key, s),
        Value::Array(items) => {
            let hint = options.hint_for(items.len());
            match classify_array(items) {
                ArrayClass::Empty => {
                    session.begin_prop_array(key, Some(0))?;
                    session.end()
                }
                ArrayClass::VariableOrNested => {
                    session.begin_prop_array(key, Some(hint))?;
                    for item in items {
                        insert_value(session, item, options)?;
                    }
                    session.end()
                }
                class => {
                    let scalar = class.column_scalar().expect("fixed class has a scalar");
                    session.begin_prop_column(key, scalar, items.len())?;
                    for item in items {
                        insert_column_value(session, item)?;
                    }
                    session.end()
                }
            }
        }
        Value::Object(nested) => {
            let hint = options.hint_for(nested.len());
            session.begin_prop_object(key, Some(hint))?;
            for (k, v) in nested {
                insert_object_member(session, k, v, options)?;
            }
            session.end()
        }
    }
}

/// Render a record's root array as a compact JSON value — the inverse of
/// `from_json`'s rule 1, which always inserts the original top-level value
/// (object, array, or scalar) as the root array's single element. A root
/// holding anything other than exactly one element only arises from
/// records built by hand through the insertion API rather than
/// `from_json`; such a root renders as a JSON array of its elements.
pub fn to_json_compact(mf: &MemFile) -> Result<Value, CarbonError> {
    let mut header_cursor = mf.clone();
    header_cursor.seek(0);
    let key_header = KeyHeader::read(&mut header_cursor)?;
    let mut it = ArrayIter::at(mf, key_header.encoded_len())?;
    let mut elements = Vec::new();
    while let Some(field) = it.next()? {
        elements.push(field_to_json(mf, &field)?);
    }
    if elements.len() == 1 {
        Ok(elements.into_iter().next().unwrap())
    } else {
        Ok(Value::Array(elements))
    }
}

fn field_to_json(mf: &MemFile, field: &crate::field::FieldAccess) -> Result<Value, CarbonError> {
    use crate::types::FieldKind;
    Ok(match field.kind {
        FieldKind::Null => Value::Null,
        FieldKind::True => Value::Bool(true),
        FieldKind::False => Value::Bool(false),
        FieldKind::U8 => Value::Number(field.as_u8(mf)?.into()),
        FieldKind::U16 => Value::Number(field.as_u16(mf)?.into()),
        FieldKind::U32 => Value::Number(field.as_u32(mf)?.into()),
        FieldKind::U64 => Value::Number(field.as_u64(mf)?.into()),
        FieldKind::I8 => Value::Number(field.as_i8(mf)?.into()),
        FieldKind::I16 => Value::Number(field.as_i16(mf)?.into()),
        FieldKind::I32 => Value::Number(field.as_i32(mf)?.into()),
        FieldKind::I64 => Value::Number(field.as_i64(mf)?.into()),
        FieldKind::Float => Number::from_f64(f64::from(field.as_f32(mf)?))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FieldKind::String => Value::String(field.as_str(mf)?.to_string()),
        FieldKind::Binary | FieldKind::BinaryCustom => {
            return Err(CarbonError::UnsupportedType(
                "binary fields have no JSON representation".into(),
            ))
        }
        FieldKind::ArrayBegin => {
            let mut inner = field.array_value(mf)?;
            let mut items = Vec::new();
            while let Some(element) = inner.next()? {
                items.push(field_to_json(mf, &element)?);
            }
            Value::Array(items)
        }
        FieldKind::ObjectBegin => object_to_json(mf, field.object_value(mf)?)?,
        FieldKind::Column(_) => column_to_json(mf, field.column_value(mf)?)?,
        FieldKind::ArrayEnd | FieldKind::ObjectEnd => {
            return Err(CarbonError::InternalError(
                "end markers are never exposed as a field".into(),
            ))
        }
    })
}

fn object_to_json(mf: &MemFile, mut it: ObjectIter<'_>) -> Result<Value, CarbonError> {
    let mut map = Map::new();
    while let Some(entry) = it.next()? {
        map.insert(entry.key.to_string(), field_to_json(mf, &entry.value)?);
    }
    Ok(Value::Object(map))
}

fn column_to_json(
    mf: &MemFile,
    mut it: crate::iter::ColumnIter<'_>,
) -> Result<Value, CarbonError> {
    let _ = mf;
    let mut items = Vec::with_capacity(it.len());
    while let Some(cell) = it.next()? {
        items.push(column_cell_to_json(&cell));
    }
    Ok(Value::Array(items))
}

fn column_cell_to_json(cell: &crate::iter::column::ColumnValue<'_>) -> Value {
    if cell.is_null() {
        return Value::Null;
    }
    match cell.scalar() {
        ColumnScalar::U8 => cell.as_u8().into(),
        ColumnScalar::U16 => cell.as_u16().into(),
        ColumnScalar::U32 => cell.as_u32().into(),
        ColumnScalar::U64 => cell.as_u64().into(),
        ColumnScalar::I8 => cell.as_i8().into(),
        ColumnScalar::I16 => cell.as_i16().into(),
        ColumnScalar::I32 => cell.as_i32().into(),
        ColumnScalar::I64 => cell.as_i64().into(),
        ColumnScalar::Float => Number::from_f64(f64::from(cell.as_f32().unwrap_or_default()))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnScalar::Bool => cell.as_bool().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(value: Value) -> Value {
        let mf = from_json(&value, &KeyHeader::none(), CarbonOptions::default()).unwrap();
        to_json_compact(&mf).unwrap()
    }

    #[test]
    fn object_with_one_string_field_round_trips() {
        let input = json!({"msg": "Hello"});
        assert_eq!(round_trip(input.clone()), input);
    }

    #[test]
    fn small_unsigned_array_becomes_a_column_and_round_trips() {
        let input = json!([1, 2, 3]);
        assert_eq!(classify_array(input.as_array().unwrap()), ArrayClass::FixedU8);
        assert_eq!(round_trip(input.clone()), input);
    }

    #[test]
    fn mixed_number_array_is_variable_and_round_trips() {
        let input = json!([1, -2, 3.5]);
        assert_eq!(
            classify_array(input.as_array().unwrap()),
            ArrayClass::VariableOrNested
        );
        assert_eq!(round_trip(input.clone()), input);
    }

    #[test]
    fn nested_object_round_trips() {
        let input = json!({"a": [1, 2, 3], "b": {"c": true, "d": null}});
        assert_eq!(round_trip(input.clone()), input);
    }
}
