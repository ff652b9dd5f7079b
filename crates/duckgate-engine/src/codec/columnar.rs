//! Arrow record batches built from, and read back into, result sets.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Float64Array, Int64Array, StringArray,
};
use arrow::datatypes::{
    DataType, Field, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, Schema,
    UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::display::array_value_to_string;

use crate::error::{EngineError, Result};
use crate::value::{ResultSet, Value};

/// Arrow type for a column, from the kinds of value it holds.
///
/// Integers widen to float when mixed with floats; any other mix, and a
/// column of only nulls, becomes text.
pub(super) fn infer_type<'a>(values: impl Iterator<Item = &'a Value>) -> DataType {
    let mut inferred: Option<DataType> = None;
    for value in values {
        let kind = match value {
            Value::Null => continue,
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Int64,
            Value::Float(_) => DataType::Float64,
            Value::Text(_) => DataType::Utf8,
            Value::Blob(_) => DataType::Binary,
        };
        inferred = Some(match (inferred, kind) {
            (None, kind) => kind,
            (Some(current), kind) if current == kind => current,
            (Some(DataType::Int64), DataType::Float64) | (Some(DataType::Float64), DataType::Int64) => {
                DataType::Float64
            }
            _ => return DataType::Utf8,
        });
    }
    inferred.unwrap_or(DataType::Utf8)
}

/// A batch with one typed array per column.
pub(super) fn typed_batch(result: &ResultSet) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(result.columns().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(result.columns().len());

    for (idx, name) in result.columns().iter().enumerate() {
        let data_type = infer_type(result.column_values(idx));
        let values = result.column_values(idx);
        let array: ArrayRef = match data_type {
            DataType::Boolean => Arc::new(
                values
                    .map(|v| match v {
                        Value::Boolean(b) => Some(*b),
                        _ => None,
                    })
                    .collect::<BooleanArray>(),
            ),
            DataType::Int64 => Arc::new(
                values
                    .map(|v| match v {
                        Value::Integer(i) => Some(*i),
                        _ => None,
                    })
                    .collect::<Int64Array>(),
            ),
            DataType::Float64 => Arc::new(
                values
                    .map(|v| match v {
                        Value::Integer(i) => Some(*i as f64),
                        Value::Float(f) => Some(*f),
                        _ => None,
                    })
                    .collect::<Float64Array>(),
            ),
            DataType::Binary => Arc::new(
                values
                    .map(|v| match v {
                        Value::Blob(b) => Some(b.as_slice()),
                        _ => None,
                    })
                    .collect::<BinaryArray>(),
            ),
            _ => Arc::new(values.map(Value::render_text).collect::<StringArray>()),
        };
        fields.push(Field::new(name, data_type, true));
        arrays.push(array);
    }

    batch(fields, arrays, result.len())
}

/// A batch where every column is text, rendered the way CSV fields carry values.
pub(super) fn text_batch(result: &ResultSet) -> Result<RecordBatch> {
    let fields: Vec<Field> = result
        .columns()
        .iter()
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect();
    let arrays: Vec<ArrayRef> = (0..result.columns().len())
        .map(|idx| {
            Arc::new(
                result
                    .column_values(idx)
                    .map(Value::render_text)
                    .collect::<StringArray>(),
            ) as ArrayRef
        })
        .collect();
    batch(fields, arrays, result.len())
}

fn batch(fields: Vec<Field>, arrays: Vec<ArrayRef>, rows: usize) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(fields));
    if arrays.is_empty() {
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        return Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?);
    }
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Append every row of `batches` to a result set, converting Arrow values.
pub(super) fn collect_batches<I>(columns: Vec<String>, batches: I) -> Result<ResultSet>
where
    I: IntoIterator<Item = std::result::Result<RecordBatch, arrow::error::ArrowError>>,
{
    let mut result = ResultSet::new(columns, Vec::new())?;
    for batch in batches {
        let batch = batch?;
        for row in 0..batch.num_rows() {
            let values = batch
                .columns()
                .iter()
                .map(|array| value_at(array.as_ref(), row))
                .collect::<Result<Vec<_>>>()?;
            result.push_row(values)?;
        }
    }
    Ok(result)
}

fn value_at(array: &dyn Array, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    let value = match array.data_type() {
        DataType::Boolean => Value::Boolean(array.as_boolean().value(row)),
        DataType::Int8 => Value::Integer(array.as_primitive::<Int8Type>().value(row).into()),
        DataType::Int16 => Value::Integer(array.as_primitive::<Int16Type>().value(row).into()),
        DataType::Int32 => Value::Integer(array.as_primitive::<Int32Type>().value(row).into()),
        DataType::Int64 => Value::Integer(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::Integer(array.as_primitive::<UInt8Type>().value(row).into()),
        DataType::UInt16 => Value::Integer(array.as_primitive::<UInt16Type>().value(row).into()),
        DataType::UInt32 => Value::Integer(array.as_primitive::<UInt32Type>().value(row).into()),
        DataType::UInt64 => {
            let v = array.as_primitive::<UInt64Type>().value(row);
            i64::try_from(v)
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::Text(v.to_string()))
        }
        DataType::Float32 => Value::Float(array.as_primitive::<Float32Type>().value(row).into()),
        DataType::Float64 => Value::Float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Value::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::Text(array.as_string::<i64>().value(row).to_string()),
        DataType::Binary => Value::Blob(array.as_binary::<i32>().value(row).to_vec()),
        DataType::LargeBinary => Value::Blob(array.as_binary::<i64>().value(row).to_vec()),
        _ => Value::Text(
            array_value_to_string(array, row)
                .map_err(|e| EngineError::encoding(e.to_string()))?,
        ),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_inference() {
        let ints = [Value::Integer(1), Value::Null, Value::Integer(2)];
        assert_eq!(infer_type(ints.iter()), DataType::Int64);

        let widened = [Value::Integer(1), Value::Float(0.5)];
        assert_eq!(infer_type(widened.iter()), DataType::Float64);

        let mixed = [Value::Integer(1), Value::Text("x".into())];
        assert_eq!(infer_type(mixed.iter()), DataType::Utf8);

        let nulls = [Value::Null, Value::Null];
        assert_eq!(infer_type(nulls.iter()), DataType::Utf8);
    }

    #[test]
    fn test_typed_batch_round_trip() {
        let rs = ResultSet::new(
            vec!["n".into(), "s".into()],
            vec![
                vec![Value::Integer(1), Value::Text("a".into())],
                vec![Value::Null, Value::Text("b".into())],
            ],
        )
        .unwrap();
        let batch = typed_batch(&rs).unwrap();
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Int64);
        let back = collect_batches(rs.columns().to_vec(), vec![Ok(batch)]).unwrap();
        assert_eq!(back, rs);
    }

    #[test]
    fn test_text_batch_renders_values() {
        let rs = ResultSet::new(
            vec!["f".into()],
            vec![vec![Value::Float(2.0)], vec![Value::Null]],
        )
        .unwrap();
        let batch = text_batch(&rs).unwrap();
        let col = batch.column(0).as_string::<i32>();
        assert_eq!(col.value(0), "2.0");
        assert!(col.is_null(1));
    }
}
