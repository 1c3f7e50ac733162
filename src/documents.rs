use anyhow::Result;
use arrow::{
    array::{Array, ArrayRef, AsArray, RecordBatch},
    datatypes::{
        DataType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, UInt8Type,
        UInt16Type, UInt32Type, UInt64Type,
    },
    util::display::{ArrayFormatter, FormatOptions},
};
use serde_json::{Map, Number, Value};

/// Renders every row of `batch` as one JSON object mapping field name to
/// value.
///
/// Booleans, integers, finite floats, and strings map to their native JSON
/// form; structs become objects and lists become arrays, recursively. Every
/// other column type (dates, timestamps, decimals, binary, dictionaries, ...)
/// is rendered as its display string, so the conversion is total over any
/// column type the reader can produce. Non-finite floats also become strings,
/// since JSON has no NaN or infinity.
pub fn batch_to_documents(batch: &RecordBatch) -> Result<Vec<Value>> {
    let schema = batch.schema();
    let mut documents = Vec::with_capacity(batch.num_rows());

    for row in 0..batch.num_rows() {
        let mut object = Map::with_capacity(batch.num_columns());
        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            object.insert(field.name().clone(), cell_to_value(column.as_ref(), row)?);
        }
        documents.push(Value::Object(object));
    }

    Ok(documents)
}

fn cell_to_value(array: &dyn Array, row: usize) -> Result<Value> {
    // NullArray carries no null buffer, so check its type explicitly.
    if array.data_type() == &DataType::Null || array.is_null(row) {
        return Ok(Value::Null);
    }

    let value = match array.data_type() {
        DataType::Boolean => Value::Bool(array.as_boolean().value(row)),
        DataType::Int8 => Value::from(array.as_primitive::<Int8Type>().value(row)),
        DataType::Int16 => Value::from(array.as_primitive::<Int16Type>().value(row)),
        DataType::Int32 => Value::from(array.as_primitive::<Int32Type>().value(row)),
        DataType::Int64 => Value::from(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::from(array.as_primitive::<UInt8Type>().value(row)),
        DataType::UInt16 => Value::from(array.as_primitive::<UInt16Type>().value(row)),
        DataType::UInt32 => Value::from(array.as_primitive::<UInt32Type>().value(row)),
        DataType::UInt64 => Value::from(array.as_primitive::<UInt64Type>().value(row)),
        DataType::Float32 => {
            float_value(f64::from(array.as_primitive::<Float32Type>().value(row)))
        }
        DataType::Float64 => float_value(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(row).to_string()),
        DataType::Utf8View => Value::String(array.as_string_view().value(row).to_string()),
        DataType::Struct(fields) => {
            let children = array.as_struct();
            let mut object = Map::with_capacity(fields.len());
            for (field, column) in fields.iter().zip(children.columns()) {
                object.insert(field.name().clone(), cell_to_value(column.as_ref(), row)?);
            }
            Value::Object(object)
        }
        DataType::List(_) => list_to_value(&array.as_list::<i32>().value(row))?,
        DataType::LargeList(_) => list_to_value(&array.as_list::<i64>().value(row))?,
        DataType::FixedSizeList(_, _) => list_to_value(&array.as_fixed_size_list().value(row))?,
        _ => display_value(array, row)?,
    };

    Ok(value)
}

fn list_to_value(values: &ArrayRef) -> Result<Value> {
    let mut items = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        items.push(cell_to_value(values.as_ref(), i)?);
    }
    Ok(Value::Array(items))
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or_else(|| Value::String(value.to_string()), Value::Number)
}

fn display_value(array: &dyn Array, row: usize) -> Result<Value> {
    let options = FormatOptions::default();
    let formatter = ArrayFormatter::try_new(array, &options)?;
    Ok(Value::String(formatter.value(row).try_to_string()?))
}
