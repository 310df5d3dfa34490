//! Inner equi-join

use super::Table;
use crate::error::{Error, Result};
use crate::types::JoinKeyMode;
use arrow::array::{Array, ArrayRef, AsArray, StringArray, UInt32Array};
use arrow::buffer::NullBuffer;
use arrow::compute::kernels::concat_elements::concat_elements_utf8_many;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::row::{Row, RowConverter, SortField};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

impl Table {
    /// Inner join `self` with `right` where `left_on` equals `right_on`
    ///
    /// Output columns are all left columns followed by all right columns, in
    /// left row order. A row with a null in any key column never matches.
    /// Non-string key columns are compared on their string form.
    pub fn inner_join(
        &self,
        right: &Table,
        left_on: &[&str],
        right_on: &[&str],
        mode: JoinKeyMode,
    ) -> Result<Table> {
        if left_on.is_empty() || left_on.len() != right_on.len() {
            return Err(Error::transform(format!(
                "join needs the same non-zero number of keys on both sides, got {} and {}",
                left_on.len(),
                right_on.len()
            )));
        }

        let output_schema = joined_schema(&self.schema(), &right.schema())?;

        let left_keys = JoinKeys::new(self, left_on, mode)?;
        let right_keys = JoinKeys::new(right, right_on, mode)?;

        let fields = vec![SortField::new(DataType::Utf8); left_keys.columns.len()];
        let converter = RowConverter::new(fields)?;
        let left_rows = converter.convert_columns(&left_keys.columns)?;
        let right_rows = converter.convert_columns(&right_keys.columns)?;

        let mut build: HashMap<Row<'_>, Vec<u32>> = HashMap::new();
        for idx in (0..right_rows.num_rows()).filter(|&i| right_keys.is_valid(i)) {
            build.entry(right_rows.row(idx)).or_default().push(idx as u32);
        }

        let mut left_idx: Vec<u32> = Vec::new();
        let mut right_idx: Vec<u32> = Vec::new();
        for idx in (0..left_rows.num_rows()).filter(|&i| left_keys.is_valid(i)) {
            if let Some(matches) = build.get(&left_rows.row(idx)) {
                for r in matches {
                    left_idx.push(idx as u32);
                    right_idx.push(*r);
                }
            }
        }

        tracing::debug!(
            "Join matched {} rows ({} left, {} right)",
            left_idx.len(),
            self.num_rows(),
            right.num_rows()
        );

        let left = self.take(&UInt32Array::from(left_idx))?;
        let right = right.take(&UInt32Array::from(right_idx))?;

        let mut columns: Vec<ArrayRef> = left.batch().columns().to_vec();
        columns.extend(right.batch().columns().iter().cloned());

        let options = RecordBatchOptions::new().with_row_count(Some(left.num_rows()));
        let batch = RecordBatch::try_new_with_options(output_schema, columns, &options)?;
        Ok(Table::new(batch))
    }
}

/// Left fields followed by right fields; a shared name is ambiguous
fn joined_schema(left: &Schema, right: &Schema) -> Result<Arc<Schema>> {
    let left_names: HashSet<&str> = left.fields().iter().map(|f| f.name().as_str()).collect();

    let mut fields: Vec<Field> = left.fields().iter().map(|f| f.as_ref().clone()).collect();
    for field in right.fields() {
        if left_names.contains(field.name().as_str()) {
            return Err(Error::transform(format!(
                "ambiguous column '{}' on both sides of join",
                field.name()
            )));
        }
        fields.push(field.as_ref().clone());
    }
    Ok(Arc::new(Schema::new(fields)))
}

/// Key columns of one join side, as Utf8
struct JoinKeys {
    columns: Vec<ArrayRef>,
    nulls: Option<NullBuffer>,
}

impl JoinKeys {
    /// Composite keys keep one column per key; concatenated keys fold them
    /// into a single string column
    fn new(table: &Table, names: &[&str], mode: JoinKeyMode) -> Result<Self> {
        let columns = names
            .iter()
            .map(|name| -> Result<ArrayRef> {
                let array = table.column(name)?;
                if array.data_type() == &DataType::Utf8 {
                    Ok(Arc::clone(array))
                } else {
                    Ok(arrow::compute::cast(array, &DataType::Utf8)?)
                }
            })
            .collect::<Result<Vec<ArrayRef>>>()?;

        let nulls = columns.iter().fold(None, |acc: Option<NullBuffer>, column| {
            NullBuffer::union(acc.as_ref(), column.logical_nulls().as_ref())
        });

        let columns = match mode {
            JoinKeyMode::Composite => columns,
            JoinKeyMode::Concatenated => {
                let strings: Vec<&StringArray> =
                    columns.iter().map(|c| c.as_string::<i32>()).collect();
                vec![Arc::new(concat_elements_utf8_many(&strings)?) as ArrayRef]
            }
        };

        Ok(Self { columns, nulls })
    }

    /// A row with a null in any key column never matches
    fn is_valid(&self, row: usize) -> bool {
        self.nulls.as_ref().map_or(true, |nulls| nulls.is_valid(row))
    }
}
