//! Table module
//!
//! A small in-process table engine over Arrow RecordBatches.
//!
//! # Overview
//!
//! This module provides the relational operations the transformation plan
//! is written against:
//! - Loading JSON records into a [`Table`] with schema inference
//! - Filtering, projecting and adding derived columns
//! - Inner equi-joins on one or more key columns
//! - Row-level de-duplication

mod join;
mod json;

pub use json::{arrow_to_json, infer_schema, json_to_arrow, parse_json_records, ParsedRecords};

use crate::error::{Error, Result};
use arrow::array::{Array, ArrayRef, BooleanArray, StringArray, UInt32Array};
use arrow::compute::kernels::cmp::eq;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::row::{RowConverter, SortField};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// An immutable in-memory table
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    /// Wrap a RecordBatch
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Build a table from JSON object records, inferring the schema
    pub fn from_json_records(records: &[Value]) -> Result<Self> {
        Ok(Self::new(json_to_arrow(records, None)?))
    }

    /// Underlying batch
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Table schema
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// Column names in schema order
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| Error::column_not_found(name))
    }

    /// Keep rows whose `column` equals `value`
    ///
    /// Non-string columns are compared on their string form. Nulls never match.
    pub fn filter_eq(&self, column: &str, value: &str) -> Result<Table> {
        let array = self.column(column)?;
        let array = if array.data_type() == &DataType::Utf8 {
            Arc::clone(array)
        } else {
            arrow::compute::cast(array, &DataType::Utf8)?
        };

        let mask = eq(&array, &StringArray::new_scalar(value))?;
        self.filter(&mask)
    }

    /// Keep rows where `mask` is true
    pub fn filter(&self, mask: &BooleanArray) -> Result<Table> {
        Ok(Self::new(arrow::compute::filter_record_batch(
            &self.batch,
            mask,
        )?))
    }

    /// Project the named columns, in the given order
    pub fn select(&self, columns: &[&str]) -> Result<Table> {
        let pairs: Vec<(&str, &str)> = columns.iter().map(|c| (*c, *c)).collect();
        self.select_as(&pairs)
    }

    /// Project `(source, alias)` pairs, renaming as it goes
    pub fn select_as(&self, columns: &[(&str, &str)]) -> Result<Table> {
        let schema = self.batch.schema();
        let mut fields = Vec::with_capacity(columns.len());
        let mut arrays = Vec::with_capacity(columns.len());

        for (source, alias) in columns {
            let (idx, field) = schema
                .column_with_name(source)
                .ok_or_else(|| Error::column_not_found(*source))?;
            fields.push(field.clone().with_name(*alias));
            arrays.push(Arc::clone(self.batch.column(idx)));
        }

        self.rebuild(fields, arrays)
    }

    /// Add a column, or replace it in place if the name already exists
    pub fn with_column(&self, name: &str, array: ArrayRef) -> Result<Table> {
        if array.len() != self.num_rows() {
            return Err(Error::transform(format!(
                "column '{name}' has {} rows, table has {}",
                array.len(),
                self.num_rows()
            )));
        }

        let schema = self.batch.schema();
        let field = Field::new(name, array.data_type().clone(), true);
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut arrays: Vec<ArrayRef> = self.batch.columns().to_vec();

        match schema.index_of(name) {
            Ok(idx) => {
                fields[idx] = field;
                arrays[idx] = array;
            }
            Err(_) => {
                fields.push(field);
                arrays.push(array);
            }
        }

        self.rebuild(fields, arrays)
    }

    /// Remove duplicate rows, keeping the first occurrence
    pub fn distinct(&self) -> Result<Table> {
        if self.batch.num_columns() == 0 || self.is_empty() {
            return Ok(self.clone());
        }

        let sort_fields = self
            .batch
            .schema()
            .fields()
            .iter()
            .map(|f| SortField::new(f.data_type().clone()))
            .collect();
        let converter = RowConverter::new(sort_fields)?;
        let rows = converter.convert_columns(self.batch.columns())?;

        let mut seen = HashSet::with_capacity(rows.num_rows());
        let keep: Vec<u32> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| seen.insert(*row))
            .map(|(idx, _)| idx as u32)
            .collect();

        if keep.len() == self.num_rows() {
            return Ok(self.clone());
        }
        self.take(&UInt32Array::from(keep))
    }

    /// Gather rows by index
    pub fn take(&self, indices: &UInt32Array) -> Result<Table> {
        Ok(Self::new(arrow::compute::take_record_batch(
            &self.batch,
            indices,
        )?))
    }

    /// Convert rows to JSON objects (null fields omitted)
    pub fn to_json_records(&self) -> Result<Vec<Value>> {
        arrow_to_json(&self.batch)
    }

    fn rebuild(&self, fields: Vec<Field>, arrays: Vec<ArrayRef>) -> Result<Table> {
        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows()));
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new_with_options(schema, arrays, &options)?;
        Ok(Self::new(batch))
    }
}

impl From<RecordBatch> for Table {
    fn from(batch: RecordBatch) -> Self {
        Self::new(batch)
    }
}
