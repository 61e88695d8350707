#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tr_columnar::{Column, ColumnError};
use tr_types::Scalar;

/// Class attribute chain carried by every frame, mirroring what the host
/// table abstraction expects on a frame it produces or consumes
/// (extension tag, base tag, plain frame tag).
pub const FRAME_CLASS: [&str; 3] = ["tbl_df", "tbl", "data.frame"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexLabel {
    Int64(i64),
    Utf8(String),
}

impl From<i64> for IndexLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for IndexLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for IndexLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

/// Row labels. Default frames carry `1..=n`, the host `row.names`
/// convention; a reduction result carries the single label `1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    labels: Vec<IndexLabel>,
}

impl Index {
    #[must_use]
    pub fn new(labels: Vec<IndexLabel>) -> Self {
        Self { labels }
    }

    /// The default `1..=n` row labels for an `n`-row frame.
    #[must_use]
    pub fn default_range(len: usize) -> Self {
        Self::new((1..=len as i64).map(IndexLabel::from).collect())
    }

    /// The canonical single-row label a reduction result carries.
    #[must_use]
    pub fn single_row() -> Self {
        Self::new(vec![IndexLabel::Int64(1)])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[IndexLabel] {
        &self.labels
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("index length ({index_len}) does not match column length ({column_len})")]
    LengthMismatch { index_len: usize, column_len: usize },
    #[error("column order names {order} columns but the frame holds {held}")]
    ColumnOrderMismatch { order: usize, held: usize },
    #[error("column order references unknown column '{0}'")]
    UnknownColumn(String),
    #[error("assembly received {names} names but {values} value columns")]
    AssemblyArityMismatch { names: usize, values: usize },
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// An ordered sequence of named, equal-length columns plus the
/// tabular-frame metadata the binding layer restores host-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    index: Index,
    columns: BTreeMap<String, Column>,
    column_order: Vec<String>,
    class: Vec<String>,
}

impl DataFrame {
    pub fn new(index: Index, columns: BTreeMap<String, Column>) -> Result<Self, FrameError> {
        let column_order = columns.keys().cloned().collect();
        Self::new_with_column_order(index, columns, column_order)
    }

    pub fn new_with_column_order(
        index: Index,
        columns: BTreeMap<String, Column>,
        column_order: Vec<String>,
    ) -> Result<Self, FrameError> {
        Self::validate_column_lengths(&index, &columns)?;
        Self::validate_column_order(&columns, &column_order)?;
        Ok(Self {
            index,
            columns,
            column_order,
            class: FRAME_CLASS.iter().map(|tag| (*tag).to_owned()).collect(),
        })
    }

    /// Construct a frame from a dict of column vectors, inferring each
    /// column's dtype. All vectors must share one length; row labels are
    /// auto-generated as `1..=n`.
    ///
    /// `column_order` controls observable column label order.
    pub fn from_dict(
        column_order: &[&str],
        data: Vec<(&str, Vec<Scalar>)>,
    ) -> Result<Self, FrameError> {
        let n = data.first().map_or(0, |(_, values)| values.len());
        let mut columns = BTreeMap::new();
        for (name, values) in data {
            if values.len() != n {
                return Err(FrameError::LengthMismatch {
                    index_len: n,
                    column_len: values.len(),
                });
            }
            columns.insert(name.to_owned(), Column::from_values(values)?);
        }
        let order = column_order.iter().map(|name| (*name).to_owned()).collect();
        Self::new_with_column_order(Index::default_range(n), columns, order)
    }

    /// Assemble a one-row frame from parallel name and value sequences.
    ///
    /// This is the reduction result shape: column order equals `names`, the
    /// row label is the canonical `1`, and the default class chain is
    /// attached. An arity mismatch or a value column that is not exactly
    /// one element long signals a defect in the caller, not a data error.
    /// Zero names produce an empty 0x0 frame.
    pub fn single_row(names: Vec<String>, values: Vec<Column>) -> Result<Self, FrameError> {
        if names.len() != values.len() {
            return Err(FrameError::AssemblyArityMismatch {
                names: names.len(),
                values: values.len(),
            });
        }
        if names.is_empty() {
            return Self::new(Index::new(Vec::new()), BTreeMap::new());
        }
        let columns = names.iter().cloned().zip(values).collect();
        Self::new_with_column_order(Index::single_row(), columns, names)
    }

    fn validate_column_lengths(
        index: &Index,
        columns: &BTreeMap<String, Column>,
    ) -> Result<(), FrameError> {
        for column in columns.values() {
            if column.len() != index.len() {
                return Err(FrameError::LengthMismatch {
                    index_len: index.len(),
                    column_len: column.len(),
                });
            }
        }
        Ok(())
    }

    fn validate_column_order(
        columns: &BTreeMap<String, Column>,
        column_order: &[String],
    ) -> Result<(), FrameError> {
        if column_order.len() != columns.len() {
            return Err(FrameError::ColumnOrderMismatch {
                order: column_order.len(),
                held: columns.len(),
            });
        }
        for name in column_order {
            if !columns.contains_key(name) {
                return Err(FrameError::UnknownColumn(name.clone()));
            }
        }
        Ok(())
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Column names in observable order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&String> {
        self.column_order.iter().collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Iterate `(name, column)` pairs in observable order.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&String, &Column)> {
        self.column_order.iter().map(|name| {
            let column = self
                .columns
                .get(name)
                .expect("column name listed in order must exist");
            (name, column)
        })
    }

    /// The class attribute chain the binding layer restores host-side.
    #[must_use]
    pub fn class(&self) -> &[String] {
        &self.class
    }
}
