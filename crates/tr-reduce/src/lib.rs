#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashSet;

use thiserror::Error;
use tr_columnar::{Column, ColumnError};
use tr_frame::{DataFrame, FrameError};
use tr_types::{DType, Scalar, TypeError, compare_values};

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// The reduction kind a column scans under.
///
/// Unrecognized representations (untyped all-missing columns, factor-like
/// columns) classify as `Text` and reduce through the textual projection —
/// the designed default path, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceKind {
    Float,
    Int,
    Bool,
    Text,
}

#[must_use]
pub fn classify(dtype: DType) -> ReduceKind {
    match dtype {
        DType::Float64 => ReduceKind::Float,
        DType::Int64 => ReduceKind::Int,
        DType::Bool => ReduceKind::Bool,
        DType::Utf8 | DType::Categorical | DType::Null => ReduceKind::Text,
    }
}

/// Output dtype of a per-column max: same as the input, except fallback
/// kinds are reinterpreted as text.
#[must_use]
pub fn max_output_dtype(dtype: DType) -> DType {
    match dtype {
        DType::Categorical | DType::Null => DType::Utf8,
        other => other,
    }
}

/// Maximum non-missing value of a column, or the output dtype's missing
/// marker when the column is empty or all-missing.
///
/// Seed on the first non-missing element, then scan the remaining suffix
/// once, keeping whichever value compares greater. Matches column-wise
/// `max(x, na.rm = TRUE)` without the all-NA warning value.
pub fn column_max(column: &Column) -> Result<Scalar, ReduceError> {
    let kind = classify(column.dtype());
    let out_dtype = max_output_dtype(column.dtype());

    let mut present = column.iter_present();
    let Some(seed) = present.next() else {
        return Ok(Scalar::missing_for_dtype(out_dtype));
    };

    if kind == ReduceKind::Bool {
        // No value exceeds TRUE, so the scan can stop at the first one.
        if matches!(seed, Scalar::Bool(true))
            || present.any(|value| matches!(value, Scalar::Bool(true)))
        {
            return Ok(Scalar::Bool(true));
        }
        return Ok(Scalar::Bool(false));
    }

    let mut best = seed;
    for value in present {
        if compare_values(value, best)? == Ordering::Greater {
            best = value;
        }
    }
    Ok(best.clone())
}

/// Hashable key over a column's native value domain. Floats key on their
/// exact bit pattern, not an epsilon neighborhood.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DistinctKey {
    Int(i64),
    Float(u64),
    Bool(bool),
    Text(String),
}

/// Count distinct values into a caller-owned set, so a table-level scan can
/// reuse one allocation across columns. Clears the set first.
fn count_distinct_into(column: &Column, seen: &mut HashSet<DistinctKey>) -> i64 {
    seen.clear();
    let kind = classify(column.dtype());
    let mut saw_missing = false;

    for value in column.values() {
        if value.is_missing() {
            saw_missing = true;
            continue;
        }
        let key = match (kind, value) {
            (ReduceKind::Float, Scalar::Float64(v)) => DistinctKey::Float(v.to_bits()),
            (ReduceKind::Int, Scalar::Int64(v)) => DistinctKey::Int(*v),
            (ReduceKind::Bool, Scalar::Bool(v)) => DistinctKey::Bool(*v),
            _ => match value.to_text() {
                Ok(text) => DistinctKey::Text(text),
                // to_text only fails on missing values, filtered above.
                Err(_) => continue,
            },
        };
        seen.insert(key);
    }

    i64::try_from(seen.len()).unwrap_or(i64::MAX) + i64::from(saw_missing)
}

/// Count of distinct non-missing values, plus one bucket if any value is
/// missing (however many missing entries there are).
#[must_use]
pub fn column_ndistinct(column: &Column) -> i64 {
    count_distinct_into(column, &mut HashSet::new())
}

/// Per-column maximum over a whole frame.
///
/// Returns a one-row frame with the input's column-name sequence; each cell
/// keeps its column's dtype (fallback kinds come back as text). Empty or
/// all-missing columns yield the kind-appropriate missing marker.
pub fn colmaxs(frame: &DataFrame) -> Result<DataFrame, ReduceError> {
    let mut names = Vec::with_capacity(frame.num_columns());
    let mut values = Vec::with_capacity(frame.num_columns());

    for (name, column) in frame.iter_columns() {
        let cell = column_max(column)?;
        names.push(name.clone());
        values.push(Column::single(max_output_dtype(column.dtype()), cell)?);
    }

    Ok(DataFrame::single_row(names, values)?)
}

/// Per-column distinct count over a whole frame, missing bucket included.
///
/// Returns a one-row frame of `Int64` counts with the input's column-name
/// sequence. The membership set is allocated once and reused across the
/// column loop.
pub fn colndistinct(frame: &DataFrame) -> Result<DataFrame, ReduceError> {
    let mut names = Vec::with_capacity(frame.num_columns());
    let mut values = Vec::with_capacity(frame.num_columns());
    let mut seen = HashSet::new();

    for (name, column) in frame.iter_columns() {
        let count = count_distinct_into(column, &mut seen);
        names.push(name.clone());
        values.push(Column::single(DType::Int64, Scalar::Int64(count))?);
    }

    Ok(DataFrame::single_row(names, values)?)
}
