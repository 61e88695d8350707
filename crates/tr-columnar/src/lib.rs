#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tr_types::{DType, Scalar, TypeError, cast_scalar_owned, infer_dtype};

/// Packed per-element validity: bit set = value present, bit clear = missing.
#[derive(Debug, Clone, Eq)]
pub struct ValidityMask {
    words: Vec<u64>,
    len: usize,
}

impl ValidityMask {
    #[must_use]
    pub fn from_values(values: &[Scalar]) -> Self {
        let len = values.len();
        let word_count = len.div_ceil(64);
        let mut words = vec![0_u64; word_count];
        for (idx, value) in values.iter().enumerate() {
            if !value.is_missing() {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Self { words, len }
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        (self.words[idx / 64] >> (idx % 64)) & 1 == 1
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        let full_words = self.len / 64;
        let mut count: u32 = self.words[..full_words]
            .iter()
            .map(|w| w.count_ones())
            .sum();
        let remainder = self.len % 64;
        if remainder > 0 && full_words < self.words.len() {
            let mask = (1_u64 << remainder) - 1;
            count += (self.words[full_words] & mask).count_ones();
        }
        count as usize
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterator over per-element validity bits, materialized from the
    /// packed representation.
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.get(idx))
    }
}

impl PartialEq for ValidityMask {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.bits().eq(other.bits())
    }
}

impl Serialize for ValidityMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let bits: Vec<bool> = self.bits().collect();
        let mut state = serializer.serialize_struct("ValidityMask", 1)?;
        state.serialize_field("bits", &bits)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ValidityMask {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            bits: Vec<bool>,
        }
        let raw = Raw::deserialize(deserializer)?;
        let len = raw.bits.len();
        let word_count = len.div_ceil(64);
        let mut words = vec![0_u64; word_count];
        for (idx, &valid) in raw.bits.iter().enumerate() {
            if valid {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Ok(Self { words, len })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// A uniform-kind sequence of optional values.
///
/// Every element is either the dtype's missing marker or a present value of
/// the dtype's domain; the invariant is established at construction and
/// holds for the column's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    dtype: DType,
    values: Vec<Scalar>,
    validity: ValidityMask,
}

impl Column {
    /// Construct a column, coercing values to the target dtype.
    /// Takes ownership of the values vec so identity casts skip cloning.
    pub fn new(dtype: DType, values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let needs_coercion = values.iter().any(|v| {
            let d = v.dtype();
            d != dtype && d != DType::Null
        });

        let coerced = if needs_coercion {
            values
                .into_iter()
                .map(|value| cast_scalar_owned(value, dtype))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            // Values already match dtype; only remap Null variants to the
            // dtype-specific missing marker.
            values
                .into_iter()
                .map(|value| match value {
                    Scalar::Null(_) => Scalar::missing_for_dtype(dtype),
                    other => other,
                })
                .collect()
        };

        let validity = ValidityMask::from_values(&coerced);

        Ok(Self {
            dtype,
            values: coerced,
            validity,
        })
    }

    pub fn from_values(values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let dtype = infer_dtype(&values)?;
        Self::new(dtype, values)
    }

    /// One-element column holding a single reduction output cell.
    pub fn single(dtype: DType, value: Scalar) -> Result<Self, ColumnError> {
        Self::new(dtype, vec![value])
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx)
    }

    #[must_use]
    pub fn validity(&self) -> &ValidityMask {
        &self.validity
    }

    /// Number of missing elements.
    #[must_use]
    pub fn null_count(&self) -> usize {
        self.len() - self.validity.count_valid()
    }

    /// Whether any element is missing.
    #[must_use]
    pub fn has_missing(&self) -> bool {
        self.validity.count_valid() < self.len()
    }

    /// Iterator over the non-missing values only.
    pub fn iter_present(&self) -> impl Iterator<Item = &Scalar> {
        self.values.iter().filter(|v| !v.is_missing())
    }
}

#[cfg(test)]
mod tests {
    use tr_types::{DType, NullKind, Scalar};

    use super::{Column, ValidityMask};

    #[test]
    fn validity_mask_tracks_missing_positions() {
        let values = vec![
            Scalar::Int64(1),
            Scalar::Null(NullKind::Null),
            Scalar::Int64(3),
        ];
        let mask = ValidityMask::from_values(&values);
        assert!(mask.get(0));
        assert!(!mask.get(1));
        assert!(mask.get(2));
        assert!(!mask.get(99));
        assert_eq!(mask.count_valid(), 2);
        assert_eq!(mask.bits().collect::<Vec<_>>(), vec![true, false, true]);
    }

    #[test]
    fn validity_mask_counts_across_word_boundaries() {
        let values: Vec<Scalar> = (0..130)
            .map(|i| {
                if i % 2 == 0 {
                    Scalar::Int64(i)
                } else {
                    Scalar::Null(NullKind::Null)
                }
            })
            .collect();
        let mask = ValidityMask::from_values(&values);
        assert_eq!(mask.len(), 130);
        assert_eq!(mask.count_valid(), 65);
    }

    #[test]
    fn column_coerces_values_to_dtype() {
        let column = Column::new(
            DType::Float64,
            vec![
                Scalar::Int64(1),
                Scalar::Null(NullKind::Null),
                Scalar::Float64(2.5),
            ],
        )
        .expect("coercion succeeds");

        assert_eq!(column.dtype(), DType::Float64);
        assert_eq!(column.values()[0], Scalar::Float64(1.0));
        // Null remaps to the float missing marker.
        assert_eq!(column.values()[1], Scalar::Null(NullKind::NaN));
        assert_eq!(column.null_count(), 1);
        assert!(column.has_missing());
    }

    #[test]
    fn from_values_infers_dtype() {
        let column = Column::from_values(vec![
            Scalar::Bool(true),
            Scalar::Int64(2),
            Scalar::Null(NullKind::Null),
        ])
        .expect("inference succeeds");
        assert_eq!(column.dtype(), DType::Int64);
        assert_eq!(column.values()[0], Scalar::Int64(1));
    }

    #[test]
    fn categorical_column_keeps_labels() {
        let column = Column::new(
            DType::Categorical,
            vec![
                Scalar::Utf8("low".to_owned()),
                Scalar::Null(NullKind::Null),
                Scalar::Utf8("high".to_owned()),
            ],
        )
        .expect("labels accepted");
        assert_eq!(column.dtype(), DType::Categorical);
        assert_eq!(column.iter_present().count(), 2);
    }

    #[test]
    fn nan_counts_as_missing_in_validity() {
        let column = Column::new(
            DType::Float64,
            vec![Scalar::Float64(f64::NAN), Scalar::Float64(1.0)],
        )
        .expect("floats accepted");
        assert_eq!(column.null_count(), 1);
        assert_eq!(
            column.iter_present().collect::<Vec<_>>(),
            vec![&Scalar::Float64(1.0)]
        );
    }

    #[test]
    fn single_builds_one_element_column() {
        let cell = Column::single(DType::Int64, Scalar::Int64(42)).expect("cell builds");
        assert_eq!(cell.len(), 1);
        assert_eq!(cell.value(0), Some(&Scalar::Int64(42)));
        assert_eq!(cell.value(1), None);
    }

    #[test]
    fn empty_column_is_empty() {
        let column = Column::new(DType::Utf8, Vec::new()).expect("empty ok");
        assert!(column.is_empty());
        assert!(column.validity().is_empty());
        assert!(!column.has_missing());
    }

    #[test]
    fn serde_round_trips_validity() {
        let column = Column::new(
            DType::Int64,
            vec![Scalar::Int64(5), Scalar::Null(NullKind::Null)],
        )
        .expect("builds");
        let json = serde_json::to_string(&column).expect("serializes");
        let back: Column = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, column);
    }
}
