use std::slice;

use crate::convert::ConversionError;

/// A single value of a [`Row`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Binary(Vec<u8>),
    /// Raw field bytes, still in the source encoding, when conversion is
    /// left to the caller.
    Raw(Vec<u8>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(integer) => Some(*integer),
            _ => None,
        }
    }

    /// Bytes of a [`Value::Raw`] or [`Value::Binary`] value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Raw(bytes) | Self::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// A row sized to the output schema, plus the synthetic filename and row
/// number columns when configured. `None` is the absent value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<Option<Value>>,
}

impl Row {
    pub(crate) fn with_len(len: usize) -> Self {
        Self {
            values: vec![None; len],
        }
    }

    pub(crate) fn set(&mut self, index: usize, value: Option<Value>) {
        self.values[index] = value;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at `index`, flattening absent values and
    /// out-of-bounds indices alike.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> slice::Iter<'_, Option<Value>> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<Option<Value>> {
        self.values
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Option<Value>;
    type IntoIter = slice::Iter<'a, Option<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A field that could not be converted.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFailure {
    /// Index of the field in the output schema.
    pub index: usize,
    /// Raw bytes of the field, in the source encoding.
    pub raw: Vec<u8>,
    pub cause: ConversionError,
}

/// Outcome of reading a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Row(Row),
    /// Nothing remains for this reader.
    EndOfInput,
    /// Some fields could not be converted. The row is still materialized,
    /// failed fields being absent.
    ConversionFailure {
        row: Row,
        failures: Vec<FieldFailure>,
    },
}

impl ParseOutcome {
    /// Returns the row, if any, whether its conversion partially failed or
    /// not.
    pub fn into_row(self) -> Option<Row> {
        match self {
            Self::Row(row) | Self::ConversionFailure { row, .. } => Some(row),
            Self::EndOfInput => None,
        }
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::EndOfInput)
    }
}
