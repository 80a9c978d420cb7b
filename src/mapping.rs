use std::collections::{HashMap, VecDeque};

use crate::encoding::strip_bom;

/// Translates the ordinal position of a field within a row into its index in
/// the output schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldsMapping {
    /// Ordinal `i` is schema index `i`, for the first `len` fields.
    Positional { len: usize },
    /// One entry per header column, `None` when the column is not part of
    /// the schema.
    Named { indices: Vec<Option<usize>> },
}

impl FieldsMapping {
    pub fn positional(len: usize) -> Self {
        Self::Positional { len }
    }

    /// Build a mapping from the header names found in a file and the names of
    /// the schema fields. Matching is case-sensitive, on trimmed,
    /// BOM-stripped names. Duplicate names are paired in order of
    /// appearance.
    pub fn named<H, S>(header: &[H], schema_names: &[S]) -> Self
    where
        H: AsRef<str>,
        S: AsRef<str>,
    {
        let mut candidates: HashMap<&str, VecDeque<usize>> = HashMap::new();

        for (index, name) in schema_names.iter().enumerate() {
            candidates.entry(name.as_ref()).or_default().push_back(index);
        }

        let indices = header
            .iter()
            .map(|name| {
                candidates
                    .get_mut(strip_bom(name.as_ref().trim()).trim())
                    .and_then(VecDeque::pop_front)
            })
            .collect();

        Self::Named { indices }
    }

    /// Number of fields expected on each row.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional { len } => *len,
            Self::Named { indices } => indices.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Schema index of the field found at `ordinal` in a row, if it exists.
    #[inline]
    pub fn schema_index(&self, ordinal: usize) -> Option<usize> {
        match self {
            Self::Positional { len } => (ordinal < *len).then_some(ordinal),
            Self::Named { indices } => indices.get(ordinal).copied().flatten(),
        }
    }
}
