use std::fmt;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::encoding::{resolve_encoding, EncodingType};
use crate::error::{Error, ErrorKind, Result};
use crate::matcher::{LineEndMatcher, PatternMatcher};

/// Line terminators accepted in the data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// CR, LF or CRLF. A newline right after a row terminator is part of it.
    #[default]
    Mixed,
    /// CRLF only.
    Dos,
    /// LF only, every LF ending a row.
    Unix,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mixed => "mixed",
            Self::Dos => "dos",
            Self::Unix => "unix",
        })
    }
}

/// Immutable, fully resolved description of the CSV data to read: every
/// textual pattern has already been encoded into the bytes it takes in the
/// declared encoding.
///
/// A [`Dialect`] is usually obtained through
/// [`ReaderBuilder::dialect`](crate::ReaderBuilder::dialect).
#[derive(Debug, Clone)]
pub struct Dialect {
    encoding: &'static Encoding,
    encoding_type: EncodingType,
    delimiter: Vec<u8>,
    enclosure: Option<Vec<u8>>,
    delimiter_text: String,
    enclosure_text: Option<String>,
    escape_text: Option<String>,
    has_headers: bool,
    newlines_in_fields: bool,
    file_format: FileFormat,
}

impl Dialect {
    pub(crate) fn resolve(
        delimiter: &str,
        enclosure: Option<&str>,
        escape: Option<&str>,
        encoding: Option<&str>,
        has_headers: bool,
        newlines_in_fields: bool,
    ) -> Result<Self> {
        if delimiter.is_empty() {
            return Err(Error::new(ErrorKind::InvalidDialect {
                details: "delimiter cannot be empty".into(),
            }));
        }

        let enclosure = enclosure.filter(|e| !e.is_empty());
        let escape = escape.filter(|e| !e.is_empty());

        if enclosure == Some(delimiter) {
            return Err(Error::new(ErrorKind::InvalidDialect {
                details: "enclosure and delimiter must differ".into(),
            }));
        }

        let encoding = resolve_encoding(encoding)?;
        let encoding_type = EncodingType::of(encoding);

        Ok(Self {
            encoding,
            encoding_type,
            delimiter: encoding_type.encode(encoding, "delimiter", delimiter)?,
            enclosure: enclosure
                .map(|e| encoding_type.encode(encoding, "enclosure", e))
                .transpose()?,
            delimiter_text: delimiter.to_string(),
            enclosure_text: enclosure.map(str::to_string),
            escape_text: escape.map(str::to_string),
            has_headers,
            newlines_in_fields,
            file_format: FileFormat::Mixed,
        })
    }

    pub(crate) fn with_file_format(mut self, file_format: FileFormat) -> Self {
        self.file_format = file_format;
        self
    }

    /// Declared encoding of the data.
    #[inline]
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    #[inline]
    pub fn encoding_type(&self) -> EncodingType {
        self.encoding_type
    }

    /// Delimiter, as encoded bytes.
    #[inline]
    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    /// Enclosure, as encoded bytes, if any.
    #[inline]
    pub fn enclosure(&self) -> Option<&[u8]> {
        self.enclosure.as_deref()
    }

    #[inline]
    pub fn delimiter_text(&self) -> &str {
        &self.delimiter_text
    }

    #[inline]
    pub fn enclosure_text(&self) -> Option<&str> {
        self.enclosure_text.as_deref()
    }

    /// Escape character, only used when sniffing header names.
    #[inline]
    pub fn escape_text(&self) -> Option<&str> {
        self.escape_text.as_deref()
    }

    #[inline]
    pub fn has_headers(&self) -> bool {
        self.has_headers
    }

    /// Whether newlines may appear in fields other than the last one of a
    /// row without being enclosed.
    #[inline]
    pub fn newlines_in_fields(&self) -> bool {
        self.newlines_in_fields
    }

    #[inline]
    pub fn file_format(&self) -> FileFormat {
        self.file_format
    }

    /// Encode some text into the declared encoding.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        self.encoding_type.encode(self.encoding, "text", text)
    }

    pub(crate) fn delimiter_matcher(&self) -> PatternMatcher {
        PatternMatcher::new(Some(&self.delimiter))
    }

    pub(crate) fn enclosure_matcher(&self) -> PatternMatcher {
        PatternMatcher::new(self.enclosure.as_deref())
    }

    pub(crate) fn line_end_matcher(&self) -> LineEndMatcher {
        LineEndMatcher::new(self.encoding_type)
    }
}
