use std::borrow::Cow;
use std::fmt;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::row::Value;

/// Target type of a schema field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Binary,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Binary => "binary",
        })
    }
}

/// Whitespace trimming applied to text before conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimType {
    #[default]
    None,
    Left,
    Right,
    Both,
}

impl TrimType {
    pub fn apply(self, text: &str) -> &str {
        match self {
            Self::None => text,
            Self::Left => text.trim_start(),
            Self::Right => text.trim_end(),
            Self::Both => text.trim(),
        }
    }
}

/// A field of the declared output schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    pub trim: TrimType,
    pub decimal_symbol: String,
    pub grouping_symbol: String,
}

impl Default for Field {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: FieldType::String,
            trim: TrimType::None,
            decimal_symbol: ".".to_string(),
            grouping_symbol: String::new(),
        }
    }
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    pub fn trim(mut self, trim: TrimType) -> Self {
        self.trim = trim;
        self
    }

    pub fn decimal_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.decimal_symbol = symbol.into();
        self
    }

    pub fn grouping_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.grouping_symbol = symbol.into();
        self
    }
}

/// Raised when some field cannot be converted to its declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert {value:?} to {target}: {reason}")]
pub struct ConversionError {
    /// Decoded text of the field
    pub value: String,
    pub target: FieldType,
    pub reason: Cow<'static, str>,
}

impl ConversionError {
    pub fn new(value: &str, target: FieldType, reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            value: value.to_string(),
            target,
            reason: reason.into(),
        }
    }
}

/// Converts the raw bytes of a field into a [`Value`].
///
/// `Ok(None)` means the field is absent.
pub trait Converter {
    fn convert(
        &self,
        raw: &[u8],
        encoding: &'static Encoding,
        field: &Field,
    ) -> Result<Option<Value>, ConversionError>;
}

/// Decodes fields with [`encoding_rs`] and parses them according to their
/// [`FieldType`]. Empty text is always absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConverter;

impl DefaultConverter {
    fn strip_grouping<'a>(text: &'a str, field: &Field) -> Cow<'a, str> {
        if field.grouping_symbol.is_empty() || !text.contains(&field.grouping_symbol) {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(text.replace(&field.grouping_symbol, ""))
        }
    }
}

impl Converter for DefaultConverter {
    fn convert(
        &self,
        raw: &[u8],
        encoding: &'static Encoding,
        field: &Field,
    ) -> Result<Option<Value>, ConversionError> {
        // NOTE: binary fields keep their raw bytes, neither decoded nor trimmed
        let decoded = (field.kind != FieldType::Binary)
            .then(|| encoding.decode_without_bom_handling(raw).0);
        let text = decoded.as_deref().map_or("", |decoded| field.trim.apply(decoded));

        let is_empty = match decoded {
            Some(_) => text.is_empty(),
            None => raw.is_empty(),
        };

        if is_empty {
            return Ok(None);
        }

        let value = match field.kind {
            FieldType::String => Value::String(text.to_string()),
            FieldType::Boolean => match text.to_ascii_uppercase().as_str() {
                "Y" | "YES" | "TRUE" | "1" => Value::Boolean(true),
                "N" | "NO" | "FALSE" | "0" => Value::Boolean(false),
                _ => {
                    return Err(ConversionError::new(
                        text,
                        field.kind,
                        "not a boolean literal",
                    ))
                }
            },
            FieldType::Integer => Self::strip_grouping(text, field)
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|err| ConversionError::new(text, field.kind, err.to_string()))?,
            FieldType::Number => {
                let mut number = Self::strip_grouping(text, field);

                if !field.decimal_symbol.is_empty() && field.decimal_symbol != "." {
                    number = Cow::Owned(number.replace(&field.decimal_symbol, "."));
                }

                number
                    .parse::<f64>()
                    .map(Value::Number)
                    .map_err(|err| ConversionError::new(text, field.kind, err.to_string()))?
            }
            FieldType::Binary => Value::Binary(raw.to_vec()),
        };

        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use encoding_rs::{UTF_16BE, UTF_8, WINDOWS_1252};

    use super::*;

    fn convert(raw: &[u8], field: &Field) -> Result<Option<Value>, ConversionError> {
        DefaultConverter.convert(raw, UTF_8, field)
    }

    #[test]
    fn test_strings() {
        let field = Field::new("name", FieldType::String);

        assert_eq!(
            convert(b"Ann", &field),
            Ok(Some(Value::String("Ann".to_string())))
        );
        assert_eq!(convert(b"", &field), Ok(None));
        assert_eq!(
            convert(b"  Ann ", &field.clone().trim(TrimType::Left)),
            Ok(Some(Value::String("Ann ".to_string())))
        );
        assert_eq!(convert(b"   ", &field.trim(TrimType::Both)), Ok(None));

        let field = Field::new("name", FieldType::String);

        assert_eq!(
            DefaultConverter.convert(b"\xe9t\xe9", WINDOWS_1252, &field),
            Ok(Some(Value::String("été".to_string())))
        );
        assert_eq!(
            DefaultConverter.convert(b"\x00O\x00K", UTF_16BE, &field),
            Ok(Some(Value::String("OK".to_string())))
        );
    }

    #[test]
    fn test_numbers() {
        let field = Field::new("id", FieldType::Integer).grouping_symbol(",");

        assert_eq!(convert(b"1,234", &field), Ok(Some(Value::Integer(1234))));
        assert_eq!(convert(b"-7", &field), Ok(Some(Value::Integer(-7))));
        assert!(convert(b"1.5", &field).is_err());

        let field = Field::new("amount", FieldType::Number)
            .decimal_symbol(",")
            .grouping_symbol(".")
            .trim(TrimType::Both);

        assert_eq!(
            convert(b" 1.234,5 ", &field),
            Ok(Some(Value::Number(1234.5)))
        );

        let err = convert(b"abc", &field).unwrap_err();
        assert_eq!(err.value, "abc");
        assert_eq!(err.target, FieldType::Number);
    }

    #[test]
    fn test_booleans_and_binary() {
        let field = Field::new("flag", FieldType::Boolean);

        assert_eq!(convert(b"yes", &field), Ok(Some(Value::Boolean(true))));
        assert_eq!(convert(b"N", &field), Ok(Some(Value::Boolean(false))));
        assert_eq!(
            convert(b"maybe", &field).unwrap_err().to_string(),
            "cannot convert \"maybe\" to boolean: not a boolean literal"
        );

        let field = Field::new("blob", FieldType::Binary);

        assert_eq!(
            convert(b" \xff ", &field),
            Ok(Some(Value::Binary(b" \xff ".to_vec())))
        );
    }

    #[test]
    fn test_binary() {
        let field = Field::new("blob", FieldType::Binary).trim(TrimType::Both);

        assert_eq!(convert(b"", &field), Ok(None));
        assert_eq!(
            convert(b"  ", &field),
            Ok(Some(Value::Binary(b"  ".to_vec())))
        );
        assert_eq!(
            DefaultConverter.convert(b"\x00O\xd8", UTF_16BE, &field),
            Ok(Some(Value::Binary(b"\x00O\xd8".to_vec())))
        );
    }

    #[test]
    fn test_deserialize_field() {
        let field: Field =
            serde_json::from_str(r#"{"name": "id", "type": "integer", "trim": "both"}"#).unwrap();

        assert_eq!(
            field,
            Field::new("id", FieldType::Integer).trim(TrimType::Both)
        );
    }
}
