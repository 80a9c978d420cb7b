use encoding_rs::{Encoding, REPLACEMENT, UTF_16BE, UTF_16LE, UTF_8};

use crate::error::{Error, ErrorKind, Result};

/// Width & byte order of the code units of a supported text encoding.
///
/// Every ASCII-compatible encoding known to [`encoding_rs`] is considered
/// single-byte here since structural characters (delimiters, quotes, line
/// terminators) are always encoded as a single byte by those.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingType {
    Single,
    DoubleBigEndian,
    DoubleLittleEndian,
}

impl EncodingType {
    pub fn of(encoding: &'static Encoding) -> Self {
        if encoding == UTF_16BE {
            Self::DoubleBigEndian
        } else if encoding == UTF_16LE {
            Self::DoubleLittleEndian
        } else {
            Self::Single
        }
    }

    /// Number of bytes of a single code unit.
    #[inline(always)]
    pub fn width(self) -> usize {
        match self {
            Self::Single => 1,
            Self::DoubleBigEndian | Self::DoubleLittleEndian => 2,
        }
    }

    /// Encode some text into the bytes it takes in the given encoding.
    ///
    /// NOTE: `encoding_rs` never encodes to UTF-16 (its output encoding is
    /// UTF-8), so code units are laid out by hand in this case.
    pub(crate) fn encode(
        self,
        encoding: &'static Encoding,
        what: &'static str,
        text: &str,
    ) -> Result<Vec<u8>> {
        match self {
            Self::DoubleBigEndian => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            Self::DoubleLittleEndian => {
                Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect())
            }
            Self::Single => {
                let (bytes, _, unmappable) = encoding.encode(text);

                if unmappable {
                    return Err(Error::new(ErrorKind::UnmappablePattern {
                        what,
                        pattern: text.to_string(),
                        encoding: encoding.name(),
                    }));
                }

                Ok(bytes.into_owned())
            }
        }
    }
}

/// Resolve an encoding label as found in configuration. An absent or blank
/// label means UTF-8.
pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    let label = match label.map(str::trim) {
        None | Some("") => return Ok(UTF_8),
        Some(label) => label,
    };

    // NOTE: stateful encodings such as ISO-2022-JP may encode structural
    // characters differently depending on what precedes them.
    match Encoding::for_label(label.as_bytes()) {
        Some(encoding)
            if encoding != REPLACEMENT
                && (encoding.is_ascii_compatible()
                    || EncodingType::of(encoding) != EncodingType::Single) =>
        {
            Ok(encoding)
        }
        _ => Err(Error::new(ErrorKind::UnsupportedEncoding {
            label: label.to_string(),
        })),
    }
}

/// Return the byte length of the BOM found at the beginning of `head`, if
/// this BOM belongs to the given encoding.
#[inline]
pub(crate) fn bom_len(encoding: &'static Encoding, head: &[u8]) -> usize {
    match Encoding::for_bom(head) {
        Some((found, len)) if found == encoding => len,
        _ => 0,
    }
}

#[inline]
pub(crate) fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use encoding_rs::WINDOWS_1252;

    use super::*;

    #[test]
    fn test_resolve_encoding() -> Result<()> {
        assert_eq!(resolve_encoding(None)?, UTF_8);
        assert_eq!(resolve_encoding(Some("  "))?, UTF_8);
        assert_eq!(resolve_encoding(Some("utf-16be"))?, UTF_16BE);
        assert_eq!(resolve_encoding(Some("UTF-16LE"))?, UTF_16LE);
        assert_eq!(resolve_encoding(Some("latin1"))?, WINDOWS_1252);

        assert!(matches!(
            resolve_encoding(Some("klingon")).unwrap_err().kind(),
            ErrorKind::UnsupportedEncoding { .. }
        ));

        // Labels resolving to the replacement encoding are useless to us
        assert!(resolve_encoding(Some("iso-2022-kr")).is_err());
        assert!(resolve_encoding(Some("iso-2022-jp")).is_err());

        Ok(())
    }

    #[test]
    fn test_encoding_type() {
        assert_eq!(EncodingType::of(UTF_8), EncodingType::Single);
        assert_eq!(EncodingType::of(WINDOWS_1252), EncodingType::Single);
        assert_eq!(EncodingType::of(UTF_16BE), EncodingType::DoubleBigEndian);
        assert_eq!(EncodingType::of(UTF_16LE).width(), 2);
    }

    #[test]
    fn test_encode() -> Result<()> {
        assert_eq!(
            EncodingType::Single.encode(UTF_8, "delimiter", ";")?,
            b";".to_vec()
        );
        assert_eq!(
            EncodingType::DoubleBigEndian.encode(UTF_16BE, "delimiter", ",")?,
            vec![0x00, b',']
        );
        assert_eq!(
            EncodingType::DoubleLittleEndian.encode(UTF_16LE, "enclosure", "\"'")?,
            vec![b'"', 0x00, b'\'', 0x00]
        );
        assert_eq!(
            EncodingType::Single.encode(WINDOWS_1252, "delimiter", "é")?,
            vec![0xe9]
        );
        assert!(EncodingType::Single
            .encode(WINDOWS_1252, "delimiter", "→")
            .is_err());

        Ok(())
    }

    #[test]
    fn test_bom() {
        assert_eq!(bom_len(UTF_8, b"\xef\xbb\xbfname"), 3);
        assert_eq!(bom_len(UTF_8, b"name"), 0);
        assert_eq!(bom_len(UTF_16LE, b"\xff\xfen\x00"), 2);
        assert_eq!(bom_len(UTF_16BE, b"\xff\xfen\x00"), 0);
        assert_eq!(bom_len(UTF_8, b""), 0);

        assert_eq!(strip_bom("\u{feff}name"), "name");
        assert_eq!(strip_bom("name"), "name");
    }
}
