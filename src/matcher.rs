use crate::encoding::EncodingType;

/// Tests whether a configured pattern (delimiter or enclosure) starts at
/// some position of a haystack.
///
/// The variant is chosen once when the dialect is built, so the hot loops
/// only pay for a cheap `match`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PatternMatcher {
    /// No pattern was configured (e.g. no enclosure): never matches.
    Empty,
    Single(u8),
    Multi(Box<[u8]>),
}

impl PatternMatcher {
    pub(crate) fn new(pattern: Option<&[u8]>) -> Self {
        match pattern {
            None | Some([]) => Self::Empty,
            Some([byte]) => Self::Single(*byte),
            Some(bytes) => Self::Multi(bytes.into()),
        }
    }

    /// Byte length of the pattern.
    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Single(_) => 1,
            Self::Multi(bytes) => bytes.len(),
        }
    }

    #[inline(always)]
    pub(crate) fn matches(&self, haystack: &[u8], pos: usize) -> bool {
        match self {
            Self::Empty => false,
            Self::Single(byte) => haystack.get(pos) == Some(byte),
            Self::Multi(bytes) => haystack
                .get(pos..pos + bytes.len())
                .is_some_and(|window| window == &bytes[..]),
        }
    }
}

/// Tests whether the code unit at some position of a haystack is a CR or a
/// LF, in a given encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineEndMatcher {
    SingleByte,
    DoubleBigEndian,
    DoubleLittleEndian,
}

impl LineEndMatcher {
    pub(crate) fn new(encoding_type: EncodingType) -> Self {
        match encoding_type {
            EncodingType::Single => Self::SingleByte,
            EncodingType::DoubleBigEndian => Self::DoubleBigEndian,
            EncodingType::DoubleLittleEndian => Self::DoubleLittleEndian,
        }
    }

    /// Byte width of a line terminator code unit.
    #[inline(always)]
    pub(crate) fn width(self) -> usize {
        match self {
            Self::SingleByte => 1,
            _ => 2,
        }
    }

    #[inline(always)]
    fn unit(self, haystack: &[u8], pos: usize, byte: u8) -> bool {
        match self {
            Self::SingleByte => haystack.get(pos) == Some(&byte),
            Self::DoubleBigEndian => {
                matches!(haystack.get(pos..pos + 2), Some(&[0x00, b]) if b == byte)
            }
            Self::DoubleLittleEndian => {
                matches!(haystack.get(pos..pos + 2), Some(&[b, 0x00]) if b == byte)
            }
        }
    }

    #[inline(always)]
    pub(crate) fn is_cr(self, haystack: &[u8], pos: usize) -> bool {
        self.unit(haystack, pos, b'\r')
    }

    #[inline(always)]
    pub(crate) fn is_lf(self, haystack: &[u8], pos: usize) -> bool {
        self.unit(haystack, pos, b'\n')
    }

    #[inline(always)]
    pub(crate) fn is_newline(self, haystack: &[u8], pos: usize) -> bool {
        self.is_lf(haystack, pos) || self.is_cr(haystack, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matcher() {
        let haystack = b"a,b;;c\"";

        let empty = PatternMatcher::new(None);
        assert_eq!(empty, PatternMatcher::new(Some(b"")));
        assert!((0..haystack.len()).all(|i| !empty.matches(haystack, i)));

        let single = PatternMatcher::new(Some(b","));
        assert_eq!(single, PatternMatcher::Single(b','));
        assert!(single.matches(haystack, 1));
        assert!(!single.matches(haystack, 0));
        assert!(!single.matches(haystack, 42));

        let multi = PatternMatcher::new(Some(b";;"));
        assert_eq!(multi.len(), 2);
        assert!(multi.matches(haystack, 3));
        assert!(!multi.matches(haystack, 4));

        // Pattern running past the end of the haystack
        let multi = PatternMatcher::new(Some(b"\"\""));
        assert!(!multi.matches(haystack, 6));
    }

    #[test]
    fn test_line_end_matcher() {
        let single = LineEndMatcher::new(EncodingType::Single);
        let data = b"a\r\nb";
        assert!(single.is_cr(data, 1));
        assert!(single.is_lf(data, 2));
        assert!(!single.is_newline(data, 0));
        assert!(!single.is_newline(data, 4));

        let be = LineEndMatcher::new(EncodingType::DoubleBigEndian);
        let data = b"\x00a\x00\r\x00\n";
        assert_eq!(be.width(), 2);
        assert!(be.is_cr(data, 2));
        assert!(be.is_lf(data, 4));
        assert!(!be.is_newline(data, 0));
        assert!(!be.is_newline(data, 5));

        let le = LineEndMatcher::new(EncodingType::DoubleLittleEndian);
        let data = b"a\x00\r\x00\n\x00";
        assert!(le.is_cr(data, 2));
        assert!(le.is_lf(data, 4));
        assert!(!le.is_newline(data, 1));

        // U+0A0D is not a line terminator
        assert!(!be.is_newline(b"\x0a\x0d", 0));
        assert!(!le.is_newline(b"\x0d\x0a", 0));
    }
}
