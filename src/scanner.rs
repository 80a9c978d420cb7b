use std::io::Read;

use log::trace;

use crate::buffer::ByteWindow;
use crate::dialect::{Dialect, FileFormat};
use crate::error::{Error, ErrorKind, Result};
use crate::matcher::{LineEndMatcher, PatternMatcher};

/// Why a field stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Terminator {
    Delimiter,
    Newline,
    EndOfInput,
}

#[derive(Debug, Clone, Copy)]
enum ScanState {
    ScanningField,
    InsideEnclosure,
}

/// Byte-level field scanner, driving a [`ByteWindow`] with the matchers of a
/// dialect.
///
/// The scanner itself is stateless between fields: everything it needs to
/// resume lives in the window, whose `window_start` is always committed to
/// the first byte of the next field when a field is returned.
pub(crate) struct FieldScanner {
    delimiter: PatternMatcher,
    enclosure: PatternMatcher,
    line_end: LineEndMatcher,
    file_format: FileFormat,
    newlines_in_fields: bool,
    lookahead: usize,
}

impl FieldScanner {
    pub(crate) fn new(dialect: &Dialect) -> Self {
        let delimiter = dialect.delimiter_matcher();
        let enclosure = dialect.enclosure_matcher();
        let line_end = dialect.line_end_matcher();

        let lookahead = delimiter.len().max(line_end.width());

        Self {
            delimiter,
            enclosure,
            line_end,
            file_format: dialect.file_format(),
            newlines_in_fields: dialect.newlines_in_fields(),
            lookahead,
        }
    }

    #[inline(always)]
    pub(crate) fn line_end(&self) -> LineEndMatcher {
        self.line_end
    }

    fn unexpected_terminator(&self, found: &'static str) -> Error {
        Error::new(ErrorKind::LineTerminator {
            expected: self.file_format,
            found,
        })
    }

    /// Consume the row terminator found at the scan position.
    ///
    /// In mixed data, a newline unit immediately following the first one
    /// belongs to the same terminator (CRLF pair).
    fn consume_newline<R: Read>(&self, window: &mut ByteWindow<R>) -> Result<()> {
        let width = self.line_end.width();
        let is_cr = self.line_end.is_cr(window.bytes(), window.scan_pos());

        window.advance_by(width, true)?;
        window.fill(width)?;

        match self.file_format {
            FileFormat::Mixed => {
                if self.line_end.is_newline(window.bytes(), window.scan_pos()) {
                    window.advance_by(width, true)?;
                }
            }
            FileFormat::Unix => {
                if is_cr {
                    return Err(self.unexpected_terminator("CR"));
                }
            }
            FileFormat::Dos => {
                if !is_cr {
                    return Err(self.unexpected_terminator("LF"));
                }

                if !self.line_end.is_lf(window.bytes(), window.scan_pos()) {
                    return Err(self.unexpected_terminator("CR"));
                }

                window.advance_by(width, true)?;
            }
        }

        Ok(())
    }

    /// Scan a single field, whose raw contents are written into `field`.
    ///
    /// `is_last` tells whether this is the last field expected on the row,
    /// in which case a newline always ends it.
    pub(crate) fn scan_field<R: Read>(
        &self,
        window: &mut ByteWindow<R>,
        is_last: bool,
        field: &mut Vec<u8>,
    ) -> Result<Terminator> {
        use ScanState::*;

        field.clear();
        window.commit();

        let width = self.line_end.width();
        let enclosure_len = self.enclosure.len();
        let newline_ends_field = is_last || !self.newlines_in_fields;

        let mut state = ScanningField;
        let mut escaped: usize = 0;

        if enclosure_len > 0 {
            window.fill(enclosure_len)?;

            if self.enclosure.matches(window.bytes(), window.scan_pos()) {
                window.advance_by(enclosure_len, true)?;
                window.commit();
                state = InsideEnclosure;
            }
        }

        loop {
            match state {
                InsideEnclosure => {
                    window.fill(2 * enclosure_len)?;

                    if window.ensure_available()? {
                        // NOTE: an enclosure left open yields everything after it
                        self.extract_enclosed(window.window(), escaped, field);
                        window.commit();
                        return Ok(Terminator::EndOfInput);
                    }

                    let bytes = window.bytes();
                    let pos = window.scan_pos();

                    if !self.enclosure.matches(bytes, pos) {
                        window.advance_by(width, true)?;
                        continue;
                    }

                    if self.enclosure.matches(bytes, pos + enclosure_len) {
                        escaped += 1;
                        window.advance_by(2 * enclosure_len, true)?;
                        continue;
                    }

                    self.extract_enclosed(window.window(), escaped, field);
                    window.advance_by(enclosure_len, true)?;
                    window.commit();
                    state = ScanningField;
                }
                ScanningField => {
                    window.fill(self.lookahead)?;

                    if window.ensure_available()? {
                        field.extend_from_slice(window.window());
                        window.commit();
                        return Ok(Terminator::EndOfInput);
                    }

                    let bytes = window.bytes();
                    let pos = window.scan_pos();

                    if newline_ends_field && self.line_end.is_newline(bytes, pos) {
                        field.extend_from_slice(window.window());
                        self.consume_newline(window)?;
                        window.commit();
                        return Ok(Terminator::Newline);
                    }

                    if self.delimiter.matches(bytes, pos) {
                        field.extend_from_slice(window.window());
                        window.advance_by(self.delimiter.len(), true)?;
                        window.commit();
                        return Ok(Terminator::Delimiter);
                    }

                    window.advance_by(width, true)?;
                }
            }
        }
    }

    fn extract_enclosed(&self, content: &[u8], escaped: usize, out: &mut Vec<u8>) {
        if escaped == 0 {
            out.extend_from_slice(content);
            return;
        }

        trace!("collapsing {} escaped enclosure(s)", escaped);

        let enclosure_len = self.enclosure.len();
        let width = self.line_end.width();
        let mut i = 0;

        while i < content.len() {
            let escaped_here = self.enclosure.matches(content, i)
                && self.enclosure.matches(content, i + enclosure_len);

            if escaped_here {
                out.extend_from_slice(&content[i..i + enclosure_len]);
                i += 2 * enclosure_len;
            } else {
                let end = (i + width).min(content.len());
                out.extend_from_slice(&content[i..end]);
                i = end;
            }
        }
    }
}
