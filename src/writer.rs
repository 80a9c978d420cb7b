use std::io::{self, BufWriter, Write};

use encoding_rs::{UTF_16BE, UTF_16LE, UTF_8};

use crate::dialect::Dialect;
use crate::error::{Error, Result};

/// Writes rows of text fields in a [`Dialect`], encoding them in its declared
/// encoding. Fields containing the delimiter, the enclosure or a line
/// terminator are enclosed, doubling inner enclosures.
pub struct Writer<W: Write> {
    dialect: Dialect,
    buffer: BufWriter<W>,
    delimiter: Vec<u8>,
    newline: Vec<u8>,
    scratch: String,
}

impl<W: Write> Writer<W> {
    pub fn with_capacity(writer: W, capacity: usize, dialect: &Dialect) -> Result<Self> {
        Ok(Self {
            buffer: BufWriter::with_capacity(capacity, writer),
            delimiter: dialect.delimiter().to_vec(),
            newline: dialect.encode("\n")?,
            scratch: String::new(),
            dialect: dialect.clone(),
        })
    }

    /// Set the line terminator written after each row.
    ///
    /// Will default to `\n`.
    pub fn newline(&mut self, newline: &str) -> Result<&mut Self> {
        self.newline = self.dialect.encode(newline)?;
        Ok(self)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.buffer.flush()
    }

    /// Write the byte order mark of the declared encoding, if it has one.
    pub fn write_bom(&mut self) -> io::Result<()> {
        let encoding = self.dialect.encoding();

        let bom: &[u8] = if encoding == UTF_8 {
            b"\xef\xbb\xbf"
        } else if encoding == UTF_16BE {
            b"\xfe\xff"
        } else if encoding == UTF_16LE {
            b"\xff\xfe"
        } else {
            b""
        };

        self.buffer.write_all(bom)
    }

    /// Write an empty line.
    pub fn write_raw_newline(&mut self) -> io::Result<()> {
        self.buffer.write_all(&self.newline)
    }

    fn must_quote(&self, cell: &str) -> bool {
        cell.contains(self.dialect.delimiter_text())
            || cell.contains(['\r', '\n'])
            || self
                .dialect
                .enclosure_text()
                .is_some_and(|enclosure| cell.contains(enclosure))
    }

    fn quote(&mut self, cell: &str, enclosure: &str) {
        self.scratch.clear();
        self.scratch.push_str(enclosure);

        let mut rest = cell;

        while let Some(offset) = rest.find(enclosure) {
            let end = offset + enclosure.len();
            self.scratch.push_str(&rest[..end]);
            self.scratch.push_str(enclosure);
            rest = &rest[end..];
        }

        self.scratch.push_str(rest);
        self.scratch.push_str(enclosure);
    }

    pub fn write_record<I, T>(&mut self, record: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        for (i, cell) in record.into_iter().enumerate() {
            let cell = cell.as_ref();

            if i != 0 {
                self.buffer.write_all(&self.delimiter)?;
            }

            let encoded = match self.dialect.enclosure_text() {
                Some(enclosure) if self.must_quote(cell) => {
                    let enclosure = enclosure.to_string();
                    self.quote(cell, &enclosure);
                    self.dialect.encode(&self.scratch)?
                }
                _ => self.dialect.encode(cell)?,
            };

            self.buffer.write_all(&encoded)?;
        }

        self.buffer.write_all(&self.newline)?;

        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.buffer
            .into_inner()
            .map_err(|err| Error::from(err.into_error()))
    }
}
