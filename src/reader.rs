use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::buffer::ByteWindow;
use crate::convert::{Converter, DefaultConverter, Field};
use crate::dialect::{Dialect, FileFormat};
use crate::encoding::bom_len;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::header::read_header_names;
use crate::mapping::FieldsMapping;
use crate::partition::{newlines_before, skip_partial_line, PartitionPlan};
use crate::row::{FieldFailure, ParseOutcome, Row, Value};
use crate::scanner::{FieldScanner, Terminator};

const DEFAULT_BUFFER_CAPACITY: usize = 8192;
const MAX_BOM_LEN: u64 = 3;

/// Builds a [`Reader`] with a custom configuration.
///
/// The builder can be deserialized with `serde`, missing keys taking their
/// default value, so that it can be loaded from any configuration format.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderBuilder {
    delimiter: String,
    enclosure: Option<String>,
    escape: Option<String>,
    encoding: Option<String>,
    has_headers: bool,
    newlines_in_fields: bool,
    file_format: FileFormat,
    buffer_capacity: usize,
    fields: Vec<Field>,
    filename_field: Option<String>,
    row_number_field: Option<String>,
    lazy_conversion: bool,
    parallel: bool,
    error_handling: bool,
    #[serde(skip)]
    converter: Option<Arc<dyn Converter + Send + Sync>>,
}

impl Default for ReaderBuilder {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
            enclosure: Some("\"".to_string()),
            escape: None,
            encoding: None,
            has_headers: true,
            newlines_in_fields: false,
            file_format: FileFormat::Mixed,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            fields: Vec::new(),
            filename_field: None,
            row_number_field: None,
            lazy_conversion: true,
            parallel: false,
            error_handling: false,
            converter: None,
        }
    }
}

impl fmt::Debug for ReaderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderBuilder")
            .field("delimiter", &self.delimiter)
            .field("enclosure", &self.enclosure)
            .field("escape", &self.escape)
            .field("encoding", &self.encoding)
            .field("has_headers", &self.has_headers)
            .field("newlines_in_fields", &self.newlines_in_fields)
            .field("file_format", &self.file_format)
            .field("buffer_capacity", &self.buffer_capacity)
            .field("fields", &self.fields)
            .field("filename_field", &self.filename_field)
            .field("row_number_field", &self.row_number_field)
            .field("lazy_conversion", &self.lazy_conversion)
            .field("parallel", &self.parallel)
            .field("error_handling", &self.error_handling)
            .finish_non_exhaustive()
    }
}

impl ReaderBuilder {
    /// Create a new [`ReaderBuilder`] with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`ReaderBuilder`] with provided `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut reader = Self::default();
        reader.buffer_capacity(capacity);
        reader
    }

    /// Set the delimiter, which can be any non-empty string.
    ///
    /// Will default to a comma.
    pub fn delimiter(&mut self, delimiter: &str) -> &mut Self {
        self.delimiter = delimiter.to_string();
        self
    }

    /// Set the enclosure. `None`, or an empty string, disables enclosures
    /// altogether.
    ///
    /// Will default to a double quote.
    pub fn enclosure(&mut self, enclosure: Option<&str>) -> &mut Self {
        self.enclosure = enclosure.map(str::to_string);
        self
    }

    /// Set the escape character used when reading header names.
    pub fn escape(&mut self, escape: Option<&str>) -> &mut Self {
        self.escape = escape.map(str::to_string);
        self
    }

    /// Set the encoding of the data, using any label known to the
    /// [WHATWG Encoding Standard](https://encoding.spec.whatwg.org/).
    ///
    /// Will default to UTF-8.
    pub fn encoding(&mut self, label: &str) -> &mut Self {
        self.encoding = Some(label.to_string());
        self
    }

    /// Indicate whether the first line of each file is a header, in which
    /// case fields are mapped to the schema by name.
    ///
    /// Will default to `true`.
    pub fn has_headers(&mut self, yes: bool) -> &mut Self {
        self.has_headers = yes;
        self
    }

    /// Indicate whether unenclosed newlines may appear in any field but the
    /// last one of a row.
    ///
    /// Will default to `false`.
    pub fn newlines_in_fields(&mut self, yes: bool) -> &mut Self {
        self.newlines_in_fields = yes;
        self
    }

    /// Restrict the accepted line terminators. Any other terminator found
    /// is returned as an error.
    ///
    /// Will default to [`FileFormat::Mixed`].
    pub fn file_format(&mut self, format: FileFormat) -> &mut Self {
        self.file_format = format;
        self
    }

    /// Set the number of bytes read from files at once.
    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Set the output schema.
    pub fn fields<I: IntoIterator<Item = Field>>(&mut self, fields: I) -> &mut Self {
        self.fields = fields.into_iter().collect();
        self
    }

    /// Append a field to the output schema.
    pub fn field(&mut self, field: Field) -> &mut Self {
        self.fields.push(field);
        self
    }

    /// Add a column holding the name of the file each row comes from.
    pub fn filename_field(&mut self, name: Option<&str>) -> &mut Self {
        self.filename_field = name.map(str::to_string);
        self
    }

    /// Add a column holding the number of each row within its file,
    /// starting at 1.
    pub fn row_number_field(&mut self, name: Option<&str>) -> &mut Self {
        self.row_number_field = name.map(str::to_string);
        self
    }

    /// Indicate whether fields should be left as [`Value::Raw`] bytes
    /// instead of being converted to their declared type.
    ///
    /// Will default to `true`.
    pub fn lazy_conversion(&mut self, yes: bool) -> &mut Self {
        self.lazy_conversion = yes;
        self
    }

    /// Indicate whether workers should split the file set between them. When
    /// `false`, every reader reads everything.
    ///
    /// Will default to `false`.
    pub fn parallel(&mut self, yes: bool) -> &mut Self {
        self.parallel = yes;
        self
    }

    /// Indicate whether rows with conversion failures should be reported as
    /// [`ParseOutcome::ConversionFailure`]. When `false`, the first failure
    /// of a row is returned as an error instead.
    ///
    /// Will default to `false`.
    pub fn error_handling(&mut self, yes: bool) -> &mut Self {
        self.error_handling = yes;
        self
    }

    /// Set the converter used when conversion is not lazy.
    ///
    /// Will default to [`DefaultConverter`].
    pub fn converter<C: Converter + Send + Sync + 'static>(&mut self, converter: C) -> &mut Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// Resolve the dialect described by this builder.
    pub fn dialect(&self) -> Result<Dialect> {
        Dialect::resolve(
            &self.delimiter,
            self.enclosure.as_deref(),
            self.escape.as_deref(),
            self.encoding.as_deref(),
            self.has_headers,
            self.newlines_in_fields,
        )
        .map(|dialect| dialect.with_file_format(self.file_format))
    }

    /// Names of the columns of the rows produced by the created readers.
    pub fn output_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|field| field.name.as_str())
            .chain(self.filename_field.as_deref())
            .chain(self.row_number_field.as_deref())
            .collect()
    }

    /// Open a [`Reader`] over local files, for worker `worker` out of
    /// `workers`.
    pub fn open<I, P>(&self, files: I, worker: usize, workers: usize) -> Result<Reader>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.open_with(LocalFileSystem, files, worker, workers)
    }

    /// Open a [`Reader`] over files served by the given [`FileSystem`].
    pub fn open_with<F, I, P>(
        &self,
        fs: F,
        files: I,
        worker: usize,
        workers: usize,
    ) -> Result<Reader<F>>
    where
        F: FileSystem,
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let dialect = self.dialect()?;
        let files = files
            .into_iter()
            .map(|path| path.as_ref().to_path_buf())
            .collect::<Vec<_>>();

        let sizes = files
            .iter()
            .map(|path| fs.size(path))
            .collect::<std::io::Result<Vec<_>>>()?;

        let parallel = self.parallel && workers > 1;

        let plan = if parallel {
            PartitionPlan::compute(&sizes, worker, workers, dialect.encoding_type().width())?
        } else if workers == 0 || worker >= workers {
            return Err(Error::new(ErrorKind::InvalidWorker {
                ordinal: worker,
                count: workers,
            }));
        } else {
            PartitionPlan::whole(&sizes)
        };

        debug!(
            "worker {}/{}: {} file(s), bytes [{}, {}) of {}",
            worker,
            workers,
            files.len(),
            plan.range_start,
            plan.range_end,
            plan.total_size
        );

        let assembler = RowAssembler {
            scanner: FieldScanner::new(&dialect),
            width: self.fields.len()
                + self.filename_field.is_some() as usize
                + self.row_number_field.is_some() as usize,
            filename_index: self.filename_field.as_ref().map(|_| self.fields.len()),
            row_number_index: self
                .row_number_field
                .as_ref()
                .map(|_| self.fields.len() + self.filename_field.is_some() as usize),
            fields: self.fields.clone(),
            lazy_conversion: self.lazy_conversion,
            error_handling: self.error_handling,
            converter: self
                .converter
                .clone()
                .unwrap_or_else(|| Arc::new(DefaultConverter)),
            scratch: Vec::new(),
            dialect,
        };

        let mut reader = Reader {
            fs,
            files,
            plan,
            parallel,
            buffer_capacity: self.buffer_capacity,
            next_file: 0,
            consumed: 0,
            current: None,
            done: false,
            assembler,
        };

        match plan.start {
            Some(start) => {
                reader.next_file = start.file_index + 1;
                reader.open_file(start.file_index, start.offset)?;
            }
            None => reader.done = true,
        }

        Ok(reader)
    }
}

struct OpenFile<H> {
    window: ByteWindow<H>,
    mapping: FieldsMapping,
    name: String,
    row_number: u64,
}

/// Drives the field scanner across a row.
struct RowAssembler {
    dialect: Dialect,
    scanner: FieldScanner,
    fields: Vec<Field>,
    width: usize,
    filename_index: Option<usize>,
    row_number_index: Option<usize>,
    lazy_conversion: bool,
    error_handling: bool,
    converter: Arc<dyn Converter + Send + Sync>,
    scratch: Vec<u8>,
}

impl RowAssembler {
    fn store(&self, index: usize, row: &mut Row, failures: &mut Vec<FieldFailure>) {
        let raw = &self.scratch;

        if self.lazy_conversion {
            row.set(index, (!raw.is_empty()).then(|| Value::Raw(raw.clone())));
            return;
        }

        match self
            .converter
            .convert(raw, self.dialect.encoding(), &self.fields[index])
        {
            Ok(value) => row.set(index, value),
            Err(cause) => failures.push(FieldFailure {
                index,
                raw: raw.clone(),
                cause,
            }),
        }
    }

    fn assemble<H: std::io::Read>(&mut self, file: &mut OpenFile<H>) -> Result<ParseOutcome> {
        let mut row = Row::with_len(self.width);
        let mut failures = Vec::new();

        let arity = file.mapping.len();
        let mut ordinal: usize = 0;

        // NOTE: fields past the mapping's arity are still scanned, so that
        // enclosures are honored, but are discarded.
        loop {
            let is_last = ordinal + 1 >= arity;
            let terminator = self
                .scanner
                .scan_field(&mut file.window, is_last, &mut self.scratch)?;

            if let Some(index) = file.mapping.schema_index(ordinal) {
                if index < self.fields.len() {
                    self.store(index, &mut row, &mut failures);
                }
            }

            ordinal += 1;

            if terminator != Terminator::Delimiter {
                break;
            }
        }

        if let Some(index) = self.filename_index {
            row.set(index, Some(Value::String(file.name.clone())));
        }

        if let Some(index) = self.row_number_index {
            row.set(index, Some(Value::Integer(file.row_number as i64)));
        }

        if failures.is_empty() {
            return Ok(ParseOutcome::Row(row));
        }

        if self.error_handling {
            return Ok(ParseOutcome::ConversionFailure { row, failures });
        }

        let count = failures.len();
        let first = failures.swap_remove(0);

        Err(Error::new(ErrorKind::Conversion {
            row: file.row_number,
            field: first.index,
            count,
            source: first.cause,
        }))
    }
}

/// A reader producing the rows of its share of an ordered set of files.
///
/// Every worker of a parallel run opens its own [`Reader`] with the same
/// file list: readers never communicate, and each row is produced by
/// exactly one of them.
pub struct Reader<F: FileSystem = LocalFileSystem> {
    fs: F,
    files: Vec<PathBuf>,
    plan: PartitionPlan,
    parallel: bool,
    buffer_capacity: usize,
    next_file: usize,
    consumed: u64,
    current: Option<OpenFile<F::Handle>>,
    done: bool,
    assembler: RowAssembler,
}

impl<F: FileSystem> Reader<F> {
    fn open_file(&mut self, index: usize, offset: u64) -> Result<()> {
        let path = &self.files[index];
        let dialect = &self.assembler.dialect;
        let line_end = self.assembler.scanner.line_end();

        let mut handle = self.fs.open(path)?;
        let len = handle.seek(SeekFrom::End(0))?;

        if offset > len {
            return Err(Error::new(ErrorKind::Partition {
                path: path.clone(),
                offset,
                len,
            }));
        }

        debug!("opening {} at byte {}", path.display(), offset);

        let mapping = if dialect.has_headers() {
            let names = read_header_names(self.fs.open(path)?, dialect)?;

            debug!("header of {}: {:?}", path.display(), names);

            FieldsMapping::named(
                &names,
                &self
                    .assembler
                    .fields
                    .iter()
                    .map(|field| field.name.as_str())
                    .collect::<Vec<_>>(),
            )
        } else {
            FieldsMapping::positional(self.assembler.fields.len())
        };

        handle.seek(SeekFrom::Start(0))?;

        let mut head = Vec::with_capacity(MAX_BOM_LEN as usize + 1);
        (&mut handle).take(MAX_BOM_LEN + 1).read_to_end(&mut head)?;

        let bom = bom_len(dialect.encoding(), &head) as u64;

        // NOTE: offsets falling within the BOM, or right after it, are
        // treated as the head of the file, the first line starting there.
        let window = if offset <= bom {
            handle.seek(SeekFrom::Start(offset))?;

            let mut window = ByteWindow::with_capacity(self.buffer_capacity, handle);

            if bom > 0 {
                debug!("skipping {} byte BOM of {}", bom, path.display());
                window.advance_by((bom - offset) as usize, true)?;
                window.commit();
            }

            if dialect.has_headers() && !window.ensure_available()? {
                let mut ignored = Vec::new();

                while self
                    .assembler
                    .scanner
                    .scan_field(&mut window, true, &mut ignored)?
                    == Terminator::Delimiter
                {}

                debug!(
                    "skipped header of {} ({} bytes)",
                    path.display(),
                    window.bytes_read()
                );
            }

            window
        } else {
            let newlines = newlines_before(&mut handle, offset, line_end)?;
            handle.seek(SeekFrom::Start(offset))?;

            let mut window = ByteWindow::with_capacity(self.buffer_capacity, handle);
            let paired = dialect.file_format() != FileFormat::Unix;
            skip_partial_line(&mut window, line_end, newlines, paired)?;

            window
        };

        self.current = Some(OpenFile {
            window,
            mapping,
            name: path.to_string_lossy().into_owned(),
            row_number: 0,
        });

        Ok(())
    }

    fn close_file(&mut self) {
        if let Some(file) = self.current.take() {
            debug!("closing {}", file.name);
            self.consumed += file.window.bytes_read();
        }
    }

    fn budget_exhausted(&self) -> bool {
        if !self.parallel {
            return false;
        }

        let read = self.consumed
            + self
                .current
                .as_ref()
                .map_or(0, |file| file.window.bytes_read());

        read >= self.plan.bytes_to_read()
    }

    /// Read the next row.
    ///
    /// Once [`ParseOutcome::EndOfInput`] is returned, every subsequent call
    /// returns it too.
    pub fn next(&mut self) -> Result<ParseOutcome> {
        loop {
            if self.done {
                return Ok(ParseOutcome::EndOfInput);
            }

            if self.budget_exhausted() {
                debug!("byte budget of {} exhausted", self.plan.bytes_to_read());
                self.close();
                continue;
            }

            let file = match self.current.as_mut() {
                Some(file) => file,
                None => {
                    if self.next_file < self.files.len() {
                        let index = self.next_file;
                        self.next_file += 1;
                        self.open_file(index, 0)?;
                    } else {
                        self.close();
                    }

                    continue;
                }
            };

            if file.mapping.is_empty() || file.window.ensure_available()? {
                self.close_file();
                continue;
            }

            file.row_number += 1;

            return self.assembler.assemble(file);
        }
    }

    /// Stop reading, releasing the current file. Every subsequent call to
    /// [`Reader::next`] returns [`ParseOutcome::EndOfInput`].
    pub fn close(&mut self) {
        self.close_file();
        self.done = true;
    }

    /// Iterate over outcomes until the end of input. Iteration stops after
    /// the first error.
    pub fn outcomes(&mut self) -> Outcomes<'_, F> {
        Outcomes { reader: self }
    }

    /// The partition plan of this reader.
    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    /// The resolved dialect.
    pub fn dialect(&self) -> &Dialect {
        &self.assembler.dialect
    }
}

pub struct Outcomes<'r, F: FileSystem> {
    reader: &'r mut Reader<F>,
}

impl<F: FileSystem> Iterator for Outcomes<'_, F> {
    type Item = Result<ParseOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.next() {
            Ok(ParseOutcome::EndOfInput) => None,
            Ok(outcome) => Some(Ok(outcome)),
            Err(err) => {
                self.reader.close();
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::convert::{ConversionError, FieldType};
    use crate::fs::MemoryFileSystem;
    use crate::writer::Writer;

    use super::*;

    fn memory(files: &[(&str, &[u8])]) -> MemoryFileSystem {
        let mut fs = MemoryFileSystem::new();

        for (path, data) in files {
            fs.insert(*path, *data);
        }

        fs
    }

    fn collect<F: FileSystem>(reader: &mut Reader<F>) -> Result<Vec<Row>> {
        reader
            .outcomes()
            .map(|outcome| outcome.map(|o| o.into_row().unwrap()))
            .collect()
    }

    #[test]
    fn test_end_to_end() -> Result<()> {
        let fs = memory(&[("data.csv", b"id,name\n1,\"Ann\"\n2,\"O\"\"Brien\"\n")]);

        for capacity in [32, 4, 3, 2, 1] {
            let mut reader = ReaderBuilder::with_capacity(capacity)
                .field(Field::new("id", FieldType::Integer))
                .field(Field::new("name", FieldType::String))
                .lazy_conversion(false)
                .open_with(&fs, ["data.csv"], 0, 1)?;

            let rows = collect(&mut reader)?;

            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].get(0), Some(&Value::Integer(1)));
            assert_eq!(rows[0].get(1), Some(&Value::String("Ann".to_string())));
            assert_eq!(rows[1].get(0), Some(&Value::Integer(2)));
            assert_eq!(
                rows[1].get(1),
                Some(&Value::String("O\"Brien".to_string()))
            );

            assert!(reader.next()?.is_end());
        }

        Ok(())
    }

    #[test]
    fn test_header_mapping() -> Result<()> {
        let fs = memory(&[("data.csv", b"\xef\xbb\xbfb,extra,a\r\n1,x,2\r\n")]);

        let mut reader = ReaderBuilder::new()
            .fields([
                Field::new("a", FieldType::Integer),
                Field::new("b", FieldType::Integer),
            ])
            .lazy_conversion(false)
            .open_with(&fs, ["data.csv"], 0, 1)?;

        let rows = collect(&mut reader)?;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0), Some(&Value::Integer(2)));
        assert_eq!(rows[0].get(1), Some(&Value::Integer(1)));

        Ok(())
    }

    #[test]
    fn test_missing_trailing_fields() -> Result<()> {
        let fs = memory(&[("data.csv", b"a,b,c\n1\n2,3\n\n\n")]);

        let mut reader = ReaderBuilder::with_capacity(3)
            .fields(["a", "b", "c"].map(|name| Field::new(name, FieldType::String)))
            .open_with(&fs, ["data.csv"], 0, 1)?;

        let first = reader.next()?.into_row().unwrap();
        assert_eq!(first.get(0), Some(&Value::Raw(b"1".to_vec())));
        assert_eq!(first.get(1), None);
        assert_eq!(first.get(2), None);

        let second = reader.next()?.into_row().unwrap();
        assert_eq!(second.get(1), Some(&Value::Raw(b"3".to_vec())));
        assert_eq!(second.get(2), None);

        // NOTE: the first newline after `2,3\n` belongs to its terminator,
        // the next one is a row of its own.
        let third = reader.next()?.into_row().unwrap();
        assert!(third.iter().all(Option::is_none));

        assert_eq!(reader.next()?, ParseOutcome::EndOfInput);
        assert_eq!(reader.next()?, ParseOutcome::EndOfInput);

        Ok(())
    }

    #[test]
    fn test_blank_lines_are_rows() -> Result<()> {
        let fs = memory(&[("data.csv", b"a\n1\n\n\n2")]);

        for capacity in [32, 4, 3, 2, 1] {
            let mut reader = ReaderBuilder::with_capacity(capacity)
                .field(Field::new("a", FieldType::String))
                .row_number_field(Some("row"))
                .open_with(&fs, ["data.csv"], 0, 1)?;

            let rows = collect(&mut reader)?;

            assert_eq!(rows.len(), 3);
            assert_eq!(rows[0].get(0), Some(&Value::Raw(b"1".to_vec())));
            assert_eq!(rows[1].get(0), None);
            assert_eq!(rows[1].get(1), Some(&Value::Integer(2)));
            assert_eq!(rows[2].get(0), Some(&Value::Raw(b"2".to_vec())));
            assert_eq!(rows[2].get(1), Some(&Value::Integer(3)));
        }

        Ok(())
    }

    #[test]
    fn test_file_formats() -> Result<()> {
        let fs = memory(&[("dos.csv", b"a\r\n1\r\n2\n"), ("unix.csv", b"a\n1\r\n2\n")]);

        let mut builder = ReaderBuilder::new();
        builder.field(Field::new("a", FieldType::String));

        for path in ["dos.csv", "unix.csv"] {
            let mut reader = builder.open_with(&fs, [path], 0, 1)?;
            assert_eq!(collect(&mut reader)?.len(), 2);
        }

        let mut reader = builder
            .file_format(FileFormat::Dos)
            .open_with(&fs, ["dos.csv"], 0, 1)?;

        assert!(!reader.next()?.is_end());

        match reader.next() {
            Err(err) => assert!(matches!(
                err.kind(),
                ErrorKind::LineTerminator {
                    expected: FileFormat::Dos,
                    found: "LF"
                }
            )),
            Ok(outcome) => panic!("expected a line terminator error, got {:?}", outcome),
        }

        let mut reader = builder
            .file_format(FileFormat::Unix)
            .open_with(&fs, ["unix.csv"], 0, 1)?;

        assert!(matches!(
            reader.next().map_err(Error::into_kind),
            Err(ErrorKind::LineTerminator {
                expected: FileFormat::Unix,
                found: "CR"
            })
        ));

        Ok(())
    }

    #[test]
    fn test_extra_fields_are_discarded() -> Result<()> {
        let fs = memory(&[("data.csv", b"1,2,\"3\n,4\",5\n6\n")]);

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .fields(["a", "b"].map(|name| Field::new(name, FieldType::String)))
            .lazy_conversion(false)
            .open_with(&fs, ["data.csv"], 0, 1)?;

        let rows = collect(&mut reader)?;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(1), Some(&Value::String("2".to_string())));
        assert_eq!(rows[1].get(0), Some(&Value::String("6".to_string())));

        Ok(())
    }

    #[test]
    fn test_empty_files() -> Result<()> {
        let fs = memory(&[("empty.csv", b""), ("header.csv", b"a\n"), ("data.csv", b"a\nx\n")]);

        let mut reader = ReaderBuilder::new()
            .field(Field::new("a", FieldType::String))
            .filename_field(Some("file"))
            .open_with(&fs, ["empty.csv", "header.csv", "data.csv"], 0, 1)?;

        let rows = collect(&mut reader)?;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(1), Some(&Value::String("data.csv".to_string())));

        Ok(())
    }

    #[test]
    fn test_synthetic_columns() -> Result<()> {
        let fs = memory(&[("a.csv", b"x\n1\n2\n"), ("b.csv", b"x\n3\n")]);

        let mut builder = ReaderBuilder::new();
        builder
            .field(Field::new("x", FieldType::Integer))
            .filename_field(Some("file"))
            .row_number_field(Some("row"))
            .lazy_conversion(false);

        assert_eq!(builder.output_names(), vec!["x", "file", "row"]);

        let mut reader = builder.open_with(&fs, ["a.csv", "b.csv"], 0, 1)?;

        let rows = collect(&mut reader)?
            .into_iter()
            .map(|row| {
                (
                    row.get(0).and_then(Value::as_integer).unwrap(),
                    row.get(1).and_then(Value::as_str).unwrap().to_string(),
                    row.get(2).and_then(Value::as_integer).unwrap(),
                )
            })
            .collect::<Vec<_>>();

        assert_eq!(
            rows,
            vec![
                (1, "a.csv".to_string(), 1),
                (2, "a.csv".to_string(), 2),
                (3, "b.csv".to_string(), 1)
            ]
        );

        Ok(())
    }

    #[test]
    fn test_conversion_failures() -> Result<()> {
        let fs = memory(&[("data.csv", b"id,flag\n1,yes\nx,maybe\n3,no\n")]);

        let mut builder = ReaderBuilder::new();
        builder
            .fields([
                Field::new("id", FieldType::Integer),
                Field::new("flag", FieldType::Boolean),
            ])
            .lazy_conversion(false)
            .error_handling(true);

        let mut reader = builder.open_with(&fs, ["data.csv"], 0, 1)?;

        assert!(matches!(reader.next()?, ParseOutcome::Row(_)));

        match reader.next()? {
            ParseOutcome::ConversionFailure { row, failures } => {
                assert_eq!(row.len(), 2);
                assert_eq!(row.get(0), None);
                assert_eq!(row.get(1), None);
                assert_eq!(
                    failures.iter().map(|f| f.index).collect::<Vec<_>>(),
                    vec![0, 1]
                );
                assert_eq!(failures[0].raw, b"x");
            }
            outcome => panic!("unexpected outcome {:?}", outcome),
        }

        assert!(matches!(reader.next()?, ParseOutcome::Row(_)));

        // Without error handling, the first failure is escalated
        let mut reader = builder
            .error_handling(false)
            .open_with(&fs, ["data.csv"], 0, 1)?;

        reader.next()?;

        match reader.next().unwrap_err().into_kind() {
            ErrorKind::Conversion {
                row, field, count, ..
            } => {
                assert_eq!((row, field, count), (2, 0, 2));
            }
            kind => panic!("unexpected error {:?}", kind),
        }

        Ok(())
    }

    #[test]
    fn test_custom_converter() -> Result<()> {
        struct Shouting;

        impl Converter for Shouting {
            fn convert(
                &self,
                raw: &[u8],
                _encoding: &'static encoding_rs::Encoding,
                field: &Field,
            ) -> std::result::Result<Option<Value>, ConversionError> {
                if raw.is_empty() {
                    return Err(ConversionError::new("", field.kind, "empty"));
                }

                Ok(Some(Value::String(
                    String::from_utf8_lossy(raw).to_uppercase(),
                )))
            }
        }

        let fs = memory(&[("data.csv", b"hello\n")]);

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .field(Field::new("word", FieldType::String))
            .lazy_conversion(false)
            .converter(Shouting)
            .open_with(&fs, ["data.csv"], 0, 1)?;

        assert_eq!(
            reader.next()?.into_row().unwrap().get(0),
            Some(&Value::String("HELLO".to_string()))
        );

        Ok(())
    }

    #[test]
    fn test_invalid_configuration() {
        let fs = memory(&[("data.csv", b"a\n")]);

        let err = ReaderBuilder::new()
            .encoding("klingon")
            .open_with(&fs, ["data.csv"], 0, 1)
            .err()
            .unwrap();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedEncoding { .. }));

        let err = ReaderBuilder::new()
            .open_with(&fs, ["data.csv"], 1, 1)
            .err()
            .unwrap();
        assert!(matches!(err.kind(), ErrorKind::InvalidWorker { .. }));

        let err = ReaderBuilder::new()
            .open_with(&fs, ["missing.csv"], 0, 1)
            .err()
            .unwrap();
        assert!(err.is_io_error());
    }

    #[test]
    fn test_partition_error() -> Result<()> {
        // Sizes are taken from one file system, files opened on another
        struct Shrinking(MemoryFileSystem, MemoryFileSystem);

        impl FileSystem for Shrinking {
            type Handle = <MemoryFileSystem as FileSystem>::Handle;

            fn open(&self, path: &Path) -> std::io::Result<Self::Handle> {
                self.1.open(path)
            }

            fn size(&self, path: &Path) -> std::io::Result<u64> {
                self.0.size(path)
            }
        }

        let fs = Shrinking(
            memory(&[("data.csv", &[b'x'; 100])]),
            memory(&[("data.csv", &[b'x'; 10])]),
        );

        let err = ReaderBuilder::new()
            .parallel(true)
            .open_with(fs, ["data.csv"], 1, 2)
            .err()
            .unwrap();

        assert!(matches!(
            err.kind(),
            ErrorKind::Partition {
                offset: 50,
                len: 10,
                ..
            }
        ));

        Ok(())
    }

    #[test]
    fn test_encodings_and_line_endings() -> Result<()> {
        for encoding in ["utf-8", "utf-16be", "utf-16le", "windows-1252"] {
            for newline in ["\n", "\r\n", "\r"] {
                let mut builder = ReaderBuilder::with_capacity(3);
                builder
                    .encoding(encoding)
                    .fields(["k", "v"].map(|name| Field::new(name, FieldType::String)))
                    .lazy_conversion(false);

                let dialect = builder.dialect()?;
                let mut writer = Writer::with_capacity(Vec::new(), 16, &dialect)?;
                writer.newline(newline)?;
                writer.write_bom()?;
                writer.write_record(["k", "v"])?;
                writer.write_record(["é", "a,b"])?;
                writer.write_record(["2", "say \"hi\""])?;

                let fs = memory(&[("data.csv", &writer.into_inner()?)]);
                let mut reader = builder.open_with(&fs, ["data.csv"], 0, 1)?;

                let rows = collect(&mut reader)?
                    .into_iter()
                    .map(|row| {
                        row.iter()
                            .map(|value| value.as_ref().and_then(Value::as_str).unwrap())
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>();

                assert_eq!(
                    rows,
                    vec![vec!["é", "a,b"], vec!["2", "say \"hi\""]],
                    "encoding={} newline={:?}",
                    encoding,
                    newline
                );
            }
        }

        Ok(())
    }

    fn fixture(dialect: &Dialect, file: usize, rows: usize, newline: &str) -> Result<Vec<u8>> {
        let mut writer = Writer::with_capacity(Vec::new(), 64, dialect)?;
        writer.newline(newline)?;
        writer.write_bom()?;
        writer.write_record(["id", "name", "note"])?;

        for i in 0..rows {
            let id = (file * 1000 + i).to_string();
            let name = "n".repeat(i % 7);
            let note = match i % 4 {
                0 => String::new(),
                1 => format!("x,{}", i),
                2 => format!("\"q{}\"", i),
                _ => "plain".to_string(),
            };

            writer.write_record([id.as_str(), name.as_str(), note.as_str()])?;

            if i % 5 == 3 {
                writer.write_raw_newline()?;
            }
        }

        writer.into_inner()
    }

    fn read_keys(
        builder: &ReaderBuilder,
        fs: &MemoryFileSystem,
        files: &[&str],
        worker: usize,
        workers: usize,
    ) -> Result<Vec<(String, Option<i64>, Option<String>)>> {
        let mut reader = builder.open_with(fs, files, worker, workers)?;

        collect(&mut reader).map(|rows| {
            rows.into_iter()
                .map(|row| {
                    (
                        row.get(3).and_then(Value::as_str).unwrap().to_string(),
                        row.get(0).and_then(Value::as_integer),
                        row.get(2).and_then(Value::as_str).map(str::to_string),
                    )
                })
                .collect()
        })
    }

    #[test]
    fn test_partition_coverage() -> Result<()> {
        let files = ["a.csv", "b.csv", "c.csv", "d.csv"];
        let row_counts = [23, 0, 1, 41];

        for encoding in ["utf-8", "utf-16be", "utf-16le"] {
            for newline in ["\n", "\r\n", "\r"] {
                let mut builder = ReaderBuilder::with_capacity(5);
                builder
                    .encoding(encoding)
                    .fields([
                        Field::new("id", FieldType::Integer),
                        Field::new("name", FieldType::String),
                        Field::new("note", FieldType::String),
                    ])
                    .filename_field(Some("file"))
                    .lazy_conversion(false)
                    .parallel(true);

                let dialect = builder.dialect()?;
                let mut fs = MemoryFileSystem::new();

                for (i, (path, rows)) in files.iter().zip(row_counts).enumerate() {
                    fs.insert(*path, fixture(&dialect, i, rows, newline)?);
                }

                let single = read_keys(&builder, &fs, &files, 0, 1)?;

                // NOTE: an extra newline after a CRLF terminator is a blank row
                let ids = single.iter().filter(|key| key.1.is_some()).count();
                assert_eq!(ids, row_counts.iter().sum::<usize>());
                assert_eq!(single.len() > ids, newline == "\r\n");
                assert_eq!(single[0].1, Some(0));
                assert_eq!(single[1].2.as_deref(), Some("x,1"));
                assert_eq!(single[2].2.as_deref(), Some("\"q2\""));

                for workers in 2..=9 {
                    let mut union = Vec::new();

                    for worker in 0..workers {
                        union.extend(read_keys(&builder, &fs, &files, worker, workers)?);
                    }

                    assert_eq!(
                        union, single,
                        "encoding={} newline={:?} workers={}",
                        encoding, newline, workers
                    );
                }
            }
        }

        Ok(())
    }

    fn ids<F: FileSystem>(reader: &mut Reader<F>) -> Result<Vec<Option<i64>>> {
        Ok(collect(reader)?
            .iter()
            .map(|row| row.get(0).and_then(Value::as_integer))
            .collect())
    }

    #[test]
    fn test_partition_coverage_at_every_boundary() -> Result<()> {
        // Every possible start offset of a two-worker split
        let data = b"h\r\n1\r\n\r\n22\n\n333\r4\n";
        let fs = memory(&[("data.csv", data)]);

        let mut builder = ReaderBuilder::with_capacity(2);
        builder
            .field(Field::new("h", FieldType::Integer))
            .lazy_conversion(false)
            .parallel(true);

        let expected = vec![Some(1), None, Some(22), Some(333), Some(4)];

        for workers in 2..=data.len() {
            let mut union = Vec::new();

            for worker in 0..workers {
                let mut reader = builder.open_with(&fs, ["data.csv"], worker, workers)?;
                union.extend(ids(&mut reader)?);
            }

            assert_eq!(union, expected, "workers={}", workers);
        }

        Ok(())
    }

    #[test]
    fn test_partition_coverage_with_bom() -> Result<()> {
        for encoding in ["utf-8", "utf-16le"] {
            let mut builder = ReaderBuilder::with_capacity(3);
            builder
                .encoding(encoding)
                .field(Field::new("h", FieldType::Integer))
                .lazy_conversion(false)
                .parallel(true);

            let dialect = builder.dialect()?;
            let mut writer = Writer::with_capacity(Vec::new(), 16, &dialect)?;
            writer.write_bom()?;
            writer.write_record(["h"])?;
            writer.write_record(["1"])?;
            writer.write_record(["22"])?;

            let data = writer.into_inner()?;
            let fs = memory(&[("data.csv", data.as_slice())]);

            for workers in 1..=data.len() {
                let mut union = Vec::new();

                for worker in 0..workers {
                    let mut reader = builder.open_with(&fs, ["data.csv"], worker, workers)?;
                    union.extend(ids(&mut reader)?);
                }

                assert_eq!(union, vec![Some(1), Some(22)], "{} workers={}", encoding, workers);
            }
        }

        Ok(())
    }

    #[test]
    fn test_partition_coverage_after_odd_sized_file() -> Result<()> {
        let mut builder = ReaderBuilder::with_capacity(3);
        builder
            .encoding("utf-16le")
            .has_headers(false)
            .field(Field::new("h", FieldType::String))
            .lazy_conversion(false)
            .parallel(true);

        let dialect = builder.dialect()?;
        let mut writer = Writer::with_capacity(Vec::new(), 16, &dialect)?;
        writer.newline("\r\n")?;

        for id in ["1", "22", "333", "4444"] {
            writer.write_record([id])?;
        }

        // A truncated code unit shifts every later boundary to an odd
        // global offset.
        let fs = memory(&[("a.csv", b"x"), ("b.csv", writer.into_inner()?.as_slice())]);
        let files = ["a.csv", "b.csv"];
        let total = fs.size(Path::new("a.csv"))? + fs.size(Path::new("b.csv"))?;

        let read = |worker: usize, workers: usize| -> Result<Vec<Option<String>>> {
            let mut reader = builder.open_with(&fs, files, worker, workers)?;

            Ok(collect(&mut reader)?
                .iter()
                .map(|row| row.get(0).and_then(Value::as_str).map(str::to_string))
                .collect())
        };

        let single = read(0, 1)?;

        assert_eq!(single.len(), 5);
        assert_eq!(
            single[1..].iter().map(Option::as_deref).collect::<Vec<_>>(),
            vec![Some("1"), Some("22"), Some("333"), Some("4444")]
        );

        for workers in 2..=total as usize {
            let mut union = Vec::new();

            for worker in 0..workers {
                union.extend(read(worker, workers)?);
            }

            assert_eq!(union, single, "workers={}", workers);
        }

        Ok(())
    }

    #[test]
    fn test_non_parallel_workers_read_everything() -> Result<()> {
        let fs = memory(&[("data.csv", b"a\n1\n2\n")]);

        let mut builder = ReaderBuilder::new();
        builder.field(Field::new("a", FieldType::String));

        for worker in 0..3 {
            let mut reader = builder.open_with(&fs, ["data.csv"], worker, 3)?;
            assert_eq!(collect(&mut reader)?.len(), 2);
        }

        Ok(())
    }

    #[test]
    fn test_close() -> Result<()> {
        let fs = memory(&[("data.csv", b"a\n1\n2\n")]);

        let mut reader = ReaderBuilder::new()
            .field(Field::new("a", FieldType::String))
            .open_with(&fs, ["data.csv"], 0, 1)?;

        assert!(!reader.next()?.is_end());
        reader.close();
        assert!(reader.next()?.is_end());

        Ok(())
    }

    #[test]
    fn test_deserialize_builder() -> Result<()> {
        let builder: ReaderBuilder = serde_json::from_str(
            r#"{
                "delimiter": ";",
                "encoding": "utf-16le",
                "fields": [{"name": "id", "type": "integer"}],
                "row_number_field": "row",
                "file_format": "dos",
                "parallel": true
            }"#,
        )
        .unwrap();

        assert_eq!(builder.output_names(), vec!["id", "row"]);
        assert!(builder.has_headers);
        assert_eq!(builder.buffer_capacity, DEFAULT_BUFFER_CAPACITY);

        let dialect = builder.dialect()?;
        assert_eq!(dialect.file_format(), FileFormat::Dos);
        assert_eq!(dialect.delimiter(), &[b';', 0]);
        assert_eq!(dialect.enclosure(), Some(&[b'"', 0][..]));

        Ok(())
    }
}
