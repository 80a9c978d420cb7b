/*!
The `partitioned-csv` crate provides a streaming CSV tokenizer able to split
an ordered set of files between any number of parallel workers, without any
coordination between them.

Each worker computes its own byte range from the file sizes alone, seeks
there, drops the partial line it may have landed in and then reads rows until
its byte budget is spent. Every row is produced by exactly one worker: the
one whose range holds the row's first byte.

The tokenizer supports a configurable, possibly non-standard dialect:
delimiters and enclosures of any length, doubled-enclosure escaping, optional
newlines in non-terminal fields, and data encoded in any ASCII-compatible
single-byte encoding as well as UTF-16 (big or little endian).

# Examples

*Reading local files*

```
use partitioned_csv::{Field, FieldType, ReaderBuilder};

let mut reader = ReaderBuilder::new()
    .field(Field::new("id", FieldType::Integer))
    .field(Field::new("name", FieldType::String))
    .lazy_conversion(false)
    .open(["data.csv"], 0, 1)?;

for outcome in reader.outcomes() {
    dbg!(outcome?);
}
```

*Splitting files between 4 workers*

```
use partitioned_csv::ReaderBuilder;

let mut builder = ReaderBuilder::new();
builder.parallel(true).encoding("utf-16le");

std::thread::scope(|scope| {
    for worker in 0..4 {
        let builder = &builder;

        scope.spawn(move || {
            let mut reader = builder.open(["a.csv", "b.csv"], worker, 4)?;
            let count = reader.outcomes().count();
            Ok::<_, partitioned_csv::Error>(count)
        });
    }
});
```

# Design notes

## Byte window

Files are read through a growable window holding every byte that was scanned
but not consumed yet. Refills compact this span at the front of the window
before appending a new chunk, so the window only grows when a single field is
longer than the configured buffer capacity.

## Row boundaries

A field only enters an enclosure when the enclosure is its very first byte:
enclosures found in the middle of a field are regular data. Line terminators
may be LF, CRLF or CR alone. A terminator takes a second newline right after
its own, so that `\n\r` or `\r\r` end a single row. Any newline past those two
starts a blank row, whose fields are all absent. [`FileFormat::Dos`] and
[`FileFormat::Unix`] restrict terminators to CRLF and LF respectively.

Newlines found inside enclosures are regular data, but a worker starting in
the middle of such a field cannot tell, since it never reads what comes
before its range. Files holding multiline fields should therefore not be
read in parallel.

## Headers

When headers are expected, the first line of each file is sniffed
independently and fields are mapped to the schema by name. The header itself
is only skipped by the worker opening the file at its first byte.
*/
mod buffer;
mod convert;
mod dialect;
mod encoding;
mod error;
mod fs;
mod header;
mod mapping;
mod matcher;
mod partition;
mod reader;
mod row;
mod scanner;
mod writer;

pub use convert::{ConversionError, Converter, DefaultConverter, Field, FieldType, TrimType};
pub use dialect::{Dialect, FileFormat};
pub use encoding::{resolve_encoding, EncodingType};
pub use error::{Error, ErrorKind, Result};
pub use fs::{FileSystem, LocalFileSystem, MemoryFileSystem};
pub use mapping::FieldsMapping;
pub use partition::{PartitionPlan, StartPosition};
pub use reader::{Outcomes, Reader, ReaderBuilder};
pub use row::{FieldFailure, ParseOutcome, Row, Value};
pub use writer::Writer;
