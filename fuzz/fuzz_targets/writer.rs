#![no_main]

use libfuzzer_sys::fuzz_target;

use partitioned_csv::{MemoryFileSystem, ReaderBuilder, Value, Writer};

fuzz_target!(|cells: Vec<String>| {
    // A leading BOM would be skipped
    if cells.iter().all(|cell| cell.is_empty()) || cells[0].starts_with('\u{feff}') {
        return;
    }

    let mut builder = ReaderBuilder::new();
    builder.has_headers(false).fields(
        (0..cells.len()).map(|i| partitioned_csv::Field::new(i.to_string(), Default::default())),
    );

    let dialect = builder.dialect().unwrap();
    let mut writer = Writer::with_capacity(Vec::new(), 64, &dialect).unwrap();
    writer.write_record(&cells).unwrap();

    let mut fs = MemoryFileSystem::new();
    fs.insert("data.csv", writer.into_inner().unwrap());

    let mut reader = builder.open_with(&fs, ["data.csv"], 0, 1).unwrap();

    if let Some(row) = reader.next().unwrap().into_row() {
        for (i, cell) in cells.iter().enumerate() {
            let expected = (!cell.is_empty()).then(|| Value::Raw(cell.as_bytes().to_vec()));
            assert_eq!(row.get(i), expected.as_ref());
        }
    }
});
