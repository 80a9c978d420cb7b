#![no_main]

use libfuzzer_sys::fuzz_target;

use partitioned_csv::{Field, FieldType, MemoryFileSystem, ParseOutcome, ReaderBuilder, Value};

// Rows read by any number of workers must be the rows read by a single one,
// as long as no enclosure spans several lines.
fuzz_target!(|input: (u8, &[u8])| {
    let (workers, data) = input;
    let workers = (workers % 16) as usize + 1;

    let data = data
        .iter()
        .copied()
        .filter(|b| *b != b'"')
        .collect::<Vec<_>>();

    let mut fs = MemoryFileSystem::new();
    fs.insert("data.csv", data);

    let mut builder = ReaderBuilder::with_capacity(5);
    builder
        .has_headers(false)
        .field(Field::new("a", FieldType::String))
        .parallel(true);

    let read = |worker: usize, workers: usize| {
        let mut reader = builder.open_with(&fs, ["data.csv"], worker, workers).unwrap();

        reader
            .outcomes()
            .map(|outcome| match outcome.unwrap() {
                ParseOutcome::Row(row) => row.get(0).and_then(Value::as_bytes).map(<[u8]>::to_vec),
                outcome => panic!("unexpected outcome {:?}", outcome),
            })
            .collect::<Vec<_>>()
    };

    let single = read(0, 1);
    let union = (0..workers)
        .flat_map(|worker| read(worker, workers))
        .collect::<Vec<_>>();

    assert_eq!(single, union);
});
