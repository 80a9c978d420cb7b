#![no_main]

use libfuzzer_sys::fuzz_target;

use partitioned_csv::{MemoryFileSystem, ReaderBuilder};

fuzz_target!(|data: &[u8]| {
    let mut fs = MemoryFileSystem::new();
    fs.insert("data.csv", data);

    let mut builder = ReaderBuilder::with_capacity(7);
    builder.has_headers(data.first().is_some_and(|b| b % 2 == 0));

    let mut reader = builder.open_with(&fs, ["data.csv"], 0, 1).unwrap();

    for outcome in reader.outcomes() {
        outcome.unwrap();
    }
});
