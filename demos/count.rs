use clap::Parser;
use partitioned_csv::{ParseOutcome, ReaderBuilder};
use rayon::prelude::*;

#[derive(Parser, Debug)]
struct Args {
    /// Paths to target CSV files, read as a single ordered set
    #[arg(required = true)]
    paths: Vec<String>,

    /// Number of parallel workers
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Field delimiter
    #[arg(short, long, default_value = ",")]
    delimiter: String,

    /// Encoding of the files
    #[arg(short, long, default_value = "utf-8")]
    encoding: String,

    /// Whether the files have no header
    #[arg(long)]
    no_headers: bool,

    /// Optional JSON configuration, overriding every other flag
    #[arg(long)]
    config: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    let builder = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => {
            let mut builder = ReaderBuilder::new();
            builder
                .delimiter(&args.delimiter)
                .encoding(&args.encoding)
                .has_headers(!args.no_headers)
                .parallel(true);
            builder
        }
    };

    let counts = (0..args.workers)
        .into_par_iter()
        .map(|worker| -> anyhow::Result<u64> {
            let mut reader = builder.open(&args.paths, worker, args.workers)?;
            let mut count: u64 = 0;

            loop {
                match reader.next()? {
                    ParseOutcome::EndOfInput => break,
                    _ => count += 1,
                }
            }

            log::info!("worker {} read {} row(s)", worker, count);

            Ok(count)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    println!("{}", counts.iter().sum::<u64>());

    Ok(())
}
