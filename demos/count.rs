use std::fs::File;

use clap::{Parser, ValueEnum};
use memmap2::Mmap;
use simd_delimited::{
    searcher_simd_instructions, trim_bom, BinaryReaderBuilder, ByteRecord, ReaderBuilder,
    Searcher, TextReaderBuilder,
};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Csv,
    Text,
    Binary,
}

#[derive(Parser, Debug)]
struct Args {
    /// Path to target file
    path: String,

    /// Format of the file
    #[arg(long, value_enum, default_value = "csv")]
    format: Format,

    /// Use the `csv` crate instead, as a baseline
    #[arg(long)]
    baseline: bool,

    /// Only count newlines over a memory map, ignoring quoting
    #[arg(long)]
    lines: bool,

    /// Reader buffer capacity
    #[arg(long, default_value_t = 1024 * (1 << 10))]
    capacity: usize,
}

impl Args {
    fn delimiter(&self) -> u8 {
        if self.path.ends_with(".tsv") {
            b'\t'
        } else {
            b','
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    eprintln!("simd instructions: {}", searcher_simd_instructions());

    let file = File::open(&args.path)?;

    if args.lines {
        // SAFETY: the file is not expected to be modified while being counted
        let map = unsafe { Mmap::map(&file)? };
        let count = Searcher::new(&[b'\n']).count(trim_bom(&map));

        println!("{}", count);
        return Ok(());
    }

    let count = match args.format {
        Format::Csv if args.baseline => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .delimiter(args.delimiter())
                .from_reader(file);

            let mut record = csv::ByteRecord::new();
            let mut count: u64 = 0;

            while reader.read_byte_record(&mut record)? {
                count += 1;
            }

            count
        }
        Format::Csv => {
            let mut reader = ReaderBuilder::with_capacity(args.capacity)
                .delimiter(args.delimiter())
                .from_reader(file)?;

            let mut record = ByteRecord::new();
            let mut count: u64 = 0;

            while reader.read_byte_record(&mut record)? {
                count += 1;
            }

            count
        }
        Format::Text => TextReaderBuilder::with_capacity(args.capacity)
            .from_reader(file)?
            .count_records()?,
        Format::Binary => BinaryReaderBuilder::with_capacity(args.capacity)
            .from_reader(file)?
            .count_records()?,
    };

    println!("{}", count);

    Ok(())
}
