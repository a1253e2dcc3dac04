use std::fs::File;
use std::io;

use bstr::ByteSlice;
use clap::{Parser, ValueEnum};
use simd_delimited::{BinaryReader, BinaryWriter, ReaderBuilder, Writer};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    /// CSV to binary delimited records
    Encode,
    /// Binary delimited records to CSV
    Decode,
    /// Binary delimited records to a human-readable dump
    Dump,
}

#[derive(Parser, Debug)]
struct Args {
    /// Path to target file
    path: String,

    #[arg(long, value_enum, default_value = "encode")]
    direction: Direction,

    /// CSV delimiter
    #[arg(short, long, default_value_t = ',')]
    delimiter: char,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if !args.delimiter.is_ascii() {
        anyhow::bail!("delimiter must be an ASCII char");
    }

    let file = File::open(&args.path)?;
    let stdout = io::stdout().lock();

    match args.direction {
        Direction::Encode => {
            let mut reader = ReaderBuilder::new()
                .delimiter(args.delimiter as u8)
                .from_reader(file)?;

            let mut writer = BinaryWriter::from_writer(stdout);

            while let Some(record) = reader.read_record()? {
                writer.write_record(record.iter())?;
            }

            writer.flush()?;
        }
        Direction::Decode => {
            let mut reader = BinaryReader::from_reader(file);
            let mut writer = Writer::from_writer(stdout);

            while let Some(record) = reader.read_record()? {
                writer.write_record(record.iter())?;
            }

            writer.flush()?;
        }
        Direction::Dump => {
            let mut reader = BinaryReader::from_reader(file);
            let mut index: u64 = 0;

            while let Some(record) = reader.read_record()? {
                let fields = record
                    .iter()
                    .map(|field| format!("{:?}", field.as_bstr()))
                    .collect::<Vec<_>>();

                println!("{}: [{}]", index, fields.join(", "));
                index += 1;
            }
        }
    }

    Ok(())
}
