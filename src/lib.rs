/*!
The `simd-delimited` crate provides streaming readers & writers of delimited
data (quoted CSV, plain delimited text and a byte-stuffed binary format) able
to leverage [SIMD](https://en.wikipedia.org/wiki/Single_instruction,_multiple_data)
instructions.

It is geared towards bulk ingestion of tabular data, where allocating or
copying per field and per record must be avoided: records are exposed as
views borrowing the reader's buffer, and only fields that really need to be
transformed (doubled quotes, stuffed bytes) are ever copied.

# Examples

*Reading a CSV file while amortizing allocations*

```
use std::fs::File;
use simd_delimited::{Reader, ByteRecord};

let mut reader = Reader::from_reader(File::open("data.csv")?);
let mut record = ByteRecord::new();

while reader.read_byte_record(&mut record)? {
    for cell in record.iter() {
        dbg!(cell);
    }
}
```

*Using a builder to configure your reader*

```
use std::fs::File;
use simd_delimited::ReaderBuilder;

let mut reader = ReaderBuilder::new()
    .delimiter(b'\t')
    .buffer_capacity(16 * (1 << 10))
    .utf8(true)
    .from_reader(File::open("data.tsv")?)?;
```

*Reading zero-copy record views*

```
use std::fs::File;
use simd_delimited::Reader;

let mut reader = Reader::from_reader(File::open("data.csv")?);

while let Some(record) = reader.read_record()? {
    // Only unescaping third column, if needed:
    dbg!(record.get(2));
}
```

*Transcoding CSV to the binary format*

```
use std::fs::File;
use simd_delimited::{BinaryWriter, Reader};

let mut reader = Reader::from_reader(File::open("data.csv")?);
let mut writer = BinaryWriter::from_writer(File::create("data.bin")?);

while let Some(record) = reader.read_record()? {
    writer.write_record(record.iter())?;
}

writer.flush()?;
```

*Reading from a non-blocking source*

```
use simd_delimited::{CancelToken, ReaderBuilder};

let token = CancelToken::new();

let mut reader = ReaderBuilder::new()
    .cancel_token(token.clone())
    .from_async_reader(tokio::fs::File::open("data.csv").await?)?;

while let Some(record) = reader.read_record().await? {
    dbg!(record);
}
```

# Readers

- [`Reader`], [`AsyncReader`], [`ReaderBuilder`]: quoted CSV, with
  configurable delimiter & quote char.
- [`TextReader`], [`AsyncTextReader`], [`TextReaderBuilder`]: UTF-8 text
  delimited by a field byte and a record byte, without any quoting.
- [`BinaryReader`], [`AsyncBinaryReader`], [`BinaryReaderBuilder`]: the
  binary format described in the [`binary`] module.

Every reader is a thin driver over the same refill engine: blocking and
non-blocking readers only differ by how they refill their buffer, and
yield the exact same records.

# Writers

- [`Writer`], [`WriterBuilder`]: a CSV writer quoting only when needed.
- [`BinaryWriter`], [`BinaryWriterBuilder`]: a binary writer, stuffing only
  fields that contain a control byte.

# Supported targets

- On `x86_64` targets, `sse2` instructions are used. `avx2` instructions
  will also be used if their availability is detected at runtime.
- On `aarch64` targets, `neon` instructions are used.
- Everywhere else, the library will fallback to scalar implementations.

Call [`searcher_simd_instructions`] to know which ones were selected.

# Design notes

## Hybrid design

The CSV parser maintains a traditional state machine, but searches for
structural characters in the byte stream using SIMD string searching: 16/32
bytes of data are compared at once with splats of the structural
characters, and the resulting move mask is consumed bit by bit. Branching
therefore happens on each structural character rather than on each byte.
Quoted data is scanned with [`memchr`](https://docs.rs/memchr/latest/memchr/)
directly, since only the next quote matters there.

## Refilling

Each reader owns two buffers taken from a shared [`pool`]. When the front one
is full, the bytes of the record being read are moved to the back one and
both are swapped, so a record can straddle any number of refills. Buffers
double in size when a single record takes more than half of them, up to
the reader's maximum record length.

# Caveats

## Leniency

"Nonsensical" CSV data is accepted rather than rejected:

- quotes in the middle of an unquoted field are kept, doubled ones being
  folded: `A""B` is read as `A"B`.
- data following the closing quote of a field is kept along with the quote:
  `"ab"c` is read as `ab"c`.
- a quoted field still open at the end of the stream ends there.

## Line terminators

LF, CRLF and lone CR all end a record. Empty lines are read as records
without any field.
*/
#[allow(unused_macros)]
macro_rules! brec {
    () => {{
        $crate::records::ByteRecord::new()
    }};

    ($($x: expr),*) => {{
        let mut r = $crate::records::ByteRecord::new();

        $(
            r.push_field($x.as_bytes());
        )*

        r
    }};
}

pub mod binary;
mod buffer;
mod collector;
mod core;
mod debug;
mod error;
pub mod pool;
mod reader;
mod records;
mod searcher;
mod stream;
pub mod stuffing;
mod text;
mod utf8;
mod utils;
mod writer;

pub use binary::{
    encode_record, AsyncBinaryReader, BinaryReader, BinaryReaderBuilder, BinaryWriter,
    BinaryWriterBuilder,
};
pub use collector::IndexCollector;
pub use error::{Error, ErrorKind, Result};
pub use pool::{Pool, Pooled};
pub use reader::{AsyncReader, ByteRecordsIntoIter, ByteRecordsIter, Reader, ReaderBuilder};
pub use records::{ByteRecord, ByteRecordIter, RecordView, RecordViewIter, TextRecord};
pub use searcher::{searcher_simd_instructions, Element, Indices, Searcher, SimdLevel};
pub use stream::CancelToken;
pub use text::{AsyncTextReader, TextReader, TextReaderBuilder};
pub use utf8::{DecodeStatus, Utf8Decoder};
pub use utils::{trim_bom, unescape};
pub use writer::{Writer, WriterBuilder};
