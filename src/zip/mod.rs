//! ZIP container format: central directory parsing and entry decoding.
//!
//! Everything here works on a [`ReadAt`](crate::io::ReadAt) source, so an
//! archive is never read front to back. Opening one costs a read of the
//! trailing End of Central Directory record (plus the ZIP64 locator and record
//! when present) and one read of the central directory itself. Entry data is
//! only touched when an [`EntryReader`] pulls it.
//!
//! - `structures`: fixed-layout records and the [`ZipFileEntry`] metadata view
//! - `parser`: [`ZipParser`], which locates and decodes the central directory
//! - `reader`: [`EntryReader`], a streaming STORED/DEFLATE decoder with CRC-32
//!   verification
//!
//! Entries carry Unix permissions and the `UT` extended timestamp when the
//! archiver wrote them. Encrypted entries, split archives and compression
//! methods other than STORED and DEFLATE are recognized but cannot be read.

mod parser;
mod reader;
mod structures;

pub use parser::ZipParser;
pub use reader::EntryReader;
pub use structures::*;
