//! Central directory parser.
//!
//! An archive is indexed from its tail. The EOCD record (and, for ZIP64, the
//! locator and ZIP64 EOCD in front of it) gives the position of the central
//! directory, which is then fetched with a single read. Local file headers
//! are only consulted when an entry is opened.
//!
//! Lengths and offsets taken from the archive are checked against its size
//! before they are used to allocate or read.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Result, bail};

use super::structures::*;

/// Upper bound of the archive comment, which bounds the EOCD search window.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Reads the central directory of an archive behind a [`ReadAt`].
///
/// Defaults to a trait object, which is what a
/// [`BackingFs`](crate::io::BackingFs) hands out. [`ZipFs`](crate::ZipFs)
/// keeps one per open archive.
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// for entry in parser.list_files().await? {
///     let offset = parser.get_data_offset(&entry).await?;
///     let reader = EntryReader::new(parser.reader().clone(), &entry, offset)?;
/// }
/// ```
pub struct ZipParser<R: ReadAt + ?Sized = dyn ReadAt> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt + ?Sized> ZipParser<R> {
    /// Parser over `reader`, sized by [`ReadAt::size`].
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Create a parser that trusts `size` instead of asking the reader.
    ///
    /// The size recorded by a stat is authoritative for the archive, so the
    /// filesystem passes it here.
    pub fn with_size(reader: Arc<R>, size: u64) -> Self {
        Self { reader, size }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Locate the EOCD record and return it with its offset.
    ///
    /// Archives without a comment end in the record itself. Otherwise the
    /// last 64 KiB are scanned backwards for a signature whose comment length
    /// reaches exactly to the end of the file.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size >= EndOfCentralDirectory::SIZE as u64 {
            let offset = self.size - EndOfCentralDirectory::SIZE as u64;
            let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
            self.reader.read_exact_at(offset, &mut buf).await?;

            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
                let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
                return Ok((eocd, offset));
            }
        }

        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        for i in (0..buf.len().saturating_sub(EndOfCentralDirectory::SIZE)).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Follow the ZIP64 locator that precedes the EOCD at `eocd_offset`.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        let Some(locator_offset) = eocd_offset.checked_sub(Zip64EOCDLocator::SIZE as u64) else {
            bail!("Invalid ZIP64 format");
        };
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;
        if locator.total_disks > 1 {
            bail!("Multi-disk archives are not supported");
        }
        if locator.eocd64_offset.saturating_add(Zip64EOCD::MIN_SIZE as u64) > locator_offset {
            bail!("Invalid ZIP64 format");
        }

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// Every central directory record, in archive order.
    ///
    /// Fails when the directory lies outside the file or holds fewer records
    /// than the EOCD announces.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            if eocd.disk_number != 0 || eocd.disk_with_cd != 0 {
                bail!("Multi-disk archives are not supported");
            }
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        // Must end at or before the EOCD
        if cd_offset.checked_add(cd_size).is_none_or(|end| end > eocd_offset) {
            bail!("Central Directory lies outside the archive");
        }
        if total_entries > cd_size / CDFH_MIN_SIZE as u64 {
            bail!("Central Directory is too small for {} entries", total_entries);
        }

        // One read: a single Range request when served over HTTP
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data).await?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(&cd_data);

        for _ in 0..total_entries {
            let entry = self.parse_cdfh(&mut cursor)?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Decode the record at the cursor and leave the cursor on the next one.
    fn parse_cdfh(&self, cursor: &mut Cursor<&Vec<u8>>) -> Result<ZipFileEntry> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            bail!("Invalid Central Directory File Header");
        }

        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        let file_name = String::from_utf8_lossy(&file_name_bytes).to_string();

        let is_directory = file_name.ends_with('/');

        // Parse extra fields: ZIP64 sizes (0x0001) and extended timestamp (0x5455)
        let extra_field_end = cursor.position() + extra_field_length as u64;
        if extra_field_end + file_comment_length as u64 > cursor.get_ref().len() as u64 {
            bail!("Central Directory File Header for {} is truncated", file_name);
        }
        let mut unix_mtime = None;

        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()?;
            let field_end = (cursor.position() + field_size as u64).min(extra_field_end);

            if header_id == ZIP64_EXTRA_ID {
                // Only the saturated header fields are present, in this order
                if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    lfh_offset = cursor.read_u64::<LittleEndian>()?;
                }
            } else if header_id == EXTENDED_TIMESTAMP_EXTRA_ID
                && cursor.position() + 5 <= field_end
            {
                // Flags byte, then mtime when bit 0 is set
                let ts_flags = cursor.read_u8()?;
                if ts_flags & 0x01 != 0 {
                    unix_mtime = Some(cursor.read_i32::<LittleEndian>()? as i64);
                }
            }
            // Skip whatever is left of this field (disk number start, atime, ...)
            cursor.set_position(field_end);
        }

        // Entry comments are not surfaced
        cursor.set_position(extra_field_end + file_comment_length as u64);

        if lfh_offset.saturating_add(LFH_SIZE as u64) > self.size {
            bail!("Local File Header of {} lies outside the archive", file_name);
        }

        Ok(ZipFileEntry {
            file_name,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            last_mod_date,
            is_directory,
            version_made_by,
            flags,
            external_attrs,
            unix_mtime,
        })
    }

    /// Offset of the compressed data of `entry`.
    ///
    /// The local header's name and extra lengths can differ from the central
    /// directory copy, so the local header is read to find where data starts.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader
            .read_exact_at(entry.lfh_offset, &mut lfh_buf)
            .await?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header");
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26);

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;

        if data_offset.saturating_add(entry.compressed_size) > self.size {
            bail!("Data of {} extends past the end of the archive", entry.file_name);
        }

        Ok(data_offset)
    }

    /// Source the archive is read from, shared with entry readers.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}
