use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, NaiveDate, Utc};
use std::io::Cursor;

use anyhow::{Result, bail};

/// Compression method field of a file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }
}

/// End of Central Directory record, 22 bytes plus the archive comment.
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("Invalid End of Central Directory");
        }

        // Verify signature
        if &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// Points at the ZIP64 EOCD; sits right before the EOCD.
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("Invalid ZIP64 format");
        }

        if &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 EOCD record. Only the fixed 56-byte part is read.
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            bail!("Invalid ZIP64 format");
        }

        if &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central directory record: fixed 46 bytes, then name, extra and comment.
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local header in front of each entry's data, fixed part only.
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// ZIP64 extended information extra field
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Extended timestamp extra field ("UT")
pub const EXTENDED_TIMESTAMP_EXTRA_ID: u16 = 0x5455;

/// General purpose flag bit 0: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Host system recorded in the upper byte of "version made by"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorSystem {
    MsDos,
    Unix,
    Other(u8),
}

impl CreatorSystem {
    pub fn from_version_made_by(version: u16) -> Self {
        match (version >> 8) as u8 {
            0 => CreatorSystem::MsDos,
            3 => CreatorSystem::Unix,
            other => CreatorSystem::Other(other),
        }
    }
}

const MSDOS_READ_ONLY: u32 = 0x01;
const MSDOS_DIRECTORY: u32 = 0x10;
const UNIX_TYPE_MASK: u32 = 0o170000;
const UNIX_DIRECTORY: u32 = 0o040000;

/// Permission bits reported for directories and entries without Unix modes.
pub const DEFAULT_DIR_MODE: u32 = 0o777;
pub const DEFAULT_FILE_MODE: u32 = 0o666;

/// One central directory record, decoded.
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub is_directory: bool,
    pub version_made_by: u16,
    pub flags: u16,
    pub external_attrs: u32,
    /// Modification time from the extended timestamp field, seconds since epoch
    pub unix_mtime: Option<i64>,
}

impl ZipFileEntry {
    /// DOS date as (year, month, day).
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// DOS time as (hour, minute, second), with 2-second resolution.
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Modification time of the entry.
    ///
    /// Prefers the extended timestamp field. DOS timestamps carry no zone and
    /// are read as UTC; an out-of-range DOS value falls back to the epoch.
    pub fn modified(&self) -> DateTime<Utc> {
        if let Some(ts) = self.unix_mtime.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
            return ts;
        }

        let (year, month, day) = self.mod_date();
        let (hour, minute, second) = self.mod_time();
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
            .map(|naive| naive.and_utc())
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn creator(&self) -> CreatorSystem {
        CreatorSystem::from_version_made_by(self.version_made_by)
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Whether the entry describes a directory, by name or by attributes.
    pub fn is_dir(&self) -> bool {
        if self.is_directory {
            return true;
        }
        match self.creator() {
            CreatorSystem::Unix => (self.external_attrs >> 16) & UNIX_TYPE_MASK == UNIX_DIRECTORY,
            CreatorSystem::MsDos => self.external_attrs & MSDOS_DIRECTORY != 0,
            CreatorSystem::Other(_) => false,
        }
    }

    /// Permission bits of the entry (`0o7777` mask).
    pub fn mode(&self) -> u32 {
        let fallback = if self.is_dir() {
            DEFAULT_DIR_MODE
        } else {
            DEFAULT_FILE_MODE
        };

        match self.creator() {
            CreatorSystem::Unix if self.external_attrs >> 16 != 0 => {
                (self.external_attrs >> 16) & 0o7777
            }
            CreatorSystem::MsDos if self.external_attrs & MSDOS_READ_ONLY != 0 => {
                fallback & !0o222
            }
            _ => fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version_made_by: u16, external_attrs: u32) -> ZipFileEntry {
        ZipFileEntry {
            file_name: "a/b.txt".to_string(),
            compression_method: CompressionMethod::Stored,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            // 2024-03-15 10:30:44
            last_mod_time: (10 << 11) | (30 << 5) | 22,
            last_mod_date: ((2024 - 1980) << 9) | (3 << 5) | 15,
            is_directory: false,
            version_made_by,
            flags: 0,
            external_attrs,
            unix_mtime: None,
        }
    }

    #[test]
    fn test_dos_timestamp() {
        let e = entry(0x0314, 0);
        assert_eq!(e.mod_date(), (2024, 3, 15));
        assert_eq!(e.mod_time(), (10, 30, 44));
        assert_eq!(e.modified().to_rfc3339(), "2024-03-15T10:30:44+00:00");
    }

    #[test]
    fn test_extended_timestamp_wins() {
        let mut e = entry(0x0314, 0);
        e.unix_mtime = Some(1_700_000_000);
        assert_eq!(e.modified().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_invalid_dos_date_falls_back_to_epoch() {
        let mut e = entry(0x0014, 0);
        e.last_mod_date = 0;
        assert_eq!(e.modified(), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_unix_mode() {
        let e = entry(0x0314, (0o100644) << 16);
        assert_eq!(e.creator(), CreatorSystem::Unix);
        assert_eq!(e.mode(), 0o644);
        assert!(!e.is_dir());

        let d = entry(0x0314, (0o040755) << 16);
        assert!(d.is_dir());
        assert_eq!(d.mode(), 0o755);
    }

    #[test]
    fn test_msdos_mode() {
        let e = entry(0x0014, MSDOS_READ_ONLY);
        assert_eq!(e.mode(), 0o444);

        let d = entry(0x0014, MSDOS_DIRECTORY);
        assert!(d.is_dir());
        assert_eq!(d.mode(), 0o777);
    }
}
