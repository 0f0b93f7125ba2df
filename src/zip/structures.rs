use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use anyhow::{Result, bail};

/// ZIP compression methods
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

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
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
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
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

    /// Any field saturated to its maximum means the real value lives in
    /// the ZIP64 EOCD.
    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
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

/// ZIP64 End of Central Directory - 56 bytes minimum
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
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
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

/// Central Directory File Header (CDFH) signature
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Host system value for Unix in the `version made by` field
const MADE_BY_UNIX: u8 = 3;

/// One archive member, as recorded in the central directory.
///
/// The `name` is untrusted input straight from the archive; extraction
/// must run it through the path guard before touching the filesystem.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub header_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    /// Permission bits from the external attributes, when the entry
    /// was written on a Unix host.
    pub unix_mode: Option<u32>,
    pub is_directory: bool,
}

impl ZipEntry {
    /// Parse one Central Directory File Header, leaving the cursor at
    /// the start of the next header.
    pub fn read_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            bail!("Invalid Central Directory File Header");
        }

        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let _flags = cursor.read_u16::<LittleEndian>()?;
        let method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let name_len = cursor.read_u16::<LittleEndian>()?;
        let extra_len = cursor.read_u16::<LittleEndian>()?;
        let comment_len = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut header_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut name_bytes = vec![0u8; name_len as usize];
        cursor.read_exact(&mut name_bytes)?;
        // Lossy conversion keeps non-UTF8 names extractable
        let name = String::from_utf8_lossy(&name_bytes).to_string();

        // Directory entries end with '/'
        let is_directory = name.ends_with('/');

        // ZIP64 extended information (extra field id 0x0001) carries the
        // real values for any 32-bit field that saturated above.
        let extra_end = cursor.position() + extra_len as u64;

        while cursor.position() + 4 <= extra_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()?;

            if header_id == 0x0001 {
                if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= extra_end {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= extra_end {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if header_offset == 0xFFFFFFFF && cursor.position() + 8 <= extra_end {
                    header_offset = cursor.read_u64::<LittleEndian>()?;
                }
                let remaining = extra_end.saturating_sub(cursor.position());
                cursor.set_position(cursor.position() + remaining);
            } else {
                cursor.set_position(cursor.position() + field_size as u64);
            }
        }

        cursor.set_position(extra_end + comment_len as u64);

        let unix_mode = if (version_made_by >> 8) as u8 == MADE_BY_UNIX {
            match external_attrs >> 16 {
                0 => None,
                mode => Some(mode),
            }
        } else {
            None
        };

        Ok(Self {
            name,
            method: CompressionMethod::from_u16(method),
            compressed_size,
            uncompressed_size,
            crc32,
            header_offset,
            last_mod_time,
            last_mod_date,
            unix_mode,
            is_directory,
        })
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}
