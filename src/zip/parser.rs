//! Low-level ZIP archive parser.
//!
//! ZIP files are designed to be read from the end: the End of Central
//! Directory record locates the central directory, which describes every
//! member without touching its data. That layout is what makes listing a
//! remote archive cheap — only the tail and the central directory are
//! fetched, never the member data.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// Limits the search window when the EOCD is not at the very end.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Parses ZIP structures out of any [`ReadAt`] source.
pub struct ZipParser<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record together with its offset in the archive.
    /// Fails when no valid EOCD exists, i.e. the source is not a ZIP
    /// archive.
    pub async fn locate_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        // Common case first: no archive comment, EOCD flush at the end.
        if self.size >= EndOfCentralDirectory::SIZE as u64 {
            let offset = self.size - EndOfCentralDirectory::SIZE as u64;
            let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
            self.reader.read_exact_at(offset, &mut buf).await?;

            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
                let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
                return Ok((eocd, offset));
            }
        }

        // A trailing comment pushes the EOCD back; scan the maximum
        // comment window from the end for the signature.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        for i in (0..buf.len().saturating_sub(EndOfCentralDirectory::SIZE)).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // Only a real EOCD has a comment length matching the
                // bytes that remain after it.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd =
                        EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// The locator sits immediately before the regular EOCD and points
    /// at the 64-bit record.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| anyhow::anyhow!("Invalid ZIP64 format"))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// Enumerate every entry recorded in the central directory.
    ///
    /// Entries come back in central-directory order, which is the order
    /// the archive was written in.
    pub async fn entries(&self) -> Result<Vec<ZipEntry>> {
        let (eocd, eocd_offset) = self.locate_eocd().await?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        // One range request covers the whole central directory.
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data).await?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..total_entries {
            entries.push(ZipEntry::read_cdfh(&mut cursor)?);
        }

        Ok(entries)
    }

    /// Resolve where an entry's data actually starts.
    ///
    /// The local file header repeats the name and extra field with
    /// lengths that may differ from the central directory copy, so the
    /// data offset can only be computed by reading it.
    pub async fn data_offset(&self, entry: &ZipEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader
            .read_exact_at(entry.header_offset, &mut lfh_buf)
            .await?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header");
        }

        let mut cursor = Cursor::new(lfh_buf.as_slice());
        cursor.set_position(26); // filename length field

        let name_len = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_len = cursor.read_u16::<LittleEndian>()? as u64;

        Ok(entry.header_offset + LFH_SIZE as u64 + name_len + extra_len)
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}
