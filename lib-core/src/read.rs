//! Archive reader: parses an input byte stream into a structured model.
//!
//! Parsing is central-directory driven, mirroring how the JVM locates
//! entries: the end of central directory record is found first, then every
//! central header, then the local header each one points at. Entry data is
//! kept raw (still compressed); size and checksum fields are taken from the
//! central directory, since local headers may carry zeroed fields. When a
//! previous rewrite masked the central sizes with the sentinel instead, the
//! real sizes are recovered from the local header, or failing that derived
//! from the stream itself.

use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;

use crate::format::{
    CENTRAL_SIG, EOCD_LEN, EOCD_SIG, LOCAL_SIG, METHOD_STORED, SIZE_SENTINEL,
};

/// One physical entry in the local section of the archive.
pub struct LocalEntry {
    /// Minimum version needed to extract, as declared in the local header.
    pub version_needed: u16,
    /// General purpose bit flags.
    pub flags: u16,
    /// Raw compression method id.
    pub method: u16,
    /// Last modification time (DOS format).
    pub mod_time: u16,
    /// Last modification date (DOS format).
    pub mod_date: u16,
    /// CRC-32 of the uncompressed content.
    pub crc32: u32,
    /// Size of the raw entry data.
    pub compressed_size: u32,
    /// Size of the content once decompressed.
    pub uncompressed_size: u32,
    /// Entry name. Taken from the central directory, which is authoritative
    /// even when the local name has been blanked.
    pub name: Bytes,
    /// Local extra field bytes.
    pub extra: Bytes,
    /// Raw (still compressed) entry data.
    pub data: Bytes,
    /// Offset of the local header in the source stream.
    pub offset: u32,
}

/// One central directory record, linked to its local entry by source offset.
pub struct CentralEntry {
    /// "Version made by" field.
    pub version_made_by: u16,
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flags.
    pub flags: u16,
    /// Raw compression method id.
    pub method: u16,
    /// Last modification time (DOS format).
    pub mod_time: u16,
    /// Last modification date (DOS format).
    pub mod_date: u16,
    /// CRC-32 of the uncompressed content.
    pub crc32: u32,
    /// Declared compressed size.
    pub compressed_size: u32,
    /// Declared uncompressed size.
    pub uncompressed_size: u32,
    /// Disk number where the entry starts.
    pub disk_start: u16,
    /// Internal file attributes.
    pub internal_attrs: u16,
    /// External file attributes.
    pub external_attrs: u32,
    /// Offset of the matching local header in the source stream.
    pub local_offset: u32,
    /// Entry name.
    pub name: Bytes,
    /// Central extra field bytes.
    pub extra: Bytes,
    /// Entry comment.
    pub comment: Bytes,
}

/// The end of central directory record, without the derived count/offset
/// fields (those are recomputed on write).
#[derive(Default)]
pub struct EndRecord {
    /// Number of this disk.
    pub disk_number: u16,
    /// Disk where the central directory starts.
    pub cd_start_disk: u16,
    /// Archive comment.
    pub comment: Bytes,
}

/// A parsed archive. Owned exclusively by one optimize pass; recursive
/// flattening builds an independent model for the nested content.
pub struct ZipModel {
    /// Physical entries in source order.
    pub locals: Vec<LocalEntry>,
    /// Central directory records in source order.
    pub centrals: Vec<CentralEntry>,
    /// Trailing end record.
    pub end: EndRecord,
}

impl ZipModel {
    /// Parses a complete archive held in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if no end of central directory record is present, or
    /// if any referenced record is truncated or has a bad signature.
    pub fn parse(input: Bytes) -> Result<Self> {
        let eocd_pos = find_eocd(&input).context("no end of central directory record")?;
        let mut cur = Cursor::new(&input, eocd_pos + 4);
        let disk_number = cur.u16()?;
        let cd_start_disk = cur.u16()?;
        let _cd_count_disk = cur.u16()?;
        let cd_count = cur.u16()?;
        let _cd_size = cur.u32()?;
        let cd_offset = cur.u32()?;
        let comment_len = cur.u16()? as usize;
        let comment = cur.slice(comment_len.min(input.len() - cur.pos))?;

        let mut centrals = Vec::with_capacity(cd_count as usize);
        let mut cur = Cursor::new(&input, cd_offset as usize);
        for _ in 0..cd_count {
            centrals.push(parse_central(&mut cur)?);
        }

        let mut locals: Vec<LocalEntry> = Vec::with_capacity(centrals.len());
        for cd in &centrals {
            if locals.iter().any(|l| l.offset == cd.local_offset) {
                // Two central records sharing one physical entry.
                continue;
            }
            locals.push(
                parse_local(&input, cd)
                    .with_context(|| format!("local entry of {}", String::from_utf8_lossy(&cd.name)))?,
            );
        }
        locals.sort_by_key(|l| l.offset);

        Ok(Self {
            locals,
            centrals,
            end: EndRecord { disk_number, cd_start_disk, comment },
        })
    }
}

/// Scans backwards for the end of central directory signature. The record may
/// be followed by a comment of up to 64 KiB, so the whole trailing window is
/// searched.
fn find_eocd(input: &[u8]) -> Option<usize> {
    let sig = EOCD_SIG.to_le_bytes();
    let hi = input.len().checked_sub(EOCD_LEN)?;
    let lo = hi.saturating_sub(u16::MAX as usize);
    (lo..=hi).rev().find(|&i| input[i..i + 4] == sig)
}

fn parse_central(cur: &mut Cursor<'_>) -> Result<CentralEntry> {
    let sig = cur.u32()?;
    ensure!(sig == CENTRAL_SIG, "bad central directory signature {sig:#010x}");
    let version_made_by = cur.u16()?;
    let version_needed = cur.u16()?;
    let flags = cur.u16()?;
    let method = cur.u16()?;
    let mod_time = cur.u16()?;
    let mod_date = cur.u16()?;
    let crc32 = cur.u32()?;
    let compressed_size = cur.u32()?;
    let uncompressed_size = cur.u32()?;
    let name_len = cur.u16()? as usize;
    let extra_len = cur.u16()? as usize;
    let comment_len = cur.u16()? as usize;
    let disk_start = cur.u16()?;
    let internal_attrs = cur.u16()?;
    let external_attrs = cur.u32()?;
    let local_offset = cur.u32()?;
    let name = cur.slice(name_len)?;
    let extra = cur.slice(extra_len)?;
    let comment = cur.slice(comment_len)?;
    Ok(CentralEntry {
        version_made_by,
        version_needed,
        flags,
        method,
        mod_time,
        mod_date,
        crc32,
        compressed_size,
        uncompressed_size,
        disk_start,
        internal_attrs,
        external_attrs,
        local_offset,
        name,
        extra,
        comment,
    })
}

fn parse_local(input: &Bytes, cd: &CentralEntry) -> Result<LocalEntry> {
    let mut cur = Cursor::new(input, cd.local_offset as usize);
    let sig = cur.u32()?;
    ensure!(sig == LOCAL_SIG, "bad local header signature {sig:#010x}");
    let version_needed = cur.u16()?;
    let flags = cur.u16()?;
    let method = cur.u16()?;
    let mod_time = cur.u16()?;
    let mod_date = cur.u16()?;
    let _crc32 = cur.u32()?;
    let local_compressed = cur.u32()?;
    let local_uncompressed = cur.u32()?;
    let name_len = cur.u16()? as usize;
    let extra_len = cur.u16()? as usize;
    cur.skip(name_len)?;
    let extra = cur.slice(extra_len)?;
    let data_len = compressed_len(input, cur.pos, cd.compressed_size, local_compressed)?;
    let data = cur.slice(data_len)?;
    let uncompressed_size =
        uncompressed_len(cd.uncompressed_size, local_uncompressed, method, &data)?;
    Ok(LocalEntry {
        version_needed,
        flags,
        method,
        mod_time,
        mod_date,
        crc32: cd.crc32,
        compressed_size: data.len() as u32,
        uncompressed_size,
        name: cd.name.clone(),
        extra,
        data,
        offset: cd.local_offset,
    })
}

/// Real data length of an entry. The central directory is authoritative
/// (local fields may be zeroed), unless it holds the masking sentinel; then
/// the local header is trusted, and when that is zeroed too the data runs to
/// the next record signature.
fn compressed_len(input: &Bytes, start: usize, central: u32, local: u32) -> Result<usize> {
    if central != SIZE_SENTINEL {
        return Ok(central as usize);
    }
    if local != 0 && local != SIZE_SENTINEL {
        return Ok(local as usize);
    }
    let sigs = [
        LOCAL_SIG.to_le_bytes(),
        CENTRAL_SIG.to_le_bytes(),
        EOCD_SIG.to_le_bytes(),
    ];
    (start..input.len().saturating_sub(3))
        .find(|&i| sigs.contains(&[input[i], input[i + 1], input[i + 2], input[i + 3]]))
        .map(|i| i - start)
        .context("cannot locate the end of a size-masked entry")
}

/// Real uncompressed length, recovered like [`compressed_len`]; a fully
/// masked deflated entry is measured by decoding it.
fn uncompressed_len(central: u32, local: u32, method: u16, data: &[u8]) -> Result<u32> {
    if central != SIZE_SENTINEL {
        return Ok(central);
    }
    if local != 0 && local != SIZE_SENTINEL {
        return Ok(local);
    }
    if data.is_empty() {
        return Ok(0);
    }
    if method == METHOD_STORED {
        return Ok(data.len() as u32);
    }
    let content = crate::codec::decompress(data, method, data.len().saturating_mul(2))
        .context("cannot measure a size-masked entry")?;
    u32::try_from(content.len()).context("uncompressed entry exceeds 4 GiB")
}

struct Cursor<'a> {
    input: &'a Bytes,
    pos: usize,
}
impl<'a> Cursor<'a> {
    const fn new(input: &'a Bytes, pos: usize) -> Self {
        Self { input, pos }
    }
    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }
    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.input.len() {
            bail!("truncated record at offset {}", self.pos);
        }
        let b = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Ok(b)
    }
    fn slice(&mut self, n: usize) -> Result<Bytes> {
        if self.pos + n > self.input.len() {
            bail!("truncated record at offset {}", self.pos);
        }
        let b = self.input.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(b)
    }
    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }
}
