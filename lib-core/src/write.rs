//! Archive serializer: emits local file headers, central directory headers
//! and the end of central directory record in the exact binary layout,
//! applying the configured field-removal policies and recomputing every
//! length-dependent offset from a running byte counter.

use std::io::Write;

use anyhow::{Context, Result};

use crate::cfg::RepackConfig;
use crate::format::{
    exec_marker, extra_has_id, is_manifest, CENTRAL_SIG, EARLIEST_DATE, EARLIEST_TIME,
    EOCD_SIG, EXEC_MARKER_ID, FLAG_DATA_DESCRIPTOR, LOCAL_SIG, METHOD_DEFLATED, SIZE_SENTINEL,
    VERSION_DEFLATE,
};
use crate::read::{CentralEntry, EndRecord, LocalEntry};
use crate::registry::EntryRecord;
use crate::select::EncodingOutcome;

/// Writes archive records to a byte sink, tracking the output offset.
pub struct ArchiveWriter<W: Write> {
    out: W,
    offset: u64,
}

impl<W: Write> ArchiveWriter<W> {
    /// Wraps a byte sink. The offset counter starts at zero; callers writing
    /// mid-stream are not supported (offsets are absolute).
    pub const fn new(out: W) -> Self {
        Self { out, offset: 0 }
    }

    /// Bytes written so far. The central directory offset and size in the
    /// end record are this counter captured at the section boundaries.
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    fn u16(&mut self, v: u16) -> Result<()> {
        self.out.write_all(&v.to_le_bytes())?;
        self.offset += 2;
        Ok(())
    }
    fn u32(&mut self, v: u32) -> Result<()> {
        self.out.write_all(&v.to_le_bytes())?;
        self.offset += 4;
        Ok(())
    }
    fn bytes(&mut self, b: &[u8]) -> Result<()> {
        self.out.write_all(b)?;
        self.offset += b.len() as u64;
        Ok(())
    }

    /// Writes one local file header with its data, returning the registry
    /// record describing the entry as physically written.
    ///
    /// # Errors
    ///
    /// Fails on sink I/O errors or when the output outgrows 32-bit offsets.
    pub fn write_local(
        &mut self,
        cfg: &RepackConfig,
        entry: &LocalEntry,
        outcome: &EncodingOutcome,
        excluded: bool,
        first: bool,
    ) -> Result<EntryRecord> {
        let offset = u32::try_from(self.offset).context("output exceeds 4 GiB")?;
        let manifest = is_manifest(&entry.name);
        let keep_sizes = excluded || manifest;
        let compressed_size =
            u32::try_from(outcome.data.len()).context("entry data exceeds 4 GiB")?;

        let version = version_for(entry.version_needed, outcome.method);
        let (time, date) = timestamp(cfg, entry.mod_time, entry.mod_date);
        let (lcs, lus) = if cfg.remove_sizes && !keep_sizes {
            (0, 0)
        } else {
            (compressed_size, outcome.uncompressed_size)
        };
        let name: &[u8] = if cfg.remove_names && !manifest && !excluded {
            b""
        } else {
            &entry.name
        };
        let base_extra: &[u8] = if cfg.remove_extra { b"" } else { &entry.extra };
        let marker =
            first && cfg.mark_executable && !extra_has_id(base_extra, EXEC_MARKER_ID);
        let extra_len = base_extra.len() + if marker { exec_marker().len() } else { 0 };

        self.u32(LOCAL_SIG)?;
        self.u16(version)?;
        self.u16(entry.flags & !FLAG_DATA_DESCRIPTOR)?;
        self.u16(outcome.method)?;
        self.u16(time)?;
        self.u16(date)?;
        self.u32(outcome.crc32)?;
        self.u32(lcs)?;
        self.u32(lus)?;
        self.u16(u16::try_from(name.len()).context("name too long")?)?;
        self.u16(u16::try_from(extra_len).context("extra field too long")?)?;
        self.bytes(name)?;
        self.bytes(base_extra)?;
        if marker {
            self.bytes(&exec_marker())?;
        }
        self.bytes(&outcome.data)?;

        Ok(EntryRecord {
            crc32: outcome.crc32,
            uncompressed_size: outcome.uncompressed_size,
            compressed_size,
            method: outcome.method,
            offset,
        })
    }

    /// Writes one central directory header pointing at a written local entry.
    ///
    /// # Errors
    ///
    /// Fails on sink I/O errors.
    pub fn write_central(
        &mut self,
        cfg: &RepackConfig,
        cd: &CentralEntry,
        rec: &EntryRecord,
        excluded: bool,
    ) -> Result<()> {
        let keep_sizes = excluded || is_manifest(&cd.name);
        let (time, date) = timestamp(cfg, cd.mod_time, cd.mod_date);
        let (cs, us) = if cfg.mask_central_sizes && !keep_sizes {
            (SIZE_SENTINEL, SIZE_SENTINEL)
        } else {
            (rec.compressed_size, rec.uncompressed_size)
        };
        let extra: &[u8] = if cfg.remove_extra { b"" } else { &cd.extra };
        let comment: &[u8] = if cfg.remove_comments { b"" } else { &cd.comment };

        self.u32(CENTRAL_SIG)?;
        self.u16(cd.version_made_by)?;
        self.u16(version_for(cd.version_needed, rec.method))?;
        self.u16(cd.flags & !FLAG_DATA_DESCRIPTOR)?;
        self.u16(rec.method)?;
        self.u16(time)?;
        self.u16(date)?;
        self.u32(rec.crc32)?;
        self.u32(cs)?;
        self.u32(us)?;
        self.u16(u16::try_from(cd.name.len()).context("name too long")?)?;
        self.u16(u16::try_from(extra.len()).context("extra field too long")?)?;
        self.u16(u16::try_from(comment.len()).context("comment too long")?)?;
        self.u16(cd.disk_start)?;
        self.u16(cd.internal_attrs)?;
        self.u32(cd.external_attrs)?;
        self.u32(rec.offset)?;
        self.bytes(&cd.name)?;
        self.bytes(extra)?;
        self.bytes(comment)
    }

    /// Writes the end of central directory record from the accumulated
    /// counts and section boundaries.
    ///
    /// # Errors
    ///
    /// Fails on sink I/O errors or when counts/offsets exceed their fields.
    pub fn write_eocd(
        &mut self,
        cfg: &RepackConfig,
        end: &EndRecord,
        entries: u64,
        cd_size: u64,
        cd_offset: u64,
    ) -> Result<()> {
        let n = u16::try_from(entries).context("too many central directory entries")?;
        let comment: &[u8] = if cfg.remove_comments { b"" } else { &end.comment };
        self.u32(EOCD_SIG)?;
        self.u16(end.disk_number)?;
        self.u16(end.cd_start_disk)?;
        self.u16(n)?;
        self.u16(n)?;
        self.u32(u32::try_from(cd_size).context("central directory too large")?)?;
        self.u32(u32::try_from(cd_offset).context("central directory offset too large")?)?;
        self.u16(u16::try_from(comment.len()).context("comment too long")?)?;
        self.bytes(comment)?;
        self.out.flush()?;
        Ok(())
    }
}

const fn version_for(declared: u16, method: u16) -> u16 {
    // Deflate needs at least version 2.0; never lower a higher declaration.
    if method == METHOD_DEFLATED && declared < VERSION_DEFLATE {
        VERSION_DEFLATE
    } else {
        declared
    }
}

const fn timestamp(cfg: &RepackConfig, time: u16, date: u16) -> (u16, u16) {
    if cfg.remove_timestamps {
        (EARLIEST_TIME, EARLIEST_DATE)
    } else {
        (time, date)
    }
}
