//! Two-pass archive optimization: local entries are re-encoded and written
//! first, then the central directory is re-emitted from the registry of what
//! was physically written, then the end record.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use crossbeam_channel::Sender;

use crate::cfg::RepackConfig;
use crate::codec;
use crate::errors::ErrorCollector;
use crate::format::is_zip_like;
use crate::order::compare_names;
use crate::read::{LocalEntry, ZipModel};
use crate::registry::EntryRegistry;
use crate::select::{EncodingOutcome, Selector};
use crate::write::ArchiveWriter;
use crate::ProgressState;

/// Rewrites parsed archives into smaller equivalents under one fixed
/// configuration. Construction resolves the codec set once; the instance can
/// be reused across archives and is safe to share between threads.
pub struct Repacker {
    cfg: RepackConfig,
    selector: Selector,
}

impl Repacker {
    /// Creates a repacker for the given configuration.
    #[must_use]
    pub fn new(cfg: RepackConfig) -> Self {
        let selector = Selector::from_config(&cfg);
        Self { cfg, selector }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &RepackConfig {
        &self.cfg
    }

    /// Optimizes a parsed archive into the given byte sink, reporting
    /// per-entry progress via `ps` and soft failures via `errors`.
    ///
    /// # Errors
    ///
    /// Returns an error on sink I/O failures or structural limits (offsets
    /// outgrowing their fields). Per-entry codec failures are collected, not
    /// returned.
    pub fn optimize(
        &self,
        model: &ZipModel,
        out: impl Write,
        ps: &Sender<ProgressState>,
        errors: &mut ErrorCollector,
    ) -> Result<()> {
        self.write_archive(model, out, false, Some(ps), errors)
    }

    /// Optimizes an archive file into a new destination. The output is
    /// written to a sibling temporary file and only moved into place on
    /// success, so a failed run never clobbers a valid pre-existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is missing or not a regular file, if
    /// the output exists and `overwrite` is not set, if the input does not
    /// parse as an archive, or on I/O failures while writing.
    pub fn optimize_file(
        &self,
        input: &Path,
        output: &Path,
        overwrite: bool,
        ps: &Sender<ProgressState>,
        errors: &mut ErrorCollector,
    ) -> Result<()> {
        let meta = fs::metadata(input)
            .with_context(|| format!("cannot read input {}", input.display()))?;
        ensure!(meta.is_file(), "input {} is not a regular file", input.display());
        if output.exists() && !overwrite {
            bail!("output {} already exists, not overwriting", output.display());
        }

        let raw = Bytes::from(fs::read(input)?);
        let model = ZipModel::parse(raw)
            .with_context(|| format!("parsing {}", input.display()))?;

        let tmp = tmp_path(output);
        let run = File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))
            .and_then(|f| self.optimize(&model, BufWriter::new(f), ps, errors));
        match run {
            Ok(()) => {
                if output.exists() {
                    fs::remove_file(output)?;
                }
                fs::rename(&tmp, output)?;
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }

    /// Re-serializes a nested archive with every retained entry stored,
    /// exposing cross-entry redundancy to the outer codecs. The flattened
    /// container's checksum and length are recomputed from scratch.
    fn flatten(&self, data: &[u8], errors: &mut ErrorCollector) -> Result<Vec<u8>> {
        let model = ZipModel::parse(Bytes::copy_from_slice(data))?;
        let mut out = Vec::with_capacity(data.len());
        self.write_archive(&model, &mut out, true, None, errors)?;
        Ok(out)
    }

    fn write_archive(
        &self,
        model: &ZipModel,
        out: impl Write,
        force_store: bool,
        ps: Option<&Sender<ProgressState>>,
        errors: &mut ErrorCollector,
    ) -> Result<()> {
        let mut w = ArchiveWriter::new(out);
        let mut registry = EntryRegistry::new(self.cfg.dedup);
        let recompress = self.cfg.recompresses();

        let mut local_order: Vec<usize> = (0..model.locals.len()).collect();
        if self.cfg.sort_entries {
            local_order
                .sort_by(|&a, &b| compare_names(&model.locals[a].name, &model.locals[b].name));
        }
        send(ps, ProgressState::Start(local_order.len()))?;

        // Local file headers:
        let mut first = true;
        for (n, &i) in local_order.iter().enumerate() {
            let entry = &model.locals[i];
            let name: Arc<str> = String::from_utf8_lossy(&entry.name).into();
            send(ps, ProgressState::Push(n, name.clone()))?;

            if entry.uncompressed_size == 0 && self.cfg.remove_empty {
                continue;
            }
            if registry.dedups() && registry.contains(registry.key(entry.crc32, entry.offset)) {
                continue;
            }

            let outcome = self.encode_entry(entry, &name, force_store, recompress, errors);
            let excluded = self.cfg.is_excluded(&entry.name);
            let rec = w.write_local(&self.cfg, entry, &outcome, excluded, first)?;
            first = false;
            registry.record(registry.key(outcome.crc32, entry.offset), rec);
            if outcome.crc32 != entry.crc32 {
                // Content was replaced (flattening); central references still
                // carry the original checksum.
                registry.alias(registry.key(entry.crc32, entry.offset), rec);
            }
        }

        // Central directory file headers:
        let cd_start = w.offset();
        let mut central_order: Vec<usize> = (0..model.centrals.len()).collect();
        if self.cfg.sort_entries {
            central_order
                .sort_by(|&a, &b| compare_names(&model.centrals[a].name, &model.centrals[b].name));
        }
        let mut entries: u64 = 0;
        for &i in &central_order {
            let cd = &model.centrals[i];
            // References whose key never got written (dropped content) are
            // skipped; they must not affect other entries.
            let Some(rec) = registry.lookup(registry.key(cd.crc32, cd.local_offset)) else {
                continue;
            };
            w.write_central(&self.cfg, cd, rec, self.cfg.is_excluded(&cd.name))?;
            entries += 1;
        }

        // End of central directory record:
        let cd_size = w.offset() - cd_start;
        w.write_eocd(&self.cfg, &model.end, entries, cd_size, cd_start)?;
        send(ps, ProgressState::Finish)
    }

    /// Finds the smallest encoding for one entry. Any failure below codec
    /// level (unknown method, corrupt stream, unparseable nested archive)
    /// falls back to re-emitting the original bytes untouched.
    fn encode_entry(
        &self,
        entry: &LocalEntry,
        name: &Arc<str>,
        force_store: bool,
        recompress: bool,
        errors: &mut ErrorCollector,
    ) -> EncodingOutcome {
        let current = EncodingOutcome {
            method: entry.method,
            data: entry.data.to_vec(),
            crc32: entry.crc32,
            uncompressed_size: entry.uncompressed_size,
        };
        if !force_store && !recompress {
            return current;
        }
        let uncompressed = match codec::decompress(
            &entry.data,
            entry.method,
            entry.uncompressed_size as usize,
        ) {
            Ok(v) => v,
            Err(e) => {
                errors.collect(name.clone(), e);
                return current;
            }
        };
        let nested = self.cfg.recursive_store && is_zip_like(&entry.name);

        if force_store {
            if nested {
                match self.flatten(&uncompressed, errors) {
                    Ok(flat) => {
                        let crc = codec::crc32(&flat);
                        return EncodingOutcome::stored(flat, crc);
                    }
                    Err(e) => errors.collect(name.clone(), e),
                }
            }
            return EncodingOutcome::stored(uncompressed, entry.crc32);
        }

        let mut best = self.selector.select(name, &uncompressed, current, errors);
        if nested {
            // A file merely named like an archive may not parse as one; that
            // just leaves the unflattened encoding in place.
            match self.flatten(&uncompressed, errors) {
                Ok(flat) => {
                    let crc = codec::crc32(&flat);
                    let stored = EncodingOutcome::stored(flat.clone(), crc);
                    let candidate = self.selector.select(name, &flat, stored, errors);
                    if self.selector.cost_of(&candidate) < self.selector.cost_of(&best) {
                        best = candidate;
                    }
                }
                Err(e) => errors.collect(name.clone(), e),
            }
        }
        best
    }
}

fn send(ps: Option<&Sender<ProgressState>>, st: ProgressState) -> Result<()> {
    ps.map_or(Ok(()), |tx| {
        tx.send(st)
            .map_err(|_| anyhow::anyhow!("progress channel closed early"))
    })
}

fn tmp_path(p: &Path) -> PathBuf {
    let mut name = p.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    p.with_file_name(name)
}
