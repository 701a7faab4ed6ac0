//! Compression backends behind one capability trait, plus the raw
//! decompression and checksum primitives.
//!
//! Every backend emits a raw deflate stream. The configured strategy resolves
//! once into a fixed list of boxed codecs; heavy backends allocate their
//! buffers per call, so one instance can serve concurrent trials.

use std::io::{Read, Write};
use std::num::{NonZeroU64, NonZeroU8};

use anyhow::{bail, Context, Result};
use flate2::Compression;

use crate::cfg::{RepackConfig, Strategy};
use crate::format::{METHOD_DEFLATED, METHOD_STORED};

/// A single compression backend producing deflate streams.
pub trait Codec: Send + Sync {
    /// Short backend name used in error reports.
    fn name(&self) -> &'static str;
    /// Compresses `data` into a raw deflate stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; the selector treats that as
    /// "no candidate from this codec".
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// The standard deflate implementation at a fixed level.
pub struct FlateCodec {
    name: &'static str,
    level: Compression,
}
impl FlateCodec {
    const fn new(name: &'static str, level: u32) -> Self {
        Self { name, level: Compression::new(level) }
    }
}
impl Codec for FlateCodec {
    fn name(&self) -> &'static str {
        self.name
    }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut enc = flate2::write::DeflateEncoder::new(
            Vec::with_capacity(data.len() / 2),
            self.level,
        );
        enc.write_all(data)?;
        Ok(enc.finish()?)
    }
}

/// A Zopfli variant with a fixed iteration count and block splitting limit.
pub struct ZopfliCodec {
    name: &'static str,
    iterations: NonZeroU64,
    max_block_splits: u16,
}
impl ZopfliCodec {
    fn new(name: &'static str, iterations: NonZeroU8, max_block_splits: u16) -> Self {
        Self {
            name,
            iterations: NonZeroU64::from(iterations),
            max_block_splits,
        }
    }
    fn options(&self) -> zopfli::Options {
        zopfli::Options {
            iteration_count: self.iterations,
            iterations_without_improvement: NonZeroU64::new(6).unwrap(),
            maximum_block_splits: self.max_block_splits,
            ..Default::default()
        }
    }
}
impl Codec for ZopfliCodec {
    fn name(&self) -> &'static str {
        self.name
    }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut enc = zopfli::DeflateEncoder::new(
            self.options(),
            zopfli::BlockType::Dynamic,
            Vec::with_capacity(data.len() / 2),
        );
        enc.write_all(data)?;
        Ok(enc.finish()?)
    }
}

/// Resolves the configured codec set into a fixed list, built once at startup.
#[must_use]
pub fn codec_set(cfg: &RepackConfig) -> Vec<Box<dyn Codec>> {
    let mut v: Vec<Box<dyn Codec>> = Vec::new();
    if cfg.recompress_deflate {
        v.push(Box::new(FlateCodec::new("deflate", 9)));
        if cfg.strategy >= Strategy::MultiCheap {
            v.push(Box::new(FlateCodec::new("deflate-6", 6)));
            v.push(Box::new(FlateCodec::new("deflate-1", 1)));
        }
    }
    if let Some(ic) = cfg.zopfli.iter_count() {
        v.push(Box::new(ZopfliCodec::new("zopfli", ic, 15)));
        if cfg.strategy >= Strategy::Extensive {
            v.push(Box::new(ZopfliCodec::new("zopfli-nosplit", ic, 0)));
            v.push(Box::new(ZopfliCodec::new("zopfli-first", ic, 1)));
        }
    }
    v
}

/// Decompresses raw entry data under its declared method.
///
/// # Errors
///
/// Returns an error for unsupported methods or corrupt deflate streams.
pub fn decompress(data: &[u8], method: u16, size_hint: usize) -> Result<Vec<u8>> {
    match method {
        METHOD_STORED => Ok(data.to_vec()),
        METHOD_DEFLATED => {
            let mut v = Vec::with_capacity(size_hint);
            flate2::read::DeflateDecoder::new(data)
                .read_to_end(&mut v)
                .context("corrupt deflate stream")?;
            Ok(v)
        }
        m => bail!("unsupported compression method {m}"),
    }
}

/// CRC-32 of a byte slice.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    let mut c = flate2::Crc::new();
    c.update(data);
    c.sum()
}
