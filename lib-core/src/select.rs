//! Compression selection: runs the configured codecs over an entry's content
//! and keeps the smallest valid encoding.

use rayon::prelude::*;

use crate::cfg::RepackConfig;
use crate::codec::{self, Codec};
use crate::errors::ErrorCollector;
use crate::format::{METHOD_DEFLATED, METHOD_STORED};
use crate::{bits, format};

/// The chosen encoding for one entry's content.
///
/// `crc32` and `uncompressed_size` always describe the actual bytes that will
/// decompress out of `data` under `method`; when content is replaced by a
/// flattened representation both are recomputed, never inherited.
pub struct EncodingOutcome {
    /// Compression method as written.
    pub method: u16,
    /// Raw entry data as written.
    pub data: Vec<u8>,
    /// CRC-32 of the content `data` decodes to.
    pub crc32: u32,
    /// Length of the content `data` decodes to.
    pub uncompressed_size: u32,
}

impl EncodingOutcome {
    /// A stored (verbatim) encoding of `data`.
    #[must_use]
    pub fn stored(data: Vec<u8>, crc32: u32) -> Self {
        let uncompressed_size = data.len() as u32;
        Self { method: format::METHOD_STORED, data, crc32, uncompressed_size }
    }

    /// Size of the entry data as written.
    #[must_use]
    pub const fn compressed_size(&self) -> usize {
        self.data.len()
    }
}

/// Picks the smallest encoding among the configured codec trials, the store
/// fallback and the entry's current encoding.
pub struct Selector {
    codecs: Vec<Box<dyn Codec>>,
    store: bool,
    bit_exact: bool,
    parallel: bool,
}

impl Selector {
    /// Resolves the configuration into a fixed selector, built once per run.
    #[must_use]
    pub fn from_config(cfg: &RepackConfig) -> Self {
        Self {
            codecs: codec::codec_set(cfg),
            store: cfg.recompress_store,
            bit_exact: cfg.bit_exact,
            parallel: cfg.parallel,
        }
    }

    #[cfg(test)]
    fn with_codecs(codecs: Vec<Box<dyn Codec>>, store: bool, bit_exact: bool) -> Self {
        Self { codecs, store, bit_exact, parallel: false }
    }

    /// Comparison cost of an encoding. Byte length by default; in bit-exact
    /// mode a deflate stream is costed by its true consumed bit count, with
    /// unparseable streams falling back to whole bytes.
    #[must_use]
    pub fn cost(&self, method: u16, data: &[u8]) -> u64 {
        let bytes = data.len() as u64 * 8;
        if self.bit_exact && method == METHOD_DEFLATED {
            bits::deflate_bit_length(data).map_or(bytes, |b| b.min(bytes))
        } else {
            bytes
        }
    }

    /// Convenience for costing a full outcome.
    #[must_use]
    pub fn cost_of(&self, outcome: &EncodingOutcome) -> u64 {
        self.cost(outcome.method, &outcome.data)
    }

    /// Runs every configured codec over `uncompressed` and returns the
    /// smallest result, keeping `current` unless a candidate is strictly
    /// smaller. Equal-cost candidates never replace an earlier winner, so
    /// selection stays deterministic. A failing codec contributes no
    /// candidate; its error is collected under `name`.
    pub fn select(
        &self,
        name: &str,
        uncompressed: &[u8],
        current: EncodingOutcome,
        errors: &mut ErrorCollector,
    ) -> EncodingOutcome {
        let mut best_cost = self.cost_of(&current);
        let mut best = current;

        let trials: Vec<anyhow::Result<Vec<u8>>> = if self.parallel {
            // Fan out across the worker pool; results are folded below in
            // codec order so the winner does not depend on completion order.
            self.codecs.par_iter().map(|c| c.compress(uncompressed)).collect()
        } else {
            self.codecs.iter().map(|c| c.compress(uncompressed)).collect()
        };
        for (codec, trial) in self.codecs.iter().zip(trials) {
            match trial {
                Ok(data) => {
                    let cost = self.cost(METHOD_DEFLATED, &data);
                    if cost < best_cost {
                        best_cost = cost;
                        best = EncodingOutcome {
                            method: METHOD_DEFLATED,
                            data,
                            crc32: best.crc32,
                            uncompressed_size: best.uncompressed_size,
                        };
                    }
                }
                Err(e) => {
                    errors.collect(name, e.context(format!("codec {}", codec.name())));
                }
            }
        }

        if self.store && self.cost(METHOD_STORED, uncompressed) < best_cost {
            best = EncodingOutcome {
                method: METHOD_STORED,
                data: uncompressed.to_vec(),
                crc32: best.crc32,
                uncompressed_size: best.uncompressed_size,
            };
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    struct FixedCodec(&'static str, &'static [u8]);
    impl Codec for FixedCodec {
        fn name(&self) -> &'static str {
            self.0
        }
        fn compress(&self, _: &[u8]) -> anyhow::Result<Vec<u8>> {
            Ok(self.1.to_vec())
        }
    }

    struct FailingCodec;
    impl Codec for FailingCodec {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn compress(&self, _: &[u8]) -> anyhow::Result<Vec<u8>> {
            bail!("backend exploded")
        }
    }

    fn current_for(data: &[u8]) -> EncodingOutcome {
        EncodingOutcome::stored(data.to_vec(), codec::crc32(data))
    }

    /// Deterministic incompressible bytes without pulling in a RNG.
    fn noise(n: usize) -> Vec<u8> {
        let mut x = 0x2545_F491_4F6C_DD1Du64;
        (0..n)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                (x >> 32) as u8
            })
            .collect()
    }

    #[test]
    fn compressible_content_deflates() {
        let sel = Selector::from_config(&crate::cfg::RepackConfig::default());
        let data = b"repeat repeat repeat repeat repeat repeat repeat".repeat(8);
        let out = sel.select("a.txt", &data, current_for(&data), &mut ErrorCollector::new(false));
        assert_eq!(out.method, METHOD_DEFLATED);
        assert!(out.compressed_size() < data.len());
        assert_eq!(codec::decompress(&out.data, out.method, data.len()).unwrap(), data);
    }

    #[test]
    fn incompressible_content_stays_stored() {
        let sel = Selector::from_config(&crate::cfg::RepackConfig::default());
        let data = noise(10 * 1024);
        let out = sel.select("n.bin", &data, current_for(&data), &mut ErrorCollector::new(false));
        assert_eq!(out.method, METHOD_STORED);
        assert_eq!(out.compressed_size(), data.len());
    }

    #[test]
    fn failing_codec_is_skipped() {
        let sel = Selector::with_codecs(vec![Box::new(FailingCodec)], true, false);
        let data = noise(256);
        let mut ec = ErrorCollector::new(false);
        let out = sel.select("f.bin", &data, current_for(&data), &mut ec);
        assert_eq!(out.method, METHOD_STORED);
        assert_eq!(ec.results().len(), 1);
        assert!(ec.results()[0].to_string().contains("failing"));
    }

    /// A final fixed-Huffman block encoding nothing: 10 real bits, padded to
    /// 8 bytes with trailing zeros the bit walker does not count.
    const SHORT_TAIL: &[u8] = &[0x03, 0x00, 0, 0, 0, 0, 0, 0];
    /// A final stored block with a 3-byte payload: all 8 bytes are payload,
    /// 64 real bits.
    const WHOLE_BYTE: &[u8] = &[0x01, 0x03, 0x00, 0xFC, 0xFF, b'x', b'y', b'z'];

    #[test]
    fn bit_exact_breaks_byte_ties() {
        // Both candidates are 8 bytes; only their consumed bit counts differ.
        let codecs = || -> Vec<Box<dyn Codec>> {
            vec![
                Box::new(FixedCodec("whole-byte", WHOLE_BYTE)),
                Box::new(FixedCodec("short-tail", SHORT_TAIL)),
            ]
        };
        let data = noise(64);
        let mut ec = ErrorCollector::new(false);

        // Byte-length comparison calls them a tie and keeps the earlier one.
        let sel = Selector::with_codecs(codecs(), false, false);
        let out = sel.select("t.bin", &data, current_for(&data), &mut ec);
        assert_eq!(out.data, WHOLE_BYTE);

        // Bit-exact comparison sees the shorter tail.
        let sel = Selector::with_codecs(codecs(), false, true);
        let out = sel.select("t.bin", &data, current_for(&data), &mut ec);
        assert_eq!(out.data, SHORT_TAIL);
        assert!(ec.results().is_empty());
    }

    #[test]
    fn ties_keep_the_earlier_winner() {
        // Current encoding already stored; a store candidate of equal size
        // must not replace it, nor may any equal-size deflate result.
        let sel = Selector::with_codecs(vec![], true, false);
        let data = noise(64);
        let current = current_for(&data);
        let out = sel.select("t.bin", &data, current, &mut ErrorCollector::new(false));
        assert_eq!(out.method, METHOD_STORED);
        assert_eq!(out.data, data);
    }
}
