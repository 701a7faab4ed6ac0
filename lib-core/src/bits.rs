//! Exact bit-length measurement of raw deflate streams.
//!
//! Two deflate streams of equal byte length can differ by up to 7 bits of
//! real payload, so byte-length comparison masks genuinely smaller encodings
//! as ties. This module walks a stream block by block (RFC 1951), consuming
//! symbols without producing output, and reports the number of bits up to and
//! including the end-of-stream code of the final block.

use anyhow::{bail, ensure, Result};

const MAX_BITS: usize = 15;
const END_OF_BLOCK: u16 = 256;

/// Extra bits per length symbol 257..=285.
const LEN_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
/// Extra bits per distance symbol 0..=29.
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];
/// Order in which code-length code lengths are stored in a dynamic header.
const CLEN_ORDER: [usize; 19] = [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

/// Measures the exact number of bits a raw deflate stream occupies.
///
/// Trailing padding and any bytes after the final block are not counted.
///
/// # Errors
///
/// Returns an error if the stream is truncated or not valid deflate; callers
/// fall back to byte-length comparison in that case.
pub fn deflate_bit_length(data: &[u8]) -> Result<u64> {
    let mut r = BitReader::new(data);
    loop {
        let last = r.bits(1)?;
        match r.bits(2)? {
            0 => r.skip_stored_block()?,
            1 => {
                let (lit, dist) = fixed_tables();
                skip_compressed_block(&mut r, &lit, &dist)?;
            }
            2 => {
                let (lit, dist) = dynamic_tables(&mut r)?;
                skip_compressed_block(&mut r, &lit, &dist)?;
            }
            _ => bail!("reserved block type"),
        }
        if last == 1 {
            return Ok(r.pos as u64);
        }
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    /// Bit position from the start of the stream.
    pos: usize,
}
impl<'a> BitReader<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
    fn bit(&mut self) -> Result<u32> {
        let byte = self.pos >> 3;
        ensure!(byte < self.data.len(), "truncated deflate stream");
        let b = u32::from(self.data[byte] >> (self.pos & 7)) & 1;
        self.pos += 1;
        Ok(b)
    }
    fn bits(&mut self, n: u8) -> Result<u32> {
        let mut acc = 0;
        for i in 0..n {
            acc |= self.bit()? << i;
        }
        Ok(acc)
    }
    fn skip_stored_block(&mut self) -> Result<()> {
        // Stored blocks restart at a byte boundary with LEN / one's
        // complement NLEN, then LEN literal bytes.
        self.pos = (self.pos + 7) & !7;
        let len = self.bits(16)?;
        let nlen = self.bits(16)?;
        ensure!(len ^ nlen == 0xFFFF, "stored block length mismatch");
        let end = self.pos + len as usize * 8;
        ensure!(end <= self.data.len() * 8, "truncated stored block");
        self.pos = end;
        Ok(())
    }
}

/// Canonical Huffman decoding state: per-length code counts and the symbols
/// sorted by code length.
struct Huffman {
    count: [u16; MAX_BITS + 1],
    symbol: Vec<u16>,
}
impl Huffman {
    fn build(lengths: &[u8]) -> Result<Self> {
        let mut count = [0u16; MAX_BITS + 1];
        for &l in lengths {
            count[l as usize] += 1;
        }
        count[0] = 0;
        let mut left = 1i32;
        for c in &count[1..] {
            left = (left << 1) - i32::from(*c);
            ensure!(left >= 0, "over-subscribed code set");
        }
        let mut offs = [0u16; MAX_BITS + 2];
        for l in 1..=MAX_BITS {
            offs[l + 1] = offs[l] + count[l];
        }
        let mut symbol = vec![0u16; lengths.iter().filter(|&&l| l != 0).count()];
        for (sym, &l) in lengths.iter().enumerate() {
            if l != 0 {
                symbol[offs[l as usize] as usize] = sym as u16;
                offs[l as usize] += 1;
            }
        }
        Ok(Self { count, symbol })
    }

    fn decode(&self, r: &mut BitReader<'_>) -> Result<u16> {
        let mut code = 0u32;
        let mut first = 0u32;
        let mut index = 0u32;
        for len in 1..=MAX_BITS {
            code |= r.bit()?;
            let count = u32::from(self.count[len]);
            if code < first + count {
                return Ok(self.symbol[(index + code - first) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        bail!("invalid huffman code")
    }
}

fn fixed_tables() -> (Huffman, Huffman) {
    let mut lit = [0u8; 288];
    lit[..144].fill(8);
    lit[144..256].fill(9);
    lit[256..280].fill(7);
    lit[280..].fill(8);
    let dist = [5u8; 30];
    // The fixed code sets can never be over-subscribed.
    (Huffman::build(&lit).unwrap(), Huffman::build(&dist).unwrap())
}

fn dynamic_tables(r: &mut BitReader<'_>) -> Result<(Huffman, Huffman)> {
    let hlit = r.bits(5)? as usize + 257;
    let hdist = r.bits(5)? as usize + 1;
    let hclen = r.bits(4)? as usize + 4;
    ensure!(hlit <= 286 && hdist <= 30, "bad dynamic header counts");

    let mut clen = [0u8; 19];
    for &i in &CLEN_ORDER[..hclen] {
        clen[i] = r.bits(3)? as u8;
    }
    let cl = Huffman::build(&clen)?;

    let mut lengths = Vec::with_capacity(hlit + hdist);
    while lengths.len() < hlit + hdist {
        let sym = cl.decode(r)?;
        match sym {
            0..=15 => lengths.push(sym as u8),
            16 => {
                let Some(&prev) = lengths.last() else {
                    bail!("repeat with no previous length");
                };
                let n = 3 + r.bits(2)? as usize;
                lengths.extend(std::iter::repeat(prev).take(n));
            }
            17 => {
                let n = 3 + r.bits(3)? as usize;
                lengths.extend(std::iter::repeat(0).take(n));
            }
            _ => {
                let n = 11 + r.bits(7)? as usize;
                lengths.extend(std::iter::repeat(0).take(n));
            }
        }
    }
    ensure!(lengths.len() == hlit + hdist, "length run past header counts");
    ensure!(lengths[END_OF_BLOCK as usize] != 0, "missing end-of-block code");
    Ok((Huffman::build(&lengths[..hlit])?, Huffman::build(&lengths[hlit..])?))
}

fn skip_compressed_block(r: &mut BitReader<'_>, lit: &Huffman, dist: &Huffman) -> Result<()> {
    loop {
        let sym = lit.decode(r)?;
        if sym == END_OF_BLOCK {
            return Ok(());
        }
        if sym < END_OF_BLOCK {
            continue;
        }
        ensure!(sym <= 285, "invalid length symbol {sym}");
        r.bits(LEN_EXTRA[sym as usize - 257])?;
        let d = dist.decode(r)?;
        ensure!(d < 30, "invalid distance symbol {d}");
        r.bits(DIST_EXTRA[d as usize])?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn deflate(data: &[u8], level: u32) -> Vec<u8> {
        let mut enc =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::new(level));
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn fits_last_byte() {
        let z = deflate(b"the quick brown fox jumps over the lazy dog, twice over", 9);
        let bits = deflate_bit_length(&z).unwrap();
        assert!(bits <= z.len() as u64 * 8);
        assert!(bits > (z.len() as u64 - 1) * 8);
    }

    #[test]
    fn ignores_trailing_bytes() {
        let mut z = deflate(b"aaaaaaaaaaaaaaaaaaaabbbbbbbbbb", 6);
        let bits = deflate_bit_length(&z).unwrap();
        z.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        assert_eq!(deflate_bit_length(&z).unwrap(), bits);
    }

    #[test]
    fn stored_blocks() {
        let data = vec![7u8; 1000];
        let z = deflate(&data, 0);
        let bits = deflate_bit_length(&z).unwrap();
        assert!(bits <= z.len() as u64 * 8);
    }

    #[test]
    fn rejects_garbage() {
        // Final block with reserved type 3.
        assert!(deflate_bit_length(&[0x07]).is_err());
        assert!(deflate_bit_length(&[]).is_err());
    }
}
