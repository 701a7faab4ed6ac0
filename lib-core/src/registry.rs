//! Registry of physically written entries.
//!
//! Local data is emitted in a first pass; the central directory follows in a
//! second pass whose size/method/offset fields are only known once the first
//! pass ran. The registry bridges the two, keyed either by content checksum
//! (deduplicating) or by source offset (collision-proof, no dedup).

use std::collections::HashMap;

use crate::cfg::DedupMode;

/// Identity of one entry across the two serialization passes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EntryKey {
    /// Content checksum; identical content shares one key.
    Checksum(u32),
    /// Offset of the local header in the source stream.
    Offset(u32),
}

/// Size, method and output position of an entry as actually written.
#[derive(Clone, Copy)]
pub struct EntryRecord {
    /// CRC-32 of the written content.
    pub crc32: u32,
    /// Uncompressed size of the written content.
    pub uncompressed_size: u32,
    /// Compressed size as written.
    pub compressed_size: u32,
    /// Compression method as written.
    pub method: u16,
    /// Offset of the local header in the output stream.
    pub offset: u32,
}

/// Maps entry keys to written records for one optimize pass.
pub struct EntryRegistry {
    mode: DedupMode,
    map: HashMap<EntryKey, EntryRecord>,
}

impl EntryRegistry {
    /// Creates an empty registry with the given addressing mode.
    #[must_use]
    pub fn new(mode: DedupMode) -> Self {
        Self { mode, map: HashMap::new() }
    }

    /// Builds the key identifying an entry with the given checksum and
    /// source offset under the active mode.
    #[must_use]
    pub const fn key(&self, crc32: u32, source_offset: u32) -> EntryKey {
        match self.mode {
            DedupMode::Checksum => EntryKey::Checksum(crc32),
            DedupMode::SourceOffset => EntryKey::Offset(source_offset),
        }
    }

    /// Whether deduplication is active.
    #[must_use]
    pub const fn dedups(&self) -> bool {
        matches!(self.mode, DedupMode::Checksum)
    }

    /// Whether a record for this key was already written.
    #[must_use]
    pub fn contains(&self, key: EntryKey) -> bool {
        self.map.contains_key(&key)
    }

    /// Records a written entry.
    pub fn record(&mut self, key: EntryKey, rec: EntryRecord) {
        self.map.insert(key, rec);
    }

    /// Registers an additional key resolving to an already written record.
    /// Used when selection replaced content (flattening changed the CRC) so
    /// central references carrying the original checksum still resolve.
    pub fn alias(&mut self, key: EntryKey, rec: EntryRecord) {
        self.map.entry(key).or_insert(rec);
    }

    /// Looks up the written record for a key. Absent keys mean the content
    /// was dropped; the central pass skips those references.
    #[must_use]
    pub fn lookup(&self, key: EntryKey) -> Option<&EntryRecord> {
        self.map.get(&key)
    }
}
