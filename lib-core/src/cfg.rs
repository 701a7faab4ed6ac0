//! Repacking configuration. A plain value struct resolved once at startup;
//! nothing in here is mutated after construction.

use serde::{Deserialize, Serialize};

/// How thoroughly the codec set is populated.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// One best-effort variant per enabled backend.
    #[default]
    Fast,
    /// Adds cheap deflate variants that occasionally win on odd inputs.
    MultiCheap,
    /// Adds expensive Zopfli variants with alternative block splitting.
    Extensive,
}

/// How written entries are keyed in the registry.
///
/// Checksum keying enables deduplication but can in principle conflate two
/// distinct entries that collide on CRC-32; offset keying never deduplicates
/// and is immune to that misattribution.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupMode {
    /// Key entries by content checksum, deduplicating identical content.
    #[default]
    Checksum,
    /// Key entries by source offset; no deduplication.
    SourceOffset,
}

/// Universal configuration for Zopfli.
/// It determines if Zopfli will be enabled and how many iterations will be used.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CfgZopfli {
    /// A switch value (`true` or `false`).
    /// If it is enabled then Zopfli will be enabled with 10 iterations by default.
    Switch(bool),
    /// An iteration count. If it is 0 then Zopfli will be disabled.
    Iter(u8),
}
impl Default for CfgZopfli {
    fn default() -> Self {
        Self::Switch(false)
    }
}
impl CfgZopfli {
    /// Returns the iteration count based on its state.
    #[inline]
    #[must_use]
    pub const fn iter_count(&self) -> Option<std::num::NonZeroU8> {
        match self {
            Self::Switch(false) => None,
            Self::Iter(x) => std::num::NonZeroU8::new(*x),
            Self::Switch(true) => std::num::NonZeroU8::new(10),
        }
    }
}

/// Configuration for one repacking run.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RepackConfig {
    /// Entry names exempted from size/name stripping, so standard zip tools
    /// can still find them.
    pub excludes: Vec<String>,
    /// Replace timestamps with the earliest representable DOS time/date.
    pub remove_timestamps: bool,
    /// Zero compressed/uncompressed size fields in local headers.
    pub remove_sizes: bool,
    /// Blank file names in local headers (the manifest keeps its name).
    pub remove_names: bool,
    /// Drop entry comments and the archive comment.
    pub remove_comments: bool,
    /// Drop extra fields from local and central headers.
    pub remove_extra: bool,
    /// Drop zero-length entries (directory markers and empty files).
    pub remove_empty: bool,
    /// Write the maximum representable sentinel into central size fields for
    /// entries outside the exclusion list.
    pub mask_central_sizes: bool,
    /// Append the executable marker extra field to the first local header.
    pub mark_executable: bool,
    /// Reorder entries so the manifest comes first, the rest lexicographic.
    pub sort_entries: bool,
    /// Recompress entries with the standard deflate implementation. On by
    /// default.
    pub recompress_deflate: bool,
    /// Store entries uncompressed when that is smaller. On by default.
    pub recompress_store: bool,
    /// Flatten nested archives to stored form and recompress them whole.
    pub recursive_store: bool,
    /// Zopfli recompression switch / iteration count.
    pub zopfli: CfgZopfli,
    /// Codec set thoroughness.
    pub strategy: Strategy,
    /// Compare deflate candidates by true bit count instead of byte length.
    pub bit_exact: bool,
    /// Run codec trials for one entry across a worker pool.
    pub parallel: bool,
    /// Registry addressing mode.
    pub dedup: DedupMode,
}

/// Default settings: deflate recompression and store fallback on,
/// checksum-keyed dedup, every policy off. An empty config file means these,
/// not "everything disabled".
impl Default for RepackConfig {
    fn default() -> Self {
        Self {
            excludes: Vec::new(),
            remove_timestamps: false,
            remove_sizes: false,
            remove_names: false,
            remove_comments: false,
            remove_extra: false,
            remove_empty: false,
            mask_central_sizes: false,
            mark_executable: false,
            sort_entries: false,
            recompress_deflate: true,
            recompress_store: true,
            recursive_store: false,
            zopfli: CfgZopfli::default(),
            strategy: Strategy::default(),
            bit_exact: false,
            parallel: false,
            dedup: DedupMode::default(),
        }
    }
}

impl RepackConfig {
    /// Checks whether any recompression work is enabled at all.
    #[must_use]
    pub const fn recompresses(&self) -> bool {
        self.recompress_deflate
            || self.recompress_store
            || self.recursive_store
            || self.zopfli.iter_count().is_some()
    }

    /// Checks an entry name against the exclusion list.
    #[must_use]
    pub fn is_excluded(&self, name: &[u8]) -> bool {
        self.excludes.iter().any(|e| e.as_bytes() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zopfli_iter_count() {
        assert_eq!(CfgZopfli::Switch(false).iter_count(), None);
        assert_eq!(CfgZopfli::Iter(0).iter_count(), None);
        assert_eq!(CfgZopfli::Switch(true).iter_count().unwrap().get(), 10);
        assert_eq!(CfgZopfli::Iter(25).iter_count().unwrap().get(), 25);
    }

    #[test]
    fn defaults_keep_recompression_on() {
        let cfg = RepackConfig::default();
        assert!(cfg.recompress_deflate && cfg.recompress_store);
        assert!(cfg.recompresses());
        let off = RepackConfig {
            recompress_deflate: false,
            recompress_store: false,
            ..RepackConfig::default()
        };
        assert!(!off.recompresses());
    }

    #[test]
    fn empty_config_file_keeps_recompression() {
        let cfg: RepackConfig = toml::from_str("").unwrap();
        assert!(cfg.recompress_deflate && cfg.recompress_store);

        let cfg: RepackConfig =
            toml::from_str("recompress-deflate = false\nzopfli = 10\n").unwrap();
        assert!(!cfg.recompress_deflate);
        assert!(cfg.recompress_store);
        assert_eq!(cfg.zopfli.iter_count().unwrap().get(), 10);
    }

    #[test]
    fn excludes_match_bytes() {
        let cfg = RepackConfig {
            excludes: vec!["plugin.yml".into()],
            ..RepackConfig::default()
        };
        assert!(cfg.is_excluded(b"plugin.yml"));
        assert!(!cfg.is_excluded(b"plugin.yaml"));
    }
}
