use std::{num::NonZeroU8, path::PathBuf};

use jar_repack_core::cfg::{CfgZopfli, DedupMode, RepackConfig, Strategy};

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Args {
    /// Path to a JAR/ZIP archive
    pub path: PathBuf,

    /// (Optional) Destination path. It cannot be the same as the source!
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Overwrite the destination if it already exists
    #[arg(short = 'f', long)]
    pub overwrite: bool,

    /// Replace all timestamps with the earliest DOS time/date
    #[arg(short = 't', long)]
    pub remove_timestamps: bool,

    /// Zero size fields in local headers
    #[arg(long)]
    pub remove_sizes: bool,

    /// Blank file names in local headers (the manifest keeps its name)
    #[arg(long)]
    pub remove_names: bool,

    /// Drop entry comments and the archive comment
    #[arg(long)]
    pub remove_comments: bool,

    /// Drop extra fields from all headers
    #[arg(long)]
    pub remove_extra: bool,

    /// Drop directory markers and empty files
    #[arg(short = 'e', long)]
    pub remove_empty: bool,

    /// Write sentinel values into central directory size fields
    #[arg(long)]
    pub mask_central_sizes: bool,

    /// Mark the archive as self-executable via an extra field on the first entry
    #[arg(long)]
    pub mark_executable: bool,

    /// Reorder entries: manifest first, the rest by name
    #[arg(short = 's', long)]
    pub sort: bool,

    /// Flatten nested JAR/ZIP entries to stored form and recompress them whole
    #[arg(short = 'r', long)]
    pub recursive_store: bool,

    /// Only strip metadata, do not recompress entry data
    #[arg(long)]
    pub no_recompress: bool,

    /// Enable Zopfli compression (better, but much slower) and apply a number of iterations
    #[arg(short = 'z', long)]
    pub zopfli: Option<NonZeroU8>,

    /// How many codec variants to try per entry
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Compare deflate candidates by exact bit count
    #[arg(long)]
    pub bit_exact: bool,

    /// Run codec trials across a thread pool
    #[arg(short = 'p', long)]
    pub parallel: bool,

    /// Never merge entries with identical content
    #[arg(long)]
    pub no_dedup: bool,

    /// Exempt an entry name from size/name stripping (can be repeated)
    #[arg(short = 'x', long = "exclude")]
    pub excludes: Vec<String>,

    /// (Optional) Use custom .toml config file. If no path is provided, it will use `jar-repack.toml`
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Do not print file errors
    #[arg(long)]
    pub silent: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum StrategyArg {
    Fast,
    MultiCheap,
    Extensive,
}
impl From<StrategyArg> for Strategy {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::Fast => Self::Fast,
            StrategyArg::MultiCheap => Self::MultiCheap,
            StrategyArg::Extensive => Self::Extensive,
        }
    }
}

impl Args {
    /// Applies command-line switches on top of a base configuration. Switches
    /// only ever turn behavior on (or off, for the `no_*` family), so a config
    /// file stays authoritative for everything left untouched.
    pub fn apply(&self, cfg: &mut RepackConfig) {
        cfg.remove_timestamps |= self.remove_timestamps;
        cfg.remove_sizes |= self.remove_sizes;
        cfg.remove_names |= self.remove_names;
        cfg.remove_comments |= self.remove_comments;
        cfg.remove_extra |= self.remove_extra;
        cfg.remove_empty |= self.remove_empty;
        cfg.mask_central_sizes |= self.mask_central_sizes;
        cfg.mark_executable |= self.mark_executable;
        cfg.sort_entries |= self.sort;
        cfg.recursive_store |= self.recursive_store;
        cfg.bit_exact |= self.bit_exact;
        cfg.parallel |= self.parallel;
        if self.no_recompress {
            cfg.recompress_deflate = false;
            cfg.recompress_store = false;
        }
        if let Some(z) = self.zopfli {
            cfg.zopfli = CfgZopfli::Iter(z.get());
        }
        if let Some(s) = self.strategy {
            cfg.strategy = s.into();
        }
        if self.no_dedup {
            cfg.dedup = DedupMode::SourceOffset;
        }
        cfg.excludes.extend(self.excludes.iter().cloned());
    }
}
