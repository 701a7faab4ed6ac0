use std::{path::{Path, PathBuf}, thread::{self, JoinHandle}, time::Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Sender;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

use jar_repack_core::{errors::{EntryError, ErrorCollector}, optimizer::Repacker, ProgressState};

mod cli_args;
mod config;

const PB_STYLE_ZIP: &str = "# {pos}/{len} {wide_msg}";

fn main() -> Result<()> {
    let args = cli_args::Args::parse();
    let dt = Instant::now();

    let cfg = config::resolve(&args)?;
    let repacker = Repacker::new(cfg);

    let nfp = args.out.clone().unwrap_or_else(|| file_name_repack(&args.path));
    let mut ec = ErrorCollector::new(args.silent);
    let (pj, ps) = thread_progress_bar(file_progress_bar());

    let res = repacker.optimize_file(&args.path, &nfp, args.overwrite, &ps, &mut ec);
    drop(ps);
    pj.join().map_err(|_| anyhow::anyhow!("progress thread panicked"))?;
    res.with_context(|| format!("repacking {}", args.path.display()))?;

    print_entry_errors(ec.results());

    let old_size = args.path.metadata()?.len();
    let new_size = nfp.metadata()?.len();
    println!(
        "Bytes saved: {} ({} -> {})",
        HumanBytes(old_size.saturating_sub(new_size)),
        HumanBytes(old_size),
        HumanBytes(new_size)
    );
    println!("Done in: {:.3?}", dt.elapsed());

    Ok(())
}

fn file_progress_bar() -> ProgressBar {
    ProgressBar::new(0).with_style(
        ProgressStyle::with_template(PB_STYLE_ZIP).unwrap()
    )
}

fn file_name_repack(p: &Path) -> PathBuf {
    let stem = p.file_stem().unwrap_or_default().to_string_lossy();
    let ext = p.extension().unwrap_or_default().to_string_lossy();
    let x = stem + "$repack." + ext;
    p.with_file_name(x.to_string())
}

fn thread_progress_bar(pb: ProgressBar) -> (JoinHandle<()>, Sender<ProgressState>) {
    let (ps, pr) = crossbeam_channel::unbounded();
    let pj = thread::spawn(move || {
        use ProgressState::*;
        for st in pr {
            match st {
                Start(u) => { pb.set_length(u as u64); }
                Push(num, msg) => {
                    pb.set_position(num as u64);
                    pb.set_message(msg.to_string());
                }
                Finish => {
                    pb.finish_with_message("Saving...");
                }
            }
        }
    });
    (pj, ps)
}

fn print_entry_errors(v: &[EntryError]) {
    if !v.is_empty() {
        eprintln!("Errors found in file entries:");
        for ere in v {
            eprintln!(" # {ere}");
        }
    }
}
