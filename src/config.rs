use std::{fs, io, path::PathBuf};

use anyhow::{Context, Result};
use jar_repack_core::cfg::RepackConfig;

use crate::cli_args::Args;

fn path_to_config(path: Option<PathBuf>) -> io::Result<PathBuf> {
    match path {
        Some(p) => {
            let meta = fs::metadata(&p)?;
            Ok(if meta.is_dir() {
                p.join("jar-repack.toml")
            } else {
                p
            })
        }
        None => Ok(PathBuf::from("jar-repack.toml"))
    }
}

pub fn read_config(path: Option<PathBuf>) -> io::Result<RepackConfig> {
    let path = path_to_config(path)?;
    let f = fs::read_to_string(path)?;
    toml::from_str(&f).map_err(io::Error::other)
}

/// Resolves the effective configuration: the config file when one is found
/// (`jar-repack.toml` by default), default settings otherwise, with
/// command-line switches applied on top.
pub fn resolve(args: &Args) -> Result<RepackConfig> {
    let mut cfg = match read_config(args.config.clone()) {
        Ok(c) => {
            println!("Config loaded successfully!");
            c
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => RepackConfig::default(),
        Err(e) => return Err(e).context("failed to read config"),
    };
    args.apply(&mut cfg);
    Ok(cfg)
}
