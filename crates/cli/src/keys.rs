use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use slotdump_core::ntr::key1::{Generation, Key1Table};

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("org", "slotdump", "slotdump").ok_or_else(|| anyhow!("no home directory"))
}

/// Where the base table for `generation` is looked up when no path is given.
pub fn default_path(generation: Generation) -> Result<PathBuf> {
    let mut path = project_dirs()?.config_dir().to_path_buf();
    path.push(match generation {
        Generation::Ntr => "key1_ntr.bin",
        Generation::Twl => "key1_twl.bin",
    });
    Ok(path)
}

pub fn load(path: Option<PathBuf>, generation: Generation) -> Result<(PathBuf, Key1Table)> {
    let path = match path {
        Some(p) => p,
        None => default_path(generation)?,
    };
    let bytes = std::fs::read(&path).with_context(|| format!("reading KEY1 table {}", path.display()))?;
    let table = Key1Table::from_bytes(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    tracing::debug!(path = %path.display(), "KEY1 table loaded");
    Ok((path, table))
}
