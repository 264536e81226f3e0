//! Expansion and validation of the file arguments handed to the uploader.
//!
//! `@list` arguments name a newline-separated file of paths. Directories
//! recurse when asked, otherwise they are skipped with a warning. Every
//! surviving path is stat'ed up front so the upload loop never discovers a
//! missing or empty file halfway through a batch.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use walkdir::WalkDir;

pub fn collect(args: &[String], recurse: bool) -> Result<Vec<(PathBuf, u64)>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for arg in args {
        if let Some(list) = arg.strip_prefix('@') {
            let content = std::fs::read_to_string(list)
                .with_context(|| format!("could not read @file list {list}"))?;
            paths.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(PathBuf::from),
            );
        } else {
            paths.push(PathBuf::from(arg));
        }
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for path in paths {
        if path.is_dir() {
            if recurse {
                for entry in WalkDir::new(&path).sort_by_file_name() {
                    let entry =
                        entry.with_context(|| format!("error walking {}", path.display()))?;
                    if entry.file_type().is_file() {
                        files.push(entry.into_path());
                    }
                }
            } else {
                log::warn!("skipping directory {} (use -r to recurse)", path.display());
            }
        } else {
            files.push(path);
        }
    }

    let mut sized = Vec::with_capacity(files.len());
    let mut missing: Vec<PathBuf> = Vec::new();
    for path in files {
        match std::fs::metadata(&path) {
            Ok(meta) if meta.len() == 0 => {
                bail!("{} is empty; zero-byte files cannot be uploaded", path.display())
            }
            Ok(meta) => sized.push((path, meta.len())),
            Err(_) => missing.push(path),
        }
    }

    if !missing.is_empty() {
        for path in &missing {
            log::error!("couldn't find file {}", path.display());
        }
        bail!("{} file(s) could not be found", missing.len());
    }
    if sized.is_empty() {
        bail!("you must specify one or more files to upload");
    }

    Ok(sized)
}
