// ── Transfer walker – recursive size walk and recursive mirror ───────────────
//
// The remote tree is reached through a small seam so the recursion can be
// exercised without a live SFTP server. Absent paths are an expected case,
// not an error: a node that produced no data for the query period simply has
// no directory. Each absence still gets a debug line so a misconfigured path
// can be spotted with verbose logging.

use crate::fleet::error::WorkerError;
use log::debug;
use ssh2::Sftp;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

// ── Remote tree seam ─────────────────────────────────────────────────────────

/// The explicit three-way classification of a remote path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteEntry {
    Absent,
    Leaf { size: u64 },
    Container,
}

pub trait RemoteTree {
    fn classify(&self, path: &Path) -> Result<RemoteEntry, String>;
    /// Immediate children of a container, as full remote paths.
    fn list(&self, path: &Path) -> Result<Vec<PathBuf>, String>;
    fn open(&self, path: &Path) -> Result<Box<dyn Read + '_>, String>;
}

/// Live SFTP implementation. A failed stat is treated as absence, matching
/// the "copy what exists" contract.
pub struct SftpTree<'a> {
    sftp: &'a Sftp,
}

impl<'a> SftpTree<'a> {
    pub fn new(sftp: &'a Sftp) -> Self {
        SftpTree { sftp }
    }
}

impl RemoteTree for SftpTree<'_> {
    fn classify(&self, path: &Path) -> Result<RemoteEntry, String> {
        match self.sftp.stat(path) {
            Ok(stat) if stat.is_dir() => Ok(RemoteEntry::Container),
            Ok(stat) => Ok(RemoteEntry::Leaf {
                size: stat.size.unwrap_or(0),
            }),
            Err(_) => Ok(RemoteEntry::Absent),
        }
    }

    fn list(&self, path: &Path) -> Result<Vec<PathBuf>, String> {
        let entries = self
            .sftp
            .readdir(path)
            .map_err(|e| format!("readdir '{}' failed: {}", path.display(), e))?;
        Ok(entries.into_iter().map(|(p, _)| p).collect())
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + '_>, String> {
        let file = self
            .sftp
            .open(path)
            .map_err(|e| format!("open remote '{}' failed: {}", path.display(), e))?;
        Ok(Box::new(file))
    }
}

// ── Size walk ────────────────────────────────────────────────────────────────

/// Total bytes under `remote`, depth-first. Absent → 0, leaf → its length,
/// container → sum of children.
pub fn tree_size<T: RemoteTree + ?Sized>(tree: &T, remote: &Path) -> Result<u64, WorkerError> {
    match tree.classify(remote).map_err(WorkerError::Transfer)? {
        RemoteEntry::Absent => {
            debug!("remote path {} is absent, sizing as 0", remote.display());
            Ok(0)
        }
        RemoteEntry::Leaf { size } => Ok(size),
        RemoteEntry::Container => {
            let mut total = 0u64;
            for child in tree.list(remote).map_err(WorkerError::Transfer)? {
                total += tree_size(tree, &child)?;
            }
            Ok(total)
        }
    }
}

// ── Mirror ───────────────────────────────────────────────────────────────────

/// Recursively copy `remote` to `local`. Containers are recreated before
/// descending; leaves are streamed in `chunk_size` reads with `on_chunk`
/// receiving each incremental byte count. `on_chunk` may return an error to
/// abort the whole job (this is how cancellation reaches the innermost loop).
/// Absent remote paths are skipped; no leaf is ever retried.
pub fn mirror<T: RemoteTree + ?Sized>(
    tree: &T,
    remote: &Path,
    local: &Path,
    chunk_size: usize,
    on_chunk: &mut dyn FnMut(u64) -> Result<(), WorkerError>,
) -> Result<(), WorkerError> {
    match tree.classify(remote).map_err(WorkerError::Transfer)? {
        RemoteEntry::Absent => {
            debug!("remote path {} is absent, skipping", remote.display());
            Ok(())
        }
        RemoteEntry::Container => {
            fs::create_dir_all(local).map_err(|e| {
                WorkerError::Transfer(format!("mkdir '{}' failed: {}", local.display(), e))
            })?;
            for child in tree.list(remote).map_err(WorkerError::Transfer)? {
                let name = child.file_name().ok_or_else(|| {
                    WorkerError::Transfer(format!("unnamed remote entry under '{}'", remote.display()))
                })?;
                mirror(tree, &child, &local.join(name), chunk_size, on_chunk)?;
            }
            Ok(())
        }
        RemoteEntry::Leaf { .. } => {
            if let Some(parent) = local.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    WorkerError::Transfer(format!("mkdir '{}' failed: {}", parent.display(), e))
                })?;
            }
            copy_leaf(tree, remote, local, chunk_size, on_chunk)
        }
    }
}

fn copy_leaf<T: RemoteTree + ?Sized>(
    tree: &T,
    remote: &Path,
    local: &Path,
    chunk_size: usize,
    on_chunk: &mut dyn FnMut(u64) -> Result<(), WorkerError>,
) -> Result<(), WorkerError> {
    let mut reader = tree.open(remote).map_err(WorkerError::Transfer)?;
    let mut out = fs::File::create(local).map_err(|e| {
        WorkerError::Transfer(format!("create '{}' failed: {}", local.display(), e))
    })?;

    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = reader.read(&mut buf).map_err(|e| {
            WorkerError::Transfer(format!("read '{}' failed: {}", remote.display(), e))
        })?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(|e| {
            WorkerError::Transfer(format!("write '{}' failed: {}", local.display(), e))
        })?;
        on_chunk(n as u64)?;
    }
    out.flush()
        .map_err(|e| WorkerError::Transfer(format!("flush '{}' failed: {}", local.display(), e)))
}
