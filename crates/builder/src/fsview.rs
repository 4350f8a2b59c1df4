//! Symlink-aware view of a staged filesystem tree
//!
//! A naive directory walker follows symlinks, which would turn library
//! symlinks into duplicate regular files and destroy SONAME detection. The
//! [`TreeView`] trait keeps symlinks visible as symlinks and guarantees a
//! deterministic entry order, so every consumer (dependency scanners, the
//! installed-size walk, the tar writer) sees the same tree bytes-for-bytes.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use apkforge_errors::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Entry kind as seen by `lstat` semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
}

/// One entry of the view, keyed by its slash-separated relative path.
///
/// Sizes are filesystem-independent: directories count zero bytes and
/// symlinks count the length of their target string, so installed-size
/// sums reproduce across machines.
#[derive(Debug, Clone)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    pub mode: u32,
    pub size: u64,
}

/// Read-only, deterministically ordered tree abstraction.
///
/// Implemented by [`WorkspaceView`] over a staged directory and by
/// [`MemoryView`] for the in-memory control and signature trees.
pub trait TreeView {
    /// All entries, sorted lexicographically by full path.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying tree cannot be enumerated, or
    /// `Error::Cancelled` when the token fires mid-walk.
    fn entries(&self, cancel: &CancellationToken) -> Result<Vec<Entry>>;

    /// Open a regular file's content for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not name a readable regular file.
    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>>;

    /// The raw target string of a symlink entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not name a symlink.
    fn read_link(&self, path: &str) -> Result<String>;
}

/// View over a staged workspace subdirectory on disk
#[derive(Debug, Clone)]
pub struct WorkspaceView {
    root: PathBuf,
}

impl WorkspaceView {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collect(
        &self,
        dir: &Path,
        prefix: &str,
        out: &mut Vec<Entry>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut names = Vec::new();
        let iter = fs::read_dir(dir).map_err(|e| Error::io_with_path(&e, dir))?;
        for dirent in iter {
            let dirent = dirent.map_err(|e| Error::io_with_path(&e, dir))?;
            names.push(dirent.file_name());
        }
        names.sort();

        for name in names {
            let disk_path = dir.join(&name);
            let rel = if prefix.is_empty() {
                name.to_string_lossy().into_owned()
            } else {
                format!("{prefix}/{}", name.to_string_lossy())
            };

            let meta =
                fs::symlink_metadata(&disk_path).map_err(|e| Error::io_with_path(&e, &disk_path))?;
            let file_type = meta.file_type();
            let mode = meta.permissions().mode() & 0o7777;

            if file_type.is_symlink() {
                let target =
                    fs::read_link(&disk_path).map_err(|e| Error::io_with_path(&e, &disk_path))?;
                out.push(Entry {
                    path: rel,
                    kind: EntryKind::Symlink,
                    mode: 0o777,
                    size: target.as_os_str().len() as u64,
                });
            } else if file_type.is_dir() {
                out.push(Entry {
                    path: rel.clone(),
                    kind: EntryKind::Dir,
                    mode,
                    size: 0,
                });
                self.collect(&disk_path, &rel, out, cancel)?;
            } else if file_type.is_file() {
                out.push(Entry {
                    path: rel,
                    kind: EntryKind::File,
                    mode,
                    size: meta.len(),
                });
            }
            // sockets, fifos and device nodes never belong in a package
        }

        Ok(())
    }
}

impl TreeView for WorkspaceView {
    fn entries(&self, cancel: &CancellationToken) -> Result<Vec<Entry>> {
        let mut out = Vec::new();
        self.collect(&self.root, "", &mut out, cancel)?;
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>> {
        let disk_path = self.root.join(path);
        let file = fs::File::open(&disk_path).map_err(|e| Error::io_with_path(&e, &disk_path))?;
        Ok(Box::new(file))
    }

    fn read_link(&self, path: &str) -> Result<String> {
        let disk_path = self.root.join(path);
        let target = fs::read_link(&disk_path).map_err(|e| Error::io_with_path(&e, &disk_path))?;
        Ok(target.to_string_lossy().into_owned())
    }
}

/// In-memory tree of regular files, used for the control and signature
/// sections. Ordering falls out of the `BTreeMap` key order.
#[derive(Debug, Default)]
pub struct MemoryView {
    files: BTreeMap<String, MemoryFile>,
}

#[derive(Debug)]
struct MemoryFile {
    mode: u32,
    content: Vec<u8>,
}

impl MemoryView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, mode: u32, content: Vec<u8>) {
        self.files.insert(path.into(), MemoryFile { mode, content });
    }
}

impl TreeView for MemoryView {
    fn entries(&self, cancel: &CancellationToken) -> Result<Vec<Entry>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(self
            .files
            .iter()
            .map(|(path, file)| Entry {
                path: path.clone(),
                kind: EntryKind::File,
                mode: file.mode,
                size: file.content.len() as u64,
            })
            .collect())
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>> {
        let file = self
            .files
            .get(path)
            .ok_or_else(|| Error::internal(format!("no such in-memory file: {path}")))?;
        Ok(Box::new(Cursor::new(file.content.as_slice())))
    }

    fn read_link(&self, path: &str) -> Result<String> {
        Err(Error::internal(format!(
            "in-memory trees carry no symlinks: {path}"
        )))
    }
}
