//! Per-request scratch space for uploads and intermediate files.
//!
//! Each request gets its own freshly created directory under the configured
//! scratch root, and every path handed out lives inside it with a random
//! name. Nothing is shared between requests except the scratch root itself.
//!
//! Cleanup happens in [`Scratch::release`], or in [`Drop`] if a request
//! returns early, fails, panics or is cancelled. Cleanup failures are logged
//! and otherwise ignored: leaking a file is better than hiding the real
//! result of the request.

use std::{fs, io};

use uuid::Uuid;

use crate::prelude::*;

/// What kind of scratch path to allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScratchKind {
    /// A file path. The file is not created; the caller or an external tool
    /// writes it.
    File,
    /// A directory, created immediately.
    Directory,
}

/// Scratch space owned by a single request.
#[derive(Debug)]
pub struct Scratch {
    /// Our private directory. `None` once released.
    root: Option<tempfile::TempDir>,
    /// Everything we've handed out, in allocation order.
    allocated: Vec<PathBuf>,
}

impl Scratch {
    /// Create a new scratch directory inside `parent`.
    pub fn new(parent: &Path) -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("ocr-api-")
            .tempdir_in(parent)
            .with_context(|| {
                format!("cannot create scratch directory in {:?}", parent.display())
            })?;
        trace!(path = %root.path().display(), "Created scratch directory");
        Ok(Self {
            root: Some(root),
            allocated: vec![],
        })
    }

    /// The directory holding all our allocations.
    #[cfg(test)]
    pub(crate) fn path(&self) -> &Path {
        self.root
            .as_ref()
            .map(|root| root.path())
            .unwrap_or_else(|| Path::new(""))
    }

    /// Allocate a unique path ending in `suffix`.
    pub fn allocate(&mut self, kind: ScratchKind, suffix: &str) -> Result<PathBuf> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| anyhow!("scratch space has already been released"))?;
        let path = root.path().join(format!("{}{}", Uuid::new_v4().simple(), suffix));
        if kind == ScratchKind::Directory {
            fs::create_dir(&path).with_context(|| {
                format!("cannot create scratch directory {:?}", path.display())
            })?;
        }
        self.allocated.push(path.clone());
        Ok(path)
    }

    /// Allocate a unique file path ending in `suffix`.
    pub fn file(&mut self, suffix: &str) -> Result<PathBuf> {
        self.allocate(ScratchKind::File, suffix)
    }

    /// Allocate and create a unique directory whose name ends in `suffix`.
    pub fn dir(&mut self, suffix: &str) -> Result<PathBuf> {
        self.allocate(ScratchKind::Directory, suffix)
    }

    /// Remove everything we allocated, plus our own directory.
    pub fn release(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        for path in self.allocated.drain(..).rev() {
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!(
                    path = %path.display(),
                    "failed to delete scratch path: {}",
                    err
                ),
            }
        }
        if let Some(root) = self.root.take() {
            let root_path = root.path().to_owned();
            if let Err(err) = root.close()
                && err.kind() != io::ErrorKind::NotFound
            {
                error!(
                    directory = ?root_path.display(),
                    "failed to delete scratch directory: {}",
                    err
                );
            }
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        self.release_all();
    }
}
