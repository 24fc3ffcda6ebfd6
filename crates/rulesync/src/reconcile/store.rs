//! Filesystem primitives used by the reconciler.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Mode of tenant directories.
pub const DIR_MODE: u32 = 0o755;
/// Mode of rules files.
pub const FILE_MODE: u32 = 0o644;

/// The three mutations the reconciler performs on the output tree.
pub trait RuleStore {
    /// Creates `path` and any missing parents. An existing path is success.
    fn ensure_dir(&self, path: &Path) -> Result<(), StorageError>;

    /// Replaces the content of the file at `path`.
    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), StorageError>;

    /// Recursively deletes `path`. A missing path is success.
    fn remove_tree(&self, path: &Path) -> Result<(), StorageError>;
}

impl<S: RuleStore + ?Sized> RuleStore for &S {
    fn ensure_dir(&self, path: &Path) -> Result<(), StorageError> {
        (**self).ensure_dir(path)
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), StorageError> {
        (**self).write_file(path, content)
    }

    fn remove_tree(&self, path: &Path) -> Result<(), StorageError> {
        (**self).remove_tree(path)
    }
}

/// [`RuleStore`] backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStore;

/// Sibling path the content is staged in before it replaces `path`.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

fn write_staged(staging: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }

    let mut file = options.open(staging)?;
    file.write_all(content)?;

    // The requested mode is subject to the umask; pin it.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(FILE_MODE))?;
    }

    file.sync_all()
}

impl RuleStore for FileStore {
    fn ensure_dir(&self, path: &Path) -> Result<(), StorageError> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }

        match builder.create(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Stages the content in a sibling file and renames it over the target,
    /// so a reader sees either the old or the new content in full.
    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), StorageError> {
        let staging = staging_path(path);

        let result = write_staged(&staging, content).and_then(|()| std::fs::rename(&staging, path));
        if let Err(e) = result {
            if let Err(cleanup) = std::fs::remove_file(&staging) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    log::debug!(
                        "Failed to clean up staging file '{}': {}",
                        staging.display(),
                        cleanup
                    );
                }
            }
            return Err(StorageError::WriteFile {
                path: path.to_path_buf(),
                source: e,
            });
        }

        Ok(())
    }

    fn remove_tree(&self, path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveDirectory {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}
