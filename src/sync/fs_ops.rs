//! Filesystem mutations applied to the replica.
//!
//! Removal tolerates read-only members: when the platform refuses to delete
//! because of permissions, write permission is restored on the affected
//! entries and the removal is retried once.

use std::{
    fs::{
        self, File, FileTimes, Metadata, OpenOptions, set_permissions, symlink_metadata,
    },
    io::{
        ErrorKind::{NotFound, PermissionDenied},
        Result as IoResult,
    },
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{error::SyncError, sync::outcome::Operation};

/// Creates `path` and any missing parents.
///
/// # Errors
///
/// Returns `SyncError::CreateDir` if creation fails.
pub fn create_dir_all(path: &Path) -> Result<(), SyncError> {
    fs::create_dir_all(path).map_err(|source| SyncError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Copies `from` over `to`, overwriting whatever is there.
///
/// Permissions are copied with the content; access and modification times are
/// carried over when the platform allows it. A directory or symlink occupying
/// `to` is removed first so the copy never writes through a link.
///
/// # Errors
///
/// Returns `SyncError::Copy` if the destination cannot be cleared or written.
pub fn copy_file(from: &Path, to: &Path) -> Result<(), SyncError> {
    let copy_error = |source| SyncError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    match symlink_metadata(to) {
        Ok(metadata) if metadata.is_dir() => remove_dir_tolerant(to).map_err(copy_error)?,
        Ok(metadata) if metadata.file_type().is_symlink() => {
            fs::remove_file(to).map_err(copy_error)?;
        }
        Ok(metadata) if metadata.permissions().readonly() => {
            if let Err(e) = make_writable(to, &metadata) {
                debug!("Could not clear read-only flag on {:?}: {}", to, e);
            }
        }
        _ => {}
    }

    fs::copy(from, to).map_err(copy_error)?;
    preserve_times(from, to);
    Ok(())
}

/// Removes a replica file or directory tree.
///
/// # Returns
///
/// The applied operation, or `None` if nothing existed at `path`.
///
/// # Errors
///
/// Returns `SyncError::Remove` if the entry exists but cannot be removed.
pub fn remove_entry(path: &Path) -> Result<Option<Operation>, SyncError> {
    let remove_error = |source| SyncError::Remove {
        path: path.to_path_buf(),
        source,
    };

    let metadata = match symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == NotFound => return Ok(None),
        Err(e) => return Err(remove_error(e)),
    };

    let (result, operation) = if metadata.is_dir() {
        (
            remove_dir_tolerant(path),
            Operation::RemoveDir {
                path: path.to_path_buf(),
            },
        )
    } else {
        (
            remove_file_tolerant(path, &metadata),
            Operation::RemoveFile {
                path: path.to_path_buf(),
            },
        )
    };

    match result {
        Ok(()) => Ok(Some(operation)),
        // Vanished between inspection and removal.
        Err(e) if e.kind() == NotFound => Ok(None),
        Err(e) => Err(remove_error(e)),
    }
}

fn remove_file_tolerant(path: &Path, metadata: &Metadata) -> IoResult<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == PermissionDenied && metadata.permissions().readonly() => {
            make_writable(path, metadata)?;
            fs::remove_file(path)
        }
        result => result,
    }
}

fn remove_dir_tolerant(path: &Path) -> IoResult<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == PermissionDenied => {
            debug!("Clearing read-only flags under {:?} before removal", path);
            clear_readonly_tree(path);
            fs::remove_dir_all(path)
        }
        result => result,
    }
}

/// Restores write permission on every entry under `root`, best effort.
fn clear_readonly_tree(root: &Path) {
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(path) = pending.pop() {
        let Ok(metadata) = symlink_metadata(&path) else {
            continue;
        };
        if metadata.permissions().readonly()
            && let Err(e) = make_writable(&path, &metadata)
        {
            debug!("Could not clear read-only flag on {:?}: {}", path, e);
        }
        if metadata.is_dir()
            && let Ok(entries) = fs::read_dir(&path)
        {
            pending.extend(entries.flatten().map(|entry| entry.path()));
        }
    }
}

#[cfg(unix)]
fn make_writable(path: &Path, metadata: &Metadata) -> IoResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o200);
    set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_writable(path: &Path, metadata: &Metadata) -> IoResult<()> {
    let mut permissions = metadata.permissions();
    permissions.set_readonly(false);
    set_permissions(path, permissions)
}

fn preserve_times(from: &Path, to: &Path) {
    let result = fs::metadata(from).and_then(|metadata| {
        let times = FileTimes::new()
            .set_accessed(metadata.accessed()?)
            .set_modified(metadata.modified()?);
        let file = OpenOptions::new()
            .write(true)
            .open(to)
            .or_else(|_| File::open(to))?;
        file.set_times(times)
    });

    if let Err(e) = result {
        debug!("Could not preserve timestamps on {:?}: {}", to, e);
    }
}
