//! Filesystem helpers for staged data.

use porter_core::{DataClass, ListingEntry};
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Create `dir` unless it exists. An existing directory must be empty.
///
/// # Errors
///
/// Returns `AlreadyExists` for a non-empty directory or a non-directory at
/// `dir`, or the error of the underlying filesystem call
pub fn ensure_directory(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        if fs::read_dir(dir)?.next().is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("directory \"{}\" already exists and is not empty", dir.display()),
            ));
        }
        return Ok(());
    }
    if dir.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("\"{}\" already exists and is not a directory", dir.display()),
        ));
    }
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn clear_write_bits(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() & !0o222);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn clear_write_bits(path: &Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(true);
    fs::set_permissions(path, permissions)
}

/// Clear the write bits of a file, or of every file below a directory.
/// Directories themselves stay writable.
///
/// # Errors
///
/// Returns the first filesystem error
pub fn make_read_only(path: &Path) -> io::Result<()> {
    if path.is_file() {
        return clear_write_bits(path);
    }
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() {
            clear_write_bits(entry.path())?;
        }
    }
    Ok(())
}

/// Check that every member of `listing` exists below `dir` with the listed
/// class, descending into nested listings.
///
/// # Errors
///
/// Returns a description of the first mismatch
pub fn check_listing(dir: &Path, listing: &[ListingEntry]) -> Result<(), String> {
    for entry in listing {
        let path = dir.join(&entry.basename);
        match entry.class {
            DataClass::File => {
                if !path.is_file() {
                    return Err(format!(
                        "listing contains \"{}\" but this file could not be found on disk",
                        path.display()
                    ));
                }
            }
            DataClass::Directory => {
                if !path.is_dir() {
                    return Err(format!(
                        "listing contains \"{}\" but this directory could not be found on disk",
                        path.display()
                    ));
                }
                if let Some(nested) = &entry.listing {
                    check_listing(&path, nested)?;
                }
            }
        }
    }
    Ok(())
}

/// Size in bytes of a regular file, `None` for anything else
#[must_use]
pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}
