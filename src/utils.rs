//! Utility functions for gitbak
//!
//! Small filesystem helpers shared by the copy engine, the metadata layer and
//! the orchestrators: permission handling across platforms, relative path
//! computation, forward-slash normalization, atomic writes and symlinks.

use crate::error::{GitbakError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Get the raw mode (file type and permission bits) from metadata
#[cfg(unix)]
pub fn get_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode()
}

/// Get a Unix-like mode from metadata (Windows implementation)
///
/// Windows has no permission bits, so file attributes are mapped onto the
/// closest Unix equivalent and the type bits are synthesized.
#[cfg(windows)]
pub fn get_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::windows::fs::MetadataExt;

    let attrs = metadata.file_attributes();
    let mut mode = if attrs & 0x01 != 0 { 0o444 } else { 0o644 }; // FILE_ATTRIBUTE_READONLY

    if metadata.is_dir() {
        mode |= 0o111 | 0o040000;
    } else if metadata.file_type().is_symlink() {
        mode |= 0o120000;
    } else {
        mode |= 0o100000;
    }
    mode
}

/// Permission bits only
pub fn get_permissions(metadata: &fs::Metadata) -> u32 {
    get_mode(metadata) & 0o7777
}

/// Set Unix permissions
#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = fs::Permissions::from_mode(mode & 0o7777);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

/// Set permissions (Windows implementation)
///
/// Only the read-only attribute can be expressed; it is set when the owner
/// write bit is clear.
#[cfg(windows)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly((mode & 0o200) == 0);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// Make sure the owner can write into `path`
///
/// Used before overwriting a file or filling a directory that was copied
/// read-only by a previous run. The final permissions are reapplied by the
/// caller afterwards.
pub fn ensure_owner_writable(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Ok(());
    }
    let mode = get_permissions(&metadata);
    if mode & 0o200 == 0 {
        let extra = if metadata.is_dir() { 0o700 } else { 0o600 };
        trace!("Making {:?} owner-writable (mode {:o})", path, mode);
        set_permissions(path, mode | extra)?;
    }
    Ok(())
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first so symbolic links inside the base keep their
/// own path, then falls back to canonicalizing both sides.
///
/// # Example
///
/// ```rust,ignore
/// use crate::utils::make_relative;
/// use std::path::{Path, PathBuf};
///
/// let base = Path::new("/home/user/.config");
/// let full_path = Path::new("/home/user/.config/nvim/init.lua");
/// assert_eq!(make_relative(full_path, base)?, PathBuf::from("nvim/init.lua"));
/// ```
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            GitbakError::internal(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// Render a path with forward slashes
///
/// Ignore rules and manifest keys are always compared in this form.
pub fn to_slash(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        rendered.into_owned()
    } else {
        rendered.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Base name of a path as a string
pub fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| GitbakError::PathConversion(path.as_os_str().to_owned()))
}

/// Format bytes in human-readable form
///
/// Uses binary units (1024-based).
///
/// ```rust
/// # use gitbak::format_bytes;
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write (write to temp file then rename)
///
/// The temporary file lives next to the target so the final rename never
/// crosses filesystems. The result is readable by everyone (0644) like a
/// plainly created file would be.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    set_permissions(temp.path(), 0o644)?;
    temp.persist(path).map_err(|e| GitbakError::Io(e.error))?;

    trace!("Wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

/// Create a symlink (cross-platform)
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::unix::fs::symlink;
    symlink(target, link)?;
    Ok(())
}

/// Create a symlink (Windows)
#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    if target.is_dir() {
        symlink_dir(target, link)?;
    } else {
        symlink_file(target, link)?;
    }
    Ok(())
}

/// Read symlink target
pub fn read_symlink(path: &Path) -> Result<PathBuf> {
    Ok(fs::read_link(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
        assert_eq!(format_bytes(1_073_741_824), "1.00 GB");
    }

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("nested").join("test.json");

        atomic_write(&file_path, b"first").unwrap();
        atomic_write(&file_path, b"second").unwrap();

        assert_eq!(fs::read(&file_path).unwrap(), b"second");
        let leftovers = fs::read_dir(file_path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_make_relative() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let file = base.join("subdir").join("file.txt");

        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"test").unwrap();

        let relative = make_relative(&file, base).unwrap();
        assert_eq!(relative, PathBuf::from("subdir/file.txt"));
        assert!(make_relative(base, &file).is_err());
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name(Path::new("/home/u/.zshrc")).unwrap(), ".zshrc");
        assert_eq!(base_name(Path::new("/home/u/nvim/")).unwrap(), "nvim");
        assert!(base_name(Path::new("/")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_and_owner_writable() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("ro.txt");
        fs::write(&file, b"x").unwrap();

        set_permissions(&file, 0o100444).unwrap();
        assert_eq!(get_permissions(&fs::metadata(&file).unwrap()), 0o444);

        ensure_owner_writable(&file).unwrap();
        assert_eq!(get_permissions(&fs::metadata(&file).unwrap()), 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_helpers() {
        let temp_dir = TempDir::new().unwrap();
        let link = temp_dir.path().join("link");
        create_symlink(Path::new("target.txt"), &link).unwrap();
        assert_eq!(read_symlink(&link).unwrap(), PathBuf::from("target.txt"));
    }
}
