//! Atomic file write helpers.
//!
//! Writes go to a temp file in the destination directory, get synced, then
//! replace the target via rename. On Windows, rename-over-existing fails, so
//! overwrite takes a backup-and-restore detour to avoid losing the old file.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::warn;

/// Permission policy for the written file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Allow the file to inherit the default umask.
    #[default]
    Default,
    /// Strictly enforce owner-only read/write permissions (0o600 on Unix).
    SensitiveOwnerOnly,
}

#[cfg(unix)]
impl PersistMode {
    fn unix_mode(self) -> Option<u32> {
        match self {
            Self::Default => None,
            Self::SensitiveOwnerOnly => Some(0o600),
        }
    }
}

/// Replace the contents of `path` with `bytes` in one atomic step.
///
/// Readers concurrently opening `path` see either the previous content or the
/// new content in full, never a partial write.
pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8], mode: PersistMode) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    set_unix_mode(tmp.path(), mode)?;

    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    if let Err(err) = tmp.persist(path) {
        if !path.exists() {
            return Err(err.error);
        }
        // Windows: rename refuses to clobber. Move the old file aside first,
        // restore it if the second rename also fails.
        let backup = path.with_extension("bak");
        let _ = fs::remove_file(&backup);
        fs::rename(path, &backup)?;

        if let Err(retry_err) = err.file.persist(path) {
            let _ = fs::rename(&backup, path);
            return Err(retry_err.error);
        }
        if let Err(e) = fs::remove_file(&backup) {
            warn!(path = %backup.display(), "Failed to remove .bak after atomic write: {e}");
        }
    }

    set_unix_mode(path, mode)
}

/// Recover from incomplete atomic writes by restoring `.bak` files.
///
/// If `path` does not exist but `path.bak` does, a crash hit the
/// backup-rename window in [`atomic_write`]. Rename the backup back to the
/// canonical path so the caller can load it.
pub fn recover_bak_file(path: &Path) {
    let backup = path.with_extension("bak");
    if path.exists() || !backup.exists() {
        return;
    }
    match fs::rename(&backup, path) {
        Ok(()) => {
            warn!(path = %path.display(), "Recovered .bak file from interrupted atomic write");
        }
        Err(e) => {
            warn!(path = %path.display(), "Failed to recover .bak file: {e}");
        }
    }
}

#[cfg(unix)]
fn set_unix_mode(path: &Path, mode: PersistMode) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    match mode.unix_mode() {
        Some(bits) => fs::set_permissions(path, fs::Permissions::from_mode(bits)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn set_unix_mode(_path: &Path, _mode: PersistMode) -> io::Result<()> {
    Ok(())
}
