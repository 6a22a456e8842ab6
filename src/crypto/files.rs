//! Owner-only secret files.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::DaemonError;

/// Mode for files holding secrets or credentials.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// Mode for directories holding secret files.
pub const PRIVATE_DIR_MODE: u32 = 0o700;

/// Atomically replace `path` with `contents`, readable by the owner only.
///
/// The data is written to a sibling temporary file first and renamed into
/// place so readers never observe a partial file.
pub fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), DaemonError> {
    let tmp_path = temp_sibling(path);

    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(PRIVATE_FILE_MODE)
            .open(&tmp_path)?;
        // mode() only applies on creation
        file.set_permissions(fs::Permissions::from_mode(PRIVATE_FILE_MODE))?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result.map_err(DaemonError::from)
}

/// Fail unless `path` is inaccessible to group and others.
pub fn check_private_permissions(path: &Path) -> Result<(), std::io::Error> {
    let mode = fs::metadata(path)?.permissions().mode();
    if mode & 0o077 != 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!(
                "{} has insecure permissions {:04o}, expected 0600 or 0400",
                path.display(),
                mode & 0o777
            ),
        ));
    }
    Ok(())
}

/// Create `dir` (and parents) with owner-only permissions if it is missing.
pub fn ensure_private_dir(dir: &Path) -> Result<(), std::io::Error> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    fs::set_permissions(dir, fs::Permissions::from_mode(PRIVATE_DIR_MODE))
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<(), std::io::Error> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Distinguishes concurrent writers within one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    name.push(format!(".tmp-{}-{}", std::process::id(), seq));
    path.with_file_name(name)
}
