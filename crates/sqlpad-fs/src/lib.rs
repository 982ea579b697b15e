//! Filesystem helpers shared by the SQLPad crates.
//!
//! Database exports and the saved-query file are both written through
//! [`write_atomic`], so a crash mid-write never leaves a truncated
//! `database.sqlite` or a half-written JSON blob behind:
//! - the bytes go to a temp file in the destination directory
//! - the temp file is flushed and synced
//! - the temp file is renamed over the destination

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Error returned by [`write_atomic_with`].
#[derive(Debug)]
pub enum AtomicWriteError<E> {
    /// Creating, syncing or renaming the temp file failed.
    Io(io::Error),
    /// The caller-provided writer failed. The destination is untouched.
    Writer(E),
}

impl<E> From<io::Error> for AtomicWriteError<E> {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl<E: std::fmt::Display> std::fmt::Display for AtomicWriteError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomicWriteError::Io(err) => write!(f, "io error: {err}"),
            AtomicWriteError::Writer(err) => write!(f, "write error: {err}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AtomicWriteError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AtomicWriteError::Io(err) => Some(err),
            AtomicWriteError::Writer(err) => Some(err),
        }
    }
}

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` is `Some("")` for bare names like `database.sqlite`.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Atomically replace `dest` with whatever `write_fn` writes.
///
/// Missing parent directories are created. If `write_fn` fails the temp file
/// is removed and `dest` keeps its previous contents.
pub fn write_atomic_with<T, E>(
    dest: impl AsRef<Path>,
    write_fn: impl FnOnce(&mut File) -> Result<T, E>,
) -> Result<T, AtomicWriteError<E>> {
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    let out = write_fn(tmp.as_file_mut()).map_err(AtomicWriteError::Writer)?;

    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    let tmp_path = tmp.into_temp_path();
    replace_file(tmp_path.as_ref(), dest)?;
    // The rename already happened; a failed directory sync is not a failed write.
    let _ = sync_parent_dir(dest);

    Ok(out)
}

/// Atomically write `bytes` to `dest`.
pub fn write_atomic(dest: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    write_atomic_with(dest, |file| file.write_all(bytes)).map_err(|err| match err {
        AtomicWriteError::Io(err) => err,
        AtomicWriteError::Writer(err) => err,
    })
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let dir = File::open(parent_dir_or_dot(path))?;
    dir.sync_all()
}

fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt as _;
        use windows_sys::Win32::Storage::FileSystem::{MoveFileExW, MOVEFILE_REPLACE_EXISTING};

        fn to_wide_null(path: &Path) -> Vec<u16> {
            let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
            wide.push(0);
            wide
        }

        let from_w = to_wide_null(from);
        let to_w = to_wide_null(to);
        let ok = unsafe { MoveFileExW(from_w.as_ptr(), to_w.as_ptr(), MOVEFILE_REPLACE_EXISTING) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(windows))]
    {
        fs::rename(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static CWD_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    struct CwdGuard {
        old: std::path::PathBuf,
    }

    impl CwdGuard {
        fn chdir(path: &Path) -> Self {
            let old = std::env::current_dir().expect("current_dir");
            std::env::set_current_dir(path).expect("set_current_dir");
            Self { old }
        }
    }

    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.old);
        }
    }

    fn files_in(dir: &Path) -> Vec<std::path::PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .expect("read_dir")
            .map(|e| e.expect("dir entry").path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn bare_file_name_is_written_to_current_directory() {
        let _guard = CWD_LOCK.lock().expect("lock");

        let tmp = tempfile::tempdir().expect("temp dir");
        let _cwd = CwdGuard::chdir(tmp.path());

        write_atomic("database.sqlite", b"SQLite format 3\0").expect("atomic write");
        assert_eq!(
            std::fs::read(tmp.path().join("database.sqlite")).expect("read file"),
            b"SQLite format 3\0"
        );
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("nested").join("dir").join("saved-queries.json");

        write_atomic(&dest, b"{}").expect("atomic write");
        assert_eq!(std::fs::read(&dest).expect("read"), b"{}");
    }

    #[test]
    fn overwrites_existing_destination() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("saved-queries.json");
        std::fs::write(&dest, b"old contents that are longer").expect("seed");

        write_atomic(&dest, b"new").expect("atomic write");
        assert_eq!(std::fs::read(&dest).expect("read"), b"new");
        assert_eq!(files_in(tmp.path()), vec![dest]);
    }

    #[test]
    fn writer_error_leaves_destination_untouched() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("database.sqlite");
        std::fs::write(&dest, b"sentinel").expect("seed");

        let err = write_atomic_with(&dest, |file| {
            file.write_all(b"partial").expect("partial write");
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "simulated failure"))
        })
        .expect_err("writer error should propagate");

        assert!(matches!(err, AtomicWriteError::Writer(_)));
        assert_eq!(std::fs::read(&dest).expect("read"), b"sentinel");
        assert_eq!(files_in(tmp.path()), vec![dest], "temp file should be cleaned up");
    }
}
