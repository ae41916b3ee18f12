use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

/// Threshold above which we use mmap instead of buffered read.
/// mmap has overhead from page table setup; for small files buffered read wins.
const MMAP_THRESHOLD: u64 = 64 * 1024; // 64KB

/// Buffer that holds file data, either memory-mapped or heap-allocated.
pub enum FileData {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl std::ops::Deref for FileData {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            FileData::Mmap(m) => m,
            FileData::Owned(v) => v,
        }
    }
}

/// Open a file for a range scan: mmap for large files (zero-copy across
/// workers), plain read for small and empty ones (mapping a zero-length file
/// is an error on Linux).
pub fn open_scan(path: &Path) -> io::Result<FileData> {
    let len = std::fs::metadata(path)?.len();
    if len >= MMAP_THRESHOLD {
        let file = File::open(path)?;
        // SAFETY: read-only mapping; single-owner files are not truncated
        // while scanned.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(FileData::Mmap(mmap))
    } else {
        Ok(FileData::Owned(std::fs::read(path)?))
    }
}

/// Read a file, choosing mmap for large files and buffered read for small ones.
pub fn read_file_bytes(path: &Path) -> io::Result<Vec<u8>> {
    let metadata = std::fs::metadata(path)?;

    if metadata.len() >= MMAP_THRESHOLD {
        let file = File::open(path)?;
        // SAFETY: read-only mapping; the file must not be truncated while the
        // mapping is alive, which holds for our single-owner temp files.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(mmap.to_vec())
    } else {
        std::fs::read(path)
    }
}

pub fn file_size(path: &Path) -> io::Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

/// Reserve an output name by creating (or truncating to) an empty file.
pub fn create_empty_file(path: &Path) -> io::Result<()> {
    File::create(path)?;
    Ok(())
}

/// Best-effort removal for cleanup paths; missing files are fine.
pub fn remove_file_quiet(path: &Path) {
    let _ = std::fs::remove_file(path);
}

/// Free bytes on the filesystem holding `path`.
#[cfg(unix)]
pub fn disk_free_space(path: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn disk_free_space(_path: &Path) -> io::Result<u64> {
    Ok(u64::MAX)
}

/// Temp directory for the job's spill files: explicit override or the
/// system default.
pub fn resolve_tmp_dir(requested: Option<&Path>) -> PathBuf {
    match requested {
        Some(dir) => dir.to_path_buf(),
        None => std::env::temp_dir(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_size_and_empty_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.txt");
        create_empty_file(&path).unwrap();
        assert_eq!(file_size(&path).unwrap(), 0);

        let mut f = File::create(&path).unwrap();
        f.write_all(b"abc\n").unwrap();
        assert_eq!(file_size(&path).unwrap(), 4);
    }

    #[test]
    fn test_remove_file_quiet_on_missing() {
        let dir = tempfile::tempdir().unwrap();
        remove_file_quiet(&dir.path().join("never-existed"));
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_free_space_positive() {
        let free = disk_free_space(Path::new("/")).unwrap();
        assert!(free > 0);
    }
}
